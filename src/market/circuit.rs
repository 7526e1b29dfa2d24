use serde_json::json;
use std::time::{Duration, Instant};

use crate::logging::{log, obj, v_str, Domain, Level};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Breaker in front of one market data provider. After `threshold`
/// consecutive failures the provider is skipped (callers go straight to mock
/// data) until `cooldown` has passed; then a single probe decides.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    provider: &'static str,
    state: CircuitState,
    failures: u32,
    threshold: u32,
    cooldown: Duration,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(provider: &'static str, threshold: u32, cooldown: Duration) -> Self {
        Self {
            provider,
            state: CircuitState::Closed,
            failures: 0,
            threshold: threshold.max(1),
            cooldown,
            opened_at: None,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    fn transition(&mut self, to: CircuitState) {
        if self.state != to {
            log(
                if to == CircuitState::Open { Level::Warn } else { Level::Info },
                Domain::Market,
                "circuit_transition",
                obj(&[
                    ("provider", v_str(self.provider)),
                    ("from", v_str(self.state.as_str())),
                    ("to", v_str(to.as_str())),
                    ("failures", json!(self.failures)),
                ]),
            );
            self.state = to;
        }
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
        self.opened_at = None;
        self.transition(CircuitState::Closed);
    }

    pub fn record_failure(&mut self) {
        self.record_failure_at(Instant::now());
    }

    fn record_failure_at(&mut self, now: Instant) {
        self.failures += 1;
        // A failed probe reopens immediately.
        if self.state == CircuitState::HalfOpen || self.failures >= self.threshold {
            self.opened_at = Some(now);
            self.transition(CircuitState::Open);
        }
    }

    pub fn allow(&mut self) -> bool {
        self.allow_at(Instant::now())
    }

    fn allow_at(&mut self, now: Instant) -> bool {
        if self.state == CircuitState::Open {
            let cooled = self.opened_at.map_or(true, |t| now.duration_since(t) >= self.cooldown);
            if !cooled {
                return false;
            }
            self.transition(CircuitState::HalfOpen);
        }
        true
    }
}
