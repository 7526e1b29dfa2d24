use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Sliding-window limiter: at most `limit` requests in any `window`.
#[derive(Debug)]
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    requests: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn per_window(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit.max(1) as usize,
            window,
            requests: Mutex::new(VecDeque::new()),
        }
    }

    pub fn per_second(limit: u32) -> Self {
        Self::per_window(limit, Duration::from_secs(1))
    }

    fn prune(requests: &mut VecDeque<Instant>, window: Duration, now: Instant) {
        while let Some(front) = requests.front() {
            if now.duration_since(*front) >= window {
                requests.pop_front();
            } else {
                break;
            }
        }
    }

    /// Takes a slot, or returns how long until the oldest request leaves the window.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        Self::prune(&mut requests, self.window, now);
        if requests.len() < self.limit {
            requests.push_back(now);
            return Ok(());
        }
        let oldest = requests.front().copied().unwrap_or(now);
        Err(self.window.saturating_sub(now.duration_since(oldest)))
    }

    pub async fn wait_for_slot(&self) {
        while let Err(wait) = self.try_acquire() {
            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }
    }

    /// Waits for a slot unless the wait would exceed `max_wait`.
    pub async fn acquire_within(&self, max_wait: Duration) -> bool {
        loop {
            match self.try_acquire() {
                Ok(()) => return true,
                Err(wait) if wait <= max_wait => {
                    tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
                }
                Err(_) => return false,
            }
        }
    }

    pub fn in_window(&self) -> usize {
        let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
        Self::prune(&mut requests, self.window, Instant::now());
        requests.len()
    }
}
