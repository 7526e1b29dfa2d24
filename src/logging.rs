//! Structured JSONL logging for the site backend.
//!
//! Every record lands in a per-run directory (`LOG_DIR/RUN_ID`) split into
//! `events.jsonl`, `trace.jsonl` and `metrics.jsonl`, and is mirrored to
//! stderr so CLI output on stdout stays machine-readable.
//!
//! Filtering:
//! - `LOG_LEVEL` minimum level (default `info`)
//! - `LOG_DOMAINS` comma-separated domains or `all`
//! - `LOG_STDERR=0` silences the mirror
//! - `PROFILE_SAMPLE` fraction of [`ProfileScope`]s that emit

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{create_dir_all, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn from_env() -> Self {
        std::env::var("LOG_LEVEL")
            .ok()
            .and_then(|v| Level::parse(&v))
            .unwrap_or(Level::Info)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "fatal" => Some(Level::Fatal),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Log Domains
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Catalog,   // Search, filters, sorting
    Calc,      // Simulator, FIRE, portfolio analytics
    Market,    // Provider calls, cache, rate limiting
    Admin,     // Console mutations, validation
    Backup,    // Backup, restore, auto backups
    Blog,      // Article store, import, generator
    Affiliate, // Clicks, analytics events
    Scheduler, // Article generation slots
    Http,      // Request handling
    System,    // Startup, shutdown, storage
    Profile,   // Timing scopes
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Catalog => "catalog",
            Domain::Calc => "calc",
            Domain::Market => "market",
            Domain::Admin => "admin",
            Domain::Backup => "backup",
            Domain::Blog => "blog",
            Domain::Affiliate => "affiliate",
            Domain::Scheduler => "scheduler",
            Domain::Http => "http",
            Domain::System => "system",
            Domain::Profile => "profile",
        }
    }

    pub fn is_enabled(&self) -> bool {
        filters().domains.as_ref().map_or(true, |list| list.iter().any(|d| d == self.as_str()))
    }
}

// =============================================================================
// Run context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static PROFILE_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();
static FILTERS: OnceLock<Filters> = OnceLock::new();

/// Environment filters, read on first use.
struct Filters {
    min_level: Level,
    /// `None` means every domain.
    domains: Option<Vec<String>>,
    profile_sample: f64,
}

fn parse_domains(raw: Option<&str>) -> Option<Vec<String>> {
    match raw.map(str::trim) {
        None | Some("") | Some("all") => None,
        Some(list) => Some(list.split(',').map(|d| d.trim().to_ascii_lowercase()).collect()),
    }
}

fn filters() -> &'static Filters {
    FILTERS.get_or_init(|| Filters {
        min_level: Level::from_env(),
        domains: parse_domains(std::env::var("LOG_DOMAINS").ok().as_deref()),
        profile_sample: std::env::var("PROFILE_SAMPLE")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(1.0),
    })
}

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

type Sink = Mutex<BufWriter<Box<dyn Write + Send>>>;

/// Files of one process run under `LOG_DIR/<run id>/`.
struct RunContext {
    run_id: String,
    mirror: bool,
    events: Sink,
    trace: Sink,
    metrics: Sink,
}

impl RunContext {
    fn open() -> Self {
        let run_id = std::env::var("RUN_ID").unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let dir = PathBuf::from(std::env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string())).join(&run_id);
        if let Err(err) = create_dir_all(&dir) {
            eprintln!("[log] cannot create {}: {}", dir.display(), err);
        }
        let manifest = json!({
            "run_id": run_id,
            "started": ts_now(),
            "pid": process::id(),
            "package": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        });
        let _ = std::fs::write(dir.join("manifest.json"), manifest.to_string());
        Self {
            mirror: std::env::var("LOG_STDERR").map_or(true, |v| v != "0"),
            events: Self::sink(&dir, "events"),
            trace: Self::sink(&dir, "trace"),
            metrics: Self::sink(&dir, "metrics"),
            run_id,
        }
    }

    /// Falls back to the temp dir, then to a null writer.
    fn sink(dir: &Path, name: &str) -> Sink {
        let primary = dir.join(format!("{}.jsonl", name));
        let writer: Box<dyn Write + Send> = match File::create(&primary)
            .or_else(|_| File::create(std::env::temp_dir().join(format!("etfitalia-{}.jsonl", name))))
        {
            Ok(file) => Box::new(file),
            Err(err) => {
                eprintln!("[log] {} log disabled: {}", name, err);
                Box::new(io::sink())
            }
        };
        Mutex::new(BufWriter::new(writer))
    }

    fn route(&self, level: Level, event: &str) -> &Sink {
        if event.starts_with("metrics.") {
            &self.metrics
        } else if level <= Level::Debug {
            &self.trace
        } else {
            &self.events
        }
    }
}

fn run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(RunContext::open)
}

const REDACTED_KEYS: [&str; 8] = [
    "authorization",
    "api_key",
    "apikey",
    "api_token",
    "token",
    "password",
    "admin_password",
    "signature",
];

fn sanitize_fields(mut fields: Map<String, Value>) -> Map<String, Value> {
    for (key, value) in fields.iter_mut() {
        let lower = key.to_ascii_lowercase();
        if REDACTED_KEYS.contains(&lower.as_str()) {
            *value = Value::String("[REDACTED]".to_string());
        }
    }
    fields
}

fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut top = Map::new();
    for key in ["req_id", "isin", "provider", "action", "msg"] {
        if let Some(value) = fields.remove(key) {
            top.insert(key.to_string(), value);
        }
    }
    (top, fields)
}

fn write_line(writer: &Sink, line: &str) {
    if let Ok(mut w) = writer.lock() {
        let _ = writeln!(w, "{}", line);
        let _ = w.flush();
    }
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Epoch milliseconds
pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    if level < filters().min_level || !domain.is_enabled() {
        return;
    }

    emit_record(level, domain.as_str(), event, fields);
}

fn emit_record(level: Level, component: &str, event: &str, fields: Map<String, Value>) {
    let ctx = run_context();
    let (top, data) = split_fields(sanitize_fields(fields));

    let mut entry = json!({
        "ts": ts_now(),
        "run_id": ctx.run_id,
        "seq": next_seq(),
        "lvl": level.as_str().to_uppercase(),
        "component": component,
        "event": event,
        "msg": "",
    });
    if let Value::Object(map) = &mut entry {
        map.extend(top);
        map.insert("data".to_string(), Value::Object(data));
    }

    let line = entry.to_string();
    write_line(ctx.route(level, event), &line);
    if ctx.mirror {
        eprintln!("{}", line);
    }
}

// =============================================================================
// Domain-Specific Logging Helpers
// =============================================================================

pub fn log_request(method: &str, path: &str, status: u16, elapsed_ms: f64) {
    let level = if status >= 500 {
        Level::Error
    } else if status >= 400 {
        Level::Warn
    } else {
        Level::Debug
    };
    log(
        level,
        Domain::Http,
        "request",
        obj(&[
            ("method", v_str(method)),
            ("path", v_str(path)),
            ("status", json!(status)),
            ("elapsed_ms", v_num(elapsed_ms)),
        ]),
    );
    agg_increment("request");
    if status >= 500 {
        agg_increment("server_error");
    }
}

pub fn log_provider_call(provider: &str, endpoint: &str, outcome: &str, attempt: u32) {
    let level = if outcome == "ok" { Level::Debug } else { Level::Warn };
    log(
        level,
        Domain::Market,
        "provider_call",
        obj(&[
            ("provider", v_str(provider)),
            ("endpoint", v_str(endpoint)),
            ("outcome", v_str(outcome)),
            ("attempt", json!(attempt)),
        ]),
    );
}

pub fn log_admin_action(action: &str, target: &str, ok: bool) {
    log(
        if ok { Level::Info } else { Level::Warn },
        Domain::Admin,
        "admin_action",
        obj(&[
            ("action", v_str(action)),
            ("target", v_str(target)),
            ("ok", json!(ok)),
        ]),
    );
}

// =============================================================================
// Utility Functions
// =============================================================================

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

// =============================================================================
// Profiling Scope
// =============================================================================

/// Profiling scope that emits structured timing on drop.
pub struct ProfileScope {
    label: &'static str,
    context: Option<Map<String, Value>>,
    started: Instant,
    enabled: bool,
}

impl ProfileScope {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            context: None,
            started: Instant::now(),
            enabled: Self::should_sample(),
        }
    }

    pub fn with_context(label: &'static str, fields: &[(&str, Value)]) -> Self {
        let enabled = Self::should_sample();
        Self {
            label,
            context: if enabled { Some(obj(fields)) } else { None },
            started: Instant::now(),
            enabled,
        }
    }

    fn should_sample() -> bool {
        let rate = filters().profile_sample;
        if rate >= 1.0 {
            return true;
        }
        if rate <= 0.0 {
            return false;
        }
        let seq = PROFILE_SEQ.fetch_add(1, Ordering::Relaxed);
        ((seq % 10_000) as f64 / 10_000.0) < rate
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        if !self.enabled {
            return;
        }
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let mut fields = self.context.take().unwrap_or_default();
        fields.insert("label".to_string(), v_str(self.label));
        fields.insert("elapsed_ms".to_string(), v_num(elapsed_ms));
        log(Level::Trace, Domain::Profile, "profile", fields);
    }
}

// =============================================================================
// Log Aggregator for Periodic Summaries
// =============================================================================

static AGGREGATOR: OnceLock<Mutex<LogAggregator>> = OnceLock::new();

fn get_aggregator() -> &'static Mutex<LogAggregator> {
    AGGREGATOR.get_or_init(|| Mutex::new(LogAggregator::new()))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AggregatedCounts {
    pub requests: u64,
    pub server_errors: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub provider_failures: u64,
    pub affiliate_clicks: u64,
}

impl AggregatedCounts {
    /// Unknown event names are ignored.
    pub fn record(&mut self, event: &str) {
        let slot = match event {
            "request" => &mut self.requests,
            "server_error" => &mut self.server_errors,
            "cache_hit" => &mut self.cache_hits,
            "cache_miss" => &mut self.cache_misses,
            "provider_failure" => &mut self.provider_failures,
            "affiliate_click" => &mut self.affiliate_clicks,
            _ => return,
        };
        *slot += 1;
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

struct LogAggregator {
    counts: AggregatedCounts,
    last_flush: Instant,
    every: Duration,
}

impl LogAggregator {
    fn new() -> Self {
        let secs = std::env::var("LOG_FLUSH_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(300);
        Self { counts: AggregatedCounts::default(), last_flush: Instant::now(), every: Duration::from_secs(secs) }
    }

    /// Takes the counts once per interval; quiet intervals produce nothing.
    fn maybe_flush(&mut self) -> Option<AggregatedCounts> {
        if self.last_flush.elapsed() < self.every {
            return None;
        }
        self.last_flush = Instant::now();
        let taken = std::mem::take(&mut self.counts);
        (!taken.is_empty()).then_some(taken)
    }
}

/// Call periodically to emit aggregated stats
pub fn tick_aggregator() {
    if let Ok(mut agg) = get_aggregator().lock() {
        if let Some(c) = agg.maybe_flush() {
            log(
                Level::Info,
                Domain::System,
                "metrics.aggregated",
                obj(&[
                    ("requests", json!(c.requests)),
                    ("server_errors", json!(c.server_errors)),
                    ("cache_hits", json!(c.cache_hits)),
                    ("cache_misses", json!(c.cache_misses)),
                    ("provider_failures", json!(c.provider_failures)),
                    ("affiliate_clicks", json!(c.affiliate_clicks)),
                ]),
            );
        }
    }
}

/// Increment a counter in the aggregator
pub fn agg_increment(event: &str) {
    if let Ok(mut agg) = get_aggregator().lock() {
        agg.counts.record(event);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
        assert!(Level::Error < Level::Fatal);
    }

    #[test]
    fn test_level_parse_is_case_insensitive() {
        assert_eq!(Level::parse("WARN"), Some(Level::Warn));
        assert_eq!(Level::parse(" debug "), Some(Level::Debug));
        assert_eq!(Level::parse("verbose"), None);
    }

    #[test]
    fn test_secrets_are_redacted() {
        let fields = sanitize_fields(obj(&[
            ("apikey", v_str("demo")),
            ("Password", v_str("hunter2")),
            ("isin", v_str("IE00B4L5Y983")),
        ]));
        assert_eq!(fields["apikey"], "[REDACTED]");
        assert_eq!(fields["Password"], "[REDACTED]");
        assert_eq!(fields["isin"], "IE00B4L5Y983");
    }

    #[test]
    fn test_split_promotes_correlation_fields() {
        let (top, data) = split_fields(obj(&[
            ("provider", v_str("finnhub")),
            ("endpoint", v_str("holdings")),
        ]));
        assert!(top.contains_key("provider"));
        assert!(data.contains_key("endpoint"));
    }

    #[test]
    fn test_aggregator_counts_known_events() {
        let mut agg = LogAggregator::new();
        for event in ["request", "request", "cache_hit", "unknown"] {
            agg.counts.record(event);
        }
        assert_eq!(agg.counts.requests, 2);
        assert_eq!(agg.counts.cache_hits, 1);
        agg.every = Duration::ZERO;
        let flushed = agg.maybe_flush().unwrap();
        assert_eq!(flushed.requests, 2);
        assert!(agg.counts.is_empty());
        assert!(agg.maybe_flush().is_none());
    }

    #[test]
    fn test_domain_list_parsing() {
        assert_eq!(parse_domains(None), None);
        assert_eq!(parse_domains(Some("all")), None);
        assert_eq!(parse_domains(Some("Market, blog")), Some(vec!["market".to_string(), "blog".to_string()]));
    }

    #[test]
    fn test_seq_increments() {
        let s1 = next_seq();
        let s2 = next_seq();
        assert!(s2 > s1);
    }
}
