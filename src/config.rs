use std::path::PathBuf;

/// Runtime configuration, read once from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub site_url: String,
    pub sqlite_path: String,
    pub blog_data_path: PathBuf,
    pub generated_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub admin_hmac_key: Option<String>,
    pub admin_max_skew_secs: i64,
    pub iex_token: String,
    pub alphavantage_key: String,
    pub finnhub_key: String,
    pub eodhd_key: String,
    pub cbonds_key: String,
    pub http_timeout_secs: u64,
    pub market_retries: u32,
    pub circuit_threshold: u32,
    pub market_refresh_secs: u64,
    pub auto_backup_secs: i64,
    pub monte_carlo_iterations: usize,
    pub use_live_market: bool,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:8001"),
            site_url: env_or("SITE_URL", "https://guadagnareconetf.it"),
            sqlite_path: env_or("SQLITE_PATH", "./etfitalia.sqlite"),
            blog_data_path: PathBuf::from(env_or("BLOG_DATA_PATH", "data/blog_articles.json")),
            generated_dir: PathBuf::from(env_or("GENERATED_DIR", "generated_articles")),
            processed_dir: PathBuf::from(env_or("PROCESSED_DIR", "processed_articles")),
            admin_hmac_key: std::env::var("ADMIN_HMAC_KEY").ok().filter(|v| !v.is_empty()),
            admin_max_skew_secs: std::env::var("ADMIN_MAX_SKEW_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(60),
            iex_token: env_or("IEX_TOKEN", "demo"),
            alphavantage_key: env_or("ALPHAVANTAGE_KEY", "demo"),
            finnhub_key: env_or("FINNHUB_KEY", "demo"),
            eodhd_key: env_or("EODHD_KEY", "demo"),
            cbonds_key: env_or("CBONDS_KEY", "demo"),
            http_timeout_secs: std::env::var("HTTP_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(10),
            market_retries: std::env::var("MARKET_RETRIES").ok().and_then(|v| v.parse().ok()).unwrap_or(2),
            circuit_threshold: std::env::var("CIRCUIT_THRESHOLD").ok().and_then(|v| v.parse().ok()).unwrap_or(5),
            market_refresh_secs: std::env::var("MARKET_REFRESH_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(300),
            auto_backup_secs: std::env::var("AUTO_BACKUP_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(1800),
            monte_carlo_iterations: std::env::var("MONTE_CARLO_ITERATIONS").ok().and_then(|v| v.parse().ok()).unwrap_or(1000),
            use_live_market: std::env::var("LIVE_MARKET")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }

    /// Credential configured for a provider, by the provider's config key.
    pub fn provider_key(&self, provider: &str) -> &str {
        match provider {
            "iexCloud" => &self.iex_token,
            "alphaVantage" => &self.alphavantage_key,
            "finnhub" => &self.finnhub_key,
            "eodhd" => &self.eodhd_key,
            "cbonds" => &self.cbonds_key,
            _ => "",
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
