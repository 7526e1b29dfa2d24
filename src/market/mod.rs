//! Market data gateway: provider settings, cache, rate limiting and fallbacks.

pub mod cache;
pub mod circuit;
pub mod client;
pub mod mock;
pub mod rate_limit;
pub mod retry;
pub mod service;

use chrono::{DateTime, Datelike, TimeZone, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::Config;

pub use cache::ApiCache;
pub use client::{ApiClient, FetchError, HttpSource, MarketSource, OfflineSource};
pub use service::{EtfData, EtfDataService, Quote};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Provider {
    IexCloud,
    AlphaVantage,
    Finnhub,
    Eodhd,
    Cbonds,
    BorsaItaliana,
}

impl Provider {
    /// Providers reachable over HTTP; Borsa Italiana is served from mock data only.
    pub const HTTP: [Provider; 5] = [
        Provider::IexCloud,
        Provider::AlphaVantage,
        Provider::Finnhub,
        Provider::Eodhd,
        Provider::Cbonds,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Provider::IexCloud => "iexCloud",
            Provider::AlphaVantage => "alphaVantage",
            Provider::Finnhub => "finnhub",
            Provider::Eodhd => "eodhd",
            Provider::Cbonds => "cbonds",
            Provider::BorsaItaliana => "borsaItaliana",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Provider::IexCloud => "IEX Cloud",
            Provider::AlphaVantage => "Alpha Vantage",
            Provider::Finnhub => "Finnhub",
            Provider::Eodhd => "EODHD",
            Provider::Cbonds => "Cbonds",
            Provider::BorsaItaliana => "Borsa Italiana",
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            Provider::IexCloud => "https://cloud.iexapis.com/stable",
            Provider::AlphaVantage => "https://www.alphavantage.co/query",
            Provider::Finnhub => "https://finnhub.io/api/v1",
            Provider::Eodhd => "https://eodhd.com/api",
            Provider::Cbonds => "https://api.cbonds.com/v1",
            Provider::BorsaItaliana => "https://www.borsaitaliana.it/borsa/etf",
        }
    }

    /// Query parameter carrying the credential.
    pub fn auth_param(&self) -> Option<&'static str> {
        match self {
            Provider::IexCloud => Some("token"),
            Provider::Eodhd => Some("api_token"),
            Provider::AlphaVantage | Provider::Finnhub | Provider::Cbonds => Some("apikey"),
            Provider::BorsaItaliana => None,
        }
    }

    pub fn endpoint(&self, name: &str) -> Option<&'static str> {
        let table: &[(&str, &'static str)] = match self {
            Provider::IexCloud => &[
                ("quote", "/stock/{symbol}/quote"),
                ("chart", "/stock/{symbol}/chart/{range}"),
                ("stats", "/stock/{symbol}/stats"),
                ("company", "/stock/{symbol}/company"),
            ],
            Provider::AlphaVantage => &[
                ("quote", "?function=GLOBAL_QUOTE&symbol={symbol}"),
                ("daily", "?function=TIME_SERIES_DAILY&symbol={symbol}"),
                ("overview", "?function=OVERVIEW&symbol={symbol}"),
            ],
            Provider::Finnhub => &[
                ("quote", "/quote?symbol={symbol}"),
                ("profile", "/stock/profile2?symbol={symbol}"),
                ("etf", "/etf/profile?symbol={symbol}"),
                ("holdings", "/etf/holdings?symbol={symbol}"),
            ],
            Provider::Eodhd => &[
                ("fundamentals", "/fundamentals/{symbol}"),
                ("eod", "/eod/{symbol}"),
                ("realtime", "/real-time/{symbol}"),
            ],
            Provider::Cbonds => &[
                ("nav", "/etf/{isin}/nav"),
                ("risk", "/etf/{isin}/risk-metrics"),
                ("benchmark", "/etf/{isin}/benchmark"),
                ("search", "/instruments/search?q={q}"),
            ],
            Provider::BorsaItaliana => &[
                ("etfList", "/lista-completa.html"),
                ("etfDetail", "/scheda/{isin}.html"),
                ("prices", "/prezzi/{isin}.html"),
            ],
        };
        table.iter().find(|(k, _)| *k == name).map(|(_, v)| *v)
    }

    /// Published quota as (requests, window).
    pub fn rate_limit(&self) -> Option<(u32, Duration)> {
        match self {
            Provider::IexCloud => Some((100, Duration::from_secs(1))),
            Provider::AlphaVantage => Some((5, Duration::from_secs(60))),
            Provider::Finnhub => Some((60, Duration::from_secs(60))),
            Provider::Eodhd => Some((20, Duration::from_secs(86_400))),
            Provider::Cbonds => Some((30, Duration::from_secs(1))),
            Provider::BorsaItaliana => None,
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        match self {
            Provider::IexCloud => Duration::from_secs(5 * 60),
            Provider::AlphaVantage | Provider::Finnhub | Provider::Eodhd => Duration::from_secs(60 * 60),
            Provider::Cbonds => Duration::from_secs(30 * 60),
            Provider::BorsaItaliana => Duration::from_secs(15 * 60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub provider: Provider,
    pub base_url: String,
    pub credential: String,
    pub cache_ttl: Duration,
}

impl ProviderConfig {
    pub fn from_config(provider: Provider, cfg: &Config) -> Self {
        Self {
            provider,
            base_url: provider.base_url().to_string(),
            credential: cfg.provider_key(provider.key()).to_string(),
            cache_ttl: provider.cache_ttl(),
        }
    }

    /// Points the provider at another host, used for staging mirrors and tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

const ISIN_SYMBOLS: [(&str, &str); 8] = [
    ("IE00B4L5Y983", "IWDA.L"),
    ("IE00B0M62Q58", "IWDM.L"),
    ("IE00B4L5YC18", "IEMM.L"),
    ("LU0274208692", "XMWO.DE"),
    ("IE00BKM4GZ66", "EIMI.L"),
    ("LU1681043599", "XMWO.DE"),
    ("IE00B52VJ196", "IUSN.L"),
    ("LU0274211217", "XSPX.DE"),
];

/// Exchange symbol for an ISIN. Unknown short all-caps codes are treated as US tickers.
pub fn isin_to_symbol(isin: &str) -> String {
    if let Some((_, symbol)) = ISIN_SYMBOLS.iter().find(|(i, _)| *i == isin) {
        return symbol.to_string();
    }
    let looks_like_ticker =
        !isin.is_empty() && isin.len() <= 5 && isin.chars().all(|c| c.is_ascii_uppercase());
    if looks_like_ticker {
        format!("{}.US", isin)
    } else {
        isin.to_string()
    }
}

/// Weekdays, 09:00 through 17:59 local exchange time.
pub fn is_market_hours<Tz: TimeZone>(now: &DateTime<Tz>) -> bool {
    let weekday = !matches!(now.weekday(), Weekday::Sat | Weekday::Sun);
    weekday && (9..=17).contains(&now.hour())
}
