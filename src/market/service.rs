use chrono::Utc;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::cache::ApiCache;
use super::client::{ApiClient, HttpSource, MarketSource, OfflineSource};
use super::retry::RetryConfig;
use super::{isin_to_symbol, mock, Provider, ProviderConfig};
use crate::config::Config;
use crate::logging::{log, obj, v_str, Domain, Level, ProfileScope};

const COMPLETE_TTL: Duration = Duration::from_secs(30 * 60);
const HISTORY_TTL: Duration = Duration::from_secs(60 * 60);
const MOCK: &str = "mock";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Quote {
    pub symbol: String,
    pub latest_price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub volume: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_close: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pe_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week52_high: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week52_low: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ytd_change: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EtfData {
    pub isin: String,
    pub symbol: String,
    pub quote: Option<Quote>,
    pub holdings: Option<Value>,
    pub fundamentals: Option<Value>,
    pub risk_metrics: Option<Value>,
    pub last_updated: String,
    pub errors: Vec<String>,
    /// Part name to the provider that served it, or "mock".
    pub sources: BTreeMap<String, String>,
}

impl EtfData {
    pub fn used_mock(&self) -> bool {
        self.sources.values().any(|s| s == MOCK)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub name: String,
    pub status: String,
}

struct Sourced<T> {
    value: T,
    source: &'static str,
}

impl<T> Sourced<T> {
    fn live(value: T, provider: Provider) -> Self {
        Self { value, source: provider.key() }
    }

    fn mock(value: T) -> Self {
        Self { value, source: MOCK }
    }
}

fn parse_num(v: &Value) -> f64 {
    match v {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Maps an Alpha Vantage `Global Quote` object onto [`Quote`].
pub fn transform_alpha_vantage_quote(global: &Value) -> Quote {
    let price = parse_num(&global["05. price"]);
    let change = parse_num(&global["09. change"]);
    Quote {
        symbol: global["01. symbol"].as_str().unwrap_or_default().to_string(),
        latest_price: price,
        change,
        change_percent: if price != 0.0 { change / price } else { 0.0 },
        volume: parse_num(&global["06. volume"]).max(0.0) as u64,
        previous_close: Some(parse_num(&global["08. previous close"])),
        high: Some(parse_num(&global["03. high"])),
        low: Some(parse_num(&global["04. low"])),
        open: Some(parse_num(&global["02. open"])),
        ..Quote::default()
    }
}

fn params(pairs: &[(&str, &str)]) -> Map<String, Value> {
    pairs.iter().map(|(k, v)| ((*k).to_string(), json!(v))).collect()
}

fn has_nonempty_array(v: &Value, field: &str) -> bool {
    v[field].as_array().map(|a| !a.is_empty()).unwrap_or(false)
}

/// Aggregates the providers behind one call per ETF, with mock fallbacks.
pub struct EtfDataService {
    iex: ApiClient,
    alpha: ApiClient,
    finnhub: ApiClient,
    eodhd: ApiClient,
    cbonds: ApiClient,
    cache: Arc<ApiCache>,
}

impl EtfDataService {
    pub fn new(cfg: &Config, source: Arc<dyn MarketSource>) -> Self {
        let configs: Vec<ProviderConfig> =
            Provider::HTTP.iter().map(|p| ProviderConfig::from_config(*p, cfg)).collect();
        Self::with_providers(cfg, source, configs)
    }

    /// Live HTTP when `LIVE_MARKET` is set, otherwise mock data only.
    pub fn from_config(cfg: &Config) -> Self {
        let source: Arc<dyn MarketSource> = if cfg.use_live_market {
            Arc::new(HttpSource::new(Duration::from_secs(cfg.http_timeout_secs)))
        } else {
            Arc::new(OfflineSource)
        };
        Self::new(cfg, source)
    }

    pub fn with_providers(
        cfg: &Config,
        source: Arc<dyn MarketSource>,
        configs: Vec<ProviderConfig>,
    ) -> Self {
        let cache = Arc::new(ApiCache::new());
        let retry = RetryConfig::with_retries(cfg.market_retries);
        let build = |provider: Provider| {
            let pc = configs
                .iter()
                .find(|c| c.provider == provider)
                .cloned()
                .unwrap_or_else(|| ProviderConfig::from_config(provider, cfg));
            ApiClient::new(pc, source.clone(), cache.clone(), retry.clone(), cfg.circuit_threshold)
        };
        Self {
            iex: build(Provider::IexCloud),
            alpha: build(Provider::AlphaVantage),
            finnhub: build(Provider::Finnhub),
            eodhd: build(Provider::Eodhd),
            cbonds: build(Provider::Cbonds),
            cache,
        }
    }

    pub fn cache(&self) -> &ApiCache {
        &self.cache
    }

    async fn quote(&self, symbol: &str) -> Sourced<Quote> {
        let p = params(&[("symbol", symbol)]);
        if let Some(data) = self.iex.request("quote", &p).await {
            let has_price = data["latestPrice"].as_f64().map(|v| v != 0.0).unwrap_or(false);
            if has_price {
                if let Ok(q) = serde_json::from_value::<Quote>(data) {
                    return Sourced::live(q, Provider::IexCloud);
                }
            }
        }
        if let Some(data) = self.alpha.request("quote", &p).await {
            if data.get("Global Quote").is_some() {
                return Sourced::live(transform_alpha_vantage_quote(&data["Global Quote"]), Provider::AlphaVantage);
            }
        }
        Sourced::mock(mock::quote(symbol, &mut rand::thread_rng()))
    }

    async fn holdings(&self, isin: &str) -> Sourced<Value> {
        let symbol = isin_to_symbol(isin);
        if let Some(data) = self.finnhub.request("holdings", &params(&[("symbol", &symbol)])).await {
            if has_nonempty_array(&data, "holdings") {
                return Sourced::live(data, Provider::Finnhub);
            }
        }
        Sourced::mock(mock::holdings(isin, &mut rand::thread_rng()))
    }

    async fn fundamentals(&self, isin: &str) -> Sourced<Value> {
        let symbol = isin_to_symbol(isin);
        let p = params(&[("symbol", &symbol)]);
        if let Some(data) = self.eodhd.request("fundamentals", &p).await {
            if data.get("General").is_some() || data.get("Technicals").is_some() {
                return Sourced::live(data, Provider::Eodhd);
            }
        }
        if let Some(data) = self.alpha.request("overview", &p).await {
            if data.get("Symbol").is_some() {
                return Sourced::live(data, Provider::AlphaVantage);
            }
        }
        Sourced::mock(mock::fundamentals(isin, &mut rand::thread_rng()))
    }

    async fn risk(&self, isin: &str) -> Sourced<Value> {
        if let Some(data) = self.cbonds.request("risk", &params(&[("isin", isin)])).await {
            if data.get("volatility").is_some() || data.get("sharpeRatio").is_some() {
                return Sourced::live(data, Provider::Cbonds);
            }
        }
        Sourced::mock(mock::risk(isin, &mut rand::thread_rng()))
    }

    /// Quote, holdings, fundamentals and risk for one ETF, cached for 30 minutes.
    pub async fn etf_data(&self, isin: &str, symbol: &str) -> EtfData {
        let cache_key = format!("etf_complete_{}", isin);
        if let Some(cached) = self.cache.get(&cache_key) {
            if let Ok(data) = serde_json::from_value::<EtfData>(cached) {
                return data;
            }
        }

        let _scope = ProfileScope::with_context("etf_data", &[("isin", v_str(isin))]);
        let (quote, holdings, fundamentals, risk) =
            tokio::join!(self.quote(symbol), self.holdings(isin), self.fundamentals(isin), self.risk(isin));

        let mut sources = BTreeMap::new();
        let mut errors = Vec::new();
        for (part, label, source) in [
            ("quote", "Quote", quote.source),
            ("holdings", "Holdings", holdings.source),
            ("fundamentals", "Fundamentals", fundamentals.source),
            ("riskMetrics", "Risk", risk.source),
        ] {
            sources.insert(part.to_string(), source.to_string());
            if source == MOCK {
                errors.push(format!("{}: providers unavailable, using mock data", label));
            }
        }

        let data = EtfData {
            isin: isin.to_string(),
            symbol: symbol.to_string(),
            quote: Some(quote.value),
            holdings: Some(holdings.value),
            fundamentals: Some(fundamentals.value),
            risk_metrics: Some(risk.value),
            last_updated: Utc::now().to_rfc3339(),
            errors,
            sources,
        };

        if data.used_mock() {
            log(
                Level::Debug,
                Domain::Market,
                "mock_fallback",
                obj(&[("isin", v_str(isin)), ("errors", json!(data.errors))]),
            );
        }
        if let Ok(v) = serde_json::to_value(&data) {
            self.cache.set(cache_key, v, COMPLETE_TTL);
        }
        data
    }

    /// Daily price history for `range` ("1y", "6m", other → 30 days).
    pub async fn historical(&self, symbol: &str, range: &str) -> Value {
        let cache_key = format!("historical_{}_{}", symbol, range);
        if let Some(cached) = self.cache.get(&cache_key) {
            return cached;
        }
        match self.iex.request("chart", &params(&[("symbol", symbol), ("range", range)])).await {
            Some(data) if data.is_array() => {
                self.cache.set(cache_key, data.clone(), HISTORY_TTL);
                data
            }
            _ => mock::historical(symbol, range, &mut rand::thread_rng()),
        }
    }

    pub async fn borsa_italiana(&self, isin: &str) -> Value {
        mock::borsa_italiana(isin, &mut rand::thread_rng())
    }

    /// Refreshes every `(isin, symbol)` pair concurrently.
    pub async fn refresh(&self, list: &[(String, String)]) -> Vec<EtfData> {
        let started = std::time::Instant::now();
        let results = join_all(list.iter().map(|(isin, symbol)| self.etf_data(isin, symbol))).await;
        log(
            Level::Info,
            Domain::Market,
            "refresh",
            obj(&[
                ("count", json!(results.len())),
                ("elapsed_ms", json!(started.elapsed().as_millis() as u64)),
            ]),
        );
        results
    }

    /// Probes each provider with a known instrument.
    pub async fn connection_report(&self) -> Vec<ConnectionStatus> {
        let probes: [(&ApiClient, &str, Map<String, Value>); 5] = [
            (&self.iex, "quote", params(&[("symbol", "AAPL")])),
            (&self.alpha, "quote", params(&[("symbol", "AAPL")])),
            (&self.finnhub, "quote", params(&[("symbol", "AAPL")])),
            (&self.eodhd, "fundamentals", params(&[("symbol", "AAPL.US")])),
            (&self.cbonds, "search", params(&[("q", "ETF")])),
        ];
        let labels = [
            Provider::IexCloud,
            Provider::AlphaVantage,
            Provider::Finnhub,
            Provider::Eodhd,
            Provider::Cbonds,
        ];
        let outcomes = join_all(probes.iter().map(|(client, endpoint, p)| client.request(endpoint, p))).await;
        labels
            .iter()
            .zip(outcomes)
            .map(|(provider, outcome)| ConnectionStatus {
                name: provider.label().to_string(),
                status: if outcome.is_some() { "connected" } else { "failed" }.to_string(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::FetchError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use url::Url;

    /// Answers by host: IEX fails, Alpha Vantage serves a global quote, Finnhub
    /// returns empty holdings, Cbonds returns risk metrics.
    struct ScriptedSource {
        calls: AtomicU32,
    }

    #[async_trait]
    impl MarketSource for ScriptedSource {
        async fn get_json(&self, url: &Url) -> Result<Value, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let host = url.host_str().unwrap_or_default();
            match host {
                "www.alphavantage.co" if url.as_str().contains("GLOBAL_QUOTE") => Ok(json!({
                    "Global Quote": {
                        "01. symbol": "VWCE",
                        "05. price": "108.50",
                        "09. change": "1.085",
                        "06. volume": "12000",
                        "08. previous close": "107.415",
                    }
                })),
                "finnhub.io" => Ok(json!({ "holdings": [] })),
                "api.cbonds.com" => Ok(json!({ "volatility": 0.148, "sharpeRatio": 1.1 })),
                _ => Err(FetchError::Status(404)),
            }
        }
    }

    fn service() -> (EtfDataService, Arc<ScriptedSource>) {
        let source = Arc::new(ScriptedSource { calls: AtomicU32::new(0) });
        let mut cfg = Config::from_env();
        cfg.market_retries = 0;
        (EtfDataService::new(&cfg, source.clone()), source)
    }

    #[test]
    fn alpha_vantage_transform() {
        let q = transform_alpha_vantage_quote(&json!({
            "01. symbol": "SPY", "05. price": "200", "09. change": "-4", "06. volume": "10"
        }));
        assert_eq!(q.symbol, "SPY");
        assert!((q.change_percent + 0.02).abs() < 1e-12);
        assert_eq!(q.volume, 10);

        let zero = transform_alpha_vantage_quote(&json!({ "05. price": "0", "09. change": "1" }));
        assert_eq!(zero.change_percent, 0.0);
    }

    #[tokio::test]
    async fn fallback_chain_and_sources() {
        let (svc, _) = service();
        let data = svc.etf_data("IE00BK5BQT80", "VWCE").await;

        assert_eq!(data.sources["quote"], "alphaVantage");
        assert!((data.quote.as_ref().unwrap().latest_price - 108.5).abs() < 1e-9);
        assert_eq!(data.sources["holdings"], MOCK);
        assert_eq!(data.sources["fundamentals"], MOCK);
        assert_eq!(data.sources["riskMetrics"], "cbonds");
        assert_eq!(data.errors.len(), 2);
        assert!(data.errors[0].starts_with("Holdings"));
    }

    #[tokio::test]
    async fn complete_record_is_cached() {
        let (svc, source) = service();
        let first = svc.etf_data("IE00BK5BQT80", "VWCE").await;
        let calls = source.calls.load(Ordering::SeqCst);
        let second = svc.etf_data("IE00BK5BQT80", "VWCE").await;
        assert_eq!(first, second);
        assert_eq!(source.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn history_falls_back_to_mock_length() {
        let (svc, _) = service();
        assert_eq!(svc.historical("VWCE", "6m").await.as_array().unwrap().len(), 126);
    }

    #[tokio::test]
    async fn refresh_and_connection_report() {
        let (svc, _) = service();
        let list = vec![
            ("IE00BK5BQT80".to_string(), "VWCE".to_string()),
            ("IE00B5BMR087".to_string(), "CSPX".to_string()),
        ];
        assert_eq!(svc.refresh(&list).await.len(), 2);

        let report = svc.connection_report().await;
        assert_eq!(report.len(), 5);
        assert_eq!(report[0].status, "failed");
        assert_eq!(report[1].status, "connected");
    }
}
