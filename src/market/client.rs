use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use super::cache::ApiCache;
use super::circuit::CircuitBreaker;
use super::rate_limit::RateLimiter;
use super::retry::{is_retryable_http_error, is_retryable_network_error, retry_async, RetryConfig};
use super::ProviderConfig;
use crate::logging::{agg_increment, log_provider_call};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error! status: {0}")]
    Status(u16),
    #[error("network error: {message}")]
    Network { message: String, retryable: bool },
    #[error("invalid response body: {0}")]
    Decode(String),
    #[error("provider offline")]
    Offline,
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status(code) => is_retryable_http_error(*code),
            FetchError::Network { retryable, .. } => *retryable,
            FetchError::Decode(_) | FetchError::Offline => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return FetchError::Status(status.as_u16());
        }
        if e.is_decode() {
            return FetchError::Decode(e.to_string());
        }
        FetchError::Network { retryable: is_retryable_network_error(&e), message: e.to_string() }
    }
}

/// Transport seam for provider requests.
#[async_trait]
pub trait MarketSource: Send + Sync {
    async fn get_json(&self, url: &Url) -> Result<Value, FetchError>;
}

pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .user_agent("GuadagnareConETF/1.0")
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }
}

#[async_trait]
impl MarketSource for HttpSource {
    async fn get_json(&self, url: &Url) -> Result<Value, FetchError> {
        let resp = self
            .client
            .get(url.clone())
            .header("Accept", "application/json")
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(resp.json::<Value>().await?)
    }
}

/// Source used when live market data is disabled; every call falls back to mock data.
pub struct OfflineSource;

#[async_trait]
impl MarketSource for OfflineSource {
    async fn get_json(&self, _url: &Url) -> Result<Value, FetchError> {
        Err(FetchError::Offline)
    }
}

/// One provider's client: cache, quota, breaker and retries in front of the source.
pub struct ApiClient {
    config: ProviderConfig,
    source: Arc<dyn MarketSource>,
    limiter: Option<RateLimiter>,
    breaker: Mutex<CircuitBreaker>,
    cache: Arc<ApiCache>,
    retry: RetryConfig,
    max_wait: Duration,
}

impl ApiClient {
    pub fn new(
        config: ProviderConfig,
        source: Arc<dyn MarketSource>,
        cache: Arc<ApiCache>,
        retry: RetryConfig,
        circuit_threshold: u32,
    ) -> Self {
        let provider = config.provider.key();
        let limiter = config
            .provider
            .rate_limit()
            .map(|(limit, window)| RateLimiter::per_window(limit, window));
        Self {
            config,
            source,
            limiter,
            breaker: Mutex::new(CircuitBreaker::new(provider, circuit_threshold, Duration::from_secs(60))),
            cache,
            retry,
            max_wait: Duration::from_secs(2),
        }
    }

    pub fn provider_key(&self) -> &'static str {
        self.config.provider.key()
    }

    pub fn build_url(&self, endpoint: &str, params: &Map<String, Value>) -> Option<Url> {
        let template = self.config.provider.endpoint(endpoint)?;
        let mut path = template.to_string();
        for (k, v) in params {
            let value = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            path = path.replace(&format!("{{{}}}", k), &value);
        }
        let mut url = Url::parse(&format!("{}{}", self.config.base_url, path)).ok()?;
        if let Some(param) = self.config.provider.auth_param() {
            if !self.config.credential.is_empty() {
                url.query_pairs_mut().append_pair(param, &self.config.credential);
            }
        }
        Some(url)
    }

    fn cache_key(endpoint: &str, params: &Map<String, Value>) -> String {
        format!("{}_{}", endpoint, Value::Object(params.clone()))
    }

    /// Fetches `endpoint`, returning `None` when the provider is unavailable
    /// so callers can fall back to mock data.
    pub async fn request(&self, endpoint: &str, params: &Map<String, Value>) -> Option<Value> {
        let provider = self.provider_key();
        let key = format!("{}:{}", provider, Self::cache_key(endpoint, params));
        if let Some(hit) = self.cache.get(&key) {
            return Some(hit);
        }

        let url = self.build_url(endpoint, params)?;

        let allowed = self.breaker.lock().map(|mut b| b.allow()).unwrap_or(true);
        if !allowed {
            log_provider_call(provider, endpoint, "circuit_open", 0);
            return None;
        }

        if let Some(limiter) = &self.limiter {
            if !limiter.acquire_within(self.max_wait).await {
                log_provider_call(provider, endpoint, "rate_limited", 0);
                return None;
            }
        }

        let mut attempts = 0u32;
        let source = self.source.clone();
        let result = retry_async(&self.retry, endpoint, || {
            attempts += 1;
            let source = source.clone();
            let url = url.clone();
            async move { source.get_json(&url).await }
        })
        .await;

        match result {
            Ok(value) => {
                if let Ok(mut breaker) = self.breaker.lock() {
                    breaker.record_success();
                }
                log_provider_call(provider, endpoint, "ok", attempts);
                self.cache.set(key, value.clone(), self.config.cache_ttl);
                Some(value)
            }
            Err(e) => {
                if !matches!(e, FetchError::Offline) {
                    if let Ok(mut breaker) = self.breaker.lock() {
                        breaker.record_failure();
                    }
                    agg_increment("provider_failure");
                }
                log_provider_call(provider, endpoint, &e.to_string(), attempts);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::Provider;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingSource {
        calls: AtomicU32,
        status: Option<u16>,
    }

    #[async_trait]
    impl MarketSource for CountingSource {
        async fn get_json(&self, url: &Url) -> Result<Value, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.status {
                Some(code) => Err(FetchError::Status(code)),
                None => Ok(json!({ "url": url.as_str() })),
            }
        }
    }

    fn client(source: Arc<CountingSource>, provider: Provider) -> ApiClient {
        let config = ProviderConfig {
            provider,
            base_url: provider.base_url().to_string(),
            credential: "demo".into(),
            cache_ttl: provider.cache_ttl(),
        };
        let retry = RetryConfig { max_retries: 1, base: Duration::from_millis(1), ..Default::default() };
        ApiClient::new(config, source, Arc::new(ApiCache::new()), retry, 2)
    }

    fn params(symbol: &str) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("symbol".into(), json!(symbol));
        m
    }

    #[test]
    fn url_substitutes_placeholders_and_appends_credential() {
        let source = Arc::new(CountingSource { calls: AtomicU32::new(0), status: None });
        let c = client(source, Provider::Eodhd);
        let url = c.build_url("fundamentals", &params("IWDA.L")).unwrap();
        assert_eq!(url.as_str(), "https://eodhd.com/api/fundamentals/IWDA.L?api_token=demo");
        assert!(c.build_url("unknown", &params("X")).is_none());
    }

    #[tokio::test]
    async fn second_request_is_served_from_cache() {
        let source = Arc::new(CountingSource { calls: AtomicU32::new(0), status: None });
        let c = client(source.clone(), Provider::Finnhub);
        let first = c.request("quote", &params("VWCE")).await.unwrap();
        let second = c.request("quote", &params("VWCE")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_open_the_circuit() {
        let source = Arc::new(CountingSource { calls: AtomicU32::new(0), status: Some(500) });
        let c = client(source.clone(), Provider::Finnhub);
        assert!(c.request("quote", &params("A")).await.is_none());
        assert!(c.request("quote", &params("B")).await.is_none());
        let before = source.calls.load(Ordering::SeqCst);
        assert!(c.request("quote", &params("C")).await.is_none());
        assert_eq!(source.calls.load(Ordering::SeqCst), before);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let source = Arc::new(CountingSource { calls: AtomicU32::new(0), status: Some(404) });
        let c = client(source.clone(), Provider::Finnhub);
        assert!(c.request("quote", &params("A")).await.is_none());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }
}
