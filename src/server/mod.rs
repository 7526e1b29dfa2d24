//! HTTP surface: shared state, router and the background tasks the service runs.

pub mod admin;
pub mod auth;
pub mod error;
pub mod public;

use anyhow::{Context, Result};
use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use chrono::{Local, Utc};
use serde_json::json;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::admin::AdminConsole;
use crate::backup;
use crate::blog::generator::ArticleGenerator;
use crate::blog::integration::BlogIntegration;
use crate::blog::ArticleStore;
use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::EtfResult;
use crate::logging::{log, log_request, obj, v_str, Domain, Level};
use crate::market::{is_market_hours, EtfDataService};
use crate::storage::LocalStore;

pub struct AppState {
    pub config: Config,
    pub catalog: Catalog,
    pub market: EtfDataService,
    pub generator: ArticleGenerator,
    pub integration: BlogIntegration,
    store: Mutex<LocalStore>,
    articles: Mutex<ArticleStore>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: Config, catalog: Catalog, market: EtfDataService, store: LocalStore, articles: ArticleStore) -> Self {
        Self {
            generator: ArticleGenerator::new(&config.generated_dir),
            integration: BlogIntegration::new(&config.generated_dir, &config.processed_dir),
            config,
            catalog,
            market,
            store: Mutex::new(store),
            articles: Mutex::new(articles),
        }
    }

    /// Opens the SQLite store and the blog file named by the config.
    pub fn from_config(config: Config) -> Result<Self> {
        let store = LocalStore::new(&config.sqlite_path)?;
        let articles = ArticleStore::open(&config.blog_data_path)
            .with_context(|| format!("open blog store {}", config.blog_data_path.display()))?;
        let market = EtfDataService::from_config(&config);
        Ok(Self::new(config, Catalog::bundled()?, market, store, articles))
    }

    pub fn lock_store(&self) -> MutexGuard<'_, LocalStore> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn lock_articles(&self) -> MutexGuard<'_, ArticleStore> {
        self.articles.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Runs `f` against a freshly loaded console. Locks store before articles.
    pub fn with_console<T>(&self, f: impl FnOnce(&mut AdminConsole<'_>) -> EtfResult<T>) -> EtfResult<T> {
        let mut store = self.lock_store();
        let mut articles = self.lock_articles();
        let mut console = AdminConsole::load_with(&mut store, &mut articles, self.config.auto_backup_secs, Utc::now)?;
        if console.take_generated_password().is_some() {
            log(
                Level::Warn,
                Domain::Admin,
                "credentials_initialised",
                obj(&[("msg", v_str("admin credentials generated; set a new password from the settings"))]),
            );
        }
        f(&mut console)
    }

    /// Seeds defaults on a fresh store. Returns the admin password when this
    /// call generated it; it is not stored anywhere readable afterwards.
    pub fn seed_console(&self) -> EtfResult<Option<String>> {
        let mut store = self.lock_store();
        let mut articles = self.lock_articles();
        let mut console = AdminConsole::load_with(&mut store, &mut articles, self.config.auto_backup_secs, Utc::now)?;
        Ok(console.take_generated_password())
    }

    /// Imports new generated articles into the blog store.
    pub fn import_generated(&self) -> Result<usize> {
        let mut articles = self.lock_articles();
        self.integration.process_new_articles(&mut articles)
    }
}

async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();
    let response = next.run(req).await;
    log_request(method.as_str(), &path, response.status().as_u16(), started.elapsed().as_secs_f64() * 1000.0);
    response
}

pub fn router(state: SharedState) -> Router {
    let admin_routes = Router::new()
        .route("/api/admin/data", get(admin::data).delete(admin::reset))
        .route("/api/admin/sections/{key}/toggle", post(admin::toggle_section))
        .route("/api/admin/sections/{key}/move", post(admin::move_section))
        .route("/api/admin/brokers", post(admin::add_broker))
        .route("/api/admin/brokers/{index}", axum::routing::put(admin::edit_broker).delete(admin::delete_broker))
        .route("/api/admin/articles", get(admin::list_articles).post(admin::add_article))
        .route("/api/admin/articles/{id}", axum::routing::put(admin::edit_article).delete(admin::delete_article))
        .route("/api/admin/articles/{id}/toggle", post(admin::toggle_article))
        .route("/api/admin/settings", get(admin::settings).put(admin::save_settings))
        .route("/api/admin/backup", get(admin::download_backup).post(admin::restore_backup))
        .route("/api/admin/backup/undo", post(admin::undo_restore))
        .route("/api/admin/backups/auto", get(admin::list_auto_backups).post(admin::create_auto_backup))
        .route(
            "/api/admin/backups/auto/{index}",
            axum::routing::delete(admin::delete_auto_backup),
        )
        .route("/api/admin/backups/auto/{index}/restore", post(admin::restore_auto_backup))
        .route("/api/admin/market/status", get(admin::market_status))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_admin));

    Router::new()
        .route("/api/health", get(public::health))
        .route("/api/etfs", get(public::list_etfs))
        .route("/api/etfs/{isin}", get(public::etf_detail))
        .route("/api/etfs/{isin}/live", get(public::etf_live))
        .route("/api/etfs/{isin}/history", get(public::etf_history))
        .route("/api/etfs/{isin}/seo", get(public::etf_seo))
        .route("/api/sitemap.xml", get(public::sitemap))
        .route("/api/compare", post(public::compare))
        .route("/api/portfolio/analyze", post(public::analyze_portfolio))
        .route("/api/portfolio/templates", get(public::portfolio_templates))
        .route("/api/simulate", post(public::simulate))
        .route("/api/simulate/monte-carlo", post(public::monte_carlo))
        .route("/api/fire", post(public::fire))
        .route("/api/sections", get(public::sections))
        .route("/api/brokers", get(public::brokers))
        .route("/api/brokers/{key}/click", post(public::broker_click))
        .route("/api/events", post(public::track_event))
        .route("/api/articles", get(public::articles))
        .route("/api/articles/{id}", get(public::article))
        .route("/api/articles/{id}/like", post(public::like_article))
        .route("/api/status", get(public::status))
        .route("/api/generate-articles", post(public::generate_articles))
        .route(
            "/api/watchlist",
            get(public::watchlist).post(public::watchlist_add).delete(public::watchlist_remove),
        )
        .merge(admin_routes)
        .layer(middleware::from_fn(log_requests))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves until `shutdown` resolves.
pub async fn serve<S>(listener: TcpListener, state: SharedState, shutdown: S) -> Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    log(Level::Info, Domain::Http, "listening", obj(&[("addr", v_str(&addr.to_string()))]));
    axum::serve(listener, router(state)).with_graceful_shutdown(shutdown).await?;
    Ok(())
}

/// Takes an auto backup every `every` until `shutdown` resolves.
pub async fn run_auto_backups<S>(state: SharedState, every: Duration, shutdown: S)
where
    S: Future<Output = ()>,
{
    let mut interval = tokio::time::interval(every);
    interval.tick().await;
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = interval.tick() => {
                match state.with_console(|console| backup::create_auto_backup(console)) {
                    Ok(kept) => log(Level::Debug, Domain::Backup, "auto_backup_tick", obj(&[("kept", json!(kept))])),
                    Err(e) => log(Level::Error, Domain::Backup, "auto_backup_failed", obj(&[("error", v_str(&e.to_string()))])),
                }
            }
        }
    }
}

/// Refreshes live data for the whole catalog while the market is open.
pub async fn run_market_refresh<S>(state: SharedState, every: Duration, shutdown: S)
where
    S: Future<Output = ()>,
{
    let pairs: Vec<(String, String)> =
        state.catalog.all().iter().map(|e| (e.isin.clone(), crate::market::isin_to_symbol(&e.isin))).collect();
    let mut interval = tokio::time::interval(every);
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = interval.tick() => {
                if is_market_hours(&Local::now()) {
                    let data = state.market.refresh(&pairs).await;
                    let mocked = data.iter().filter(|d| d.used_mock()).count();
                    log(
                        Level::Info,
                        Domain::Market,
                        "catalog_refreshed",
                        obj(&[("etfs", json!(data.len())), ("mocked", json!(mocked))]),
                    );
                }
                state.market.cache().purge_expired();
            }
        }
    }
}
