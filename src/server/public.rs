//! Public site API.

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use super::error::{ApiResult, AppError};
use super::SharedState;
use crate::affiliate;
use crate::blog::scheduler::run_slot;
use crate::catalog::{SearchFilters, SortKey, SortOrder};
use crate::comparator::Comparison;
use crate::error::EtfError;
use crate::fire::{self, FireInput};
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::market::isin_to_symbol;
use crate::portfolio::{self, Portfolio};
use crate::seo;
use crate::simulator::{self, SimulationInput, DEFAULT_VOLATILITY};
use crate::watchlist;

pub async fn health(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "etfs": state.catalog.len(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Flat query form of the search filters plus sorting.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EtfQuery {
    pub search: Option<String>,
    pub sector: Option<String>,
    pub region: Option<String>,
    pub ter: Option<f64>,
    pub distribution: Option<String>,
    pub min_aum: Option<f64>,
    pub max_aum: Option<f64>,
    pub risk_level: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
}

impl EtfQuery {
    fn filters(&self) -> SearchFilters {
        let d = SearchFilters::default();
        SearchFilters {
            search: self.search.clone().unwrap_or(d.search),
            sector: self.sector.clone().unwrap_or(d.sector),
            region: self.region.clone().unwrap_or(d.region),
            ter: self.ter.unwrap_or(d.ter),
            distribution: self.distribution.clone().unwrap_or(d.distribution),
            min_aum: self.min_aum.unwrap_or(d.min_aum),
            max_aum: self.max_aum.unwrap_or(d.max_aum),
            risk_level: self.risk_level.clone().unwrap_or(d.risk_level),
        }
    }
}

pub async fn list_etfs(State(state): State<SharedState>, Query(q): Query<EtfQuery>) -> ApiResult<Json<Value>> {
    let key: SortKey = match q.sort.as_deref() {
        Some(raw) => raw.parse().map_err(AppError::BadRequest)?,
        None => SortKey::default(),
    };
    let order: SortOrder = match q.order.as_deref() {
        Some(raw) => raw.parse().map_err(AppError::BadRequest)?,
        None => SortOrder::default(),
    };
    let etfs = state.catalog.search(&q.filters(), key, order);
    Ok(Json(json!({ "count": etfs.len(), "etfs": etfs })))
}

fn not_found_etf(key: &str) -> AppError {
    EtfError::NotFound(format!("ETF non trovato: {}", key)).into()
}

pub async fn etf_detail(State(state): State<SharedState>, Path(isin): Path<String>) -> ApiResult<Json<Value>> {
    let etf = state.catalog.resolve(&isin).ok_or_else(|| not_found_etf(&isin))?;
    Ok(Json(json!(etf)))
}

fn symbol_for(state: &SharedState, isin: &str) -> String {
    match state.catalog.by_isin(isin) {
        Some(etf) => isin_to_symbol(&etf.isin),
        None => isin_to_symbol(isin),
    }
}

pub async fn etf_live(State(state): State<SharedState>, Path(isin): Path<String>) -> Json<Value> {
    let symbol = symbol_for(&state, &isin);
    let data = state.market.etf_data(&isin, &symbol).await;
    Json(json!(data))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_range")]
    pub range: String,
}

fn default_range() -> String {
    "1y".to_string()
}

pub async fn etf_history(
    State(state): State<SharedState>,
    Path(isin): Path<String>,
    Query(q): Query<HistoryQuery>,
) -> Json<Value> {
    let symbol = symbol_for(&state, &isin);
    Json(state.market.historical(&symbol, &q.range).await)
}

pub async fn etf_seo(State(state): State<SharedState>, Path(isin): Path<String>) -> Json<Value> {
    let symbol = symbol_for(&state, &isin);
    let data = state.market.etf_data(&isin, &symbol).await;
    let url = format!("{}/etf/{}", state.config.site_url.trim_end_matches('/'), isin);
    Json(json!(seo::page_meta(&data, &url)))
}

pub async fn sitemap(State(state): State<SharedState>) -> Response {
    let entries = seo::sitemap(state.catalog.all(), &state.config.site_url, Utc::now());
    ([(header::CONTENT_TYPE, "application/xml; charset=utf-8")], seo::sitemap_xml(&entries)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct CompareRequest {
    pub etfs: Vec<String>,
}

pub async fn compare(State(state): State<SharedState>, Json(req): Json<CompareRequest>) -> ApiResult<Json<Value>> {
    let cmp = Comparison::from_keys(&state.catalog, &req.etfs)?;
    Ok(Json(json!({
        "etfs": cmp.etfs(),
        "analysis": cmp.analyze()?,
        "table": cmp.table(),
        "recommendation": cmp.recommendation()?,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingRequest {
    pub etf_id: String,
    pub allocation: f64,
}

#[derive(Debug, Deserialize)]
pub struct PortfolioRequest {
    pub holdings: Vec<HoldingRequest>,
    #[serde(default)]
    pub iterations: Option<usize>,
}

pub async fn analyze_portfolio(
    State(state): State<SharedState>,
    Json(req): Json<PortfolioRequest>,
) -> ApiResult<Json<Value>> {
    let mut p = Portfolio::new();
    for h in &req.holdings {
        let etf = state.catalog.resolve(&h.etf_id).ok_or_else(|| not_found_etf(&h.etf_id))?;
        p.push_with_allocation(etf.clone(), h.allocation)?;
    }
    let iterations = req.iterations.unwrap_or(state.config.monte_carlo_iterations);
    let body = tokio::task::spawn_blocking(move || {
        let analysis = p.analysis(&mut rand::thread_rng(), iterations)?;
        let total = p.total_allocation();
        Ok::<_, EtfError>(json!({
            "analysis": analysis,
            "validation": p.validate().message(total),
        }))
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(body))
}

pub async fn portfolio_templates() -> Json<Value> {
    Json(json!(portfolio::templates()))
}

pub async fn simulate(Json(input): Json<SimulationInput>) -> ApiResult<Json<Value>> {
    let sim = simulator::simulate(&input)?;
    let scenarios = simulator::scenarios(&input)?;
    Ok(Json(json!({ "simulation": sim, "scenarios": scenarios })))
}

#[derive(Debug, Deserialize)]
pub struct MonteCarloRequest {
    #[serde(flatten)]
    pub input: SimulationInput,
    pub iterations: Option<usize>,
    pub volatility: Option<f64>,
    pub seed: Option<u64>,
}

/// CPU-bound, so it runs off the async workers.
pub async fn monte_carlo(
    State(state): State<SharedState>,
    Json(req): Json<MonteCarloRequest>,
) -> ApiResult<Json<Value>> {
    let iterations = req.iterations.unwrap_or(state.config.monte_carlo_iterations);
    let volatility = req.volatility.unwrap_or(DEFAULT_VOLATILITY);
    let seed = req.seed.unwrap_or_else(rand::random);
    let input = req.input;
    let result = tokio::task::spawn_blocking(move || simulator::monte_carlo(&input, iterations, volatility, seed))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(json!(result)))
}

pub async fn fire(Json(input): Json<FireInput>) -> ApiResult<Json<Value>> {
    let report = fire::report(&input)?;
    let share = fire::share_text(&report.result);
    Ok(Json(json!({ "report": report, "share": share })))
}

pub async fn sections(State(state): State<SharedState>) -> ApiResult<Json<Value>> {
    let list = state.with_console(|c| {
        Ok(c.visible_sections()
            .into_iter()
            .map(|(key, s)| json!({ "key": key, "name": s.name, "order": s.order }))
            .collect::<Vec<_>>())
    })?;
    Ok(Json(json!(list)))
}

#[derive(Debug, Default, Deserialize)]
pub struct BrokerQuery {
    pub category: Option<String>,
}

pub async fn brokers(State(state): State<SharedState>, Query(q): Query<BrokerQuery>) -> ApiResult<Json<Value>> {
    let category = q.category.unwrap_or_else(|| "all".to_string());
    let partners: Vec<Value> = affiliate::filter_by_category(&category)
        .into_iter()
        .map(|b| {
            let categories = affiliate::categories(&b);
            let stars = affiliate::star_rating(b.rating);
            let mut v = json!(b);
            v["categories"] = json!(categories);
            v["stars"] = json!(stars);
            v
        })
        .collect();
    let listed: Vec<_> =
        state.with_console(|c| Ok(c.brokers().iter().filter(|b| b.active).cloned().collect::<Vec<_>>()))?;
    let popular = affiliate::popular_brokers(&state.lock_store(), 3)?;
    Ok(Json(json!({
        "partners": partners,
        "brokers": listed,
        "recommendations": affiliate::recommendations(),
        "popular": popular,
    })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ClickRequest {
    pub source: String,
    pub url: String,
}

pub async fn broker_click(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    headers: HeaderMap,
    body: Option<Json<ClickRequest>>,
) -> ApiResult<Response> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let user_agent = headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok()).unwrap_or("NA");
    let source = if req.source.is_empty() { "api" } else { req.source.as_str() };
    let outcome = {
        let mut store = state.lock_store();
        affiliate::track_click(&mut store, &key, source, &req.url, user_agent, Utc::now())?
    };
    let cookie = outcome.cookie.clone();
    Ok(([(header::SET_COOKIE, cookie)], Json(json!(outcome))).into_response())
}

#[derive(Debug, Deserialize)]
pub struct EventRequest {
    pub name: String,
    #[serde(default)]
    pub data: Value,
}

pub async fn track_event(State(state): State<SharedState>, Json(req): Json<EventRequest>) -> ApiResult<StatusCode> {
    if req.name.trim().is_empty() {
        return Err(EtfError::validation("Nome evento mancante").into());
    }
    let mut store = state.lock_store();
    affiliate::track_event(&mut store, &req.name, req.data, Utc::now())?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ArticleQuery {
    pub category: Option<String>,
    pub featured: Option<bool>,
}

pub async fn articles(State(state): State<SharedState>, Query(q): Query<ArticleQuery>) -> Json<Value> {
    let store = state.lock_articles();
    let list: Vec<_> = store
        .published()
        .into_iter()
        .filter(|a| q.category.as_deref().map_or(true, |c| a.category == c))
        .filter(|a| q.featured.map_or(true, |f| a.featured == f))
        .cloned()
        .collect();
    let ai_count = list.iter().filter(|a| a.ai_generated).count();
    Json(json!({
        "count": list.len(),
        "ai_count": ai_count,
        "articles": list,
        "categories": store.category_stats(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

fn not_found_article(id: &str) -> AppError {
    EtfError::NotFound(format!("Articolo non trovato: {}", id)).into()
}

/// Counts a view on every read.
pub async fn article(State(state): State<SharedState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let mut store = state.lock_articles();
    if !store.by_id(&id).is_some_and(|a| a.published) {
        return Err(not_found_article(&id));
    }
    store.record_view(&id)?;
    let article = store.by_id(&id).cloned().ok_or_else(|| not_found_article(&id))?;
    Ok(Json(json!(article)))
}

pub async fn like_article(State(state): State<SharedState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let mut store = state.lock_articles();
    let likes = store.like(&id)?.ok_or_else(|| not_found_article(&id))?;
    Ok(Json(json!({ "id": id, "likes": likes })))
}

pub async fn status(State(state): State<SharedState>) -> Json<Value> {
    let cfg = &state.config;
    let generated = std::fs::read_dir(&cfg.generated_dir)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .filter(|e| e.path().extension().is_some_and(|x| x == "json"))
                .count()
        })
        .unwrap_or(0);
    let files = json!({
        "generated_dir": cfg.generated_dir.exists(),
        "processed_dir": cfg.processed_dir.exists(),
        "blog_data": cfg.blog_data_path.exists(),
    });
    let ready = files.as_object().is_some_and(|m| m.values().all(|v| v == &Value::Bool(true)));
    Json(json!({
        "status": "online",
        "timestamp": Utc::now().to_rfc3339(),
        "files": files,
        "generated_articles": generated,
        "system_ready": ready,
        "articles": state.lock_articles().stats(Utc::now()),
    }))
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(default = "default_count")]
    pub count: usize,
    #[serde(default = "default_kind", rename = "type")]
    pub kind: String,
}

fn default_count() -> usize {
    2
}

fn default_kind() -> String {
    "manual".to_string()
}

/// Starts generation plus import in the background and answers immediately.
pub async fn generate_articles(
    State(state): State<SharedState>,
    body: Option<Json<GenerateRequest>>,
) -> ApiResult<Json<Value>> {
    let req = body.map(|Json(r)| r).unwrap_or(GenerateRequest { count: default_count(), kind: default_kind() });
    let count = if req.kind == "test" { 1 } else { req.count };
    if count == 0 || count > 10 {
        return Err(EtfError::validation("Il numero di articoli deve essere tra 1 e 10").into());
    }
    let task_state = state.clone();
    let kind = req.kind.clone();
    tokio::task::spawn_blocking(move || {
        let mut articles = task_state.lock_articles();
        let outcome = run_slot(&task_state.generator, Some((&task_state.integration, &mut *articles)), &kind, count);
        if let Err(e) = outcome {
            log(Level::Error, Domain::Blog, "generation_failed", obj(&[("error", v_str(&e.to_string()))]));
        }
    });
    Ok(Json(json!({
        "success": true,
        "message": format!("Generazione di {} articoli avviata", count),
        "count": count,
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchRequest {
    pub etf_id: String,
}

pub async fn watchlist(State(state): State<SharedState>) -> ApiResult<Json<Value>> {
    let ids = watchlist::list(&state.lock_store())?;
    Ok(Json(json!({ "watchlist": ids })))
}

pub async fn watchlist_add(State(state): State<SharedState>, Json(req): Json<WatchRequest>) -> ApiResult<Json<Value>> {
    let etf = state.catalog.resolve(&req.etf_id).ok_or_else(|| not_found_etf(&req.etf_id))?;
    let mut store = state.lock_store();
    let added = watchlist::add(&mut store, &etf.id)?;
    Ok(Json(json!({ "added": added, "watchlist": watchlist::list(&store)? })))
}

pub async fn watchlist_remove(
    State(state): State<SharedState>,
    Json(req): Json<WatchRequest>,
) -> ApiResult<Json<Value>> {
    let mut store = state.lock_store();
    let removed = watchlist::remove(&mut store, &req.etf_id)?;
    Ok(Json(json!({ "removed": removed, "watchlist": watchlist::list(&store)? })))
}
