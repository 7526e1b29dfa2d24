//! Admin API. Every route here sits behind the signed-request middleware.

use axum::extract::{Path, State};
use axum::http::{header, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::error::ApiResult;
use super::SharedState;
use crate::admin::{ArticleInput, BrokerInput, Direction, SettingsInput};
use crate::backup;
use crate::logging::log_admin_action;

const CHECKSUM_HEADER: HeaderName = HeaderName::from_static("x-checksum");

pub async fn data(State(state): State<SharedState>) -> ApiResult<Json<Value>> {
    let export = state.with_console(|c| Ok(c.export()))?;
    Ok(Json(json!(export)))
}

/// Drops sections, brokers and settings back to their defaults.
pub async fn reset(State(state): State<SharedState>) -> ApiResult<Json<Value>> {
    let mut store = state.lock_store();
    let mut articles = state.lock_articles();
    let console = crate::admin::AdminConsole::load(&mut store, &mut articles)?;
    let console = console.reset()?;
    log_admin_action("reset", "adminData", true);
    Ok(Json(json!(console.export())))
}

pub async fn toggle_section(State(state): State<SharedState>, Path(key): Path<String>) -> ApiResult<Json<Value>> {
    let visible = state.with_console(|c| c.toggle_section(&key))?;
    Ok(Json(json!({ "key": key, "visible": visible })))
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub direction: Direction,
}

pub async fn move_section(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    Json(req): Json<MoveRequest>,
) -> ApiResult<Json<Value>> {
    let moved = state.with_console(|c| {
        let moved = c.move_section(&key, req.direction)?;
        let order: Vec<String> = c.sections_ordered().into_iter().map(|(k, _)| k.to_string()).collect();
        Ok(json!({ "moved": moved, "order": order }))
    })?;
    Ok(Json(moved))
}

pub async fn add_broker(State(state): State<SharedState>, Json(input): Json<BrokerInput>) -> ApiResult<Response> {
    let broker = state.with_console(|c| c.add_broker(input).cloned())?;
    Ok((StatusCode::CREATED, Json(json!(broker))).into_response())
}

pub async fn edit_broker(
    State(state): State<SharedState>,
    Path(index): Path<usize>,
    Json(input): Json<BrokerInput>,
) -> ApiResult<Json<Value>> {
    let broker = state.with_console(|c| c.edit_broker(index, input).cloned())?;
    Ok(Json(json!(broker)))
}

pub async fn delete_broker(State(state): State<SharedState>, Path(index): Path<usize>) -> ApiResult<Json<Value>> {
    let removed = state.with_console(|c| c.delete_broker(index))?;
    Ok(Json(json!(removed)))
}

/// All articles, drafts included.
pub async fn list_articles(State(state): State<SharedState>) -> Json<Value> {
    let store = state.lock_articles();
    Json(json!({ "count": store.len(), "articles": store.all() }))
}

pub async fn add_article(State(state): State<SharedState>, Json(input): Json<ArticleInput>) -> ApiResult<Response> {
    let article = state.with_console(|c| c.add_article(input))?;
    Ok((StatusCode::CREATED, Json(json!(article))).into_response())
}

pub async fn edit_article(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(input): Json<ArticleInput>,
) -> ApiResult<Json<Value>> {
    let article = state.with_console(|c| c.edit_article(&id, input))?;
    Ok(Json(json!(article)))
}

pub async fn toggle_article(State(state): State<SharedState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let published = state.with_console(|c| c.toggle_article(&id))?;
    Ok(Json(json!({ "id": id, "published": published })))
}

pub async fn delete_article(State(state): State<SharedState>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    state.with_console(|c| c.delete_article(&id))?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn settings(State(state): State<SharedState>) -> ApiResult<Json<Value>> {
    let settings = state.with_console(|c| Ok(c.settings()))?;
    Ok(Json(json!(settings)))
}

pub async fn save_settings(
    State(state): State<SharedState>,
    Json(input): Json<SettingsInput>,
) -> ApiResult<Json<Value>> {
    let (password_changed, settings) = state.with_console(|c| {
        let changed = c.save_settings(input)?;
        Ok((changed, c.settings()))
    })?;
    Ok(Json(json!({ "settings": settings, "passwordChanged": password_changed })))
}

/// Full backup as a downloadable file, with its sha256 in `x-checksum`.
pub async fn download_backup(State(state): State<SharedState>) -> ApiResult<Response> {
    let (body, date) = state.with_console(|c| {
        let body = backup::create_backup(c).to_json()?;
        Ok((body, c.now().date_naive()))
    })?;
    let disposition = format!("attachment; filename=\"{}\"", backup::backup_filename(date));
    let sum = backup::checksum(body.as_bytes());
    log_admin_action("export", "backup", true);
    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (CHECKSUM_HEADER, sum),
        ],
        body,
    )
        .into_response())
}

pub async fn restore_backup(State(state): State<SharedState>, Json(raw): Json<Value>) -> ApiResult<Json<Value>> {
    let data = backup::validate_backup(&raw)?;
    let counts = json!({
        "sections": data.sections.len(),
        "brokers": data.brokers.len(),
        "articles": data.articles.len(),
    });
    state.with_console(|c| backup::restore(c, data))?;
    Ok(Json(json!({ "restored": counts, "undoAvailable": true })))
}

pub async fn undo_restore(State(state): State<SharedState>) -> ApiResult<Json<Value>> {
    let export = state.with_console(|c| {
        backup::undo_restore(c)?;
        Ok(c.export())
    })?;
    Ok(Json(json!(export)))
}

/// Timestamps only; the payloads stay server-side.
pub async fn list_auto_backups(State(state): State<SharedState>) -> ApiResult<Json<Value>> {
    let list = backup::auto_backups(&state.lock_store())?;
    let entries: Vec<Value> =
        list.iter().enumerate().map(|(i, b)| json!({ "index": i, "timestamp": b.timestamp })).collect();
    Ok(Json(json!({ "count": entries.len(), "backups": entries })))
}

pub async fn create_auto_backup(State(state): State<SharedState>) -> ApiResult<Json<Value>> {
    let kept = state.with_console(backup::create_auto_backup)?;
    Ok(Json(json!({ "kept": kept })))
}

pub async fn delete_auto_backup(State(state): State<SharedState>, Path(index): Path<usize>) -> ApiResult<Json<Value>> {
    let removed = backup::delete_auto_backup(&mut state.lock_store(), index)?;
    Ok(Json(json!({ "removed": removed.timestamp })))
}

pub async fn restore_auto_backup(
    State(state): State<SharedState>,
    Path(index): Path<usize>,
) -> ApiResult<Json<Value>> {
    state.with_console(|c| backup::restore_auto_backup(c, index))?;
    Ok(Json(json!({ "restored": index, "undoAvailable": true })))
}

pub async fn market_status(State(state): State<SharedState>) -> Json<Value> {
    let report = state.market.connection_report().await;
    Json(json!({
        "providers": report,
        "cachedEntries": state.market.cache().len(),
    }))
}
