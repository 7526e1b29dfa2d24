//! HMAC request signing for the admin API.
//!
//! Clients send `x-timestamp` (unix seconds) and `x-signature`, the hex
//! HMAC-SHA256 of `METHOD + path + timestamp` under the shared admin key. Mutating
//! requests also count against the `save_data` rate limit.

use axum::extract::{Request, State};
use axum::http::{HeaderMap, Method};
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::error::AppError;
use super::SharedState;
use crate::admin::security::{check_rate_limit, DEFAULT_RATE_WINDOW, SAVE_DATA_ACTION, SAVE_DATA_LIMIT};
use crate::logging::{log, obj, v_str, Domain, Level};

type HmacSha256 = Hmac<Sha256>;

fn message(method: &Method, path: &str, timestamp: i64) -> String {
    format!("{}{}{}", method.as_str(), path, timestamp)
}

pub fn sign(key: &str, method: &Method, path: &str, timestamp: i64) -> String {
    let mut mac = match HmacSha256::new_from_slice(key.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(message(method, path, timestamp).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Checks freshness and signature; comparison is constant time.
pub fn verify(
    key: &str,
    method: &Method,
    path: &str,
    timestamp: i64,
    signature: &str,
    now: i64,
    max_skew: i64,
) -> Result<(), AppError> {
    if (now - timestamp).abs() > max_skew {
        return Err(AppError::Unauthorized("Request expired".to_string()));
    }
    let sig = hex::decode(signature).map_err(|_| AppError::Unauthorized("Invalid signature".to_string()))?;
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|e| AppError::Internal(e.to_string()))?;
    mac.update(message(method, path, timestamp).as_bytes());
    mac.verify_slice(&sig).map_err(|_| AppError::Unauthorized("Invalid signature".to_string()))
}

fn credentials(headers: &HeaderMap) -> Option<(i64, String)> {
    let ts = headers.get("x-timestamp")?.to_str().ok()?.parse::<i64>().ok()?;
    let sig = headers.get("x-signature")?.to_str().ok()?.to_string();
    Some((ts, sig))
}

pub async fn require_admin(State(state): State<SharedState>, req: Request, next: Next) -> Result<Response, AppError> {
    let Some(key) = state.config.admin_hmac_key.as_deref() else {
        return Err(AppError::Unauthorized("Admin API disabled".to_string()));
    };
    let path = req.uri().path().to_string();
    let Some((ts, sig)) = credentials(req.headers()) else {
        return Err(AppError::Unauthorized("Missing timestamp or signature".to_string()));
    };
    if let Err(err) = verify(key, req.method(), &path, ts, &sig, Utc::now().timestamp(), state.config.admin_max_skew_secs) {
        log(Level::Warn, Domain::Admin, "auth_rejected", obj(&[("path", v_str(&path))]));
        return Err(err);
    }
    if req.method() != Method::GET {
        let mut store = state.lock_store();
        check_rate_limit(&mut store, SAVE_DATA_ACTION, SAVE_DATA_LIMIT, DEFAULT_RATE_WINDOW, Utc::now())?;
    }
    Ok(next.run(req).await)
}
