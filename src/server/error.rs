use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::EtfError;
use crate::logging::{log, obj, v_str, Domain, Level};

/// Everything a handler can fail with, rendered as `{"error", "code"}`.
#[derive(Debug)]
pub enum AppError {
    Domain(EtfError),
    Unauthorized(String),
    BadRequest(String),
    Internal(String),
}

impl From<EtfError> for AppError {
    fn from(err: EtfError) -> Self {
        AppError::Domain(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

fn status_of(err: &EtfError) -> StatusCode {
    match err {
        EtfError::NotFound(_) => StatusCode::NOT_FOUND,
        EtfError::Validation(_) | EtfError::Limit(_) | EtfError::InvalidBackup(_) => StatusCode::BAD_REQUEST,
        EtfError::Duplicate(_) => StatusCode::CONFLICT,
        EtfError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        EtfError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        EtfError::Upstream { .. } => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Domain(err) => {
                let status = status_of(&err);
                if status.is_server_error() {
                    log(Level::Error, Domain::Http, "handler_failed", obj(&[("error", v_str(&err.to_string()))]));
                }
                let mut body = json!({"error": err.to_string(), "code": status.as_u16()});
                if let EtfError::Validation(errors) = &err {
                    body["errors"] = json!(errors);
                }
                let mut response = (status, Json(body)).into_response();
                if let EtfError::RateLimited { retry_after_secs } = err {
                    if let Ok(v) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                        response.headers_mut().insert(header::RETRY_AFTER, v);
                    }
                }
                response
            }
            AppError::Unauthorized(msg) => plain(StatusCode::UNAUTHORIZED, msg),
            AppError::BadRequest(msg) => plain(StatusCode::BAD_REQUEST, msg),
            AppError::Internal(msg) => {
                log(Level::Error, Domain::Http, "handler_failed", obj(&[("error", v_str(&msg))]));
                plain(StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        }
    }
}

fn plain(status: StatusCode, msg: String) -> Response {
    (status, Json(json!({"error": msg, "code": status.as_u16()}))).into_response()
}

pub type ApiResult<T> = Result<T, AppError>;
