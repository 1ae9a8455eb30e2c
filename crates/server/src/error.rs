//! HTTP error mapping: every handler error becomes `{"detail": {code,
//! message}}` with a status code picked from the enumerated error codes
//! (`SPEC_FULL.md` §6, §7).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, code, message)
    }

    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "detail": { "code": self.code, "message": self.message } });
        (self.status, Json(body)).into_response()
    }
}

/// Several stores pack one of the enumerated error codes (`SPEC_FULL.md`
/// §6) into a `NotFound`/`Conflict`/`Validation` message, either bare
/// (`"SOURCE_NOT_FOUND"`) or as a `"CODE: detail"` prefix
/// (`"DEPENDENCY_MISSING: tagger"`). Surface that code to callers instead
/// of the coarse `NOT_FOUND`/`CONFLICT`/`VALIDATION` bucket.
fn enumerated_code(message: &str) -> Option<&'static str> {
    const CODES: &[&str] = &[
        "SOURCE_DISABLED",
        "SOURCE_IMMUTABLE",
        "SOURCE_NOT_FOUND",
        "PLUGIN_NOT_FOUND",
        "PLUGIN_INACTIVE",
        "PLUGIN_REQUIRED",
        "BACKEND_TOO_OLD",
        "DEPENDENCY_MISSING",
        "DEPENDENCIES_REQUIRED",
        "DEPENDENT_PLUGINS",
        "RELOAD_FAILED",
        "INVALID_NUMBER",
        "INVALID_BOOLEAN",
        "INVALID_OPTION",
        "INVALID_JSON",
    ];
    let token = message.split(':').next().unwrap_or(message).trim();
    CODES.iter().find(|c| **c == token).copied()
}

impl From<sf_domain::Error> for ApiError {
    fn from(err: sf_domain::Error) -> Self {
        use sf_domain::Error as E;
        let status = match &err {
            E::NotFound(_) => StatusCode::NOT_FOUND,
            E::Conflict(_) => StatusCode::CONFLICT,
            E::Validation(_) | E::Json(_) => StatusCode::BAD_REQUEST,
            E::Auth(_) => StatusCode::UNAUTHORIZED,
            E::Plugin(_) | E::Config(_) | E::Io(_) | E::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let inner = match &err {
            E::NotFound(m) | E::Conflict(m) | E::Validation(m) | E::Plugin(m) => m.as_str(),
            _ => "",
        };
        let code = enumerated_code(inner).unwrap_or_else(|| err.code());
        Self {
            status,
            code,
            message: err.to_string(),
        }
    }
}
