//! Shared-secret middleware for the plugin/admin HTTP surface
//! (`SPEC_FULL.md` §6 "Auth").
//!
//! Unlike this codebase's static bearer-token convention (a startup-hashed
//! env var, see `sf-server`'s gateway ancestor), the admin key here is a
//! runtime setting (`UI_SHARED_API_KEY`) that can change without a
//! restart, so it is read fresh from the settings store on every request
//! rather than cached once at boot. The comparison is still constant-time.

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::ApiError;
use crate::state::AppState;

/// Minimal `application/x-www-form-urlencoded` single-key lookup, enough
/// for `?api_key=...` without pulling in a URL-encoding crate.
fn query_param(uri: &axum::http::Uri, key: &str) -> Option<String> {
    let query = uri.query()?;
    for pair in query.split('&') {
        let mut parts = pair.splitn(2, '=');
        let k = parts.next().unwrap_or("");
        let v = parts.next().unwrap_or("");
        if k == key {
            return Some(percent_decode(v));
        }
    }
    None
}

fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Axum middleware enforcing `UI_SHARED_API_KEY` on the admin plugin
/// surface. A blank setting value disables auth entirely (dev mode).
pub async fn require_admin_key(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let secret = state.settings.get_string("UI_SHARED_API_KEY", "");
    if secret.is_empty() {
        return next.run(req).await;
    }

    let provided = req
        .headers()
        .get("x-ai-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| query_param(req.uri(), "api_key"))
        .unwrap_or_default();

    let expected_hash = Sha256::digest(secret.as_bytes());
    let provided_hash = Sha256::digest(provided.as_bytes());

    if !bool::from(provided_hash.ct_eq(&expected_hash)) {
        return ApiError::unauthorized("invalid or missing API key").into_response();
    }

    next.run(req).await
}
