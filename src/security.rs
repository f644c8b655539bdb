use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Constant-time string comparison to prevent timing attacks
/// Use this for comparing API keys and other sensitive values
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Key presented by the caller: `X-API-Key` or `Authorization: Bearer`
fn presented_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        return Some(key);
    }
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Reject requests without the configured API key. No key configured = open.
pub async fn require_api_key(
    State(api_key): State<Arc<Option<String>>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = api_key.as_deref() else {
        return next.run(request).await;
    };

    let authorized = presented_key(request.headers())
        .is_some_and(|key| constant_time_compare(key, expected));
    if authorized {
        return next.run(request).await;
    }

    tracing::warn!(
        "Rejected request to {} with missing or bad API key",
        request.uri().path()
    );
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "unauthorized",
            "message": "Missing or invalid API key",
        })),
    )
        .into_response()
}
