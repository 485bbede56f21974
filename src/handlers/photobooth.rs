use axum::{
    Json,
    extract::{ConnectInfo, State, rejection::JsonRejection},
    http::Extensions,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::ProxyError;
use crate::metrics::{RATE_LIMITED, REQUEST_TOTAL, WINDOW_LOAD};
use crate::rate_limit::Admission;
use crate::state::AppState;

// null, {} and [] carry nothing worth forwarding
fn is_empty_payload(payload: &Value) -> bool {
    match payload {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

pub async fn photobooth_handler(
    State(state): State<Arc<AppState>>,
    extensions: Extensions,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    REQUEST_TOTAL.inc();

    let peer = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = state.rate_limit_scope.key_for(peer);

    let admission = state.rate_limiter.check(&key);
    WINDOW_LOAD.set(state.rate_limiter.load(&key) as f64);

    if let Admission::Rejected { retry_after } = admission {
        RATE_LIMITED.inc();
        tracing::warn!(%key, ?retry_after, "rate limit exceeded");
        return ProxyError::RateLimited { retry_after }.into_response();
    }

    match proxy(&state, payload).await {
        Ok(body) => Json(body).into_response(),
        Err(response) => response,
    }
}

async fn proxy(
    state: &AppState,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Value, Response> {
    if !state.upstream.has_credential() {
        tracing::error!("proxy request received but no API key is configured");
        return Err(ProxyError::MissingCredential.into_response());
    }

    let Json(payload) = payload.map_err(|rejection| {
        tracing::debug!(error = %rejection, "rejected request body");
        ProxyError::from(rejection).into_response()
    })?;

    if is_empty_payload(&payload) {
        return Err(ProxyError::EmptyPayload.into_response());
    }

    state
        .upstream
        .forward(&payload)
        .await
        .map_err(IntoResponse::into_response)
}
