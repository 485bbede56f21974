use std::sync::Arc;
use crate::rate_limit::{RateLimitScope, RateLimiter};
use crate::upstream::UpstreamClient;
// app's shared state, built once in main and handed to every handler

pub struct AppState {
    pub upstream: UpstreamClient,
    pub rate_limiter: Arc<RateLimiter>,
    pub rate_limit_scope: RateLimitScope,
    pub max_body_bytes: usize,
}
