use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::time::Duration;
use thiserror::Error;

use crate::models::ErrorBody;

// Everything that can go wrong while proxying one request, each maps to a JSON envelope
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("API key not configured")]
    MissingCredential,

    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited { retry_after: Duration },

    #[error("No data provided")]
    EmptyPayload,

    #[error("Invalid request body: {message}")]
    InvalidBody { status: StatusCode, message: String },

    #[error("Request timeout")]
    Timeout,

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Invalid upstream response: {0}")]
    InvalidUpstreamBody(String),

    #[error("Upstream API error: {}", .status.as_u16())]
    Upstream { status: StatusCode, details: String },
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::MissingCredential => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::EmptyPayload => StatusCode::BAD_REQUEST,
            ProxyError::InvalidBody { status, .. } => *status,
            ProxyError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::InvalidUpstreamBody(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Upstream { status, .. } => *status,
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        let details = match self {
            ProxyError::Upstream { details, .. } => Some(details.clone()),
            _ => None,
        };
        ErrorBody {
            error: self.to_string(),
            details,
        }
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProxyError::Timeout
        } else {
            ProxyError::Transport(e.to_string())
        }
    }
}

// 400 bad json, 413 over the body limit, 415 wrong content type
impl From<JsonRejection> for ProxyError {
    fn from(rejection: JsonRejection) -> Self {
        ProxyError::InvalidBody {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let mut response = (self.status_code(), Json(self.to_body())).into_response();

        if let ProxyError::RateLimited { retry_after } = &self {
            // whole seconds, rounded up
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        assert_eq!(ProxyError::MissingCredential.status_code(), 500);
        assert_eq!(ProxyError::EmptyPayload.status_code(), 400);
        assert_eq!(ProxyError::Timeout.status_code(), 504);
        assert_eq!(
            ProxyError::RateLimited { retry_after: Duration::ZERO }.status_code(),
            429
        );
        assert_eq!(
            ProxyError::Upstream {
                status: StatusCode::FORBIDDEN,
                details: String::new(),
            }
            .status_code(),
            403
        );
    }

    #[test]
    fn upstream_error_keeps_details() {
        let body = ProxyError::Upstream {
            status: StatusCode::BAD_REQUEST,
            details: r#"{"error":{"code":400}}"#.to_string(),
        }
        .to_body();
        assert_eq!(body.error, "Upstream API error: 400");
        assert_eq!(body.details.as_deref(), Some(r#"{"error":{"code":400}}"#));
    }

    #[test]
    fn retry_after_header_rounds_up() {
        let response = ProxyError::RateLimited {
            retry_after: Duration::from_millis(12_300),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "13");
    }

    #[test]
    fn invalid_body_keeps_rejection_status() {
        let err = ProxyError::InvalidBody {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            message: "length limit exceeded".to_string(),
        };
        assert_eq!(err.status_code(), 413);
        assert_eq!(err.to_body().error, "Invalid request body: length limit exceeded");
    }

    #[test]
    fn envelope_omits_empty_details() {
        let json = serde_json::to_value(ProxyError::Timeout.to_body()).unwrap();
        assert_eq!(json, serde_json::json!({ "error": "Request timeout" }));
    }
}
