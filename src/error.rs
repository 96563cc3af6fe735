use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Service-wide error taxonomy.
///
/// `RateLimitExceeded` is the only failure kind introduced by the gateway
/// itself; everything the low-level model caller raises passes through as
/// `Upstream`. Incomplete/malformed outcomes are handler-level job failures
/// and only reach HTTP clients as stored job error text.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{detail}")]
    RateLimitExceeded {
        detail: String,
        /// Whole seconds until a retry may succeed, when the limiter could
        /// estimate one. Mapped to the `Retry-After` header.
        retry_after: Option<u64>,
    },

    #[error("upstream model error: {0}")]
    Upstream(String),

    #[error("model response incomplete: {0}")]
    Incomplete(String),

    #[error("no text found in model response payload")]
    NoOutputText,

    #[error("malformed model output: {0}")]
    MalformedOutput(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("job {0} not found")]
    JobNotFound(String),

    #[error("active job limit exceeded: {0}")]
    JobLimitExceeded(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Upstream(err.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::RateLimitExceeded { .. } | GatewayError::JobLimitExceeded(_) => {
                StatusCode::TOO_MANY_REQUESTS
            }
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Incomplete(_)
            | GatewayError::NoOutputText
            | GatewayError::MalformedOutput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::JobNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_tag(&self) -> &'static str {
        match self {
            GatewayError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            GatewayError::JobLimitExceeded(_) => "job_limit_exceeded",
            GatewayError::Upstream(_) => "upstream_error",
            GatewayError::Incomplete(_) => "incomplete_completion",
            GatewayError::NoOutputText => "no_output_text",
            GatewayError::MalformedOutput(_) => "malformed_output",
            GatewayError::Validation(_) => "bad_request",
            GatewayError::JobNotFound(_) => "job_not_found",
            GatewayError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: self.error_tag().to_string(),
            message: self.to_string(),
        };

        let mut response = (status, Json(body)).into_response();

        if let GatewayError::RateLimitExceeded {
            retry_after: Some(secs),
            ..
        } = &self
        {
            if let Ok(value) = secs.to_string().parse() {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_maps_to_429_with_retry_after() {
        let err = GatewayError::RateLimitExceeded {
            detail: "model RPM limit exceeded".to_string(),
            retry_after: Some(2),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "2");
    }

    #[test]
    fn rate_limit_without_estimate_omits_header() {
        let err = GatewayError::RateLimitExceeded {
            detail: "model RPM limit exceeded".to_string(),
            retry_after: None,
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }

    #[test]
    fn job_not_found_maps_to_404() {
        let err = GatewayError::JobNotFound("abc".to_string());
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn upstream_maps_to_502() {
        let err = GatewayError::Upstream("API error 500".to_string());
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }
}
