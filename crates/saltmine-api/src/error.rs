use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

use saltmine_providers::ProviderError;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Body of a 403 quota rejection. The front end follows `redirect`.
#[derive(Debug, Serialize)]
struct QuotaBody {
    error: &'static str,
    message: String,
    redirect: &'static str,
    limit: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Guest users can only perform {limit} searches per day. Sign up for more!")]
    GuestQuotaExceeded { limit: i64 },

    #[error("You have used all {limit} searches for today. Upgrade for unlimited searches.")]
    QuotaExceeded { limit: i64 },

    #[error("Upstream error: {0}")]
    Upstream(#[from] ProviderError),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) | Self::GuestQuotaExceeded { .. } | Self::QuotaExceeded { .. } => {
                StatusCode::FORBIDDEN
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream(ProviderError::Validation(_)) => StatusCode::BAD_REQUEST,
            Self::Upstream(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            Self::Upstream(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text shown to the client. Upstream and internal details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            Self::Upstream(ProviderError::Validation(msg)) => msg.clone(),
            Self::Upstream(e) if e.is_timeout() => "Upstream request timed out. Please try again.".into(),
            Self::Upstream(ProviderError::NotConfigured(_)) => "Service configuration error".into(),
            Self::Upstream(_) => "Upstream service error. Please try again later.".into(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            Self::Internal(e) => error!("Internal error: {:#}", e),
            Self::Upstream(ProviderError::Http { status, body }) => {
                error!(status, body = %body, "Upstream error")
            }
            Self::Upstream(e) => error!("Upstream error: {}", e),
            _ => {}
        }

        match self {
            Self::GuestQuotaExceeded { limit } => (
                status,
                Json(QuotaBody {
                    error: "GUEST_QUOTA_EXCEEDED",
                    message: self.to_string(),
                    redirect: "/signup",
                    limit,
                }),
            )
                .into_response(),
            Self::QuotaExceeded { limit } => (
                status,
                Json(QuotaBody {
                    error: "QUOTA_EXCEEDED",
                    message: self.to_string(),
                    redirect: "/pricing",
                    limit,
                }),
            )
                .into_response(),
            _ => (
                status,
                Json(ErrorBody {
                    error: self.public_message(),
                }),
            )
                .into_response(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        assert_eq!(ApiError::BadRequest("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::QuotaExceeded { limit: 3 }.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::Upstream(ProviderError::Timeout).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ApiError::Upstream(ProviderError::Http { status: 502, body: "secret".into() }).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_details_are_masked() {
        let err = ApiError::Internal(anyhow::anyhow!("disk on fire"));
        assert_eq!(err.public_message(), "Internal server error");

        let err = ApiError::Upstream(ProviderError::Http { status: 500, body: "stack trace".into() });
        assert!(!err.public_message().contains("stack trace"));
    }
}
