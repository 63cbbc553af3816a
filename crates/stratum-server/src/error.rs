//! API error responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use stratum_graph::GraphError;

/// Errors returned by the JSON API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No valid session cookie.
    #[error("Unauthorized - Please sign in")]
    NoSession,

    /// Graph rejected the session's access token.
    #[error("{0}")]
    UpstreamAuth(GraphError),

    /// Graph failed or returned an unusable payload.
    #[error("{0}")]
    UpstreamUnavailable(GraphError),

    /// Unexpected server-side failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoSession => "NoSession",
            Self::UpstreamAuth(_) => "UpstreamAuthError",
            Self::UpstreamUnavailable(_) => "UpstreamUnavailable",
            Self::Internal(_) => "Internal",
        }
    }

    /// HTTP status of the response.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NoSession | Self::UpstreamAuth(_) => StatusCode::UNAUTHORIZED,
            Self::UpstreamUnavailable(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<GraphError> for ApiError {
    fn from(err: GraphError) -> Self {
        if err.is_auth_error() {
            Self::UpstreamAuth(err)
        } else {
            Self::UpstreamUnavailable(err)
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::NoSession => json!({ "error": self.to_string() }),
            Self::UpstreamAuth(_) => json!({
                "error": "Session is no longer accepted by Microsoft Graph - Please sign in again",
                "code": self.code(),
            }),
            Self::UpstreamUnavailable(err) => json!({
                "error": "Failed to fetch data from Microsoft Graph API",
                "code": self.code(),
                "details": err.to_string(),
            }),
            Self::Internal(message) => {
                tracing::error!(error = %message, "Internal error");
                json!({ "error": "Internal server error", "code": self.code() })
            }
        };

        (status, Json(body)).into_response()
    }
}
