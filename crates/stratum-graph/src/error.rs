//! Graph error types.

use std::fmt;

/// The upstream calls made by the facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphCall {
    /// `GET /me`
    Profile,
    /// `GET /organization`
    Organization,
    /// `GET /security/secureScores`
    SecureScore,
}

/// Whether a call's failure fails the whole aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criticality {
    /// Failure aborts the aggregation.
    Critical,
    /// Failure omits the call's section from the result.
    Optional,
}

impl GraphCall {
    /// Criticality of the call.
    #[must_use]
    pub fn criticality(self) -> Criticality {
        match self {
            Self::Profile | Self::Organization => Criticality::Critical,
            Self::SecureScore => Criticality::Optional,
        }
    }

    /// Path relative to the API root.
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Profile => "/me",
            Self::Organization => "/organization",
            Self::SecureScore => "/security/secureScores?$top=1",
        }
    }
}

impl fmt::Display for GraphCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Profile => "profile",
            Self::Organization => "organization",
            Self::SecureScore => "secureScore",
        };
        f.write_str(name)
    }
}

/// Errors returned by Graph calls.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Graph rejected the access token (HTTP 401 or 403).
    #[error("Graph rejected the access token for {call} (HTTP {status})")]
    Unauthorized {
        /// The failing call.
        call: GraphCall,
        /// HTTP status returned.
        status: u16,
    },

    /// Graph could not be reached, failed, or returned an unusable payload.
    #[error("Failed to fetch {call} from Microsoft Graph: {message}")]
    Unavailable {
        /// The failing call.
        call: GraphCall,
        /// What went wrong.
        message: String,
    },
}

impl GraphError {
    /// Creates a new `Unauthorized` error.
    #[must_use]
    pub fn unauthorized(call: GraphCall, status: u16) -> Self {
        Self::Unauthorized { call, status }
    }

    /// Creates a new `Unavailable` error.
    #[must_use]
    pub fn unavailable(call: GraphCall, message: impl Into<String>) -> Self {
        Self::Unavailable {
            call,
            message: message.into(),
        }
    }

    /// Returns the call that failed.
    #[must_use]
    pub fn call(&self) -> GraphCall {
        match self {
            Self::Unauthorized { call, .. } | Self::Unavailable { call, .. } => *call,
        }
    }

    /// Returns `true` if the user has to sign in again.
    #[must_use]
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Returns `true` if repeating the request later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}
