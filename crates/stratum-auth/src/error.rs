//! Authentication error types.

/// Errors that can occur while signing a user in or issuing a session.
///
/// Note that an invalid or forged session carrier is *not* an error: decoding
/// such a carrier yields "no session" instead.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The identity provider returned an incomplete token response.
    #[error("Malformed provider response: {message}")]
    MalformedProviderResponse {
        /// Which part of the response was missing or unusable.
        message: String,
    },

    /// The identity provider rejected the request.
    #[error("Identity provider error: {error} - {description}")]
    IdentityProvider {
        /// OAuth error code, or the HTTP status when no error body was returned.
        error: String,
        /// Provider supplied description.
        description: String,
    },

    /// The callback does not belong to a login this server started.
    #[error("Invalid callback: {message}")]
    InvalidCallback {
        /// Description of the mismatch.
        message: String,
    },

    /// The token endpoint could not be reached.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Signing a carrier failed.
    #[error("Signing error: {message}")]
    Signing {
        /// Description of the signing failure.
        message: String,
    },

    /// The auth configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `MalformedProviderResponse` error.
    #[must_use]
    pub fn malformed_provider_response(message: impl Into<String>) -> Self {
        Self::MalformedProviderResponse {
            message: message.into(),
        }
    }

    /// Creates a new `IdentityProvider` error.
    #[must_use]
    pub fn identity_provider(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self::IdentityProvider {
            error: error.into(),
            description: description.into(),
        }
    }

    /// Creates a new `InvalidCallback` error.
    #[must_use]
    pub fn invalid_callback(message: impl Into<String>) -> Self {
        Self::InvalidCallback {
            message: message.into(),
        }
    }

    /// Creates a new `Signing` error.
    #[must_use]
    pub fn signing(message: impl Into<String>) -> Self {
        Self::Signing {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Short, stable code used in the `error` query parameter of the
    /// post-login redirect.
    #[must_use]
    pub fn login_error_code(&self) -> &'static str {
        match self {
            Self::MalformedProviderResponse { .. } => "MalformedProviderResponse",
            Self::IdentityProvider { .. } => "OAuthCallback",
            Self::InvalidCallback { .. } => "OAuthCallback",
            Self::Network(_) => "OAuthSignin",
            Self::Signing { .. } | Self::Configuration { .. } => "Configuration",
        }
    }

    /// Returns `true` if the failure came from the provider side.
    #[must_use]
    pub fn is_external_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedProviderResponse { .. } | Self::IdentityProvider { .. } | Self::Network(_)
        )
    }
}

impl From<crate::config::ConfigError> for AuthError {
    fn from(err: crate::config::ConfigError) -> Self {
        Self::configuration(err.to_string())
    }
}
