//! Authentication configuration.
//!
//! Settings for the upstream identity provider (an Entra ID / Azure AD v2
//! tenant) and for the session carrier issued after sign-in.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Scopes requested at sign-in.
///
/// `offline_access` is what makes the provider issue a refresh token.
pub const DEFAULT_SCOPES: &[&str] = &[
    "openid",
    "profile",
    "email",
    "User.Read",
    "Organization.Read.All",
    "SecurityEvents.Read.All",
    "offline_access",
];

/// Minimum length of the session signing secret in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Root authentication configuration.
///
/// # Example (TOML)
///
/// ```toml
/// [auth.provider]
/// client_id = "00000000-0000-0000-0000-000000000000"
/// client_secret = "..."
/// tenant_id = "common"
/// redirect_uri = "https://portal.example.com/api/auth/callback"
///
/// [auth.session]
/// secret = "a-long-random-string-of-at-least-32-bytes"
/// max_age = "24h"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Upstream identity provider.
    pub provider: ProviderConfig,

    /// Session carrier settings.
    pub session: SessionConfig,
}

/// Identity provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Application (client) id from the app registration.
    pub client_id: String,

    /// Client secret. Absent for public clients relying on PKCE alone.
    pub client_secret: Option<String>,

    /// Tenant segment of the endpoints.
    /// `common` lets users from any organization sign in.
    pub tenant_id: String,

    /// Authority base URL, without the tenant segment.
    pub authority: String,

    /// Redirect URI registered with the provider; must point at the callback route.
    pub redirect_uri: String,

    /// Requested scopes.
    pub scopes: Vec<String>,

    /// Timeout for calls to the token endpoint.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            tenant_id: "common".to_string(),
            authority: "https://login.microsoftonline.com".to_string(),
            redirect_uri: "http://localhost:3000/api/auth/callback".to_string(),
            scopes: DEFAULT_SCOPES.iter().map(|s| (*s).to_string()).collect(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ProviderConfig {
    /// Authorization endpoint: `{authority}/{tenant}/oauth2/v2.0/authorize`.
    pub fn authorization_endpoint(&self) -> Result<Url, ConfigError> {
        self.endpoint("authorize")
    }

    /// Token endpoint: `{authority}/{tenant}/oauth2/v2.0/token`.
    pub fn token_endpoint(&self) -> Result<Url, ConfigError> {
        self.endpoint("token")
    }

    /// Space-separated scope string as sent to the provider.
    #[must_use]
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }

    /// Returns the configured tenant if it names a concrete organization.
    ///
    /// The multi-tenant aliases (`common`, `organizations`, `consumers`) do not.
    #[must_use]
    pub fn fixed_tenant(&self) -> Option<&str> {
        match self.tenant_id.as_str() {
            "" | "common" | "organizations" | "consumers" => None,
            tenant => Some(tenant),
        }
    }

    fn endpoint(&self, leaf: &str) -> Result<Url, ConfigError> {
        let raw = format!(
            "{}/{}/oauth2/v2.0/{}",
            self.authority.trim_end_matches('/'),
            self.tenant_id,
            leaf
        );
        Url::parse(&raw)
            .map_err(|e| ConfigError::InvalidValue(format!("invalid {leaf} endpoint '{raw}': {e}")))
    }
}

/// Session carrier configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// HMAC secret used to sign carriers and login transactions.
    pub secret: String,

    /// Issuer written into (and required from) every carrier.
    pub issuer: String,

    /// Base cookie name. Chunked carriers use `{cookie_name}.{n}`.
    pub cookie_name: String,

    /// Mark cookies `Secure`. Disable only for plain-HTTP local development.
    pub secure_cookies: bool,

    /// Wall-clock lifetime of a carrier, independent of the access token expiry.
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,

    /// How long before the access token expiry it is considered expiring.
    #[serde(with = "humantime_serde")]
    pub refresh_skew: Duration,

    /// Exchange the refresh token when the access token is expiring.
    /// Off by default: an expiring token is carried unchanged until the
    /// downstream API rejects it.
    pub refresh_enabled: bool,

    /// Lifetime of the login transaction between redirect and callback.
    #[serde(with = "humantime_serde")]
    pub login_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            issuer: "stratum".to_string(),
            cookie_name: "stratum.session-token".to_string(),
            secure_cookies: true,
            max_age: Duration::from_secs(24 * 60 * 60), // 24 hours
            refresh_skew: Duration::from_secs(5 * 60),
            refresh_enabled: false,
            login_timeout: Duration::from_secs(10 * 60),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the client id or session secret is
    /// absent, and `ConfigError::InvalidValue` if the secret is too short,
    /// a lifetime is zero or the provider endpoints cannot be built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.client_id.trim().is_empty() {
            return Err(ConfigError::Missing("auth.provider.client_id".to_string()));
        }

        if self.session.secret.is_empty() {
            return Err(ConfigError::Missing("auth.session.secret".to_string()));
        }

        if self.session.secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::InvalidValue(format!(
                "auth.session.secret must be at least {MIN_SECRET_LEN} bytes"
            )));
        }

        if self.session.max_age.is_zero() {
            return Err(ConfigError::InvalidValue(
                "auth.session.max_age must be > 0".to_string(),
            ));
        }

        if self.session.login_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "auth.session.login_timeout must be > 0".to_string(),
            ));
        }

        if self.session.cookie_name.is_empty() {
            return Err(ConfigError::InvalidValue(
                "auth.session.cookie_name cannot be empty".to_string(),
            ));
        }

        Url::parse(&self.provider.redirect_uri).map_err(|e| {
            ConfigError::InvalidValue(format!("auth.provider.redirect_uri: {e}"))
        })?;
        self.provider.authorization_endpoint()?;
        self.provider.token_endpoint()?;

        Ok(())
    }
}
