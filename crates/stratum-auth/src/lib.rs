//! # stratum-auth
//!
//! Sign-in against an external OIDC identity provider and the stateless
//! session carrier that keeps the resulting credentials between requests.
//!
//! This crate provides:
//! - Authorization-code flow with PKCE against the provider
//! - A signed, self-contained session token (the "carrier") stored in a cookie
//! - The access-token lifecycle (fresh / expiring / expired) with refresh
//!
//! ## Modules
//!
//! - [`config`] - Provider and session configuration
//! - [`provider`] - Identity provider client (authorize URL, code exchange, refresh)
//! - [`pkce`] - RFC 7636 verifier and challenge
//! - [`session`] - Session claims, codec and lifecycle manager
//! - [`login`] - Short-lived login transaction carried between redirect and callback
//! - [`cookies`] - Cookie helpers, including chunking of large carriers

pub mod config;
pub mod cookies;
pub mod error;
pub mod login;
pub mod pkce;
pub mod provider;
pub mod session;

pub use config::{AuthConfig, ConfigError, ProviderConfig, SessionConfig};
pub use cookies::SessionCookies;
pub use error::AuthError;
pub use login::{LoginTransaction, sanitize_callback_url};
pub use provider::{IdTokenClaims, IdentityProviderClient, TokenResponse};
pub use session::{
    Credential, ProviderCallback, RefreshedTokens, SessionClaims, SessionCodec, SessionManager, SessionResolution,
    SignedToken, TokenLifecycle, TokenRefresher,
};

/// Type alias for authentication results.
pub type AuthResult<T> = Result<T, AuthError>;
