//! Session claims and the credential they carry.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::provider::IdTokenClaims;

/// OAuth credentials obtained from the identity provider at sign-in.
///
/// Immutable: a refresh replaces the whole credential.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Bearer token for the downstream API.
    pub access_token: String,

    /// Token used to obtain a new access token. Absent if the provider did
    /// not issue one.
    pub refresh_token: Option<String>,

    /// Access token expiry (Unix timestamp, seconds).
    pub expires_at: i64,

    /// Organization that issued the token.
    pub tenant_id: String,
}

impl Credential {
    /// Returns `true` if the credential is complete enough to be trusted.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.access_token.is_empty()
            && self.expires_at > 0
            && self.refresh_token.as_ref().is_none_or(|t| !t.is_empty())
    }
}

// Tokens are bearer secrets and must not end up in logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[redacted]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[redacted]"),
            )
            .field("expires_at", &self.expires_at)
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}

/// Identity and credential of a signed-in user.
///
/// Either fully present and well-formed, or not present at all: the codec
/// never hands out partially valid claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionClaims {
    /// Subject identifier from the ID token.
    pub subject_id: String,

    /// Display name.
    pub display_name: String,

    /// Email address, or the sign-in name when the account has no mailbox.
    pub email: String,

    /// Tenant the user signed in to.
    pub tenant_id: String,

    /// OAuth credential.
    pub credential: Credential,

    /// When the carrier stops being accepted (Unix timestamp, seconds).
    /// Fixed at sign-in; refreshes do not extend it.
    pub expires: i64,
}

impl SessionClaims {
    /// Builds claims from a provider callback.
    ///
    /// The tenant comes from the ID token `tid` claim, falling back to
    /// `fallback_tenant` (the configured tenant, when it names one).
    ///
    /// # Errors
    ///
    /// Returns `AuthError::MalformedProviderResponse` if the access token or
    /// its expiry is missing, or the ID token carries no subject or tenant.
    pub fn from_callback(
        callback: &ProviderCallback,
        fallback_tenant: Option<&str>,
        expires: i64,
    ) -> Result<Self, AuthError> {
        let access_token = callback
            .access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::malformed_provider_response("missing access_token"))?;

        let expires_at = callback
            .expires_at
            .filter(|at| *at > 0)
            .ok_or_else(|| AuthError::malformed_provider_response("missing token expiry"))?;

        let id_token = &callback.id_token;
        if id_token.sub.is_empty() {
            return Err(AuthError::malformed_provider_response(
                "ID token has no subject",
            ));
        }

        let tenant_id = id_token
            .tid
            .as_deref()
            .filter(|t| !t.is_empty())
            .or(fallback_tenant)
            .ok_or_else(|| AuthError::malformed_provider_response("ID token has no tenant"))?
            .to_string();

        let display_name = id_token
            .name
            .clone()
            .or_else(|| id_token.preferred_username.clone())
            .unwrap_or_default();

        let email = id_token
            .email
            .clone()
            .or_else(|| id_token.preferred_username.clone())
            .unwrap_or_default();

        Ok(Self {
            subject_id: id_token.sub.clone(),
            display_name,
            email,
            tenant_id: tenant_id.clone(),
            credential: Credential {
                access_token: access_token.to_string(),
                refresh_token: callback.refresh_token.clone().filter(|t| !t.is_empty()),
                expires_at,
                tenant_id,
            },
            expires,
        })
    }

    /// Returns new claims with the credential replaced by refreshed tokens.
    ///
    /// A provider that does not rotate refresh tokens omits the new one; the
    /// previous refresh token is kept in that case.
    #[must_use]
    pub fn with_refreshed(&self, tokens: RefreshedTokens) -> Self {
        let refresh_token = tokens
            .refresh_token
            .filter(|t| !t.is_empty())
            .or_else(|| self.credential.refresh_token.clone());

        Self {
            credential: Credential {
                access_token: tokens.access_token,
                refresh_token,
                expires_at: tokens.expires_at,
                tenant_id: self.tenant_id.clone(),
            },
            ..self.clone()
        }
    }

    /// Returns `true` if the claims satisfy the session invariant.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.subject_id.is_empty()
            && !self.tenant_id.is_empty()
            && self.credential.is_well_formed()
    }
}

/// Result of the authorization-code exchange, as handed to the codec.
#[derive(Debug, Clone, Default)]
pub struct ProviderCallback {
    /// Access token, if the provider returned one.
    pub access_token: Option<String>,

    /// Refresh token, issued when `offline_access` was granted.
    pub refresh_token: Option<String>,

    /// Absolute access token expiry (Unix timestamp, seconds).
    pub expires_at: Option<i64>,

    /// Claims of the ID token returned alongside the tokens.
    pub id_token: IdTokenClaims,
}

/// Tokens returned by a refresh-token grant.
#[derive(Clone)]
pub struct RefreshedTokens {
    /// New access token.
    pub access_token: String,

    /// Rotated refresh token, if the provider issued one.
    pub refresh_token: Option<String>,

    /// New access token expiry (Unix timestamp, seconds).
    pub expires_at: i64,
}

impl fmt::Debug for RefreshedTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshedTokens")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}
