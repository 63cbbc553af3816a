//! Login transaction: what the server must remember between the redirect to
//! the provider and the callback.
//!
//! The transaction travels in its own short-lived cookie, signed with the
//! session key, so sign-in stays as stateless as the session itself.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;
use crate::pkce::PkceVerifier;
use crate::session::codec::Expiring;
use crate::session::{SessionCodec, SignedToken};

const TRANSACTION_TYPE: &str = "login";

/// A pending sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginTransaction {
    /// CSRF state echoed back by the provider.
    pub state: String,

    /// OIDC nonce the ID token must carry.
    pub nonce: String,

    /// PKCE verifier for the code exchange.
    pub pkce_verifier: PkceVerifier,

    /// Same-origin path to return to after sign-in.
    pub callback_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct TransactionClaims {
    iss: String,
    exp: i64,
    typ: String,
    state: String,
    nonce: String,
    pkce: String,
    callback: String,
}

impl Expiring for TransactionClaims {
    fn exp(&self) -> i64 {
        self.exp
    }
}

impl LoginTransaction {
    /// Starts a transaction with fresh state, nonce and PKCE verifier.
    ///
    /// `callback_url` is reduced to a same-origin path, see
    /// [`sanitize_callback_url`].
    #[must_use]
    pub fn new(callback_url: &str) -> Self {
        Self {
            state: Uuid::new_v4().simple().to_string(),
            nonce: Uuid::new_v4().simple().to_string(),
            pkce_verifier: PkceVerifier::generate(),
            callback_url: sanitize_callback_url(Some(callback_url)),
        }
    }

    /// Signs the transaction for the login cookie.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Signing` if signing fails.
    pub fn seal(
        &self,
        codec: &SessionCodec,
        ttl: std::time::Duration,
        now: OffsetDateTime,
    ) -> AuthResult<SignedToken> {
        let claims = TransactionClaims {
            iss: codec.issuer().to_string(),
            exp: now.unix_timestamp() + ttl.as_secs() as i64,
            typ: TRANSACTION_TYPE.to_string(),
            state: self.state.clone(),
            nonce: self.nonce.clone(),
            pkce: self.pkce_verifier.as_str().to_string(),
            callback: self.callback_url.clone(),
        };
        codec.sign(&claims).map(SignedToken)
    }

    /// Restores a transaction from the login cookie.
    ///
    /// Returns `None` if the cookie is absent, forged or expired.
    #[must_use]
    pub fn open(codec: &SessionCodec, token: Option<&str>, now: OffsetDateTime) -> Option<Self> {
        let token = token.filter(|t| !t.is_empty())?;
        let claims: TransactionClaims = match codec.verify(token, now) {
            Ok(claims) => claims,
            Err(reason) => {
                tracing::debug!(reason = %reason, "Ignoring login transaction");
                return None;
            }
        };

        if claims.typ != TRANSACTION_TYPE {
            return None;
        }

        let pkce_verifier = PkceVerifier::new(claims.pkce).ok()?;
        Some(Self {
            state: claims.state,
            nonce: claims.nonce,
            pkce_verifier,
            callback_url: sanitize_callback_url(Some(&claims.callback)),
        })
    }

    /// Checks the `state` returned by the provider.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCallback` if it does not match.
    pub fn verify_state(&self, state: Option<&str>) -> AuthResult<()> {
        match state {
            Some(state) if state == self.state => Ok(()),
            _ => Err(AuthError::invalid_callback("state mismatch")),
        }
    }
}

/// Reduces a requested return location to a same-origin path.
///
/// Anything that is not an absolute path (`/...`) becomes `/`, including
/// protocol-relative (`//host`) and backslash (`/\host`) forms.
#[must_use]
pub fn sanitize_callback_url(requested: Option<&str>) -> String {
    match requested {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.starts_with("/\\")
                && !path.chars().any(char::is_control) =>
        {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}
