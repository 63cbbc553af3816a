//! Signing and verification of session carriers.
//!
//! A carrier is an HS256 JWT. Besides the standard `iss`, `sub`, `iat` and
//! `exp` claims it holds the user's identity, the OAuth credential and a
//! format version `ver`.
//!
//! Decoding never fails loudly: a carrier with a bad signature, a foreign
//! issuer, an elapsed `exp`, an unknown version or incomplete claims is
//! reported as "no session".
//!
//! # Example
//!
//! ```ignore
//! let codec = SessionCodec::from_config(&config.session);
//! let carrier = codec.encode(&callback, config.provider.fixed_tenant())?;
//!
//! // on a later request
//! if let Some(claims) = codec.decode(Some(carrier.as_str())) {
//!     println!("signed in as {}", claims.display_name);
//! }
//! ```

use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::claims::{Credential, ProviderCallback, SessionClaims};
use crate::AuthResult;
use crate::config::SessionConfig;
use crate::error::AuthError;

/// Current carrier format version. Carriers with any other version are ignored.
pub const CARRIER_VERSION: u32 = 1;

/// A signed session carrier, ready to be stored in a cookie.
#[derive(Clone, PartialEq, Eq)]
pub struct SignedToken(pub(crate) String);

impl SignedToken {
    /// Returns the carrier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the token and returns the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for SignedToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SignedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SignedToken({} bytes)", self.0.len())
    }
}

/// JWT payload of a session carrier.
#[derive(Debug, Serialize, Deserialize)]
struct CarrierClaims {
    iss: String,
    sub: String,
    iat: i64,
    exp: i64,
    ver: u32,
    name: String,
    email: String,
    tid: String,
    access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    expires_at: i64,
}

impl CarrierClaims {
    fn into_session(self) -> SessionClaims {
        SessionClaims {
            subject_id: self.sub,
            display_name: self.name,
            email: self.email,
            tenant_id: self.tid.clone(),
            credential: Credential {
                access_token: self.access_token,
                refresh_token: self.refresh_token,
                expires_at: self.expires_at,
                tenant_id: self.tid,
            },
            expires: self.exp,
        }
    }
}

/// Encodes and decodes session carriers.
///
/// Holds only the HMAC key and static settings, so one instance can be
/// shared by all requests.
pub struct SessionCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    max_age: Duration,
}

impl SessionCodec {
    /// Creates a codec.
    ///
    /// # Arguments
    /// * `secret` - HMAC key
    /// * `issuer` - value of the `iss` claim
    /// * `max_age` - carrier lifetime from sign-in
    #[must_use]
    pub fn new(secret: &[u8], issuer: impl Into<String>, max_age: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
            max_age,
        }
    }

    /// Creates a codec from the session configuration.
    #[must_use]
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.secret.as_bytes(), &config.issuer, config.max_age)
    }

    pub(crate) fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Returns the carrier lifetime.
    #[must_use]
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Turns a provider callback into the first carrier of a session.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::MalformedProviderResponse` if the callback lacks
    /// an access token or expiry, and `AuthError::Signing` if signing fails.
    pub fn encode(
        &self,
        callback: &ProviderCallback,
        fallback_tenant: Option<&str>,
    ) -> AuthResult<SignedToken> {
        self.encode_at(callback, fallback_tenant, OffsetDateTime::now_utc())
    }

    /// [`encode`](Self::encode) with an explicit clock.
    pub fn encode_at(
        &self,
        callback: &ProviderCallback,
        fallback_tenant: Option<&str>,
        now: OffsetDateTime,
    ) -> AuthResult<SignedToken> {
        let expires = now.unix_timestamp() + self.max_age.as_secs() as i64;
        let claims = SessionClaims::from_callback(callback, fallback_tenant, expires)?;
        self.issue_at(&claims, now)
    }

    /// Signs claims into a new carrier, keeping their `expires`.
    ///
    /// Used to reissue a session after its credential was replaced.
    pub fn issue_at(&self, claims: &SessionClaims, now: OffsetDateTime) -> AuthResult<SignedToken> {
        if !claims.is_well_formed() {
            return Err(AuthError::malformed_provider_response(
                "refusing to sign incomplete session claims",
            ));
        }

        let payload = CarrierClaims {
            iss: self.issuer.clone(),
            sub: claims.subject_id.clone(),
            iat: now.unix_timestamp(),
            exp: claims.expires,
            ver: CARRIER_VERSION,
            name: claims.display_name.clone(),
            email: claims.email.clone(),
            tid: claims.tenant_id.clone(),
            access_token: claims.credential.access_token.clone(),
            refresh_token: claims.credential.refresh_token.clone(),
            expires_at: claims.credential.expires_at,
        };

        self.sign(&payload).map(SignedToken)
    }

    /// Turns a carrier back into claims.
    ///
    /// Returns `None` for an absent, forged, expired, unsupported or
    /// incomplete carrier. The access token expiry is *not* checked here.
    #[must_use]
    pub fn decode(&self, carrier: Option<&str>) -> Option<SessionClaims> {
        self.decode_at(carrier, OffsetDateTime::now_utc())
    }

    /// [`decode`](Self::decode) with an explicit clock.
    #[must_use]
    pub fn decode_at(&self, carrier: Option<&str>, now: OffsetDateTime) -> Option<SessionClaims> {
        let carrier = carrier.filter(|c| !c.is_empty())?;

        let payload: CarrierClaims = match self.verify(carrier, now) {
            Ok(payload) => payload,
            Err(reason) => {
                tracing::debug!(reason = %reason, "Ignoring session carrier");
                return None;
            }
        };

        if payload.ver != CARRIER_VERSION {
            tracing::debug!(version = payload.ver, "Ignoring session carrier with unsupported version");
            return None;
        }

        let claims = payload.into_session();
        if !claims.is_well_formed() {
            tracing::debug!("Ignoring session carrier with incomplete claims");
            return None;
        }

        Some(claims)
    }

    /// Signs any payload with the session key.
    pub(crate) fn sign<T: Serialize>(&self, payload: &T) -> AuthResult<String> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), payload, &self.encoding_key)
            .map_err(|e| AuthError::signing(e.to_string()))
    }

    /// Verifies signature, issuer and `exp` of a payload signed by [`sign`](Self::sign).
    ///
    /// `exp` is checked against `now` here rather than by `jsonwebtoken`,
    /// which only knows the system clock.
    pub(crate) fn verify<T: DeserializeOwned + Expiring>(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<T, String> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss"]);
        validation.validate_exp = false;
        validation.validate_aud = false;

        let data = jsonwebtoken::decode::<T>(token, &self.decoding_key, &validation)
            .map_err(|e| e.to_string())?;

        if data.claims.exp() <= now.unix_timestamp() {
            return Err("carrier expired".to_string());
        }

        Ok(data.claims)
    }
}

/// Payloads with an `exp` claim.
pub(crate) trait Expiring {
    fn exp(&self) -> i64;
}

impl Expiring for CarrierClaims {
    fn exp(&self) -> i64 {
        self.exp
    }
}
