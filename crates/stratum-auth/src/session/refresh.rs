//! Access token lifecycle.
//!
//! ```text
//!            now >= expires_at - skew
//!   FRESH ────────────────────────────▶ EXPIRING
//!     ▲                                    │
//!     │ refresh succeeded                  │ refresh failed,
//!     │ (new carrier issued)               │ or no refresh token
//!     └────────────────────────────────────┤
//!                                          ▼
//!                                       EXPIRED  (= no session)
//! ```
//!
//! The refresh is attempted once per request that sees an expiring token.
//! There is no retry or backoff here; a user-triggered reload is the retry.
//! When no [`TokenRefresher`] is configured the manager does not look at the
//! access token expiry at all and returns whatever the codec decoded.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;

use super::claims::{RefreshedTokens, SessionClaims};
use super::codec::{SessionCodec, SignedToken};
use crate::AuthResult;
use crate::config::SessionConfig;

/// State of the access token carried in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenLifecycle {
    /// Usable as is.
    Fresh,
    /// Within the skew window of its expiry (or past it); should be refreshed.
    Expiring,
    /// Could not be refreshed. Callers treat this exactly like no session.
    Expired,
}

impl TokenLifecycle {
    /// Classifies a session's access token at `now`.
    ///
    /// Only [`Fresh`](Self::Fresh) or [`Expiring`](Self::Expiring) come out
    /// of this; [`Expired`](Self::Expired) is reached by a failed refresh.
    #[must_use]
    pub fn classify(claims: &SessionClaims, now: OffsetDateTime, skew: Duration) -> Self {
        let threshold = claims.credential.expires_at - skew.as_secs() as i64;
        if now.unix_timestamp() >= threshold {
            Self::Expiring
        } else {
            Self::Fresh
        }
    }
}

/// Exchanges a refresh token for new tokens at the identity provider.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Redeems `refresh_token`.
    ///
    /// # Errors
    ///
    /// Any error ends the session.
    async fn refresh(&self, refresh_token: &str) -> AuthResult<RefreshedTokens>;
}

/// Outcome of resolving a request's session.
#[derive(Debug)]
pub enum SessionResolution {
    /// A usable session.
    Active {
        /// The session claims.
        claims: SessionClaims,
        /// A replacement carrier the caller must send back, if one was issued.
        reissued: Option<SignedToken>,
    },
    /// No session: absent, invalid, or expired beyond refresh.
    NoSession,
}

impl SessionResolution {
    /// Returns the claims of an active session.
    #[must_use]
    pub fn claims(&self) -> Option<&SessionClaims> {
        match self {
            Self::Active { claims, .. } => Some(claims),
            Self::NoSession => None,
        }
    }
}

/// Per-request entry point: carrier in, usable session (or nothing) out.
#[derive(Clone)]
pub struct SessionManager {
    codec: Arc<SessionCodec>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    skew: Duration,
}

impl SessionManager {
    /// Creates a manager that never refreshes.
    #[must_use]
    pub fn new(codec: Arc<SessionCodec>) -> Self {
        Self {
            codec,
            refresher: None,
            skew: Duration::from_secs(5 * 60),
        }
    }

    /// Creates a manager from configuration; `refresher` is only used when
    /// `refresh_enabled` is set.
    #[must_use]
    pub fn from_config(
        codec: Arc<SessionCodec>,
        config: &SessionConfig,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        let manager = Self::new(codec).with_skew(config.refresh_skew);
        if config.refresh_enabled {
            manager.with_refresher(refresher)
        } else {
            manager
        }
    }

    /// Enables refreshing through `refresher`.
    #[must_use]
    pub fn with_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Sets how long before expiry a token counts as expiring.
    #[must_use]
    pub fn with_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }

    /// Returns the codec.
    #[must_use]
    pub fn codec(&self) -> &SessionCodec {
        &self.codec
    }

    /// Resolves the session for a request carrying `carrier`.
    pub async fn resolve(&self, carrier: Option<&str>) -> SessionResolution {
        self.resolve_at(carrier, OffsetDateTime::now_utc()).await
    }

    /// [`resolve`](Self::resolve) with an explicit clock.
    pub async fn resolve_at(&self, carrier: Option<&str>, now: OffsetDateTime) -> SessionResolution {
        let Some(claims) = self.codec.decode_at(carrier, now) else {
            return SessionResolution::NoSession;
        };

        let Some(refresher) = &self.refresher else {
            return SessionResolution::Active {
                claims,
                reissued: None,
            };
        };

        match TokenLifecycle::classify(&claims, now, self.skew) {
            TokenLifecycle::Fresh => SessionResolution::Active {
                claims,
                reissued: None,
            },
            TokenLifecycle::Expiring => match self.refresh(refresher.as_ref(), &claims, now).await {
                Ok((claims, carrier)) => SessionResolution::Active {
                    claims,
                    reissued: Some(carrier),
                },
                Err(_expired) => SessionResolution::NoSession,
            },
            TokenLifecycle::Expired => SessionResolution::NoSession,
        }
    }

    /// EXPIRING → FRESH with a new carrier, or EXPIRING → EXPIRED.
    async fn refresh(
        &self,
        refresher: &dyn TokenRefresher,
        claims: &SessionClaims,
        now: OffsetDateTime,
    ) -> Result<(SessionClaims, SignedToken), TokenLifecycle> {
        let Some(refresh_token) = claims.credential.refresh_token.as_deref() else {
            tracing::info!(
                tenant = %claims.tenant_id,
                "Access token expiring and no refresh token; ending session"
            );
            return Err(TokenLifecycle::Expired);
        };

        let tokens = refresher.refresh(refresh_token).await.map_err(|e| {
            tracing::warn!(tenant = %claims.tenant_id, error = %e, "Token refresh failed; ending session");
            TokenLifecycle::Expired
        })?;

        let refreshed = claims.with_refreshed(tokens);
        let carrier = self.codec.issue_at(&refreshed, now).map_err(|e| {
            tracing::warn!(error = %e, "Could not reissue session after refresh");
            TokenLifecycle::Expired
        })?;

        tracing::debug!(
            tenant = %refreshed.tenant_id,
            expires_at = refreshed.credential.expires_at,
            "Access token refreshed"
        );

        Ok((refreshed, carrier))
    }
}
