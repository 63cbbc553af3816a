//! Aggregation of the dashboard's Graph calls.
//!
//! | call          | criticality | on failure                       |
//! |---------------|-------------|----------------------------------|
//! | profile       | critical    | whole fetch fails                |
//! | organization  | critical    | whole fetch fails                |
//! | secure score  | optional    | `secureScore: null`              |
//!
//! The three calls run concurrently. The first critical failure ends the
//! fetch and drops the calls still in flight. The optional call gets its own
//! time budget and can never fail the fetch.

use std::sync::Arc;
use std::time::Duration;

use crate::GraphResult;
use crate::client::GraphApi;
use crate::error::GraphError;
use crate::models::SecureScore;
use crate::profile::AggregatedProfile;

/// Fetches and merges the dashboard profile.
#[derive(Clone)]
pub struct AggregationFacade {
    api: Arc<dyn GraphApi>,
    optional_timeout: Duration,
}

impl AggregationFacade {
    /// Creates a facade over `api`.
    #[must_use]
    pub fn new(api: Arc<dyn GraphApi>, optional_timeout: Duration) -> Self {
        Self {
            api,
            optional_timeout,
        }
    }

    /// Fetches profile, organization and secure score for `access_token`.
    ///
    /// # Errors
    ///
    /// `GraphError::Unauthorized` or `GraphError::Unavailable` from the first
    /// critical call that fails.
    pub async fn fetch(&self, access_token: &str) -> GraphResult<AggregatedProfile> {
        let (user, organization, score) = tokio::try_join!(
            self.api.profile(access_token),
            self.api.organization(access_token),
            self.optional_score(access_token),
        )
        .inspect_err(|e| tracing::warn!(call = %e.call(), error = %e, "Graph aggregation failed"))?;

        Ok(AggregatedProfile::merge(user, organization, score))
    }

    /// Returns `true` if Graph accepts the access token.
    pub async fn check_connection(&self, access_token: &str) -> bool {
        match self.api.profile(access_token).await {
            Ok(_) => true,
            Err(e) => {
                tracing::info!(error = %e, "Graph connection check failed");
                false
            }
        }
    }

    /// The secure score call, made infallible.
    async fn optional_score(&self, access_token: &str) -> Result<Option<SecureScore>, GraphError> {
        let score =
            match tokio::time::timeout(self.optional_timeout, self.api.secure_score(access_token))
                .await
            {
                Ok(Ok(Some(score))) => Some(score),
                Ok(Ok(None)) => {
                    tracing::debug!("Tenant has no secure score record");
                    None
                }
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "Secure score unavailable");
                    None
                }
                Err(_) => {
                    tracing::warn!(
                        timeout_ms = self.optional_timeout.as_millis() as u64,
                        "Secure score timed out"
                    );
                    None
                }
            };
        Ok(score)
    }
}
