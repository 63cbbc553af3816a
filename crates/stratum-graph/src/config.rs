//! Graph client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Microsoft Graph settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GraphConfig {
    /// API root including the version segment.
    pub base_url: String,

    /// Timeout for a single Graph request.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Budget for optional calls (secure score). A call that takes longer
    /// is treated as unavailable.
    #[serde(with = "humantime_serde")]
    pub optional_timeout: Duration,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            base_url: "https://graph.microsoft.com/v1.0".to_string(),
            request_timeout: Duration::from_secs(15),
            optional_timeout: Duration::from_secs(3),
        }
    }
}

impl GraphConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        Url::parse(&self.base_url).map_err(|e| format!("graph.base_url: {e}"))?;

        if self.request_timeout.is_zero() {
            return Err("graph.request_timeout must be > 0".to_string());
        }
        if self.optional_timeout.is_zero() {
            return Err("graph.optional_timeout must be > 0".to_string());
        }

        Ok(())
    }
}
