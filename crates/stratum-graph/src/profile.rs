//! The aggregated profile document.

use serde::Serialize;

use crate::models::{Organization, SecureScore, UserProfile};

/// Status message of a successful aggregation.
pub const CONNECTED_MESSAGE: &str = "Successfully connected to Microsoft Graph API";

/// Profile, tenant and (when available) secure score of the signed-in user.
///
/// Built fresh for every request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedProfile {
    #[serde(rename = "user")]
    pub identity: Identity,

    pub organization: OrganizationSummary,

    /// `null` when the score could not be fetched or is not meaningful.
    #[serde(rename = "secureScore")]
    pub security_score: Option<SecurityScore>,

    #[serde(rename = "message")]
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrganizationSummary {
    pub id: String,
    pub name: Option<String>,
    /// Verified domain names in the order Graph lists them.
    pub domains: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityScore {
    pub current: f64,
    pub max: f64,
    /// `round(current / max * 100)`
    pub percentage: i64,
}

impl SecurityScore {
    /// Builds a score from the raw Graph values.
    ///
    /// Returns `None` unless both values are present and finite and `max > 0`.
    #[must_use]
    pub fn from_raw(current: Option<f64>, max: Option<f64>) -> Option<Self> {
        let (current, max) = (current?, max?);
        if !current.is_finite() || !max.is_finite() || max <= 0.0 {
            return None;
        }

        let percentage = (current / max * 100.0).round() as i64;
        Some(Self {
            current,
            max,
            percentage,
        })
    }
}

impl AggregatedProfile {
    /// Combines the results of the three Graph calls.
    #[must_use]
    pub fn merge(
        user: UserProfile,
        organization: Organization,
        score: Option<SecureScore>,
    ) -> Self {
        let email = user.email().map(str::to_string);

        let domains = organization
            .verified_domains
            .unwrap_or_default()
            .into_iter()
            .map(|d| d.name)
            .collect();

        let security_score =
            score.and_then(|s| SecurityScore::from_raw(s.current_score, s.max_score));

        Self {
            identity: Identity {
                id: user.id,
                name: user.display_name,
                email,
            },
            organization: OrganizationSummary {
                id: organization.id,
                name: organization.display_name,
                domains,
            },
            security_score,
            status: CONNECTED_MESSAGE.to_string(),
        }
    }
}
