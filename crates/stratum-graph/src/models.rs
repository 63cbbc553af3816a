//! Microsoft Graph wire types.
//!
//! Only the fields the portal reads are declared; Graph returns many more.

use serde::Deserialize;

/// OData collection wrapper (`{"value": [...]}`).
#[derive(Debug, Deserialize)]
pub struct ODataCollection<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
}

/// Signed-in user (`GET /me`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub display_name: Option<String>,
    pub mail: Option<String>,
    pub user_principal_name: Option<String>,
}

impl UserProfile {
    /// Mailbox address, or the sign-in name for accounts without one.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.mail
            .as_deref()
            .filter(|m| !m.is_empty())
            .or(self.user_principal_name.as_deref())
    }
}

/// Tenant (`GET /organization`, first element).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: String,
    pub display_name: Option<String>,
    #[serde(default)]
    pub verified_domains: Option<Vec<VerifiedDomain>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedDomain {
    pub name: String,
    #[serde(default)]
    pub is_default: bool,
}

/// Secure score snapshot (`GET /security/secureScores`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecureScore {
    pub current_score: Option<f64>,
    pub max_score: Option<f64>,
    pub created_date_time: Option<String>,
}

/// Graph error body (`{"error": {"code", "message"}}`).
#[derive(Debug, Deserialize)]
pub(crate) struct ODataError {
    pub error: ODataErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ODataErrorDetail {
    pub code: String,
    pub message: String,
}
