//! Microsoft Graph HTTP client.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::instrument;

use crate::GraphResult;
use crate::config::GraphConfig;
use crate::error::{GraphCall, GraphError};
use crate::models::{ODataCollection, ODataError, Organization, SecureScore, UserProfile};

/// Upstream calls needed by the [`AggregationFacade`](crate::AggregationFacade).
#[async_trait]
pub trait GraphApi: Send + Sync {
    /// The signed-in user.
    async fn profile(&self, access_token: &str) -> GraphResult<UserProfile>;

    /// The user's tenant. An empty collection is an error.
    async fn organization(&self, access_token: &str) -> GraphResult<Organization>;

    /// The latest secure score, or `None` when the tenant has no record.
    async fn secure_score(&self, access_token: &str) -> GraphResult<Option<SecureScore>>;
}

/// Graph client over `reqwest`.
///
/// Holds no per-user state; the access token is passed with every call.
#[derive(Debug, Clone)]
pub struct GraphClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl GraphClient {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &GraphConfig) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Issues a bearer-authorized GET for `call` and decodes the JSON body.
    #[instrument(skip(self, access_token), fields(call = %call))]
    async fn get<T: DeserializeOwned>(&self, call: GraphCall, access_token: &str) -> GraphResult<T> {
        let url = format!("{}{}", self.base_url, call.path());

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| GraphError::unavailable(call, e.to_string()))?;

        let status = response.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            tracing::debug!(status = status.as_u16(), "Graph rejected access token");
            return Err(GraphError::unauthorized(call, status.as_u16()));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ODataError>(&body) {
                Ok(odata) => format!("HTTP {status}: {} - {}", odata.error.code, odata.error.message),
                Err(_) => format!("HTTP {status}"),
            };
            return Err(GraphError::unavailable(call, message));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| GraphError::unavailable(call, format!("malformed payload: {e}")))
    }
}

#[async_trait]
impl GraphApi for GraphClient {
    async fn profile(&self, access_token: &str) -> GraphResult<UserProfile> {
        self.get(GraphCall::Profile, access_token).await
    }

    async fn organization(&self, access_token: &str) -> GraphResult<Organization> {
        let collection: ODataCollection<Organization> =
            self.get(GraphCall::Organization, access_token).await?;

        collection.value.into_iter().next().ok_or_else(|| {
            GraphError::unavailable(GraphCall::Organization, "malformed payload: no organization")
        })
    }

    async fn secure_score(&self, access_token: &str) -> GraphResult<Option<SecureScore>> {
        let collection: ODataCollection<SecureScore> =
            self.get(GraphCall::SecureScore, access_token).await?;
        Ok(collection.value.into_iter().next())
    }
}
