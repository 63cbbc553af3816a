//! Shared, read-only application state.

use std::sync::Arc;
use std::time::Duration;

use stratum_auth::{IdentityProviderClient, SessionCodec, SessionCookies, SessionManager};
use stratum_graph::{AggregationFacade, GraphClient};

use crate::config::AppConfig;

/// State handed to every handler. Cloning is cheap; nothing in here is
/// mutated after startup.
#[derive(Clone)]
pub struct AppState {
    /// Resolves the session carried by a request.
    pub sessions: SessionManager,
    /// Cookie names and attributes.
    pub cookies: SessionCookies,
    /// Identity provider client.
    pub provider: Arc<IdentityProviderClient>,
    /// Graph aggregation.
    pub facade: AggregationFacade,
    /// Lifetime of a pending sign-in.
    pub login_timeout: Duration,
    /// Default landing path after sign-in.
    pub post_login_path: Arc<str>,
    /// Public URL of the portal; absolute callback URLs under it are accepted.
    pub base_url: Arc<str>,
}

impl AppState {
    /// Builds the state from validated configuration.
    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let codec = Arc::new(SessionCodec::from_config(&cfg.auth.session));
        let provider = Arc::new(IdentityProviderClient::new(cfg.auth.provider.clone())?);
        let sessions = SessionManager::from_config(codec, &cfg.auth.session, provider.clone());

        let graph = GraphClient::new(&cfg.graph)?;
        let facade = AggregationFacade::new(Arc::new(graph), cfg.graph.optional_timeout);

        if cfg.auth.session.refresh_enabled {
            tracing::info!(skew = ?cfg.auth.session.refresh_skew, "Access token refresh enabled");
        }

        Ok(Self {
            sessions,
            cookies: SessionCookies::from_config(&cfg.auth.session),
            provider,
            facade,
            login_timeout: cfg.auth.session.login_timeout,
            post_login_path: cfg.server.post_login_path.as_str().into(),
            base_url: cfg.base_url().trim_end_matches('/').into(),
        })
    }
}
