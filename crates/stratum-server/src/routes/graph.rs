//! Graph-backed endpoints. Both require a session.

use axum::{Json, extract::State};
use axum_extra::extract::CookieJar;
use serde_json::{Value, json};
use stratum_graph::AggregatedProfile;

use crate::error::ApiError;
use crate::session::CurrentSession;
use crate::state::AppState;

/// `GET /api/graph/me`: the aggregated profile of the signed-in user.
///
/// The jar goes out on errors too; it may hold a carrier reissued by a
/// refresh.
pub async fn me(
    State(state): State<AppState>,
    CurrentSession { claims, jar }: CurrentSession,
) -> (CookieJar, Result<Json<AggregatedProfile>, ApiError>) {
    let profile = state
        .facade
        .fetch(&claims.credential.access_token)
        .await
        .inspect_err(|e| tracing::warn!(error = %e, call = %e.call(), "Graph aggregation failed"))
        .map(Json)
        .map_err(ApiError::from);

    (jar, profile)
}

/// `GET /api/graph/status`: whether Graph accepts the session's token.
pub async fn status(
    State(state): State<AppState>,
    CurrentSession { claims, jar }: CurrentSession,
) -> (CookieJar, Json<Value>) {
    let connected = state
        .facade
        .check_connection(&claims.credential.access_token)
        .await;
    (jar, Json(json!({ "connected": connected })))
}
