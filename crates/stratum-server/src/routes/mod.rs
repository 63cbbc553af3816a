//! HTTP routes of the portal API.

pub mod auth;
pub mod graph;

use axum::{
    Router,
    http::{HeaderValue, StatusCode, header::LOCATION},
    response::{IntoResponse, Response},
    routing::get,
};

use crate::state::AppState;

/// All API routes, without middleware.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/signin", get(auth::signin))
        .route("/api/auth/callback", get(auth::callback))
        .route("/api/auth/signout", get(auth::signout).post(auth::signout))
        .route("/api/auth/session", get(auth::session))
        .route("/api/graph/me", get(graph::me))
        .route("/api/graph/status", get(graph::status))
}

/// `302 Found` to `location`.
pub(crate) fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(LOCATION, value)]).into_response(),
        Err(_) => (StatusCode::FOUND, [(LOCATION, HeaderValue::from_static("/"))]).into_response(),
    }
}
