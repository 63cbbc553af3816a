//! Sign-in, callback, sign-out and session endpoints.
//!
//! The flow is authorization code with PKCE. The pending sign-in lives in
//! a short-lived signed cookie, so any instance can complete it.

use axum::{
    Json,
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use serde_json::json;
use stratum_auth::{AuthError, AuthResult, LoginTransaction, SignedToken};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use super::found;
use crate::error::ApiError;
use crate::session::MaybeSession;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SignInQuery {
    #[serde(rename = "callbackUrl")]
    pub callback_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// `GET /api/auth/signin`: starts a sign-in and redirects to the provider.
pub async fn signin(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<SignInQuery>,
) -> Result<(CookieJar, Response), ApiError> {
    let target = return_path(&state, query.callback_url.as_deref());
    let transaction = LoginTransaction::new(&target);

    let sealed = transaction
        .seal(
            state.sessions.codec(),
            state.login_timeout,
            OffsetDateTime::now_utc(),
        )
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let url = state.provider.authorization_url(&transaction);
    tracing::debug!(callback = %transaction.callback_url, "Redirecting to identity provider");

    Ok((state.cookies.write_login(jar, &sealed), found(url.as_str())))
}

/// `GET /api/auth/callback`: completes the sign-in.
///
/// Success sets the session cookie and redirects to the requested page;
/// failure redirects to `/?error=<code>` without a session.
pub async fn callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let sealed = state.cookies.read_login(&jar);
    let jar = state.cookies.clear_login(jar);

    match complete_sign_in(&state, sealed.as_deref(), query).await {
        Ok((token, target)) => {
            tracing::info!("Sign-in completed");
            (state.cookies.write(jar, &token), found(&target)).into_response()
        }
        Err(err) => {
            if err.is_external_error() {
                tracing::warn!(error = %err, "Sign-in rejected by identity provider");
            } else {
                tracing::info!(error = %err, "Sign-in failed");
            }
            let location = format!("/?error={}", err.login_error_code());
            (state.cookies.clear(jar), found(&location)).into_response()
        }
    }
}

async fn complete_sign_in(
    state: &AppState,
    sealed: Option<&str>,
    query: CallbackQuery,
) -> AuthResult<(SignedToken, String)> {
    if let Some(error) = query.error {
        return Err(AuthError::identity_provider(
            error,
            query.error_description.unwrap_or_default(),
        ));
    }

    let codec = state.sessions.codec();
    let transaction = LoginTransaction::open(codec, sealed, OffsetDateTime::now_utc())
        .ok_or_else(|| AuthError::invalid_callback("no pending sign-in"))?;
    transaction.verify_state(query.state.as_deref())?;

    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AuthError::invalid_callback("missing authorization code"))?;

    let callback = state
        .provider
        .exchange_code(&code, &transaction.pkce_verifier, &transaction.nonce)
        .await?;
    let token = codec.encode(&callback, state.provider.config().fixed_tenant())?;

    Ok((token, transaction.callback_url))
}

/// `GET|POST /api/auth/signout`: drops the session.
pub async fn signout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Response) {
    let jar = state.cookies.clear_login(state.cookies.clear(jar));
    (jar, found("/"))
}

/// `GET /api/auth/session`: the public part of the current session, or `{}`.
pub async fn session(MaybeSession { claims, jar }: MaybeSession) -> (CookieJar, Json<serde_json::Value>) {
    let Some(claims) = claims else {
        return (jar, Json(json!({})));
    };

    let expires = OffsetDateTime::from_unix_timestamp(claims.expires)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok());

    let body = json!({
        "user": {
            "name": claims.display_name,
            "email": claims.email,
            "tenantId": claims.tenant_id,
        },
        "expires": expires,
    });
    (jar, Json(body))
}

/// Where to land after sign-in.
///
/// Absolute URLs under the portal's own base URL are reduced to their path;
/// everything else goes through the same-origin check of the login
/// transaction.
fn return_path(state: &AppState, requested: Option<&str>) -> String {
    let Some(requested) = requested.filter(|r| !r.is_empty()) else {
        return state.post_login_path.to_string();
    };

    match requested.strip_prefix(state.base_url.as_ref()) {
        Some("") => "/".to_string(),
        Some(rest) if rest.starts_with('/') => rest.to_string(),
        _ => requested.to_string(),
    }
}
