//! Session extractors.
//!
//! Both extractors decode the carrier cookie through the
//! [`SessionManager`](stratum_auth::SessionManager). When the manager
//! reissued the carrier, the returned jar already holds the new cookie and
//! the handler must include it in its response.

use std::convert::Infallible;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum_extra::extract::CookieJar;
use stratum_auth::{SessionClaims, SessionResolution};

use crate::error::ApiError;
use crate::state::AppState;

/// A required session; rejects with 401 when there is none.
///
/// ```ignore
/// async fn handler(CurrentSession { claims, jar }: CurrentSession) -> impl IntoResponse {
///     (jar, Json(claims.display_name))
/// }
/// ```
pub struct CurrentSession {
    pub claims: SessionClaims,
    pub jar: CookieJar,
}

/// An optional session; never rejects.
pub struct MaybeSession {
    pub claims: Option<SessionClaims>,
    pub jar: CookieJar,
}

impl<S> FromRequestParts<S> for MaybeSession
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let jar = CookieJar::from_headers(&parts.headers);
        let carrier = state.cookies.read(&jar);

        let session = match state.sessions.resolve(carrier.as_deref()).await {
            SessionResolution::Active { claims, reissued } => {
                let jar = match reissued {
                    Some(token) => state.cookies.write(jar, &token),
                    None => jar,
                };
                Self {
                    claims: Some(claims),
                    jar,
                }
            }
            SessionResolution::NoSession => Self { claims: None, jar },
        };

        Ok(session)
    }
}

impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Ok(MaybeSession { claims, jar }) = MaybeSession::from_request_parts(parts, state).await;

        match claims {
            Some(claims) => Ok(Self { claims, jar }),
            None => {
                tracing::debug!(path = %parts.uri.path(), "Request without a valid session");
                Err(ApiError::NoSession)
            }
        }
    }
}
