//! Identity provider client.
//!
//! Talks to the v2.0 authorize and token endpoints of the configured tenant:
//!
//! 1. **Authorization URL** - built from a [`LoginTransaction`] (state, nonce, PKCE)
//! 2. **Code exchange** - authorization code + verifier for tokens
//! 3. **ID token** - identity claims read from the token response
//! 4. **Refresh** - refresh-token grant, used by the [`SessionManager`](crate::SessionManager)
//!
//! The ID token is received directly from the token endpoint over TLS, so its
//! payload is read without verifying the signature. Audience and nonce are
//! still checked.

use std::collections::HashMap;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;

use crate::AuthResult;
use crate::config::ProviderConfig;
use crate::error::AuthError;
use crate::login::LoginTransaction;
use crate::pkce::{PkceChallenge, PkceVerifier};
use crate::session::{ProviderCallback, RefreshedTokens, TokenRefresher};

/// OAuth token response.
///
/// Every field is optional so that an incomplete response surfaces as
/// `MalformedProviderResponse` instead of a parse error.
#[derive(Debug, Default, Deserialize)]
pub struct TokenResponse {
    /// The access token.
    pub access_token: Option<String>,

    /// The token type (usually "Bearer").
    pub token_type: Option<String>,

    /// Token lifetime in seconds.
    pub expires_in: Option<u64>,

    /// Refresh token, present when `offline_access` was granted.
    pub refresh_token: Option<String>,

    /// The ID token (JWT). Absent on most refresh responses.
    pub id_token: Option<String>,

    /// Granted scopes.
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Absolute expiry; `None` when absent or out of range.
    fn expires_at(&self, now: OffsetDateTime) -> Option<i64> {
        self.expires_in
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(|secs| now.unix_timestamp().checked_add(secs))
    }
}

/// OAuth error response from the provider.
#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    error: String,
    error_description: Option<String>,
}

/// ID token claims used by the portal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdTokenClaims {
    /// Issuer identifier.
    pub iss: String,

    /// Subject identifier.
    pub sub: String,

    /// Audience (string or array).
    #[serde(deserialize_with = "deserialize_audience")]
    pub aud: Vec<String>,

    /// Expiration time (Unix timestamp).
    pub exp: Option<i64>,

    /// Issued at time (Unix timestamp).
    pub iat: Option<i64>,

    /// Nonce echoed from the authorization request.
    pub nonce: Option<String>,

    /// Tenant id.
    pub tid: Option<String>,

    /// Object id of the user in the tenant.
    pub oid: Option<String>,

    /// Display name.
    pub name: Option<String>,

    /// Email address; often absent for accounts without a mailbox.
    pub email: Option<String>,

    /// Sign-in name (UPN).
    pub preferred_username: Option<String>,

    /// Claims not listed above.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl IdTokenClaims {
    /// Reads the payload of a compact JWT without verifying its signature.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::MalformedProviderResponse` if the token is not a
    /// three-part JWT or its payload is not JSON.
    pub fn from_unverified_jwt(token: &str) -> AuthResult<Self> {
        let mut parts = token.split('.');
        let (Some(_header), Some(payload), Some(_signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::malformed_provider_response(
                "id_token is not a compact JWT",
            ));
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| {
                AuthError::malformed_provider_response(format!("id_token payload: {e}"))
            })?;

        serde_json::from_slice(&bytes).map_err(|e| {
            AuthError::malformed_provider_response(format!("id_token claims: {e}"))
        })
    }
}

fn deserialize_audience<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => Ok(vec![s]),
        OneOrMany::Many(v) => Ok(v),
    }
}

/// Client for the configured identity provider.
pub struct IdentityProviderClient {
    http_client: reqwest::Client,
    config: ProviderConfig,
    authorization_endpoint: Url,
    token_endpoint: Url,
}

impl IdentityProviderClient {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the endpoints cannot be built or
    /// the HTTP client cannot be created.
    pub fn new(config: ProviderConfig) -> AuthResult<Self> {
        let authorization_endpoint = config.authorization_endpoint()?;
        let token_endpoint = config.token_endpoint()?;

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AuthError::configuration(format!("HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            config,
            authorization_endpoint,
            token_endpoint,
        })
    }

    /// Returns the provider configuration.
    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Builds the URL the browser is redirected to for sign-in.
    #[must_use]
    pub fn authorization_url(&self, transaction: &LoginTransaction) -> Url {
        let challenge = PkceChallenge::from_verifier(&transaction.pkce_verifier);

        let mut url = self.authorization_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("response_mode", "query")
            .append_pair("scope", &self.config.scope_string())
            .append_pair("state", &transaction.state)
            .append_pair("nonce", &transaction.nonce)
            .append_pair("code_challenge", challenge.as_str())
            .append_pair("code_challenge_method", PkceChallenge::METHOD);

        url
    }

    /// Exchanges an authorization code for tokens.
    ///
    /// The returned callback may still lack an access token or expiry; the
    /// session codec rejects such callbacks.
    ///
    /// # Errors
    ///
    /// - `AuthError::IdentityProvider` if the token endpoint rejects the code
    /// - `AuthError::Network` if it cannot be reached
    /// - `AuthError::MalformedProviderResponse` if no usable ID token is returned
    /// - `AuthError::InvalidCallback` on audience or nonce mismatch
    pub async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: &PkceVerifier,
        expected_nonce: &str,
    ) -> AuthResult<ProviderCallback> {
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("code_verifier", pkce_verifier.as_str()),
        ];
        if let Some(secret) = &self.config.client_secret {
            params.push(("client_secret", secret.as_str()));
        }

        tracing::debug!(endpoint = %self.token_endpoint, "Exchanging authorization code");
        let now = OffsetDateTime::now_utc();
        let response = self.token_request(&params).await?;

        let raw_id_token = response
            .id_token
            .as_deref()
            .ok_or_else(|| AuthError::malformed_provider_response("missing id_token"))?;
        let id_token = IdTokenClaims::from_unverified_jwt(raw_id_token)?;
        self.check_id_token(&id_token, expected_nonce)?;

        tracing::info!(
            tenant = id_token.tid.as_deref().unwrap_or("-"),
            "Authorization code exchanged"
        );

        Ok(ProviderCallback {
            expires_at: response.expires_at(now),
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            id_token,
        })
    }

    /// Redeems a refresh token.
    ///
    /// # Errors
    ///
    /// Same as [`exchange_code`](Self::exchange_code); a response without an
    /// access token or expiry is `MalformedProviderResponse`.
    pub async fn refresh_tokens(&self, refresh_token: &str) -> AuthResult<RefreshedTokens> {
        let scope = self.config.scope_string();
        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("scope", scope.as_str()),
        ];
        if let Some(secret) = &self.config.client_secret {
            params.push(("client_secret", secret.as_str()));
        }

        let now = OffsetDateTime::now_utc();
        let response = self.token_request(&params).await?;

        let expires_at = response
            .expires_at(now)
            .ok_or_else(|| AuthError::malformed_provider_response("missing expires_in"))?;
        let access_token = response
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::malformed_provider_response("missing access_token"))?;

        Ok(RefreshedTokens {
            access_token,
            refresh_token: response.refresh_token,
            expires_at,
        })
    }

    fn check_id_token(&self, claims: &IdTokenClaims, expected_nonce: &str) -> AuthResult<()> {
        if !claims.aud.iter().any(|aud| aud == &self.config.client_id) {
            return Err(AuthError::invalid_callback(
                "ID token was not issued to this client",
            ));
        }

        match claims.nonce.as_deref() {
            Some(nonce) if nonce == expected_nonce => Ok(()),
            _ => Err(AuthError::invalid_callback("ID token nonce mismatch")),
        }
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> AuthResult<TokenResponse> {
        let response = self
            .http_client
            .post(self.token_endpoint.as_str())
            .form(params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if let Ok(oauth_error) = serde_json::from_str::<OAuthErrorResponse>(&body) {
                tracing::warn!(error = %oauth_error.error, "Token endpoint rejected request");
                return Err(AuthError::identity_provider(
                    oauth_error.error,
                    oauth_error.error_description.unwrap_or_default(),
                ));
            }

            return Err(AuthError::identity_provider(format!("HTTP {status}"), body));
        }

        response.json::<TokenResponse>().await.map_err(|e| {
            AuthError::malformed_provider_response(format!("token response: {e}"))
        })
    }
}

#[async_trait]
impl TokenRefresher for IdentityProviderClient {
    async fn refresh(&self, refresh_token: &str) -> AuthResult<RefreshedTokens> {
        self.refresh_tokens(refresh_token).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const TOKEN_PATH: &str = "/tenant-1/oauth2/v2.0/token";

    fn unsigned_jwt(claims: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        format!("{header}.{payload}.c2lnbmF0dXJl")
    }

    fn id_token(nonce: &str) -> String {
        unsigned_jwt(json!({
            "iss": "https://login.microsoftonline.com/tenant-1/v2.0",
            "sub": "subject-1",
            "aud": "client-1",
            "nonce": nonce,
            "tid": "tenant-1",
            "name": "Alex Wilber",
            "preferred_username": "alexw@contoso.com"
        }))
    }

    fn client(server: &MockServer) -> IdentityProviderClient {
        let config = ProviderConfig {
            client_id: "client-1".to_string(),
            client_secret: Some("s3cret".to_string()),
            tenant_id: "tenant-1".to_string(),
            authority: server.uri(),
            ..ProviderConfig::default()
        };
        IdentityProviderClient::new(config).unwrap()
    }

    #[test]
    fn test_id_token_claims_deserialize() {
        let claims = IdTokenClaims::from_unverified_jwt(&id_token("n-1")).unwrap();
        assert_eq!(claims.sub, "subject-1");
        assert_eq!(claims.aud, vec!["client-1"]);
        assert_eq!(claims.tid.as_deref(), Some("tenant-1"));
        assert!(claims.email.is_none());
    }

    #[test]
    fn test_id_token_array_audience() {
        let token = unsigned_jwt(json!({"sub": "s", "aud": ["a", "b"]}));
        let claims = IdTokenClaims::from_unverified_jwt(&token).unwrap();
        assert_eq!(claims.aud, vec!["a", "b"]);
    }

    #[test]
    fn test_id_token_not_a_jwt() {
        assert!(matches!(
            IdTokenClaims::from_unverified_jwt("opaque-token"),
            Err(AuthError::MalformedProviderResponse { .. })
        ));
        assert!(IdTokenClaims::from_unverified_jwt("a.!!!.c").is_err());
    }

    #[tokio::test]
    async fn test_authorization_url() {
        let server = MockServer::start().await;
        let client = client(&server);
        let transaction = LoginTransaction::new("/dashboard");

        let url = client.authorization_url(&transaction);
        assert!(url.path().ends_with("/tenant-1/oauth2/v2.0/authorize"));

        let pairs: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["client_id"], "client-1");
        assert_eq!(pairs["state"], transaction.state);
        assert_eq!(pairs["nonce"], transaction.nonce);
        assert_eq!(pairs["code_challenge_method"], "S256");
        assert_eq!(
            pairs["code_challenge"],
            PkceChallenge::from_verifier(&transaction.pkce_verifier).as_str()
        );
        assert!(pairs["scope"].contains("offline_access"));
    }

    #[tokio::test]
    async fn test_exchange_code_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=auth-code"))
            .and(body_string_contains("client_secret=s3cret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "at-1",
                "token_type": "Bearer",
                "expires_in": 3599,
                "refresh_token": "rt-1",
                "id_token": id_token("n-1"),
            })))
            .expect(1)
            .mount(&server)
            .await;

        let before = OffsetDateTime::now_utc().unix_timestamp();
        let callback = client(&server)
            .exchange_code("auth-code", &PkceVerifier::generate(), "n-1")
            .await
            .unwrap();

        assert_eq!(callback.access_token.as_deref(), Some("at-1"));
        assert_eq!(callback.refresh_token.as_deref(), Some("rt-1"));
        let expires_at = callback.expires_at.unwrap();
        assert!(expires_at >= before + 3599 && expires_at <= before + 3600 + 5);
        assert_eq!(callback.id_token.tid.as_deref(), Some("tenant-1"));
    }

    #[tokio::test]
    async fn test_exchange_code_without_access_token_passes_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token_type": "Bearer",
                "id_token": id_token("n-1"),
            })))
            .mount(&server)
            .await;

        let callback = client(&server)
            .exchange_code("auth-code", &PkceVerifier::generate(), "n-1")
            .await
            .unwrap();
        assert!(callback.access_token.is_none());
        assert!(callback.expires_at.is_none());
    }

    #[tokio::test]
    async fn test_exchange_code_oauth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "AADSTS70008: The provided authorization code has expired."
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .exchange_code("stale", &PkceVerifier::generate(), "n-1")
            .await
            .unwrap_err();
        match err {
            AuthError::IdentityProvider { error, description } => {
                assert_eq!(error, "invalid_grant");
                assert!(description.starts_with("AADSTS70008"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exchange_code_rejects_nonce_mismatch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "at-1",
                "expires_in": 3600,
                "id_token": id_token("someone-elses-nonce"),
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .exchange_code("auth-code", &PkceVerifier::generate(), "n-1")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCallback { .. }));
    }

    #[tokio::test]
    async fn test_exchange_code_requires_id_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "at-1",
                "expires_in": 3600,
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .exchange_code("auth-code", &PkceVerifier::generate(), "n-1")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MalformedProviderResponse { .. }));
    }

    #[tokio::test]
    async fn test_refresh_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=rt-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "at-2",
                "expires_in": 3600,
                "refresh_token": "rt-2",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        let refresher: &dyn TokenRefresher = &client;
        let tokens = refresher.refresh("rt-1").await.unwrap();
        assert_eq!(tokens.access_token, "at-2");
        assert_eq!(tokens.refresh_token.as_deref(), Some("rt-2"));
    }

    #[test]
    fn test_expires_at_out_of_range() {
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let response = |expires_in| TokenResponse {
            expires_in: Some(expires_in),
            ..TokenResponse::default()
        };

        assert_eq!(response(60).expires_at(now), Some(1_700_000_060));
        assert_eq!(response(u64::MAX).expires_at(now), None);
        assert_eq!(response(i64::MAX as u64).expires_at(now), None);
    }

    #[tokio::test]
    async fn test_refresh_with_absurd_lifetime_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "at-2",
                "expires_in": u64::MAX,
            })))
            .mount(&server)
            .await;

        let err = client(&server).refresh_tokens("rt-1").await.unwrap_err();
        assert!(matches!(err, AuthError::MalformedProviderResponse { .. }));
    }

    #[tokio::test]
    async fn test_refresh_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .mount(&server)
            .await;

        let err = client(&server).refresh_tokens("rt-1").await.unwrap_err();
        match err {
            AuthError::IdentityProvider { error, description } => {
                assert_eq!(error, "HTTP 500 Internal Server Error");
                assert_eq!(description, "upstream exploded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
