//! End-to-end tests: the real router on an ephemeral port, with the
//! identity provider and Graph mocked by wiremock.

use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use reqwest::{StatusCode, header};
use serde_json::{Value, json};
use stratum_server::{AppConfig, build_app};
use tokio::{net::TcpListener, sync::oneshot};
use url::Url;
use wiremock::matchers::{body_string_contains, header as header_eq, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SESSION_COOKIE: &str = "stratum.session-token";
const LOGIN_COOKIE: &str = "stratum.session-token.login";

struct TestServer {
    base: String,
    client: reqwest::Client,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

fn config(mock: &MockServer) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.server.base_url = Some("http://portal.test".into());
    cfg.auth.provider.client_id = "client-1".into();
    cfg.auth.provider.client_secret = Some("secret-1".into());
    cfg.auth.provider.tenant_id = "tenant-1".into();
    cfg.auth.provider.authority = mock.uri();
    cfg.auth.provider.redirect_uri = "http://portal.test/api/auth/callback".into();
    cfg.auth.session.secret = "integration-secret-0123456789abcdef".into();
    cfg.auth.session.secure_cookies = false;
    cfg.graph.base_url = format!("{}/v1.0", mock.uri());
    cfg.graph.optional_timeout = Duration::from_millis(500);
    cfg
}

async fn start(cfg: AppConfig) -> TestServer {
    let app = build_app(&cfg).expect("build app");
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = rx.await;
            })
            .await
            .unwrap();
    });

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    TestServer {
        base: format!("http://{addr}"),
        client,
        shutdown: Some(tx),
    }
}

/// `name=value` of the first `Set-Cookie` for `name`.
fn set_cookie(res: &reqwest::Response, name: &str) -> Option<String> {
    res.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{name}=")))
        .map(|v| v.split(';').next().unwrap_or_default().to_string())
}

fn location(res: &reqwest::Response) -> String {
    res.headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

fn id_token(nonce: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let claims = json!({
        "iss": "https://login.microsoftonline.com/tenant-1/v2.0",
        "sub": "subject-1",
        "aud": "client-1",
        "nonce": nonce,
        "tid": "tenant-1",
        "name": "Megan Bowen",
        "preferred_username": "MeganB@contoso.com"
    });
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}

async fn mount_graph(mock: &MockServer, access_token: &str) {
    let bearer = format!("Bearer {access_token}");
    let bearer = bearer.as_str();
    Mock::given(method("GET"))
        .and(path("/v1.0/me"))
        .and(header_eq("authorization", bearer))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "user-1",
            "displayName": "Megan Bowen",
            "mail": "MeganB@contoso.com",
            "userPrincipalName": "MeganB@contoso.com"
        })))
        .mount(mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/organization"))
        .and(header_eq("authorization", bearer))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{
                "id": "org-1",
                "displayName": "Contoso",
                "verifiedDomains": [{"name": "contoso.com", "isDefault": true}]
            }]
        })))
        .mount(mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/security/secureScores"))
        .and(header_eq("authorization", bearer))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{"currentScore": 30.0, "maxScore": 40.0}]
        })))
        .mount(mock)
        .await;
}

/// Runs sign-in and callback; returns the session cookie pair.
async fn sign_in(server: &TestServer, mock: &MockServer) -> String {
    sign_in_with(server, mock, 3600, None).await
}

/// Sign-in where the provider grants an access token living `expires_in`
/// seconds, with an optional refresh token.
async fn sign_in_with(
    server: &TestServer,
    mock: &MockServer,
    expires_in: u64,
    refresh_token: Option<&str>,
) -> String {
    let res = server
        .client
        .get(format!("{}/api/auth/signin?callbackUrl=/reports", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FOUND);

    let authorize = Url::parse(&location(&res)).unwrap();
    assert_eq!(authorize.path(), "/tenant-1/oauth2/v2.0/authorize");
    let param = |key: &str| {
        authorize
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
            .unwrap()
    };
    assert_eq!(param("code_challenge_method"), "S256");
    let state = param("state");
    let nonce = param("nonce");
    let login_cookie = set_cookie(&res, LOGIN_COOKIE).expect("login cookie");

    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/v2.0/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-1",
            "token_type": "Bearer",
            "expires_in": expires_in,
            "refresh_token": refresh_token,
            "id_token": id_token(&nonce),
        })))
        .expect(1)
        .mount(mock)
        .await;

    let res = server
        .client
        .get(format!(
            "{}/api/auth/callback?code=auth-code&state={state}",
            server.base
        ))
        .header(header::COOKIE, &login_cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(location(&res), "/reports");
    assert_eq!(set_cookie(&res, LOGIN_COOKIE).as_deref(), Some(format!("{LOGIN_COOKIE}=").as_str()));

    set_cookie(&res, SESSION_COOKIE).expect("session cookie")
}

#[tokio::test]
async fn test_healthz() {
    let mock = MockServer::start().await;
    let server = start(config(&mock)).await;

    let res = server
        .client
        .get(format!("{}/healthz", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_profile_requires_session_and_skips_graph() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock)
        .await;
    let server = start(config(&mock)).await;

    for cookie in [None, Some(format!("{SESSION_COOKIE}=forged.token.value"))] {
        let mut req = server.client.get(format!("{}/api/graph/me", server.base));
        if let Some(cookie) = cookie {
            req = req.header(header::COOKIE, cookie);
        }
        let res = req.send().await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body, json!({"error": "Unauthorized - Please sign in"}));
    }

    let res = server
        .client
        .get(format!("{}/api/graph/status", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_session_is_empty_without_cookie() {
    let mock = MockServer::start().await;
    let server = start(config(&mock)).await;

    let res = server
        .client
        .get(format!("{}/api/auth/session", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({}));
}

#[tokio::test]
async fn test_sign_in_then_fetch_profile() {
    let mock = MockServer::start().await;
    let server = start(config(&mock)).await;
    let session = sign_in(&server, &mock).await;
    mount_graph(&mock, "at-1").await;

    let res = server
        .client
        .get(format!("{}/api/auth/session", server.base))
        .header(header::COOKIE, &session)
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user"]["name"], "Megan Bowen");
    assert_eq!(body["user"]["email"], "MeganB@contoso.com");
    assert_eq!(body["user"]["tenantId"], "tenant-1");
    assert!(body["expires"].is_string());

    let res = server
        .client
        .get(format!("{}/api/graph/me", server.base))
        .header(header::COOKIE, &session)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(
        body,
        json!({
            "user": {"id": "user-1", "name": "Megan Bowen", "email": "MeganB@contoso.com"},
            "organization": {"id": "org-1", "name": "Contoso", "domains": ["contoso.com"]},
            "secureScore": {"current": 30.0, "max": 40.0, "percentage": 75},
            "message": "Successfully connected to Microsoft Graph API"
        })
    );

    let res = server
        .client
        .get(format!("{}/api/graph/status", server.base))
        .header(header::COOKIE, &session)
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({"connected": true}));
}

#[tokio::test]
async fn test_graph_rejection_maps_to_unauthorized() {
    let mock = MockServer::start().await;
    let server = start(config(&mock)).await;
    let session = sign_in(&server, &mock).await;

    Mock::given(method("GET"))
        .and(path("/v1.0/me"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"code": "InvalidAuthenticationToken", "message": "Access token has expired."}
        })))
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/organization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": [{"id": "org-1"}]})))
        .mount(&mock)
        .await;

    let res = server
        .client
        .get(format!("{}/api/graph/me", server.base))
        .header(header::COOKIE, &session)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "UpstreamAuthError");
}

#[tokio::test]
async fn test_callback_failures_redirect_with_error() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock)
        .await;
    let server = start(config(&mock)).await;

    // Provider-reported error
    let res = server
        .client
        .get(format!(
            "{}/api/auth/callback?error=access_denied&error_description=denied",
            server.base
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(location(&res), "/?error=OAuthCallback");

    // No pending sign-in
    let res = server
        .client
        .get(format!("{}/api/auth/callback?code=c&state=s", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(location(&res), "/?error=OAuthCallback");

    // State mismatch
    let res = server
        .client
        .get(format!("{}/api/auth/signin", server.base))
        .send()
        .await
        .unwrap();
    let login_cookie = set_cookie(&res, LOGIN_COOKIE).unwrap();
    let res = server
        .client
        .get(format!("{}/api/auth/callback?code=c&state=other", server.base))
        .header(header::COOKIE, login_cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(location(&res), "/?error=OAuthCallback");
    assert!(set_cookie(&res, SESSION_COOKIE).is_none_or(|c| c == format!("{SESSION_COOKIE}=")));
}

#[tokio::test]
async fn test_signout_clears_session() {
    let mock = MockServer::start().await;
    let server = start(config(&mock)).await;
    let session = sign_in(&server, &mock).await;

    let res = server
        .client
        .post(format!("{}/api/auth/signout", server.base))
        .header(header::COOKIE, &session)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(location(&res), "/");
    let cleared = res
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{SESSION_COOKIE}=")))
        .expect("removal cookie");
    assert!(cleared.contains("Max-Age=0"), "unexpected cookie: {cleared}");
}

#[tokio::test]
async fn test_graph_outage_maps_to_server_error() {
    let mock = MockServer::start().await;
    let server = start(config(&mock)).await;
    let session = sign_in(&server, &mock).await;

    Mock::given(method("GET"))
        .and(path("/v1.0/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "user-1"})))
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/organization"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": {"code": "serviceNotAvailable", "message": "Try again later"}
        })))
        .mount(&mock)
        .await;

    let res = server
        .client
        .get(format!("{}/api/graph/me", server.base))
        .header(header::COOKIE, &session)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Failed to fetch data from Microsoft Graph API");
    assert_eq!(body["code"], "UpstreamUnavailable");
    assert!(
        body["details"].as_str().is_some_and(|d| !d.is_empty()),
        "missing details: {body}"
    );
}

fn refreshing_config(mock: &MockServer) -> AppConfig {
    let mut cfg = config(mock);
    cfg.auth.session.refresh_enabled = true;
    cfg
}

async fn mount_refresh(mock: &MockServer, response: ResponseTemplate, calls: u64) {
    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/v2.0/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=rt-1"))
        .respond_with(response)
        .expect(calls)
        .mount(mock)
        .await;
}

fn refreshed_tokens() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": "at-new",
        "token_type": "Bearer",
        "expires_in": 3600,
        "refresh_token": "rt-new",
    }))
}

/// The reissued carrier, checked to be a real replacement of `old`.
fn reissued(res: &reqwest::Response, old: &str) -> String {
    let cookie = set_cookie(res, SESSION_COOKIE).expect("reissued session cookie");
    assert_ne!(cookie, format!("{SESSION_COOKIE}="));
    assert_ne!(cookie, old);
    cookie
}

#[tokio::test]
async fn test_expiring_session_is_refreshed_and_reissued() {
    let mock = MockServer::start().await;
    let server = start(refreshing_config(&mock)).await;
    // Inside the refresh skew right away
    let session = sign_in_with(&server, &mock, 30, Some("rt-1")).await;
    mount_refresh(&mock, refreshed_tokens(), 1).await;
    mount_graph(&mock, "at-new").await;

    let res = server
        .client
        .get(format!("{}/api/graph/me", server.base))
        .header(header::COOKIE, &session)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let renewed = reissued(&res, &session);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user"]["id"], "user-1");

    // The new carrier is fresh: no second refresh
    let res = server
        .client
        .get(format!("{}/api/auth/session", server.base))
        .header(header::COOKIE, &renewed)
        .send()
        .await
        .unwrap();
    assert!(set_cookie(&res, SESSION_COOKIE).is_none());
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user"]["tenantId"], "tenant-1");
}

#[tokio::test]
async fn test_reissued_carrier_survives_graph_failure() {
    let mock = MockServer::start().await;
    let server = start(refreshing_config(&mock)).await;
    let session = sign_in_with(&server, &mock, 30, Some("rt-1")).await;
    mount_refresh(&mock, refreshed_tokens(), 2).await;

    Mock::given(method("GET"))
        .and(path("/v1.0/me"))
        .and(header_eq("authorization", "Bearer at-new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "user-1"})))
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/organization"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock)
        .await;

    let res = server
        .client
        .get(format!("{}/api/graph/me", server.base))
        .header(header::COOKIE, &session)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    reissued(&res, &session);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "UpstreamUnavailable");

    let res = server
        .client
        .get(format!("{}/api/graph/status", server.base))
        .header(header::COOKIE, &session)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    reissued(&res, &session);
}

#[tokio::test]
async fn test_failed_refresh_is_no_session() {
    let mock = MockServer::start().await;
    let server = start(refreshing_config(&mock)).await;
    let session = sign_in_with(&server, &mock, 30, Some("rt-1")).await;
    mount_refresh(
        &mock,
        ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "AADSTS700082: The refresh token has expired."
        })),
        1,
    )
    .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock)
        .await;

    let res = server
        .client
        .get(format!("{}/api/graph/me", server.base))
        .header(header::COOKIE, &session)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({"error": "Unauthorized - Please sign in"}));
}
