//! HTTP route handlers for the Folio Gate server.
//!
//! This module provides the HTTP API endpoints:
//!
//! - `POST /admin/login` - Exchange password (and TOTP code) for a session
//! - `GET /admin/session` - Report whether the presented session is valid
//! - `POST /admin/logout` - Clear the session cookie
//! - `POST /admin/totp/setup` - Generate a TOTP secret for enrolment
//! - `GET /health` - Health check endpoint
//!
//! # Architecture
//!
//! All routes share application state through [`AppState`], which contains:
//! - Configuration (cookie and session settings)
//! - The admin gate that checks credentials and validates tokens
//! - The login throttle
//! - Server start time for uptime reporting
//!
//! Sessions are presented either as `Authorization: Bearer <token>` or as the
//! `folio_admin_session` cookie set by a successful login.
//!
//! # Example
//!
//! ```rust,no_run
//! use folio_gate::config::Config;
//! use folio_gate::routes::{create_router, AppState};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("failed to load config");
//!     let state = AppState::new(config);
//!     let app = create_router(state);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Query, State},
    http::{
        header::{AUTHORIZATION, COOKIE, SET_COOKIE},
        Extensions, HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tokio::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ErrorResponse, ServerError};
use crate::gate::{AdminGate, LoginOutcome, RejectReason};
use crate::rate_limit::{LoginThrottle, RateLimitResult};
use crate::token::SessionToken;
use crate::totp::{TotpSetup, DEFAULT_ACCOUNT, DEFAULT_ISSUER};
use crate::types::{HealthResponse, LoginRequest, LoginResponse, SessionStatus, TotpSetupResponse};

// ============================================================================
// Constants
// ============================================================================

/// Name of the session cookie.
pub const SESSION_COOKIE_NAME: &str = "folio_admin_session";

/// Header consulted for the client address behind a reverse proxy.
const HEADER_FORWARDED_FOR: &str = "X-Forwarded-For";

/// Throttle key used when the client address is unknown.
const UNKNOWN_CLIENT: &str = "unknown";

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for all route handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<Config>,

    /// Credential checks and token validation.
    pub gate: Arc<AdminGate>,

    /// Per-client login throttle.
    pub throttle: LoginThrottle,

    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Creates application state with the default login throttle.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::with_throttle(config, LoginThrottle::default())
    }

    /// Creates application state with a custom login throttle.
    #[must_use]
    pub fn with_throttle(config: Config, throttle: LoginThrottle) -> Self {
        let gate = Arc::new(config.gate());
        Self {
            config: Arc::new(config),
            gate,
            throttle,
            start_time: Instant::now(),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &"<Config>")
            .field("totp_enabled", &self.gate.totp_enabled())
            .field("throttle", &self.throttle)
            .field("start_time", &self.start_time)
            .finish()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Creates the application router with all routes configured.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/admin/login", post(post_login))
        .route("/admin/session", get(get_session))
        .route("/admin/logout", post(post_logout))
        .route("/admin/totp/setup", post(post_totp_setup))
        .route("/health", get(get_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Cookie and token helpers
// ============================================================================

/// Builds the `HttpOnly` session cookie carrying `token`.
fn session_cookie(config: &Config, token: &str) -> Result<HeaderValue, ServerError> {
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}",
        config.session_max_age.as_secs()
    );
    if config.cookie_secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
        .map_err(|err| ServerError::internal(format!("invalid cookie header: {err}")))
}

/// Builds a cookie that makes the browser drop the session cookie.
fn clear_session_cookie(config: &Config) -> HeaderValue {
    let cookie = if config.cookie_secure {
        "folio_admin_session=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0; Secure"
    } else {
        "folio_admin_session=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0"
    };
    HeaderValue::from_static(cookie)
}

/// Finds the presented session token: bearer header first, then cookie.
fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }

    let value = headers.get(COOKIE)?.to_str().ok()?;
    value.split(';').find_map(|pair| {
        let (key, val) = pair.trim().split_once('=')?;
        (key.trim() == SESSION_COOKIE_NAME && !val.trim().is_empty())
            .then(|| val.trim().to_string())
    })
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Identifies the client for throttling.
///
/// The peer address is the key. `X-Forwarded-For` is only consulted when
/// `trust_forwarded_for` is set, since any client can write that header.
fn client_id(headers: &HeaderMap, extensions: &Extensions, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get(HEADER_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        if let Some(addr) = forwarded {
            return addr.to_string();
        }
    }

    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Validates the presented session, if any.
fn authenticated_session(state: &AppState, headers: &HeaderMap) -> Option<SessionToken> {
    let raw = extract_session_token(headers)?;
    state.gate.inspect(&raw)
}

/// 401 response that also clears the session cookie.
fn unauthenticated(config: &Config) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(SET_COOKIE, clear_session_cookie(config))],
        Json(ErrorResponse::new("not signed in").with_code("invalid_session")),
    )
        .into_response()
}

// ============================================================================
// POST /admin/login
// ============================================================================

/// POST /admin/login - Exchange credentials for a session token.
///
/// # Request Body
///
/// ```json
/// { "password": "...", "code": "123456" }
/// ```
///
/// `code` may be omitted when TOTP is disabled, or on a first attempt to
/// learn whether it is required.
///
/// # Responses
///
/// - `200 OK` - Token in the body and in a `Set-Cookie` header
/// - `401 Unauthorized` - `invalid_credentials`, `totp_required` or `invalid_totp`
/// - `429 Too Many Requests` - Too many attempts, with `Retry-After`
async fn post_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    extensions: Extensions,
    Json(request): Json<LoginRequest>,
) -> Result<Response, ServerError> {
    let client = client_id(&headers, &extensions, state.config.trust_forwarded_for);

    if let RateLimitResult::Limited { retry_after_secs } = state.throttle.check(&client).await {
        info!(
            client = %client,
            retry_after = retry_after_secs,
            "Login attempts exceeded"
        );
        return Err(ServerError::rate_limit(client, retry_after_secs));
    }

    match state.gate.login(&request.password, request.code.as_deref())? {
        LoginOutcome::Authenticated(token) => {
            state.throttle.reset(&client).await;

            let expires_at = state
                .gate
                .authority()
                .expires_at(&token)
                .ok_or_else(|| ServerError::internal("token expiry out of range"))?;
            let token = token.to_string();
            let cookie = session_cookie(&state.config, &token)?;

            info!(client = %client, "Admin login succeeded");
            Ok((
                StatusCode::OK,
                [(SET_COOKIE, cookie)],
                Json(LoginResponse { token, expires_at }),
            )
                .into_response())
        }
        LoginOutcome::TotpRequired => Err(ServerError::auth(
            "authentication code required",
            "totp_required",
        )),
        LoginOutcome::Rejected(RejectReason::Password) => {
            warn!(client = %client, "Admin login failed: password");
            Err(ServerError::auth("incorrect password", "invalid_credentials"))
        }
        LoginOutcome::Rejected(RejectReason::TotpCode) => {
            warn!(client = %client, "Admin login failed: authentication code");
            Err(ServerError::auth(
                "invalid authentication code",
                "invalid_totp",
            ))
        }
    }
}

// ============================================================================
// GET /admin/session
// ============================================================================

/// GET /admin/session - Check the presented session.
///
/// # Responses
///
/// - `200 OK` - [`SessionStatus`]
/// - `401 Unauthorized` - Missing, expired or forged token; the cookie is cleared
async fn get_session(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(token) = authenticated_session(&state, &headers) else {
        debug!("Session check failed");
        return unauthenticated(&state.config);
    };

    match (token.issued_at(), state.gate.authority().expires_at(&token)) {
        (Some(issued_at), Some(expires_at)) => Json(SessionStatus {
            authenticated: true,
            issued_at,
            expires_at,
            totp_enabled: state.gate.totp_enabled(),
        })
        .into_response(),
        _ => ServerError::internal("session timestamp out of range").into_response(),
    }
}

// ============================================================================
// POST /admin/logout
// ============================================================================

/// POST /admin/logout - Clear the session cookie.
///
/// Always succeeds. Tokens are stateless, so a copy kept elsewhere stays
/// valid until it expires or the password changes.
async fn post_logout(State(state): State<AppState>) -> Response {
    info!("Admin logout");
    (
        StatusCode::NO_CONTENT,
        [(SET_COOKIE, clear_session_cookie(&state.config))],
    )
        .into_response()
}

// ============================================================================
// POST /admin/totp/setup
// ============================================================================

/// Optional labels for the provisioning URI.
#[derive(Debug, Deserialize)]
pub struct TotpSetupParams {
    /// Account label, defaults to `Admin`.
    pub account: Option<String>,

    /// Issuer label, defaults to `VibeCoding`.
    pub issuer: Option<String>,
}

/// POST /admin/totp/setup - Generate a TOTP secret for enrolment.
///
/// Requires a valid session. The secret is returned once and not stored;
/// the operator enrols it and copies it into `FOLIO_TOTP_SECRET`.
async fn post_totp_setup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<TotpSetupParams>,
) -> Result<Response, ServerError> {
    if authenticated_session(&state, &headers).is_none() {
        return Ok(unauthenticated(&state.config));
    }

    let account = params.account.as_deref().unwrap_or(DEFAULT_ACCOUNT);
    let issuer = params.issuer.as_deref().unwrap_or(DEFAULT_ISSUER);
    let setup = TotpSetup::generate(account, issuer)?;

    info!("TOTP enrolment secret generated");
    Ok(Json(TotpSetupResponse {
        secret: setup.secret.as_base32().to_string(),
        uri: setup.uri.clone(),
    })
    .into_response())
}

// ============================================================================
// GET /health
// ============================================================================

/// GET /health - Health check endpoint.
///
/// No authentication required.
async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        totp_enabled: state.gate.totp_enabled(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use std::time::Duration;
    use tower::ServiceExt;

    use crate::gate::hash_password;
    use crate::totp::{code_at, TotpSecret};

    const PASSWORD: &str = "correct horse battery staple";
    const SECRET: &str = "JBSWY3DPEHPK3PXP";

    fn test_config(totp: bool) -> Config {
        Config {
            password_hash: hash_password(PASSWORD),
            totp_secret: totp.then(|| TotpSecret::parse(SECRET).unwrap()),
            session_max_age: Duration::from_secs(86_400),
            session_future_skew: Duration::from_secs(60),
            totp_skew_steps: 1,
            cookie_secure: false,
            trust_forwarded_for: false,
            port: 8080,
        }
    }

    fn current_code() -> String {
        let secret = TotpSecret::parse(SECRET).unwrap();
        code_at(&secret, Utc::now().timestamp(), 0).unwrap()
    }

    fn login_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/admin/login")
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    async fn login_token(app: &Router) -> String {
        let response = app
            .clone()
            .oneshot(login_request(&format!(r#"{{"password":"{PASSWORD}"}}"#)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        body_json(response).await["token"]
            .as_str()
            .unwrap()
            .to_string()
    }

    // ========================================================================
    // Health endpoint tests
    // ========================================================================

    #[tokio::test]
    async fn health_returns_ok_status() {
        let app = create_router(AppState::new(test_config(true)));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let health = body_json(response).await;
        assert_eq!(health["status"], "ok");
        assert_eq!(health["totp_enabled"], true);
    }

    // ========================================================================
    // POST /admin/login tests
    // ========================================================================

    #[tokio::test]
    async fn login_succeeds_with_password_only() {
        let app = create_router(AppState::new(test_config(false)));

        let response = app
            .oneshot(login_request(&format!(r#"{{"password":"{PASSWORD}"}}"#)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(cookie.starts_with("folio_admin_session="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(cookie.contains("Max-Age=86400"));
        assert!(!cookie.contains("Secure"));

        let body = body_json(response).await;
        let token = body["token"].as_str().unwrap();
        assert_eq!(token.split('.').count(), 3);
        assert!(cookie.contains(token));
        assert!(body["expires_at"].is_string());
    }

    #[tokio::test]
    async fn login_sets_secure_cookie_when_configured() {
        let mut config = test_config(false);
        config.cookie_secure = true;
        let app = create_router(AppState::new(config));

        let response = app
            .oneshot(login_request(&format!(r#"{{"password":"{PASSWORD}"}}"#)))
            .await
            .unwrap();

        let cookie = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.ends_with("; Secure"));
    }

    #[tokio::test]
    async fn login_rejects_wrong_password() {
        let app = create_router(AppState::new(test_config(false)));

        let response = app
            .oneshot(login_request(r#"{"password":"wrong"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(SET_COOKIE).is_none());
        let body = body_json(response).await;
        assert_eq!(body["error"], "incorrect password");
        assert_eq!(body["code"], "invalid_credentials");
    }

    #[tokio::test]
    async fn login_asks_for_totp_code() {
        let app = create_router(AppState::new(test_config(true)));

        let response = app
            .oneshot(login_request(&format!(r#"{{"password":"{PASSWORD}"}}"#)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(SET_COOKIE).is_none());
        let body = body_json(response).await;
        assert_eq!(body["error"], "authentication code required");
        assert_eq!(body["code"], "totp_required");
    }

    #[tokio::test]
    async fn login_rejects_wrong_totp_code() {
        let app = create_router(AppState::new(test_config(true)));

        // Malformed codes never match any window.
        let response = app
            .oneshot(login_request(&format!(
                r#"{{"password":"{PASSWORD}","code":"abcdef"}}"#
            )))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["error"], "invalid authentication code");
        assert_eq!(body["code"], "invalid_totp");
    }

    #[tokio::test]
    async fn login_succeeds_with_totp_code() {
        let app = create_router(AppState::new(test_config(true)));

        let response = app
            .oneshot(login_request(&format!(
                r#"{{"password":"{PASSWORD}","code":"{}"}}"#,
                current_code()
            )))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    /// Wrong-password login from `peer`, optionally claiming a forwarded address.
    fn attempt_from(peer: [u8; 4], forwarded_for: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/admin/login")
            .header("Content-Type", "application/json")
            .extension(ConnectInfo(SocketAddr::from((peer, 40_000))));
        if let Some(value) = forwarded_for {
            builder = builder.header(HEADER_FORWARDED_FOR, value);
        }
        builder.body(Body::from(r#"{"password":"wrong"}"#)).unwrap()
    }

    #[tokio::test]
    async fn login_is_throttled_per_peer() {
        let state = AppState::with_throttle(
            test_config(false),
            LoginThrottle::new(1, Duration::from_secs(60)),
        );
        let app = create_router(state);

        let response = app
            .clone()
            .oneshot(attempt_from([10, 0, 0, 1], None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .clone()
            .oneshot(attempt_from([10, 0, 0, 1], None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key("Retry-After"));
        assert_eq!(body_json(response).await["code"], "rate_limited");

        let response = app
            .oneshot(attempt_from([10, 0, 0, 2], None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn rotating_forwarded_for_does_not_escape_throttle() {
        let state = AppState::with_throttle(
            test_config(false),
            LoginThrottle::new(1, Duration::from_secs(60)),
        );
        let app = create_router(state);

        let mut statuses = Vec::new();
        for i in 0..20 {
            let forwarded = format!("10.9.9.{i}");
            let response = app
                .clone()
                .oneshot(attempt_from([198, 51, 100, 9], Some(&forwarded)))
                .await
                .unwrap();
            statuses.push(response.status());
        }

        assert_eq!(statuses[0], StatusCode::UNAUTHORIZED);
        assert!(statuses[1..]
            .iter()
            .all(|status| *status == StatusCode::TOO_MANY_REQUESTS));
    }

    #[tokio::test]
    async fn trusted_proxy_throttles_by_forwarded_for() {
        let mut config = test_config(false);
        config.trust_forwarded_for = true;
        let state = AppState::with_throttle(config, LoginThrottle::new(1, Duration::from_secs(60)));
        let app = create_router(state);
        let proxy = [192, 0, 2, 10];

        let response = app
            .clone()
            .oneshot(attempt_from(proxy, Some("203.0.113.1")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .clone()
            .oneshot(attempt_from(proxy, Some("203.0.113.1")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        // A different client behind the same proxy has its own bucket.
        let response = app
            .oneshot(attempt_from(proxy, Some("203.0.113.2")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_rejects_malformed_body() {
        let app = create_router(AppState::new(test_config(false)));

        let response = app.oneshot(login_request("not json")).await.unwrap();
        assert!(response.status().is_client_error());
    }

    // ========================================================================
    // GET /admin/session tests
    // ========================================================================

    #[tokio::test]
    async fn session_accepts_bearer_token() {
        let app = create_router(AppState::new(test_config(false)));
        let token = login_token(&app).await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/admin/session")
                    .header(AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["authenticated"], true);
        assert_eq!(body["totp_enabled"], false);
        assert!(body["issued_at"].is_string());
        assert!(body["expires_at"].is_string());
    }

    #[tokio::test]
    async fn session_accepts_cookie() {
        let app = create_router(AppState::new(test_config(false)));
        let token = login_token(&app).await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/admin/session")
                    .header(COOKIE, format!("theme=dark; {SESSION_COOKIE_NAME}={token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn session_without_token_is_unauthorized() {
        let app = create_router(AppState::new(test_config(false)));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/admin/session")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let cookie = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn session_rejects_tampered_token() {
        let app = create_router(AppState::new(test_config(false)));
        let token = login_token(&app).await;

        let mut tampered = token.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == '0' { '1' } else { '0' });

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/admin/session")
                    .header(AUTHORIZATION, format!("Bearer {tampered}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["code"], "invalid_session");
    }

    // ========================================================================
    // POST /admin/logout tests
    // ========================================================================

    #[tokio::test]
    async fn logout_clears_cookie() {
        let app = create_router(AppState::new(test_config(false)));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/admin/logout")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let cookie = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with("folio_admin_session=;"));
        assert!(cookie.contains("Max-Age=0"));
    }

    // ========================================================================
    // POST /admin/totp/setup tests
    // ========================================================================

    #[tokio::test]
    async fn totp_setup_requires_session() {
        let app = create_router(AppState::new(test_config(false)));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/admin/totp/setup")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn totp_setup_returns_usable_secret() {
        let app = create_router(AppState::new(test_config(false)));
        let token = login_token(&app).await;

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/admin/totp/setup?account=owner")
                    .header(AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let secret = body["secret"].as_str().unwrap();
        let uri = body["uri"].as_str().unwrap();

        assert_eq!(secret.len(), 32);
        assert!(TotpSecret::parse(secret).is_ok());
        assert!(uri.starts_with("otpauth://totp/VibeCoding:owner?secret="));
        assert!(uri.contains(secret));
    }

    // ========================================================================
    // Helper tests
    // ========================================================================

    #[test]
    fn bearer_token_takes_precedence_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        headers.insert(
            COOKIE,
            HeaderValue::from_static("folio_admin_session=from-cookie"),
        );
        assert_eq!(
            extract_session_token(&headers).as_deref(),
            Some("from-header")
        );
    }

    #[test]
    fn empty_cookie_value_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("folio_admin_session="));
        assert_eq!(extract_session_token(&headers), None);
    }

    #[test]
    fn client_id_ignores_forwarded_for_by_default() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HEADER_FORWARDED_FOR,
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 4321))));

        assert_eq!(client_id(&headers, &extensions, false), "192.0.2.1");
        assert_eq!(client_id(&headers, &Extensions::new(), false), UNKNOWN_CLIENT);
    }

    #[test]
    fn client_id_uses_forwarded_for_when_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HEADER_FORWARDED_FOR,
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 4321))));

        assert_eq!(client_id(&headers, &extensions, true), "203.0.113.7");
        assert_eq!(client_id(&HeaderMap::new(), &extensions, true), "192.0.2.1");
    }

    #[test]
    fn app_state_debug_hides_config() {
        let state = AppState::new(test_config(true));
        let debug = format!("{state:?}");
        assert!(debug.contains("<Config>"));
        assert!(!debug.contains(&hash_password(PASSWORD)));
    }
}
