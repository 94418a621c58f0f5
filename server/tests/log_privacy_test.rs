//! Privacy tests for credentials in logs.
//!
//! No password, password hash, TOTP secret, TOTP code or session token may
//! appear in log output, even at TRACE level.
//!
//! # Test Approach
//!
//! 1. Use a custom tracing subscriber Layer to capture all log messages
//! 2. Exercise the gate, session, TOTP and HTTP code paths
//! 3. Verify that none of the credentials appear in the captured logs

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use tower::ServiceExt;
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use folio_gate::config::Config;
use folio_gate::gate::{hash_password, AdminCredentials, AdminGate, LoginOutcome};
use folio_gate::routes::{create_router, AppState};
use folio_gate::session::AdminSession;
use folio_gate::store::MemoryTokenStore;
use folio_gate::token::TokenAuthority;
use folio_gate::totp::{code_at, TotpSecret, TotpVerifier};

const PASSWORD: &str = "Sup3r-Secret-Passw0rd";
const SECRET: &str = "JBSWY3DPEHPK3PXP";

// ============================================================================
// Log Capture Infrastructure
// ============================================================================

/// A buffer for capturing log output during tests.
#[derive(Clone, Default)]
struct LogCapture {
    logs: Arc<Mutex<Vec<String>>>,
}

impl LogCapture {
    fn get_logs(&self) -> String {
        self.logs.lock().unwrap().join("\n")
    }
}

/// A tracing Layer that captures log events for inspection.
struct CaptureLayer {
    capture: LogCapture,
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = StringVisitor::default();
        event.record(&mut visitor);

        let message = format!(
            "[{}] {}: {}",
            event.metadata().level(),
            event.metadata().target(),
            visitor.parts.join(" ")
        );

        self.capture.logs.lock().unwrap().push(message);
    }
}

/// A visitor that collects all event fields into a string.
#[derive(Default)]
struct StringVisitor {
    parts: Vec<String>,
}

impl tracing::field::Visit for StringVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.parts.push(format!("{}={:?}", field.name(), value));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.parts.push(format!("{}={}", field.name(), value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.parts.push(format!("{}={}", field.name(), value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.parts.push(format!("{}={}", field.name(), value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.parts.push(format!("{}={}", field.name(), value));
    }
}

fn capture_subscriber() -> (LogCapture, impl Subscriber + Send + Sync) {
    let capture = LogCapture::default();
    let layer = CaptureLayer {
        capture: capture.clone(),
    };
    let subscriber = tracing_subscriber::registry()
        .with(layer.with_filter(tracing_subscriber::filter::LevelFilter::TRACE));
    (capture, subscriber)
}

/// Runs a test closure with log capture at TRACE level.
fn with_log_capture<F>(test_fn: F) -> String
where
    F: FnOnce(),
{
    let (capture, subscriber) = capture_subscriber();
    tracing::subscriber::with_default(subscriber, test_fn);
    capture.get_logs()
}

/// Async version of [`with_log_capture`].
async fn with_log_capture_async<F, Fut>(test_fn: F) -> String
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let (capture, subscriber) = capture_subscriber();
    let _guard = tracing::subscriber::set_default(subscriber);
    test_fn().await;
    capture.get_logs()
}

// ============================================================================
// Privacy Assertion Helpers
// ============================================================================

fn assert_sensitive_not_in_logs(logs: &str, value: &str, value_name: &str, context: &str) {
    assert!(
        !logs.contains(value),
        "{value_name} found in logs during {context}!\nLogs:\n{logs}"
    );
}

/// Asserts that every part of a session token is absent from the logs.
fn assert_token_not_in_logs(logs: &str, token: &str, context: &str) {
    assert_sensitive_not_in_logs(logs, token, "Session token", context);
    for (i, part) in token.split('.').enumerate().skip(1) {
        assert_sensitive_not_in_logs(logs, part, &format!("Token segment {i}"), context);
    }
}

/// Asserts that a six-digit code does not appear as a standalone number.
///
/// Plain substring search would trip over millisecond timestamps.
fn assert_code_not_in_logs(logs: &str, code: &str, context: &str) {
    let found = logs
        .split(|c: char| !c.is_ascii_digit())
        .any(|number| number == code);
    assert!(!found, "TOTP code found in logs during {context}!\nLogs:\n{logs}");
}

fn assert_credentials_not_in_logs(logs: &str, context: &str) {
    assert_sensitive_not_in_logs(logs, PASSWORD, "Password", context);
    assert_sensitive_not_in_logs(logs, &hash_password(PASSWORD), "Password hash", context);
    assert_sensitive_not_in_logs(logs, SECRET, "TOTP secret", context);
}

fn gate(totp: bool) -> AdminGate {
    AdminGate::new(
        AdminCredentials::new(
            hash_password(PASSWORD),
            totp.then(|| TotpSecret::parse(SECRET).unwrap()),
        ),
        TokenAuthority::default(),
        TotpVerifier::default(),
    )
}

fn current_code() -> String {
    let secret = TotpSecret::parse(SECRET).unwrap();
    code_at(&secret, Utc::now().timestamp(), 0).unwrap()
}

fn test_config() -> Config {
    Config {
        password_hash: hash_password(PASSWORD),
        totp_secret: Some(TotpSecret::parse(SECRET).unwrap()),
        session_max_age: Duration::from_secs(86_400),
        session_future_skew: Duration::from_secs(60),
        totp_skew_steps: 1,
        cookie_secure: false,
        trust_forwarded_for: false,
        port: 8080,
    }
}

// ============================================================================
// Test Cases
// ============================================================================

#[test]
fn successful_login_does_not_log_credentials() {
    let code = current_code();
    let mut token = String::new();

    let logs = with_log_capture(|| {
        let gate = gate(true);
        let LoginOutcome::Authenticated(issued) = gate.login(PASSWORD, Some(&code)).unwrap()
        else {
            panic!("expected authenticated outcome");
        };
        token = issued.to_string();
        assert!(gate.validate(&token));
    });

    assert!(!logs.is_empty(), "expected at least the issuance log");
    assert_credentials_not_in_logs(&logs, "successful login");
    assert_token_not_in_logs(&logs, &token, "successful login");
    assert_code_not_in_logs(&logs, &code, "successful login");
}

#[test]
fn rejected_logins_do_not_log_credentials() {
    let logs = with_log_capture(|| {
        let gate = gate(true);
        gate.login("wrong-password", Some("123456")).unwrap();
        gate.login(PASSWORD, None).unwrap();
        gate.login(PASSWORD, Some("654321")).unwrap();
    });

    assert_credentials_not_in_logs(&logs, "rejected login");
    assert_sensitive_not_in_logs(&logs, "wrong-password", "Wrong password", "rejected login");
    assert_code_not_in_logs(&logs, "123456", "rejected login");
    assert_code_not_in_logs(&logs, "654321", "rejected login");
}

#[test]
fn rejected_tokens_are_not_logged() {
    let gate = gate(false);
    let LoginOutcome::Authenticated(token) = gate.login(PASSWORD, None).unwrap() else {
        panic!("expected authenticated outcome");
    };
    let token = token.to_string();
    let mut forged = token.clone();
    let last = forged.pop().unwrap();
    forged.push(if last == '0' { '1' } else { '0' });

    let logs = with_log_capture(|| {
        assert!(!gate.validate(&forged));
        assert!(!gate.validate("1700000000000.not-hex.whatever"));
    });

    assert_token_not_in_logs(&logs, &forged, "forged token validation");
    assert_sensitive_not_in_logs(&logs, "not-hex", "Malformed token", "malformed token");
}

#[test]
fn session_check_does_not_log_stored_token() {
    let session = AdminSession::new(Arc::new(gate(false)), MemoryTokenStore::new());

    let logs = with_log_capture(|| {
        session.sign_in(PASSWORD, None).unwrap();
        session.check().unwrap();
        session.revoke().unwrap();
    });

    assert_credentials_not_in_logs(&logs, "session lifecycle");
}

#[test]
fn undecodable_secret_warning_does_not_log_secret() {
    let bad_secret = "NOT-BASE32-SECRET!";

    let logs = with_log_capture(|| {
        assert!(!TotpVerifier::default().verify("123456", bad_secret));
    });

    assert!(logs.contains("WARN"), "expected a configuration warning");
    assert_sensitive_not_in_logs(&logs, bad_secret, "TOTP secret", "secret decode");
}

#[tokio::test]
async fn http_login_flow_does_not_log_credentials() {
    let code = current_code();
    let app = create_router(AppState::new(test_config()));
    let token = Arc::new(Mutex::new(String::new()));
    let token_slot = Arc::clone(&token);

    let logs = with_log_capture_async(|| async move {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/admin/login")
                    .header("Content-Type", "application/json")
                    .body(Body::from(format!(
                        r#"{{"password":"{PASSWORD}","code":"{code}"}}"#
                    )))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let issued = json["token"].as_str().unwrap().to_string();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/admin/session")
                    .header("Authorization", format!("Bearer {issued}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        *token_slot.lock().unwrap() = issued;
    })
    .await;

    let token = token.lock().unwrap().clone();
    assert_credentials_not_in_logs(&logs, "HTTP login");
    assert_token_not_in_logs(&logs, &token, "HTTP login");
}

#[test]
fn config_debug_does_not_expose_credentials() {
    let logs = with_log_capture(|| {
        let config = test_config();
        tracing::info!(config = ?config, "Loaded configuration");
    });

    assert_credentials_not_in_logs(&logs, "config debug");
}
