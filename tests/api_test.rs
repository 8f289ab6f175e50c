//! End-to-end tests of the JSON API handler.

use std::sync::Arc;

use serde_json::{json, Value};

use sentinel_core::api::{decode_message, ApiMessage};
use sentinel_core::auth::{HashingConfig, RequestContext};
use sentinel_core::config::EnvConfig;
use sentinel_core::security::{AuditCategory, MemoryAuditSink};
use sentinel_core::{RuntimeStores, SentinelRuntime};

const ADMIN_EMAIL: &str = "admin@example.org";
const PASSWORD: &str = "Blue-Heron-Morning-42";

fn runtime() -> (SentinelRuntime, Arc<MemoryAuditSink>) {
    let mut config = EnvConfig::default();
    config.auth.hashing = HashingConfig {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    };
    config.auth.jwt_secret = Some("api-test-signing-secret-0123456789abcdef".into());

    let sink = Arc::new(MemoryAuditSink::default());
    let mut stores = RuntimeStores::in_memory();
    stores.audit_sink = sink.clone();
    (SentinelRuntime::with_stores(config, stores).unwrap(), sink)
}

async fn call(runtime: &SentinelRuntime, message: Value) -> Value {
    let bytes = serde_json::to_vec(&message).unwrap();
    let response = runtime.handler.process(&bytes).await;
    serde_json::from_slice(&response).unwrap()
}

async fn login(runtime: &SentinelRuntime, email: &str) -> Value {
    call(
        runtime,
        json!({"type": "login", "request_id": "login-1", "email": email, "password": PASSWORD}),
    )
    .await
}

/// Provision an admin and return its access token.
async fn admin_token(runtime: &SentinelRuntime) -> String {
    runtime
        .auth
        .provision_superuser(ADMIN_EMAIL, PASSWORD, &RequestContext::new("bootstrap"))
        .await
        .unwrap();
    let response = login(runtime, ADMIN_EMAIL).await;
    response["tokens"]["access_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn wrong_password_returns_401_without_token() {
    let (runtime, sink) = runtime();
    let registered = call(
        &runtime,
        json!({"type": "register", "email": "rose@example.org", "password": PASSWORD}),
    )
    .await;
    assert_eq!(registered["type"], "registered");
    assert_eq!(registered["code"], 201);

    let response = call(
        &runtime,
        json!({"type": "login", "request_id": "r-4", "email": "rose@example.org", "password": "Not-Her-Password-1"}),
    )
    .await;

    assert_eq!(response["type"], "error");
    assert_eq!(response["code"], 401);
    assert_eq!(response["request_id"], "r-4");
    assert_eq!(response["message"], "Invalid credentials");
    assert!(response.get("tokens").is_none());

    let events = sink.get_events_by_action("login").await;
    let failure = events.iter().find(|e| !e.success).unwrap();
    assert_eq!(failure.metadata["reason"], "invalid_password");
    assert_eq!(failure.correlation_id.as_deref(), Some("r-4"));
}

#[tokio::test]
async fn verify_token_after_logout_is_invalid() {
    let (runtime, _sink) = runtime();
    let token = admin_token(&runtime).await;

    let before = call(&runtime, json!({"type": "verify_token", "token": token})).await;
    assert_eq!(before["type"], "token_verification");
    assert_eq!(before["valid"], true);
    assert_eq!(before["claims"]["email"], ADMIN_EMAIL);

    let logged_out = call(&runtime, json!({"type": "logout", "token": token})).await;
    assert_eq!(logged_out["type"], "logged_out");
    assert_eq!(logged_out["sessions_revoked"], 1);

    let after = call(&runtime, json!({"type": "verify_token", "token": token})).await;
    assert_eq!(after["type"], "token_verification");
    assert_eq!(after["valid"], false);
    assert!(after["claims"].is_null());
}

#[tokio::test]
async fn garbage_token_is_invalid_not_an_error() {
    let (runtime, _sink) = runtime();
    let response = call(&runtime, json!({"type": "verify_token", "token": "not.a.jwt"})).await;
    assert_eq!(response["valid"], false);
}

#[tokio::test]
async fn combined_analysis_flags_isolation() {
    let (runtime, sink) = runtime();
    let token = admin_token(&runtime).await;

    let response = call(
        &runtime,
        json!({
            "type": "analyze_combined",
            "request_id": "r-6",
            "token": token,
            "content": "I feel hopeless and alone, nobody visits me",
        }),
    )
    .await;

    assert_eq!(response["type"], "combined_result");
    assert_eq!(response["verdict"], "unsafe");
    let label = response["result"]["emotion"]["label"].as_str().unwrap();
    assert!(label == "sad" || label == "lonely", "label was {}", label);
    assert_eq!(response["result"]["overall_safe"], false);

    let crisis = sink.get_events_by_category(AuditCategory::SafetyAnalysis).await;
    assert!(!crisis.is_empty());
}

#[tokio::test]
async fn phi_redaction_over_the_wire() {
    let (runtime, sink) = runtime();
    let token = admin_token(&runtime).await;

    let response = call(
        &runtime,
        json!({
            "type": "detect_phi",
            "token": token,
            "content": "My SSN is 123-45-6789",
            "analysis_mode": "redact",
        }),
    )
    .await;

    assert_eq!(response["type"], "phi_result");
    let redacted = response["result"]["redacted_text"].as_str().unwrap();
    assert!(redacted.contains("[SSN_REDACTED]"));
    assert!(!redacted.contains("123-45-6789"));
    assert_eq!(response["result"]["risk_level"], "critical");

    let disclosures = sink.get_events_by_category(AuditCategory::PhiDisclosure).await;
    assert_eq!(disclosures.len(), 1);
}

#[tokio::test]
async fn encrypt_without_key_is_503() {
    let (runtime, _sink) = runtime();
    let token = admin_token(&runtime).await;

    let response = call(
        &runtime,
        json!({
            "type": "analyze_combined",
            "token": token,
            "content": "SSN 123-45-6789",
            "analysis_mode": "encrypt",
        }),
    )
    .await;

    assert_eq!(response["type"], "error");
    assert_eq!(response["code"], 503);
}

#[tokio::test]
async fn invalid_mode_is_400() {
    let (runtime, _sink) = runtime();
    let response = call(
        &runtime,
        json!({"type": "detect_phi", "token": "t", "content": "hello", "analysis_mode": "shred"}),
    )
    .await;
    assert_eq!(response["code"], 400);
}

#[tokio::test]
async fn resident_cannot_run_analysis() {
    let (runtime, _sink) = runtime();
    call(
        &runtime,
        json!({"type": "register", "email": "rose@example.org", "password": PASSWORD}),
    )
    .await;
    let session = login(&runtime, "rose@example.org").await;
    let token = session["tokens"]["access_token"].as_str().unwrap();

    let response = call(
        &runtime,
        json!({"type": "analyze_safety", "token": token, "content": "Nice weather"}),
    )
    .await;
    assert_eq!(response["code"], 403);
}

#[tokio::test]
async fn privileged_registration_needs_manage_users() {
    let (runtime, _sink) = runtime();

    let anonymous = call(
        &runtime,
        json!({"type": "register", "email": "nurse@example.org", "password": PASSWORD, "role": "care_staff"}),
    )
    .await;
    assert_eq!(anonymous["code"], 403);

    let token = admin_token(&runtime).await;
    let registered = call(
        &runtime,
        json!({
            "type": "register",
            "email": "nurse@example.org",
            "password": PASSWORD,
            "role": "care_staff",
            "token": token,
        }),
    )
    .await;
    assert_eq!(registered["type"], "registered");
    assert_eq!(registered["profile"]["role"], "care_staff");
    assert!(registered["profile"].get("password_hash").is_none());
}

#[tokio::test]
async fn refresh_issues_new_access_token() {
    let (runtime, _sink) = runtime();
    runtime
        .auth
        .provision_superuser(ADMIN_EMAIL, PASSWORD, &RequestContext::new("bootstrap"))
        .await
        .unwrap();
    let session = login(&runtime, ADMIN_EMAIL).await;
    let refresh_token = session["tokens"]["refresh_token"].as_str().unwrap();

    let response = call(
        &runtime,
        json!({"type": "refresh_token", "refresh_token": refresh_token}),
    )
    .await;
    assert_eq!(response["type"], "token_refreshed");
    assert_eq!(response["token_type"], "Bearer");

    let access = response["access_token"].as_str().unwrap();
    let verified = call(&runtime, json!({"type": "verify_token", "token": access})).await;
    assert_eq!(verified["valid"], true);
}

#[tokio::test]
async fn malformed_json_gets_400() {
    let (runtime, _sink) = runtime();
    let response = runtime.handler.process(b"{not json").await;
    let value: Value = serde_json::from_slice(&response).unwrap();
    assert_eq!(value["code"], 400);
    assert!(value["request_id"].as_str().is_some());
}

#[tokio::test]
async fn response_message_rejected_as_request() {
    let (runtime, _sink) = runtime();
    let response = call(
        &runtime,
        json!({"type": "logged_out", "request_id": "x", "sessions_revoked": 0}),
    )
    .await;
    assert_eq!(response["code"], 400);

    let decoded = decode_message(&serde_json::to_vec(&response).unwrap(), 1 << 20).unwrap();
    assert!(matches!(decoded, ApiMessage::Error(_)));
}
