//! Integration tests for the intake server.
//!
//! All tests share one process-wide runtime context rooted in a throwaway
//! directory, so the tests that count store lines serialize themselves
//! through a guard mutex.

use std::fs;
use std::sync::{Mutex, MutexGuard, Once};

use lazy_static::lazy_static;
use poem::http::StatusCode;
use poem::test::TestClient;
use serde_json::Value;

use intake_server::build_app;
use intake_server::utils::intake_utils::timestamp_str_to_datetime;
use intake_server::utils::store::ApplicationStore;
use intake_server::RUNTIME_CTX;

static INIT: Once = Once::new();

lazy_static! {
    // Held for the whole test run so the root directory outlives every test.
    static ref TEST_ROOT: tempfile::TempDir = tempfile::tempdir().unwrap();
    static ref TEST_GUARD: Mutex<()> = Mutex::new(());
}

/** Point the server at the throwaway root before anything touches the
 * runtime context, then serialize the calling test. */
fn setup() -> MutexGuard<'static, ()> {
    INIT.call_once(|| {
        use std::os::unix::fs::PermissionsExt;
        // tempdir() honors the process umask; under a permissive umask the
        // throwaway root comes out group/other-readable, which the server's
        // 0o700 root-directory check rejects. Force owner-only so the root is
        // the directory the tests intend regardless of the ambient umask.
        fs::set_permissions(TEST_ROOT.path(), fs::Permissions::from_mode(0o700)).unwrap();
        std::env::set_var("INTAKE_ROOT_DIR", TEST_ROOT.path());
    });
    TEST_GUARD.lock().unwrap()
}

fn store_line_count() -> usize {
    let raw = fs::read_to_string(RUNTIME_CTX.store.path()).unwrap();
    raw.lines().count()
}

// ---------------------------------------------------------------------------
// healthz
// ---------------------------------------------------------------------------
#[tokio::test]
async fn healthz_always_ok() {
    let _guard = setup();
    let cli = TestClient::new(build_app());

    let resp = cli.get("/healthz").send().await;
    resp.assert_status(StatusCode::OK);
    resp.assert_text(r#"{"ok":true}"#).await;
}

// ---------------------------------------------------------------------------
// POST /api/applications: success paths
// ---------------------------------------------------------------------------
#[tokio::test]
async fn valid_submission_appends_one_record() {
    let _guard = setup();
    let before = store_line_count();
    let cli = TestClient::new(build_app());

    let resp = cli.post("/api/applications")
        .header("content-type", "application/json")
        .header("user-agent", "integration-test/1.0")
        .header("referer", "https://example.com/signup")
        .body(r#"{"name":"Jane Doe","email":"jane@x.com","phone":"555-1234"}"#)
        .send().await;
    resp.assert_status(StatusCode::CREATED);
    resp.assert_text(r#"{"ok":true}"#).await;

    let records = ApplicationStore::read_all(RUNTIME_CTX.store.path()).unwrap();
    assert_eq!(records.len(), before + 1);
    let rec = records.last().unwrap();
    assert_eq!(rec.name, "Jane Doe");
    assert_eq!(rec.email, "jane@x.com");
    assert_eq!(rec.phone, "555-1234");
    assert_eq!(rec.plan, None);
    assert_eq!(rec.user_agent.as_deref(), Some("integration-test/1.0"));
    assert_eq!(rec.referrer.as_deref(), Some("https://example.com/signup"));
    timestamp_str_to_datetime(&rec.created_at).expect("created_at must be rfc3339");
}

#[tokio::test]
async fn fields_are_trimmed_and_plan_is_kept() {
    let _guard = setup();
    let cli = TestClient::new(build_app());

    let resp = cli.post("/api/applications")
        .header("content-type", "application/json")
        .body(r#"{"name":"  Jane  ","email":" jane@trim.com ","phone":" 555 ","plan":"  Gold  "}"#)
        .send().await;
    resp.assert_status(StatusCode::CREATED);

    let records = ApplicationStore::read_all(RUNTIME_CTX.store.path()).unwrap();
    let rec = records.iter().find(|r| r.email == "jane@trim.com").unwrap();
    assert_eq!(rec.name, "Jane");
    assert_eq!(rec.phone, "555");
    assert_eq!(rec.plan.as_deref(), Some("Gold"));
}

#[tokio::test]
async fn form_encoded_submission_is_accepted() {
    let _guard = setup();
    let cli = TestClient::new(build_app());

    let resp = cli.post("/api/applications")
        .header("content-type", "application/x-www-form-urlencoded")
        .body("name=Form+User&email=form%40x.com&phone=555-0000&plan=Silver")
        .send().await;
    resp.assert_status(StatusCode::CREATED);
    resp.assert_text(r#"{"ok":true}"#).await;

    let records = ApplicationStore::read_all(RUNTIME_CTX.store.path()).unwrap();
    let rec = records.iter().find(|r| r.email == "form@x.com").unwrap();
    assert_eq!(rec.name, "Form User");
    assert_eq!(rec.plan.as_deref(), Some("Silver"));
}

#[tokio::test]
async fn scalar_fields_coerce_to_strings() {
    let _guard = setup();
    let cli = TestClient::new(build_app());

    let resp = cli.post("/api/applications")
        .header("content-type", "application/json")
        .body(r#"{"name":"Numeric Phone","email":"num@x.com","phone":5551234}"#)
        .send().await;
    resp.assert_status(StatusCode::CREATED);

    let records = ApplicationStore::read_all(RUNTIME_CTX.store.path()).unwrap();
    let rec = records.iter().find(|r| r.email == "num@x.com").unwrap();
    assert_eq!(rec.phone, "5551234");
}

#[tokio::test]
async fn forwarded_header_wins_for_ip() {
    let _guard = setup();
    let cli = TestClient::new(build_app());

    let resp = cli.post("/api/applications")
        .header("content-type", "application/json")
        .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
        .body(r#"{"name":"Proxied","email":"proxy@x.com","phone":"555"}"#)
        .send().await;
    resp.assert_status(StatusCode::CREATED);

    let records = ApplicationStore::read_all(RUNTIME_CTX.store.path()).unwrap();
    let rec = records.iter().find(|r| r.email == "proxy@x.com").unwrap();
    assert_eq!(rec.ip.as_deref(), Some("203.0.113.9"));
}

#[tokio::test]
async fn store_file_is_valid_ndjson() {
    let _guard = setup();
    let cli = TestClient::new(build_app());

    for i in 0..3 {
        let body = format!(r#"{{"name":"Bulk {i}","email":"bulk{i}@x.com","phone":"555-{i}"}}"#);
        let resp = cli.post("/api/applications")
            .header("content-type", "application/json")
            .body(body)
            .send().await;
        resp.assert_status(StatusCode::CREATED);
    }

    // Every line parses independently as a single JSON object.
    let raw = fs::read_to_string(RUNTIME_CTX.store.path()).unwrap();
    assert!(!raw.is_empty());
    for line in raw.lines() {
        let value: Value = serde_json::from_str(line).unwrap();
        assert!(value.is_object());
    }
}

// ---------------------------------------------------------------------------
// POST /api/applications: rejection paths
// ---------------------------------------------------------------------------
#[tokio::test]
async fn missing_name_is_rejected_and_store_unchanged() {
    let _guard = setup();
    let before = store_line_count();
    let cli = TestClient::new(build_app());

    let resp = cli.post("/api/applications")
        .header("content-type", "application/json")
        .body(r#"{"email":"x@x.com","phone":"555"}"#)
        .send().await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    resp.assert_text(r#"{"error":"Missing required fields"}"#).await;
    assert_eq!(store_line_count(), before);
}

#[tokio::test]
async fn whitespace_only_field_is_rejected() {
    let _guard = setup();
    let before = store_line_count();
    let cli = TestClient::new(build_app());

    let resp = cli.post("/api/applications")
        .header("content-type", "application/json")
        .body(r#"{"name":"   ","email":"x@x.com","phone":"555"}"#)
        .send().await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    resp.assert_text(r#"{"error":"Missing required fields"}"#).await;
    assert_eq!(store_line_count(), before);
}

#[tokio::test]
async fn non_scalar_field_is_rejected() {
    let _guard = setup();
    let before = store_line_count();
    let cli = TestClient::new(build_app());

    let resp = cli.post("/api/applications")
        .header("content-type", "application/json")
        .body(r#"{"name":{"first":"Jane"},"email":"x@x.com","phone":"555"}"#)
        .send().await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    resp.assert_text(r#"{"error":"Missing required fields"}"#).await;
    assert_eq!(store_line_count(), before);
}

// ---------------------------------------------------------------------------
// Operational surface
// ---------------------------------------------------------------------------
#[tokio::test]
async fn version_reports_build_info() {
    let _guard = setup();
    let cli = TestClient::new(build_app());

    let resp = cli.get("/api/version").send().await;
    resp.assert_status(StatusCode::OK);
}

#[tokio::test]
async fn static_files_are_served_with_fallthrough_404() {
    let _guard = setup();
    let cli = TestClient::new(build_app());

    let asset = format!("{}/hello.txt", RUNTIME_CTX.intake_dirs.static_dir);
    fs::write(&asset, "hello from the static dir").unwrap();

    let resp = cli.get("/hello.txt").send().await;
    resp.assert_status(StatusCode::OK);
    resp.assert_text("hello from the static dir").await;

    let resp = cli.get("/no-such-file.txt").send().await;
    resp.assert_status(StatusCode::NOT_FOUND);
}
