mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tower::ServiceExt;

use common::{scratch_dir, target};
use ktron::profiles::ProfileSet;
use ktron::scanner::Scanner;
use ktron::server::{build_router, AppState};

fn app_with(program: &str) -> axum::Router {
    // Write the fake scanners before any test in this binary spawns a process.
    #[cfg(unix)]
    common::fake_scanners();
    build_router(AppState::new(Scanner::new(program, ProfileSet::default())))
}

async fn parse_json(body: Body) -> serde_json::Value {
    let bytes = axum::body::to_bytes(body, 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_scan(body: impl Into<Body>) -> Request<Body> {
    Request::post("/perform_nmap_scan")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

#[tokio::test]
async fn health_check() {
    let resp = app_with("nmap")
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(parse_json(resp.into_body()).await["status"], "ok");
}

#[tokio::test]
async fn lists_scan_types() {
    let resp = app_with("nmap")
        .oneshot(Request::get("/scan_types").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = parse_json(resp.into_body()).await;
    assert_eq!(json[0]["name"], "quick_scan");
    assert_eq!(json[1]["args"][0], "-sC");
}

#[tokio::test]
async fn non_json_body_is_rejected() {
    let req = Request::post("/perform_nmap_scan")
        .body(Body::from("ip=10.0.0.1"))
        .unwrap();
    let resp = app_with("nmap").oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(parse_json(resp.into_body()).await["error"], "No JSON data provided");
}

#[tokio::test]
async fn empty_json_body_is_no_data() {
    for body in [r#"{}"#, "null", "[]", r#""""#] {
        let resp = app_with("nmap").oneshot(post_scan(body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "body: {body}");
        assert_eq!(
            parse_json(resp.into_body()).await["error"],
            "No JSON data provided",
            "body: {body}"
        );
    }
}

#[tokio::test]
async fn missing_parameters() {
    for body in [
        r#"{"scan_type": "quick_scan"}"#,
        r#"["quick_scan"]"#,
        r#"{"info_dict": {"working_dir": "/tmp", "hostname": "box", "ip": "10.0.0.1"}}"#,
        r#"{"info_dict": {"working_dir": "/tmp", "hostname": "box", "ip": "10.0.0.1"}, "scan_type": ""}"#,
        r#"{"info_dict": {"hostname": "box"}, "scan_type": "quick_scan"}"#,
    ] {
        let resp = app_with("nmap").oneshot(post_scan(body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "body: {body}");
        assert_eq!(
            parse_json(resp.into_body()).await["error"],
            "Missing required parameters"
        );
    }
}

#[tokio::test]
async fn unknown_scan_type() {
    let dir = scratch_dir("server_unknown");
    let body = serde_json::json!({ "info_dict": target(&dir, false), "scan_type": "stealth" });
    let resp = app_with("nmap")
        .oneshot(post_scan(body.to_string()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        parse_json(resp.into_body()).await["error"],
        "Unknown scan type: stealth"
    );
}

#[tokio::test]
async fn scanner_launch_failure_is_500() {
    let dir = scratch_dir("server_launch");
    let body = serde_json::json!({ "info_dict": target(&dir, true), "scan_type": "quick_scan" });
    let resp = app_with("/nonexistent/ktron-nmap")
        .oneshot(post_scan(body.to_string()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = parse_json(resp.into_body()).await;
    assert!(json["error"].as_str().unwrap().contains("failed to launch"));
}

#[cfg(unix)]
#[tokio::test]
async fn scan_returns_open_ports() {
    let dir = scratch_dir("server_scan");
    let program = common::fake_scanners().ok.to_string_lossy().into_owned();
    // Extra fields the client sends along are ignored.
    let mut info = serde_json::to_value(target(&dir, false)).unwrap();
    info["recon_date"] = "2024-08-19T21:04:11Z".into();
    info["tools"] = serde_json::json!({});
    let body = serde_json::json!({ "info_dict": info, "scan_type": "detailed_scan" });

    let resp = app_with(&program)
        .oneshot(post_scan(body.to_string()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let json = parse_json(resp.into_body()).await;
    let ports = json.as_array().unwrap();
    assert_eq!(ports.len(), 3);
    assert_eq!(ports[0]["port_number"], 22);
    assert_eq!(ports[0]["protocol"], "tcp");
    assert_eq!(ports[0]["service"], "ssh");
    assert_eq!(ports[2]["version"], serde_json::Value::Null);
    assert_eq!(common::scanner_calls(&dir), 1);
}
