//! Integration tests for the Observer API endpoints.
//!
//! Most tests use Axum's `Router` directly via `tower::ServiceExt` without
//! starting a TCP server. The `WebSocket` test binds a real listener on an
//! ephemeral port and speaks the upgrade handshake over a raw TCP stream.

#![allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use sitepulse_observer::router::build_router;
use sitepulse_observer::server::ServerConfig;
use sitepulse_observer::spawn_observer;
use sitepulse_observer::state::AppState;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tower::ServiceExt;

fn make_test_state() -> Arc<AppState> {
    let state = Arc::new(AppState::new(3));
    for (name, value) in [("Google", 3.2), ("YouTube", 3.15), ("GitHub", 0.42)] {
        state
            .store
            .add_site(name, &format!("https://logo.clearbit.com/{name}.com"), value)
            .unwrap();
    }
    state
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Open a `WebSocket` to `/ws/sites` over a raw TCP stream.
///
/// Returns the stream plus any bytes read past the handshake response.
async fn ws_connect(addr: std::net::SocketAddr) -> (TcpStream, Vec<u8>) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET /ws/sites HTTP/1.1\r\n\
         Host: {addr}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
         Sec-WebSocket-Version: 13\r\n\r\n"
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut buf = Vec::new();
    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let mut chunk = [0_u8; 1024];
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed during handshake");
        buf.extend_from_slice(&chunk[..n]);
    };
    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    assert!(head.starts_with("HTTP/1.1 101"), "unexpected handshake: {head}");
    (stream, buf.split_off(header_end))
}

/// Read one unfragmented server text frame and parse it as JSON.
async fn ws_read_json(stream: &mut TcpStream, buf: &mut Vec<u8>) -> Value {
    loop {
        if let Some((payload, used)) = parse_frame(buf) {
            buf.drain(..used);
            return serde_json::from_slice(&payload).unwrap();
        }
        let mut chunk = [0_u8; 4096];
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed before a full frame arrived");
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Decode an unmasked text frame from the front of `buf`.
fn parse_frame(buf: &[u8]) -> Option<(Vec<u8>, usize)> {
    if buf.len() < 2 {
        return None;
    }
    assert_eq!(buf[0], 0x81, "expected a final text frame");
    let (len, offset) = match buf[1] & 0x7f {
        126 if buf.len() >= 4 => (usize::from(u16::from_be_bytes([buf[2], buf[3]])), 4),
        127 if buf.len() >= 10 => {
            let mut raw = [0_u8; 8];
            raw.copy_from_slice(&buf[2..10]);
            (usize::try_from(u64::from_be_bytes(raw)).unwrap(), 10)
        }
        126 | 127 => return None,
        short => (usize::from(short), 2),
    };
    if buf.len() < offset + len {
        return None;
    }
    Some((buf[offset..offset + len].to_vec(), offset + len))
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn websocket_sends_current_snapshot_then_updates() {
    let state = make_test_state();
    let config = ServerConfig {
        host: String::from("127.0.0.1"),
        port: 0,
    };
    let (addr, handle) = spawn_observer(&config, Arc::clone(&state)).await.unwrap();

    let (mut stream, mut buf) = ws_connect(addr).await;

    let first = tokio::time::timeout(Duration::from_secs(5), ws_read_json(&mut stream, &mut buf))
        .await
        .unwrap();
    assert_eq!(first["event"], "update_data");
    assert_eq!(first["data"]["version"], 3);
    assert_eq!(first["data"]["sites"].as_array().unwrap().len(), 3);

    state.store.set_value("GitHub", 0.5).unwrap();

    let second = tokio::time::timeout(Duration::from_secs(5), ws_read_json(&mut stream, &mut buf))
        .await
        .unwrap();
    assert_eq!(second["event"], "update_data");
    assert_eq!(second["data"]["version"], 4);
    assert_eq!(second["data"]["sites"][2]["name"], "GitHub");
    assert_eq!(second["data"]["sites"][2]["access"][5], 0.5);

    handle.abort();
}

#[tokio::test]
async fn list_sites_returns_snapshot() {
    let state = make_test_state();
    let app = build_router(state);

    let response = app.oneshot(get("/api/sites")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["version"], 3);
    let sites = json["sites"].as_array().unwrap();
    assert_eq!(sites.len(), 3);
    assert_eq!(sites[0]["name"], "Google");
    assert_eq!(sites[0]["access"].as_array().unwrap().len(), 5);
    assert_eq!(sites[0]["search"].as_array().unwrap().len(), 5);
    assert_eq!(sites[0]["labels"][4], "Now");
}

#[tokio::test]
async fn list_sites_filters_by_query() {
    let state = make_test_state();
    let app = build_router(state);

    let response = app.oneshot(get("/api/sites?q=GIT")).await.unwrap();
    let json = body_to_json(response.into_body()).await;
    let sites = json["sites"].as_array().unwrap();
    assert_eq!(sites.len(), 1);
    assert_eq!(sites[0]["name"], "GitHub");
}

#[tokio::test]
async fn get_site_found_and_missing() {
    let state = make_test_state();

    let response = build_router(Arc::clone(&state))
        .oneshot(get("/api/sites/YouTube"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["name"], "YouTube");

    let response = build_router(state)
        .oneshot(get("/api/sites/Bing"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], 404);
}

#[tokio::test]
async fn add_site_creates_seeded_record() {
    let state = make_test_state();
    let mut rx = state.subscribe();

    let body = serde_json::json!({ "name": "Bing", "value": 0.9 });
    let response = build_router(Arc::clone(&state))
        .oneshot(json_request("POST", "/api/sites", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["ok"], true);
    assert_eq!(json["message"], "Site 'Bing' added");

    let published = rx.recv().await.unwrap();
    let bing = published.get("Bing").unwrap();
    assert_eq!(bing.primary.len(), 5);
    assert!((bing.latest().unwrap() - 0.9).abs() < 1e-12);
    assert_eq!(bing.logo_ref, "https://logo.clearbit.com/bing.com");
}

#[tokio::test]
async fn add_duplicate_site_conflicts() {
    let state = make_test_state();

    let body = serde_json::json!({ "name": "google", "logo": "x", "value": 1.0 });
    let response = build_router(Arc::clone(&state))
        .oneshot(json_request("POST", "/api/sites", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = body_to_json(response.into_body()).await;
    assert!(json.get("ok").is_none());
    assert_eq!(json["status"], 409);
    assert_eq!(state.store.len().unwrap(), 3);
    assert_eq!(state.store.snapshot().unwrap().version, 3);
}

#[tokio::test]
async fn add_site_with_negative_value_is_bad_request() {
    let state = make_test_state();

    let body = serde_json::json!({ "name": "Bing", "value": -2.0 });
    let response = build_router(Arc::clone(&state))
        .oneshot(json_request("POST", "/api/sites", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(!state.store.contains("Bing").unwrap());
}

#[tokio::test]
async fn set_value_appends_to_windows() {
    let state = make_test_state();

    let body = serde_json::json!({ "value": 4.0 });
    let response = build_router(Arc::clone(&state))
        .oneshot(json_request("PUT", "/api/sites/Google/value", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let snap = state.store.snapshot().unwrap();
    let google = snap.get("Google").unwrap();
    assert_eq!(google.primary.len(), 6);
    assert!((google.search.last().unwrap() - 8.0).abs() < 1e-12);
}

#[tokio::test]
async fn set_value_errors_map_to_status_codes() {
    let state = make_test_state();

    let body = serde_json::json!({ "value": 1.0 });
    let response = build_router(Arc::clone(&state))
        .oneshot(json_request("PUT", "/api/sites/Bing/value", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = serde_json::json!({ "value": -1.0 });
    let response = build_router(Arc::clone(&state))
        .oneshot(json_request("PUT", "/api/sites/Google/value", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(state.store.snapshot().unwrap().version, 3);
}

#[tokio::test]
async fn remove_site_reports_whether_removed() {
    let state = make_test_state();

    let request = Request::builder()
        .method("DELETE")
        .uri("/api/sites/Bing")
        .body(Body::empty())
        .unwrap();
    let response = build_router(Arc::clone(&state)).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["removed"], false);
    assert_eq!(state.store.snapshot().unwrap().version, 3);

    let request = Request::builder()
        .method("DELETE")
        .uri("/api/sites/GitHub")
        .body(Body::empty())
        .unwrap();
    let response = build_router(Arc::clone(&state)).oneshot(request).await.unwrap();
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["removed"], true);
    assert_eq!(state.store.len().unwrap(), 2);
}

#[tokio::test]
async fn top_uses_default_k() {
    let state = make_test_state();
    state.store.add_site("Reddit", "r", 0.38).unwrap();

    let response = build_router(state).oneshot(get("/api/top")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["count"], 3);
    let names: Vec<&str> = json["sites"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Google", "YouTube", "GitHub"]);
}

#[tokio::test]
async fn top_with_explicit_and_non_positive_k() {
    let state = make_test_state();

    let response = build_router(Arc::clone(&state))
        .oneshot(get("/api/top?k=1"))
        .await
        .unwrap();
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["count"], 1);
    assert_eq!(json["sites"][0]["name"], "Google");

    for k in ["0", "-3"] {
        let response = build_router(Arc::clone(&state))
            .oneshot(get(&format!("/api/top?k={k}")))
            .await
            .unwrap();
        let json = body_to_json(response.into_body()).await;
        assert_eq!(json["count"], 0);
    }
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let state = make_test_state();
    let response = build_router(state)
        .oneshot(get("/api/nonexistent"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_top_query_returns_json_error() {
    let state = make_test_state();
    let response = build_router(state)
        .oneshot(get("/api/top?k=abc"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], 400);
    assert!(json["error"].as_str().unwrap().contains("k"));
}

#[tokio::test]
async fn malformed_bodies_return_json_errors() {
    let state = make_test_state();

    let request = Request::builder()
        .method("POST")
        .uri("/api/sites")
        .header("content-type", "application/json")
        .body(Body::from("{\"name\": \"Bing\""))
        .unwrap();
    let response = build_router(Arc::clone(&state)).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], 400);

    let body = serde_json::json!({ "value": "lots" });
    let response = build_router(Arc::clone(&state))
        .oneshot(json_request("PUT", "/api/sites/Google/value", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], 400);

    assert_eq!(state.store.snapshot().unwrap().version, 3);
}
