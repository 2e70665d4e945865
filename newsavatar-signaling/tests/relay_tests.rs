//! Integration tests for the relay server and client
//!
//! A fake provider records every request it receives; the relay under test
//! forwards to it, and the `HttpRelayClient` talks to the relay.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::IntoResponse,
    Json, Router,
};
use newsavatar_core::{Avatar, IceCandidate, NewsAvatarError, RetryPolicy, SessionDescription};
use newsavatar_signaling::{
    build_router, HttpRelayClient, RelayClient, RelayConfig, RelayState, StreamKey,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
struct ProviderRequest {
    method: Method,
    path: String,
    authorization: Option<String>,
    body: Value,
}

#[derive(Clone, Default)]
struct FakeProvider {
    requests: Arc<Mutex<Vec<ProviderRequest>>>,
}

impl FakeProvider {
    fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().clone()
    }
}

async fn provider_handler(
    State(provider): State<FakeProvider>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    provider.requests.lock().push(ProviderRequest {
        method: method.clone(),
        path: uri.path().to_string(),
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    });

    match (method, uri.path()) {
        (Method::POST, "/talks/streams") => (
            StatusCode::CREATED,
            Json(json!({
                "id": "strm_1",
                "offer": {"type": "offer", "sdp": "v=0\r\n"},
                "ice_servers": [{"urls": ["stun:stun.example.com"]}],
                "session_id": "sess_1"
            })),
        ),
        (_, path) if path.starts_with("/talks/streams/limited") => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"kind": "TooManyRequests", "description": "slow down"})),
        ),
        _ => (StatusCode::OK, Json(json!({"status": "success"}))),
    }
}

async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn start_provider() -> (FakeProvider, SocketAddr) {
    let provider = FakeProvider::default();
    let router = Router::new()
        .fallback(provider_handler)
        .with_state(provider.clone());
    (provider, serve(router).await)
}

async fn start_relay(provider_url: String) -> SocketAddr {
    let config = RelayConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        provider_url,
        api_key: Some("test-key".to_string()),
        request_timeout_secs: 5,
    };
    serve(build_router(RelayState::new(&config).unwrap())).await
}

fn quick_policy() -> RetryPolicy {
    RetryPolicy {
        max_delay: Duration::from_millis(1),
        ..RetryPolicy::default()
    }
}

fn stream_key(stream_id: &str) -> StreamKey {
    StreamKey {
        stream_id: stream_id.to_string(),
        session_id: "sess_1".to_string(),
    }
}

#[tokio::test]
async fn test_create_stream_injects_credential() {
    let (provider, provider_addr) = start_provider().await;
    let relay = start_relay(format!("http://{}", provider_addr)).await;
    let client = HttpRelayClient::with_policy(format!("http://{}", relay), quick_policy());

    let session = client
        .create_stream(Avatar::Jack.profile().source_url)
        .await
        .unwrap();
    assert_eq!(session.id, "strm_1");
    assert_eq!(session.session_id, "sess_1");
    assert_eq!(session.ice_servers.len(), 1);

    let requests = provider.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::POST);
    assert_eq!(requests[0].path, "/talks/streams");
    assert_eq!(requests[0].authorization.as_deref(), Some("Basic test-key"));
    assert_eq!(
        requests[0].body,
        json!({"source_url": Avatar::Jack.profile().source_url})
    );
}

#[tokio::test]
async fn test_stream_id_moves_into_provider_path() {
    let (provider, provider_addr) = start_provider().await;
    let relay = start_relay(format!("http://{}", provider_addr)).await;
    let client = HttpRelayClient::with_policy(format!("http://{}", relay), quick_policy());
    let key = stream_key("strm_1");

    client
        .submit_answer(&key, &SessionDescription::answer("v=0"))
        .await
        .unwrap();
    client
        .submit_ice(
            &key,
            &IceCandidate {
                candidate: "candidate:1 1 udp 1 10.0.0.2 5000 typ host".to_string(),
                sdp_mid: Some("0".to_string()),
                sdp_mline_index: Some(0),
            },
        )
        .await
        .unwrap();
    let ack = client
        .start_talk(&key, "Rates held steady", &Avatar::Sofia.profile().voice)
        .await
        .unwrap();
    assert_eq!(ack.status(), Some("success"));
    client.destroy_stream(&key).await.unwrap();

    let requests = provider.requests();
    let routes: Vec<_> = requests
        .iter()
        .map(|r| (r.method.clone(), r.path.as_str()))
        .collect();
    assert_eq!(
        routes,
        vec![
            (Method::POST, "/talks/streams/strm_1/sdp"),
            (Method::POST, "/talks/streams/strm_1/ice"),
            (Method::POST, "/talks/streams/strm_1"),
            (Method::DELETE, "/talks/streams/strm_1"),
        ]
    );

    for request in &requests {
        assert!(request.body.get("streamId").is_none());
        assert_eq!(request.body["session_id"], "sess_1");
        assert_eq!(request.authorization.as_deref(), Some("Basic test-key"));
    }
    assert_eq!(requests[1].body["sdpMid"], "0");
    assert_eq!(requests[2].body["script"]["provider"]["voice_id"], "en-US-JennyNeural");
    assert_eq!(requests[3].body, json!({"session_id": "sess_1"}));
}

#[tokio::test]
async fn test_provider_error_is_surfaced_verbatim_without_retry() {
    let (provider, provider_addr) = start_provider().await;
    let relay = start_relay(format!("http://{}", provider_addr)).await;
    let client = HttpRelayClient::with_policy(format!("http://{}", relay), quick_policy());

    let err = client
        .destroy_stream(&stream_key("limited"))
        .await
        .unwrap_err();

    match err {
        NewsAvatarError::Provider { status, body, .. } => {
            assert_eq!(status, 429);
            let body: Value = serde_json::from_str(&body).unwrap();
            assert_eq!(body["kind"], "TooManyRequests");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(provider.requests().len(), 1);
}

#[tokio::test]
async fn test_missing_stream_id_is_bad_request() {
    let (provider, provider_addr) = start_provider().await;
    let relay = start_relay(format!("http://{}", provider_addr)).await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/api/talks/streams/ice", relay))
        .json(&json!({"candidate": "c", "session_id": "sess_1"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
    assert!(provider.requests().is_empty());
}

#[tokio::test]
async fn test_traversal_stream_id_never_reaches_provider() {
    let (provider, provider_addr) = start_provider().await;
    let relay = start_relay(format!("http://{}", provider_addr)).await;
    let client = HttpRelayClient::with_policy(format!("http://{}", relay), quick_policy());

    let err = client
        .destroy_stream(&stream_key("../../credits"))
        .await
        .unwrap_err();
    assert!(matches!(err, NewsAvatarError::Provider { status: 400, .. }));

    let err = client
        .submit_answer(
            &stream_key("x/../../../v1/admin?"),
            &SessionDescription::answer("v=0"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, NewsAvatarError::Provider { status: 400, .. }));

    let response = reqwest::Client::new()
        .post(format!("http://{}/api/talks/streams/talk", relay))
        .json(&json!({"streamId": "strm_1?x=", "session_id": "sess_1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    assert!(provider.requests().is_empty());
}

#[tokio::test]
async fn test_unreachable_provider_is_bad_gateway() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = listener.local_addr().unwrap();
    drop(listener);

    let relay = start_relay(format!("http://{}", dead)).await;
    let client = HttpRelayClient::with_policy(format!("http://{}", relay), quick_policy());

    let err = client.create_stream("https://example.com/a.png").await.unwrap_err();
    assert!(matches!(err, NewsAvatarError::Provider { status: 502, .. }));
}

#[tokio::test]
async fn test_health_and_cors() {
    let (_provider, provider_addr) = start_provider().await;
    let relay = start_relay(format!("http://{}", provider_addr)).await;

    let response = reqwest::Client::new()
        .get(format!("http://{}/health", relay))
        .header("origin", "http://localhost:3000")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("http://localhost:3000")
    );
    assert_eq!(response.text().await.unwrap(), "OK");
}
