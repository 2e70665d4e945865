//! Relay server implementation
//!
//! Stateless pass-through proxy between the player and the provider. It owns
//! the provider credential and attaches it to every forwarded request; apart
//! from lifting `streamId` out of the body to build the provider path,
//! nothing is translated.

use crate::config::RelayConfig;
use crate::protocol::{is_valid_stream_id, ProviderMethod, RelayOperation};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use newsavatar_core::{NewsAvatarError, Result};
use serde_json::{json, Map, Value};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Forwards relay requests to the provider
struct ProviderForwarder {
    http: reqwest::Client,
    provider_url: String,
    authorization: String,
}

/// Shared state of the relay router
#[derive(Clone)]
pub struct RelayState {
    forwarder: Arc<ProviderForwarder>,
}

impl RelayState {
    /// Build state from a validated configuration
    pub fn new(config: &RelayConfig) -> Result<Self> {
        config.validate()?;
        let api_key = config.api_key.clone().unwrap_or_default();

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| NewsAvatarError::Initialization {
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            forwarder: Arc::new(ProviderForwarder {
                http,
                provider_url: config.provider_url.trim_end_matches('/').to_string(),
                authorization: format!("Basic {}", api_key),
            }),
        })
    }
}

impl std::fmt::Debug for RelayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayState")
            .field("provider_url", &self.forwarder.provider_url)
            .finish_non_exhaustive()
    }
}

impl ProviderForwarder {
    async fn forward(&self, op: RelayOperation, body: Bytes) -> Response {
        let mut fields = match parse_body(&body) {
            Ok(fields) => fields,
            Err(reason) => return error_response(StatusCode::BAD_REQUEST, &reason),
        };

        let stream_id = if op.needs_stream_id() {
            match fields.shift_remove("streamId") {
                Some(Value::String(id)) if is_valid_stream_id(&id) => Some(id),
                Some(Value::String(id)) if !id.is_empty() => {
                    tracing::warn!(operation = op.name(), "rejected malformed streamId");
                    return error_response(StatusCode::BAD_REQUEST, "streamId is malformed");
                }
                _ => return error_response(StatusCode::BAD_REQUEST, "streamId is required"),
            }
        } else {
            None
        };

        let url = format!("{}{}", self.provider_url, op.provider_path(stream_id.as_deref()));
        let request = match op.provider_method() {
            ProviderMethod::Post => self.http.post(&url),
            ProviderMethod::Delete => self.http.delete(&url),
        };

        let request_id = Uuid::new_v4();
        tracing::debug!(
            %request_id,
            operation = op.name(),
            stream_id = stream_id.as_deref().unwrap_or("-"),
            "forwarding to provider"
        );

        let result = request
            .header(header::AUTHORIZATION.as_str(), self.authorization.as_str())
            .header(header::CONTENT_TYPE.as_str(), "application/json")
            .body(Value::Object(fields).to_string())
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(%request_id, operation = op.name(), "provider unreachable: {}", e);
                return error_response(StatusCode::BAD_GATEWAY, "provider unreachable");
            }
        };

        let status = StatusCode::from_u16(response.status().as_u16())
            .unwrap_or(StatusCode::BAD_GATEWAY);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE.as_str())
            .and_then(|v| v.to_str().ok())
            .and_then(|v| HeaderValue::from_str(v).ok())
            .unwrap_or_else(|| HeaderValue::from_static("application/json"));

        match response.bytes().await {
            Ok(payload) => {
                tracing::info!(
                    %request_id,
                    operation = op.name(),
                    status = status.as_u16(),
                    "provider responded"
                );
                (status, [(header::CONTENT_TYPE, content_type)], payload).into_response()
            }
            Err(e) => {
                tracing::error!(
                    %request_id,
                    operation = op.name(),
                    "failed to read provider response: {}",
                    e
                );
                error_response(StatusCode::BAD_GATEWAY, "provider response interrupted")
            }
        }
    }
}

fn parse_body(body: &Bytes) -> std::result::Result<Map<String, Value>, String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err("request body must be a JSON object".to_string()),
        Err(e) => Err(format!("invalid JSON body: {}", e)),
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

async fn create_stream(State(state): State<RelayState>, body: Bytes) -> Response {
    state.forwarder.forward(RelayOperation::CreateStream, body).await
}

async fn submit_answer(State(state): State<RelayState>, body: Bytes) -> Response {
    state.forwarder.forward(RelayOperation::SubmitAnswer, body).await
}

async fn submit_ice(State(state): State<RelayState>, body: Bytes) -> Response {
    state.forwarder.forward(RelayOperation::SubmitIce, body).await
}

async fn start_talk(State(state): State<RelayState>, body: Bytes) -> Response {
    state.forwarder.forward(RelayOperation::StartTalk, body).await
}

async fn destroy_stream(State(state): State<RelayState>, body: Bytes) -> Response {
    state.forwarder.forward(RelayOperation::DestroyStream, body).await
}

async fn health_check() -> &'static str {
    "OK"
}

/// Build the relay router
pub fn build_router(state: RelayState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(RelayOperation::CreateStream.relay_path(), post(create_stream))
        .route(RelayOperation::SubmitAnswer.relay_path(), post(submit_answer))
        .route(RelayOperation::SubmitIce.relay_path(), post(submit_ice))
        .route(RelayOperation::StartTalk.relay_path(), post(start_talk))
        .route(RelayOperation::DestroyStream.relay_path(), post(destroy_stream))
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Relay server bound to a configured address
#[derive(Debug)]
pub struct RelayServer {
    /// Address the server binds to
    pub bind_addr: SocketAddr,
    state: RelayState,
}

impl RelayServer {
    /// Create a relay server from configuration
    pub fn new(config: &RelayConfig) -> Result<Self> {
        Ok(Self {
            bind_addr: config.bind_addr()?,
            state: RelayState::new(config)?,
        })
    }

    /// Router serving the relay routes
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        TcpListener::bind(self.bind_addr)
            .await
            .map_err(|e| NewsAvatarError::ServerStartFailed {
                address: self.bind_addr,
                source: e.into(),
            })
    }

    /// Start the relay and serve until the process exits
    pub async fn start(&self) -> Result<()> {
        self.start_with_shutdown(std::future::pending()).await
    }

    /// Start the relay and serve until `shutdown` resolves
    pub async fn start_with_shutdown<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = self.bind().await?;
        tracing::info!("Relay server listening on {}", self.bind_addr);
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let address = listener.local_addr().unwrap_or(self.bind_addr);
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| NewsAvatarError::ServerStartFailed {
                address,
                source: e.into(),
            })
    }
}
