//! Signaling relay client
//!
//! Every provider call goes through the relay as a JSON `POST`. Calls that
//! fail before a response arrives are retried per [`RetryPolicy`]; a received
//! response with an error status is returned as
//! [`NewsAvatarError::Provider`] with its body untouched.

use crate::protocol::{
    Ack, CreateStreamRequest, DestroyBody, IceBody, RelayEnvelope, RelayOperation, SdpBody,
    StreamKey, StreamSession, TalkBody,
};
use async_trait::async_trait;
use newsavatar_core::{
    retry_with_backoff, IceCandidate, NewsAvatarError, Result, RetryPolicy, SessionDescription,
    VoiceConfig,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace};

/// Operations the player needs from the provider
#[async_trait]
pub trait RelayClient: Send + Sync {
    /// Request a new stream animating `source_url`
    async fn create_stream(&self, source_url: &str) -> Result<StreamSession>;

    /// Submit the local SDP answer
    async fn submit_answer(&self, key: &StreamKey, answer: &SessionDescription) -> Result<Ack>;

    /// Submit one discovered ICE candidate
    async fn submit_ice(&self, key: &StreamKey, candidate: &IceCandidate) -> Result<Ack>;

    /// Ask the provider to speak `text` with `voice`
    async fn start_talk(&self, key: &StreamKey, text: &str, voice: &VoiceConfig) -> Result<Ack>;

    /// Release the stream on the provider
    async fn destroy_stream(&self, key: &StreamKey) -> Result<Ack>;
}

/// [`RelayClient`] speaking HTTP to the relay server
#[derive(Debug, Clone)]
pub struct HttpRelayClient {
    http: reqwest::Client,
    base_url: String,
    policy: RetryPolicy,
}

impl HttpRelayClient {
    /// Client for the relay at `base_url` with the default retry policy
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_policy(base_url, RetryPolicy::default())
    }

    /// Client for the relay at `base_url` with a custom retry policy
    pub fn with_policy(base_url: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            policy,
        }
    }

    /// Replace the underlying HTTP client
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Relay base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Retry policy in use
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn call<B, R>(&self, op: RelayOperation, body: &B) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        retry_with_backoff(&self.policy, op.name(), |attempt| {
            trace!(operation = op.name(), attempt, "relay request");
            self.send_once(op, body)
        })
        .await
    }

    async fn send_once<B, R>(&self, op: RelayOperation, body: &B) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, op.relay_path());
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| NewsAvatarError::transport(op.name(), &e))?;

        let status = response.status();
        // Received responses are never retried, even with a broken body
        let text = response
            .text()
            .await
            .map_err(|e| NewsAvatarError::InvalidResponse {
                operation: op.name().to_string(),
                reason: format!("failed to read response body: {}", e),
            })?;

        if !status.is_success() {
            debug!(operation = op.name(), status = status.as_u16(), "relay returned error status");
            return Err(NewsAvatarError::Provider {
                operation: op.name().to_string(),
                status: status.as_u16(),
                body: text,
            });
        }

        let payload = if text.trim().is_empty() { "null" } else { text.as_str() };
        serde_json::from_str(payload).map_err(|e| NewsAvatarError::InvalidResponse {
            operation: op.name().to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl RelayClient for HttpRelayClient {
    async fn create_stream(&self, source_url: &str) -> Result<StreamSession> {
        let request = CreateStreamRequest {
            source_url: source_url.to_string(),
        };
        let session: StreamSession = self.call(RelayOperation::CreateStream, &request).await?;
        debug!(stream_id = %session.id, session_id = %session.session_id, "stream created");
        Ok(session)
    }

    async fn submit_answer(&self, key: &StreamKey, answer: &SessionDescription) -> Result<Ack> {
        let envelope = RelayEnvelope::new(
            key.stream_id.clone(),
            SdpBody {
                answer: answer.clone(),
                session_id: key.session_id.clone(),
            },
        );
        self.call(RelayOperation::SubmitAnswer, &envelope).await
    }

    async fn submit_ice(&self, key: &StreamKey, candidate: &IceCandidate) -> Result<Ack> {
        let envelope = RelayEnvelope::new(
            key.stream_id.clone(),
            IceBody {
                candidate: candidate.clone(),
                session_id: key.session_id.clone(),
            },
        );
        self.call(RelayOperation::SubmitIce, &envelope).await
    }

    async fn start_talk(&self, key: &StreamKey, text: &str, voice: &VoiceConfig) -> Result<Ack> {
        let envelope = RelayEnvelope::new(
            key.stream_id.clone(),
            TalkBody::new(text, voice, key.session_id.clone()),
        );
        self.call(RelayOperation::StartTalk, &envelope).await
    }

    async fn destroy_stream(&self, key: &StreamKey) -> Result<Ack> {
        let envelope = RelayEnvelope::new(
            key.stream_id.clone(),
            DestroyBody {
                session_id: key.session_id.clone(),
            },
        );
        self.call(RelayOperation::DestroyStream, &envelope).await
    }
}
