//! Relay protocol messages
//!
//! Requests the player sends to the relay are envelopes: a `streamId` used by
//! the relay to build the provider path, flattened together with the exact
//! JSON body the provider expects.

use newsavatar_core::{IceCandidate, IceServer, SessionDescription, VoiceConfig};
use serde::{Deserialize, Serialize};

/// Driver animation used for every talk
pub const DEFAULT_DRIVER_URL: &str = "bank://lively/";

/// Provider identifiers for one live stream
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamKey {
    /// Stream ID issued at creation
    pub stream_id: String,
    /// Session ID issued at creation
    pub session_id: String,
}

/// Whether `id` can be placed into a provider path as one segment
///
/// Provider stream ids are ASCII letters, digits, `_` and `-`. Anything else
/// (separators, dot segments, query or fragment markers, escapes) is refused.
pub fn is_valid_stream_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Create a new talking-head stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateStreamRequest {
    /// Image the provider animates
    pub source_url: String,
}

/// Provider answer to stream creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSession {
    /// Stream ID
    pub id: String,
    /// Remote SDP offer
    pub offer: SessionDescription,
    /// ICE servers for the peer connection
    #[serde(default)]
    pub ice_servers: Vec<IceServer>,
    /// Session ID
    pub session_id: String,
}

impl StreamSession {
    /// Identifiers of this stream
    pub fn key(&self) -> StreamKey {
        StreamKey {
            stream_id: self.id.clone(),
            session_id: self.session_id.clone(),
        }
    }
}

/// Body of the local answer submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SdpBody {
    /// Local answer
    pub answer: SessionDescription,
    /// Session ID
    pub session_id: String,
}

/// Body of an ICE candidate submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceBody {
    /// Candidate fields at the top level, as the provider expects them
    #[serde(flatten)]
    pub candidate: IceCandidate,
    /// Session ID
    pub session_id: String,
}

/// Voice settings nested in a talk script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceProvider {
    /// TTS vendor
    #[serde(rename = "type")]
    pub provider_type: String,
    /// Neural voice ID
    pub voice_id: String,
    /// Style settings
    pub voice_config: VoiceStyle,
}

/// Speaking style
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceStyle {
    /// Style name
    pub style: String,
}

/// Text to speak
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TalkScript {
    /// Script kind, always `"text"`
    #[serde(rename = "type")]
    pub script_type: String,
    /// Text spoken by the avatar
    pub input: String,
    /// Voice settings
    pub provider: VoiceProvider,
}

/// Rendering options for a talk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TalkConfig {
    /// Stitch the animated face back into the source image
    pub stitch: bool,
}

/// Body of a start-speech request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TalkBody {
    /// What to say and how
    pub script: TalkScript,
    /// Driver animation
    pub driver_url: String,
    /// Rendering options
    pub config: TalkConfig,
    /// Session ID
    pub session_id: String,
}

impl TalkBody {
    /// Build a talk speaking `text` with `voice`
    pub fn new(text: impl Into<String>, voice: &VoiceConfig, session_id: impl Into<String>) -> Self {
        Self {
            script: TalkScript {
                script_type: "text".to_string(),
                input: text.into(),
                provider: VoiceProvider {
                    provider_type: voice.provider.clone(),
                    voice_id: voice.voice_id.clone(),
                    voice_config: VoiceStyle {
                        style: voice.style.clone(),
                    },
                },
            },
            driver_url: DEFAULT_DRIVER_URL.to_string(),
            config: TalkConfig { stitch: true },
            session_id: session_id.into(),
        }
    }
}

/// Body of a destroy-session request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestroyBody {
    /// Session ID
    pub session_id: String,
}

/// Relay envelope: the stream the body belongs to plus the provider body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayEnvelope<B> {
    /// Stream the request targets
    #[serde(rename = "streamId")]
    pub stream_id: String,
    /// Provider body, forwarded verbatim
    #[serde(flatten)]
    pub body: B,
}

impl<B> RelayEnvelope<B> {
    /// Wrap `body` for `stream_id`
    pub fn new(stream_id: impl Into<String>, body: B) -> Self {
        Self {
            stream_id: stream_id.into(),
            body,
        }
    }
}

/// Provider acknowledgement; the payload is kept as-is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ack(pub serde_json::Value);

impl Ack {
    /// Status string reported by the provider, when present
    pub fn status(&self) -> Option<&str> {
        self.0.get("status").and_then(|s| s.as_str())
    }
}

/// HTTP method used towards the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderMethod {
    /// POST
    Post,
    /// DELETE
    Delete,
}

/// Relay operations and their relay/provider routes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelayOperation {
    /// Create a stream
    CreateStream,
    /// Submit the local answer
    SubmitAnswer,
    /// Submit one ICE candidate
    SubmitIce,
    /// Start speaking
    StartTalk,
    /// Destroy the stream
    DestroyStream,
}

impl RelayOperation {
    /// Every operation
    pub const ALL: [RelayOperation; 5] = [
        RelayOperation::CreateStream,
        RelayOperation::SubmitAnswer,
        RelayOperation::SubmitIce,
        RelayOperation::StartTalk,
        RelayOperation::DestroyStream,
    ];

    /// Path on the relay
    pub fn relay_path(&self) -> &'static str {
        match self {
            RelayOperation::CreateStream => "/api/talks/streams",
            RelayOperation::SubmitAnswer => "/api/talks/streams/sdp",
            RelayOperation::SubmitIce => "/api/talks/streams/ice",
            RelayOperation::StartTalk => "/api/talks/streams/talk",
            RelayOperation::DestroyStream => "/api/talks/streams/destroy",
        }
    }

    /// Path on the provider; `None` stream for creation only
    pub fn provider_path(&self, stream_id: Option<&str>) -> String {
        let id = stream_id.unwrap_or_default();
        match self {
            RelayOperation::CreateStream => "/talks/streams".to_string(),
            RelayOperation::SubmitAnswer => format!("/talks/streams/{}/sdp", id),
            RelayOperation::SubmitIce => format!("/talks/streams/{}/ice", id),
            RelayOperation::StartTalk | RelayOperation::DestroyStream => {
                format!("/talks/streams/{}", id)
            }
        }
    }

    /// Method used towards the provider
    pub fn provider_method(&self) -> ProviderMethod {
        match self {
            RelayOperation::DestroyStream => ProviderMethod::Delete,
            _ => ProviderMethod::Post,
        }
    }

    /// Whether the relay envelope carries a `streamId`
    pub fn needs_stream_id(&self) -> bool {
        !matches!(self, RelayOperation::CreateStream)
    }

    /// Operation name used in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            RelayOperation::CreateStream => "create-session",
            RelayOperation::SubmitAnswer => "submit-answer",
            RelayOperation::SubmitIce => "submit-ice",
            RelayOperation::StartTalk => "start-speech",
            RelayOperation::DestroyStream => "destroy-session",
        }
    }
}
