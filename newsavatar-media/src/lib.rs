//! # News Avatar Media
//!
//! Peer connection, remote media and stream health for the news avatar
//! player. The [`PeerConnection`] trait is the seam between the session logic
//! and the WebRTC stack; the default backend is webrtc-rs.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod health;
pub mod peer;
pub mod sink;
pub mod tracks;
#[cfg(feature = "webrtc-backend")]
pub mod webrtc_peer;

// Re-export main types
pub use error::{ErrorCategory, MediaError, MediaResult};
pub use health::{HealthEdge, HealthHandle, HealthMonitor, HealthSample, PlaybackDetector};
pub use peer::{
    ConnectionState, IceConnectionState, ListenerId, ListenerRegistry, PeerConnection,
    PeerConnectionFactory, PeerEvent, PeerEventHandler, PeerEventKind, SignalingState,
};
pub use sink::{MemorySink, NullSink, VideoSink};
pub use tracks::{RemoteStream, RemoteTrack, TrackKind};
#[cfg(feature = "webrtc-backend")]
pub use webrtc_peer::{WebRtcPeer, WebRtcPeerFactory};
