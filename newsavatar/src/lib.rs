//! # News Avatar
//!
//! Plays news articles as a talking-avatar video. The player asks the avatar
//! provider for a stream through a credential-holding relay, answers the
//! provider's WebRTC offer, trickles ICE candidates back, watches inbound
//! video to tell when the avatar is actually on screen, and releases
//! everything when the session ends or fails.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use newsavatar::{ArticleRef, Avatar, AvatarPlayer, PlayerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     newsavatar::init_logging("info")?;
//!
//!     let player = AvatarPlayer::new(PlayerConfig::from_env())?;
//!     let mut events = player.events();
//!
//!     let article = ArticleRef::new("Markets rally on rate cut hopes", Avatar::Sofia);
//!     player.play(&article).await?;
//!
//!     while let Some(event) = events.next().await {
//!         println!("Player event: {:?}", event);
//!     }
//!
//!     player.close().await;
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core types for easy access
pub use newsavatar_core::{
    ArticleClient, ArticleRef, Avatar, AvatarProfile, IceCandidate, IceServer, NewsAvatarError,
    Result, RetryPolicy, SessionDescription, VoiceConfig,
};

pub use newsavatar_media::{
    ConnectionState, IceConnectionState, MemorySink, NullSink, PeerConnection,
    PeerConnectionFactory, RemoteStream, RemoteTrack, TrackKind, VideoSink,
};

#[cfg(feature = "webrtc-backend")]
pub use newsavatar_media::WebRtcPeerFactory;

pub use newsavatar_signaling::{HttpRelayClient, RelayClient};

// Public API modules
pub mod config;
pub mod event;
pub mod logging;
pub mod player;
pub mod session;

// Re-export main API types
pub use config::PlayerConfig;
pub use event::{EventHandler, EventStream, PlayerEvent, TeardownReason};
pub use logging::init_logging;
pub use player::{AvatarPlayer, PlaybackOutcome, PlayerBuilder};
pub use session::SessionKey;
