//! # News Avatar Core
//!
//! Shared building blocks for the news avatar player: the error taxonomy,
//! the relay retry policy, the fixed avatar identities, SDP/ICE value types
//! and the client for the article-fetch collaborator.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod article;
pub mod avatar;
pub mod error;
pub mod retry;
pub mod sdp;

// Re-export main types
pub use article::{ArticleClient, ArticleRef};
pub use avatar::{Avatar, AvatarProfile, VoiceConfig};
pub use error::{NewsAvatarError, Result};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use sdp::{IceCandidate, IceServer, SdpType, SessionDescription};
