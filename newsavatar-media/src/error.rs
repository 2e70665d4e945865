//! Media error types and handling
//!
//! Errors raised by the peer connection, remote tracks and video sinks.
//! They convert into [`NewsAvatarError`] at the player boundary.

use newsavatar_core::NewsAvatarError;
use thiserror::Error;

/// Main error type for peer-connection and media operations
#[derive(Error, Debug)]
pub enum MediaError {
    /// Peer connection could not be created or configured
    #[error("Peer connection error during {operation}: {reason}")]
    PeerConnection {
        /// Operation that failed
        operation: String,
        /// Failure reason
        reason: String,
    },

    /// Setting a description or creating the answer failed
    #[error("Negotiation failed while {stage}: {reason}")]
    Negotiation {
        /// Negotiation step
        stage: String,
        /// Failure reason
        reason: String,
    },

    /// The remote description could not be parsed
    #[error("Invalid session description: {reason}")]
    InvalidDescription {
        /// Parse failure
        reason: String,
    },

    /// Connection statistics were unavailable
    #[error("Stats unavailable: {reason}")]
    Stats {
        /// Failure reason
        reason: String,
    },

    /// The peer connection is already closed
    #[error("Peer connection closed")]
    Closed,

    /// A remote track ended or was stopped
    #[error("Track ended: {track_id}")]
    TrackEnded {
        /// Track identifier
        track_id: String,
    },

    /// The video sink rejected the stream
    #[error("Video sink error: {reason}")]
    Sink {
        /// Failure reason
        reason: String,
    },

    /// Invalid state for operation
    #[error("Invalid state: {message}")]
    InvalidState {
        /// State error message
        message: String,
    },
}

/// Result type alias for media operations
pub type MediaResult<T> = Result<T, MediaError>;

impl MediaError {
    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            MediaError::Stats { .. } => true,
            MediaError::Sink { .. } => true,
            MediaError::TrackEnded { .. } => true,
            MediaError::PeerConnection { .. } => false,
            MediaError::Negotiation { .. } => false,
            MediaError::InvalidDescription { .. } => false,
            MediaError::Closed => false,
            MediaError::InvalidState { .. } => false,
        }
    }

    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            MediaError::PeerConnection { .. } => ErrorCategory::Connection,
            MediaError::Negotiation { .. } => ErrorCategory::Negotiation,
            MediaError::InvalidDescription { .. } => ErrorCategory::Negotiation,
            MediaError::Stats { .. } => ErrorCategory::Connection,
            MediaError::Closed => ErrorCategory::State,
            MediaError::TrackEnded { .. } => ErrorCategory::Media,
            MediaError::Sink { .. } => ErrorCategory::Media,
            MediaError::InvalidState { .. } => ErrorCategory::State,
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Offer/answer failures
    Negotiation,
    /// Peer connection and ICE failures
    Connection,
    /// Track and sink failures
    Media,
    /// State management errors
    State,
}

impl From<MediaError> for NewsAvatarError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::Negotiation { stage, reason } => NewsAvatarError::Negotiation { stage, reason },
            MediaError::InvalidDescription { reason } => NewsAvatarError::Negotiation {
                stage: "parsing the remote description".to_string(),
                reason,
            },
            other => NewsAvatarError::Media {
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        let negotiation = MediaError::Negotiation {
            stage: "setting the remote description".to_string(),
            reason: "malformed sdp".to_string(),
        };
        assert_eq!(negotiation.category(), ErrorCategory::Negotiation);
        assert!(!negotiation.is_recoverable());

        let stats = MediaError::Stats {
            reason: "not connected".to_string(),
        };
        assert_eq!(stats.category(), ErrorCategory::Connection);
        assert!(stats.is_recoverable());
    }

    #[test]
    fn test_conversion_keeps_negotiation_distinct() {
        let err: NewsAvatarError = MediaError::InvalidDescription {
            reason: "missing m-line".to_string(),
        }
        .into();
        assert_eq!(err.error_code(), "NEGOTIATION_FAILED");

        let err: NewsAvatarError = MediaError::Closed.into();
        assert_eq!(err.error_code(), "MEDIA_ERROR");
    }
}
