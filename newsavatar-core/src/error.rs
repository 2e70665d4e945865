//! Error types for the news avatar player

use thiserror::Error;

/// Main error type for news avatar operations
#[derive(Error, Debug)]
pub enum NewsAvatarError {
    /// Initialization error
    #[error("Initialization failed: {reason}")]
    Initialization {
        /// Reason for initialization failure
        reason: String,
    },

    /// Missing configuration error
    #[error("Missing required configuration: {field}")]
    MissingConfiguration {
        /// Missing configuration field
        field: String,
    },

    /// Configuration could not be parsed or is inconsistent
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfiguration {
        /// Offending configuration field or source
        field: String,
        /// Reason the value was rejected
        reason: String,
    },

    /// Connection-level failure: nothing was received from the peer
    #[error("Transport error during {operation}: {reason}")]
    Transport {
        /// Operation that failed
        operation: String,
        /// Reason for transport error
        reason: String,
    },

    /// Every retry attempt failed at the transport level
    #[error("Max retries exceeded. error: {source}")]
    MaxRetriesExceeded {
        /// Operation that was retried
        operation: String,
        /// Total number of attempts made
        attempts: u32,
        /// Last underlying error
        #[source]
        source: Box<NewsAvatarError>,
    },

    /// The provider answered with a non-success status
    #[error("Provider rejected {operation} (status {status}): {body}")]
    Provider {
        /// Operation that was rejected
        operation: String,
        /// HTTP status code returned
        status: u16,
        /// Response body, verbatim
        body: String,
    },

    /// A response arrived but could not be understood
    #[error("Invalid response for {operation}: {reason}")]
    InvalidResponse {
        /// Operation whose response was malformed
        operation: String,
        /// Parsing failure
        reason: String,
    },

    /// Offer/answer negotiation failed; the session cannot recover
    #[error("Negotiation failed while {stage}: {reason}")]
    Negotiation {
        /// Negotiation step that failed
        stage: String,
        /// Reason for failure
        reason: String,
    },

    /// Media or peer-connection failure outside negotiation
    #[error("Media error: {reason}")]
    Media {
        /// Reason for media error
        reason: String,
    },

    /// No token available for the article collaborator
    #[error("Access Denied: No token provided.")]
    AccessDenied,

    /// The article collaborator rejected the token
    #[error("Authentication failed. Please log in.")]
    Unauthenticated {
        /// Message reported by the collaborator
        reason: String,
    },

    /// Article does not exist
    #[error("Article not found.")]
    ArticleNotFound {
        /// Requested article ID
        article_id: String,
    },

    /// The article collaborator failed
    #[error("Server error. Please try again later.")]
    Server {
        /// HTTP status code returned
        status: u16,
        /// Message reported by the collaborator
        reason: String,
    },

    /// Invalid state error
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// The session was torn down while an operation was in flight
    #[error("Session {stream_id} was closed before {operation} completed")]
    SessionClosed {
        /// Stream the operation belonged to
        stream_id: String,
        /// Operation whose result was discarded
        operation: String,
    },

    /// Server start failed
    #[error("Failed to start server on {address}: {source}")]
    ServerStartFailed {
        /// Address that failed to bind
        address: std::net::SocketAddr,
        /// Underlying error
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl NewsAvatarError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> String {
        match self {
            NewsAvatarError::Initialization { .. } => "INITIALIZATION_FAILED".to_string(),
            NewsAvatarError::MissingConfiguration { .. } => "MISSING_CONFIGURATION".to_string(),
            NewsAvatarError::InvalidConfiguration { .. } => "INVALID_CONFIGURATION".to_string(),
            NewsAvatarError::Transport { .. } => "TRANSPORT_ERROR".to_string(),
            NewsAvatarError::MaxRetriesExceeded { .. } => "MAX_RETRIES_EXCEEDED".to_string(),
            NewsAvatarError::Provider { .. } => "PROVIDER_ERROR".to_string(),
            NewsAvatarError::InvalidResponse { .. } => "INVALID_RESPONSE".to_string(),
            NewsAvatarError::Negotiation { .. } => "NEGOTIATION_FAILED".to_string(),
            NewsAvatarError::Media { .. } => "MEDIA_ERROR".to_string(),
            NewsAvatarError::AccessDenied => "ACCESS_DENIED".to_string(),
            NewsAvatarError::Unauthenticated { .. } => "UNAUTHENTICATED".to_string(),
            NewsAvatarError::ArticleNotFound { .. } => "ARTICLE_NOT_FOUND".to_string(),
            NewsAvatarError::Server { .. } => "SERVER_ERROR".to_string(),
            NewsAvatarError::InvalidState { .. } => "INVALID_STATE".to_string(),
            NewsAvatarError::SessionClosed { .. } => "SESSION_CLOSED".to_string(),
            NewsAvatarError::ServerStartFailed { .. } => "SERVER_START_FAILED".to_string(),
        }
    }

    /// Whether the failure happened below the application layer and may be retried
    pub fn is_transient(&self) -> bool {
        matches!(self, NewsAvatarError::Transport { .. })
    }

    /// Whether the presentation layer should prompt for a new login
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            NewsAvatarError::AccessDenied | NewsAvatarError::Unauthenticated { .. }
        )
    }

    /// Whether the provider answered with a 5xx status
    pub fn is_provider_server_error(&self) -> bool {
        matches!(self, NewsAvatarError::Provider { status, .. } if *status >= 500)
    }

    /// Build a transport error from a `reqwest` failure
    pub fn transport(operation: &str, err: &reqwest::Error) -> Self {
        NewsAvatarError::Transport {
            operation: operation.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Result alias used across the workspace
pub type Result<T> = std::result::Result<T, NewsAvatarError>;
