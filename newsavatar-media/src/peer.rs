//! Peer connection abstraction
//!
//! The player drives exactly one peer connection per session through the
//! [`PeerConnection`] trait. Native callbacks are fanned out through a
//! [`ListenerRegistry`]: every registration returns a [`ListenerId`] so the
//! whole subscription list can be removed in one teardown step.

use crate::error::MediaResult;
use crate::tracks::RemoteStream;
use async_trait::async_trait;
use newsavatar_core::{IceCandidate, IceServer, SessionDescription};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Native ICE connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IceConnectionState {
    /// Gathering has not started
    New,
    /// Checking candidate pairs
    Checking,
    /// A usable pair was found
    Connected,
    /// Checking finished with a usable pair
    Completed,
    /// Connectivity was lost, may recover
    Disconnected,
    /// No usable pair
    Failed,
    /// Agent shut down
    Closed,
}

impl IceConnectionState {
    /// Whether media can flow
    pub fn is_connected(&self) -> bool {
        matches!(self, IceConnectionState::Connected | IceConnectionState::Completed)
    }
}

impl fmt::Display for IceConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IceConnectionState::New => "new",
            IceConnectionState::Checking => "checking",
            IceConnectionState::Connected => "connected",
            IceConnectionState::Completed => "completed",
            IceConnectionState::Disconnected => "disconnected",
            IceConnectionState::Failed => "failed",
            IceConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Native signaling state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalingState {
    /// No offer/answer exchange in progress
    Stable,
    /// Local offer applied
    HaveLocalOffer,
    /// Remote offer applied
    HaveRemoteOffer,
    /// Local provisional answer applied
    HaveLocalPranswer,
    /// Remote provisional answer applied
    HaveRemotePranswer,
    /// Connection closed
    Closed,
}

/// Session connection state derived from the native ICE state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No session
    #[default]
    Unconnected,
    /// Offer received, descriptions being exchanged
    Negotiating,
    /// ICE connected
    Connected,
    /// ICE failed or negotiation failed
    Failed,
    /// Torn down
    Closed,
}

impl ConnectionState {
    /// State after the native ICE state changed to `ice`
    ///
    /// Terminal states never change; `connected` is only reachable from
    /// `negotiating` (or by staying connected).
    pub fn after_ice(self, ice: IceConnectionState) -> ConnectionState {
        match (self, ice) {
            (ConnectionState::Failed | ConnectionState::Closed, _) => self,
            (_, IceConnectionState::Failed) => ConnectionState::Failed,
            (_, IceConnectionState::Closed) => ConnectionState::Closed,
            (ConnectionState::Negotiating | ConnectionState::Connected, ice) if ice.is_connected() => {
                ConnectionState::Connected
            }
            _ => self,
        }
    }

    /// Whether the session can no longer make progress
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Unconnected => "unconnected",
            ConnectionState::Negotiating => "negotiating",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Event raised by the native peer connection
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// A local ICE candidate was gathered
    CandidateDiscovered(IceCandidate),
    /// The ICE connection state changed
    IceStateChanged(IceConnectionState),
    /// A remote track arrived; carries the stream it belongs to
    TrackReceived(RemoteStream),
}

impl PeerEvent {
    /// Listener kind this event is delivered to
    pub fn kind(&self) -> PeerEventKind {
        match self {
            PeerEvent::CandidateDiscovered(_) => PeerEventKind::Candidate,
            PeerEvent::IceStateChanged(_) => PeerEventKind::IceState,
            PeerEvent::TrackReceived(_) => PeerEventKind::Track,
        }
    }
}

/// Listener slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerEventKind {
    /// Candidate discovered
    Candidate,
    /// ICE state changed
    IceState,
    /// Track received
    Track,
}

/// Callback invoked for peer events
pub type PeerEventHandler = Arc<dyn Fn(PeerEvent) + Send + Sync>;

/// Handle returned by listener registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Subscription list owned by one peer connection
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, PeerEventKind, PeerEventHandler)>>,
}

impl ListenerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events of `kind`
    pub fn add(&self, kind: PeerEventKind, handler: PeerEventHandler) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, kind, handler));
        id
    }

    /// Remove a listener; returns whether it was registered
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _, _)| *lid != id);
        listeners.len() != before
    }

    /// Remove every listener
    pub fn clear(&self) {
        self.listeners.lock().clear();
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Whether no listener is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every listener of its kind
    pub fn dispatch(&self, event: PeerEvent) {
        let kind = event.kind();
        // Handlers run outside the lock so they may unregister themselves.
        let handlers: Vec<PeerEventHandler> = self
            .listeners
            .lock()
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, h)| h.clone())
            .collect();

        for handler in handlers {
            handler(event.clone());
        }
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

/// One peer connection to the provider
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Apply the provider's offer
    async fn set_remote_description(&self, description: &SessionDescription) -> MediaResult<()>;

    /// Generate the local answer
    async fn create_answer(&self) -> MediaResult<SessionDescription>;

    /// Apply the local answer
    async fn set_local_description(&self, description: &SessionDescription) -> MediaResult<()>;

    /// Register a listener
    fn add_listener(&self, kind: PeerEventKind, handler: PeerEventHandler) -> ListenerId;

    /// Unregister a listener
    fn remove_listener(&self, id: ListenerId) -> bool;

    /// Current native ICE state
    fn ice_connection_state(&self) -> IceConnectionState;

    /// Current native signaling state
    fn signaling_state(&self) -> SignalingState;

    /// Total bytes received on inbound video, if a report exists yet
    async fn inbound_video_bytes(&self) -> MediaResult<Option<u64>>;

    /// Close the connection
    async fn close(&self) -> MediaResult<()>;
}

/// Creates peer connections configured with the provider's ICE servers
#[async_trait]
pub trait PeerConnectionFactory: Send + Sync {
    /// Create a new peer connection
    async fn create(&self, ice_servers: &[IceServer]) -> MediaResult<Arc<dyn PeerConnection>>;
}
