//! The single owned session object
//!
//! Everything one avatar playback holds lives in a [`SessionContext`]: the
//! provider identifiers, the peer connection, its listener handles, the
//! health poll, the remote stream and the candidate gate. Teardown takes the
//! context out of the player and releases each resource from it, so nothing
//! is left behind in free variables.

use newsavatar_core::{AvatarProfile, IceCandidate};
use newsavatar_media::{ConnectionState, HealthHandle, ListenerId, PeerConnection, RemoteStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Provider identifiers of a session
pub use newsavatar_signaling::StreamKey as SessionKey;

/// Holds candidates back until the local description is set
#[derive(Debug, Default)]
pub(crate) struct CandidateGate {
    open: bool,
    pending: Vec<IceCandidate>,
}

impl CandidateGate {
    /// Returns the candidate if it may be sent now, otherwise queues it
    pub(crate) fn admit(&mut self, candidate: IceCandidate) -> Option<IceCandidate> {
        if self.open {
            Some(candidate)
        } else {
            self.pending.push(candidate);
            None
        }
    }

    /// Open the gate and hand back everything queued so far
    pub(crate) fn open(&mut self) -> Vec<IceCandidate> {
        self.open = true;
        std::mem::take(&mut self.pending)
    }
}

/// Shared liveness flag checked by every completion handler
#[derive(Debug, Clone)]
pub(crate) struct Liveness(Arc<AtomicBool>);

impl Liveness {
    fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn kill(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// State of one avatar playback
pub(crate) struct SessionContext {
    pub(crate) generation: u64,
    pub(crate) key: Option<SessionKey>,
    pub(crate) profile: AvatarProfile,
    pub(crate) title: String,
    pub(crate) state: ConnectionState,
    pub(crate) liveness: Liveness,
    pub(crate) peer: Option<Arc<dyn PeerConnection>>,
    pub(crate) listeners: Vec<ListenerId>,
    pub(crate) health: Option<HealthHandle>,
    pub(crate) stream: Option<RemoteStream>,
    pub(crate) gate: CandidateGate,
    pub(crate) playing: bool,
}

impl SessionContext {
    pub(crate) fn new(generation: u64, title: String, profile: AvatarProfile) -> Self {
        Self {
            generation,
            key: None,
            profile,
            title,
            state: ConnectionState::Unconnected,
            liveness: Liveness::new(),
            peer: None,
            listeners: Vec::new(),
            health: None,
            stream: None,
            gate: CandidateGate::default(),
            playing: false,
        }
    }

    pub(crate) fn stream_id(&self) -> Option<String> {
        self.key.as_ref().map(|k| k.stream_id.clone())
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("generation", &self.generation)
            .field("key", &self.key)
            .field("avatar", &self.profile.avatar)
            .field("state", &self.state)
            .field("alive", &self.liveness.is_alive())
            .field("listeners", &self.listeners.len())
            .field("playing", &self.playing)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use newsavatar_core::Avatar;

    fn candidate(n: u32) -> IceCandidate {
        IceCandidate {
            candidate: format!("candidate:{} 1 udp 1 10.0.0.{} 5000 typ host", n, n),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
        }
    }

    #[test]
    fn test_gate_queues_until_open() {
        let mut gate = CandidateGate::default();
        assert!(gate.admit(candidate(1)).is_none());
        assert!(gate.admit(candidate(2)).is_none());
        assert!(!gate.open);

        let flushed = gate.open();
        assert_eq!(flushed, vec![candidate(1), candidate(2)]);
        assert_eq!(gate.admit(candidate(3)), Some(candidate(3)));
        assert!(gate.open().is_empty());
    }

    #[test]
    fn test_liveness_is_shared() {
        let session = SessionContext::new(1, "t".to_string(), Avatar::Jack.profile());
        let held_by_task = session.liveness.clone();
        session.liveness.kill();
        assert!(!held_by_task.is_alive());
        assert_eq!(session.stream_id(), None);
    }
}
