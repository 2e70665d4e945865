//! Tests for stream health polling
//!
//! A scripted peer connection reports byte counters; time is paused so the
//! 500 ms interval runs instantly.

use async_trait::async_trait;
use newsavatar_core::SessionDescription;
use newsavatar_media::*;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Default)]
struct ScriptedPeer {
    samples: Mutex<VecDeque<u64>>,
    last: Mutex<Option<u64>>,
    polls: AtomicUsize,
    closed: AtomicBool,
    listeners: ListenerRegistry,
}

impl ScriptedPeer {
    fn new(samples: &[u64]) -> Arc<Self> {
        Arc::new(Self {
            samples: Mutex::new(samples.iter().copied().collect()),
            ..Self::default()
        })
    }

    fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerConnection for ScriptedPeer {
    async fn set_remote_description(&self, _: &SessionDescription) -> MediaResult<()> {
        Ok(())
    }

    async fn create_answer(&self) -> MediaResult<SessionDescription> {
        Ok(SessionDescription::answer("v=0"))
    }

    async fn set_local_description(&self, _: &SessionDescription) -> MediaResult<()> {
        Ok(())
    }

    fn add_listener(&self, kind: PeerEventKind, handler: PeerEventHandler) -> ListenerId {
        self.listeners.add(kind, handler)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    fn ice_connection_state(&self) -> IceConnectionState {
        IceConnectionState::Connected
    }

    fn signaling_state(&self) -> SignalingState {
        SignalingState::Stable
    }

    async fn inbound_video_bytes(&self) -> MediaResult<Option<u64>> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            return Err(MediaError::Closed);
        }
        let mut last = self.last.lock();
        if let Some(next) = self.samples.lock().pop_front() {
            *last = Some(next);
        }
        Ok(*last)
    }

    async fn close(&self) -> MediaResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_polling_reports_edges() {
    let peer = ScriptedPeer::new(&[0, 0, 50, 50, 120]);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _handle = HealthMonitor::default().spawn(peer.clone(), tx);

    let first = rx.recv().await.unwrap();
    assert!(first.playing);
    assert_eq!(first.sample.bytes_received, 50);
    assert_eq!(peer.polls(), 3);

    // After the script runs out the counter stays at 120 and stalls.
    let second = rx.recv().await.unwrap();
    assert!(!second.playing);
    assert_eq!(second.sample.bytes_received, 120);
    assert_eq!(peer.polls(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_first_poll_waits_one_interval() {
    let peer = ScriptedPeer::new(&[0]);
    let (tx, _rx) = mpsc::unbounded_channel();
    let monitor = HealthMonitor::new(Duration::from_millis(500), 2);
    let _handle = monitor.spawn(peer.clone(), tx);

    tokio::time::sleep(Duration::from_millis(499)).await;
    assert_eq!(peer.polls(), 0);

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(peer.polls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_polling() {
    let peer = ScriptedPeer::new(&[0, 10, 20]);
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut handle = HealthMonitor::default().spawn(peer.clone(), tx);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(peer.polls(), 2);
    assert!(handle.is_active());

    handle.cancel();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(peer.polls(), 2);
    assert!(!handle.is_active());
}

#[tokio::test(start_paused = true)]
async fn test_closed_peer_ends_polling() {
    let peer = ScriptedPeer::new(&[0, 10]);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _handle = HealthMonitor::default().spawn(peer.clone(), tx);

    peer.close().await.unwrap();
    // The task exits and drops its sender.
    assert!(rx.recv().await.is_none());
    assert_eq!(peer.polls(), 1);
}
