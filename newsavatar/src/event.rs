//! Event system for player and session events

use newsavatar_core::IceCandidate;
use newsavatar_media::{ConnectionState, RemoteStream};
use parking_lot::Mutex;
use std::fmt;
use tokio::sync::mpsc;
use tracing::debug;

/// Why a session was torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownReason {
    /// Explicit close or navigation away
    Requested,
    /// A new playback request replaced the session
    Replaced,
    /// ICE connection failed
    IceFailed,
    /// ICE connection closed
    IceClosed,
    /// Negotiation or signaling failed
    Error,
}

impl fmt::Display for TeardownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            TeardownReason::Requested => "requested",
            TeardownReason::Replaced => "replaced",
            TeardownReason::IceFailed => "ice failed",
            TeardownReason::IceClosed => "ice closed",
            TeardownReason::Error => "error",
        };
        f.write_str(reason)
    }
}

/// Player events that can occur during playback
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    /// Session connection state changed
    StateChanged {
        /// Stream the state belongs to, if a session exists
        stream_id: Option<String>,
        /// New connection state
        state: ConnectionState,
    },
    /// A local ICE candidate was accepted by the relay
    CandidateSent {
        /// Stream ID
        stream_id: String,
        /// The candidate
        candidate: IceCandidate,
    },
    /// Inbound video started or stopped flowing
    VideoStatusChanged {
        /// Stream ID
        stream_id: String,
        /// Whether video is playing
        playing: bool,
        /// Remote stream attached to the sink when playing
        stream: Option<RemoteStream>,
    },
    /// The provider accepted the start-speech request
    SpeechStarted {
        /// Stream ID
        stream_id: String,
    },
    /// Playback failed
    PlaybackFailed {
        /// Stable error code
        error_code: String,
        /// Human-readable message
        message: String,
        /// Whether the user should log in again
        requires_login: bool,
    },
    /// The session was torn down
    TornDown {
        /// Stream that was released, if one existed
        stream_id: Option<String>,
        /// Why it happened
        reason: TeardownReason,
    },
}

impl PlayerEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            PlayerEvent::StateChanged { .. } => "state_changed",
            PlayerEvent::CandidateSent { .. } => "candidate_sent",
            PlayerEvent::VideoStatusChanged { .. } => "video_status_changed",
            PlayerEvent::SpeechStarted { .. } => "speech_started",
            PlayerEvent::PlaybackFailed { .. } => "playback_failed",
            PlayerEvent::TornDown { .. } => "torn_down",
        }
    }

    /// Check if this is an error event
    pub fn is_error_event(&self) -> bool {
        matches!(self, PlayerEvent::PlaybackFailed { .. })
    }
}

/// Stream of player events for async iteration
#[derive(Debug)]
pub struct EventStream {
    receiver: mpsc::UnboundedReceiver<PlayerEvent>,
}

impl EventStream {
    /// Create a new event stream with a receiver
    pub fn new(receiver: mpsc::UnboundedReceiver<PlayerEvent>) -> Self {
        Self { receiver }
    }

    /// Get the next event from the stream
    pub async fn next(&mut self) -> Option<PlayerEvent> {
        self.receiver.recv().await
    }

    /// Try to get the next event without blocking
    pub fn try_next(&mut self) -> Result<Option<PlayerEvent>, mpsc::error::TryRecvError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                Err(mpsc::error::TryRecvError::Disconnected)
            }
        }
    }

    /// Drain every event already queued
    pub fn drain(&mut self) -> Vec<PlayerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// Close the event stream
    pub fn close(&mut self) {
        self.receiver.close();
    }

    /// Check if the event stream is closed
    pub fn is_closed(&self) -> bool {
        self.receiver.is_closed()
    }
}

/// Fan-out of player events to every open [`EventStream`]
#[derive(Debug, Default)]
pub(crate) struct EventBus {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<PlayerEvent>>>,
}

impl EventBus {
    pub(crate) fn subscribe(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        EventStream::new(rx)
    }

    pub(crate) fn emit(&self, event: PlayerEvent) {
        debug!("player event: {}", event.event_type());
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Event handler for callback-style event processing
#[derive(Debug)]
pub struct EventHandler {
    _task_handle: tokio::task::JoinHandle<()>,
}

impl EventHandler {
    /// Run `callback` for every event of `stream` on a background task
    pub fn spawn<F>(mut stream: EventStream, mut callback: F) -> Self
    where
        F: FnMut(PlayerEvent) + Send + 'static,
    {
        let task_handle = tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                callback(event);
            }
        });

        Self {
            _task_handle: task_handle,
        }
    }

    /// Whether the handler stopped because its stream ended
    pub fn is_finished(&self) -> bool {
        self._task_handle.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_bus_fans_out_and_prunes_closed_streams() {
        let bus = EventBus::default();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        second.close();

        bus.emit(PlayerEvent::SpeechStarted {
            stream_id: "s".to_string(),
        });

        assert_eq!(first.drain().len(), 1);
        assert_eq!(bus.subscribers.lock().len(), 1);
        assert!(second.is_closed());
    }

    #[test]
    fn test_event_types() {
        let failed = PlayerEvent::PlaybackFailed {
            error_code: "NEGOTIATION_FAILED".to_string(),
            message: "bad offer".to_string(),
            requires_login: false,
        };
        assert_eq!(failed.event_type(), "playback_failed");
        assert!(failed.is_error_event());

        let torn = PlayerEvent::TornDown {
            stream_id: None,
            reason: TeardownReason::Requested,
        };
        assert!(!torn.is_error_event());
    }

    #[tokio::test]
    async fn test_event_handler_runs_callback() {
        let bus = EventBus::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler = EventHandler::spawn(bus.subscribe(), move |event| {
            sink.lock().push(event.event_type());
        });

        bus.emit(PlayerEvent::SpeechStarted {
            stream_id: "s".to_string(),
        });
        drop(bus);

        while !handler.is_finished() {
            tokio::task::yield_now().await;
        }
        assert_eq!(*seen.lock(), vec!["speech_started"]);
    }
}
