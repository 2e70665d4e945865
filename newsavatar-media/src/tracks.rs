//! Remote stream and track handles

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    /// Audio track
    Audio,
    /// Video track
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => f.write_str("audio"),
            TrackKind::Video => f.write_str("video"),
        }
    }
}

/// Remote track received from the provider
///
/// Clones share the same stop flag, so stopping any clone stops the track
/// for every holder.
#[derive(Debug, Clone)]
pub struct RemoteTrack {
    id: String,
    kind: TrackKind,
    stopped: Arc<AtomicBool>,
}

impl RemoteTrack {
    /// Create a live track
    pub fn new(id: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: id.into(),
            kind,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get track ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get track kind
    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Stop consuming this track
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Whether the track has been stopped
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Remote media stream: the tracks delivered under one stream ID
#[derive(Debug, Clone)]
pub struct RemoteStream {
    id: String,
    tracks: Vec<RemoteTrack>,
}

impl RemoteStream {
    /// Create a stream holding `tracks`
    pub fn new(id: impl Into<String>, tracks: Vec<RemoteTrack>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    /// Stream ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// All tracks
    pub fn tracks(&self) -> &[RemoteTrack] {
        &self.tracks
    }

    /// Add a track unless one with the same ID is already present
    pub fn add_track(&mut self, track: RemoteTrack) {
        if !self.tracks.iter().any(|t| t.id == track.id) {
            self.tracks.push(track);
        }
    }

    /// Whether the stream carries video
    pub fn has_video(&self) -> bool {
        self.tracks.iter().any(|t| t.kind == TrackKind::Video)
    }

    /// Stop every track
    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }

    /// Whether every track has been stopped
    pub fn is_stopped(&self) -> bool {
        self.tracks.iter().all(RemoteTrack::is_stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_is_shared_between_clones() {
        let track = RemoteTrack::new("v0", TrackKind::Video);
        let held_by_sink = track.clone();
        track.stop();
        assert!(held_by_sink.is_stopped());
    }

    #[test]
    fn test_stream_stop_all() {
        let mut stream = RemoteStream::new("s", vec![RemoteTrack::new("a0", TrackKind::Audio)]);
        stream.add_track(RemoteTrack::new("v0", TrackKind::Video));
        stream.add_track(RemoteTrack::new("v0", TrackKind::Video));
        assert_eq!(stream.tracks().len(), 2);
        assert!(stream.has_video());
        assert!(!stream.is_stopped());

        stream.stop_all();
        assert!(stream.is_stopped());
    }
}
