//! Stream health monitoring
//!
//! Inbound video is considered playing while its received-byte counter keeps
//! growing between polls. This is a liveness heuristic: it says nothing about
//! frame-accurate playback.

use crate::error::MediaError;
use crate::peer::PeerConnection;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace};

/// Default polling interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// One poll of the inbound video byte counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSample {
    /// Total inbound video bytes at poll time
    pub bytes_received: u64,
}

/// Change of the playing state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthEdge {
    /// New playing state
    pub playing: bool,
    /// Sample that caused the change
    pub sample: HealthSample,
}

/// Edge detector over byte-count samples
///
/// Keeps only the previous sample. The first sample is a baseline. A growing
/// counter reports playing immediately; not-playing is reported after
/// `stall_samples` consecutive samples without growth.
#[derive(Debug, Clone)]
pub struct PlaybackDetector {
    stall_samples: u32,
    last: Option<u64>,
    playing: bool,
    stalled_for: u32,
}

impl Default for PlaybackDetector {
    fn default() -> Self {
        Self::new(2)
    }
}

impl PlaybackDetector {
    /// Detector that reports a stall after `stall_samples` flat samples
    pub fn new(stall_samples: u32) -> Self {
        Self {
            stall_samples: stall_samples.max(1),
            last: None,
            playing: false,
            stalled_for: 0,
        }
    }

    /// Current playing state
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Feed a sample; returns the new state when it changed
    pub fn observe(&mut self, bytes_received: u64) -> Option<bool> {
        let previous = self.last.replace(bytes_received)?;

        if bytes_received > previous {
            self.stalled_for = 0;
            if !self.playing {
                self.playing = true;
                return Some(true);
            }
            return None;
        }

        self.stalled_for = self.stalled_for.saturating_add(1);
        if self.playing && self.stalled_for >= self.stall_samples {
            self.playing = false;
            return Some(false);
        }
        None
    }
}

/// Polls a peer connection's statistics at a fixed interval
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    interval: Duration,
    stall_samples: u32,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, 2)
    }
}

impl HealthMonitor {
    /// Create a monitor
    pub fn new(interval: Duration, stall_samples: u32) -> Self {
        Self {
            interval,
            stall_samples,
        }
    }

    /// Polling interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start polling `peer`, sending every edge to `edges`
    ///
    /// The first poll happens one interval after the call. Polling stops
    /// when the handle is cancelled or dropped, when the receiver goes away,
    /// or when the peer reports it is closed.
    pub fn spawn(
        &self,
        peer: Arc<dyn PeerConnection>,
        edges: mpsc::UnboundedSender<HealthEdge>,
    ) -> HealthHandle {
        let period = self.interval;
        let mut detector = PlaybackDetector::new(self.stall_samples);

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let bytes_received = match peer.inbound_video_bytes().await {
                    Ok(Some(bytes)) => bytes,
                    Ok(None) => continue,
                    Err(MediaError::Closed) => break,
                    Err(e) => {
                        debug!("health poll failed: {}", e);
                        continue;
                    }
                };

                trace!(bytes_received, "health sample");
                if let Some(playing) = detector.observe(bytes_received) {
                    let edge = HealthEdge {
                        playing,
                        sample: HealthSample { bytes_received },
                    };
                    if edges.send(edge).is_err() {
                        break;
                    }
                }
            }
            debug!("health polling stopped");
        });

        HealthHandle { task: Some(task) }
    }
}

/// Running health poll; cancelled on drop
#[derive(Debug)]
pub struct HealthHandle {
    task: Option<JoinHandle<()>>,
}

impl HealthHandle {
    /// Stop polling immediately
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Whether polling is still running
    pub fn is_active(&self) -> bool {
        self.task.as_ref().map_or(false, |t| !t.is_finished())
    }
}

impl Drop for HealthHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges(detector: &mut PlaybackDetector, samples: &[u64]) -> Vec<(usize, bool)> {
        samples
            .iter()
            .enumerate()
            .filter_map(|(i, bytes)| detector.observe(*bytes).map(|p| (i, p)))
            .collect()
    }

    #[test]
    fn test_single_flip_into_playing() {
        let mut detector = PlaybackDetector::default();
        assert_eq!(edges(&mut detector, &[0, 0, 50, 50, 120]), vec![(2, true)]);
        assert!(detector.is_playing());
    }

    #[test]
    fn test_stall_reported_after_threshold() {
        let mut detector = PlaybackDetector::new(2);
        assert_eq!(
            edges(&mut detector, &[0, 10, 10, 10, 20]),
            vec![(1, true), (3, false), (4, true)]
        );
    }

    #[test]
    fn test_raw_comparison_with_threshold_one() {
        let mut detector = PlaybackDetector::new(1);
        assert_eq!(
            edges(&mut detector, &[0, 0, 50, 50, 120]),
            vec![(2, true), (3, false), (4, true)]
        );
    }

    #[test]
    fn test_first_sample_is_baseline() {
        let mut detector = PlaybackDetector::default();
        assert_eq!(detector.observe(5_000), None);
        assert!(!detector.is_playing());
    }

    #[test]
    fn test_counter_reset_is_not_playing() {
        let mut detector = PlaybackDetector::new(1);
        assert_eq!(edges(&mut detector, &[100, 200, 0]), vec![(1, true), (2, false)]);
    }
}
