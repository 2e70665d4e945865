//! webrtc-rs backed peer connection
//!
//! Native callbacks are installed once at creation and forward into the
//! connection's [`ListenerRegistry`]. Remote RTP is drained on a background
//! task per track so the receive statistics keep moving.

use crate::error::{MediaError, MediaResult};
use crate::peer::{
    IceConnectionState, ListenerId, ListenerRegistry, PeerConnection, PeerConnectionFactory,
    PeerEvent, PeerEventHandler, PeerEventKind, SignalingState,
};
use crate::tracks::{RemoteStream, RemoteTrack, TrackKind};
use async_trait::async_trait;
use newsavatar_core::{IceCandidate, IceServer, SdpType, SessionDescription};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::stats::StatsReportType;
use webrtc::track::track_remote::TrackRemote;

/// State shared with the native callbacks
#[derive(Default)]
struct Shared {
    listeners: ListenerRegistry,
    streams: Mutex<HashMap<String, RemoteStream>>,
    drained_video_bytes: AtomicU64,
    closed: AtomicBool,
}

/// Peer connection backed by webrtc-rs
pub struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for WebRtcPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebRtcPeer")
            .field("listeners", &self.shared.listeners)
            .field("closed", &self.shared.closed.load(Ordering::SeqCst))
            .finish()
    }
}

/// Creates [`WebRtcPeer`]s with the default codecs and interceptors
#[derive(Debug, Default, Clone, Copy)]
pub struct WebRtcPeerFactory;

impl WebRtcPeerFactory {
    /// Create a factory
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PeerConnectionFactory for WebRtcPeerFactory {
    async fn create(&self, ice_servers: &[IceServer]) -> MediaResult<Arc<dyn PeerConnection>> {
        let peer = WebRtcPeer::connect(ice_servers).await?;
        Ok(Arc::new(peer))
    }
}

fn peer_error(operation: &'static str) -> impl FnOnce(webrtc::Error) -> MediaError {
    move |e| MediaError::PeerConnection {
        operation: operation.to_string(),
        reason: e.to_string(),
    }
}

fn negotiation_error(stage: &'static str) -> impl FnOnce(webrtc::Error) -> MediaError {
    move |e| MediaError::Negotiation {
        stage: stage.to_string(),
        reason: e.to_string(),
    }
}

fn to_rtc_ice_server(server: &IceServer) -> RTCIceServer {
    RTCIceServer {
        urls: server.urls.clone(),
        username: server.username.clone().unwrap_or_default(),
        credential: server.credential.clone().unwrap_or_default(),
        ..Default::default()
    }
}

fn to_rtc_description(description: &SessionDescription) -> MediaResult<RTCSessionDescription> {
    let sdp = description.sdp.clone();
    let parsed = match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(sdp),
        SdpType::Answer => RTCSessionDescription::answer(sdp),
        SdpType::Pranswer => RTCSessionDescription::pranswer(sdp),
        SdpType::Rollback => {
            return Err(MediaError::InvalidDescription {
                reason: "rollback is not supported".to_string(),
            })
        }
    };
    parsed.map_err(|e| MediaError::InvalidDescription {
        reason: e.to_string(),
    })
}

fn ice_state(state: RTCIceConnectionState) -> Option<IceConnectionState> {
    match state {
        RTCIceConnectionState::New => Some(IceConnectionState::New),
        RTCIceConnectionState::Checking => Some(IceConnectionState::Checking),
        RTCIceConnectionState::Connected => Some(IceConnectionState::Connected),
        RTCIceConnectionState::Completed => Some(IceConnectionState::Completed),
        RTCIceConnectionState::Disconnected => Some(IceConnectionState::Disconnected),
        RTCIceConnectionState::Failed => Some(IceConnectionState::Failed),
        RTCIceConnectionState::Closed => Some(IceConnectionState::Closed),
        _ => None,
    }
}

impl WebRtcPeer {
    /// Create a peer connection using `ice_servers`
    pub async fn connect(ice_servers: &[IceServer]) -> MediaResult<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(peer_error("registering codecs"))?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(peer_error("registering interceptors"))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers: ice_servers.iter().map(to_rtc_ice_server).collect(),
            ..Default::default()
        };

        let pc = Arc::new(
            api.new_peer_connection(config)
                .await
                .map_err(peer_error("creating peer connection"))?,
        );

        let peer = Self {
            pc,
            shared: Arc::new(Shared::default()),
        };
        peer.install_callbacks();
        debug!(ice_servers = ice_servers.len(), "peer connection created");
        Ok(peer)
    }

    fn install_callbacks(&self) {
        let shared = self.shared.clone();
        self.pc
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                let shared = shared.clone();
                Box::pin(async move {
                    let Some(candidate) = candidate else {
                        debug!("ICE gathering complete");
                        return;
                    };
                    match candidate.to_json() {
                        Ok(init) => shared.listeners.dispatch(PeerEvent::CandidateDiscovered(
                            IceCandidate {
                                candidate: init.candidate,
                                sdp_mid: init.sdp_mid,
                                sdp_mline_index: init.sdp_mline_index,
                            },
                        )),
                        Err(e) => warn!("failed to serialize ICE candidate: {}", e),
                    }
                })
            }));

        let shared = self.shared.clone();
        self.pc
            .on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
                info!("ICE connection state: {}", state);
                if let Some(state) = ice_state(state) {
                    shared.listeners.dispatch(PeerEvent::IceStateChanged(state));
                }
                Box::pin(async {})
            }));

        let shared = self.shared.clone();
        self.pc.on_track(Box::new(move |track: Arc<TrackRemote>, _, _| {
            let shared = shared.clone();
            Box::pin(async move {
                let kind = match track.kind() {
                    RTPCodecType::Video => TrackKind::Video,
                    RTPCodecType::Audio => TrackKind::Audio,
                    _ => return,
                };
                let remote = RemoteTrack::new(track.id(), kind);
                let stream_id = track.stream_id();
                info!(stream_id = %stream_id, track_id = remote.id(), "received {} track", kind);

                let stream = {
                    let mut streams = shared.streams.lock();
                    let stream = streams
                        .entry(stream_id.clone())
                        .or_insert_with(|| RemoteStream::new(stream_id, Vec::new()));
                    stream.add_track(remote.clone());
                    stream.clone()
                };
                shared.listeners.dispatch(PeerEvent::TrackReceived(stream));

                tokio::spawn(drain_track(track, remote, shared));
            })
        }));
    }
}

async fn drain_track(track: Arc<TrackRemote>, remote: RemoteTrack, shared: Arc<Shared>) {
    while !remote.is_stopped() {
        match track.read_rtp().await {
            Ok((packet, _)) => {
                if remote.kind() == TrackKind::Video {
                    shared
                        .drained_video_bytes
                        .fetch_add(packet.payload.len() as u64, Ordering::Relaxed);
                }
            }
            Err(e) => {
                debug!(track_id = remote.id(), "track reader finished: {}", e);
                break;
            }
        }
    }
}

#[async_trait]
impl PeerConnection for WebRtcPeer {
    async fn set_remote_description(&self, description: &SessionDescription) -> MediaResult<()> {
        let description = to_rtc_description(description)?;
        self.pc
            .set_remote_description(description)
            .await
            .map_err(negotiation_error("setting the remote description"))
    }

    async fn create_answer(&self) -> MediaResult<SessionDescription> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(negotiation_error("creating the answer"))?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, description: &SessionDescription) -> MediaResult<()> {
        let description = to_rtc_description(description)?;
        self.pc
            .set_local_description(description)
            .await
            .map_err(negotiation_error("setting the local description"))
    }

    fn add_listener(&self, kind: PeerEventKind, handler: PeerEventHandler) -> ListenerId {
        self.shared.listeners.add(kind, handler)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.shared.listeners.remove(id)
    }

    fn ice_connection_state(&self) -> IceConnectionState {
        ice_state(self.pc.ice_connection_state()).unwrap_or(IceConnectionState::New)
    }

    fn signaling_state(&self) -> SignalingState {
        match self.pc.signaling_state() {
            RTCSignalingState::HaveLocalOffer => SignalingState::HaveLocalOffer,
            RTCSignalingState::HaveRemoteOffer => SignalingState::HaveRemoteOffer,
            RTCSignalingState::HaveLocalPranswer => SignalingState::HaveLocalPranswer,
            RTCSignalingState::HaveRemotePranswer => SignalingState::HaveRemotePranswer,
            RTCSignalingState::Closed => SignalingState::Closed,
            _ => SignalingState::Stable,
        }
    }

    async fn inbound_video_bytes(&self) -> MediaResult<Option<u64>> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(MediaError::Closed);
        }

        let report = self.pc.get_stats().await;
        let mut reported = None;
        for stats in report.reports.values() {
            if let StatsReportType::InboundRTP(inbound) = stats {
                if inbound.kind == "video" {
                    *reported.get_or_insert(0u64) += inbound.bytes_received;
                }
            }
        }

        // Fall back to our own counter when no inbound report exists yet.
        Ok(reported.or_else(|| {
            let drained = self.shared.drained_video_bytes.load(Ordering::Relaxed);
            let has_video = self.shared.streams.lock().values().any(RemoteStream::has_video);
            has_video.then_some(drained)
        }))
    }

    async fn close(&self) -> MediaResult<()> {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        for stream in self.shared.streams.lock().values() {
            stream.stop_all();
        }
        self.shared.listeners.clear();
        self.pc.close().await.map_err(peer_error("closing"))
    }
}
