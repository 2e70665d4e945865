//! Avatar player
//!
//! [`AvatarPlayer`] owns at most one avatar session at a time. `play` creates
//! the provider stream, negotiates the peer connection and starts speech;
//! native peer events and health edges are handled by a per-session event
//! task; `close` and every fatal path run the same teardown.
//!
//! Lifecycle mutations are serialized by an async lock. Teardown first marks
//! the session dead so an in-flight `play` stops at its next suspension point
//! with [`NewsAvatarError::SessionClosed`], then waits for the lock.

use crate::config::PlayerConfig;
use crate::event::{EventBus, EventStream, PlayerEvent, TeardownReason};
use crate::session::{Liveness, SessionContext, SessionKey};
use newsavatar_core::{
    ArticleClient, ArticleRef, AvatarProfile, IceCandidate, NewsAvatarError, Result, VoiceConfig,
};
use newsavatar_media::{
    ConnectionState, HealthEdge, HealthMonitor, NullSink, PeerConnection, PeerConnectionFactory,
    PeerEvent, PeerEventKind, SignalingState, VideoSink,
};
use newsavatar_signaling::{HttpRelayClient, RelayClient};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Result of a successful [`AvatarPlayer::play`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// The provider accepted the start-speech request
    Speaking,
    /// Signaling is done but the connection is not ready for speech yet;
    /// call [`AvatarPlayer::speak`] once it is
    AwaitingConnection,
}

/// Fluent builder for an [`AvatarPlayer`]
pub struct PlayerBuilder {
    config: PlayerConfig,
    relay: Option<Arc<dyn RelayClient>>,
    factory: Option<Arc<dyn PeerConnectionFactory>>,
    sink: Option<Arc<dyn VideoSink>>,
}

impl Default for PlayerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerBuilder {
    /// Builder with default configuration
    pub fn new() -> Self {
        Self {
            config: PlayerConfig::default(),
            relay: None,
            factory: None,
            sink: None,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: PlayerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the relay base URL
    pub fn proxy_url(mut self, url: &str) -> Self {
        self.config.proxy_url = url.to_string();
        self
    }

    /// Use a custom relay client instead of HTTP
    pub fn relay(mut self, relay: Arc<dyn RelayClient>) -> Self {
        self.relay = Some(relay);
        self
    }

    /// Use a custom peer connection backend
    pub fn peer_factory(mut self, factory: Arc<dyn PeerConnectionFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Render the remote stream into `sink`
    pub fn sink(mut self, sink: Arc<dyn VideoSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Validate the configuration and create the player
    pub fn build(self) -> Result<AvatarPlayer> {
        self.config.validate()?;

        let relay = match self.relay {
            Some(relay) => relay,
            None => Arc::new(HttpRelayClient::with_policy(
                &self.config.proxy_url,
                self.config.retry.clone(),
            )),
        };
        let factory = match self.factory {
            Some(factory) => factory,
            None => default_factory()?,
        };
        let sink = self.sink.unwrap_or_else(|| Arc::new(NullSink));
        let articles = ArticleClient::new(&self.config.api_url);

        Ok(AvatarPlayer {
            inner: Arc::new(PlayerInner {
                config: self.config,
                relay,
                factory,
                sink,
                articles,
                lifecycle: tokio::sync::Mutex::new(()),
                session: Mutex::new(None),
                state: Mutex::new(ConnectionState::Unconnected),
                events: EventBus::default(),
                generation: AtomicU64::new(0),
            }),
        })
    }
}

impl std::fmt::Debug for PlayerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerBuilder")
            .field("config", &self.config)
            .field("custom_relay", &self.relay.is_some())
            .field("custom_factory", &self.factory.is_some())
            .field("custom_sink", &self.sink.is_some())
            .finish()
    }
}

#[cfg(feature = "webrtc-backend")]
fn default_factory() -> Result<Arc<dyn PeerConnectionFactory>> {
    Ok(Arc::new(newsavatar_media::WebRtcPeerFactory::new()))
}

#[cfg(not(feature = "webrtc-backend"))]
fn default_factory() -> Result<Arc<dyn PeerConnectionFactory>> {
    Err(NewsAvatarError::MissingConfiguration {
        field: "peer_factory".to_string(),
    })
}

/// Plays news articles through a talking avatar
///
/// Cloning is cheap; clones drive the same session.
#[derive(Clone)]
pub struct AvatarPlayer {
    inner: Arc<PlayerInner>,
}

impl AvatarPlayer {
    /// Start building a player
    pub fn builder() -> PlayerBuilder {
        PlayerBuilder::new()
    }

    /// Player with `config` and the default backends
    pub fn new(config: PlayerConfig) -> Result<Self> {
        PlayerBuilder::new().config(config).build()
    }

    /// Configuration in use
    pub fn config(&self) -> &PlayerConfig {
        &self.inner.config
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    /// Provider identifiers of the live session
    pub fn session_key(&self) -> Option<SessionKey> {
        self.inner
            .session
            .lock()
            .as_ref()
            .and_then(|s| s.key.clone())
    }

    /// Whether inbound video is currently flowing
    pub fn is_playing(&self) -> bool {
        self.inner.session.lock().as_ref().map_or(false, |s| s.playing)
    }

    /// Subscribe to player events
    pub fn events(&self) -> EventStream {
        self.inner.events.subscribe()
    }

    /// Play `article`, replacing any existing session
    ///
    /// On failure the session is torn down and a
    /// [`PlayerEvent::PlaybackFailed`] is emitted before the error returns.
    pub async fn play(&self, article: &ArticleRef) -> Result<PlaybackOutcome> {
        let inner = &self.inner;
        inner.mark_dead(None);
        let _lifecycle = inner.lifecycle.lock().await;
        inner.teardown_locked(None, TeardownReason::Replaced).await;

        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let profile = article.avatar.profile();
        let session = SessionContext::new(generation, article.title.clone(), profile.clone());
        let liveness = session.liveness.clone();
        *inner.session.lock() = Some(session);

        info!(generation, avatar = %profile.avatar, "starting avatar playback");
        let result = inner.start(generation, &liveness, &article.title, &profile).await;
        inner.settle(generation, result).await
    }

    /// Fetch article `article_id` with `token` and play it
    pub async fn play_article(
        &self,
        article_id: &str,
        token: Option<&str>,
    ) -> Result<PlaybackOutcome> {
        match self.inner.articles.fetch(article_id, token).await {
            Ok(article) => self.play(&article).await,
            Err(e) => {
                self.inner.report_failure(&e);
                Err(e)
            }
        }
    }

    /// Ask the provider to speak the current article
    ///
    /// Used after [`PlaybackOutcome::AwaitingConnection`].
    pub async fn speak(&self) -> Result<()> {
        let inner = &self.inner;
        let _lifecycle = inner.lifecycle.lock().await;

        let (generation, key, liveness, title, voice) = {
            let guard = inner.session.lock();
            let session = guard.as_ref().and_then(|s| s.key.as_ref().map(|k| (s, k)));
            match session {
                Some((s, key)) => (
                    s.generation,
                    key.clone(),
                    s.liveness.clone(),
                    s.title.clone(),
                    s.profile.voice.clone(),
                ),
                None => {
                    return Err(NewsAvatarError::InvalidState {
                        expected: "an active session".to_string(),
                        actual: inner.state.lock().to_string(),
                    })
                }
            }
        };

        let result = inner.talk(&key, &liveness, &title, &voice).await;
        inner.settle(generation, result).await
    }

    /// Tear down the session and leave the player closed
    ///
    /// Safe to call any number of times.
    pub async fn close(&self) {
        let inner = &self.inner;
        inner.mark_dead(None);
        let _lifecycle = inner.lifecycle.lock().await;
        if !inner.teardown_locked(None, TeardownReason::Requested).await {
            inner.set_state(None, ConnectionState::Closed);
        }
    }
}

impl std::fmt::Debug for AvatarPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvatarPlayer")
            .field("state", &self.state())
            .field("session", &*self.inner.session.lock())
            .finish()
    }
}

enum SessionSignal {
    Peer(PeerEvent),
    Health(HealthEdge),
}

struct PlayerInner {
    config: PlayerConfig,
    relay: Arc<dyn RelayClient>,
    factory: Arc<dyn PeerConnectionFactory>,
    sink: Arc<dyn VideoSink>,
    articles: ArticleClient,
    lifecycle: tokio::sync::Mutex<()>,
    session: Mutex<Option<SessionContext>>,
    state: Mutex<ConnectionState>,
    events: EventBus,
    generation: AtomicU64,
}

impl PlayerInner {
    /// Create the stream, negotiate, submit the answer and start speech
    async fn start(
        self: &Arc<Self>,
        generation: u64,
        liveness: &Liveness,
        title: &str,
        profile: &AvatarProfile,
    ) -> Result<PlaybackOutcome> {
        let created = self.relay.create_stream(profile.source_url).await?;
        let key = created.key();
        let stream_id = key.stream_id.clone();
        self.with_session(generation, |s| s.key = Some(key.clone()))?;
        ensure_live(liveness, &stream_id, "create-session")?;
        info!(stream_id = %key.stream_id, session_id = %key.session_id, "stream created");

        self.with_session(generation, |s| s.state = ConnectionState::Negotiating)?;
        self.set_state(Some(stream_id.clone()), ConnectionState::Negotiating);

        let peer = self.factory.create(&created.ice_servers).await?;
        self.attach_peer(generation, liveness, peer.clone())?;
        ensure_live(liveness, &stream_id, "create-peer-connection")?;

        peer.set_remote_description(&created.offer)
            .await
            .map_err(|e| negotiation("setting the remote description", e))?;
        let answer = peer
            .create_answer()
            .await
            .map_err(|e| negotiation("creating the answer", e))?;
        peer.set_local_description(&answer)
            .await
            .map_err(|e| negotiation("setting the local description", e))?;
        ensure_live(liveness, &stream_id, "negotiate")?;
        debug!(stream_id = %stream_id, "local description set");

        let queued = self.with_session(generation, |s| s.gate.open())?;
        for candidate in queued {
            self.submit_candidate(key.clone(), liveness.clone(), candidate);
        }

        self.relay.submit_answer(&key, &answer).await?;
        ensure_live(liveness, &stream_id, "submit-answer")?;

        let signaling = peer.signaling_state();
        let ice = peer.ice_connection_state();
        if signaling == SignalingState::Stable || ice.is_connected() {
            self.talk(&key, liveness, title, &profile.voice).await?;
            Ok(PlaybackOutcome::Speaking)
        } else {
            info!(stream_id = %stream_id, ice = %ice, "connection not ready, speech deferred");
            Ok(PlaybackOutcome::AwaitingConnection)
        }
    }

    async fn talk(
        &self,
        key: &SessionKey,
        liveness: &Liveness,
        title: &str,
        voice: &VoiceConfig,
    ) -> Result<()> {
        self.relay.start_talk(key, title, voice).await?;
        ensure_live(liveness, &key.stream_id, "start-speech")?;
        info!(stream_id = %key.stream_id, voice = %voice.voice_id, "speech started");
        self.events.emit(PlayerEvent::SpeechStarted {
            stream_id: key.stream_id.clone(),
        });
        Ok(())
    }

    /// Report and tear down after a failed lifecycle step; lifecycle lock held
    async fn settle<T>(&self, generation: u64, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => Ok(value),
            Err(e @ NewsAvatarError::SessionClosed { .. }) => {
                debug!("{}", e);
                Err(e)
            }
            Err(e) => {
                self.report_failure(&e);
                self.teardown_locked(Some(generation), TeardownReason::Error)
                    .await;
                Err(e)
            }
        }
    }

    fn report_failure(&self, err: &NewsAvatarError) {
        error!(code = %err.error_code(), "avatar playback failed: {}", err);
        self.events.emit(PlayerEvent::PlaybackFailed {
            error_code: err.error_code(),
            message: err.to_string(),
            requires_login: err.requires_login(),
        });
    }

    /// Store the peer and register its three listeners
    fn attach_peer(
        self: &Arc<Self>,
        generation: u64,
        liveness: &Liveness,
        peer: Arc<dyn PeerConnection>,
    ) -> Result<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.with_session(generation, |s| {
            for kind in [
                PeerEventKind::Candidate,
                PeerEventKind::IceState,
                PeerEventKind::Track,
            ] {
                let tx = tx.clone();
                let id = peer.add_listener(
                    kind,
                    Arc::new(move |event| {
                        let _ = tx.send(event);
                    }),
                );
                s.listeners.push(id);
            }
            s.peer = Some(peer.clone());
        })?;
        drop(tx);

        self.spawn_event_task(generation, liveness.clone(), rx);
        Ok(())
    }

    /// Handle peer events and health edges of one session
    ///
    /// Ends when the session dies, when its listeners are removed, or when
    /// the player is dropped.
    fn spawn_event_task(
        self: &Arc<Self>,
        generation: u64,
        liveness: Liveness,
        mut peer_events: mpsc::UnboundedReceiver<PeerEvent>,
    ) {
        let player: Weak<PlayerInner> = Arc::downgrade(self);
        let (health_tx, mut health_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                let signal = tokio::select! {
                    event = peer_events.recv() => match event {
                        Some(event) => SessionSignal::Peer(event),
                        None => break,
                    },
                    Some(edge) = health_rx.recv() => SessionSignal::Health(edge),
                };
                if !liveness.is_alive() {
                    break;
                }
                let Some(inner) = player.upgrade() else {
                    break;
                };
                inner.handle_signal(generation, &liveness, signal, &health_tx).await;
            }
            debug!(generation, "session event task stopped");
        });
    }

    async fn handle_signal(
        self: &Arc<Self>,
        generation: u64,
        liveness: &Liveness,
        signal: SessionSignal,
        health_tx: &mpsc::UnboundedSender<HealthEdge>,
    ) {
        match signal {
            SessionSignal::Peer(PeerEvent::CandidateDiscovered(candidate)) => {
                let admitted = self
                    .with_session(generation, |s| {
                        s.key.clone().zip(s.gate.admit(candidate))
                    })
                    .ok()
                    .flatten();
                if let Some((key, candidate)) = admitted {
                    self.submit_candidate(key, liveness.clone(), candidate);
                }
            }
            SessionSignal::Peer(PeerEvent::IceStateChanged(ice)) => {
                let monitor = HealthMonitor::new(
                    self.config.health_poll_interval(),
                    self.config.stall_samples,
                );
                let transition = self.with_session(generation, |s| {
                    let next = s.state.after_ice(ice);
                    s.state = next;
                    if next == ConnectionState::Connected && s.health.is_none() {
                        if let Some(peer) = s.peer.clone() {
                            s.health = Some(monitor.spawn(peer, health_tx.clone()));
                        }
                    }
                    (s.stream_id(), next)
                });
                let Ok((stream_id, next)) = transition else {
                    return;
                };

                debug!(ice = %ice, state = %next, "ice connection state changed");
                self.set_state(stream_id, next);
                match next {
                    ConnectionState::Failed => {
                        warn!("ice connection failed, tearing down");
                        self.teardown(generation, TeardownReason::IceFailed).await;
                    }
                    ConnectionState::Closed => {
                        self.teardown(generation, TeardownReason::IceClosed).await;
                    }
                    _ => {}
                }
            }
            SessionSignal::Peer(PeerEvent::TrackReceived(stream)) => {
                debug!(stream = %stream.id(), "remote track received");
                let _ = self.with_session(generation, |s| s.stream = Some(stream));
            }
            SessionSignal::Health(edge) => {
                let update = self.with_session(generation, |s| {
                    s.playing = edge.playing;
                    let stream = if edge.playing { s.stream.clone() } else { None };
                    (s.stream_id().unwrap_or_default(), stream)
                });
                let Ok((stream_id, stream)) = update else {
                    return;
                };

                // A stall keeps the last stream attached; only teardown detaches
                if let Some(stream) = &stream {
                    if let Err(e) = self.sink.attach(stream) {
                        warn!(stream_id = %stream_id, "failed to attach video sink: {}", e);
                    }
                }
                info!(
                    stream_id = %stream_id,
                    playing = edge.playing,
                    bytes_received = edge.sample.bytes_received,
                    "video status changed"
                );
                self.events.emit(PlayerEvent::VideoStatusChanged {
                    stream_id,
                    playing: edge.playing,
                    stream,
                });
            }
        }
    }

    /// Forward one candidate; the result is dropped if the session died
    fn submit_candidate(self: &Arc<Self>, key: SessionKey, liveness: Liveness, candidate: IceCandidate) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let result = inner.relay.submit_ice(&key, &candidate).await;
            if !liveness.is_alive() {
                debug!(stream_id = %key.stream_id, "discarding candidate result of a closed session");
                return;
            }
            match result {
                Ok(_) => inner.events.emit(PlayerEvent::CandidateSent {
                    stream_id: key.stream_id.clone(),
                    candidate,
                }),
                Err(e) => warn!(stream_id = %key.stream_id, "failed to submit ice candidate: {}", e),
            }
        });
    }

    /// Run `f` on the session of `generation`
    fn with_session<T>(
        &self,
        generation: u64,
        f: impl FnOnce(&mut SessionContext) -> T,
    ) -> Result<T> {
        let mut guard = self.session.lock();
        match guard.as_mut() {
            Some(session) if session.generation == generation => Ok(f(session)),
            other => Err(NewsAvatarError::SessionClosed {
                stream_id: other.and_then(|s| s.stream_id()).unwrap_or_default(),
                operation: "update-session".to_string(),
            }),
        }
    }

    /// Mark the current session dead, or only session `generation`
    fn mark_dead(&self, generation: Option<u64>) {
        if let Some(session) = self.session.lock().as_ref() {
            if generation.map_or(true, |g| g == session.generation) {
                session.liveness.kill();
            }
        }
    }

    async fn teardown(&self, generation: u64, reason: TeardownReason) {
        self.mark_dead(Some(generation));
        let _lifecycle = self.lifecycle.lock().await;
        self.teardown_locked(Some(generation), reason).await;
    }

    /// Release everything the session holds; lifecycle lock must be held
    ///
    /// Returns `false` when there was nothing to tear down.
    async fn teardown_locked(&self, generation: Option<u64>, reason: TeardownReason) -> bool {
        let session = {
            let mut guard = self.session.lock();
            let matches = guard
                .as_ref()
                .map_or(false, |s| generation.map_or(true, |g| g == s.generation));
            if matches {
                guard.take()
            } else {
                None
            }
        };
        let Some(mut session) = session else {
            return false;
        };

        session.liveness.kill();
        let stream_id = session.stream_id();
        info!(stream_id = ?stream_id, reason = %reason, "tearing down avatar session");

        if let Some(mut health) = session.health.take() {
            health.cancel();
        }
        if let Some(stream) = session.stream.take() {
            stream.stop_all();
        }
        self.sink.detach();

        if let Some(peer) = session.peer.take() {
            for id in session.listeners.drain(..) {
                peer.remove_listener(id);
            }
            if let Err(e) = peer.close().await {
                warn!("failed to close peer connection: {}", e);
            }
        }

        let final_state = match reason {
            TeardownReason::IceFailed | TeardownReason::Error => ConnectionState::Failed,
            _ => ConnectionState::Closed,
        };
        self.set_state(stream_id.clone(), final_state);
        self.events.emit(PlayerEvent::TornDown { stream_id, reason });

        // Best effort; the lifecycle lock is not held while the relay retries
        if let Some(key) = session.key.take() {
            let relay = Arc::clone(&self.relay);
            tokio::spawn(async move {
                match relay.destroy_stream(&key).await {
                    Ok(_) => debug!(stream_id = %key.stream_id, "provider stream destroyed"),
                    Err(e) => {
                        warn!(stream_id = %key.stream_id, "failed to destroy provider stream: {}", e)
                    }
                }
            });
        }
        true
    }

    fn set_state(&self, stream_id: Option<String>, state: ConnectionState) {
        {
            let mut current = self.state.lock();
            if *current == state {
                return;
            }
            *current = state;
        }
        self.events.emit(PlayerEvent::StateChanged { stream_id, state });
    }
}

fn ensure_live(liveness: &Liveness, stream_id: &str, operation: &str) -> Result<()> {
    if liveness.is_alive() {
        Ok(())
    } else {
        Err(NewsAvatarError::SessionClosed {
            stream_id: stream_id.to_string(),
            operation: operation.to_string(),
        })
    }
}

fn negotiation(stage: &str, err: newsavatar_media::MediaError) -> NewsAvatarError {
    NewsAvatarError::Negotiation {
        stage: stage.to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_rejects_invalid_config() {
        let err = PlayerBuilder::new()
            .config(PlayerConfig {
                stall_samples: 0,
                ..PlayerConfig::default()
            })
            .build()
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIGURATION");
    }

    #[test]
    fn test_ensure_live() {
        let session = SessionContext::new(
            1,
            "headline".to_string(),
            newsavatar_core::Avatar::Sofia.profile(),
        );
        assert!(ensure_live(&session.liveness, "strm", "submit-answer").is_ok());
        session.liveness.kill();
        let err = ensure_live(&session.liveness, "strm", "submit-answer").unwrap_err();
        assert_eq!(err.error_code(), "SESSION_CLOSED");
    }

    #[tokio::test]
    async fn test_close_without_session() {
        let player = PlayerBuilder::new()
            .peer_factory(Arc::new(NoPeers))
            .build()
            .unwrap();
        let mut events = player.events();

        player.close().await;
        player.close().await;

        assert_eq!(player.state(), ConnectionState::Closed);
        assert_eq!(events.drain().len(), 1);
    }

    struct NoPeers;

    #[async_trait::async_trait]
    impl PeerConnectionFactory for NoPeers {
        async fn create(
            &self,
            _: &[newsavatar_core::IceServer],
        ) -> newsavatar_media::MediaResult<Arc<dyn PeerConnection>> {
            Err(newsavatar_media::MediaError::Closed)
        }
    }
}
