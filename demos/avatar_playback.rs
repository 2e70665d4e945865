//! Avatar playback example
//!
//! Plays one headline through a running relay and logs player events until
//! the video stalls or the session ends.
//!
//! ```text
//! D_ID_API_KEY=... cargo run -p newsavatar-signaling --bin newsavatar-relay
//! cargo run --example avatar_playback -- "Markets rally on rate cut hopes" A
//! ```

use newsavatar::{
    init_logging, ArticleRef, Avatar, AvatarPlayer, MemorySink, PlaybackOutcome, PlayerConfig,
    PlayerEvent,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging("info,newsavatar=debug")?;

    let mut args = std::env::args().skip(1);
    let title = args
        .next()
        .unwrap_or_else(|| "Markets rally on rate cut hopes".to_string());
    let avatar = Avatar::from_selector(&args.next().unwrap_or_default());

    let config = PlayerConfig::from_env();
    info!("Using relay at {}", config.proxy_url);

    let sink = Arc::new(MemorySink::new());
    let player = AvatarPlayer::builder()
        .config(config)
        .sink(sink.clone())
        .build()?;
    let mut events = player.events();

    let article = ArticleRef::new(title, avatar);
    let mut awaiting = player.play(&article).await? == PlaybackOutcome::AwaitingConnection;

    let watch = async {
        while let Some(event) = events.next().await {
            info!("Player event: {:?}", event.event_type());
            match event {
                PlayerEvent::StateChanged { state, .. } if state.is_terminal() => break,
                PlayerEvent::StateChanged { state, .. }
                    if awaiting && state == newsavatar::ConnectionState::Connected =>
                {
                    awaiting = false;
                    if let Err(e) = player.speak().await {
                        warn!("Speech request failed: {}", e);
                        break;
                    }
                }
                PlayerEvent::VideoStatusChanged { playing: false, .. } => break,
                PlayerEvent::TornDown { .. } => break,
                _ => {}
            }
        }
    };

    if tokio::time::timeout(Duration::from_secs(60), watch).await.is_err() {
        warn!("No end of playback after 60s");
    }

    info!("Frames attached to sink {} time(s)", sink.attach_count());
    player.close().await;
    // Give the background destroy a moment before the runtime shuts down
    tokio::time::sleep(Duration::from_millis(500)).await;
    Ok(())
}
