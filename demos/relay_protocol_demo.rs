//! Relay Protocol Demo
//!
//! Prints the JSON bodies the player sends to the relay for each operation,
//! and the provider route each one is forwarded to. No network access.

use newsavatar::{Avatar, IceCandidate, SessionDescription};
use newsavatar_signaling::protocol::{
    CreateStreamRequest, DestroyBody, IceBody, RelayEnvelope, SdpBody, TalkBody,
};
use newsavatar_signaling::RelayOperation;
use serde::Serialize;
use tracing::info;

const STREAM_ID: &str = "strm_demo";
const SESSION_ID: &str = "sess_demo";

fn show<B: Serialize>(op: RelayOperation, body: &B) -> Result<(), serde_json::Error> {
    let method = format!("{:?}", op.provider_method()).to_uppercase();
    info!(
        "{} POST {} -> {} {}",
        op.name(),
        op.relay_path(),
        method,
        op.provider_path(op.needs_stream_id().then_some(STREAM_ID))
    );
    println!("{}\n", serde_json::to_string_pretty(body)?);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_target(false).init();

    let profile = Avatar::from_selector("A").profile();
    info!("Presenter {} speaks with {}", profile.avatar, profile.voice.voice_id);

    show(
        RelayOperation::CreateStream,
        &CreateStreamRequest {
            source_url: profile.source_url.to_string(),
        },
    )?;

    show(
        RelayOperation::SubmitAnswer,
        &RelayEnvelope::new(
            STREAM_ID,
            SdpBody {
                answer: SessionDescription::answer("v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\n"),
                session_id: SESSION_ID.to_string(),
            },
        ),
    )?;

    show(
        RelayOperation::SubmitIce,
        &RelayEnvelope::new(
            STREAM_ID,
            IceBody {
                candidate: IceCandidate {
                    candidate: "candidate:1 1 udp 2122260223 192.168.1.20 54400 typ host"
                        .to_string(),
                    sdp_mid: Some("0".to_string()),
                    sdp_mline_index: Some(0),
                },
                session_id: SESSION_ID.to_string(),
            },
        ),
    )?;

    show(
        RelayOperation::StartTalk,
        &RelayEnvelope::new(
            STREAM_ID,
            TalkBody::new("Markets rally on rate cut hopes", &profile.voice, SESSION_ID),
        ),
    )?;

    show(
        RelayOperation::DestroyStream,
        &RelayEnvelope::new(
            STREAM_ID,
            DestroyBody {
                session_id: SESSION_ID.to_string(),
            },
        ),
    )?;

    Ok(())
}
