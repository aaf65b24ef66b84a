//! Loopback-Demo: zwei Sessions im selben Prozess über echtes WebRTC
//!
//! `lupyd-call-loopback [--mic]`

use anyhow::{bail, Context, Result};
use lupyd_call::media::SystemMediaDevices;
use lupyd_call::{
    CallConfig, CallEvent, CallMessage, CallSession, ConnectionState, WebRtcConnector,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    lupyd_call::init_tracing();

    let with_mic = std::env::args().any(|arg| arg == "--mic");
    let config = CallConfig::load_or_default().context("loading call config")?;

    let (alice, alice_signals) = build_session(&config, "alice", "bob", with_mic, None);
    let (bob, bob_signals) =
        build_session(&config, "bob", "alice", with_mic, Some(alice.session_id()));

    tokio::spawn(forward(alice_signals, bob.clone()));
    tokio::spawn(forward(bob_signals, alice.clone()));

    let mut events = alice.subscribe();

    bob.init().await.context("initializing bob")?;
    alice.init().await.context("initializing alice")?;
    alice.request_call_with_ttl(config.request_ttl())?;
    alice.start_call().await.context("sending offer")?;

    let connected = tokio::time::timeout(CONNECT_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(CallEvent::ConnectionState(state)) => {
                    println!("alice: {}", state);
                    if state == ConnectionState::Connected {
                        return true;
                    }
                }
                Ok(CallEvent::RemoteStream(stream)) => {
                    println!("alice: remote stream with {} track(s)", stream.len());
                }
                Ok(CallEvent::LocalStream(stream)) => {
                    println!("alice: local stream with {} track(s)", stream.tracks().len());
                }
                Err(_) => return false,
            }
        }
    })
    .await
    .unwrap_or(false);

    alice.hang_up().await?;
    bob.dispose(true, false).await;

    if !connected {
        bail!("no connection within {:?}", CONNECT_TIMEOUT);
    }
    println!("loopback call connected and closed");
    Ok(())
}

fn build_session(
    config: &CallConfig,
    username: &str,
    remote_user: &str,
    with_mic: bool,
    session_id: Option<u32>,
) -> (CallSession, mpsc::UnboundedReceiver<CallMessage>) {
    let mut cameras = config.cameras.clone();
    if cameras.is_empty() {
        cameras.push(format!("{}-camera", username));
    }

    let mut session_config = config
        .session(username, remote_user)
        .with_media(with_mic, true);
    if let Some(id) = session_id {
        session_config = session_config.with_session_id(id);
    }

    let (signal_tx, signal_rx) = mpsc::unbounded_channel();
    let session = CallSession::new(
        session_config,
        Arc::new(WebRtcConnector::new(config.rtc_ice_servers())),
        Arc::new(SystemMediaDevices::new(cameras)),
        signal_tx,
    );
    (session, signal_rx)
}

/// Leitet die Nachrichten einer Session als JSON an die andere weiter
async fn forward(mut signals: mpsc::UnboundedReceiver<CallMessage>, to: CallSession) {
    while let Some(msg) = signals.recv().await {
        let bytes = match msg.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Failed to encode {}: {}", msg.payload.kind(), e);
                continue;
            }
        };
        if let Err(e) = to.on_call_message(&bytes).await {
            tracing::warn!("{} failed to handle message: {}", to.username(), e);
        }
    }
}
