//! Lupyd Call - WebRTC Anrufe zwischen zwei Benutzern
//!
//! Eine Bibliothek für 1:1 Audio/Video-Anrufe mit:
//! - Einem Session-Zustandsautomaten mit automatischem Reconnect
//! - WebRTC als Transport
//! - Einem austauschbaren Signaling-Kanal (JSON-Nachrichten)
//! - cpal für die Mikrofonaufnahme

pub mod call;
pub mod config;
pub mod media;
pub mod signaling;
pub mod transport;

pub use call::{CallError, CallEvent, CallSession};
pub use config::{CallConfig, ConfigError, SessionConfig};
pub use media::{MediaConstraints, MediaDevices, MediaError, MediaStream, MediaTrack};
pub use signaling::{CallMessage, CallPayload};
pub use transport::{ConnectionState, PeerConnector, TransportError, WebRtcConnector};

use tracing_subscriber::EnvFilter;

/// Standard-Filter wenn `RUST_LOG` nicht gesetzt ist
pub const DEFAULT_LOG_FILTER: &str = "lupyd_call=debug,webrtc=warn";

/// Initialisiert das Logging
///
/// `RUST_LOG` hat Vorrang vor [`DEFAULT_LOG_FILTER`]. Ein zweiter Aufruf
/// ist wirkungslos.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
