//! Transport Module - Peer Connection Abstraktion
//!
//! Eine Call-Session spricht nie direkt mit `webrtc`, sondern mit den
//! Traits [`PeerConnector`] und [`PeerConnection`]. Die Produktiv-
//! Implementierung liegt in [`WebRtcConnector`].
//!
//! Ereignisse der Verbindung (State-Wechsel, ICE Candidates, Remote Tracks)
//! werden über einen mpsc-Kanal an die Session gemeldet.

mod rtc;

pub use rtc::{default_ice_servers, WebRtcConnector};

use crate::media::{MediaTrack, TrackKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use webrtc::track::track_remote::TrackRemote;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("WebRTC error: {0}")]
    WebRTC(String),

    #[error("Invalid SDP: {0}")]
    InvalidSdp(String),

    #[error("Peer connection is closed")]
    Closed,
}

// ============================================================================
// CONNECTION STATE
// ============================================================================

/// Zustand der darunterliegenden Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// Verbindung wird gerade aufgebaut oder steht
    pub fn is_live(self) -> bool {
        matches!(
            self,
            ConnectionState::New | ConnectionState::Connecting | ConnectionState::Connected
        )
    }

    /// Zustände, die einen Reconnect auslösen
    pub fn is_broken(self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::Failed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::New => write!(f, "new"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Failed => write!(f, "failed"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

// ============================================================================
// SDP / ICE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Session Description (Offer oder Answer)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// ICE Candidate im Browser-kompatiblen JSON-Format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_mline_index: Option<u16>,
    #[serde(rename = "usernameFragment", default)]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
            username_fragment: None,
        }
    }
}

// ============================================================================
// REMOTE TRACKS
// ============================================================================

/// Eingehender Track vom Peer
#[derive(Clone)]
pub struct RemoteTrack {
    id: String,
    kind: TrackKind,
    rtp: Option<Arc<TrackRemote>>,
}

impl RemoteTrack {
    pub fn new(id: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: id.into(),
            kind,
            rtp: None,
        }
    }

    pub(crate) fn from_rtp(track: Arc<TrackRemote>, kind: TrackKind) -> Self {
        Self {
            id: track.id(),
            kind,
            rtp: Some(track),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Zugriff auf den RTP-Track zum Lesen der Pakete
    pub fn rtp_track(&self) -> Option<&Arc<TrackRemote>> {
        self.rtp.as_ref()
    }
}

impl std::fmt::Debug for RemoteTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

// ============================================================================
// TRANSPORT EVENTS
// ============================================================================

/// Events, die eine Peer Connection an ihre Session meldet
#[derive(Debug, Clone)]
pub enum TransportEvent {
    StateChanged(ConnectionState),
    IceCandidate(IceCandidate),
    Track(RemoteTrack),
}

// ============================================================================
// TRAITS
// ============================================================================

/// Eine einzelne Peer Connection
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, TransportError>;

    async fn create_answer(&self) -> Result<SessionDescription, TransportError>;

    async fn set_local_description(&self, desc: SessionDescription)
        -> Result<(), TransportError>;

    async fn set_remote_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), TransportError>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError>;

    /// Hängt einen lokalen Track an die Verbindung
    async fn add_track(&self, track: &MediaTrack) -> Result<(), TransportError>;

    /// Ersetzt den ausgehenden Track dieser Art ohne Neuverhandlung
    ///
    /// Gibt `false` zurück, wenn es keinen Sender dieser Art gibt.
    async fn replace_track(&self, track: &MediaTrack) -> Result<bool, TransportError>;

    fn connection_state(&self) -> ConnectionState;

    async fn close(&self) -> Result<(), TransportError>;
}

/// Erzeugt Peer Connections
///
/// Jede Verbindung meldet ihre Events über den übergebenen Sender.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn connect(
        &self,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn PeerConnection>, TransportError>;
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_classes() {
        assert!(ConnectionState::New.is_live());
        assert!(ConnectionState::Connecting.is_live());
        assert!(ConnectionState::Connected.is_live());
        assert!(!ConnectionState::Failed.is_live());

        assert!(ConnectionState::Failed.is_broken());
        assert!(ConnectionState::Disconnected.is_broken());
        assert!(!ConnectionState::Closed.is_broken());
    }

    #[test]
    fn test_candidate_optional_fields_default() {
        let candidate: IceCandidate =
            serde_json::from_str(r#"{"candidate":"candidate:0 1 udp 1 1.2.3.4 5 typ host"}"#)
                .unwrap();
        assert_eq!(candidate.sdp_mid, None);
        assert_eq!(candidate.sdp_mline_index, None);
    }

    #[test]
    fn test_state_display_is_lowercase() {
        assert_eq!(ConnectionState::Disconnected.to_string(), "disconnected");
        assert_eq!(
            serde_json::to_string(&ConnectionState::Connected).unwrap(),
            "\"connected\""
        );
    }
}
