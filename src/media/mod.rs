//! Media Module - Lokale Tracks und Geräte
//!
//! Dieses Modul verwaltet:
//! - Lokale Media Tracks (Mikrofon, Kamera) und Streams
//! - Geräte-Aufzählung und Capture
//! - Audio Capture über cpal

mod audio;
mod devices;
mod stream;

pub use audio::{resample_linear, AudioCapture, CHANNELS, FRAME_SIZE, SAMPLE_RATE};
pub use devices::SystemMediaDevices;
pub use stream::{MediaStream, MediaTrack, RemoteStream};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("No audio input device found")]
    NoInputDevice,

    #[error("No video input device found")]
    NoVideoDevice,

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Permission denied for {0}")]
    PermissionDenied(String),

    #[error("Unsupported audio configuration: {0}")]
    UnsupportedConfig(String),

    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    #[error("Failed to start audio stream: {0}")]
    StreamPlayError(String),

    #[error("Track has ended")]
    TrackEnded,

    #[error("Failed to write sample: {0}")]
    WriteFailed(String),
}

// ============================================================================
// DEVICE TYPES
// ============================================================================

/// Art eines Tracks oder Geräts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TrackKind::Audio => "audio",
            TrackKind::Video => "video",
        }
    }
}

/// Beschreibung eines Eingabegeräts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDeviceInfo {
    pub device_id: String,
    pub label: String,
    pub kind: TrackKind,
}

/// Was beim Öffnen der Geräte angefordert wird
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
    /// Bestimmte Kamera statt der Standard-Kamera
    pub video_device: Option<String>,
}

impl MediaConstraints {
    pub fn new(audio: bool, video: bool) -> Self {
        Self {
            audio,
            video,
            video_device: None,
        }
    }

    /// Nur Video von einer bestimmten Kamera
    pub fn camera(device_id: impl Into<String>) -> Self {
        Self {
            audio: false,
            video: true,
            video_device: Some(device_id.into()),
        }
    }
}

// ============================================================================
// MEDIA DEVICES
// ============================================================================

/// Zugriff auf die Aufnahmegeräte
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Listet alle verfügbaren Eingabegeräte
    async fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>, MediaError>;

    /// Öffnet die angeforderten Geräte und liefert einen Stream
    async fn get_user_media(&self, constraints: MediaConstraints)
        -> Result<MediaStream, MediaError>;

    /// Nur die Kameras
    async fn enumerate_video_inputs(&self) -> Result<Vec<MediaDeviceInfo>, MediaError> {
        Ok(self
            .enumerate_devices()
            .await?
            .into_iter()
            .filter(|d| d.kind == TrackKind::Video)
            .collect())
    }
}
