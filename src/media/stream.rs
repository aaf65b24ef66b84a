//! Lokale und entfernte Media Streams

use super::audio::AudioCapture;
use super::{MediaError, TrackKind, SAMPLE_RATE};
use crate::transport::RemoteTrack;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

/// Video Clock Rate für RTP
const VIDEO_CLOCK_RATE: u32 = 90000;

// ============================================================================
// MEDIA TRACK
// ============================================================================

/// Ein lokaler Audio- oder Video-Track
///
/// `enabled` schaltet den Track stumm ohne ihn freizugeben.
/// Nach `stop()` ist der Track endgültig beendet.
pub struct MediaTrack {
    id: String,
    kind: TrackKind,
    device_id: String,
    enabled: AtomicBool,
    stopped: AtomicBool,
    local: Arc<TrackLocalStaticSample>,
    capture: Mutex<Option<AudioCapture>>,
}

impl MediaTrack {
    /// Erstellt einen neuen Track für ein Gerät
    pub fn new(kind: TrackKind, device_id: impl Into<String>, stream_id: &str) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let codec = match kind {
            TrackKind::Audio => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_string(),
                clock_rate: SAMPLE_RATE,
                channels: 2,
                ..Default::default()
            },
            TrackKind::Video => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_string(),
                clock_rate: VIDEO_CLOCK_RATE,
                ..Default::default()
            },
        };

        let local = Arc::new(TrackLocalStaticSample::new(
            codec,
            id.clone(),
            stream_id.to_string(),
        ));

        Self {
            id,
            kind,
            device_id: device_id.into(),
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
            local,
            capture: Mutex::new(None),
        }
    }

    /// Hängt eine laufende Audio-Aufnahme an den Track
    pub fn with_capture(self, capture: AudioCapture) -> Self {
        capture.set_muted(!self.is_enabled());
        *self.capture.lock() = Some(capture);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Gerät, von dem der Track stammt
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Aktiviert oder deaktiviert den Track in-place
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        if let Some(capture) = self.capture.lock().as_ref() {
            capture.set_muted(!enabled);
        }
        tracing::debug!("Track {} ({}) enabled: {}", self.id, self.kind.as_str(), enabled);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Beendet den Track und gibt das Gerät frei
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(mut capture) = self.capture.lock().take() {
            capture.stop();
        }
        tracing::debug!("Track {} ({}) stopped", self.id, self.kind.as_str());
    }

    /// Der WebRTC-Track für die Peer Connection
    pub fn local_track(&self) -> Arc<dyn TrackLocal + Send + Sync> {
        Arc::clone(&self.local) as Arc<dyn TrackLocal + Send + Sync>
    }

    /// Liest einen 20ms PCM-Frame aus der Mikrofon-Aufnahme
    pub fn read_pcm_frame(&self) -> Option<Vec<f32>> {
        self.capture.lock().as_ref().and_then(|c| c.read_frame())
    }

    /// Aktueller Eingangspegel (0.0 - 1.0)
    pub fn input_level(&self) -> f32 {
        self.capture
            .lock()
            .as_ref()
            .map(|c| c.level())
            .unwrap_or(0.0)
    }

    /// Schreibt ein kodiertes Sample in den ausgehenden Track
    ///
    /// Deaktivierte Tracks verwerfen das Sample.
    pub async fn write_sample(&self, sample: &Sample) -> Result<(), MediaError> {
        if self.is_stopped() {
            return Err(MediaError::TrackEnded);
        }
        if !self.is_enabled() {
            return Ok(());
        }
        self.local
            .write_sample(sample)
            .await
            .map_err(|e| MediaError::WriteFailed(e.to_string()))
    }
}

impl std::fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("device_id", &self.device_id)
            .field("enabled", &self.is_enabled())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

// ============================================================================
// MEDIA STREAM
// ============================================================================

/// Sammlung lokaler Tracks
///
/// Die Track-Liste ist veränderbar, damit die Identität des Streams
/// beim Kamerawechsel erhalten bleibt.
#[derive(Debug)]
pub struct MediaStream {
    id: String,
    tracks: RwLock<Vec<Arc<MediaTrack>>>,
}

impl MediaStream {
    pub fn new() -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tracks: RwLock::new(Vec::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> Vec<Arc<MediaTrack>> {
        self.tracks.read().clone()
    }

    pub fn audio_tracks(&self) -> Vec<Arc<MediaTrack>> {
        self.tracks_of(TrackKind::Audio)
    }

    pub fn video_tracks(&self) -> Vec<Arc<MediaTrack>> {
        self.tracks_of(TrackKind::Video)
    }

    fn tracks_of(&self, kind: TrackKind) -> Vec<Arc<MediaTrack>> {
        self.tracks
            .read()
            .iter()
            .filter(|t| t.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn add_track(&self, track: Arc<MediaTrack>) {
        self.tracks.write().push(track);
    }

    /// Entfernt einen Track und gibt ihn zurück
    pub fn remove_track(&self, id: &str) -> Option<Arc<MediaTrack>> {
        let mut tracks = self.tracks.write();
        let pos = tracks.iter().position(|t| t.id() == id)?;
        Some(tracks.remove(pos))
    }

    /// Stoppt alle Tracks
    pub fn stop_all(&self) {
        for track in self.tracks.read().iter() {
            track.stop();
        }
    }
}

impl Default for MediaStream {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// REMOTE STREAM
// ============================================================================

/// Sammlung der vom Peer empfangenen Tracks
#[derive(Debug, Default)]
pub struct RemoteStream {
    tracks: RwLock<Vec<RemoteTrack>>,
}

impl RemoteStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_track(&self, track: RemoteTrack) {
        self.tracks.write().push(track);
    }

    pub fn tracks(&self) -> Vec<RemoteTrack> {
        self.tracks.read().clone()
    }

    pub fn len(&self) -> usize {
        self.tracks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.read().is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================
