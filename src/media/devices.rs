//! System-Geräte: Mikrofone über cpal, Kameras aus der Konfiguration

use super::audio::AudioCapture;
use super::stream::{MediaStream, MediaTrack};
use super::{MediaConstraints, MediaDeviceInfo, MediaDevices, MediaError, TrackKind};
use async_trait::async_trait;
use std::sync::Arc;

/// Standard-Implementierung von [`MediaDevices`]
///
/// Kameras werden nicht selbst aufgenommen: die Anwendung schreibt kodierte
/// Frames über [`MediaTrack::write_sample`] in den Video-Track.
#[derive(Debug, Clone, Default)]
pub struct SystemMediaDevices {
    cameras: Vec<String>,
}

impl SystemMediaDevices {
    pub fn new(cameras: Vec<String>) -> Self {
        Self { cameras }
    }

    fn pick_camera(&self, wanted: Option<&str>) -> Result<String, MediaError> {
        match wanted {
            Some(id) if self.cameras.iter().any(|c| c == id) => Ok(id.to_string()),
            Some(id) => Err(MediaError::DeviceNotFound(id.to_string())),
            None => self.cameras.first().cloned().ok_or(MediaError::NoVideoDevice),
        }
    }
}

#[async_trait]
impl MediaDevices for SystemMediaDevices {
    async fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>, MediaError> {
        let mut devices: Vec<MediaDeviceInfo> = tokio::task::spawn_blocking(|| {
            AudioCapture::input_device_names()
                .into_iter()
                .map(|name| MediaDeviceInfo {
                    device_id: name.clone(),
                    label: name,
                    kind: TrackKind::Audio,
                })
                .collect()
        })
        .await
        .unwrap_or_default();

        devices.extend(self.cameras.iter().map(|id| MediaDeviceInfo {
            device_id: id.clone(),
            label: id.clone(),
            kind: TrackKind::Video,
        }));

        Ok(devices)
    }

    async fn get_user_media(
        &self,
        constraints: MediaConstraints,
    ) -> Result<MediaStream, MediaError> {
        // Kamera zuerst prüfen, damit bei Fehlern kein Mikrofon offen bleibt
        let camera = if constraints.video {
            Some(self.pick_camera(constraints.video_device.as_deref())?)
        } else {
            None
        };

        let stream = MediaStream::new();

        if constraints.audio {
            let capture = tokio::task::spawn_blocking(|| AudioCapture::start(None))
                .await
                .map_err(|e| MediaError::StreamBuildError(e.to_string()))??;
            let device_id = capture.device_name().to_string();
            let track = MediaTrack::new(TrackKind::Audio, device_id, stream.id())
                .with_capture(capture);
            stream.add_track(Arc::new(track));
        }

        if let Some(camera) = camera {
            stream.add_track(Arc::new(MediaTrack::new(
                TrackKind::Video,
                camera,
                stream.id(),
            )));
        }

        tracing::info!(
            "Acquired local media: {} audio, {} video track(s)",
            stream.audio_tracks().len(),
            stream.video_tracks().len()
        );

        Ok(stream)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn devices() -> SystemMediaDevices {
        SystemMediaDevices::new(vec!["front".to_string(), "back".to_string()])
    }

    #[tokio::test]
    async fn test_video_only_uses_first_camera() {
        let stream = devices()
            .get_user_media(MediaConstraints::new(false, true))
            .await
            .unwrap();

        assert!(stream.audio_tracks().is_empty());
        let video = stream.video_tracks();
        assert_eq!(video.len(), 1);
        assert_eq!(video[0].device_id(), "front");
    }

    #[tokio::test]
    async fn test_specific_camera() {
        let stream = devices()
            .get_user_media(MediaConstraints::camera("back"))
            .await
            .unwrap();
        assert_eq!(stream.video_tracks()[0].device_id(), "back");
    }

    #[tokio::test]
    async fn test_unknown_camera_is_rejected() {
        let result = devices()
            .get_user_media(MediaConstraints::camera("side"))
            .await;
        assert!(matches!(result, Err(MediaError::DeviceNotFound(_))));
    }

    #[tokio::test]
    async fn test_no_cameras_configured() {
        let result = SystemMediaDevices::default()
            .get_user_media(MediaConstraints::new(false, true))
            .await;
        assert!(matches!(result, Err(MediaError::NoVideoDevice)));
    }

    #[tokio::test]
    async fn test_cameras_are_enumerated_in_order() {
        let cameras = devices().enumerate_video_inputs().await.unwrap();
        let ids: Vec<_> = cameras.iter().map(|c| c.device_id.as_str()).collect();
        assert_eq!(ids, vec!["front", "back"]);
    }
}
