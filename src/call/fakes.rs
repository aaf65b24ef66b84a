//! In-Memory Transport und Geräte für Tests

use crate::media::{
    MediaConstraints, MediaDeviceInfo, MediaDevices, MediaError, MediaStream, MediaTrack,
    TrackKind,
};
use crate::transport::{
    ConnectionState, IceCandidate, PeerConnection, PeerConnector, SdpKind, SessionDescription,
    TransportError, TransportEvent,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

// ============================================================================
// TRANSPORT
// ============================================================================

#[derive(Default)]
pub struct FakeConnector {
    connections: Mutex<Vec<Arc<FakePeerConnection>>>,
}

impl FakeConnector {
    pub fn connections(&self) -> Vec<Arc<FakePeerConnection>> {
        self.connections.lock().clone()
    }

    pub fn last(&self) -> Arc<FakePeerConnection> {
        self.connections
            .lock()
            .last()
            .cloned()
            .expect("no connection created")
    }
}

#[async_trait]
impl PeerConnector for FakeConnector {
    async fn connect(
        &self,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn PeerConnection>, TransportError> {
        let mut connections = self.connections.lock();
        let pc = Arc::new(FakePeerConnection::new(connections.len(), events));
        connections.push(Arc::clone(&pc));
        Ok(pc)
    }
}

pub struct FakePeerConnection {
    index: usize,
    events: mpsc::UnboundedSender<TransportEvent>,
    state: Mutex<ConnectionState>,
    local: Mutex<Option<SessionDescription>>,
    remote: Mutex<Option<SessionDescription>>,
    candidates: Mutex<Vec<IceCandidate>>,
    senders: Mutex<Vec<(TrackKind, String)>>,
    replaced: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl FakePeerConnection {
    fn new(index: usize, events: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self {
            index,
            events,
            state: Mutex::new(ConnectionState::New),
            local: Mutex::new(None),
            remote: Mutex::new(None),
            candidates: Mutex::new(Vec::new()),
            senders: Mutex::new(Vec::new()),
            replaced: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Simuliert einen Zustandswechsel des Transports
    pub fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
        let _ = self.events.send(TransportEvent::StateChanged(state));
    }

    /// Simuliert ein beliebiges Transport-Event
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    pub fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.remote.lock().clone()
    }

    pub fn candidates(&self) -> Vec<IceCandidate> {
        self.candidates.lock().clone()
    }

    /// Track-IDs der Sender
    pub fn sender_tracks(&self) -> Vec<String> {
        self.senders.lock().iter().map(|(_, id)| id.clone()).collect()
    }

    pub fn replaced_tracks(&self) -> Vec<String> {
        self.replaced.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerConnection for FakePeerConnection {
    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        Ok(SessionDescription::offer(format!("offer-{}", self.index)))
    }

    async fn create_answer(&self) -> Result<SessionDescription, TransportError> {
        match self.remote.lock().as_ref() {
            Some(desc) if desc.kind == SdpKind::Offer => {
                Ok(SessionDescription::answer(format!("answer-{}", self.index)))
            }
            _ => Err(TransportError::WebRTC("no remote offer".to_string())),
        }
    }

    async fn set_local_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), TransportError> {
        *self.local.lock() = Some(desc);
        Ok(())
    }

    async fn set_remote_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), TransportError> {
        *self.remote.lock() = Some(desc);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError> {
        if self.remote.lock().is_none() {
            return Err(TransportError::WebRTC(
                "remote description is not set".to_string(),
            ));
        }
        self.candidates.lock().push(candidate);
        Ok(())
    }

    async fn add_track(&self, track: &MediaTrack) -> Result<(), TransportError> {
        self.senders
            .lock()
            .push((track.kind(), track.id().to_string()));
        Ok(())
    }

    async fn replace_track(&self, track: &MediaTrack) -> Result<bool, TransportError> {
        let mut senders = self.senders.lock();
        match senders.iter_mut().find(|(kind, _)| *kind == track.kind()) {
            Some(sender) => {
                sender.1 = track.id().to_string();
                self.replaced.lock().push(track.id().to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn connection_state(&self) -> ConnectionState {
        *self.state.lock()
    }

    async fn close(&self) -> Result<(), TransportError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.set_state(ConnectionState::Closed);
        }
        Ok(())
    }
}

// ============================================================================
// DEVICES
// ============================================================================

pub struct FakeDevices {
    cameras: Vec<String>,
    requests: Mutex<Vec<MediaConstraints>>,
    issued: Mutex<Vec<Arc<MediaTrack>>>,
    deny: AtomicBool,
    gate: Semaphore,
}

impl FakeDevices {
    pub fn new(cameras: &[&str]) -> Self {
        Self::with_permits(cameras, Semaphore::MAX_PERMITS)
    }

    /// Geräte, deren Zugriff erst nach `release()` fertig wird
    pub fn gated(cameras: &[&str]) -> Self {
        Self::with_permits(cameras, 0)
    }

    fn with_permits(cameras: &[&str], permits: usize) -> Self {
        Self {
            cameras: cameras.iter().map(|c| c.to_string()).collect(),
            requests: Mutex::new(Vec::new()),
            issued: Mutex::new(Vec::new()),
            deny: AtomicBool::new(false),
            gate: Semaphore::new(permits),
        }
    }

    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    pub fn deny(&self, deny: bool) {
        self.deny.store(deny, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<MediaConstraints> {
        self.requests.lock().clone()
    }

    /// Alle jemals ausgegebenen Tracks
    pub fn issued(&self) -> Vec<Arc<MediaTrack>> {
        self.issued.lock().clone()
    }
}

#[async_trait]
impl MediaDevices for FakeDevices {
    async fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>, MediaError> {
        let mut devices = vec![MediaDeviceInfo {
            device_id: "mic".to_string(),
            label: "Microphone".to_string(),
            kind: TrackKind::Audio,
        }];
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
        self.requests.lock().push(constraints.clone());
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| MediaError::StreamBuildError(e.to_string()))?;
        drop(permit);

        if self.deny.load(Ordering::SeqCst) {
            return Err(MediaError::PermissionDenied("camera".to_string()));
        }

        let stream = MediaStream::new();
        if constraints.audio {
            let track = Arc::new(MediaTrack::new(TrackKind::Audio, "mic", stream.id()));
            self.issued.lock().push(Arc::clone(&track));
            stream.add_track(track);
        }
        if constraints.video {
            let camera = match constraints.video_device {
                Some(id) if self.cameras.contains(&id) => id,
                Some(id) => return Err(MediaError::DeviceNotFound(id)),
                None => self
                    .cameras
                    .first()
                    .cloned()
                    .ok_or(MediaError::NoVideoDevice)?,
            };
            let track = Arc::new(MediaTrack::new(TrackKind::Video, camera, stream.id()));
            self.issued.lock().push(Arc::clone(&track));
            stream.add_track(track);
        }
        Ok(stream)
    }
}
