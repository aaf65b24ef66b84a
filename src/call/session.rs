//! Call Session
//!
//! Verwaltet genau einen Audio/Video-Anruf zwischen zwei Benutzern:
//! - Media Capture und Geräte-Toggles
//! - Offer/Answer/ICE über einen injizierten Signaling-Kanal
//! - Automatischer Reconnect mit verdoppeltem Backoff
//!
//! Jede `init()` und jedes `dispose()` erhöht eine Generation. Verspätete
//! Ergebnisse (Media-Zugriff, Transport-Events, Reconnect-Timer) einer
//! älteren Generation werden verworfen.

use super::backoff::Backoff;
use crate::config::SessionConfig;
use crate::media::{
    MediaConstraints, MediaDevices, MediaError, MediaStream, MediaTrack, RemoteStream,
};
use crate::signaling::{CallMessage, CallPayload};
use crate::transport::{
    ConnectionState, IceCandidate, PeerConnection, PeerConnector, SessionDescription,
    TransportError, TransportEvent,
};
use chrono::Utc;
use parking_lot::Mutex;
use rand::Rng;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum CallError {
    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Call session is not initialized")]
    NotInitialized,

    #[error("No local media stream")]
    NoLocalMedia,

    #[error("Session was disposed while initializing")]
    Superseded,

    #[error("Signaling channel closed")]
    SignalingClosed,
}

// ============================================================================
// CALL EVENTS
// ============================================================================

/// Events die von der CallSession ausgelöst werden
///
/// Ausgehende Signaling-Nachrichten laufen nicht hierüber, sondern über den
/// Kanal, der bei [`CallSession::new`] übergeben wird.
#[derive(Debug, Clone)]
pub enum CallEvent {
    LocalStream(Arc<MediaStream>),
    RemoteStream(Arc<RemoteStream>),
    ConnectionState(ConnectionState),
}

// ============================================================================
// SESSION STATE
// ============================================================================

/// ICE-Kandidaten der aktuellen Verbindung, die noch nicht dran sind
///
/// Lokale Kandidaten gehen erst nach dem eigenen Offer/Answer raus,
/// entfernte werden erst nach der Remote Description angewendet.
#[derive(Default)]
struct CandidateQueue {
    local_description_sent: bool,
    outbound: Vec<IceCandidate>,
    remote_description_set: bool,
    inbound: Vec<IceCandidate>,
}

struct SessionState {
    pc: Option<Arc<dyn PeerConnection>>,
    candidates: CandidateQueue,
    generation: u64,
    local_stream: Option<Arc<MediaStream>>,
    remote_stream: Option<Arc<RemoteStream>>,
    mic_enabled: bool,
    video_enabled: bool,
    current_camera: Option<String>,
    connection_state: ConnectionState,
    backoff: Backoff,
    should_reconnect: bool,
}

struct Inner {
    username: String,
    remote_user: String,
    session_id: u32,
    connector: Arc<dyn PeerConnector>,
    devices: Arc<dyn MediaDevices>,
    signal_tx: mpsc::UnboundedSender<CallMessage>,
    event_tx: broadcast::Sender<CallEvent>,
    state: Mutex<SessionState>,
}

// ============================================================================
// CALL SESSION
// ============================================================================

/// Ein einzelner Anruf zwischen `username` und `remote_user`
///
/// Klonen ist billig; alle Klone teilen sich dieselbe Session.
#[derive(Clone)]
pub struct CallSession {
    inner: Arc<Inner>,
}

impl CallSession {
    /// Erstellt eine neue Session
    ///
    /// `signal_tx` empfängt jede Nachricht, die der Besitzer an den Peer
    /// weiterleiten muss.
    pub fn new(
        config: SessionConfig,
        connector: Arc<dyn PeerConnector>,
        devices: Arc<dyn MediaDevices>,
        signal_tx: mpsc::UnboundedSender<CallMessage>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        let session_id = config
            .session_id
            .unwrap_or_else(|| rand::thread_rng().gen_range(0..99999));

        tracing::info!(
            "Creating call session {} ({} -> {})",
            session_id,
            config.username,
            config.remote_user
        );

        Self {
            inner: Arc::new(Inner {
                username: config.username,
                remote_user: config.remote_user,
                session_id,
                connector,
                devices,
                signal_tx,
                event_tx,
                state: Mutex::new(SessionState {
                    pc: None,
                    candidates: CandidateQueue::default(),
                    generation: 0,
                    local_stream: None,
                    remote_stream: None,
                    mic_enabled: config.mic_enabled,
                    video_enabled: config.video_enabled,
                    current_camera: None,
                    connection_state: ConnectionState::New,
                    backoff: Backoff::new(config.initial_retry, config.max_reconnect_attempts),
                    should_reconnect: true,
                }),
            }),
        }
    }

    /// Gibt einen Event-Receiver zurück
    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.inner.event_tx.subscribe()
    }

    pub fn session_id(&self) -> u32 {
        self.inner.session_id
    }

    pub fn username(&self) -> &str {
        &self.inner.username
    }

    pub fn remote_user(&self) -> &str {
        &self.inner.remote_user
    }

    pub fn local_stream(&self) -> Option<Arc<MediaStream>> {
        self.inner.state.lock().local_stream.clone()
    }

    pub fn remote_stream(&self) -> Option<Arc<RemoteStream>> {
        self.inner.state.lock().remote_stream.clone()
    }

    pub fn is_mic_enabled(&self) -> bool {
        self.inner.state.lock().mic_enabled
    }

    pub fn is_video_enabled(&self) -> bool {
        self.inner.state.lock().video_enabled
    }

    pub fn current_camera(&self) -> Option<String> {
        self.inner.state.lock().current_camera.clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.state.lock().connection_state
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Baut die Peer Connection auf und hängt die lokalen Tracks an
    ///
    /// Vorhandene lokale Tracks werden wiederverwendet, sonst werden die
    /// Geräte gemäß Mic/Video-Flags geöffnet.
    pub async fn init(&self) -> Result<(), CallError> {
        let generation = {
            let mut state = self.inner.state.lock();
            if let Some(pc) = &state.pc {
                let current = pc.connection_state();
                if current.is_live() {
                    tracing::warn!(
                        "Not reinitiating session {} while {}",
                        self.inner.session_id,
                        current
                    );
                    return Ok(());
                }
            }
            state.generation += 1;
            state.generation
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let pc = self.inner.connector.connect(events_tx).await?;

        let previous = {
            let mut state = self.inner.state.lock();
            if state.generation == generation {
                state.connection_state = ConnectionState::New;
                state.candidates = CandidateQueue::default();
                Some(state.pc.replace(Arc::clone(&pc)))
            } else {
                None
            }
        };
        let previous = match previous {
            Some(previous) => previous,
            None => {
                close_quietly(pc).await;
                return Err(CallError::Superseded);
            }
        };
        if let Some(previous) = previous {
            close_quietly(previous).await;
        }

        self.spawn_event_loop(generation, events_rx);

        let (stream, acquired) = match self.local_stream() {
            Some(stream) => (stream, false),
            None => match self.acquire_local_media().await {
                Ok(stream) => (stream, true),
                Err(e) => {
                    tracing::warn!("Failed to acquire local media: {}", e);
                    self.abort_init(generation).await;
                    return Err(e.into());
                }
            },
        };

        {
            let mut state = self.inner.state.lock();
            if state.generation != generation {
                drop(state);
                if acquired {
                    stream.stop_all();
                }
                return Err(CallError::Superseded);
            }
            if acquired {
                state.current_camera = stream
                    .video_tracks()
                    .first()
                    .map(|t| t.device_id().to_string());
                state.local_stream = Some(Arc::clone(&stream));
            }
        }

        for track in stream.tracks() {
            tracing::debug!(
                "Adding {} track {} to peer connection",
                track.kind().as_str(),
                track.id()
            );
            pc.add_track(&track).await?;
        }

        if acquired {
            self.emit(CallEvent::LocalStream(stream));
        }

        tracing::info!("Call session {} initialized", self.inner.session_id);
        Ok(())
    }

    /// Schließt die Verbindung
    ///
    /// `stop_media` beendet auch die lokalen Tracks. `allow_reconnecting =
    /// false` verhindert jeden weiteren automatischen Reconnect, auch nach
    /// späteren Aufrufen mit `true`.
    pub async fn dispose(&self, stop_media: bool, allow_reconnecting: bool) {
        let (pc, local) = {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            if !allow_reconnecting {
                state.should_reconnect = false;
            }
            state.remote_stream = None;
            state.candidates = CandidateQueue::default();
            let pc = state.pc.take();
            if pc.is_some() {
                state.connection_state = ConnectionState::Closed;
            }
            let local = if stop_media {
                state.local_stream.take()
            } else {
                None
            };
            (pc, local)
        };

        if let Some(pc) = pc {
            close_quietly(pc).await;
        }
        if let Some(stream) = local {
            stream.stop_all();
        }

        tracing::info!(
            "Disposed call session {} (stop_media: {}, reconnect: {})",
            self.inner.session_id,
            stop_media,
            allow_reconnecting
        );
    }

    // ========================================================================
    // SIGNALING - OUTBOUND
    // ========================================================================

    /// Erstellt ein Offer und sendet es an den Peer
    pub async fn start_call(&self) -> Result<(), CallError> {
        let (pc, generation) = self.peer_connection()?;
        let offer = pc.create_offer().await?;
        pc.set_local_description(offer.clone()).await?;
        self.send_description(generation, CallPayload::Offer { sdp: offer.sdp })
    }

    /// Lädt den Peer zu einem Anruf ein (`exp` in Unix-Millisekunden)
    pub fn request_call(&self, exp: i64) -> Result<(), CallError> {
        self.send(CallPayload::Request { exp })
    }

    /// Einladung, die nach `ttl` abläuft
    pub fn request_call_with_ttl(&self, ttl: Duration) -> Result<(), CallError> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        self.request_call(Utc::now().timestamp_millis().saturating_add(ttl_ms))
    }

    /// Lehnt eine Einladung ab
    pub fn reject_call(&self) -> Result<(), CallError> {
        self.send(CallPayload::Reject)
    }

    /// Meldet dem Peer das Ende des Anrufs
    ///
    /// Die lokale Verbindung bleibt bestehen; dafür ist `dispose` da.
    pub fn end_call(&self) -> Result<(), CallError> {
        self.send(CallPayload::End)
    }

    /// Auflegen: `end` senden und alles ohne Reconnect abbauen
    pub async fn hang_up(&self) -> Result<(), CallError> {
        let sent = self.end_call();
        self.dispose(true, false).await;
        sent
    }

    // ========================================================================
    // SIGNALING - INBOUND
    // ========================================================================

    /// Verarbeitet eine eingehende Nachricht (UTF-8 JSON)
    ///
    /// Fehlerhafte oder fremde Nachrichten werden stillschweigend verworfen.
    pub async fn on_call_message(&self, data: &[u8]) -> Result<(), CallError> {
        match CallMessage::from_bytes(data) {
            Ok(msg) => self.handle_message(msg).await,
            Err(e) => {
                tracing::debug!("Dropping malformed call message: {}", e);
                Ok(())
            }
        }
    }

    /// Verarbeitet eine bereits geparste Nachricht
    pub async fn handle_message(&self, msg: CallMessage) -> Result<(), CallError> {
        if msg.from != self.inner.remote_user {
            tracing::debug!(
                "Dropping {} from unexpected peer {}",
                msg.payload.kind(),
                msg.from
            );
            return Ok(());
        }
        if msg.session_id != self.inner.session_id {
            tracing::debug!(
                "Dropping {} for session {} (ours: {})",
                msg.payload.kind(),
                msg.session_id,
                self.inner.session_id
            );
            return Ok(());
        }

        tracing::debug!("Received {} from {}", msg.payload.kind(), msg.from);

        match msg.payload {
            CallPayload::Offer { sdp } => {
                let (pc, generation) = self.peer_connection()?;
                pc.set_remote_description(SessionDescription::offer(sdp))
                    .await?;
                self.apply_queued_candidates(&pc, generation).await?;
                let answer = pc.create_answer().await?;
                pc.set_local_description(answer.clone()).await?;
                self.send_description(generation, CallPayload::Answer { sdp: answer.sdp })?;
            }
            CallPayload::Answer { sdp } => {
                let (pc, generation) = self.peer_connection()?;
                pc.set_remote_description(SessionDescription::answer(sdp))
                    .await?;
                self.apply_queued_candidates(&pc, generation).await?;
            }
            CallPayload::Candidate { candidate } => {
                let pc = {
                    let mut state = self.inner.state.lock();
                    let Some(pc) = state.pc.clone() else {
                        tracing::debug!("Ignoring ICE candidate without peer connection");
                        return Ok(());
                    };
                    if !state.candidates.remote_description_set {
                        tracing::debug!("Queueing ICE candidate until remote description is set");
                        state.candidates.inbound.push(candidate);
                        return Ok(());
                    }
                    pc
                };
                pc.add_ice_candidate(candidate).await?;
            }
            // Werden vom Besitzer der Session behandelt
            CallPayload::Request { .. } | CallPayload::Reject | CallPayload::End => {}
        }

        Ok(())
    }

    // ========================================================================
    // DEVICE TOGGLES
    // ========================================================================

    /// Schaltet die vorhandenen Audio-Tracks an oder aus
    pub fn toggle_mic(&self, enable: bool) {
        let stream = {
            let mut state = self.inner.state.lock();
            state.mic_enabled = enable;
            state.local_stream.clone()
        };
        if let Some(stream) = stream {
            for track in stream.audio_tracks() {
                track.set_enabled(enable);
            }
        }
    }

    /// Schaltet die vorhandenen Video-Tracks an oder aus
    ///
    /// Gibt es noch keinen Video-Track, wird beim Einschalten eine Kamera
    /// geöffnet und an die Verbindung gehängt.
    pub async fn toggle_video(&self, enable: bool) -> Result<(), CallError> {
        let (stream, camera) = {
            let mut state = self.inner.state.lock();
            state.video_enabled = enable;
            (state.local_stream.clone(), state.current_camera.clone())
        };

        let Some(stream) = stream else {
            return Ok(());
        };

        let existing = stream.video_tracks();
        if !existing.is_empty() {
            for track in existing {
                track.set_enabled(enable);
            }
            return Ok(());
        }
        if !enable {
            return Ok(());
        }

        let constraints = match camera {
            Some(id) => MediaConstraints::camera(id),
            None => MediaConstraints::new(false, true),
        };
        let track = self.acquire_video_track(constraints).await?;

        if !self.claim_camera(&stream, &track) {
            track.stop();
            return Ok(());
        }
        stream.add_track(Arc::clone(&track));

        if let Some(pc) = self.current_pc() {
            if !pc.replace_track(&track).await? {
                pc.add_track(&track).await?;
                // Neuer Sender braucht eine neue Aushandlung
                self.start_call().await?;
            }
        }

        tracing::info!("Enabled video on camera {}", track.device_id());
        self.emit(CallEvent::LocalStream(stream));
        Ok(())
    }

    /// Wechselt zur nächsten Kamera
    ///
    /// Der ausgehende Video-Track wird ohne Neuverhandlung ersetzt.
    pub async fn flip_camera(&self) -> Result<(), CallError> {
        let stream = self.local_stream().ok_or(CallError::NoLocalMedia)?;
        if stream.video_tracks().is_empty() {
            tracing::debug!("No video track to flip");
            return Ok(());
        }

        let cameras = self.inner.devices.enumerate_video_inputs().await?;
        if cameras.is_empty() {
            return Err(MediaError::NoVideoDevice.into());
        }

        let current = self.current_camera();
        let next_index = current
            .as_deref()
            .and_then(|id| cameras.iter().position(|c| c.device_id == id))
            .map(|i| (i + 1) % cameras.len())
            .unwrap_or(0);
        let next = &cameras[next_index];

        if current.as_deref() == Some(next.device_id.as_str()) {
            tracing::debug!("Only one camera available, not flipping");
            return Ok(());
        }

        let track = self
            .acquire_video_track(MediaConstraints::camera(next.device_id.clone()))
            .await?;
        track.set_enabled(self.is_video_enabled());

        if !self.claim_camera(&stream, &track) {
            track.stop();
            return Ok(());
        }

        if let Some(pc) = self.current_pc() {
            if !pc.replace_track(&track).await? {
                tracing::debug!("No outgoing video sender to replace");
            }
        }

        for old in stream.video_tracks() {
            stream.remove_track(old.id());
            old.stop();
        }
        stream.add_track(track);

        tracing::info!("Switched camera to {}", next.device_id);
        self.emit(CallEvent::LocalStream(stream));
        Ok(())
    }

    // ========================================================================
    // PRIVATE METHODS
    // ========================================================================

    /// Aktuelle Verbindung samt Generation
    fn peer_connection(&self) -> Result<(Arc<dyn PeerConnection>, u64), CallError> {
        let state = self.inner.state.lock();
        match &state.pc {
            Some(pc) => Ok((Arc::clone(pc), state.generation)),
            None => Err(CallError::NotInitialized),
        }
    }

    fn current_pc(&self) -> Option<Arc<dyn PeerConnection>> {
        self.inner.state.lock().pc.clone()
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.state.lock().generation == generation
    }

    fn emit(&self, event: CallEvent) {
        let _ = self.inner.event_tx.send(event);
    }

    fn send(&self, payload: CallPayload) -> Result<(), CallError> {
        tracing::debug!(
            "Sending {} to {} (session {})",
            payload.kind(),
            self.inner.remote_user,
            self.inner.session_id
        );
        let msg = CallMessage::new(self.inner.username.clone(), self.inner.session_id, payload);
        self.inner
            .signal_tx
            .send(msg)
            .map_err(|_| CallError::SignalingClosed)
    }

    /// Sendet Offer/Answer und danach die zurückgehaltenen lokalen Kandidaten
    ///
    /// Läuft unter dem State-Lock, damit kein Kandidat vor der Description
    /// im Signaling-Kanal landet.
    fn send_description(&self, generation: u64, payload: CallPayload) -> Result<(), CallError> {
        let mut state = self.inner.state.lock();
        self.send(payload)?;
        if state.generation != generation {
            return Ok(());
        }
        state.candidates.local_description_sent = true;
        for candidate in std::mem::take(&mut state.candidates.outbound) {
            self.send(CallPayload::Candidate { candidate })?;
        }
        Ok(())
    }

    /// Wendet die Kandidaten an, die vor der Remote Description kamen
    async fn apply_queued_candidates(
        &self,
        pc: &Arc<dyn PeerConnection>,
        generation: u64,
    ) -> Result<(), CallError> {
        let queued = {
            let mut state = self.inner.state.lock();
            if state.generation != generation {
                return Ok(());
            }
            state.candidates.remote_description_set = true;
            std::mem::take(&mut state.candidates.inbound)
        };
        if !queued.is_empty() {
            tracing::debug!("Applying {} queued ICE candidate(s)", queued.len());
        }
        for candidate in queued {
            pc.add_ice_candidate(candidate).await?;
        }
        Ok(())
    }

    async fn acquire_local_media(&self) -> Result<Arc<MediaStream>, MediaError> {
        let constraints = {
            let state = self.inner.state.lock();
            MediaConstraints {
                audio: state.mic_enabled,
                video: state.video_enabled,
                video_device: state.current_camera.clone(),
            }
        };
        let stream = self.inner.devices.get_user_media(constraints).await?;
        Ok(Arc::new(stream))
    }

    async fn acquire_video_track(
        &self,
        constraints: MediaConstraints,
    ) -> Result<Arc<MediaTrack>, CallError> {
        let acquired = self.inner.devices.get_user_media(constraints).await?;
        let mut video = acquired.video_tracks();
        // Ungenutzte Tracks sofort wieder freigeben
        for track in acquired.audio_tracks() {
            track.stop();
        }
        if video.is_empty() {
            return Err(MediaError::NoVideoDevice.into());
        }
        Ok(video.remove(0))
    }

    /// Übernimmt die Kamera des Tracks, solange `stream` noch der aktuelle ist
    fn claim_camera(&self, stream: &Arc<MediaStream>, track: &MediaTrack) -> bool {
        let mut state = self.inner.state.lock();
        let still_current = matches!(&state.local_stream, Some(s) if Arc::ptr_eq(s, stream));
        if still_current {
            state.current_camera = Some(track.device_id().to_string());
        }
        still_current
    }

    /// Baut die halb initialisierte Verbindung wieder ab
    async fn abort_init(&self, generation: u64) {
        let pc = {
            let mut state = self.inner.state.lock();
            if state.generation != generation {
                return;
            }
            state.generation += 1;
            state.pc.take()
        };
        if let Some(pc) = pc {
            close_quietly(pc).await;
        }
    }

    fn spawn_event_loop(
        &self,
        generation: u64,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(session) = Self::upgrade(&weak) else {
                    break;
                };
                if !session.is_current(generation) {
                    break;
                }
                session.handle_transport_event(generation, event);
            }
        });
    }

    fn upgrade(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn handle_transport_event(&self, generation: u64, event: TransportEvent) {
        match event {
            TransportEvent::StateChanged(state) => self.on_connection_state(generation, state),
            TransportEvent::IceCandidate(candidate) => {
                let mut state = self.inner.state.lock();
                if state.generation != generation {
                    return;
                }
                if !state.candidates.local_description_sent {
                    state.candidates.outbound.push(candidate);
                    return;
                }
                if let Err(e) = self.send(CallPayload::Candidate { candidate }) {
                    tracing::warn!("Failed to forward ICE candidate: {}", e);
                }
            }
            TransportEvent::Track(track) => {
                let stream = {
                    let mut state = self.inner.state.lock();
                    Arc::clone(
                        state
                            .remote_stream
                            .get_or_insert_with(|| Arc::new(RemoteStream::new())),
                    )
                };
                tracing::info!("Remote track: {} {}", track.id(), track.kind().as_str());
                stream.add_track(track);
                self.emit(CallEvent::RemoteStream(stream));
            }
        }
    }

    fn on_connection_state(&self, generation: u64, new_state: ConnectionState) {
        let delay = {
            let mut state = self.inner.state.lock();
            state.connection_state = new_state;
            match new_state {
                ConnectionState::Connected => {
                    state.backoff.reset();
                    None
                }
                s if s.is_broken() && state.should_reconnect => {
                    let delay = state.backoff.next_delay();
                    if delay.is_none() {
                        tracing::warn!(
                            "Session {} is {}, no reconnect attempts left",
                            self.inner.session_id,
                            s
                        );
                    }
                    delay
                }
                _ => None,
            }
        };

        tracing::info!("Session {} connection state: {}", self.inner.session_id, new_state);
        self.emit(CallEvent::ConnectionState(new_state));

        if let Some(delay) = delay {
            self.schedule_reconnect(generation, delay, new_state);
        }
    }

    fn schedule_reconnect(&self, generation: u64, delay: Duration, reason: ConnectionState) {
        tracing::debug!("Scheduling reconnect in {:?}", delay);
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(session) = Self::upgrade(&weak) else {
                return;
            };
            if !session.is_current(generation) {
                tracing::debug!("Skipping stale reconnect");
                return;
            }
            tracing::info!("Reconnecting because connection state is {}", reason);
            if let Err(e) = session.reconnect().await {
                tracing::error!("Reconnect failed: {}", e);
            }
        });
    }

    /// Neue Verbindung mit den alten lokalen Tracks, dann neues Offer
    async fn reconnect(&self) -> Result<(), CallError> {
        let should_reconnect = self.inner.state.lock().should_reconnect;
        if !should_reconnect {
            return Ok(());
        }

        let preserved = self.local_stream();
        self.dispose(false, true).await;
        self.init().await?;
        self.start_call().await?;

        if let Some(stream) = preserved {
            self.emit(CallEvent::LocalStream(stream));
        }
        Ok(())
    }
}

impl std::fmt::Debug for CallSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSession")
            .field("session_id", &self.inner.session_id)
            .field("username", &self.inner.username)
            .field("remote_user", &self.inner.remote_user)
            .field("connection_state", &self.connection_state())
            .finish()
    }
}

async fn close_quietly(pc: Arc<dyn PeerConnection>) {
    if let Err(e) = pc.close().await {
        tracing::warn!("Failed to close peer connection: {}", e);
    }
}

// ============================================================================
// TESTS
// ============================================================================
