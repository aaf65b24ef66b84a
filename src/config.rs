//! Konfiguration für Call-Sessions
//!
//! Die Datei liegt im Konfigurationsverzeichnis der App:
//! - Linux: `~/.config/lupyd-call/config.json`
//! - macOS: `~/Library/Application Support/app.lupyd.lupyd-call/config.json`
//! - Windows: `%APPDATA%/lupyd/lupyd-call/config/config.json`
//!
//! Fehlt die Datei, gelten die Standardwerte.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use webrtc::ice_transport::ice_server::RTCIceServer;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,
}

// ============================================================================
// CONFIG TYPES
// ============================================================================

/// Öffentliche STUN Server, wenn nichts konfiguriert ist
pub const DEFAULT_STUN_URLS: [&str; 2] = [
    "stun:stun.l.google.com:19302",
    "stun:stun1.l.google.com:19302",
];

/// STUN/TURN Server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub credential: String,
}

impl From<&IceServerConfig> for RTCIceServer {
    fn from(server: &IceServerConfig) -> Self {
        RTCIceServer {
            urls: server.urls.clone(),
            username: server.username.clone(),
            credential: server.credential.clone(),
            ..Default::default()
        }
    }
}

/// Globale Einstellungen für Anrufe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    pub ice_servers: Vec<IceServerConfig>,
    /// Startwert des Reconnect-Backoffs in Millisekunden
    pub initial_retry_ms: u64,
    /// Maximale automatische Reconnects zwischen zwei erfolgreichen Verbindungen
    pub max_reconnect_attempts: u32,
    pub mic_enabled: bool,
    pub video_enabled: bool,
    /// Kamera-IDs in Wechselreihenfolge
    pub cameras: Vec<String>,
    /// Gültigkeit einer Anruf-Einladung in Sekunden
    pub request_ttl_secs: u64,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServerConfig {
                urls: DEFAULT_STUN_URLS.iter().map(|u| u.to_string()).collect(),
                username: String::new(),
                credential: String::new(),
            }],
            initial_retry_ms: 1000,
            max_reconnect_attempts: 4,
            mic_enabled: true,
            video_enabled: false,
            cameras: Vec::new(),
            request_ttl_secs: 60,
        }
    }
}

impl CallConfig {
    /// Lädt die Konfiguration aus dem App-Verzeichnis oder nimmt die Defaults
    pub fn load_or_default() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        if path.exists() {
            tracing::info!("Loading call config from {:?}", path);
            Self::load_from(&path)
        } else {
            tracing::debug!("No config at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Lädt die Konfiguration aus einer bestimmten Datei
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Speichert die Konfiguration
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Pfad zur Konfigurationsdatei
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let proj_dirs = directories::ProjectDirs::from("app", "lupyd", "lupyd-call")
            .ok_or(ConfigError::NoConfigDir)?;
        Ok(proj_dirs.config_dir().join("config.json"))
    }

    pub fn rtc_ice_servers(&self) -> Vec<RTCIceServer> {
        self.ice_servers.iter().map(RTCIceServer::from).collect()
    }

    pub fn initial_retry(&self) -> Duration {
        Duration::from_millis(self.initial_retry_ms)
    }

    pub fn request_ttl(&self) -> Duration {
        Duration::from_secs(self.request_ttl_secs)
    }

    /// Erstellt die Einstellungen für einen einzelnen Anruf
    pub fn session(
        &self,
        username: impl Into<String>,
        remote_user: impl Into<String>,
    ) -> SessionConfig {
        SessionConfig {
            username: username.into(),
            remote_user: remote_user.into(),
            session_id: None,
            initial_retry: self.initial_retry(),
            max_reconnect_attempts: self.max_reconnect_attempts,
            mic_enabled: self.mic_enabled,
            video_enabled: self.video_enabled,
        }
    }
}

/// Einstellungen einer einzelnen Call-Session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub username: String,
    pub remote_user: String,
    /// Vorgegebene Session-ID (z.B. aus einer Einladung), sonst zufällig
    pub session_id: Option<u32>,
    pub initial_retry: Duration,
    pub max_reconnect_attempts: u32,
    pub mic_enabled: bool,
    pub video_enabled: bool,
}

impl SessionConfig {
    pub fn with_session_id(mut self, session_id: u32) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_media(mut self, mic_enabled: bool, video_enabled: bool) -> Self {
        self.mic_enabled = mic_enabled;
        self.video_enabled = video_enabled;
        self
    }
}

// ============================================================================
// TESTS
// ============================================================================
