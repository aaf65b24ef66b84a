//! Audio Capture - Mikrofon-Aufnahme für lokale Audio-Tracks
//!
//! Verwendet cpal für Cross-Platform Audio Input.
//! Der cpal-Stream ist nicht `Send`, daher lebt er auf einem eigenen
//! Thread und wird über einen Stop-Kanal beendet.

use super::MediaError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    Device, FromSample, Sample, SampleFormat, SizedSample, StreamConfig, SupportedStreamConfig,
    SupportedStreamConfigRange,
};
use parking_lot::Mutex;
use ringbuf::{traits::*, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Sample Rate (48kHz ist der Standard für WebRTC/Opus)
pub const SAMPLE_RATE: u32 = 48000;

/// Channels (Mono für Voice)
pub const CHANNELS: u16 = 1;

/// Frame Size in Samples (20ms @ 48kHz = 960 samples)
pub const FRAME_SIZE: usize = 960;

/// Buffer Size für den Capture-Ring-Buffer
const RING_BUFFER_SIZE: usize = FRAME_SIZE * 10;

// ============================================================================
// AUDIO CAPTURE
// ============================================================================

/// Laufende Mikrofon-Aufnahme
pub struct AudioCapture {
    device_name: String,
    buffer: Arc<Mutex<HeapRb<f32>>>,
    muted: Arc<AtomicBool>,
    level: Arc<Mutex<f32>>,
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl AudioCapture {
    /// Startet die Aufnahme vom genannten Gerät (oder dem Standard-Gerät)
    pub fn start(device_name: Option<&str>) -> Result<Self, MediaError> {
        let buffer = Arc::new(Mutex::new(HeapRb::new(RING_BUFFER_SIZE)));
        let muted = Arc::new(AtomicBool::new(false));
        let level = Arc::new(Mutex::new(0.0));

        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<String, MediaError>>();

        let wanted = device_name.map(str::to_string);
        let thread_buffer = Arc::clone(&buffer);
        let thread_muted = Arc::clone(&muted);
        let thread_level = Arc::clone(&level);

        let thread = std::thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || {
                let stream = match Self::open_stream(
                    wanted.as_deref(),
                    thread_buffer,
                    thread_muted,
                    thread_level,
                ) {
                    Ok((name, stream)) => {
                        let _ = ready_tx.send(Ok(name));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Blockiert bis stop() aufgerufen oder der Sender gedroppt wird
                let _ = stop_rx.recv();
                drop(stream);
                tracing::info!("Audio capture stopped");
            })
            .map_err(|e| MediaError::StreamBuildError(e.to_string()))?;

        let device_name = match ready_rx.recv() {
            Ok(Ok(name)) => name,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                return Err(MediaError::StreamBuildError(
                    "Capture thread exited".to_string(),
                ))
            }
        };

        Ok(Self {
            device_name,
            buffer,
            muted,
            level,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    /// Listet die Namen aller Eingabegeräte
    pub fn input_device_names() -> Vec<String> {
        let host = cpal::default_host();
        match host.input_devices() {
            Ok(devices) => devices.filter_map(|d| d.name().ok()).collect(),
            Err(e) => {
                tracing::warn!("Failed to enumerate audio input devices: {}", e);
                Vec::new()
            }
        }
    }

    /// Name des Standard-Eingabegeräts
    pub fn default_input_name() -> Option<String> {
        cpal::default_host()
            .default_input_device()
            .and_then(|d| d.name().ok())
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Stummschalten ohne den Stream zu beenden
    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    /// RMS-Pegel der letzten Callback-Periode
    pub fn level(&self) -> f32 {
        *self.level.lock()
    }

    /// Liest einen Frame von aufgenommenem Audio
    pub fn read_frame(&self) -> Option<Vec<f32>> {
        let mut buffer = self.buffer.lock();
        if buffer.occupied_len() < FRAME_SIZE {
            return None;
        }
        let mut frame = Vec::with_capacity(FRAME_SIZE);
        for _ in 0..FRAME_SIZE {
            if let Some(sample) = buffer.try_pop() {
                frame.push(sample);
            }
        }
        Some(frame)
    }

    /// Beendet die Aufnahme und wartet auf den Thread
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    // ========================================================================
    // PRIVATE METHODS
    // ========================================================================

    fn open_stream(
        wanted: Option<&str>,
        buffer: Arc<Mutex<HeapRb<f32>>>,
        muted: Arc<AtomicBool>,
        level: Arc<Mutex<f32>>,
    ) -> Result<(String, cpal::Stream), MediaError> {
        let host = cpal::default_host();
        let device = match wanted {
            Some(name) => host
                .input_devices()
                .map_err(|e| MediaError::DeviceNotFound(e.to_string()))?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| MediaError::DeviceNotFound(name.to_string()))?,
            None => host
                .default_input_device()
                .ok_or(MediaError::NoInputDevice)?,
        };
        let name = device.name().unwrap_or_else(|_| "default".to_string());

        let supported = Self::find_best_input_config(&device)?;
        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.into();

        tracing::info!(
            "Starting audio capture on '{}': {} Hz, {} channels, {:?}",
            name,
            config.sample_rate.0,
            config.channels,
            sample_format
        );

        let sink = CaptureSink {
            buffer,
            muted,
            level,
            channels: config.channels as usize,
            source_rate: config.sample_rate.0,
        };

        let stream = match sample_format {
            SampleFormat::F32 => build_capture_stream::<f32>(&device, &config, sink),
            SampleFormat::I16 => build_capture_stream::<i16>(&device, &config, sink),
            SampleFormat::U16 => build_capture_stream::<u16>(&device, &config, sink),
            other => {
                return Err(MediaError::UnsupportedConfig(format!(
                    "Sample format {:?} is not supported",
                    other
                )))
            }
        }
        .map_err(|e| match e {
            cpal::BuildStreamError::DeviceNotAvailable => {
                MediaError::PermissionDenied(name.clone())
            }
            other => MediaError::StreamBuildError(other.to_string()),
        })?;

        stream
            .play()
            .map_err(|e| MediaError::StreamPlayError(e.to_string()))?;

        Ok((name, stream))
    }

    fn find_best_input_config(device: &Device) -> Result<SupportedStreamConfig, MediaError> {
        let configs = device
            .supported_input_configs()
            .map_err(|e| MediaError::UnsupportedConfig(e.to_string()))?;

        select_best_config(configs.collect())
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for AudioCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioCapture")
            .field("device_name", &self.device_name)
            .field("muted", &self.is_muted())
            .finish()
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Einfaches Linear-Resampling
pub fn resample_linear(data: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate || data.is_empty() {
        return data.to_vec();
    }
    let ratio = target_rate as f32 / source_rate as f32;
    let new_len = (data.len() as f32 * ratio) as usize;
    (0..new_len)
        .map(|i| {
            let src_idx = i as f32 / ratio;
            let idx = src_idx as usize;
            let frac = src_idx - idx as f32;
            let s1 = data.get(idx).copied().unwrap_or(0.0);
            let s2 = data.get(idx + 1).copied().unwrap_or(s1);
            s1 + (s2 - s1) * frac
        })
        .collect()
}

/// Mittelt interleaved Kanäle zu Mono
fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Zielpuffer der Aufnahme: Downmix, Pegel, Resampling
struct CaptureSink {
    buffer: Arc<Mutex<HeapRb<f32>>>,
    muted: Arc<AtomicBool>,
    level: Arc<Mutex<f32>>,
    channels: usize,
    source_rate: u32,
}

impl CaptureSink {
    fn push(&self, data: &[f32]) {
        let mono = downmix(data, self.channels);
        if mono.is_empty() {
            return;
        }

        let rms: f32 = (mono.iter().map(|s| s * s).sum::<f32>() / mono.len() as f32).sqrt();
        *self.level.lock() = rms.min(1.0);

        if self.muted.load(Ordering::Relaxed) {
            return;
        }

        let samples = resample_linear(&mono, self.source_rate, SAMPLE_RATE);
        let mut buffer = self.buffer.lock();
        for sample in samples {
            let _ = buffer.try_push(sample);
        }
    }
}

/// Baut den Input-Stream für das Sample-Format des Geräts
fn build_capture_stream<T>(
    device: &Device,
    config: &StreamConfig,
    sink: CaptureSink,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let samples: Vec<f32> = data.iter().map(|&s| f32::from_sample(s)).collect();
            sink.push(&samples);
        },
        |err| {
            tracing::error!("Audio capture error: {}", err);
        },
        None,
    )
}

fn is_capturable(format: SampleFormat) -> bool {
    matches!(format, SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16)
}

/// Wählt die beste Konfiguration aus einer Liste
///
/// Priorität: 48kHz F32 > F32 mit höchster Rate > 48kHz I16/U16 > I16/U16
fn select_best_config(
    configs: Vec<SupportedStreamConfigRange>,
) -> Result<SupportedStreamConfig, MediaError> {
    let target_rate = cpal::SampleRate(SAMPLE_RATE);
    let supports_target = |c: &SupportedStreamConfigRange| {
        c.min_sample_rate() <= target_rate && c.max_sample_rate() >= target_rate
    };

    let tiers: [Vec<&SupportedStreamConfigRange>; 2] = [
        configs
            .iter()
            .filter(|c| c.sample_format() == SampleFormat::F32)
            .collect(),
        configs
            .iter()
            .filter(|c| c.sample_format() != SampleFormat::F32 && is_capturable(c.sample_format()))
            .collect(),
    ];

    for tier in tiers {
        if let Some(config) = tier.iter().copied().find(|&c| supports_target(c)) {
            return Ok(config.clone().with_sample_rate(target_rate));
        }
        if let Some(config) = tier.first().copied() {
            return Ok(config.clone().with_max_sample_rate());
        }
    }

    Err(MediaError::UnsupportedConfig(
        "No suitable audio configuration found".to_string(),
    ))
}

// ============================================================================
// TESTS
// ============================================================================
