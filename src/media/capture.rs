//! Capture Handle und Backend-Seam
//!
//! Ein `CaptureHandle` bündelt genau eine Audio- und eine Video-Spur.
//! Die Enabled-Flags werden in-place mutiert, das Gerät läuft weiter:
//! Stummschalten ist dadurch latenzfrei und braucht keine
//! Neuverhandlung. Release stoppt die Gerätestreams genau einmal.

use async_trait::async_trait;
use parking_lot::Mutex;
use ringbuf::{traits::*, HeapRb};
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Sample Rate (48kHz ist der Standard für beste Qualität)
pub const SAMPLE_RATE: u32 = 48000;

/// Frame Size in Samples (20ms @ 48kHz = 960 samples)
pub const FRAME_SIZE: usize = 960;

/// Kapazität des Audio-Ring-Buffers
pub(crate) const RING_BUFFER_SIZE: usize = FRAME_SIZE * 10;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("No audio input device found")]
    NoInputDevice,

    #[error("Unsupported capture configuration: {0}")]
    UnsupportedConfig(String),

    #[error("Failed to build capture stream: {0}")]
    StreamBuild(String),

    #[error("Failed to start capture stream: {0}")]
    StreamStart(String),
}

// ============================================================================
// TRACKS
// ============================================================================

/// Art einer lokalen Spur
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Lokale Spur mit unabhängig schaltbarem Enabled-Flag
///
/// Klonbar; Klone teilen sich das Flag, damit der Geräte-Callback den
/// aktuellen Zustand ohne Umweg lesen kann.
#[derive(Debug, Clone)]
pub struct Track {
    kind: TrackKind,
    id: String,
    enabled: Arc<Mutex<bool>>,
}

impl Track {
    pub fn new(kind: TrackKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            enabled: Arc::new(Mutex::new(true)),
        }
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_enabled(&self) -> bool {
        *self.enabled.lock()
    }

    pub fn set_enabled(&self, enabled: bool) {
        *self.enabled.lock() = enabled;
        tracing::debug!("{:?} track enabled: {}", self.kind, enabled);
    }
}

// ============================================================================
// CAPTURE GUARD
// ============================================================================

/// Stoppt die Gerätestreams hinter einem Handle
///
/// Wird beim Release genau einmal aufgerufen.
pub trait CaptureGuard: Send {
    fn stop(&mut self);
}

// ============================================================================
// CAPTURE HANDLE
// ============================================================================

/// Handle auf die lokale Audio+Video-Aufnahme
///
/// Pro Session existiert höchstens ein Handle. `release()` stoppt beide
/// Spuren genau einmal; jeder weitere Aufruf ist ein No-op, nie ein
/// Fehler. Drop räumt als Sicherheitsnetz ebenfalls auf.
pub struct CaptureHandle {
    audio: Track,
    video: Track,
    capture_buffer: Arc<Mutex<HeapRb<f32>>>,
    input_level: Arc<Mutex<f32>>,
    guard: Mutex<Option<Box<dyn CaptureGuard>>>,
}

impl CaptureHandle {
    pub fn new(
        audio: Track,
        video: Track,
        capture_buffer: Arc<Mutex<HeapRb<f32>>>,
        input_level: Arc<Mutex<f32>>,
        guard: Box<dyn CaptureGuard>,
    ) -> Self {
        Self {
            audio,
            video,
            capture_buffer,
            input_level,
            guard: Mutex::new(Some(guard)),
        }
    }

    pub fn audio(&self) -> &Track {
        &self.audio
    }

    pub fn video(&self) -> &Track {
        &self.video
    }

    pub fn track(&self, kind: TrackKind) -> &Track {
        match kind {
            TrackKind::Audio => &self.audio,
            TrackKind::Video => &self.video,
        }
    }

    /// Schaltet das Enabled-Flag einer Spur
    pub fn set_track_enabled(&self, kind: TrackKind, enabled: bool) {
        self.track(kind).set_enabled(enabled);
    }

    /// Aktueller Eingangspegel (0.0 - 1.0) für Visualisierung
    pub fn input_level(&self) -> f32 {
        *self.input_level.lock()
    }

    /// Liest einen Frame aufgenommenes Audio (48kHz mono), falls genug
    /// Samples im Buffer stehen
    pub fn read_audio_frame(&self) -> Option<Vec<f32>> {
        let mut buffer = self.capture_buffer.lock();
        if buffer.occupied_len() >= FRAME_SIZE {
            let mut frame = Vec::with_capacity(FRAME_SIZE);
            for _ in 0..FRAME_SIZE {
                if let Some(sample) = buffer.try_pop() {
                    frame.push(sample);
                }
            }
            Some(frame)
        } else {
            None
        }
    }

    /// Stoppt beide Spuren; idempotent
    pub fn release(&self) {
        if let Some(mut guard) = self.guard.lock().take() {
            guard.stop();
            tracing::info!("Capture released");
        }
    }

    pub fn is_released(&self) -> bool {
        self.guard.lock().is_none()
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for CaptureHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureHandle")
            .field("audio_enabled", &self.audio.is_enabled())
            .field("video_enabled", &self.video.is_enabled())
            .field("released", &self.is_released())
            .finish()
    }
}

// ============================================================================
// BACKEND SEAM
// ============================================================================

/// Beschafft die lokale Aufnahme
///
/// Die Beschaffung ist asynchron: der Aufrufer wird suspendiert, bis die
/// Plattform antwortet (Erfolg oder Ablehnung). Nebenwirkung eines
/// Erfolgs: die Geräte-Aktivitätsanzeige geht an.
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    async fn acquire(&self) -> Result<CaptureHandle, CaptureError>;
}

// ============================================================================
// TESTS
// ============================================================================
