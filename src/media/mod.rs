//! Media Module - Lokale Aufnahme
//!
//! Dieses Modul verwaltet die lokale Audio/Video-Aufnahme:
//! - `CaptureHandle` mit genau einer Audio- und einer Video-Spur
//! - Enabled-Flags pro Spur, schaltbar ohne Neuverhandlung
//! - Idempotentes Release der Gerätestreams
//! - `DeviceBackend` über cpal für Mikrofon-Capture

mod capture;
mod device;

pub use capture::{
    CaptureBackend, CaptureError, CaptureGuard, CaptureHandle, Track, TrackKind, FRAME_SIZE,
    SAMPLE_RATE,
};
pub use device::{DeviceBackend, InputDevice};
