//! Beam - P2P Video Call Engine
//!
//! Eine serverlose P2P Video-Call-Engine mit:
//! - Out-of-Band Signaling über teilbare Links (kein Server, kein Relay)
//! - WebRTC für die direkte Medienverbindung
//! - Lokaler Aufnahme mit spurweisem Mute ohne Neuverhandlung
//! - Expliziter Zustandsmaschine pro Anrufversuch
//!
//! ## Ablauf
//!
//! Der Initiator startet einen Anruf und bekommt einen Link; der Link
//! wird von Hand weitergegeben. Die Gegenseite liest ihn aus ihrer
//! Location, antwortet und reicht ihren eigenen Link zurück. Sobald die
//! Answer angewendet ist, baut die Verbindungs-Primitive den Transport
//! auf und die Remote-Medien werden veröffentlicht.

pub mod config;
pub mod media;
pub mod session;
pub mod signal;

pub use config::{CallConfig, IceServerConfig};
pub use media::{CaptureBackend, CaptureError, CaptureHandle, DeviceBackend, Track, TrackKind};
pub use session::{
    CallError, CallRole, CallSession, CallState, FailureReason, RemoteStream, SessionEvent,
};
pub use signal::{SignalError, SignalKind, SignalPayload};

/// Initialisiert das Logging
///
/// Default-Direktiven für die Entwicklung; `RUST_LOG` überschreibt.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("beam=debug".parse().unwrap())
                .add_directive("webrtc=warn".parse().unwrap()),
        )
        .init();
}
