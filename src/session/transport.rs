//! Transport-Seam - die Verbindungs-Primitive hinter einem Trait
//!
//! Die Session kennt nur dieses Interface. Dahinter stehen die echte
//! webrtc-Implementierung und die Stubs der Tests. ICE/DTLS-Mechanik
//! ist ausdrücklich Sache der Primitive.

use super::state::CallRole;
use crate::media::CaptureHandle;
use crate::signal::SignalPayload;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to set up peer connection: {0}")]
    Setup(String),

    #[error("Invalid SDP in signal payload: {0}")]
    InvalidSdp(String),

    #[error("WebRTC error: {0}")]
    Webrtc(String),
}

/// Endgültiger Fehlschlag des Transports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFailure {
    /// Aufbau kam nie zustande
    Timeout,
    /// Bestehende Verbindung abgerissen
    Lost(String),
}

// ============================================================================
// REMOTE STREAM
// ============================================================================

/// Remote-Medien als leichter Deskriptor
///
/// Die Session hält den Stream nur als Beschreibung; den Medienpfad
/// besitzt der Transport. Dadurch bleibt die Zustandsmaschine frei von
/// Primitive-Typen und mit Stubs testbar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStream {
    pub id: String,
    pub has_audio: bool,
    pub has_video: bool,
}

// ============================================================================
// TRANSPORT EVENTS
// ============================================================================

/// Events der Verbindungs-Primitive
///
/// Werden von der Session strikt in Ankunftsreihenfolge konsumiert.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Lokaler Verhandlungsschritt; null oder mehr pro Versuch
    LocalSignal(SignalPayload),
    /// Remote-Medien angekommen
    RemoteMedia(RemoteStream),
    /// Transport endgültig gescheitert
    Failed(TransportFailure),
}

// ============================================================================
// TRAITS
// ============================================================================

/// Laufende Verbindungs-Primitive
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Wendet einen Remote-Payload an: das Offer beim Responder, die
    /// Answer beim Initiator, spätere Schritte in-band
    async fn apply_remote(&self, payload: SignalPayload) -> Result<(), TransportError>;

    /// Zerstört die Verbindung; idempotent
    async fn close(&self);
}

/// Baut Verbindungs-Primitiven
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Erstellt eine Primitive für die Rolle und beginnt die Verhandlung;
    /// Events gehen an den übergebenen Kanal
    async fn create(
        &self,
        role: CallRole,
        capture: Arc<CaptureHandle>,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Arc<dyn PeerTransport>, TransportError>;
}
