//! Session Module - die Anruf-Zustandsmaschine
//!
//! Dieses Modul verwaltet den Lebenszyklus eines Anrufversuchs:
//! - Explizite Zustände von Idle bis Connected/Ended/Failed
//! - Initiator- und Responder-Verhandlung über den Transport-Seam
//! - WebRTC-Implementierung der Verbindungs-Primitive
//! - Teardown mit Epochen gegen Nachzügler-Events

mod engine;
mod state;
mod transport;
mod webrtc_peer;

pub use engine::{CallError, CallSession};
pub use state::{CallRole, CallState, FailureReason, SessionEvent};
pub use transport::{
    PeerTransport, RemoteStream, TransportError, TransportEvent, TransportFactory,
    TransportFailure,
};
pub use webrtc_peer::{WebRtcFactory, WebRtcTransport};
