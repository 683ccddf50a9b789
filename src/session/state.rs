//! Session State - Zustände, Rollen und Events

use super::transport::RemoteStream;

// ============================================================================
// ROLES
// ============================================================================

/// Rolle in der Zwei-Parteien-Verhandlung
///
/// Der Initiator schlägt vor, der Responder antwortet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallRole {
    Initiator,
    Responder,
}

// ============================================================================
// FAILURE TAXONOMY
// ============================================================================

/// Grund eines endgültigen Fehlschlags
///
/// Die Unterscheidung trägt bis ins Frontend: "kein Mikrofon" ist etwas
/// anderes als "kaputter Link" oder "Peer nicht erreichbar".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Aufnahme verweigert oder kein Gerät vorhanden
    DeviceUnavailable,
    /// Eingehender Payload unlesbar oder strukturell ungültig
    MalformedSignal,
    /// Antworten versucht, ohne dass ein Signal vorlag
    NoIncomingSignal,
    /// Transportaufbau kam nie zustande
    ConnectionTimeout,
    /// Transport nach dem Aufbau gescheitert
    TransportError,
}

// ============================================================================
// CALL STATE
// ============================================================================

/// Zustand einer Call-Session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Kein Anrufversuch
    Idle,
    /// Lokale Aufnahme wird beschafft
    AcquiringMedia,
    /// Aufnahme steht, Verhandlung noch nicht gestartet
    MediaReady,
    /// Verhandlung läuft
    Negotiating(CallRole),
    /// Remote-Medien sind da
    Connected,
    /// Explizit beendet
    Ended,
    /// Endgültig gescheitert
    Failed(FailureReason),
}

impl CallState {
    /// Kurzer Name für das Frontend
    pub fn label(&self) -> &'static str {
        match self {
            CallState::Idle => "idle",
            CallState::AcquiringMedia => "acquiring_media",
            CallState::MediaReady => "media_ready",
            CallState::Negotiating(CallRole::Initiator) => "negotiating_initiator",
            CallState::Negotiating(CallRole::Responder) => "negotiating_responder",
            CallState::Connected => "connected",
            CallState::Ended => "ended",
            CallState::Failed(_) => "failed",
        }
    }

    /// Terminal: von hier gibt es keine Übergänge mehr
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Ended | CallState::Failed(_))
    }

    /// Lebt in diesem Zustand ein Transport bzw. eine Aufnahme?
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            CallState::AcquiringMedia
                | CallState::MediaReady
                | CallState::Negotiating(_)
                | CallState::Connected
        )
    }
}

// ============================================================================
// SESSION EVENTS
// ============================================================================

/// Events, die von der Session ausgelöst werden
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(CallState),
    /// Neuer Verbindungs-Link; jeder lokale Verhandlungsschritt ersetzt ihn
    LinkReady(String),
    /// Remote-Medien angekommen bzw. Deskriptor fortgeschrieben
    RemoteMedia(RemoteStream),
    /// Lokale Aufnahme beschafft
    CaptureAcquired,
    /// Lokale Aufnahme gestoppt
    CaptureReleased,
    /// Fehlerdetail für die Anzeige
    Error(String),
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_distinct_per_role() {
        assert_ne!(
            CallState::Negotiating(CallRole::Initiator).label(),
            CallState::Negotiating(CallRole::Responder).label()
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(CallState::Ended.is_terminal());
        assert!(CallState::Failed(FailureReason::DeviceUnavailable).is_terminal());
        assert!(!CallState::Connected.is_terminal());
        assert!(!CallState::Idle.is_terminal());
    }

    #[test]
    fn test_idle_and_terminal_are_not_active() {
        assert!(!CallState::Idle.is_active());
        assert!(!CallState::Ended.is_active());
        assert!(!CallState::Failed(FailureReason::TransportError).is_active());
        assert!(CallState::Negotiating(CallRole::Initiator).is_active());
    }
}
