//! Call Session - die Anruf-Zustandsmaschine
//!
//! Besitzt höchstens eine lebende Verbindungs-Primitive und ein
//! Capture-Handle. Intents kommen vom View-Layer; Transport-Events
//! werden von genau einer Pump-Task pro Versuch in Ankunftsreihenfolge
//! angewendet. Jeder Versuch trägt eine Epoche: Events bereits
//! abgebauter Transporte werden ignoriert, nie ein Absturz.

use super::state::{CallRole, CallState, FailureReason, SessionEvent};
use super::transport::{
    PeerTransport, RemoteStream, TransportError, TransportEvent, TransportFactory,
    TransportFailure,
};
use super::webrtc_peer::WebRtcFactory;
use crate::config::CallConfig;
use crate::media::{CaptureBackend, CaptureError, CaptureHandle, DeviceBackend, TrackKind};
use crate::signal::{self, SignalError, SignalPayload};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum CallError {
    #[error("Media capture unavailable: {0}")]
    Capture(#[from] CaptureError),

    #[error("Malformed incoming signal: {0}")]
    Signal(#[from] SignalError),

    #[error("No incoming signal to answer")]
    NoIncomingSignal,

    #[error("No active call")]
    NoActiveCall,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl CallError {
    /// Ordnet den Intent-Fehler der Failure-Taxonomie zu
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            CallError::Capture(_) => FailureReason::DeviceUnavailable,
            CallError::Signal(_) => FailureReason::MalformedSignal,
            CallError::NoIncomingSignal => FailureReason::NoIncomingSignal,
            CallError::NoActiveCall => FailureReason::TransportError,
            CallError::Transport(TransportError::InvalidSdp(_)) => FailureReason::MalformedSignal,
            CallError::Transport(_) => FailureReason::TransportError,
        }
    }
}

// ============================================================================
// CALL SESSION
// ============================================================================

/// Die Anruf-Zustandsmaschine
///
/// Klonbar; Klone teilen sich denselben Zustand, so wandert die Session
/// ohne weitere Verpackung in Tasks und Handler.
#[derive(Clone)]
pub struct CallSession {
    config: Arc<CallConfig>,
    media: Arc<dyn CaptureBackend>,
    transports: Arc<dyn TransportFactory>,

    state: Arc<Mutex<CallState>>,
    capture: Arc<Mutex<Option<Arc<CaptureHandle>>>>,
    transport: Arc<Mutex<Option<Arc<dyn PeerTransport>>>>,
    link: Arc<Mutex<Option<String>>>,
    remote: Arc<Mutex<Option<RemoteStream>>>,
    inbound: Arc<Mutex<Option<SignalPayload>>>,
    epoch: Arc<AtomicU64>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl CallSession {
    /// Erstellt eine Session über den gegebenen Backends
    pub fn new(
        config: CallConfig,
        media: Arc<dyn CaptureBackend>,
        transports: Arc<dyn TransportFactory>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(100);

        Self {
            config: Arc::new(config),
            media,
            transports,
            state: Arc::new(Mutex::new(CallState::Idle)),
            capture: Arc::new(Mutex::new(None)),
            transport: Arc::new(Mutex::new(None)),
            link: Arc::new(Mutex::new(None)),
            remote: Arc::new(Mutex::new(None)),
            inbound: Arc::new(Mutex::new(None)),
            epoch: Arc::new(AtomicU64::new(0)),
            event_tx,
        }
    }

    /// Session mit Geräte-Capture und WebRTC-Transport
    pub fn with_defaults(config: CallConfig) -> Self {
        let transports = Arc::new(WebRtcFactory::new(config.clone()));
        Self::new(config, Arc::new(DeviceBackend::new()), transports)
    }

    // ========================================================================
    // PUBLISHED STATE
    // ========================================================================

    /// Gibt einen Event-Receiver zurück
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Aktueller Zustand
    pub fn state(&self) -> CallState {
        *self.state.lock()
    }

    /// Zuletzt veröffentlichter Verbindungs-Link
    pub fn connection_link(&self) -> Option<String> {
        self.link.lock().clone()
    }

    /// Deskriptor der Remote-Medien, falls verbunden
    pub fn remote_stream(&self) -> Option<RemoteStream> {
        self.remote.lock().clone()
    }

    /// Enabled-Flag der Audio-Spur (true, solange keine Aufnahme existiert)
    pub fn audio_enabled(&self) -> bool {
        self.capture
            .lock()
            .as_ref()
            .map(|c| c.audio().is_enabled())
            .unwrap_or(true)
    }

    /// Enabled-Flag der Video-Spur (true, solange keine Aufnahme existiert)
    pub fn video_enabled(&self) -> bool {
        self.capture
            .lock()
            .as_ref()
            .map(|c| c.video().is_enabled())
            .unwrap_or(true)
    }

    // ========================================================================
    // INBOUND SIGNAL
    // ========================================================================

    /// Liest das eingehende Signal aus einer Location
    ///
    /// Wird einmal beim Session-Start gelesen. Abwesenheit heißt "kein
    /// eingehender Anruf" und ist kein Fehler; nur ein vorhandener, aber
    /// unlesbarer Parameter schlägt fehl.
    pub fn load_incoming(&self, location: &str) -> Result<bool, SignalError> {
        let payload = signal::extract_from_location(location)?;
        let present = payload.is_some();
        *self.inbound.lock() = payload;
        Ok(present)
    }

    /// Hinterlegt ein bereits dekodiertes eingehendes Signal
    pub fn set_incoming(&self, payload: SignalPayload) {
        *self.inbound.lock() = Some(payload);
    }

    // ========================================================================
    // INTENTS
    // ========================================================================

    /// Startet einen ausgehenden Anruf (Initiator)
    pub async fn start_call(&self) -> Result<(), CallError> {
        self.begin(CallRole::Initiator, None).await
    }

    /// Beantwortet einen eingehenden Anruf (Responder)
    ///
    /// Schlägt mit `NoIncomingSignal` fehl, bevor irgendeine Ressource
    /// beschafft wird, wenn kein Signal hinterlegt ist; eine laufende
    /// Session bleibt in dem Fall unberührt.
    pub async fn answer_call(&self) -> Result<(), CallError> {
        let inbound = self.inbound.lock().take();
        let inbound = match inbound {
            Some(payload) => payload,
            None => return Err(CallError::NoIncomingSignal),
        };

        self.begin(CallRole::Responder, Some(inbound)).await
    }

    /// Wendet das Signal der Gegenseite auf die laufende Verhandlung an
    /// (die Answer beim Initiator, spätere Schritte in-band)
    pub async fn apply_remote_signal(&self, payload: SignalPayload) -> Result<(), CallError> {
        let transport = self.transport.lock().clone();
        let transport = transport.ok_or(CallError::NoActiveCall)?;

        if let Err(e) = transport.apply_remote(payload).await {
            let err = CallError::Transport(e);
            self.fail(err.failure_reason(), err.to_string());
            return Err(err);
        }

        Ok(())
    }

    /// Liest das Signal aus einem zurückgereichten Link und wendet es an
    pub async fn apply_remote_location(&self, location: &str) -> Result<(), CallError> {
        let payload = signal::extract_from_location(location)?;
        let payload = payload.ok_or(CallError::NoIncomingSignal)?;
        self.apply_remote_signal(payload).await
    }

    /// Beendet den aktuellen Anruf
    ///
    /// No-op aus Idle, Ended und Failed heraus: kein Event, kein Fehler.
    pub fn end_call(&self) {
        if !self.state().is_active() {
            return;
        }

        tracing::info!("Ending call");
        self.teardown();
        self.set_state(CallState::Ended);
    }

    /// Schaltet die Audio-Spur; reine Flag-Mutation, kein Übergang
    pub fn set_audio_enabled(&self, enabled: bool) {
        if let Some(capture) = self.capture.lock().as_ref() {
            capture.set_track_enabled(TrackKind::Audio, enabled);
        }
    }

    /// Schaltet die Video-Spur; reine Flag-Mutation, kein Übergang
    pub fn set_video_enabled(&self, enabled: bool) {
        if let Some(capture) = self.capture.lock().as_ref() {
            capture.set_track_enabled(TrackKind::Video, enabled);
        }
    }

    // ========================================================================
    // PRIVATE METHODS
    // ========================================================================

    /// Gemeinsamer Pfad von start_call und answer_call
    async fn begin(
        &self,
        role: CallRole,
        inbound: Option<SignalPayload>,
    ) -> Result<(), CallError> {
        // Höchstens eine lebende Verbindung: aktiven Versuch zuerst abbauen
        if self.state().is_active() {
            tracing::info!("Tearing down active attempt before starting a new one");
            self.teardown();
        }

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;

        self.set_state(CallState::AcquiringMedia);

        let handle = match self.media.acquire().await {
            Ok(handle) => Arc::new(handle),
            Err(e) => {
                self.set_state(CallState::Failed(FailureReason::DeviceUnavailable));
                self.emit(SessionEvent::Error(e.to_string()));
                return Err(CallError::Capture(e));
            }
        };
        *self.capture.lock() = Some(Arc::clone(&handle));
        self.emit(SessionEvent::CaptureAcquired);
        self.set_state(CallState::MediaReady);

        // Event-Pump für diesen Versuch
        let (tx, mut rx) = mpsc::channel(32);
        let session = self.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                session.apply_transport_event(epoch, event);
            }
        });

        let transport = match self.transports.create(role, Arc::clone(&handle), tx).await {
            Ok(transport) => transport,
            Err(e) => {
                let err = CallError::Transport(e);
                self.fail(err.failure_reason(), err.to_string());
                return Err(err);
            }
        };
        *self.transport.lock() = Some(Arc::clone(&transport));
        self.set_state(CallState::Negotiating(role));

        // Responder: eingehendes Offer sofort anwenden; das löst die
        // Answer-Emission aus
        if let Some(payload) = inbound {
            if let Err(e) = transport.apply_remote(payload).await {
                let err = CallError::Transport(e);
                self.fail(err.failure_reason(), err.to_string());
                return Err(err);
            }
        }

        Ok(())
    }

    /// Aktualisiert den Zustand und meldet das Event
    fn set_state(&self, new_state: CallState) {
        *self.state.lock() = new_state;
        self.emit(SessionEvent::StateChanged(new_state));
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Stoppt die Aufnahme, falls vorhanden
    fn release_capture(&self) {
        if let Some(capture) = self.capture.lock().take() {
            capture.release();
            self.emit(SessionEvent::CaptureReleased);
        }
    }

    /// Baut Transport und Aufnahme ab und entwertet laufende Pumps
    fn teardown(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);

        if let Some(transport) = self.transport.lock().take() {
            // Schließen darf den Aufrufer nicht blockieren
            tokio::spawn(async move {
                transport.close().await;
            });
        }

        self.release_capture();

        self.link.lock().take();
        self.remote.lock().take();
        self.inbound.lock().take();
    }

    /// Endgültiger Fehlschlag: Ressourcen freigeben, Zustand setzen
    fn fail(&self, reason: FailureReason, detail: String) {
        tracing::error!("Call attempt failed: {}", detail);
        self.teardown();
        self.set_state(CallState::Failed(reason));
        self.emit(SessionEvent::Error(detail));
    }

    /// Wendet ein Transport-Event an; Events entwerteter Epochen werden
    /// ignoriert
    fn apply_transport_event(&self, epoch: u64, event: TransportEvent) {
        if self.epoch.load(Ordering::SeqCst) != epoch {
            tracing::debug!("Ignoring transport event from torn-down attempt");
            return;
        }

        match event {
            TransportEvent::LocalSignal(payload) => {
                // Jeder lokale Verhandlungsschritt ersetzt den Link
                let link = signal::connection_link(&self.config.link_base, &payload);
                *self.link.lock() = Some(link.clone());
                self.emit(SessionEvent::LinkReady(link));
            }

            TransportEvent::RemoteMedia(stream) => {
                let state = self.state();
                match state {
                    CallState::Negotiating(_) => {
                        *self.remote.lock() = Some(stream.clone());
                        self.set_state(CallState::Connected);
                        self.emit(SessionEvent::RemoteMedia(stream));
                    }
                    CallState::Connected => {
                        // Nachzügler-Tracks schreiben nur den Deskriptor fort
                        *self.remote.lock() = Some(stream.clone());
                        self.emit(SessionEvent::RemoteMedia(stream));
                    }
                    _ => {
                        tracing::debug!("Dropping remote media in state {:?}", state);
                    }
                }
            }

            TransportEvent::Failed(failure) => {
                if self.state().is_terminal() {
                    return;
                }
                let (reason, detail) = match failure {
                    TransportFailure::Timeout => (
                        FailureReason::ConnectionTimeout,
                        "peer unreachable: transport establishment timed out".to_string(),
                    ),
                    TransportFailure::Lost(msg) => (FailureReason::TransportError, msg),
                };
                self.fail(reason, detail);
            }
        }
    }
}

impl std::fmt::Debug for CallSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSession")
            .field("state", &self.state())
            .field("audio_enabled", &self.audio_enabled())
            .field("video_enabled", &self.video_enabled())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{CaptureGuard, Track};
    use crate::signal::SignalKind;
    use async_trait::async_trait;
    use ringbuf::{traits::*, HeapRb};
    use std::sync::atomic::AtomicUsize;
    use tokio::time::{sleep, timeout, Duration};
    use uuid::Uuid;

    // ------------------------------------------------------------------
    // Stub Capture Backend
    // ------------------------------------------------------------------

    struct StubGuard {
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl CaptureGuard for StubGuard {
        fn stop(&mut self) {
            self.log.lock().push("release");
        }
    }

    struct StubCapture {
        log: Arc<Mutex<Vec<&'static str>>>,
        acquired: Arc<AtomicUsize>,
        fail: bool,
    }

    impl StubCapture {
        fn new() -> Self {
            Self {
                log: Arc::new(Mutex::new(Vec::new())),
                acquired: Arc::new(AtomicUsize::new(0)),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl CaptureBackend for StubCapture {
        async fn acquire(&self) -> Result<CaptureHandle, CaptureError> {
            if self.fail {
                return Err(CaptureError::NoInputDevice);
            }

            self.acquired.fetch_add(1, Ordering::SeqCst);
            self.log.lock().push("acquire");

            Ok(CaptureHandle::new(
                Track::new(TrackKind::Audio, "audio"),
                Track::new(TrackKind::Video, "video"),
                Arc::new(Mutex::new(HeapRb::new(64))),
                Arc::new(Mutex::new(0.0)),
                Box::new(StubGuard {
                    log: Arc::clone(&self.log),
                }),
            ))
        }
    }

    // ------------------------------------------------------------------
    // Stub Transport
    //
    // Verhält sich wie eine sofort verhandelnde Primitive: der Initiator
    // bekommt beim Erstellen direkt ein Offer; ein angewendetes Offer
    // erzeugt die Answer; eine angewendete Answer liefert Remote-Medien.
    // ------------------------------------------------------------------

    struct StubTransport {
        events: mpsc::Sender<TransportEvent>,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PeerTransport for StubTransport {
        async fn apply_remote(&self, payload: SignalPayload) -> Result<(), TransportError> {
            match payload.kind {
                SignalKind::Offer => {
                    let answer = SignalPayload::answer(
                        format!("v=0 stub answer to [{}]", payload.sdp),
                        payload.session_id,
                    );
                    let _ = self.events.send(TransportEvent::LocalSignal(answer)).await;
                }
                SignalKind::Answer => {
                    let stream = RemoteStream {
                        id: payload.session_id.to_string(),
                        has_audio: true,
                        has_video: true,
                    };
                    let _ = self.events.send(TransportEvent::RemoteMedia(stream)).await;
                }
            }
            Ok(())
        }

        async fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct StubFactory {
        senders: Arc<Mutex<Vec<mpsc::Sender<TransportEvent>>>>,
        closed: Arc<AtomicUsize>,
    }

    impl StubFactory {
        fn new() -> Self {
            Self {
                senders: Arc::new(Mutex::new(Vec::new())),
                closed: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl TransportFactory for StubFactory {
        async fn create(
            &self,
            role: CallRole,
            _capture: Arc<CaptureHandle>,
            events: mpsc::Sender<TransportEvent>,
        ) -> Result<Arc<dyn PeerTransport>, TransportError> {
            if role == CallRole::Initiator {
                let offer =
                    SignalPayload::offer("v=0 stub offer".to_string(), Uuid::new_v4());
                let _ = events.send(TransportEvent::LocalSignal(offer)).await;
            }

            self.senders.lock().push(events.clone());

            Ok(Arc::new(StubTransport {
                events,
                closed: Arc::clone(&self.closed),
            }))
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn stub_session() -> (CallSession, Arc<StubCapture>, Arc<StubFactory>) {
        let capture = Arc::new(StubCapture::new());
        let factory = Arc::new(StubFactory::new());
        let session = CallSession::new(
            CallConfig::default(),
            Arc::clone(&capture) as Arc<dyn CaptureBackend>,
            Arc::clone(&factory) as Arc<dyn TransportFactory>,
        );
        (session, capture, factory)
    }

    async fn wait_for(
        rx: &mut broadcast::Receiver<SessionEvent>,
        pred: impl Fn(&SessionEvent) -> bool,
    ) -> SessionEvent {
        timeout(Duration::from_secs(2), async {
            loop {
                let event = rx.recv().await.expect("event channel closed");
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for session event")
    }

    // ------------------------------------------------------------------
    // Tests
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_start_call_negotiates_and_publishes_link() {
        let (session, _, _) = stub_session();
        let mut rx = session.subscribe();

        session.start_call().await.unwrap();
        assert_eq!(session.state(), CallState::Negotiating(CallRole::Initiator));

        let event = wait_for(&mut rx, |e| matches!(e, SessionEvent::LinkReady(_))).await;
        let SessionEvent::LinkReady(link) = event else {
            unreachable!()
        };
        assert!(!link.is_empty());
        assert_eq!(session.connection_link(), Some(link));
    }

    #[tokio::test]
    async fn test_full_handshake_connects_initiator() {
        let (caller, _, _) = stub_session();
        let (callee, _, _) = stub_session();
        let mut caller_rx = caller.subscribe();
        let mut callee_rx = callee.subscribe();

        // Initiator startet und veröffentlicht seinen Link
        caller.start_call().await.unwrap();
        wait_for(&mut caller_rx, |e| matches!(e, SessionEvent::LinkReady(_))).await;
        let offer_link = caller.connection_link().unwrap();

        // Responder liest den Link und antwortet
        assert!(callee.load_incoming(&offer_link).unwrap());
        callee.answer_call().await.unwrap();
        assert_eq!(callee.state(), CallState::Negotiating(CallRole::Responder));

        wait_for(&mut callee_rx, |e| matches!(e, SessionEvent::LinkReady(_))).await;
        let answer_link = callee.connection_link().unwrap();
        assert!(!answer_link.is_empty());

        // Die zurückgereichte Answer verbindet den Initiator
        caller.apply_remote_location(&answer_link).await.unwrap();
        wait_for(&mut caller_rx, |e| {
            matches!(e, SessionEvent::StateChanged(CallState::Connected))
        })
        .await;

        assert_eq!(caller.state(), CallState::Connected);
        let stream = caller.remote_stream().unwrap();
        assert!(stream.has_audio);
        assert!(stream.has_video);
    }

    #[tokio::test]
    async fn test_answer_without_incoming_signal_fails() {
        let (session, capture, _) = stub_session();

        let err = session.answer_call().await.unwrap_err();
        assert!(matches!(err, CallError::NoIncomingSignal));

        // Keine Ressource beschafft, kein Zustand verändert
        assert_eq!(capture.acquired.load(Ordering::SeqCst), 0);
        assert_eq!(session.state(), CallState::Idle);
    }

    #[tokio::test]
    async fn test_toggling_tracks_never_changes_state() {
        let (session, _, _) = stub_session();
        session.start_call().await.unwrap();
        let state_before = session.state();

        session.set_audio_enabled(false);
        session.set_video_enabled(false);
        session.set_audio_enabled(true);

        assert_eq!(session.state(), state_before);
        assert!(session.audio_enabled());
        assert!(!session.video_enabled());
    }

    #[tokio::test]
    async fn test_end_call_in_idle_is_noop() {
        let (session, _, _) = stub_session();
        let mut rx = session.subscribe();

        session.end_call();

        assert_eq!(session.state(), CallState::Idle);
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_end_call_releases_and_is_idempotent() {
        let (session, capture, factory) = stub_session();
        session.start_call().await.unwrap();

        session.end_call();
        assert_eq!(session.state(), CallState::Ended);
        assert!(session.connection_link().is_none());
        assert!(session.remote_stream().is_none());

        // Zweites Ende: No-op
        session.end_call();
        assert_eq!(session.state(), CallState::Ended);

        // Genau ein Release, genau ein Close
        sleep(Duration::from_millis(50)).await;
        assert_eq!(capture.log.lock().iter().filter(|s| **s == "release").count(), 1);
        assert_eq!(factory.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_restart_releases_before_reacquiring() {
        let (session, capture, _) = stub_session();

        session.start_call().await.unwrap();
        session.start_call().await.unwrap();

        assert_eq!(session.state(), CallState::Negotiating(CallRole::Initiator));
        assert_eq!(
            *capture.log.lock(),
            vec!["acquire", "release", "acquire"]
        );
    }

    #[tokio::test]
    async fn test_device_unavailable_fails_attempt() {
        let factory = Arc::new(StubFactory::new());
        let session = CallSession::new(
            CallConfig::default(),
            Arc::new(StubCapture::failing()),
            factory,
        );

        let err = session.start_call().await.unwrap_err();
        assert!(matches!(err, CallError::Capture(_)));
        assert_eq!(
            session.state(),
            CallState::Failed(FailureReason::DeviceUnavailable)
        );
    }

    #[tokio::test]
    async fn test_late_events_after_end_are_ignored() {
        let (session, _, factory) = stub_session();
        session.start_call().await.unwrap();

        let sender = factory.senders.lock().last().cloned().unwrap();
        session.end_call();

        // Nachzügler vom bereits abgebauten Transport
        let _ = sender
            .send(TransportEvent::RemoteMedia(RemoteStream {
                id: "stale".to_string(),
                has_audio: true,
                has_video: false,
            }))
            .await;
        sleep(Duration::from_millis(50)).await;

        assert_eq!(session.state(), CallState::Ended);
        assert!(session.remote_stream().is_none());
    }

    #[tokio::test]
    async fn test_transport_failure_reaches_failed_state() {
        let (session, capture, factory) = stub_session();
        let mut rx = session.subscribe();
        session.start_call().await.unwrap();

        let sender = factory.senders.lock().last().cloned().unwrap();
        let _ = sender
            .send(TransportEvent::Failed(TransportFailure::Timeout))
            .await;

        wait_for(&mut rx, |e| {
            matches!(
                e,
                SessionEvent::StateChanged(CallState::Failed(
                    FailureReason::ConnectionTimeout
                ))
            )
        })
        .await;

        // Kein hängengebliebenes Capture-Handle
        assert_eq!(capture.log.lock().iter().filter(|s| **s == "release").count(), 1);
    }
}
