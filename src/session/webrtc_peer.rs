//! WebRTC Transport - Verbindungs-Primitive über webrtc-rs
//!
//! Non-Trickle-Verhandlung für den Link-Austausch: vor dem Melden eines
//! lokalen Payloads wird zeitbegrenzt auf das ICE Gathering gewartet,
//! damit die Kandidaten im SDP stecken. Pro Richtung genügt dann ein
//! einziger Link.

use super::state::CallRole;
use super::transport::{
    PeerTransport, RemoteStream, TransportError, TransportEvent, TransportFactory,
    TransportFailure,
};
use crate::config::CallConfig;
use crate::media::{CaptureHandle, SAMPLE_RATE};
use crate::signal::{SignalKind, SignalPayload};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::TrackLocal;

// ============================================================================
// FACTORY
// ============================================================================

/// Baut Verbindungs-Primitiven über RTCPeerConnection
pub struct WebRtcFactory {
    config: CallConfig,
}

impl WebRtcFactory {
    pub fn new(config: CallConfig) -> Self {
        Self { config }
    }

    /// Erstellt eine neue Peer Connection
    async fn build_peer_connection(&self) -> Result<Arc<RTCPeerConnection>, TransportError> {
        // Media Engine mit Default-Codecs konfigurieren
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| TransportError::Setup(e.to_string()))?;

        // Interceptors für RTCP, NACK etc.
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| TransportError::Setup(e.to_string()))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: self.config.rtc_ice_servers(),
            ..Default::default()
        };

        let pc = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .map_err(|e| TransportError::Setup(e.to_string()))?,
        );

        Ok(pc)
    }

    /// Registriert die Event Handler der Peer Connection
    fn register_handlers(
        pc: &Arc<RTCPeerConnection>,
        session_id: Uuid,
        events: mpsc::Sender<TransportEvent>,
    ) {
        // Remote-Medien: Tracks treffen einzeln ein; der Deskriptor wird
        // pro Track fortgeschrieben und erneut gemeldet
        let remote: Arc<Mutex<Option<RemoteStream>>> = Arc::new(Mutex::new(None));
        let events_track = events.clone();
        pc.on_track(Box::new(move |track, _, _| {
            tracing::info!("Received remote track: {:?}", track.kind());

            let stream = {
                let mut slot = remote.lock();
                let entry = slot.get_or_insert_with(|| RemoteStream {
                    id: session_id.to_string(),
                    has_audio: false,
                    has_video: false,
                });
                match track.kind() {
                    RTPCodecType::Audio => entry.has_audio = true,
                    RTPCodecType::Video => entry.has_video = true,
                    _ => {}
                }
                entry.clone()
            };

            let events = events_track.clone();
            Box::pin(async move {
                let _ = events.send(TransportEvent::RemoteMedia(stream)).await;
            })
        }));

        // Verbindungszustand: ob Timeout oder Abriss gemeldet wird,
        // entscheidet sich daran, ob Connected je erreicht war
        let was_connected = Arc::new(AtomicBool::new(false));
        pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
            tracing::info!("Peer connection state: {:?}", st);

            let failure = match st {
                RTCPeerConnectionState::Connected => {
                    was_connected.store(true, Ordering::SeqCst);
                    None
                }
                RTCPeerConnectionState::Failed | RTCPeerConnectionState::Disconnected => {
                    if was_connected.load(Ordering::SeqCst) {
                        Some(TransportFailure::Lost(format!("peer connection {:?}", st)))
                    } else {
                        Some(TransportFailure::Timeout)
                    }
                }
                _ => None,
            };

            if let Some(failure) = failure {
                let events = events.clone();
                return Box::pin(async move {
                    let _ = events.send(TransportEvent::Failed(failure)).await;
                });
            }

            Box::pin(async {})
        }));
    }
}

#[async_trait]
impl TransportFactory for WebRtcFactory {
    async fn create(
        &self,
        role: CallRole,
        capture: Arc<CaptureHandle>,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Arc<dyn PeerTransport>, TransportError> {
        let pc = self.build_peer_connection().await?;
        let session_id = Uuid::new_v4();

        // Lokale Spuren anmelden; die IDs kommen vom Capture-Handle
        let audio_track = Arc::new(TrackLocalStaticRTP::new(
            RTCRtpCodecCapability {
                mime_type: "audio/opus".to_string(),
                clock_rate: SAMPLE_RATE,
                channels: 1,
                ..Default::default()
            },
            capture.audio().id().to_string(),
            "beam".to_string(),
        ));
        pc.add_track(Arc::clone(&audio_track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| TransportError::Setup(e.to_string()))?;

        let video_track = Arc::new(TrackLocalStaticRTP::new(
            RTCRtpCodecCapability {
                mime_type: "video/VP8".to_string(),
                clock_rate: 90000,
                ..Default::default()
            },
            capture.video().id().to_string(),
            "beam".to_string(),
        ));
        pc.add_track(Arc::clone(&video_track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| TransportError::Setup(e.to_string()))?;

        // TODO: Sample-Zulieferung aus dem Capture-Buffer in die RTP-Spuren,
        // sobald der Opus/VP8-Encode-Pfad verfügbar ist

        Self::register_handlers(&pc, session_id, events.clone());

        let transport = Arc::new(WebRtcTransport {
            pc,
            session_id,
            events,
            gather_timeout: self.config.gather_timeout,
        });

        // Der Initiator eröffnet sofort; der Responder verhandelt erst,
        // wenn das eingehende Offer angewendet wird
        if role == CallRole::Initiator {
            transport
                .publish_local(SignalKind::Offer, transport.session_id)
                .await?;
        }

        Ok(transport)
    }
}

// ============================================================================
// TRANSPORT
// ============================================================================

/// Verbindungs-Primitive über RTCPeerConnection
pub struct WebRtcTransport {
    pc: Arc<RTCPeerConnection>,
    session_id: Uuid,
    events: mpsc::Sender<TransportEvent>,
    gather_timeout: Duration,
}

impl WebRtcTransport {
    /// Erzeugt den lokalen Verhandlungsschritt und meldet ihn als Event
    ///
    /// Das Gathering-Promise muss vor set_local_description geholt
    /// werden. Gewartet wird zeitbegrenzt: ein langsamer Gatherer darf
    /// die Link-Erzeugung nicht blockieren.
    async fn publish_local(
        &self,
        kind: SignalKind,
        session_id: Uuid,
    ) -> Result<(), TransportError> {
        let mut gather_complete = self.pc.gathering_complete_promise().await;

        let desc = match kind {
            SignalKind::Offer => self.pc.create_offer(None).await,
            SignalKind::Answer => self.pc.create_answer(None).await,
        }
        .map_err(|e| TransportError::Webrtc(e.to_string()))?;

        self.pc
            .set_local_description(desc)
            .await
            .map_err(|e| TransportError::Webrtc(e.to_string()))?;

        if tokio::time::timeout(self.gather_timeout, gather_complete.recv())
            .await
            .is_err()
        {
            tracing::debug!("ICE gathering timeout after {:?}", self.gather_timeout);
        }

        let local = self.pc.local_description().await.ok_or_else(|| {
            TransportError::Webrtc("no local description after negotiation".to_string())
        })?;

        let payload = match kind {
            SignalKind::Offer => SignalPayload::offer(local.sdp, session_id),
            SignalKind::Answer => SignalPayload::answer(local.sdp, session_id),
        };

        if self
            .events
            .send(TransportEvent::LocalSignal(payload))
            .await
            .is_err()
        {
            tracing::debug!("Session dropped the event channel");
        }

        Ok(())
    }
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    async fn apply_remote(&self, payload: SignalPayload) -> Result<(), TransportError> {
        match payload.kind {
            SignalKind::Offer => {
                let offer = RTCSessionDescription::offer(payload.sdp)
                    .map_err(|e| TransportError::InvalidSdp(e.to_string()))?;
                self.pc
                    .set_remote_description(offer)
                    .await
                    .map_err(|e| TransportError::InvalidSdp(e.to_string()))?;

                // Die Answer ist der eigene Verhandlungsschritt; sie
                // übernimmt die Session-ID der Gegenseite
                self.publish_local(SignalKind::Answer, payload.session_id)
                    .await
            }
            SignalKind::Answer => {
                let answer = RTCSessionDescription::answer(payload.sdp)
                    .map_err(|e| TransportError::InvalidSdp(e.to_string()))?;
                self.pc
                    .set_remote_description(answer)
                    .await
                    .map_err(|e| TransportError::InvalidSdp(e.to_string()))?;
                Ok(())
            }
        }
    }

    async fn close(&self) {
        if let Err(e) = self.pc.close().await {
            tracing::warn!("Error closing peer connection: {}", e);
        }
    }
}
