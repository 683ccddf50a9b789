//! Konfiguration
//!
//! Sammelt die Einstellungen einer Call-Session: die Basis-URL für
//! Verbindungs-Links, die STUN/TURN-Server für die Transport-Verhandlung
//! und das Zeitlimit für das ICE Gathering.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;
use webrtc::ice_transport::ice_server::RTCIceServer;

// ============================================================================
// DEFAULTS
// ============================================================================

/// Default-Basis für Verbindungs-Links
static DEFAULT_LINK_BASE: Lazy<Url> =
    Lazy::new(|| Url::parse("https://beam.local/call").expect("default link base is valid"));

/// Wartezeit auf ICE Gathering, bevor der Link veröffentlicht wird
///
/// Ohne Trickle-ICE müssen die Kandidaten im SDP stecken; ein langsamer
/// Gatherer darf die Link-Erzeugung aber nicht unbegrenzt blockieren.
pub const DEFAULT_GATHER_TIMEOUT: Duration = Duration::from_millis(2500);

/// Standard STUN Server (kostenlos, für ~90% der Verbindungen)
pub fn default_ice_servers() -> Vec<IceServerConfig> {
    vec![IceServerConfig {
        urls: vec![
            "stun:stun.l.google.com:19302".to_string(),
            "stun:stun1.l.google.com:19302".to_string(),
            "stun:stun2.l.google.com:19302".to_string(),
        ],
        username: None,
        credential: None,
    }]
}

// ============================================================================
// ICE SERVER CONFIG
// ============================================================================

/// Konfiguration eines STUN/TURN-Servers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl From<&IceServerConfig> for RTCIceServer {
    fn from(config: &IceServerConfig) -> Self {
        RTCIceServer {
            urls: config.urls.clone(),
            username: config.username.clone().unwrap_or_default(),
            credential: config.credential.clone().unwrap_or_default(),
            ..Default::default()
        }
    }
}

// ============================================================================
// CALL CONFIG
// ============================================================================

/// Einstellungen einer Call-Session
#[derive(Debug, Clone)]
pub struct CallConfig {
    /// Basis-URL, an die der `signal`-Parameter angehängt wird
    pub link_base: Url,
    /// STUN/TURN-Server für die Verbindungs-Verhandlung
    pub ice_servers: Vec<IceServerConfig>,
    /// Zeitlimit für das ICE Gathering pro Verhandlungsschritt
    pub gather_timeout: Duration,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            link_base: DEFAULT_LINK_BASE.clone(),
            ice_servers: default_ice_servers(),
            gather_timeout: DEFAULT_GATHER_TIMEOUT,
        }
    }
}

impl CallConfig {
    /// Liest die Konfiguration aus der Umgebung
    ///
    /// `BEAM_LINK_BASE` überschreibt die Link-Basis, typischerweise die
    /// Location, unter der die Anwendung erreichbar ist.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(base) = std::env::var("BEAM_LINK_BASE") {
            match Url::parse(&base) {
                Ok(url) => config.link_base = url,
                Err(e) => tracing::warn!("Ignoring invalid BEAM_LINK_BASE: {}", e),
            }
        }

        config
    }

    /// Übersetzt die Server-Konfiguration in die webrtc-Repräsentation
    pub fn rtc_ice_servers(&self) -> Vec<RTCIceServer> {
        self.ice_servers.iter().map(RTCIceServer::from).collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================
