//! Signal Codec
//!
//! Serialisiert SDP-Payloads zu und von einem URL-sicheren String.
//! URL-safe Base64 ohne Padding über der JSON-Serialisierung: das
//! Ergebnis kann unverändert als Query-Parameter eingebettet werden
//! und der Roundtrip ist byte-identisch.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64, Engine};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

/// Query-Parameter, der den kodierten Payload trägt
pub const SIGNAL_PARAM: &str = "signal";

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum SignalError {
    #[error("Signal is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("Signal payload is not valid JSON: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Signal payload carries no SDP")]
    MissingSdp,

    #[error("Invalid location URL: {0}")]
    Link(#[from] url::ParseError),
}

// ============================================================================
// SIGNAL PAYLOAD
// ============================================================================

/// Richtung eines Verhandlungsschritts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Offer,
    Answer,
}

/// Verhandlungs-Payload mit Metadaten
///
/// Unveränderlicher Wert: wird kodiert, dekodiert und auf die Verbindung
/// angewendet, aber nie mutiert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalPayload {
    pub kind: SignalKind,
    pub sdp: String,
    pub session_id: Uuid,
    pub ts: i64,
}

impl SignalPayload {
    /// Erstellt einen Offer-Payload
    pub fn offer(sdp: String, session_id: Uuid) -> Self {
        Self {
            kind: SignalKind::Offer,
            sdp,
            session_id,
            ts: Utc::now().timestamp_millis(),
        }
    }

    /// Erstellt einen Answer-Payload für eine bestehende Session
    pub fn answer(sdp: String, session_id: Uuid) -> Self {
        Self {
            kind: SignalKind::Answer,
            sdp,
            session_id,
            ts: Utc::now().timestamp_millis(),
        }
    }
}

// ============================================================================
// CODEC
// ============================================================================

/// Kodiert einen Payload als URL-sicheren String
pub fn encode(payload: &SignalPayload) -> String {
    let json = serde_json::to_vec(payload).unwrap_or_default();
    BASE64.encode(json)
}

/// Dekodiert einen String zurück in einen Payload
///
/// Schlägt bei jedem Nicht-Payload-Input mit einem `SignalError` fehl,
/// nie mit etwas anderem; ein Payload ohne SDP gilt als strukturell
/// ungültig.
pub fn decode(text: &str) -> Result<SignalPayload, SignalError> {
    let bytes = BASE64.decode(text.trim())?;
    let payload: SignalPayload = serde_json::from_slice(&bytes)?;

    if payload.sdp.trim().is_empty() {
        return Err(SignalError::MissingSdp);
    }

    Ok(payload)
}

/// Baut den teilbaren Verbindungs-Link
///
/// Der Link ist die konfigurierte Basis-Location plus `signal`-Parameter.
/// Ein bereits vorhandener `signal`-Parameter wird ersetzt, nicht
/// dupliziert.
pub fn connection_link(base: &Url, payload: &SignalPayload) -> String {
    let kept: Vec<(String, String)> = base
        .query_pairs()
        .filter(|(key, _)| key != SIGNAL_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let mut link = base.clone();
    {
        let mut pairs = link.query_pairs_mut();
        pairs.clear();
        for (key, value) in &kept {
            pairs.append_pair(key, value);
        }
        pairs.append_pair(SIGNAL_PARAM, &encode(payload));
    }
    link.to_string()
}

/// Liest den `signal`-Parameter aus einer Location
///
/// Abwesenheit ist der Normalfall "kein eingehender Anruf" und nie ein
/// Fehler. Nur ein vorhandener, aber unlesbarer Parameter schlägt fehl.
pub fn extract_from_location(location: &str) -> Result<Option<SignalPayload>, SignalError> {
    let url = Url::parse(location)?;

    let encoded = url
        .query_pairs()
        .find(|(key, _)| key == SIGNAL_PARAM)
        .map(|(_, value)| value.into_owned());

    match encoded {
        Some(text) => Ok(Some(decode(&text)?)),
        None => Ok(None),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> SignalPayload {
        SignalPayload::offer(
            "v=0\r\no=- 4611731400430051336 2 IN IP4 127.0.0.1\r\ns=-\r\n".to_string(),
            Uuid::new_v4(),
        )
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let payload = sample_payload();

        let encoded = encode(&payload);
        let decoded = decode(&encoded).unwrap();

        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_encoded_form_is_query_safe() {
        let payload = sample_payload();
        let encoded = encode(&payload);

        // URL-safe Base64 ohne Padding: keine Zeichen, die Percent-Escaping
        // im Query-Parameter auslösen
        assert!(encoded
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode("definitely not base64!!!"),
            Err(SignalError::Encoding(_))
        ));
    }

    #[test]
    fn test_decode_rejects_non_payload_json() {
        // Gültiges Base64, aber kein SignalPayload dahinter
        let encoded = BASE64.encode(br#"{"hello":"world"}"#);
        assert!(matches!(
            decode(&encoded),
            Err(SignalError::Payload(_))
        ));
    }

    #[test]
    fn test_decode_rejects_empty_sdp() {
        let payload = SignalPayload::offer(String::new(), Uuid::new_v4());
        let encoded = encode(&payload);

        assert!(matches!(decode(&encoded), Err(SignalError::MissingSdp)));
    }

    #[test]
    fn test_link_roundtrip() {
        let payload = sample_payload();
        let base = Url::parse("https://example.com/call").unwrap();

        let link = connection_link(&base, &payload);
        let extracted = extract_from_location(&link).unwrap().unwrap();

        assert_eq!(extracted, payload);
    }

    #[test]
    fn test_link_replaces_existing_signal_param() {
        let first = sample_payload();
        let second = SignalPayload::answer("v=0\r\n".to_string(), first.session_id);
        let base = Url::parse("https://example.com/call?room=7").unwrap();

        let link = connection_link(&base, &first);
        let link = connection_link(&Url::parse(&link).unwrap(), &second);

        let url = Url::parse(&link).unwrap();
        let signal_params = url
            .query_pairs()
            .filter(|(key, _)| key == SIGNAL_PARAM)
            .count();
        assert_eq!(signal_params, 1);

        // Andere Parameter überleben den Austausch
        assert!(url.query_pairs().any(|(key, value)| key == "room" && value == "7"));
        assert_eq!(extract_from_location(&link).unwrap().unwrap(), second);
    }

    #[test]
    fn test_extract_without_param_is_absent() {
        let result = extract_from_location("https://example.com/call?room=7").unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_extract_with_malformed_param_fails() {
        let result = extract_from_location("https://example.com/call?signal=%21%21");
        assert!(result.is_err());
    }
}
