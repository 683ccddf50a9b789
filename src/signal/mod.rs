//! Signal Module - Out-of-Band Signaling per Link
//!
//! Dieses Modul kodiert Verhandlungs-Payloads (SDP Offer/Answer) in einen
//! URL-sicheren String und bettet ihn als Query-Parameter in einen
//! teilbaren Link ein. Der Link ist das gesamte Wire-Format des Systems:
//! - Kein Signaling-Server, kein Relay
//! - Der Link wird von Hand weitergegeben (Chat, Mail, QR)
//! - Die Gegenseite liest den Parameter aus ihrer Location

mod codec;

pub use codec::{
    connection_link, decode, encode, extract_from_location, SignalError, SignalKind,
    SignalPayload, SIGNAL_PARAM,
};
