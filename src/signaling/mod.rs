//! Signaling Module - Payloads für den Call-Verbindungsaufbau
//!
//! Dieses Modul definiert:
//! - Das JSON-Format der Call-Nachrichten (offer, answer, candidate, ...)
//! - Parsing und Encoding der Nachrichten
//!
//! Das Versenden übernimmt der Besitzer der Session über seinen eigenen Kanal.

mod messages;

pub use messages::*;
