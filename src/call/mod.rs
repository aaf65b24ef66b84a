//! Call Module - Session-Zustandsautomat
//!
//! Dieses Modul verwaltet:
//! - Den Lebenszyklus eines Anrufs (init, Offer/Answer, dispose)
//! - Automatischen Reconnect mit Backoff
//! - Mic/Video/Kamera-Umschaltung

mod backoff;
#[cfg(test)]
mod fakes;
mod session;

pub use backoff::Backoff;
pub use session::{CallError, CallEvent, CallSession};
