//! Reconnect-Backoff
//!
//! Jeder Aufruf von [`Backoff::next_delay`] verdoppelt den Akkumulator und
//! gibt den neuen Wert zurück. Kein Jitter.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Backoff {
    seed: Duration,
    current: Duration,
    max_attempts: u32,
    attempts_left: u32,
}

impl Backoff {
    pub fn new(seed: Duration, max_attempts: u32) -> Self {
        Self {
            seed,
            current: seed,
            max_attempts,
            attempts_left: max_attempts,
        }
    }

    /// Nächste Wartezeit, oder `None` wenn alle Versuche aufgebraucht sind
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts_left == 0 {
            return None;
        }
        self.attempts_left -= 1;
        self.current = self.current.checked_mul(2).unwrap_or(Duration::MAX);
        Some(self.current)
    }

    /// Zurück auf den Startwert, nach erfolgreicher Verbindung
    pub fn reset(&mut self) {
        self.current = self.seed;
        self.attempts_left = self.max_attempts;
    }

    /// Aktueller Stand des Akkumulators
    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn attempts_left(&self) -> u32 {
        self.attempts_left
    }
}
