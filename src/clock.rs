//! Time sources used by the dispatch loop and the EIT decoder.

use std::time::Instant;

use chrono::{DateTime, Utc};

/// Monotonic + wall clock pair. Mockable so the post-tune grace window
/// and EPG expiry checks can run against a simulated clock.
pub trait Clock: Send + Sync + 'static {
    /// Microseconds since an arbitrary origin, never going backwards.
    fn mono_us(&self) -> u64;
    /// Wall time, used to drop EPG events that already came to pass.
    fn wall(&self) -> DateTime<Utc>;
}

pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn mono_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }

    fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
