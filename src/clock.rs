use chrono::{DateTime, Utc};

/// The default credential rotation cadence in milliseconds.
pub const DEFAULT_CADENCE_MS: i64 = 5_000;

/// Maps wall-clock instants onto integer rotation windows.
///
/// Issuer and verifier must share the same cadence; the index is
/// `floor(now_ms / cadence_ms)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockWindow {
    cadence_ms: i64,
}

impl ClockWindow {
    /// Creates a new `ClockWindow`. A non-positive cadence falls back to the default.
    pub fn new(cadence_ms: i64) -> Self {
        let cadence_ms = if cadence_ms > 0 { cadence_ms } else { DEFAULT_CADENCE_MS };
        Self { cadence_ms }
    }

    /// Returns the cadence in milliseconds.
    pub fn cadence_ms(&self) -> i64 {
        self.cadence_ms
    }

    /// Returns the window index containing `now`.
    pub fn index_at(&self, now: DateTime<Utc>) -> i64 {
        window_index(now.timestamp_millis(), self.cadence_ms)
    }

    /// Returns how many milliseconds remain until the next window starts.
    pub fn remaining_ms(&self, now: DateTime<Utc>) -> i64 {
        self.cadence_ms - now.timestamp_millis().rem_euclid(self.cadence_ms)
    }
}

impl Default for ClockWindow {
    fn default() -> Self {
        Self::new(DEFAULT_CADENCE_MS)
    }
}

/// Converts a millisecond timestamp into a window index.
///
/// Uses floor division so instants before the epoch still map onto a
/// monotonic sequence.
pub fn window_index(now_ms: i64, cadence_ms: i64) -> i64 {
    now_ms.div_euclid(cadence_ms)
}
