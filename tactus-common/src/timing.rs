//! Stream time-base and timestamp conversions
//!
//! Decoded frames carry timestamps in stream-relative time-base units
//! (ticks). A stream's time base is a rational number of seconds per tick,
//! e.g. 1/44100 for sample-addressed streams or 1/90000 for container
//! clocks. Conversions here are the single place tick math happens;
//! everything downstream works in ticks or in sample counts.
//!
//! Timestamps from different streams share no epoch. Comparing or
//! converting ticks across streams is meaningless.

/// Rational time base: `numer / denom` seconds per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBase {
    /// Numerator (seconds)
    pub numer: u32,
    /// Denominator (ticks)
    pub denom: u32,
}

impl TimeBase {
    /// Create a time base of `numer / denom` seconds per tick.
    ///
    /// # Panics
    /// Panics if `denom` is zero.
    pub fn new(numer: u32, denom: u32) -> Self {
        assert!(denom != 0, "time base denominator must be non-zero");
        Self { numer, denom }
    }

    /// Time base for a sample-addressed stream (one tick per sample).
    pub fn from_sample_rate(sample_rate: u32) -> Self {
        Self::new(1, sample_rate)
    }

    /// Convert a tick timestamp to seconds.
    pub fn ticks_to_seconds(&self, ticks: i64) -> f64 {
        ticks as f64 * self.numer as f64 / self.denom as f64
    }

    /// Convert seconds to a tick timestamp (truncating).
    pub fn seconds_to_ticks(&self, seconds: f64) -> i64 {
        (seconds * self.denom as f64 / self.numer as f64) as i64
    }
}

impl Default for TimeBase {
    /// One tick per second.
    fn default() -> Self {
        Self::new(1, 1)
    }
}

/// Duration of `samples` frames at `sample_rate`, in milliseconds.
pub fn samples_to_ms(samples: usize, sample_rate: u32) -> u64 {
    (samples as u64 * 1000) / sample_rate as u64
}

/// Number of sample frames covering `seconds` at `sample_rate` (truncating).
pub fn seconds_to_samples(seconds: f64, sample_rate: u32) -> usize {
    (seconds * sample_rate as f64) as usize
}
