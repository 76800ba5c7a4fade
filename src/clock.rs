//! Wraparound-safe clock reference and timestamp arithmetic.
//!
//! The 42-bit PCR domain (33-bit base at 90 kHz times 300, plus a 9-bit
//! extension at 27 MHz) and the 33-bit PTS/DTS domain share the same
//! modular algebra: deltas never underflow across a counter wrap, and
//! additions reduce modulo the domain size.

use std::time::Duration;

/// System clock frequency for PTS/DTS, 90 kHz.
pub const SYSTEM_CLOCK: u64 = 90_000;

/// Program clock frequency for PCR, 27 MHz.
pub const PROGRAM_CLOCK: u64 = 27_000_000;

/// Program Clock Reference value, in 27 MHz ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pcr(pub u64);

impl Pcr {
    /// Wrap point of the PCR domain.
    pub const WRAP: u64 = (1 << 33) * 300;

    /// Largest representable PCR value.
    pub const MAX: Pcr = Pcr(Self::WRAP - 1);

    /// Returns the difference `self - previous` considering counter wrap.
    pub fn delta(self, previous: Pcr) -> Pcr {
        if self.0 >= previous.0 {
            Pcr(self.0 - previous.0)
        } else {
            Pcr(Self::WRAP - previous.0 + self.0)
        }
    }

    /// Returns `self + other` modulo the domain size.
    pub fn add(self, other: Pcr) -> Pcr {
        Pcr((self.0 + other.0) & Self::MAX.0)
    }

    /// Linearly interpolates a PCR value at a byte offset past this one.
    ///
    /// `past_bytes` is the byte distance between `previous` and `self`;
    /// `future_bytes` is the byte distance between `self` and the estimated
    /// position.
    ///
    /// ```text
    /// | time -->
    /// | X---------X---------X
    /// |  \         \         \
    /// |   \         \         estimated PCR
    /// |    \         current PCR
    /// |     previous PCR
    /// ```
    pub fn estimate(self, previous: Pcr, past_bytes: u64, future_bytes: u64) -> Pcr {
        let delta = self.delta(previous).0 as u128;
        let stc = (delta * future_bytes as u128 / past_bytes as u128) as u64;
        Pcr(stc).add(self)
    }

    /// Returns the real-time difference between two PCR values.
    pub fn jitter(self, previous: Pcr) -> Duration {
        let delta = self.delta(previous).0;
        Duration::from_nanos(delta * 1000 / 27)
    }

    /// Returns the bitrate in bits per second for a byte count spanned by
    /// this PCR delta.
    pub fn bitrate(self, bytes: u64) -> u64 {
        bytes * 8 * PROGRAM_CLOCK / self.0
    }
}

/// 33-bit PTS/DTS timestamp, in 90 kHz ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Wrap point of the timestamp domain.
    pub const WRAP: u64 = 1 << 33;

    /// Largest representable timestamp value.
    pub const MAX: Timestamp = Timestamp(Self::WRAP - 1);

    /// Returns the number of 90 kHz ticks in a duration expressed against a
    /// timescale. For example, 250 ms is `Timestamp::scale(250, 1000)`,
    /// which is 22500 ticks.
    pub fn scale(duration: u64, timescale: u64) -> Timestamp {
        Timestamp(duration * SYSTEM_CLOCK / timescale)
    }

    /// Returns the difference `self - previous` considering counter wrap.
    pub fn delta(self, previous: Timestamp) -> Timestamp {
        if self.0 >= previous.0 {
            Timestamp(self.0 - previous.0)
        } else {
            Timestamp(Self::WRAP - previous.0 + self.0)
        }
    }

    /// Returns `self + other` modulo the domain size.
    pub fn add(self, other: Timestamp) -> Timestamp {
        Timestamp((self.0 + other.0) & Self::MAX.0)
    }
}
