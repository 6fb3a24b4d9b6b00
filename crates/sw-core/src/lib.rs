//! sw-core: Shared types, parameters, and engine context for SpectralWeave
//!
//! This crate provides the foundational types used across all SpectralWeave
//! crates: the sample type, decibel conversions, the parameter scale system,
//! and the engine context that gates structural edits.

mod context;
mod error;
mod params;

pub use context::*;
pub use error::*;
pub use params::*;

/// Type alias for audio samples (always f64 for maximum precision)
pub type Sample = f64;

/// Number of logical channels packed into one SIMD register.
///
/// A 4-wide f64 register holds two stereo pairs; all channel counts in the
/// engine are rounded up to a multiple of this when packing spectral data.
pub const SIMD_CHANNELS: usize = 4;

/// Standard sample rate options
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(u32)]
pub enum SampleRate {
    Hz44100 = 44100,
    Hz48000 = 48000,
    Hz88200 = 88200,
    Hz96000 = 96000,
    Hz176400 = 176400,
    Hz192000 = 192000,
}

impl SampleRate {
    #[inline]
    pub fn as_f64(self) -> f64 {
        self as u32 as f64
    }

    #[inline]
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl Default for SampleRate {
    fn default() -> Self {
        Self::Hz44100
    }
}

/// Host block size options
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(u32)]
pub enum BlockSize {
    Samples32 = 32,
    Samples64 = 64,
    Samples128 = 128,
    Samples256 = 256,
    Samples512 = 512,
    Samples1024 = 1024,
    Samples2048 = 2048,
}

impl BlockSize {
    #[inline]
    pub fn as_usize(self) -> usize {
        self as u32 as usize
    }

    /// Calculate latency in milliseconds
    #[inline]
    pub fn latency_ms(self, sample_rate: SampleRate) -> f64 {
        (self.as_usize() as f64 / sample_rate.as_f64()) * 1000.0
    }
}

impl Default for BlockSize {
    fn default() -> Self {
        Self::Samples512
    }
}

/// Convert a decibel value to an amplitude multiplier
#[inline]
pub fn db_to_gain(db: f64) -> f64 {
    if db <= -144.0 {
        0.0
    } else {
        10.0_f64.powf(db / 20.0)
    }
}

/// Convert an amplitude multiplier to decibels
#[inline]
pub fn gain_to_db(gain: f64) -> f64 {
    if gain <= 0.0 {
        f64::NEG_INFINITY
    } else {
        20.0 * gain.log10()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn db_gain_round_trip() {
        for db in [-60.0, -12.0, -6.0, 0.0, 6.0, 12.0] {
            assert_relative_eq!(gain_to_db(db_to_gain(db)), db, epsilon = 1e-9);
        }
    }

    #[test]
    fn silence_floor() {
        assert_eq!(db_to_gain(-200.0), 0.0);
        assert_eq!(gain_to_db(0.0), f64::NEG_INFINITY);
    }
}
