//! Parameter types for the spectral engine
//!
//! The engine consumes *scaled* (engineering-unit) values only; the host
//! hands over normalized 0-1 values which pass through a declared scale
//! curve. Scaling lives here so every component agrees on the mapping.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Parameter ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParamId(pub u32);

/// Scale curve applied when converting a normalized value to its
/// engineering-unit representation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParamScale {
    /// Straight line between min and max
    Linear,
    /// Squared before mapping (finer resolution near min)
    Quadratic,
    /// Quadratic mirrored around the range midpoint
    SymmetricQuadratic,
    /// Loudness taper: quadratic in decibels
    Loudness,
    /// Logarithmic frequency spacing (equal ratios per step)
    Frequency,
    /// Two-state switch: min below 0.5, max at or above
    Toggle,
    /// Stepped across `count` discrete values
    Indexed { count: u32 },
}

/// Parameter range specification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
    pub default: f64,
    pub scale: ParamScale,
}

impl ParamRange {
    pub fn linear(min: f64, max: f64, default: f64) -> Self {
        Self {
            min,
            max,
            default,
            scale: ParamScale::Linear,
        }
    }

    pub fn frequency(min: f64, max: f64, default: f64) -> Self {
        Self {
            min,
            max,
            default,
            scale: ParamScale::Frequency,
        }
    }

    pub fn loudness(min: f64, max: f64, default: f64) -> Self {
        Self {
            min,
            max,
            default,
            scale: ParamScale::Loudness,
        }
    }

    pub fn toggle(default_on: bool) -> Self {
        Self {
            min: 0.0,
            max: 1.0,
            default: if default_on { 1.0 } else { 0.0 },
            scale: ParamScale::Toggle,
        }
    }

    /// Convert a normalized 0-1 value to engineering units
    pub fn scale_value(&self, normalized: f64) -> f64 {
        let n = normalized.clamp(0.0, 1.0);
        let span = self.max - self.min;
        match self.scale {
            ParamScale::Linear => self.min + n * span,
            ParamScale::Quadratic => self.min + n * n * span,
            ParamScale::SymmetricQuadratic => {
                // Map to [-1, 1], square with sign preserved, map back
                let t = 2.0 * n - 1.0;
                let mid = self.min + span * 0.5;
                mid + t.abs() * t * span * 0.5
            }
            ParamScale::Loudness => self.min + n * n * span,
            ParamScale::Frequency => {
                debug_assert!(self.min > 0.0, "frequency scale needs positive min");
                self.min * (self.max / self.min).powf(n)
            }
            ParamScale::Toggle => {
                if n >= 0.5 {
                    self.max
                } else {
                    self.min
                }
            }
            ParamScale::Indexed { count } => {
                let steps = count.max(2) as f64 - 1.0;
                let idx = (n * steps).round();
                self.min + (idx / steps) * span
            }
        }
    }

    /// Convert an engineering-unit value back to normalized 0-1
    pub fn normalize(&self, value: f64) -> f64 {
        let clamped = value.clamp(self.min.min(self.max), self.max.max(self.min));
        let span = self.max - self.min;
        match self.scale {
            ParamScale::Linear | ParamScale::Indexed { .. } => (clamped - self.min) / span,
            ParamScale::Quadratic | ParamScale::Loudness => ((clamped - self.min) / span).sqrt(),
            ParamScale::SymmetricQuadratic => {
                let mid = self.min + span * 0.5;
                let t = (clamped - mid) / (span * 0.5);
                (t.abs().sqrt().copysign(t) + 1.0) * 0.5
            }
            ParamScale::Frequency => (clamped / self.min).ln() / (self.max / self.min).ln(),
            ParamScale::Toggle => {
                if clamped >= (self.min + self.max) * 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// When within a block a parameter update is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdatePhase {
    /// Applied continuously, every callback
    Realtime,
    /// Applied once, before the block's first FFT frame
    BeforeProcess,
    /// Applied once, after the block's last frame
    AfterProcess,
}

/// Atomic parameter cell for lock-free control-to-audio handoff
pub struct AtomicParam {
    bits: AtomicU64,
}

impl AtomicParam {
    pub fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    #[inline]
    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }
}

impl Default for AtomicParam {
    fn default() -> Self {
        Self::new(0.0)
    }
}
