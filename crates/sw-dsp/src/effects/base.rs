//! Boundary and bin-range math shared by every effect
//!
//! Boundaries are stereo: one normalized (low, high, shift) triple per
//! packed channel lane. A lane whose low exceeds its high wraps around
//! the Nyquist edge. When all lanes agree, the active region resolves to
//! one contiguous-with-wrap span; when they disagree, the span of each
//! lane differs and the implementation scans the full bin range, masking
//! each bin's membership individually. The divergent case is deliberately
//! not resolved into an exact multi-lane span.

use sw_core::SIMD_CHANNELS;
use wide::f64x4;

use crate::spectral::{lane_mask, SpectralBuffer, SpectralRepr, FULL_MASK};

/// Per-lane normalized frequency boundaries plus shift
#[derive(Debug, Clone, Copy)]
pub struct Bounds {
    pub low: f64x4,
    pub high: f64x4,
    pub shift: f64x4,
}

impl Bounds {
    /// Same boundaries on every lane
    pub fn mono(low: f64, high: f64) -> Self {
        Self {
            low: f64x4::splat(low),
            high: f64x4::splat(high),
            shift: f64x4::ZERO,
        }
    }

    pub fn full() -> Self {
        Self::mono(0.0, 1.0)
    }

    /// Apply the shift and clamp both boundaries into [0, 1] per lane
    pub fn shifted(&self) -> (f64x4, f64x4) {
        let low = (self.low + self.shift).fast_max(f64x4::ZERO).fast_min(f64x4::ONE);
        let high = (self.high + self.shift).fast_max(f64x4::ZERO).fast_min(f64x4::ONE);
        (low, high)
    }

    /// All lanes share one boundary pair (the mono fast path)
    pub fn is_mono(&self) -> bool {
        let (low, high) = self.shifted();
        let l = low.to_array();
        let h = high.to_array();
        l.iter().all(|&v| v == l[0]) && h.iter().all(|&v| v == h[0])
    }
}

/// The bin span an effect iterates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinSpan {
    /// Contiguous run of `count` bins starting at `start`, indices taken
    /// modulo the bin count (wrap-around region)
    Contiguous { start: usize, count: usize },
    /// Lanes disagree: scan every bin and mask membership per lane
    FullScan,
}

#[inline]
fn to_bin(norm: f64, bins: usize) -> usize {
    ((norm * (bins - 1) as f64).round() as usize).min(bins - 1)
}

/// Resolve the boundary pair to a bin span.
///
/// `is_processed` selects the active region itself or its complement
/// (the bins `copy_unprocessed` writes through).
pub fn bin_range(bounds: &Bounds, bins: usize, is_processed: bool) -> BinSpan {
    assert!(bins > 1);
    if !bounds.is_mono() {
        return BinSpan::FullScan;
    }
    let (low, high) = bounds.shifted();
    let lo = to_bin(low.to_array()[0], bins);
    let hi = to_bin(high.to_array()[0], bins);

    let (start, count) = if lo <= hi {
        (lo, hi - lo + 1)
    } else {
        // Wraps past Nyquist: lo..bins plus 0..=hi
        (lo, bins - lo + hi + 1)
    };

    if is_processed {
        BinSpan::Contiguous { start, count }
    } else {
        BinSpan::Contiguous {
            start: (start + count) % bins,
            count: bins - count,
        }
    }
}

/// One lane's active span as (start, count), wrap-aware. Bin-remapping
/// effects wrap their source indices inside this span.
pub(crate) fn lane_span(bounds: &Bounds, bins: usize, lane: usize) -> (usize, usize) {
    let (low, high) = bounds.shifted();
    let lo = to_bin(low.to_array()[lane], bins);
    let hi = to_bin(high.to_array()[lane], bins);
    if lo <= hi {
        (lo, hi - lo + 1)
    } else {
        (lo, bins - lo + hi + 1)
    }
}

/// Per-lane membership mask for one bin (wrap-aware)
pub fn bin_membership(bounds: &Bounds, bins: usize, bin: usize) -> u8 {
    let (low, high) = bounds.shifted();
    let l = low.to_array();
    let h = high.to_array();
    let norm = bin as f64 / (bins - 1) as f64;
    let mut mask = 0u8;
    for lane in 0..SIMD_CHANNELS {
        let inside = if l[lane] <= h[lane] {
            norm >= l[lane] && norm <= h[lane]
        } else {
            norm >= l[lane] || norm <= h[lane]
        };
        if inside {
            mask |= 1 << lane;
        }
    }
    mask
}

/// Visit every bin of the active region with its lane mask.
///
/// Mono boundaries walk only the contiguous span; divergent stereo
/// boundaries conservatively walk the entire range and hand each bin its
/// individual membership mask (bins no lane contains are skipped).
pub fn for_each_processed_bin<F: FnMut(usize, u8)>(bounds: &Bounds, bins: usize, mut f: F) {
    match bin_range(bounds, bins, true) {
        BinSpan::Contiguous { start, count } => {
            for i in 0..count {
                f((start + i) % bins, FULL_MASK);
            }
        }
        BinSpan::FullScan => {
            for bin in 0..bins {
                let mask = bin_membership(bounds, bins, bin);
                if mask != 0 {
                    f(bin, mask);
                }
            }
        }
    }
}

/// Write bins outside the active region through unchanged, converting the
/// copied packages when the destination representation differs from the
/// source's (so one buffer never mixes representations).
pub fn copy_unprocessed(
    dest: &mut SpectralBuffer,
    src: &SpectralBuffer,
    bounds: &Bounds,
    channels: usize,
) {
    let bins = dest.bins().min(src.bins());
    let packages = channels.div_ceil(SIMD_CHANNELS);
    let convert = dest.repr() != src.repr();

    let mut copy_bin = |dest: &mut SpectralBuffer, bin: usize, mask: u8| {
        let select = lane_mask(mask);
        for pkg in 0..packages {
            let mut value = src.package(pkg, bin);
            if convert {
                value = match dest.repr() {
                    SpectralRepr::Polar => value.to_polar(),
                    SpectralRepr::Cartesian => value.from_polar(),
                };
            }
            let old = dest.package(pkg, bin);
            dest.set_package(
                pkg,
                bin,
                crate::spectral::ComplexSimd {
                    re: select.blend(value.re, old.re),
                    im: select.blend(value.im, old.im),
                },
            );
        }
    };

    match bin_range(bounds, bins, false) {
        BinSpan::Contiguous { start, count } => {
            for i in 0..count {
                copy_bin(dest, (start + i) % bins, FULL_MASK);
            }
        }
        BinSpan::FullScan => {
            for bin in 0..bins {
                let outside = !bin_membership(bounds, bins, bin) & FULL_MASK;
                if outside != 0 {
                    copy_bin(dest, bin, outside);
                }
            }
        }
    }
}
