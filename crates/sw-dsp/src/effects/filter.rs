//! Spectral filter effect
//!
//! Per bin: wrap-aware signed distance from a cutoff bin, expressed in
//! log-frequency spacing, turned into a 0-1 gain ratio (brickwall when the
//! slope control is negative, linear ramp when positive), then into a dB
//! attenuation applied as an amplitude multiplier. Bins outside the active
//! boundary region pass through unchanged.

use sw_core::{db_to_gain, SIMD_CHANNELS};
use wide::f64x4;

use crate::effects::base::{copy_unprocessed, for_each_processed_bin, Bounds};
use crate::spectral::{lane_mask, ComplexSimd, SpectralBuffer, SpectralRepr};

#[derive(Debug, Clone)]
pub struct FilterEffect {
    pub bounds: Bounds,
    /// Cutoff position, 0-1 between the low and high boundary, per lane
    pub cutoff: f64x4,
    /// Negative: brickwall. Positive: ramp width in octaves.
    pub slope: f64x4,
    /// Attenuation amount in dB. Positive attenuates away from the cutoff,
    /// negative attenuates at it. Zero leaves the signal untouched.
    pub gain_db: f64x4,
}

impl Default for FilterEffect {
    fn default() -> Self {
        Self {
            bounds: Bounds::full(),
            cutoff: f64x4::splat(0.5),
            slope: f64x4::splat(1.0),
            gain_db: f64x4::ZERO,
        }
    }
}

impl FilterEffect {
    /// Cutoff bin per lane, interpolated between the shifted boundaries.
    /// A wrapped region (low > high) interpolates across the Nyquist edge.
    fn cutoff_norm(&self) -> [f64; SIMD_CHANNELS] {
        let (low, high) = self.bounds.shifted();
        let l = low.to_array();
        let h = high.to_array();
        let c = self.cutoff.to_array();
        let mut out = [0.0; SIMD_CHANNELS];
        for lane in 0..SIMD_CHANNELS {
            let span = if l[lane] <= h[lane] {
                h[lane] - l[lane]
            } else {
                1.0 - l[lane] + h[lane]
            };
            let mut pos = l[lane] + c[lane].clamp(0.0, 1.0) * span;
            if pos > 1.0 {
                pos -= 1.0;
            }
            out[lane] = pos;
        }
        out
    }

    /// Gain multiplier for one bin on one lane
    fn lane_gain(&self, lane: usize, bin_norm: f64, cut_norm: f64, bins: usize) -> f64 {
        let gain_db = self.gain_db.to_array()[lane];
        if gain_db == 0.0 {
            return 1.0;
        }
        let slope = self.slope.to_array()[lane];

        // Wrap-aware signed distance in normalized frequency
        let mut d = bin_norm - cut_norm;
        if d > 0.5 {
            d -= 1.0;
        } else if d < -0.5 {
            d += 1.0;
        }

        // Log-frequency spacing: distance in octaves between the two bins
        let bin_idx = 1.0 + bin_norm * (bins - 1) as f64;
        let cut_idx = 1.0 + cut_norm * (bins - 1) as f64;
        let octaves = (bin_idx / cut_idx).log2().abs();

        // 0-1 ratio: 1 at the cutoff, falling off with distance
        let ratio = if slope < 0.0 {
            // Brickwall: only the cutoff bin itself counts as "at"
            let bin_width = 1.0 / (bins - 1) as f64;
            if d.abs() <= bin_width * 0.5 {
                1.0
            } else {
                0.0
            }
        } else {
            let span = slope.max(1e-3);
            (1.0 - octaves / span).clamp(0.0, 1.0)
        };

        // Positive gain attenuates away from the cutoff, negative at it
        let atten_db = if gain_db >= 0.0 {
            -gain_db * (1.0 - ratio)
        } else {
            gain_db * ratio
        };
        db_to_gain(atten_db)
    }

    pub fn process(&mut self, src: &SpectralBuffer, dst: &mut SpectralBuffer, channels: usize) {
        debug_assert_eq!(src.repr(), SpectralRepr::Cartesian);
        let bins = dst.bins().min(src.bins());
        let packages = channels.div_ceil(SIMD_CHANNELS);
        let cut = self.cutoff_norm();
        dst.set_repr(SpectralRepr::Cartesian);

        for_each_processed_bin(&self.bounds, bins, |bin, mask| {
            let bin_norm = bin as f64 / (bins - 1) as f64;
            let mut gains = [1.0; SIMD_CHANNELS];
            for (lane, g) in gains.iter_mut().enumerate() {
                if mask & (1 << lane) != 0 {
                    *g = self.lane_gain(lane, bin_norm, cut[lane], bins);
                }
            }
            let gain = f64x4::new(gains);
            let select = lane_mask(mask);
            for pkg in 0..packages {
                let s = src.package(pkg, bin);
                let scaled = s.scale(gain);
                let old = dst.package(pkg, bin);
                dst.set_package(
                    pkg,
                    bin,
                    ComplexSimd {
                        re: select.blend(scaled.re, old.re),
                        im: select.blend(scaled.im, old.im),
                    },
                );
            }
        });

        copy_unprocessed(dst, src, &self.bounds, channels);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone_buffer(bins: usize, bin: usize) -> SpectralBuffer {
        let mut buf = SpectralBuffer::new(2, bins);
        buf.write_at(0, bin, 1.0, 0.5);
        buf.write_at(1, bin, -0.5, 1.0);
        buf
    }

    #[test]
    fn zero_gain_is_identity() {
        let src = tone_buffer(65, 20);
        let mut dst = SpectralBuffer::new(2, 65);
        let mut filter = FilterEffect::default();
        filter.process(&src, &mut dst, 2);
        for bin in 0..65 {
            assert_eq!(dst.read_at(0, bin), src.read_at(0, bin));
            assert_eq!(dst.read_at(1, bin), src.read_at(1, bin));
        }
    }

    #[test]
    fn positive_gain_attenuates_far_bins_only() {
        let mut src = SpectralBuffer::new(2, 65);
        for bin in 0..65 {
            src.write_at(0, bin, 1.0, 0.0);
        }
        let mut dst = SpectralBuffer::new(2, 65);
        let mut filter = FilterEffect {
            gain_db: f64x4::splat(24.0),
            slope: f64x4::splat(2.0),
            ..FilterEffect::default()
        };
        filter.process(&src, &mut dst, 2);

        // The cutoff sits mid-range; a bin at the cutoff keeps its level
        let cut_bin = 32;
        let at = dst.read_at(0, cut_bin).0;
        assert!((at - 1.0).abs() < 0.15, "at-cutoff bin was {at}");
        // A distant bin is attenuated
        let far = dst.read_at(0, 2).0;
        assert!(far < at * 0.5, "far bin {far} not attenuated vs {at}");
    }

    #[test]
    fn negative_gain_cuts_at_cutoff() {
        let mut src = SpectralBuffer::new(2, 65);
        for bin in 0..65 {
            src.write_at(0, bin, 1.0, 0.0);
        }
        let mut dst = SpectralBuffer::new(2, 65);
        let mut filter = FilterEffect {
            gain_db: f64x4::splat(-24.0),
            slope: f64x4::splat(1.0),
            ..FilterEffect::default()
        };
        filter.process(&src, &mut dst, 2);
        let at = dst.read_at(0, 32).0;
        let far = dst.read_at(0, 2).0;
        assert!(at < far, "cutoff bin {at} should be quieter than far {far}");
    }

    #[test]
    fn outside_boundary_passes_through() {
        let mut src = SpectralBuffer::new(2, 65);
        for bin in 0..65 {
            src.write_at(0, bin, 2.0, -1.0);
        }
        let mut dst = SpectralBuffer::new(2, 65);
        let mut filter = FilterEffect {
            bounds: Bounds::mono(0.4, 0.6),
            gain_db: f64x4::splat(60.0),
            slope: f64x4::splat(0.1),
            ..FilterEffect::default()
        };
        filter.process(&src, &mut dst, 2);
        assert_eq!(dst.read_at(0, 2), (2.0, -1.0));
        assert_eq!(dst.read_at(0, 62), (2.0, -1.0));
    }
}
