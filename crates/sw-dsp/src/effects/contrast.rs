//! Spectral contrast effect
//!
//! Reshapes the magnitude distribution inside the active region: loud bins
//! get louder and quiet bins quieter (or the reverse for negative amounts),
//! then the region is rescaled so its total energy matches the input. Runs
//! in polar representation and leaves the destination polar; the lane
//! converts back before the inverse transform.
//!
//! Three passes over the region: measure (energy and peak magnitude per
//! lane), shape (power law on the peak-normalized magnitude, limited to a
//! magnitude window), renormalize.

use sw_core::SIMD_CHANNELS;
use wide::f64x4;

use crate::effects::base::{copy_unprocessed, for_each_processed_bin, Bounds};
use crate::spectral::{lane_mask, ComplexSimd, SpectralBuffer, SpectralRepr};

#[derive(Debug, Clone)]
pub struct ContrastEffect {
    pub bounds: Bounds,
    /// Contrast amount per lane. 0 is identity, positive expands the
    /// magnitude spread, negative flattens it.
    pub amount: f64x4,
    /// Magnitude window, 0-1 relative to the region peak. Bins whose
    /// normalized magnitude falls outside the window are left unshaped.
    pub min_mag: f64x4,
    pub max_mag: f64x4,
}

impl Default for ContrastEffect {
    fn default() -> Self {
        Self {
            bounds: Bounds::full(),
            amount: f64x4::ZERO,
            min_mag: f64x4::ZERO,
            max_mag: f64x4::ONE,
        }
    }
}

impl ContrastEffect {
    pub fn process(&mut self, src: &SpectralBuffer, dst: &mut SpectralBuffer, channels: usize) {
        debug_assert_eq!(src.repr(), SpectralRepr::Cartesian);
        let bins = dst.bins().min(src.bins());
        let packages = channels.div_ceil(SIMD_CHANNELS);
        dst.set_repr(SpectralRepr::Polar);

        // Pass 1: convert the region to polar and measure it
        let mut energy = vec![[0.0f64; SIMD_CHANNELS]; packages];
        let mut peak = vec![[0.0f64; SIMD_CHANNELS]; packages];
        for_each_processed_bin(&self.bounds, bins, |bin, mask| {
            for pkg in 0..packages {
                let polar = src.package(pkg, bin).to_polar();
                let old = dst.package(pkg, bin);
                let select = lane_mask(mask);
                dst.set_package(
                    pkg,
                    bin,
                    ComplexSimd {
                        re: select.blend(polar.re, old.re),
                        im: select.blend(polar.im, old.im),
                    },
                );
                let mag = polar.re.to_array();
                for lane in 0..SIMD_CHANNELS {
                    if mask & (1 << lane) != 0 {
                        energy[pkg][lane] += mag[lane] * mag[lane];
                        peak[pkg][lane] = peak[pkg][lane].max(mag[lane]);
                    }
                }
            }
        });

        // Pass 2: power-law shape within the magnitude window
        let exponent = self.amount.to_array().map(|a| (a).exp2());
        let min_w = self.min_mag.to_array();
        let max_w = self.max_mag.to_array();
        let mut shaped_energy = vec![[0.0f64; SIMD_CHANNELS]; packages];
        for_each_processed_bin(&self.bounds, bins, |bin, mask| {
            for pkg in 0..packages {
                let mut value = dst.package(pkg, bin);
                let mut mag = value.re.to_array();
                for lane in 0..SIMD_CHANNELS {
                    if mask & (1 << lane) == 0 {
                        continue;
                    }
                    let p = peak[pkg][lane];
                    if p > 0.0 {
                        let x = mag[lane] / p;
                        if x >= min_w[lane] && x <= max_w[lane] {
                            mag[lane] = p * x.powf(exponent[lane]);
                        }
                    }
                    shaped_energy[pkg][lane] += mag[lane] * mag[lane];
                }
                value.re = f64x4::new(mag);
                dst.set_package(pkg, bin, value);
            }
        });

        // Pass 3: rescale so the region's energy matches the input
        let mut gain = vec![[1.0f64; SIMD_CHANNELS]; packages];
        for pkg in 0..packages {
            for lane in 0..SIMD_CHANNELS {
                if shaped_energy[pkg][lane] > 0.0 {
                    gain[pkg][lane] = (energy[pkg][lane] / shaped_energy[pkg][lane]).sqrt();
                }
            }
        }
        for_each_processed_bin(&self.bounds, bins, |bin, mask| {
            for pkg in 0..packages {
                let mut value = dst.package(pkg, bin);
                let mut g = gain[pkg];
                for lane in 0..SIMD_CHANNELS {
                    if mask & (1 << lane) == 0 {
                        g[lane] = 1.0;
                    }
                }
                value.re *= f64x4::new(g);
                dst.set_package(pkg, bin, value);
            }
        });

        copy_unprocessed(dst, src, &self.bounds, channels);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use sw_core::Sample;

    fn region_energy(buf: &SpectralBuffer, channel: usize, bins: usize) -> Sample {
        let mut sum = 0.0;
        for bin in 0..bins {
            let (mag, _) = buf.read_at(channel, bin);
            sum += mag * mag;
        }
        sum
    }

    fn ramp_buffer(bins: usize) -> SpectralBuffer {
        let mut buf = SpectralBuffer::new(2, bins);
        for bin in 0..bins {
            let mag = 0.1 + 0.9 * bin as f64 / (bins - 1) as f64;
            buf.write_at(0, bin, mag, 0.0);
            buf.write_at(1, bin, mag, 0.0);
        }
        buf
    }

    #[test]
    fn zero_amount_preserves_magnitudes() {
        let src = ramp_buffer(33);
        let mut dst = SpectralBuffer::new(2, 33);
        let mut fx = ContrastEffect::default();
        fx.process(&src, &mut dst, 2);
        assert_eq!(dst.repr(), SpectralRepr::Polar);
        for bin in 0..33 {
            let want = src.read_at(0, bin).0;
            assert_relative_eq!(dst.read_at(0, bin).0, want, epsilon = 1e-12);
        }
    }

    #[test]
    fn energy_is_preserved() {
        let src = ramp_buffer(33);
        let before = region_energy(&{
            let mut p = src.clone();
            p.convert_to(SpectralRepr::Polar);
            p
        }, 0, 33);
        let mut dst = SpectralBuffer::new(2, 33);
        let mut fx = ContrastEffect {
            amount: f64x4::splat(1.5),
            ..ContrastEffect::default()
        };
        fx.process(&src, &mut dst, 2);
        let after = region_energy(&dst, 0, 33);
        assert_relative_eq!(after, before, epsilon = 1e-9);
    }

    #[test]
    fn positive_amount_widens_the_spread() {
        let src = ramp_buffer(33);
        let mut dst = SpectralBuffer::new(2, 33);
        let mut fx = ContrastEffect {
            amount: f64x4::splat(1.0),
            ..ContrastEffect::default()
        };
        fx.process(&src, &mut dst, 2);
        let lo_in = src.read_at(0, 0).0;
        let hi_in = src.read_at(0, 32).0;
        let lo_out = dst.read_at(0, 0).0;
        let hi_out = dst.read_at(0, 32).0;
        assert!(hi_out / lo_out > hi_in / lo_in);
    }

    #[test]
    fn bins_outside_bounds_stay_cartesian_values_converted() {
        let mut src = SpectralBuffer::new(2, 33);
        src.write_at(0, 1, 3.0, 4.0);
        let mut dst = SpectralBuffer::new(2, 33);
        let mut fx = ContrastEffect {
            bounds: Bounds::mono(0.5, 1.0),
            amount: f64x4::splat(1.0),
            ..ContrastEffect::default()
        };
        fx.process(&src, &mut dst, 2);
        // Outside bin copied through as polar to match the buffer tag
        let (mag, phase) = dst.read_at(0, 1);
        assert_relative_eq!(mag, 5.0, epsilon = 1e-12);
        assert_relative_eq!(phase, (4.0f64).atan2(3.0), epsilon = 1e-12);
    }
}
