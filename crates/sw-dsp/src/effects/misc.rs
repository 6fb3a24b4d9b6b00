//! The smaller per-bin effects
//!
//! Each one follows the same shape as the filter: visit the active region
//! through `for_each_processed_bin`, write masked lanes into the
//! destination, pass the rest through with `copy_unprocessed`. Bin
//! remapping (pitch, stretch, warp) wraps or clamps source indices inside
//! each lane's own span so a shifted region never bleeds outside its
//! boundaries.

use sw_core::SIMD_CHANNELS;
use wide::f64x4;

use crate::effects::base::{copy_unprocessed, for_each_processed_bin, lane_span, Bounds};
use crate::spectral::{lane_mask, ComplexSimd, SpectralBuffer, SpectralRepr};

/// Write one bin's masked lanes, leaving the other lanes untouched
#[inline]
fn write_masked(dst: &mut SpectralBuffer, pkg: usize, bin: usize, mask: u8, value: ComplexSimd) {
    let select = lane_mask(mask);
    let old = dst.package(pkg, bin);
    dst.set_package(
        pkg,
        bin,
        ComplexSimd {
            re: select.blend(value.re, old.re),
            im: select.blend(value.im, old.im),
        },
    );
}

/// Wrap-aware position of `bin` inside a lane span
#[inline]
fn span_offset(bin: usize, start: usize, bins: usize) -> usize {
    (bin + bins - start) % bins
}

/// Upward/downward magnitude compression about the region mean.
///
/// `amount` > 0 expands (loud louder, quiet quieter), < 0 compresses
/// toward the mean. Runs polar and leaves the destination polar.
#[derive(Debug, Clone)]
pub struct DynamicsEffect {
    pub bounds: Bounds,
    pub amount: f64x4,
}

impl Default for DynamicsEffect {
    fn default() -> Self {
        Self {
            bounds: Bounds::full(),
            amount: f64x4::ZERO,
        }
    }
}

impl DynamicsEffect {
    pub fn process(&mut self, src: &SpectralBuffer, dst: &mut SpectralBuffer, channels: usize) {
        let bins = dst.bins().min(src.bins());
        let packages = channels.div_ceil(SIMD_CHANNELS);
        dst.set_repr(SpectralRepr::Polar);

        let mut sum = vec![[0.0f64; SIMD_CHANNELS]; packages];
        let mut count = vec![[0usize; SIMD_CHANNELS]; packages];
        for_each_processed_bin(&self.bounds, bins, |bin, mask| {
            for pkg in 0..packages {
                let polar = src.package(pkg, bin).to_polar();
                write_masked(dst, pkg, bin, mask, polar);
                let mag = polar.re.to_array();
                for lane in 0..SIMD_CHANNELS {
                    if mask & (1 << lane) != 0 {
                        sum[pkg][lane] += mag[lane];
                        count[pkg][lane] += 1;
                    }
                }
            }
        });

        let ratio = self.amount.to_array().map(f64::exp2);
        for_each_processed_bin(&self.bounds, bins, |bin, mask| {
            for pkg in 0..packages {
                let mut value = dst.package(pkg, bin);
                let mut mag = value.re.to_array();
                for lane in 0..SIMD_CHANNELS {
                    if mask & (1 << lane) == 0 || count[pkg][lane] == 0 {
                        continue;
                    }
                    let mean = sum[pkg][lane] / count[pkg][lane] as f64;
                    if mean > 0.0 && mag[lane] > 0.0 {
                        mag[lane] = mean * (mag[lane] / mean).powf(ratio[lane]);
                    }
                }
                value.re = f64x4::new(mag);
                dst.set_package(pkg, bin, value);
            }
        });

        copy_unprocessed(dst, src, &self.bounds, channels);
    }
}

/// Constant phase rotation plus deterministic per-bin scrambling.
///
/// Rotation multiplies every bin by `e^(i * rotate)`. Scrambling adds a
/// hash-derived pseudo-random phase per bin, scaled by `scramble`, so the
/// result is reproducible across blocks.
#[derive(Debug, Clone)]
pub struct PhaseEffect {
    pub bounds: Bounds,
    /// Rotation angle in radians per lane
    pub rotate: f64x4,
    /// Scramble depth, 0 (none) to 1 (full-circle random offsets)
    pub scramble: f64x4,
}

impl Default for PhaseEffect {
    fn default() -> Self {
        Self {
            bounds: Bounds::full(),
            rotate: f64x4::ZERO,
            scramble: f64x4::ZERO,
        }
    }
}

/// Bin index to a stable pseudo-random value in [-1, 1]
#[inline]
fn bin_noise(bin: usize) -> f64 {
    let mut x = bin as u64 ^ 0x9e37_79b9_7f4a_7c15;
    x ^= x >> 30;
    x = x.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^= x >> 31;
    (x >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0
}

impl PhaseEffect {
    pub fn process(&mut self, src: &SpectralBuffer, dst: &mut SpectralBuffer, channels: usize) {
        debug_assert_eq!(src.repr(), SpectralRepr::Cartesian);
        let bins = dst.bins().min(src.bins());
        let packages = channels.div_ceil(SIMD_CHANNELS);
        dst.set_repr(SpectralRepr::Cartesian);

        let rotate = self.rotate.to_array();
        let scramble = self.scramble.to_array();
        for_each_processed_bin(&self.bounds, bins, |bin, mask| {
            let noise = bin_noise(bin) * std::f64::consts::PI;
            let mut re = [0.0; SIMD_CHANNELS];
            let mut im = [0.0; SIMD_CHANNELS];
            for lane in 0..SIMD_CHANNELS {
                let angle = rotate[lane] + scramble[lane] * noise;
                re[lane] = angle.cos();
                im[lane] = angle.sin();
            }
            let rotor = ComplexSimd {
                re: f64x4::new(re),
                im: f64x4::new(im),
            };
            for pkg in 0..packages {
                write_masked(dst, pkg, bin, mask, src.package(pkg, bin).mul(rotor));
            }
        });

        copy_unprocessed(dst, src, &self.bounds, channels);
    }
}

/// Linear bin shift with wrap inside the active region.
///
/// `shift` is a normalized fraction of the full bin range; positive moves
/// content upward. Bins shifted past a lane's boundary re-enter at the
/// other edge of that lane's span.
#[derive(Debug, Clone)]
pub struct PitchEffect {
    pub bounds: Bounds,
    pub shift: f64x4,
}

impl Default for PitchEffect {
    fn default() -> Self {
        Self {
            bounds: Bounds::full(),
            shift: f64x4::ZERO,
        }
    }
}

impl PitchEffect {
    pub fn process(&mut self, src: &SpectralBuffer, dst: &mut SpectralBuffer, channels: usize) {
        debug_assert_eq!(src.repr(), SpectralRepr::Cartesian);
        let bins = dst.bins().min(src.bins());
        let packages = channels.div_ceil(SIMD_CHANNELS);
        dst.set_repr(SpectralRepr::Cartesian);

        let shift = self.shift.to_array();
        let spans: Vec<(usize, usize)> = (0..SIMD_CHANNELS)
            .map(|lane| lane_span(&self.bounds, bins, lane))
            .collect();

        for_each_processed_bin(&self.bounds, bins, |bin, mask| {
            for lane in 0..SIMD_CHANNELS {
                if mask & (1 << lane) == 0 {
                    continue;
                }
                let (start, count) = spans[lane];
                let shift_bins = (shift[lane] * (bins - 1) as f64).round() as i64;
                let offset = span_offset(bin, start, bins) as i64;
                let src_off = (offset - shift_bins).rem_euclid(count as i64) as usize;
                let src_bin = (start + src_off) % bins;
                for pkg in 0..packages {
                    write_masked(dst, pkg, bin, 1 << lane, src.package(pkg, src_bin));
                }
            }
        });

        copy_unprocessed(dst, src, &self.bounds, channels);
    }
}

/// Bin index remap by a stretch factor about the region's low edge.
///
/// `factor` > 1 spreads content upward (nearest-neighbor resample of the
/// source span); source positions past the span edge read as silence.
#[derive(Debug, Clone)]
pub struct StretchEffect {
    pub bounds: Bounds,
    pub factor: f64x4,
}

impl Default for StretchEffect {
    fn default() -> Self {
        Self {
            bounds: Bounds::full(),
            factor: f64x4::ONE,
        }
    }
}

impl StretchEffect {
    pub fn process(&mut self, src: &SpectralBuffer, dst: &mut SpectralBuffer, channels: usize) {
        debug_assert_eq!(src.repr(), SpectralRepr::Cartesian);
        let bins = dst.bins().min(src.bins());
        let packages = channels.div_ceil(SIMD_CHANNELS);
        dst.set_repr(SpectralRepr::Cartesian);

        let factor = self.factor.to_array();
        let spans: Vec<(usize, usize)> = (0..SIMD_CHANNELS)
            .map(|lane| lane_span(&self.bounds, bins, lane))
            .collect();

        for_each_processed_bin(&self.bounds, bins, |bin, mask| {
            for lane in 0..SIMD_CHANNELS {
                if mask & (1 << lane) == 0 {
                    continue;
                }
                let (start, count) = spans[lane];
                let f = factor[lane].max(1e-3);
                let offset = span_offset(bin, start, bins) as f64;
                let src_off = (offset / f).round() as usize;
                for pkg in 0..packages {
                    let v = if src_off < count {
                        src.package(pkg, (start + src_off) % bins)
                    } else {
                        ComplexSimd::zero()
                    };
                    write_masked(dst, pkg, bin, 1 << lane, v);
                }
            }
        });

        copy_unprocessed(dst, src, &self.bounds, channels);
    }
}

/// Magnitude-dependent bin displacement.
///
/// Each destination bin reads from a source bin displaced in proportion
/// to the source's local magnitude: loud content smears further than
/// quiet content. Displacement clamps at the lane's span edges.
#[derive(Debug, Clone)]
pub struct WarpEffect {
    pub bounds: Bounds,
    /// Maximum displacement as a fraction of the span, signed
    pub amount: f64x4,
}

impl Default for WarpEffect {
    fn default() -> Self {
        Self {
            bounds: Bounds::full(),
            amount: f64x4::ZERO,
        }
    }
}

impl WarpEffect {
    pub fn process(&mut self, src: &SpectralBuffer, dst: &mut SpectralBuffer, channels: usize) {
        debug_assert_eq!(src.repr(), SpectralRepr::Cartesian);
        let bins = dst.bins().min(src.bins());
        let packages = channels.div_ceil(SIMD_CHANNELS);
        dst.set_repr(SpectralRepr::Cartesian);

        // Per-lane peak magnitude of package 0 sets the reference level
        let mut peak = [0.0f64; SIMD_CHANNELS];
        for_each_processed_bin(&self.bounds, bins, |bin, mask| {
            let v = src.package(0, bin);
            let re = v.re.to_array();
            let im = v.im.to_array();
            for lane in 0..SIMD_CHANNELS {
                if mask & (1 << lane) != 0 {
                    let m = (re[lane] * re[lane] + im[lane] * im[lane]).sqrt();
                    peak[lane] = peak[lane].max(m);
                }
            }
        });

        let amount = self.amount.to_array();
        let spans: Vec<(usize, usize)> = (0..SIMD_CHANNELS)
            .map(|lane| lane_span(&self.bounds, bins, lane))
            .collect();

        for_each_processed_bin(&self.bounds, bins, |bin, mask| {
            for lane in 0..SIMD_CHANNELS {
                if mask & (1 << lane) == 0 {
                    continue;
                }
                let (start, count) = spans[lane];
                let v = src.package(0, bin);
                let re = v.re.to_array()[lane];
                let im = v.im.to_array()[lane];
                let mag = (re * re + im * im).sqrt();
                let norm = if peak[lane] > 0.0 { mag / peak[lane] } else { 0.0 };
                let disp = (amount[lane] * norm * count as f64).round() as i64;
                let offset = span_offset(bin, start, bins) as i64;
                let src_off = (offset - disp).clamp(0, count as i64 - 1) as usize;
                let src_bin = (start + src_off) % bins;
                for pkg in 0..packages {
                    write_masked(dst, pkg, bin, 1 << lane, src.package(pkg, src_bin));
                }
            }
        });

        copy_unprocessed(dst, src, &self.bounds, channels);
    }
}

/// Magnitude quantizer and gate.
///
/// Magnitudes below `threshold` (relative to the region peak) are zeroed;
/// the rest are quantized to `levels` steps of the peak. `levels` of zero
/// disables quantization and leaves only the gate.
#[derive(Debug, Clone)]
pub struct DestroyEffect {
    pub bounds: Bounds,
    pub threshold: f64x4,
    pub levels: f64x4,
}

impl Default for DestroyEffect {
    fn default() -> Self {
        Self {
            bounds: Bounds::full(),
            threshold: f64x4::ZERO,
            levels: f64x4::ZERO,
        }
    }
}

impl DestroyEffect {
    pub fn process(&mut self, src: &SpectralBuffer, dst: &mut SpectralBuffer, channels: usize) {
        debug_assert_eq!(src.repr(), SpectralRepr::Cartesian);
        let bins = dst.bins().min(src.bins());
        let packages = channels.div_ceil(SIMD_CHANNELS);
        dst.set_repr(SpectralRepr::Cartesian);

        // Peak per package and lane, so the gate tracks each channel
        let mut peak = vec![[0.0f64; SIMD_CHANNELS]; packages];
        for_each_processed_bin(&self.bounds, bins, |bin, mask| {
            for pkg in 0..packages {
                let v = src.package(pkg, bin);
                let re = v.re.to_array();
                let im = v.im.to_array();
                for lane in 0..SIMD_CHANNELS {
                    if mask & (1 << lane) != 0 {
                        let m = (re[lane] * re[lane] + im[lane] * im[lane]).sqrt();
                        peak[pkg][lane] = peak[pkg][lane].max(m);
                    }
                }
            }
        });

        let threshold = self.threshold.to_array();
        let levels = self.levels.to_array();
        for_each_processed_bin(&self.bounds, bins, |bin, mask| {
            for pkg in 0..packages {
                let v = src.package(pkg, bin);
                let re = v.re.to_array();
                let im = v.im.to_array();
                let mut gains = [1.0f64; SIMD_CHANNELS];
                for lane in 0..SIMD_CHANNELS {
                    if mask & (1 << lane) == 0 {
                        continue;
                    }
                    let p = peak[pkg][lane];
                    if p <= 0.0 {
                        continue;
                    }
                    let mag = (re[lane] * re[lane] + im[lane] * im[lane]).sqrt();
                    let norm = mag / p;
                    if norm < threshold[lane] {
                        gains[lane] = 0.0;
                    } else if levels[lane] >= 1.0 && mag > 0.0 {
                        let step = 1.0 / levels[lane];
                        let quantized = (norm / step).round() * step;
                        gains[lane] = quantized / norm;
                    }
                }
                write_masked(dst, pkg, bin, mask, v.scale(f64x4::new(gains)));
            }
        });

        copy_unprocessed(dst, src, &self.bounds, channels);
    }
}
