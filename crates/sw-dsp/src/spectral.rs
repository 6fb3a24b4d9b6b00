//! SIMD-packed spectral buffer
//!
//! Complex frequency-domain bins stored channel-package-major: one 4-wide
//! f64 register holds the same bin for four logical channels (two stereo
//! pairs). Logical channel `c` maps to package `c / 4`, lane `c % 4`.
//!
//! A buffer carries a representation tag; all bins share one representation
//! at any instant. Effects that need polar data convert on entry, and the
//! lane that ran them records whether the buffer was left non-cartesian.

use std::sync::Arc;

use sw_core::{Sample, SIMD_CHANNELS};
use wide::f64x4;

use crate::ring::BlendOp;

/// How the complex bins are currently encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SpectralRepr {
    /// (real, imaginary)
    Cartesian,
    /// (magnitude, phase)
    Polar,
}

/// One bin for four packed logical channels
#[derive(Debug, Clone, Copy)]
pub struct ComplexSimd {
    pub re: f64x4,
    pub im: f64x4,
}

impl ComplexSimd {
    #[inline]
    pub fn zero() -> Self {
        Self {
            re: f64x4::ZERO,
            im: f64x4::ZERO,
        }
    }

    #[inline]
    pub fn splat(re: Sample, im: Sample) -> Self {
        Self {
            re: f64x4::splat(re),
            im: f64x4::splat(im),
        }
    }

    #[inline]
    pub fn add(self, rhs: Self) -> Self {
        Self {
            re: self.re + rhs.re,
            im: self.im + rhs.im,
        }
    }

    /// Component-wise scale by a per-lane factor
    #[inline]
    pub fn scale(self, factor: f64x4) -> Self {
        Self {
            re: self.re * factor,
            im: self.im * factor,
        }
    }

    /// Complex multiply, lane-parallel
    #[inline]
    pub fn mul(self, rhs: Self) -> Self {
        Self {
            re: self.re * rhs.re - self.im * rhs.im,
            im: self.re * rhs.im + self.im * rhs.re,
        }
    }

    /// Cartesian -> (magnitude, phase). atan2 has no vector form in `wide`,
    /// so the phase falls back to per-lane scalar math.
    pub fn to_polar(self) -> Self {
        let re = self.re.to_array();
        let im = self.im.to_array();
        let mut mag = [0.0; SIMD_CHANNELS];
        let mut phase = [0.0; SIMD_CHANNELS];
        for i in 0..SIMD_CHANNELS {
            mag[i] = (re[i] * re[i] + im[i] * im[i]).sqrt();
            phase[i] = im[i].atan2(re[i]);
        }
        Self {
            re: f64x4::new(mag),
            im: f64x4::new(phase),
        }
    }

    /// (magnitude, phase) -> cartesian
    pub fn from_polar(self) -> Self {
        let mag = self.re.to_array();
        let phase = self.im.to_array();
        let mut re = [0.0; SIMD_CHANNELS];
        let mut im = [0.0; SIMD_CHANNELS];
        for i in 0..SIMD_CHANNELS {
            re[i] = mag[i] * phase[i].cos();
            im[i] = mag[i] * phase[i].sin();
        }
        Self {
            re: f64x4::new(re),
            im: f64x4::new(im),
        }
    }
}

/// Build a lane-select mask vector from a 4-bit channel mask
#[inline]
pub fn lane_mask(mask: u8) -> f64x4 {
    let mut lanes = [0.0f64; SIMD_CHANNELS];
    for (i, lane) in lanes.iter_mut().enumerate() {
        if mask & (1 << i) != 0 {
            *lane = f64::from_bits(u64::MAX);
        }
    }
    f64x4::new(lanes)
}

/// Mask selecting every lane
pub const FULL_MASK: u8 = 0b1111;

/// Channel-package-major store of SIMD-packed complex bins
#[derive(Clone)]
pub struct SpectralBuffer {
    /// `packages * bins` entries; index = package * bins + bin
    data: Vec<ComplexSimd>,
    channels: usize,
    packages: usize,
    bins: usize,
    repr: SpectralRepr,
}

impl SpectralBuffer {
    pub fn new(channels: usize, bins: usize) -> Self {
        assert!(channels > 0 && bins > 0);
        let packages = channels.div_ceil(SIMD_CHANNELS);
        Self {
            data: vec![ComplexSimd::zero(); packages * bins],
            channels,
            packages,
            bins,
            repr: SpectralRepr::Cartesian,
        }
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn packages(&self) -> usize {
        self.packages
    }

    #[inline]
    pub fn bins(&self) -> usize {
        self.bins
    }

    #[inline]
    pub fn repr(&self) -> SpectralRepr {
        self.repr
    }

    #[inline]
    pub fn set_repr(&mut self, repr: SpectralRepr) {
        self.repr = repr;
    }

    /// Grow capacity, preserving existing bins and zero-filling new space
    pub fn reserve(&mut self, channels: usize, bins: usize) {
        if channels <= self.channels && bins <= self.bins {
            self.channels = self.channels.max(channels);
            return;
        }
        let new_channels = channels.max(self.channels);
        let new_bins = bins.max(self.bins);
        let new_packages = new_channels.div_ceil(SIMD_CHANNELS);
        let mut data = vec![ComplexSimd::zero(); new_packages * new_bins];
        for pkg in 0..self.packages.min(new_packages) {
            for bin in 0..self.bins {
                data[pkg * new_bins + bin] = self.data[pkg * self.bins + bin];
            }
        }
        self.data = data;
        self.channels = new_channels;
        self.packages = new_packages;
        self.bins = new_bins;
    }

    /// Set the exact geometry. Unlike `reserve` this shrinks, so a
    /// smaller analysis frame never leaves stale high bins behind. Any
    /// geometry change discards content and resets to cartesian zero.
    pub fn resize(&mut self, channels: usize, bins: usize) {
        assert!(channels > 0 && bins > 0);
        if channels == self.channels && bins == self.bins {
            return;
        }
        log::debug!(
            "spectral buffer {}x{} -> {}x{}",
            self.channels,
            self.bins,
            channels,
            bins
        );
        let packages = channels.div_ceil(SIMD_CHANNELS);
        self.data.clear();
        self.data.resize(packages * bins, ComplexSimd::zero());
        self.channels = channels;
        self.packages = packages;
        self.bins = bins;
        self.repr = SpectralRepr::Cartesian;
    }

    /// Read one scalar complex value
    #[inline]
    pub fn read_at(&self, channel: usize, bin: usize) -> (Sample, Sample) {
        assert!(channel < self.channels && bin < self.bins);
        let pkg = self.data[(channel / SIMD_CHANNELS) * self.bins + bin];
        let lane = channel % SIMD_CHANNELS;
        (pkg.re.to_array()[lane], pkg.im.to_array()[lane])
    }

    /// Write one scalar complex value
    pub fn write_at(&mut self, channel: usize, bin: usize, re: Sample, im: Sample) {
        assert!(channel < self.channels && bin < self.bins);
        let idx = (channel / SIMD_CHANNELS) * self.bins + bin;
        let lane = channel % SIMD_CHANNELS;
        let mut res = self.data[idx].re.to_array();
        let mut ims = self.data[idx].im.to_array();
        res[lane] = re;
        ims[lane] = im;
        self.data[idx] = ComplexSimd {
            re: f64x4::new(res),
            im: f64x4::new(ims),
        };
    }

    /// Read one full SIMD package
    #[inline]
    pub fn package(&self, pkg: usize, bin: usize) -> ComplexSimd {
        assert!(pkg < self.packages && bin < self.bins);
        self.data[pkg * self.bins + bin]
    }

    /// Write one full SIMD package
    #[inline]
    pub fn set_package(&mut self, pkg: usize, bin: usize, value: ComplexSimd) {
        assert!(pkg < self.packages && bin < self.bins);
        self.data[pkg * self.bins + bin] = value;
    }

    /// Convert every bin to the requested representation in place
    pub fn convert_to(&mut self, repr: SpectralRepr) {
        if self.repr == repr {
            return;
        }
        match repr {
            SpectralRepr::Polar => {
                for v in self.data.iter_mut() {
                    *v = v.to_polar();
                }
            }
            SpectralRepr::Cartesian => {
                for v in self.data.iter_mut() {
                    *v = v.from_polar();
                }
            }
        }
        self.repr = repr;
    }

    pub fn clear(&mut self) {
        self.data.fill(ComplexSimd::zero());
        self.repr = SpectralRepr::Cartesian;
    }

    /// Bulk copy/merge between buffers with the ring-buffer operation set,
    /// gated per SIMD lane by `merge_mask` so part of a package (one stereo
    /// pair of the four packed channels) can be left untouched.
    ///
    /// Channel offsets must be package-aligned; sub-package selection is
    /// the mask's job.
    pub fn apply_to(
        dest: &mut SpectralBuffer,
        src: &SpectralBuffer,
        channels: usize,
        bins: usize,
        op: BlendOp,
        merge_mask: u8,
        dest_channel_offset: usize,
        src_channel_offset: usize,
    ) {
        assert_eq!(dest_channel_offset % SIMD_CHANNELS, 0);
        assert_eq!(src_channel_offset % SIMD_CHANNELS, 0);
        assert!(dest_channel_offset + channels <= dest.channels);
        assert!(src_channel_offset + channels <= src.channels);
        assert!(bins <= dest.bins && bins <= src.bins);

        let mask = lane_mask(merge_mask);
        let packages = channels.div_ceil(SIMD_CHANNELS);
        let dest_pkg0 = dest_channel_offset / SIMD_CHANNELS;
        let src_pkg0 = src_channel_offset / SIMD_CHANNELS;
        let ramp_step = 1.0 / bins as f64;

        for pkg in 0..packages {
            for bin in 0..bins {
                let s = src.package(src_pkg0 + pkg, bin);
                let d = dest.package(dest_pkg0 + pkg, bin);
                let t = f64x4::splat(ramp_step * bin as f64);
                let blended = match op {
                    BlendOp::Assign => s,
                    BlendOp::Add => d.add(s),
                    BlendOp::Multiply => d.mul(s),
                    BlendOp::FadeInAdd => d.add(s.scale(t)),
                    BlendOp::FadeOutAdd => d.add(s.scale(f64x4::ONE - t)),
                    BlendOp::Interpolate => d.scale(f64x4::ONE - t).add(s.scale(t)),
                };
                let merged = ComplexSimd {
                    re: mask.blend(blended.re, d.re),
                    im: mask.blend(blended.im, d.im),
                };
                dest.set_package(dest_pkg0 + pkg, bin, merged);
            }
        }
        if op == BlendOp::Assign && merge_mask == FULL_MASK {
            dest.repr = src.repr;
        }
    }
}

/// Read-only, ownership-sharing window into a spectral buffer
///
/// Cloning a view clones the `Arc`, never the bins; one analysis frame
/// fans out to every lane without copying. Views never mutate; only the
/// owning buffer swaps or frees storage.
#[derive(Clone)]
pub struct SpectralView {
    inner: Arc<SpectralBuffer>,
    channel_offset: usize,
}

impl SpectralView {
    pub fn new(inner: Arc<SpectralBuffer>, channel_offset: usize) -> Self {
        assert_eq!(channel_offset % SIMD_CHANNELS, 0);
        assert!(channel_offset < inner.channels());
        Self {
            inner,
            channel_offset,
        }
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.inner.channels() - self.channel_offset
    }

    #[inline]
    pub fn bins(&self) -> usize {
        self.inner.bins()
    }

    #[inline]
    pub fn repr(&self) -> SpectralRepr {
        self.inner.repr()
    }

    #[inline]
    pub fn channel_offset(&self) -> usize {
        self.channel_offset
    }

    /// The shared backing buffer, for bulk `apply_to` sourcing
    #[inline]
    pub fn buffer(&self) -> &SpectralBuffer {
        &self.inner
    }

    #[inline]
    pub fn read_at(&self, channel: usize, bin: usize) -> (Sample, Sample) {
        self.inner.read_at(channel + self.channel_offset, bin)
    }

    #[inline]
    pub fn package(&self, pkg: usize, bin: usize) -> ComplexSimd {
        self.inner
            .package(pkg + self.channel_offset / SIMD_CHANNELS, bin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(channels: usize, bins: usize) -> SpectralBuffer {
        let mut buf = SpectralBuffer::new(channels, bins);
        for c in 0..channels {
            for b in 0..bins {
                buf.write_at(c, b, (c * 100 + b) as f64, -((c * 100 + b) as f64));
            }
        }
        buf
    }

    #[test]
    fn scalar_read_write_round_trip() {
        let buf = filled(6, 5);
        assert_eq!(buf.read_at(0, 0), (0.0, 0.0));
        assert_eq!(buf.read_at(5, 3), (503.0, -503.0));
    }

    #[test]
    fn assign_full_mask_is_blind_copy() {
        for (dest_off, src_off) in [(0, 0), (4, 0), (0, 4)] {
            let src = filled(8, 6);
            let mut dest = SpectralBuffer::new(8, 6);
            SpectralBuffer::apply_to(
                &mut dest,
                &src,
                4,
                6,
                BlendOp::Assign,
                FULL_MASK,
                dest_off,
                src_off,
            );
            for c in 0..4 {
                for b in 0..6 {
                    assert_eq!(dest.read_at(c + dest_off, b), src.read_at(c + src_off, b));
                }
            }
        }
    }

    #[test]
    fn partial_mask_leaves_other_lanes_untouched() {
        let src = filled(4, 4);
        let mut dest = SpectralBuffer::new(4, 4);
        for b in 0..4 {
            dest.write_at(2, b, 7.0, 7.0);
            dest.write_at(3, b, 9.0, 9.0);
        }
        // Update only the first stereo pair in the package
        SpectralBuffer::apply_to(&mut dest, &src, 4, 4, BlendOp::Assign, 0b0011, 0, 0);
        assert_eq!(dest.read_at(0, 1), src.read_at(0, 1));
        assert_eq!(dest.read_at(1, 2), src.read_at(1, 2));
        assert_eq!(dest.read_at(2, 1), (7.0, 7.0));
        assert_eq!(dest.read_at(3, 3), (9.0, 9.0));
    }

    #[test]
    fn polar_round_trip() {
        let mut buf = filled(2, 8);
        let before: Vec<_> = (0..8).map(|b| buf.read_at(1, b)).collect();
        buf.convert_to(SpectralRepr::Polar);
        assert_eq!(buf.repr(), SpectralRepr::Polar);
        buf.convert_to(SpectralRepr::Cartesian);
        for (b, &(re, im)) in before.iter().enumerate() {
            let (r2, i2) = buf.read_at(1, b);
            assert!((re - r2).abs() < 1e-9, "bin {b}");
            assert!((im - i2).abs() < 1e-9, "bin {b}");
        }
    }

    #[test]
    fn reserve_preserves_bins() {
        let mut buf = filled(2, 4);
        buf.reserve(2, 16);
        assert_eq!(buf.bins(), 16);
        assert_eq!(buf.read_at(1, 3), (103.0, -103.0));
        assert_eq!(buf.read_at(1, 10), (0.0, 0.0));
    }

    #[test]
    fn resize_shrinks_and_clears() {
        let mut buf = filled(4, 16);
        buf.convert_to(SpectralRepr::Polar);
        buf.resize(4, 8);
        assert_eq!(buf.bins(), 8);
        assert_eq!(buf.repr(), SpectralRepr::Cartesian);
        assert_eq!(buf.read_at(1, 3), (0.0, 0.0));

        // Same geometry keeps content
        let mut buf = filled(4, 16);
        buf.resize(4, 16);
        assert_eq!(buf.read_at(1, 3), (103.0, -103.0));
    }

    #[test]
    fn view_offsets_channels_without_copying() {
        let shared = Arc::new(filled(8, 4));
        let front = SpectralView::new(Arc::clone(&shared), 0);
        let back = SpectralView::new(Arc::clone(&shared), 4);
        assert_eq!(front.channels(), 8);
        assert_eq!(back.channels(), 4);
        assert_eq!(back.read_at(0, 2), shared.read_at(4, 2));
        assert_eq!(back.channel_offset(), 4);
        let pkg = back.package(0, 1);
        assert_eq!(pkg.re.to_array()[1], shared.read_at(5, 1).0);
    }
}
