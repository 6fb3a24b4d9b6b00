//! Per-order real FFT plan set
//!
//! One immutable forward/inverse plan pair per supported power-of-two
//! order, all built at construction so selecting a new order at runtime
//! never allocates on the audio thread.

use std::sync::Arc;

use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;
use sw_core::Sample;

/// Smallest supported FFT order (2^7 = 128 samples)
pub const MIN_FFT_ORDER: u32 = 7;
/// Largest supported FFT order (2^14 = 16384 samples)
pub const MAX_FFT_ORDER: u32 = 14;

/// Forward/inverse real-FFT plans for every supported order
pub struct TransformSet {
    forward: Vec<Arc<dyn RealToComplex<Sample>>>,
    inverse: Vec<Arc<dyn ComplexToReal<Sample>>>,
}

impl TransformSet {
    pub fn new() -> Self {
        let mut planner = RealFftPlanner::<Sample>::new();
        let mut forward = Vec::new();
        let mut inverse = Vec::new();
        for order in MIN_FFT_ORDER..=MAX_FFT_ORDER {
            let size = 1usize << order;
            forward.push(planner.plan_fft_forward(size));
            inverse.push(planner.plan_fft_inverse(size));
        }
        Self { forward, inverse }
    }

    #[inline]
    pub fn fft_size(order: u32) -> usize {
        debug_assert!((MIN_FFT_ORDER..=MAX_FFT_ORDER).contains(&order));
        1usize << order
    }

    /// Number of packed frequency bins for an order. DC and Nyquist carry
    /// no phase; realfft packs them into the first and last bin.
    #[inline]
    pub fn bins(order: u32) -> usize {
        (1usize << order) / 2 + 1
    }

    /// Time domain -> packed spectrum. `time` is consumed as scratch.
    pub fn forward(&self, order: u32, time: &mut [Sample], spectrum: &mut [Complex<Sample>]) {
        let idx = (order - MIN_FFT_ORDER) as usize;
        debug_assert_eq!(time.len(), Self::fft_size(order));
        debug_assert_eq!(spectrum.len(), Self::bins(order));
        // Length mismatches are caught by the asserts above; realfft's own
        // error path is unreachable here.
        self.forward[idx].process(time, spectrum).ok();
    }

    /// Packed spectrum -> time domain, scaled by 1/N (realfft leaves the
    /// inverse un-normalized). `spectrum` is consumed as scratch.
    pub fn inverse(&self, order: u32, spectrum: &mut [Complex<Sample>], time: &mut [Sample]) {
        let idx = (order - MIN_FFT_ORDER) as usize;
        debug_assert_eq!(time.len(), Self::fft_size(order));
        debug_assert_eq!(spectrum.len(), Self::bins(order));
        self.inverse[idx].process(spectrum, time).ok();
        let norm = 1.0 / Self::fft_size(order) as Sample;
        for sample in time.iter_mut() {
            *sample *= norm;
        }
    }
}

impl Default for TransformSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn sizes_and_bins() {
        assert_eq!(TransformSet::fft_size(7), 128);
        assert_eq!(TransformSet::fft_size(14), 16384);
        assert_eq!(TransformSet::bins(10), 513);
    }

    #[test]
    fn forward_inverse_round_trip() {
        let transforms = TransformSet::new();
        let order = 9;
        let size = TransformSet::fft_size(order);

        let signal: Vec<Sample> = (0..size)
            .map(|i| (2.0 * PI * 13.0 * i as f64 / size as f64).sin())
            .collect();

        let mut time = signal.clone();
        let mut spectrum = vec![Complex::new(0.0, 0.0); TransformSet::bins(order)];
        transforms.forward(order, &mut time, &mut spectrum);

        let mut out = vec![0.0; size];
        transforms.inverse(order, &mut spectrum, &mut out);

        for (a, b) in signal.iter().zip(&out) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn pure_tone_lands_in_one_bin() {
        let transforms = TransformSet::new();
        let order = 8;
        let size = TransformSet::fft_size(order);
        let bin = 20;

        let mut time: Vec<Sample> = (0..size)
            .map(|i| (2.0 * PI * bin as f64 * i as f64 / size as f64).cos())
            .collect();
        let mut spectrum = vec![Complex::new(0.0, 0.0); TransformSet::bins(order)];
        transforms.forward(order, &mut time, &mut spectrum);

        let peak = spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.norm().partial_cmp(&b.1.norm()).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, bin);
    }
}
