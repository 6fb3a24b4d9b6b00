//! Window function lookup tables
//!
//! Windows are evaluated once into a table and sampled with linear
//! interpolation so a frame of any size shares one table. Each family
//! carries its mean value, from which the engine derives the overlap-add
//! gain compensation factor.

use std::f64::consts::PI;

use sw_core::Sample;

/// Supported window families
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum WindowKind {
    Rectangle,
    Hann,
    Hamming,
    Triangle,
    Sine,
    /// Symmetric exponential decay from the center
    Exponential,
    /// Hann shaped by an exponential skirt
    HannExponential,
    Lanczos,
}

impl WindowKind {
    /// Families in host-parameter order
    pub const ALL: [WindowKind; 8] = [
        WindowKind::Rectangle,
        WindowKind::Hann,
        WindowKind::Hamming,
        WindowKind::Triangle,
        WindowKind::Sine,
        WindowKind::Exponential,
        WindowKind::HannExponential,
        WindowKind::Lanczos,
    ];

    /// Family for an indexed host parameter value, saturating at the end
    /// of the list.
    pub fn from_index(index: usize) -> WindowKind {
        Self::ALL[index.min(Self::ALL.len() - 1)]
    }

    /// Mean window value across [0, 1]. These are the fixed per-family
    /// constants behind the overlap-add compensation factor.
    pub fn mean(self) -> f64 {
        match self {
            WindowKind::Rectangle => 1.0,
            WindowKind::Hann => 0.5,
            WindowKind::Hamming => 0.54,
            WindowKind::Triangle => 0.5,
            WindowKind::Sine => 2.0 / PI,
            WindowKind::Exponential => 0.166,
            WindowKind::HannExponential => 0.501,
            WindowKind::Lanczos => 0.589,
        }
    }

    /// Whether overlap-add with this window needs the fade split at the
    /// frame boundary. Rectangle frames butt together without blending.
    pub fn needs_blending(self) -> bool {
        !matches!(self, WindowKind::Rectangle)
    }

    /// Evaluate the window at position x in [0, 1]
    fn evaluate(self, x: f64) -> f64 {
        match self {
            WindowKind::Rectangle => 1.0,
            WindowKind::Hann => 0.5 * (1.0 - (2.0 * PI * x).cos()),
            WindowKind::Hamming => 0.54 - 0.46 * (2.0 * PI * x).cos(),
            WindowKind::Triangle => 1.0 - (2.0 * x - 1.0).abs(),
            WindowKind::Sine => (PI * x).sin(),
            WindowKind::Exponential => (-6.0 * (2.0 * x - 1.0).abs()).exp(),
            WindowKind::HannExponential => {
                let hann = 0.5 * (1.0 - (2.0 * PI * x).cos());
                hann * (-3.0 * (2.0 * x - 1.0).abs()).exp().max(0.25) * 2.0
            }
            WindowKind::Lanczos => {
                let t = 2.0 * x - 1.0;
                if t.abs() < 1e-12 {
                    1.0
                } else {
                    let pt = PI * t;
                    pt.sin() / pt
                }
            }
        }
    }
}

const TABLE_SIZE: usize = 4096;

/// Lookup-table window with linear interpolation
pub struct WindowTable {
    table: Vec<Sample>,
    kind: WindowKind,
}

impl WindowTable {
    pub fn new(kind: WindowKind) -> Self {
        let table = (0..=TABLE_SIZE)
            .map(|i| kind.evaluate(i as f64 / TABLE_SIZE as f64))
            .collect();
        Self { table, kind }
    }

    #[inline]
    pub fn kind(&self) -> WindowKind {
        self.kind
    }

    /// Sample the window at x in [0, 1] with linear interpolation
    #[inline]
    pub fn value(&self, x: f64) -> Sample {
        let pos = x.clamp(0.0, 1.0) * TABLE_SIZE as f64;
        let idx = pos as usize;
        let frac = pos - idx as f64;
        if idx >= TABLE_SIZE {
            return self.table[TABLE_SIZE];
        }
        self.table[idx] * (1.0 - frac) + self.table[idx + 1] * frac
    }

    /// Multiply a frame by the window
    pub fn apply(&self, frame: &mut [Sample]) {
        let len = frame.len();
        if len == 0 {
            return;
        }
        let step = 1.0 / len as f64;
        for (i, sample) in frame.iter_mut().enumerate() {
            *sample *= self.value(i as f64 * step);
        }
    }

    /// Gain factor cancelling the amplitude build-up of overlap-add at the
    /// given overlap fraction: hop / (mean * size) = (1 - overlap) / mean.
    ///
    /// For Hann at 50% overlap this is exactly 1 (constant-overlap-add).
    pub fn overlap_compensation(&self, overlap: f64) -> f64 {
        debug_assert!((0.0..1.0).contains(&overlap));
        (1.0 - overlap) / self.kind.mean()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn endpoints_and_center() {
        let hann = WindowTable::new(WindowKind::Hann);
        assert_relative_eq!(hann.value(0.0), 0.0, epsilon = 1e-9);
        assert_relative_eq!(hann.value(0.5), 1.0, epsilon = 1e-6);
        assert_relative_eq!(hann.value(1.0), 0.0, epsilon = 1e-9);

        let tri = WindowTable::new(WindowKind::Triangle);
        assert_relative_eq!(tri.value(0.25), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn interpolation_is_close_to_direct_evaluation() {
        for kind in [
            WindowKind::Hann,
            WindowKind::Hamming,
            WindowKind::Sine,
            WindowKind::Lanczos,
        ] {
            let table = WindowTable::new(kind);
            for i in 0..997 {
                let x = i as f64 / 996.0;
                assert!(
                    (table.value(x) - kind.evaluate(x)).abs() < 1e-5,
                    "{kind:?} at {x}"
                );
            }
        }
    }

    #[test]
    fn hann_is_cola_at_half_overlap() {
        // w(x) + w(x + 0.5) == 1 for Hann; compensation must be exactly 1
        let hann = WindowTable::new(WindowKind::Hann);
        for i in 0..512 {
            let x = i as f64 / 1024.0;
            assert_relative_eq!(hann.value(x) + hann.value(x + 0.5), 1.0, epsilon = 1e-5);
        }
        assert_relative_eq!(hann.overlap_compensation(0.5), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn rectangle_needs_no_blending() {
        assert!(!WindowKind::Rectangle.needs_blending());
        assert!(WindowKind::Hann.needs_blending());
        let rect = WindowTable::new(WindowKind::Rectangle);
        assert_relative_eq!(rect.overlap_compensation(0.0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn means_match_tables() {
        for kind in WindowKind::ALL {
            let table = WindowTable::new(kind);
            let n = 8192;
            let sum: f64 = (0..n).map(|i| table.value(i as f64 / n as f64)).sum();
            assert!(
                (sum / n as f64 - kind.mean()).abs() < 1e-3,
                "{kind:?} mean drifted"
            );
        }
    }
}
