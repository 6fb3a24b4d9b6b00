//! Per-bin spectral effects
//!
//! The effect set is closed: a tagged enum instead of a trait object, so
//! dispatch in the audio thread is a jump table and adding a kind is a
//! compile error everywhere a match forgets it.

pub mod base;
mod contrast;
mod filter;
mod misc;

pub use base::{bin_range, for_each_processed_bin, BinSpan, Bounds};
pub use contrast::ContrastEffect;
pub use filter::FilterEffect;
pub use misc::{
    DestroyEffect, DynamicsEffect, PhaseEffect, PitchEffect, StretchEffect, WarpEffect,
};

use crate::spectral::SpectralBuffer;

/// Discriminant for the effect set
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum EffectKind {
    Filter,
    Contrast,
    Dynamics,
    Phase,
    Pitch,
    Stretch,
    Warp,
    Destroy,
}

/// One effect instance with its parameters
#[derive(Debug, Clone)]
pub enum Effect {
    Filter(FilterEffect),
    Contrast(ContrastEffect),
    Dynamics(DynamicsEffect),
    Phase(PhaseEffect),
    Pitch(PitchEffect),
    Stretch(StretchEffect),
    Warp(WarpEffect),
    Destroy(DestroyEffect),
}

impl Effect {
    /// Default-parameter instance of a kind
    pub fn new(kind: EffectKind) -> Self {
        match kind {
            EffectKind::Filter => Self::Filter(FilterEffect::default()),
            EffectKind::Contrast => Self::Contrast(ContrastEffect::default()),
            EffectKind::Dynamics => Self::Dynamics(DynamicsEffect::default()),
            EffectKind::Phase => Self::Phase(PhaseEffect::default()),
            EffectKind::Pitch => Self::Pitch(PitchEffect::default()),
            EffectKind::Stretch => Self::Stretch(StretchEffect::default()),
            EffectKind::Warp => Self::Warp(WarpEffect::default()),
            EffectKind::Destroy => Self::Destroy(DestroyEffect::default()),
        }
    }

    pub fn kind(&self) -> EffectKind {
        match self {
            Self::Filter(_) => EffectKind::Filter,
            Self::Contrast(_) => EffectKind::Contrast,
            Self::Dynamics(_) => EffectKind::Dynamics,
            Self::Phase(_) => EffectKind::Phase,
            Self::Pitch(_) => EffectKind::Pitch,
            Self::Stretch(_) => EffectKind::Stretch,
            Self::Warp(_) => EffectKind::Warp,
            Self::Destroy(_) => EffectKind::Destroy,
        }
    }

    /// Shared boundary parameters of any kind
    pub fn bounds_mut(&mut self) -> &mut Bounds {
        match self {
            Self::Filter(fx) => &mut fx.bounds,
            Self::Contrast(fx) => &mut fx.bounds,
            Self::Dynamics(fx) => &mut fx.bounds,
            Self::Phase(fx) => &mut fx.bounds,
            Self::Pitch(fx) => &mut fx.bounds,
            Self::Stretch(fx) => &mut fx.bounds,
            Self::Warp(fx) => &mut fx.bounds,
            Self::Destroy(fx) => &mut fx.bounds,
        }
    }

    /// Run the effect over the active region. The source must be
    /// cartesian; the destination's representation tag reports what the
    /// effect left behind.
    pub fn process(&mut self, src: &SpectralBuffer, dst: &mut SpectralBuffer, channels: usize) {
        match self {
            Self::Filter(fx) => fx.process(src, dst, channels),
            Self::Contrast(fx) => fx.process(src, dst, channels),
            Self::Dynamics(fx) => fx.process(src, dst, channels),
            Self::Phase(fx) => fx.process(src, dst, channels),
            Self::Pitch(fx) => fx.process(src, dst, channels),
            Self::Stretch(fx) => fx.process(src, dst, channels),
            Self::Warp(fx) => fx.process(src, dst, channels),
            Self::Destroy(fx) => fx.process(src, dst, channels),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectral::SpectralRepr;

    #[test]
    fn kind_round_trips_through_new() {
        let kinds = [
            EffectKind::Filter,
            EffectKind::Contrast,
            EffectKind::Dynamics,
            EffectKind::Phase,
            EffectKind::Pitch,
            EffectKind::Stretch,
            EffectKind::Warp,
            EffectKind::Destroy,
        ];
        for kind in kinds {
            assert_eq!(Effect::new(kind).kind(), kind);
        }
    }

    #[test]
    fn default_effects_leave_a_consistent_repr() {
        let mut src = SpectralBuffer::new(2, 17);
        src.write_at(0, 4, 1.0, 0.25);
        for kind in [EffectKind::Filter, EffectKind::Contrast, EffectKind::Dynamics] {
            let mut dst = SpectralBuffer::new(2, 17);
            Effect::new(kind).process(&src, &mut dst, 2);
            match kind {
                EffectKind::Filter => assert_eq!(dst.repr(), SpectralRepr::Cartesian),
                _ => assert_eq!(dst.repr(), SpectralRepr::Polar),
            }
        }
    }
}
