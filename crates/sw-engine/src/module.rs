//! One effect instance inside a lane

use sw_core::SIMD_CHANNELS;
use sw_dsp::effects::Effect;
use sw_dsp::spectral::{ComplexSimd, SpectralBuffer, SpectralRepr};
use sw_dsp::EffectKind;
use wide::f64x4;

/// An effect with its lane-level slot controls. Module ids come from the
/// engine context and stay stable across reordering.
pub struct EffectModule {
    pub id: u64,
    pub effect: Effect,
    pub enabled: bool,
    /// Dry/wet balance, 0 bypasses the effect, 1 is fully processed
    pub mix: f64,
    /// Linear gain on the module output
    pub gain: f64,
}

impl EffectModule {
    pub fn new(id: u64, kind: EffectKind) -> Self {
        Self {
            id,
            effect: Effect::new(kind),
            enabled: true,
            mix: 1.0,
            gain: 1.0,
        }
    }

    /// Run the effect and fold dry/wet and gain into `wet`.
    ///
    /// At mix 1 and unity gain the effect output passes through untouched,
    /// including a polar representation the next stage may want to keep.
    /// Any blending forces cartesian first so dry and wet add coherently.
    pub fn process(&mut self, dry: &SpectralBuffer, wet: &mut SpectralBuffer, channels: usize) {
        self.effect.process(dry, wet, channels);

        let pure_wet = self.mix >= 1.0 && self.gain == 1.0;
        if pure_wet {
            return;
        }
        debug_assert_eq!(dry.repr(), SpectralRepr::Cartesian);
        wet.convert_to(SpectralRepr::Cartesian);

        let bins = wet.bins().min(dry.bins());
        let packages = channels.div_ceil(SIMD_CHANNELS);
        let wet_gain = f64x4::splat(self.mix * self.gain);
        let dry_gain = f64x4::splat((1.0 - self.mix) * self.gain);
        for pkg in 0..packages {
            for bin in 0..bins {
                let w = wet.package(pkg, bin);
                let d = dry.package(pkg, bin);
                wet.set_package(
                    pkg,
                    bin,
                    ComplexSimd {
                        re: w.re * wet_gain + d.re * dry_gain,
                        im: w.im * wet_gain + d.im * dry_gain,
                    },
                );
            }
        }
    }
}
