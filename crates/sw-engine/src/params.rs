//! Engine-recognized host parameters
//!
//! The host delivers values already scaled to engineering units through
//! each parameter's declared range; the table here is the single source
//! for those declarations. Per-module effect parameters are edited
//! through [`EffectsState::edit_module`](crate::EffectsState::edit_module)
//! instead and have no ids of their own.

use sw_core::{ParamId, ParamRange, ParamScale};
use sw_dsp::{WindowKind, MAX_FFT_ORDER, MIN_FFT_ORDER};

/// Dry/wet mix, 0 = dry, 1 = wet
pub const DRY_WET: ParamId = ParamId(0);
/// Analysis frame overlap fraction
pub const OVERLAP: ParamId = ParamId(1);
/// FFT order (frame size exponent), indexed
pub const FFT_ORDER: ParamId = ParamId(2);
/// Window family, indexed into [`WindowKind::ALL`]
pub const WINDOW: ParamId = ParamId(3);

/// Declared range for an engine parameter, `None` for foreign ids.
pub fn range(id: ParamId) -> Option<ParamRange> {
    match id {
        DRY_WET => Some(ParamRange::linear(0.0, 1.0, 1.0)),
        OVERLAP => Some(ParamRange::linear(0.0, 15.0 / 16.0, 0.5)),
        FFT_ORDER => Some(ParamRange {
            min: MIN_FFT_ORDER as f64,
            max: MAX_FFT_ORDER as f64,
            default: 11.0,
            scale: ParamScale::Indexed {
                count: MAX_FFT_ORDER - MIN_FFT_ORDER + 1,
            },
        }),
        WINDOW => Some(ParamRange {
            min: 0.0,
            max: (WindowKind::ALL.len() - 1) as f64,
            default: 1.0,
            scale: ParamScale::Indexed {
                count: WindowKind::ALL.len() as u32,
            },
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_ids_have_ranges() {
        for id in [DRY_WET, OVERLAP, FFT_ORDER, WINDOW] {
            let range = range(id).unwrap();
            assert!(range.min <= range.default && range.default <= range.max);
        }
        assert!(range(ParamId(99)).is_none());
    }

    #[test]
    fn window_index_covers_every_family() {
        let r = range(WINDOW).unwrap();
        // Endpoint normalized values land on the first and last family
        assert_eq!(WindowKind::from_index(r.scale_value(0.0) as usize), WindowKind::Rectangle);
        assert_eq!(WindowKind::from_index(r.scale_value(1.0) as usize), WindowKind::Lanczos);
    }
}
