//! sw-dsp: spectral DSP primitives for SpectralWeave
//!
//! ## Modules
//! - `ring` - multi-channel, multi-cursor ring buffer with blended region writes
//! - `spectral` - SIMD-packed complex spectral buffer, shared views, blended copies
//! - `transform` - per-order forward/inverse real-FFT plan set
//! - `window` - window lookup tables and overlap-add compensation
//! - `effects` - per-bin spectral effect algorithms

pub mod effects;
pub mod ring;
pub mod spectral;
pub mod transform;
pub mod window;

pub use effects::{Bounds, Effect, EffectKind};
pub use ring::{BlendOp, ReadCursor, RingBuffer};
pub use spectral::{ComplexSimd, SpectralBuffer, SpectralRepr, SpectralView};
pub use transform::{TransformSet, MAX_FFT_ORDER, MIN_FFT_ORDER};
pub use window::{WindowKind, WindowTable};
