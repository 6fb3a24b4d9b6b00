//! sw-engine: the SpectralWeave block engine
//!
//! ## Modules
//! - `module` - one effect instance with enable, dry/wet and gain
//! - `lane` - an ordered module chain with its worker-thread handshake state
//! - `state` - lane registry, worker threads, frame fan-out and summation
//! - `engine` - the host-facing block state machine (ring buffers, FFT,
//!   effects, overlap-add, mix)
//! - `params` - host parameter ids and their declared ranges

pub mod engine;
pub mod lane;
pub mod module;
pub mod params;
pub mod state;

pub use engine::SoundEngine;
pub use lane::{LaneInput, LaneStatus};
pub use module::EffectModule;
pub use state::EffectsState;
