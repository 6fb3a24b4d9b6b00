//! Error types for SpectralWeave

use thiserror::Error;

/// Core error type
///
/// Only recoverable conditions are represented here. Out-of-range channel
/// or index arguments are programming errors and assert instead.
#[derive(Error, Debug)]
pub enum SwError {
    #[error("structural edit attempted while audio processing is active")]
    ProcessingActive,

    #[error("lane {0} input routing forms a feedback loop")]
    FeedbackLoop(usize),

    #[error("lane index {0} out of range ({1} lanes)")]
    LaneIndex(usize, usize),

    #[error("module index {0} out of range ({1} modules)")]
    ModuleIndex(usize, usize),

    #[error("FFT order {0} outside supported range")]
    FftOrder(u32),

    #[error("invalid parameter: {0}")]
    InvalidParam(String),
}

/// Result type alias
pub type SwResult<T> = Result<T, SwError>;
