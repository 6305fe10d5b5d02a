use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SensorError {
    #[error("No accumulated data yet: run a dark or flat calibration before requesting the SPN view")]
    SpnUnavailable,

    #[error("Frame is {actual:?} but the accumulated frame is {expected:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Frame buffer holds {actual} values, expected {expected}")]
    BufferSize { expected: usize, actual: usize },

    #[error("Invalid session configuration: {0}")]
    InvalidConfig(String),

    #[error("Calibration session is no longer running")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, SensorError>;
