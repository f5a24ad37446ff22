use thiserror::Error;

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("Camera initialization error: {0}")]
    InitializationError(String),
    /// None of the natively enumerated modes meet the minimum requirements.
    /// Fatal for the device instance that raised it.
    #[error("Bad device '{device}': none of its {native_modes} native video modes meet the minimum requirements")]
    BadDevice { device: String, native_modes: usize },
    #[error("Capture error: {0}")]
    CaptureError(String),
    #[error("Camera control error: {0}")]
    ControlError(String),
    #[error("Stream error: {0}")]
    StreamError(String),
    #[error("Video mode index {index} out of range ({available} modes available)")]
    InvalidModeIndex { index: usize, available: usize },
    #[error("No pipeline at index {0}")]
    NoPipeline(usize),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
