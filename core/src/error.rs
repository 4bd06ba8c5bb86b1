use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Audio environment unavailable: {0}")]
    UnsupportedEnvironment(String),

    #[error("Microphone access denied: {0}")]
    PermissionDenied(String),

    #[error("A listen session is already active")]
    SessionActive,

    #[error("Listen session is closed")]
    SessionClosed,

    #[error("Listen session belongs to another receiver")]
    ForeignSession,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input size")]
    InvalidInputSize,

    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Operation timeout")]
    Timeout,
}

pub type Result<T> = std::result::Result<T, LinkError>;
