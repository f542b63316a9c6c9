use std::fmt;

use thiserror::Error;

/// Errors returned synchronously by binding and readiness checks.
///
/// None of these change session state and none are retried automatically.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("output is active")]
    OutputActive,

    #[error("expected a {expected} encoder, got '{encoder}'")]
    EncoderKindMismatch { encoder: String, expected: &'static str },

    #[error("audio track {0} is out of range for this output")]
    TrackOutOfRange(usize),

    #[error("output does not support {0}")]
    Unsupported(&'static str),

    #[error("no video encoder bound")]
    MissingVideoEncoder,

    #[error("no audio encoder bound for track {0}")]
    MissingAudioEncoder(usize),

    #[error("no video feed attached")]
    MissingVideoFeed,

    #[error("no audio feed attached")]
    MissingAudioFeed,

    #[error("no service bound")]
    MissingService,

    #[error("service is active on another output")]
    ServiceActive,

    #[error("service '{0}' failed to initialize")]
    ServiceInitFailed(String),

    #[error("encoder '{name}' failed to initialize: {reason}")]
    EncoderInitFailed { name: String, reason: String },

    #[error("encoder '{0}' is not initialized")]
    EncoderNotInitialized(String),

    #[error("sink failed to start")]
    SinkStartFailed,

    #[error("output was stopped")]
    Stopped,

    #[error("output has been destroyed")]
    Destroyed,

    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

/// Code reported with a `stop` event.
///
/// Exhaustive. Only [`StopCode::Disconnected`] triggers automatic reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopCode {
    Success,
    BadPath,
    ConnectFailed,
    InvalidStream,
    Error,
    Disconnected,
}

impl StopCode {
    pub fn is_retryable(self) -> bool {
        self == Self::Disconnected
    }

    /// Numeric code used by plugin-style sinks.
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::BadPath => -1,
            Self::ConnectFailed => -2,
            Self::InvalidStream => -3,
            Self::Error => -4,
            Self::Disconnected => -5,
        }
    }

    /// Unknown codes map to [`StopCode::Error`].
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Success,
            -1 => Self::BadPath,
            -2 => Self::ConnectFailed,
            -3 => Self::InvalidStream,
            -5 => Self::Disconnected,
            _ => Self::Error,
        }
    }
}

impl fmt::Display for StopCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Success => "success",
            Self::BadPath => "bad path",
            Self::ConnectFailed => "connect failed",
            Self::InvalidStream => "invalid stream",
            Self::Error => "error",
            Self::Disconnected => "disconnected",
        };
        f.write_str(text)
    }
}
