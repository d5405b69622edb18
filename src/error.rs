use thiserror::Error;

/// Why content generation failed, classified before it reaches the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationErrorKind {
    /// Bad or missing API key, wrong voice id, rejected configuration.
    Auth,
    /// Upstream rate limit that persisted through the retry policy.
    RateLimited,
    /// Upstream answered 2xx but the payload did not match the schema.
    MalformedResponse,
    /// Transport-level failure (DNS, connect, timeout, 5xx after retries).
    Network,
}

impl std::fmt::Display for GenerationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GenerationErrorKind::Auth => "auth/config",
            GenerationErrorKind::RateLimited => "rate-limited",
            GenerationErrorKind::MalformedResponse => "malformed-response",
            GenerationErrorKind::Network => "network",
        };
        write!(f, "{s}")
    }
}

/// Why a capture session could not be acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureDeniedReason {
    /// The platform refused access to the display or audio device.
    Permission,
    /// No monitor or audio device present.
    NoDevice,
    /// Anything else (missing ffmpeg, spawn failure, ...).
    Unknown,
}

impl std::fmt::Display for CaptureDeniedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CaptureDeniedReason::Permission => "permission",
            CaptureDeniedReason::NoDevice => "no-device",
            CaptureDeniedReason::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

#[derive(Error, Debug)]
pub enum QuizcastError {
    #[error("No generated content: {0}")]
    ContentMissing(String),

    #[error("Content generation failed ({kind}): {message}")]
    ContentGeneration {
        kind: GenerationErrorKind,
        message: String,
    },

    #[error("Capture could not start ({reason}): {message}")]
    CaptureAcquisition {
        reason: CaptureDeniedReason,
        message: String,
    },

    #[error("Capture failed: {0}")]
    CaptureRuntime(String),

    #[error("Capture produced no data")]
    EmptyCapture,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("A show is already in progress")]
    ShowInProgress,

    #[error("Cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QuizcastError {
    /// Shorthand for a classified generation failure.
    pub fn generation(kind: GenerationErrorKind, message: impl Into<String>) -> Self {
        QuizcastError::ContentGeneration {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for a classified capture-acquisition failure.
    pub fn capture_denied(reason: CaptureDeniedReason, message: impl Into<String>) -> Self {
        QuizcastError::CaptureAcquisition {
            reason,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, QuizcastError>;
