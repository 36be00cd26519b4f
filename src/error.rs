use crate::template::Template;

/// Convenience result type for the capture and composition core.
pub type PhotoboothResult<T> = Result<T, PhotoboothError>;

/// Error taxonomy of the booth core.
#[derive(thiserror::Error, Debug)]
pub enum PhotoboothError {
    /// The video source could not be acquired (no device, missing tooling, denied access).
    #[error("video source unavailable: {0}")]
    SourceUnavailable(String),

    /// A session start was requested while another session is active.
    #[error("a capture session is already running")]
    SessionBusy,

    /// A frame grab failed in the middle of a session.
    #[error("capture failed: {0}")]
    CaptureFault(String),

    #[error("template {template} needs {expected} frames, got {actual}")]
    FrameCountMismatch {
        template: Template,
        expected: usize,
        actual: usize,
    },

    /// The controller was asked to do something its current phase does not allow.
    #[error("cannot {operation} while {phase}")]
    InvalidTransition {
        phase: String,
        operation: &'static str,
    },

    #[error("encoding error: {0}")]
    Encode(String),

    #[error("export error: {0}")]
    Export(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PhotoboothError {
    pub fn source_unavailable(msg: impl Into<String>) -> Self {
        Self::SourceUnavailable(msg.into())
    }

    pub fn capture(msg: impl Into<String>) -> Self {
        Self::CaptureFault(msg.into())
    }

    /// Whether this error should put the UI in its blocking "unavailable" state.
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::SourceUnavailable(_))
    }
}
