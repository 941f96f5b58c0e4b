use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Result alias that carries the custom [`VisualizerError`] type.
pub type Result<T> = std::result::Result<T, VisualizerError>;

/// Runtime permissions the visualiser depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permission {
    /// Tapping the output mix of an audio session.
    Capture,
    /// Writing recordings into the private storage directory.
    Storage,
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Permission::Capture => f.write_str("capture"),
            Permission::Storage => f.write_str("storage"),
        }
    }
}

/// Coarse classification used when deciding how to degrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Reported once, the operation is aborted and never retried.
    Configuration,
    /// File or device trouble. Recording stops, visualisation carries on.
    Resource,
    /// Setup is skipped until the permission is granted.
    Permission,
    Other,
}

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum VisualizerError {
    /// The player did not expose a usable audio session.
    #[error("invalid audio session id {0}")]
    InvalidSession(i32),
    /// Capture sizes must be a non-zero power of two.
    #[error("capture size {0} is not a power of two")]
    CaptureSize(usize),
    #[error("{0} permission has not been granted")]
    PermissionDenied(Permission),
    /// `append` was called while no recording session was open.
    #[error("recorder is not recording")]
    NotRecording,
    /// Opening, writing or flushing a recording failed.
    #[error("recording `{}` failed: {source}", path.display())]
    Recording {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The capture backend refused an operation.
    #[error("capture backend: {0}")]
    Capture(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// Free-form message for conditions that have no dedicated variant.
    #[error("{0}")]
    Message(String),
}

impl VisualizerError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidSession(_) | Self::CaptureSize(_) | Self::Config(_) | Self::Json(_) => {
                ErrorKind::Configuration
            }
            Self::Recording { .. } | Self::Io(_) | Self::Capture(_) => ErrorKind::Resource,
            Self::PermissionDenied(_) => ErrorKind::Permission,
            Self::NotRecording | Self::Message(_) => ErrorKind::Other,
        }
    }
}

impl From<&str> for VisualizerError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for VisualizerError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
