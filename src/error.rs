//! Error taxonomy for capture operations.

use std::path::PathBuf;

use thiserror::Error;

/// Error type for camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    /// The device index or URL cannot be opened, or the device went away.
    #[error("device {device} unavailable: {reason}")]
    DeviceUnavailable {
        /// Device identifier as given by the user.
        device: String,
        /// Driver or transport message.
        reason: String,
    },
    /// The device refused a requested setting. Callers degrade and continue.
    #[error("configuration rejected: {0}")]
    ConfigurationRejected(String),
    /// A single frame grab failed.
    #[error("frame read failed: {0}")]
    ReadFailure(String),
    /// The output file could not be written.
    #[error("failed to write {}: {source}", path.display())]
    IoFailure {
        /// Target file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A capture parameter is outside its declared range.
    #[error("invalid {name}: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Why it was rejected.
        reason: String,
    },
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CameraError {
    /// Whether the capture loop must stop instead of retrying.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::DeviceUnavailable { .. })
    }

    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// Result type for camera operations.
pub type Result<T> = std::result::Result<T, CameraError>;
