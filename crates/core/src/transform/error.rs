//! Error types for the transform module.

use thiserror::Error;

/// Errors that can occur while transforming an image.
#[derive(Debug, Error)]
pub enum TransformError {
    /// Source bytes could not be decoded.
    #[error("Failed to decode source image: {0}")]
    Decode(String),

    /// Output format is not one the encoder knows.
    ///
    /// Formats are validated at intake, so reaching this is a bug.
    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),

    /// Encoding the result failed.
    #[error("Failed to encode {format}: {reason}")]
    Encode { format: String, reason: String },

    /// The blocking transform task panicked or was cancelled.
    #[error("Transform task aborted: {0}")]
    Aborted(String),
}

impl TransformError {
    /// Returns true for invariant violations that retrying cannot fix.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransformError::UnsupportedFormat(_))
    }
}
