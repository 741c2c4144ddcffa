//! Input and output file areas.
//!
//! Uploaded originals go to the input area under the task's storage name;
//! transform results go to the output area under the same name.

mod local;

pub use local::LocalFileArea;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from file-area operations.
#[derive(Debug, Error)]
pub enum FileError {
    /// The requested file does not exist.
    #[error("File not found: {0}")]
    NotFound(String),

    /// The storage name would escape the area.
    #[error("Invalid storage name: {0}")]
    InvalidName(String),

    /// Underlying I/O failure.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Where task inputs and outputs are kept.
#[async_trait]
pub trait FileArea: Send + Sync {
    /// Store the uploaded original. Overwrites an existing file.
    async fn write_input(&self, name: &str, bytes: &[u8]) -> Result<(), FileError>;

    /// Read the uploaded original.
    async fn read_input(&self, name: &str) -> Result<Vec<u8>, FileError>;

    /// Store a transform result. Overwrites an existing file.
    async fn write_output(&self, name: &str, bytes: &[u8]) -> Result<(), FileError>;

    /// Location of the processed file, whether or not it exists yet.
    fn output_path(&self, name: &str) -> Result<PathBuf, FileError>;

    /// Whether the processed file is present.
    async fn exists_output(&self, name: &str) -> Result<bool, FileError>;
}
