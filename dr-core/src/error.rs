//! Error types for dr-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from manifest parsing, validation and the manifest tools.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document is not well-formed XML or does not have the manifest shape.
    #[error("failed to parse manifest at {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// The document parsed but violates the manifest schema.
    #[error("manifest {path} failed validation: {}", reasons.join("; "))]
    Invalid { path: PathBuf, reasons: Vec<String> },

    /// Serializing a manifest back to XML failed.
    #[error("failed to write manifest XML: {0}")]
    Serialize(String),

    /// A tool was invoked with an argument it cannot work with.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Convenience constructor for [`ManifestError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ManifestError {
    ManifestError::Io {
        path: path.into(),
        source,
    }
}
