//! Error types for template rendering

use std::path::PathBuf;

use thiserror::Error;
use zip::result::ZipError;

/// Errors that abort a render or save operation
#[derive(Debug, Error)]
pub enum DocxError {
    /// Template file does not exist
    #[error("template not found: {}", .0.display())]
    InputNotFound(PathBuf),

    /// Source archive cannot be opened or fails its integrity check
    #[error("cannot open archive {}: {source}", path.display())]
    ArchiveOpen {
        path: PathBuf,
        #[source]
        source: ZipError,
    },

    /// Destination archive cannot be created or written
    #[error("cannot write archive {}: {source}", path.display())]
    ArchivePack {
        path: PathBuf,
        #[source]
        source: ZipError,
    },

    /// Image reference key already registered
    #[error("image reference already exists: {0}")]
    DuplicateReference(String),

    /// Image path does not exist on disk
    #[error("image file does not exist: {}", .0.display())]
    MissingImageFile(PathBuf),

    /// Expected package part missing from the extracted template
    #[error("package part missing: {0}")]
    MissingPart(String),

    /// Package part that cannot be read or updated
    #[error("malformed package part {part}: {reason}")]
    MalformedPart { part: String, reason: String },

    /// Template renderer failure
    #[error("template rendering failed: {0}")]
    Template(String),

    /// `save` called before a successful `render`
    #[error("no rendered document; call render() first")]
    NotRendered,

    /// Filesystem error on a specific path
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DocxError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for template rendering operations
pub type Result<T> = std::result::Result<T, DocxError>;
