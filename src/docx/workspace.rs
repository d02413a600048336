use std::path::{Path, PathBuf};

use crate::docx::{CONTENT_TYPES_PART, DOCUMENT_PART, MEDIA_DIR, RELATIONSHIPS_PART};
use crate::error::{DocxError, Result};

const WORKSPACE_PREFIX: &str = "docxgen_";

/// Scratch directory holding one exploded .docx package.
///
/// Owned by a single render operation. The directory is removed on drop
/// unless [`Workspace::keep`] was called.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    keep: bool,
}

impl Workspace {
    /// Allocates a fresh directory under the system temp dir.
    pub fn create() -> Result<Self> {
        Self::create_in(&std::env::temp_dir())
    }

    /// Allocates a fresh, empty, uniquely named directory under `parent`.
    pub fn create_in(parent: &Path) -> Result<Self> {
        std::fs::create_dir_all(parent).map_err(|e| DocxError::io(parent, e))?;

        // Reserve a unique name with a placeholder file, then swap it for a directory.
        let placeholder = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempfile_in(parent)
            .map_err(|e| DocxError::io(parent, e))?;
        let root = placeholder.path().to_path_buf();
        placeholder.close().map_err(|e| DocxError::io(&root, e))?;
        if root.is_file() {
            std::fs::remove_file(&root).map_err(|e| DocxError::io(&root, e))?;
        }
        std::fs::create_dir(&root).map_err(|e| DocxError::io(&root, e))?;

        log::debug!("created workspace {}", root.display());
        Ok(Self { root, keep: false })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Leaves the directory on disk when the workspace is dropped.
    pub fn keep(&mut self) {
        self.keep = true;
    }

    pub fn is_kept(&self) -> bool {
        self.keep
    }

    pub fn document_xml(&self) -> PathBuf {
        self.part_path(DOCUMENT_PART)
    }

    pub fn relationships_xml(&self) -> PathBuf {
        self.part_path(RELATIONSHIPS_PART)
    }

    pub fn content_types_xml(&self) -> PathBuf {
        self.part_path(CONTENT_TYPES_PART)
    }

    pub fn media_dir(&self) -> PathBuf {
        self.part_path(MEDIA_DIR)
    }

    /// Maps a package part name (`word/document.xml`) onto the workspace.
    pub fn part_path(&self, part: &str) -> PathBuf {
        part.split('/')
            .filter(|seg| !seg.is_empty())
            .fold(self.root.clone(), |p, seg| p.join(seg))
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.keep {
            log::info!("keeping workspace {}", self.root.display());
            return;
        }
        if let Err(e) = destroy(&self.root) {
            log::warn!("failed to remove workspace {}: {e}", self.root.display());
        }
    }
}

/// Recursively removes `path`. A missing path is not an error.
pub fn destroy(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DocxError::io(path, e)),
    }
}
