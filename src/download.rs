//! Download trigger: turns a canvas into a saved file.
//!
//! A [`DownloadLink`] pairs an image data URI with a filename. Activating
//! it hands the decoded bytes to a [`DownloadTarget`], which decides where
//! the file ends up.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info};

use crate::encoder::MarkupEncoder;
use crate::error::ExportResult;
use crate::raster::Canvas;

// ============================================================================
// Targets
// ============================================================================

/// Where activated downloads are delivered.
pub trait DownloadTarget: Send + Sync {
    /// Stores `bytes` under `filename`. Returns the path written, if any.
    fn save(&self, filename: &str, mime: &str, bytes: &[u8]) -> ExportResult<Option<PathBuf>>;
}

/// Saves downloads into a directory.
///
/// Files are written to a hidden `.name.part` sibling first and renamed
/// into place, so a failed save never leaves a truncated image under the
/// final name.
#[derive(Debug, Clone)]
pub struct DirectoryTarget {
    dir: PathBuf,
}

impl DirectoryTarget {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DownloadTarget for DirectoryTarget {
    fn save(&self, filename: &str, mime: &str, bytes: &[u8]) -> ExportResult<Option<PathBuf>> {
        let part = self.dir.join(format!(".{filename}.part"));
        let path = self.dir.join(filename);

        let guard = PartialFile::new(&part);
        fs::write(&part, bytes)?;
        fs::rename(&part, &path)?;
        guard.disarm();

        debug!(path = %path.display(), mime, "download saved");
        Ok(Some(path))
    }
}

/// Removes a partially written file unless disarmed.
struct PartialFile<'a> {
    path: &'a Path,
    armed: bool,
}

impl<'a> PartialFile<'a> {
    fn new(path: &'a Path) -> Self {
        Self { path, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialFile<'_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = fs::remove_file(self.path);
        }
    }
}

/// A download recorded by [`MemoryTarget`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFile {
    pub filename: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Keeps downloads in memory.
#[derive(Debug, Default)]
pub struct MemoryTarget {
    files: Mutex<Vec<SavedFile>>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Downloads received so far, oldest first.
    pub fn files(&self) -> Vec<SavedFile> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_empty(&self) -> bool {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

impl DownloadTarget for MemoryTarget {
    fn save(&self, filename: &str, mime: &str, bytes: &[u8]) -> ExportResult<Option<PathBuf>> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SavedFile {
                filename: filename.to_string(),
                mime: mime.to_string(),
                bytes: bytes.to_vec(),
            });
        Ok(None)
    }
}

// ============================================================================
// Link
// ============================================================================

/// A transient download link. It exists only between creation and
/// activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadLink {
    pub href: String,
    pub filename: String,
}

impl DownloadLink {
    /// Decodes the link target and delivers it, consuming the link.
    pub fn activate(
        self,
        encoder: &MarkupEncoder,
        target: &dyn DownloadTarget,
    ) -> ExportResult<(String, Vec<u8>, Option<PathBuf>)> {
        let (mime, bytes) = encoder.decode_data_uri(&self.href)?;
        let path = target.save(&self.filename, &mime, &bytes)?;
        Ok((mime, bytes, path))
    }
}

/// Summary of a completed download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub filename: String,
    pub mime: String,
    pub width: u32,
    pub height: u32,
    /// Encoded image size in bytes.
    pub bytes: usize,
    /// Where the target wrote the file, when it writes to disk.
    pub path: Option<PathBuf>,
}

/// Reduces `name` to a bare file name, falling back to `default` when
/// nothing usable is left.
pub fn sanitize_filename(name: &str, default: &str) -> String {
    Path::new(name.trim())
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(default)
        .to_string()
}

/// Encodes `canvas` as `mime` and delivers it to `target` under `filename`.
pub fn download(
    canvas: &Canvas,
    filename: &str,
    mime: &str,
    encoder: &MarkupEncoder,
    target: &dyn DownloadTarget,
) -> ExportResult<Download> {
    let link = DownloadLink {
        href: canvas.to_data_uri(mime, encoder)?,
        filename: filename.to_string(),
    };
    let (mime, bytes, path) = link.activate(encoder, target)?;

    info!(filename, mime = %mime, bytes = bytes.len(), "download triggered");
    Ok(Download {
        filename: filename.to_string(),
        mime,
        width: canvas.width(),
        height: canvas.height(),
        bytes: bytes.len(),
        path,
    })
}

// ============================================================================
// Tests
// ============================================================================
