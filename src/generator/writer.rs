//! Atomic publication of the rendered document.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::generator::GenerateError;

/// Result of one publish attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Written,
    Unchanged,
}

/// Owns the published file and the last bytes written to it.
///
/// The proxy only ever sees complete documents: content goes to a temp
/// file in the same directory and is renamed over the target.
#[derive(Debug)]
pub struct Publisher {
    path: PathBuf,
    last: Option<String>,
}

impl Publisher {
    /// Seeds the comparison from the file currently on disk, if readable.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let last = fs::read_to_string(&path).ok();
        if last.is_some() {
            tracing::debug!(path = %path.display(), "Seeded change detection from existing file");
        }
        Self { path, last }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `content` unless it matches the last published bytes.
    ///
    /// On error the previous file is left in place and the comparison state
    /// is not advanced, so the next call retries.
    pub fn publish(&mut self, content: &str) -> Result<PublishOutcome, GenerateError> {
        if self.last.as_deref() == Some(content) {
            return Ok(PublishOutcome::Unchanged);
        }

        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;

        self.last = Some(content.to_string());
        Ok(PublishOutcome::Written)
    }
}
