use crate::errors::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Suffix of files that are still being written
pub const STAGING_SUFFIX: &str = ".part";
const SCRATCH_PREFIX: &str = ".work-";

/// File system utilities
pub struct FileUtils;

impl FileUtils {
    /// Get file size in bytes
    pub fn file_size(path: &Path) -> Result<u64> {
        Ok(std::fs::metadata(path)?.len())
    }

    /// A finished artifact: a regular, non-empty file
    pub fn is_complete_file(path: &Path) -> bool {
        std::fs::metadata(path)
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
    }

    /// Create directory recursively
    pub fn create_directory(path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)?;
        Ok(())
    }

    /// Hidden, unique path inside `dir` for content that is not finished yet.
    /// It lives next to the final file so the later rename stays on one filesystem.
    pub fn staging_path(dir: &Path) -> PathBuf {
        dir.join(format!(".{}{}", uuid::Uuid::new_v4(), STAGING_SUFFIX))
    }

    /// Staging files and scratch directories this crate creates. Other dot-names
    /// (an artist like "...And You Will Know Us") are ordinary downloads.
    pub fn is_internal_name(name: &str) -> bool {
        (name.starts_with('.') && name.ends_with(STAGING_SUFFIX)) || name.starts_with(SCRATCH_PREFIX)
    }

    /// Move a file, falling back to copy + delete across filesystems
    pub async fn move_file(from: &Path, to: &Path) -> Result<()> {
        if tokio::fs::rename(from, to).await.is_ok() {
            return Ok(());
        }
        tokio::fs::copy(from, to).await?;
        let _ = tokio::fs::remove_file(from).await;
        Ok(())
    }

    /// Finished `.mp3` files in `dir`, sorted by name. Staging files are excluded.
    pub fn list_downloaded(dir: &Path) -> Result<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if Self::is_internal_name(name) || !path.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) == Some("mp3") {
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }

    /// Remove staging files and scratch directories left behind by an interrupted run
    pub fn cleanup_staging(dir: &Path) -> Result<usize> {
        if !dir.is_dir() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !Self::is_internal_name(name) {
                continue;
            }
            let result = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            if result.is_ok() {
                debug!("Removed leftover {}", path.display());
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Per-attempt working directory, removed on drop
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn new_in(parent: &Path) -> Result<Self> {
        let path = parent.join(format!("{}{}", SCRATCH_PREFIX, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}
