//! Entry point registration: links executables into `<prefix>/bin`.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::runtime::is_executable;
use crate::{InstallErrorKind, KegError, Result};

/// Links executables into a bin directory
pub struct BinaryLinker {
    bin_dir: PathBuf,
}

impl BinaryLinker {
    pub fn new(bin_dir: impl Into<PathBuf>) -> Self {
        Self {
            bin_dir: bin_dir.into(),
        }
    }

    /// Link each of `sources` into the bin directory under its file name
    pub async fn link(&self, sources: &[PathBuf]) -> Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(&self.bin_dir)
            .await
            .map_err(|e| disk_write(&self.bin_dir, e))?;

        let mut linked = Vec::new();
        for source in sources {
            let Some(name) = source.file_name() else {
                continue;
            };
            let link_path = self.bin_dir.join(name);
            self.create_bin_link(source, &link_path).await?;
            log::debug!("Linked {} -> {}", link_path.display(), source.display());
            linked.push(link_path);
        }

        Ok(linked)
    }

    #[cfg(unix)]
    async fn create_bin_link(&self, source: &Path, link: &Path) -> Result<()> {
        if tokio::fs::symlink_metadata(link).await.is_ok() {
            tokio::fs::remove_file(link).await.map_err(|e| disk_write(link, e))?;
        }

        // Relative so the prefix can be moved as a whole.
        let target = pathdiff::diff_paths(source, &self.bin_dir).unwrap_or_else(|| source.to_path_buf());
        tokio::fs::symlink(&target, link)
            .await
            .map_err(|e| disk_write(link, e))?;

        Ok(())
    }

    #[cfg(not(unix))]
    async fn create_bin_link(&self, source: &Path, link: &Path) -> Result<()> {
        tokio::fs::copy(source, link)
            .await
            .map_err(|e| disk_write(link, e))?;
        Ok(())
    }

    /// Executables currently in the bin directory, sorted by name
    pub fn entry_points(&self) -> Result<Vec<PathBuf>> {
        executables_in(&self.bin_dir)
    }

    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }
}

/// Executable files directly inside `dir`; symlinks are followed
pub fn executables_in(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            KegError::install(
                InstallErrorKind::DiskWrite,
                format!("Failed to read {}: {}", dir.display(), e),
            )
        })?;
        if is_executable(entry.path()) {
            found.push(entry.path().to_path_buf());
        }
    }

    Ok(found)
}

fn disk_write(path: &Path, e: std::io::Error) -> KegError {
    KegError::install(
        InstallErrorKind::DiskWrite,
        format!("Failed to write {}: {}", path.display(), e),
    )
}
