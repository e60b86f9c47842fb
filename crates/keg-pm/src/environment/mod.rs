//! Isolated install prefixes.
//!
//! A prefix is a directory tree owned by exactly one formula version:
//!
//! ```text
//! <prefix>/
//!   .keg-env.json         marker identifying the owner
//!   INSTALL_RECEIPT.json  present only after a successful install
//!   bin/                  registered entry points
//!   libexec/              private runtime (virtualenv, vendored files)
//!   src/                  unpacked source archive
//! ```

mod receipt;

pub use receipt::{EnvMarker, InstallReceipt, MARKER_FILE, RECEIPT_FILE};

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::{KegError, Result};

/// What to do with a prefix that already belongs to the formula
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProvisionMode {
    /// Keep existing contents, recreating missing layout directories
    #[default]
    Reuse,
    /// Remove the prefix and start from an empty layout
    Reset,
}

/// A provisioned prefix
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentHandle {
    prefix: PathBuf,
    name: String,
    version: String,
}

impl EnvironmentHandle {
    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.prefix.join("bin")
    }

    pub fn libexec_dir(&self) -> PathBuf {
        self.prefix.join("libexec")
    }

    pub fn src_dir(&self) -> PathBuf {
        self.prefix.join("src")
    }

    pub fn receipt_path(&self) -> PathBuf {
        self.prefix.join(RECEIPT_FILE)
    }

    /// Whether a successful install has been recorded
    pub fn is_installed(&self) -> bool {
        self.receipt_path().is_file()
    }

    fn layout_dirs(&self) -> [PathBuf; 3] {
        [self.bin_dir(), self.libexec_dir(), self.src_dir()]
    }
}

/// Creates and opens prefixes for one formula version
#[derive(Debug, Clone)]
pub struct EnvironmentProvisioner {
    name: String,
    version: String,
    mode: ProvisionMode,
}

impl EnvironmentProvisioner {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            mode: ProvisionMode::Reuse,
        }
    }

    pub fn with_mode(mut self, mode: ProvisionMode) -> Self {
        self.mode = mode;
        self
    }

    fn handle(&self, prefix: &Path) -> EnvironmentHandle {
        EnvironmentHandle {
            prefix: prefix.to_path_buf(),
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }

    /// Create (or reuse) the prefix at `prefix`.
    ///
    /// Never writes into a directory that is not already a keg environment for
    /// this formula version, unless that directory is empty.
    pub fn provision(&self, prefix: &Path) -> Result<EnvironmentHandle> {
        let handle = self.handle(prefix);

        if prefix.exists() && !prefix.is_dir() {
            return Err(KegError::environment(prefix, "exists and is not a directory"));
        }

        if prefix.is_dir() {
            match EnvMarker::read(prefix)? {
                Some(marker) if marker.matches(&self.name, &self.version) => match self.mode {
                    ProvisionMode::Reuse => {
                        log::info!("Reusing environment {}", prefix.display());
                        self.create_layout(&handle)?;
                        return Ok(handle);
                    }
                    ProvisionMode::Reset => {
                        log::info!("Resetting environment {}", prefix.display());
                        std::fs::remove_dir_all(prefix).map_err(|e| {
                            KegError::environment(prefix, format!("cannot reset: {}", e))
                        })?;
                    }
                },
                Some(marker) => {
                    return Err(KegError::environment(
                        prefix,
                        format!(
                            "belongs to {} {}, not {} {}",
                            marker.name, marker.version, self.name, self.version
                        ),
                    ));
                }
                None => {
                    let is_empty = std::fs::read_dir(prefix)
                        .map_err(|e| KegError::environment(prefix, e.to_string()))?
                        .next()
                        .is_none();
                    if !is_empty {
                        return Err(KegError::environment(
                            prefix,
                            "directory is not empty and is not a keg environment",
                        ));
                    }
                }
            }
        }

        log::info!("Creating environment {}", prefix.display());
        let existed = prefix.is_dir();
        std::fs::create_dir_all(prefix)
            .map_err(|e| KegError::environment(prefix, format!("cannot create: {}", e)))?;

        let created = self
            .create_layout(&handle)
            .and_then(|()| EnvMarker::new(&self.name, &self.version).write(prefix));
        if let Err(e) = created {
            discard_partial(prefix, existed);
            return Err(e);
        }

        Ok(handle)
    }

    fn create_layout(&self, handle: &EnvironmentHandle) -> Result<()> {
        for dir in handle.layout_dirs() {
            std::fs::create_dir_all(&dir)
                .map_err(|e| KegError::environment(&dir, format!("cannot create: {}", e)))?;
        }
        Ok(())
    }

    /// Open an existing prefix that belongs to this formula version
    pub fn open(&self, prefix: &Path) -> Result<EnvironmentHandle> {
        match EnvMarker::read(prefix)? {
            Some(marker) if marker.matches(&self.name, &self.version) => Ok(self.handle(prefix)),
            Some(marker) => Err(KegError::environment(
                prefix,
                format!("belongs to {} {}", marker.name, marker.version),
            )),
            None => Err(KegError::environment(prefix, "not a keg environment")),
        }
    }

    /// Delete a prefix. Refuses directories without a keg marker.
    pub fn destroy(prefix: &Path) -> Result<()> {
        if !prefix.exists() {
            return Ok(());
        }
        if EnvMarker::read(prefix)?.is_none() {
            return Err(KegError::environment(
                prefix,
                "refusing to remove a directory that is not a keg environment",
            ));
        }

        log::info!("Removing environment {}", prefix.display());
        std::fs::remove_dir_all(prefix)
            .map_err(|e| KegError::environment(prefix, format!("cannot remove: {}", e)))
    }
}

/// Undo a half-finished provision: an empty directory we found is emptied again,
/// one we created is removed
fn discard_partial(prefix: &Path, existed: bool) {
    let result = if existed {
        std::fs::read_dir(prefix).and_then(|entries| {
            for entry in entries {
                let path = entry?.path();
                if path.is_dir() && !path.is_symlink() {
                    std::fs::remove_dir_all(&path)?;
                } else {
                    std::fs::remove_file(&path)?;
                }
            }
            Ok(())
        })
    } else {
        std::fs::remove_dir_all(prefix)
    };

    if let Err(e) = result {
        log::warn!("Could not clean up {}: {}", prefix.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_provision_creates_layout() {
        let temp = TempDir::new().unwrap();
        let prefix = temp.path().join("demo/1.0");

        let handle = EnvironmentProvisioner::new("demo", "1.0").provision(&prefix).unwrap();

        assert_eq!(handle.prefix(), prefix);
        assert!(handle.bin_dir().is_dir());
        assert!(handle.libexec_dir().is_dir());
        assert!(handle.src_dir().is_dir());
        assert!(prefix.join(MARKER_FILE).is_file());
        assert!(!handle.is_installed());
    }

    #[test]
    fn test_provision_twice_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let prefix = temp.path().join("demo");
        let provisioner = EnvironmentProvisioner::new("demo", "1.0");

        let first = provisioner.provision(&prefix).unwrap();
        std::fs::write(first.bin_dir().join("demo"), "#!/bin/sh\n").unwrap();
        let second = provisioner.provision(&prefix).unwrap();

        assert_eq!(first, second);
        let entries: Vec<_> = std::fs::read_dir(&prefix).unwrap().collect();
        assert_eq!(entries.len(), 4);
        assert!(second.bin_dir().join("demo").is_file());
    }

    #[test]
    fn test_reset_clears_contents() {
        let temp = TempDir::new().unwrap();
        let prefix = temp.path().join("demo");
        let provisioner = EnvironmentProvisioner::new("demo", "1.0");

        let handle = provisioner.provision(&prefix).unwrap();
        std::fs::write(handle.bin_dir().join("stale"), "").unwrap();

        let handle = provisioner
            .with_mode(ProvisionMode::Reset)
            .provision(&prefix)
            .unwrap();
        assert!(!handle.bin_dir().join("stale").exists());
        assert!(handle.bin_dir().is_dir());
    }

    #[test]
    fn test_refuses_foreign_directory() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("important.txt"), "data").unwrap();

        let err = EnvironmentProvisioner::new("demo", "1.0")
            .with_mode(ProvisionMode::Reset)
            .provision(temp.path())
            .unwrap_err();

        assert!(matches!(err, KegError::Environment { .. }));
        assert_eq!(err.exit_code(), 2);
        assert!(temp.path().join("important.txt").exists());
    }

    #[test]
    fn test_refuses_other_formula_version() {
        let temp = TempDir::new().unwrap();
        EnvironmentProvisioner::new("demo", "1.0").provision(temp.path()).unwrap();

        let err = EnvironmentProvisioner::new("demo", "2.0")
            .provision(temp.path())
            .unwrap_err();
        assert!(err.to_string().contains("belongs to demo 1.0"));
    }

    #[test]
    fn test_refuses_file_prefix() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("file");
        std::fs::write(&file, "").unwrap();

        assert!(EnvironmentProvisioner::new("demo", "1.0").provision(&file).is_err());
    }

    #[test]
    fn test_open_and_destroy() {
        let temp = TempDir::new().unwrap();
        let prefix = temp.path().join("demo");
        let provisioner = EnvironmentProvisioner::new("demo", "1.0");

        assert!(provisioner.open(&prefix).is_err());
        let handle = provisioner.provision(&prefix).unwrap();
        assert_eq!(provisioner.open(&prefix).unwrap(), handle);

        EnvironmentProvisioner::destroy(&prefix).unwrap();
        assert!(!prefix.exists());
        EnvironmentProvisioner::destroy(&prefix).unwrap();
    }

    #[test]
    fn test_destroy_refuses_unmarked_directory() {
        let temp = TempDir::new().unwrap();
        assert!(EnvironmentProvisioner::destroy(temp.path()).is_err());
        assert!(temp.path().exists());
    }

    #[test]
    fn test_discard_partial_removes_created_prefix() {
        let temp = TempDir::new().unwrap();
        let prefix = temp.path().join("demo/1.0");
        std::fs::create_dir_all(prefix.join("bin")).unwrap();

        discard_partial(&prefix, false);

        assert!(!prefix.exists());
        assert!(temp.path().join("demo").is_dir());
    }

    #[test]
    fn test_discard_partial_empties_existing_prefix() {
        let temp = TempDir::new().unwrap();
        let prefix = temp.path().join("empty");
        std::fs::create_dir_all(prefix.join("libexec")).unwrap();
        std::fs::write(prefix.join(MARKER_FILE), "{").unwrap();

        discard_partial(&prefix, true);

        assert!(prefix.is_dir());
        assert_eq!(std::fs::read_dir(&prefix).unwrap().count(), 0);
        EnvironmentProvisioner::new("demo", "1.0").provision(&prefix).unwrap();
    }
}
