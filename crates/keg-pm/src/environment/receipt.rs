use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{KegError, Result};

pub const MARKER_FILE: &str = ".keg-env.json";
pub const RECEIPT_FILE: &str = "INSTALL_RECEIPT.json";

/// Identifies a directory as the prefix of one formula version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvMarker {
    pub name: String,
    pub version: String,
    pub created_at: DateTime<Utc>,
}

impl EnvMarker {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn matches(&self, name: &str, version: &str) -> bool {
        self.name == name && self.version == version
    }

    /// Read the marker in `prefix`, `None` when there is none
    pub fn read(prefix: &Path) -> Result<Option<Self>> {
        read_json(&prefix.join(MARKER_FILE))
    }

    pub fn write(&self, prefix: &Path) -> Result<()> {
        write_json(&prefix.join(MARKER_FILE), self)
    }
}

/// Record of a successful install, written after the acceptance check passed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReceipt {
    pub name: String,
    pub version: String,
    pub url: String,
    pub sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_dependency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<PathBuf>,
    pub strategy: String,
    pub entry_points: Vec<PathBuf>,
    pub installed_at: DateTime<Utc>,
    pub keg_version: String,
}

impl InstallReceipt {
    pub fn read(prefix: &Path) -> Result<Option<Self>> {
        read_json(&prefix.join(RECEIPT_FILE))
    }

    pub fn write(&self, prefix: &Path) -> Result<()> {
        write_json(&prefix.join(RECEIPT_FILE), self)
    }

    /// Remove a receipt if present
    pub fn remove(prefix: &Path) -> Result<()> {
        let path = prefix.join(RECEIPT_FILE);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                log::debug!("Removed receipt {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(KegError::environment(&path, format!("cannot remove receipt: {}", e))),
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(KegError::environment(path, e.to_string())),
    };

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| KegError::environment(path, format!("unreadable: {}", e)))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)
        .map_err(|e| KegError::environment(path, e.to_string()))?;
    std::fs::write(path, content + "\n")
        .map_err(|e| KegError::environment(path, format!("cannot write: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn receipt() -> InstallReceipt {
        InstallReceipt {
            name: "demo".to_string(),
            version: "1.0".to_string(),
            url: "https://example.com/demo-1.0.tar.gz".to_string(),
            sha256: "a".repeat(64),
            runtime_dependency: Some("sh".to_string()),
            runtime: Some(PathBuf::from("/bin/sh")),
            strategy: "shell".to_string(),
            entry_points: vec![PathBuf::from("bin/demo")],
            installed_at: Utc::now(),
            keg_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    #[test]
    fn test_receipt_write_read_remove() {
        let temp = TempDir::new().unwrap();
        assert!(InstallReceipt::read(temp.path()).unwrap().is_none());

        let receipt = receipt();
        receipt.write(temp.path()).unwrap();
        assert_eq!(InstallReceipt::read(temp.path()).unwrap(), Some(receipt));

        InstallReceipt::remove(temp.path()).unwrap();
        assert!(!temp.path().join(RECEIPT_FILE).exists());
        InstallReceipt::remove(temp.path()).unwrap();
    }

    #[test]
    fn test_corrupt_marker_is_environment_error() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(MARKER_FILE), "{not json").unwrap();

        let err = EnvMarker::read(temp.path()).unwrap_err();
        assert!(matches!(err, KegError::Environment { .. }));
    }

    #[test]
    fn test_marker_matches() {
        let marker = EnvMarker::new("demo", "1.0");
        assert!(marker.matches("demo", "1.0"));
        assert!(!marker.matches("demo", "1.1"));
        assert!(!marker.matches("other", "1.0"));
    }
}
