//! Formula model: the immutable declaration a pipeline run consumes.

mod loader;
mod ruby;

pub use loader::{FormulaFormat, FormulaLoader};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::downloader::ChecksumType;
use crate::{KegError, Result};

lazy_static! {
    static ref NAME_PATTERN: Regex = Regex::new(r"^[a-z0-9][a-z0-9+_.@-]*$").unwrap();
    static ref VERSION_IN_STEM: Regex =
        Regex::new(r"[-_]v?(\d+(?:\.\d+)*(?:[-.]?(?:a|b|rc|alpha|beta|post|dev)\d*)?)$").unwrap();
}

const ARCHIVE_SUFFIXES: &[&str] = &[
    ".tar.gz", ".tgz", ".tar.bz2", ".tbz2", ".tar.xz", ".txz", ".tar", ".zip", ".whl",
];

/// Post-install acceptance check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormulaTest {
    /// Shell command; `#{bin}`, `#{prefix}` and `#{libexec}` are interpolated
    pub command: String,
    /// Substring the combined output must contain
    pub expected: String,
    /// Required exit status
    #[serde(default, skip_serializing_if = "is_zero")]
    pub status: i32,
}

fn is_zero(status: &i32) -> bool {
    *status == 0
}

/// A package declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formula {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    pub url: String,
    /// Explicit version; derived from `url` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_dependency: Option<String>,
    /// Install strategy (`virtualenv_install_with_resources`) or a shell script
    pub install: String,
    pub test: FormulaTest,
}

impl Formula {
    /// Load and validate a formula file
    pub fn load(path: &Path) -> Result<Self> {
        FormulaLoader::load(path)
    }

    /// Check the declaration invariants
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.name.is_empty() {
            errors.push("name cannot be empty".to_string());
        } else if !NAME_PATTERN.is_match(&self.name) {
            errors.push(format!(
                "name '{}' must be lowercase alphanumerics and +_.@- only",
                self.name
            ));
        }
        if self.url.trim().is_empty() {
            errors.push("url cannot be empty".to_string());
        }
        if self.install.trim().is_empty() {
            errors.push("install cannot be empty".to_string());
        }
        if self.test.command.trim().is_empty() {
            errors.push("test command cannot be empty".to_string());
        }
        if self.test.expected.is_empty() {
            errors.push("test expected output cannot be empty".to_string());
        }
        if let Some(dep) = &self.runtime_dependency {
            if dep.trim().is_empty() {
                errors.push("runtime_dependency cannot be blank".to_string());
            }
        }

        if !errors.is_empty() {
            return Err(KegError::invalid_formula(errors.join("; ")));
        }

        self.validate_digest()?;
        self.version()?;

        Ok(())
    }

    /// The sha256 must be a full-length hex digest
    pub fn validate_digest(&self) -> Result<()> {
        let well_formed = self.sha256.len() == ChecksumType::Sha256.hex_length()
            && self.sha256.chars().all(|c| c.is_ascii_hexdigit());

        if well_formed {
            Ok(())
        } else {
            Err(KegError::MalformedDigest {
                digest: self.sha256.clone(),
                reason: format!(
                    "sha256 must be 64 hexadecimal characters, got {}",
                    self.sha256.len()
                ),
            })
        }
    }

    /// Explicit version, or the one embedded in the archive file name
    pub fn version(&self) -> Result<String> {
        if let Some(version) = &self.version {
            return Ok(version.clone());
        }

        version_from_url(&self.url).ok_or_else(|| {
            KegError::invalid_formula(format!(
                "cannot derive a version from '{}'; declare one explicitly",
                self.url
            ))
        })
    }
}

/// Extract a version from an archive URL (`polar_cli-0.1.0.tar.gz` -> `0.1.0`)
pub fn version_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file_name = path.rsplit('/').next()?;
    let lower = file_name.to_lowercase();

    let stem = ARCHIVE_SUFFIXES
        .iter()
        .find(|suffix| lower.ends_with(*suffix))
        .map(|suffix| &file_name[..file_name.len() - suffix.len()])
        .unwrap_or(file_name);

    VERSION_IN_STEM
        .captures(stem)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn polar_cli() -> Formula {
        Formula {
            name: "polar-cli".to_string(),
            desc: Some("CLI for Polar — manage products, customers, and webhooks from the terminal".to_string()),
            homepage: Some("https://github.com/berkantay/polar-cli".to_string()),
            url: "https://files.pythonhosted.org/packages/16/05/61de49047d5fbe46e665e22dc1e8be6b31e6e1f2d68c753a1a56cf4125e3/polar_cli-0.1.0.tar.gz".to_string(),
            version: None,
            sha256: "ad54968d94a0cc47e3be22f4d99119d78ee0baf2b0f27f43d3c3127fa4ab45b4".to_string(),
            license: Some("Apache-2.0".to_string()),
            runtime_dependency: Some("python@3.12".to_string()),
            install: "virtualenv_install_with_resources".to_string(),
            test: FormulaTest {
                command: "#{bin}/polar --help".to_string(),
                expected: "polar".to_string(),
                status: 0,
            },
        }
    }

    #[test]
    fn test_valid_formula() {
        let formula = polar_cli();
        assert!(formula.validate().is_ok());
        assert_eq!(formula.version().unwrap(), "0.1.0");
    }

    #[test]
    fn test_version_from_url() {
        assert_eq!(version_from_url("https://x/polar_cli-0.1.0.tar.gz"), Some("0.1.0".to_string()));
        assert_eq!(version_from_url("https://x/tool-v2.3.tgz"), Some("2.3".to_string()));
        assert_eq!(version_from_url("https://x/tool-1.0rc1.zip?dl=1"), Some("1.0rc1".to_string()));
        assert_eq!(version_from_url("/srv/demo-7.tar"), Some("7".to_string()));
        assert_eq!(version_from_url("https://x/download"), None);
    }

    #[test]
    fn test_explicit_version_wins() {
        let mut formula = polar_cli();
        formula.version = Some("0.1.0-1".to_string());
        assert_eq!(formula.version().unwrap(), "0.1.0-1");
    }

    #[test]
    fn test_validate_rejects_65_character_digest() {
        let mut formula = polar_cli();
        formula.sha256.push('0');
        let err = formula.validate().unwrap_err();
        assert!(matches!(err, KegError::MalformedDigest { .. }));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_validate_rejects_empty_commands() {
        let mut formula = polar_cli();
        formula.install = "  ".to_string();
        formula.test.command = String::new();
        match formula.validate() {
            Err(KegError::InvalidFormula { message }) => {
                assert!(message.contains("install cannot be empty"));
                assert!(message.contains("test command cannot be empty"));
            }
            other => panic!("expected invalid formula, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_path_like_name() {
        let mut formula = polar_cli();
        formula.name = "../evil".to_string();
        assert!(formula.validate().is_err());
    }

    #[test]
    fn test_underivable_version() {
        let mut formula = polar_cli();
        formula.url = "https://example.com/download".to_string();
        assert!(matches!(formula.validate(), Err(KegError::InvalidFormula { .. })));
    }
}
