use indexmap::IndexMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::{InstallErrorKind, KegError, Result};

/// Maps a declared runtime dependency (`python@3.12`) to an executable
#[derive(Debug, Clone, Default)]
pub struct RuntimeResolver {
    overrides: IndexMap<String, PathBuf>,
    search_path: Option<OsString>,
}

impl RuntimeResolver {
    /// Resolver searching the process `PATH`
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            overrides: config.runtimes.clone(),
            search_path: None,
        }
    }

    pub fn with_override(mut self, dependency: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.overrides.insert(dependency.into(), path.into());
        self
    }

    /// Search these directories instead of the process `PATH`
    pub fn with_search_path(mut self, search_path: impl Into<OsString>) -> Self {
        self.search_path = Some(search_path.into());
        self
    }

    /// Executable names tried for a dependency, most specific first
    pub fn candidates(dependency: &str) -> Vec<String> {
        let mut candidates = Vec::new();
        match dependency.split_once('@') {
            Some((base, version)) => {
                candidates.push(format!("{}{}", base, version));
                if let Some((major, _)) = version.split_once('.') {
                    candidates.push(format!("{}{}", base, major));
                }
                candidates.push(base.to_string());
            }
            None => candidates.push(dependency.to_string()),
        }
        candidates.dedup();
        candidates
    }

    /// Resolve `dependency` to an executable path
    pub fn resolve(&self, dependency: &str) -> Result<PathBuf> {
        if let Some(path) = self.overrides.get(dependency) {
            return if is_executable(path) {
                log::debug!("Runtime {} -> {} (configured)", dependency, path.display());
                Ok(path.clone())
            } else {
                Err(unavailable(format!(
                    "configured runtime for {} is not an executable: {}",
                    dependency,
                    path.display()
                )))
            };
        }

        let search_path = self
            .search_path
            .clone()
            .or_else(|| std::env::var_os("PATH"))
            .unwrap_or_default();
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));

        let candidates = Self::candidates(dependency);
        for candidate in &candidates {
            if let Ok(path) = which::which_in(candidate, Some(&search_path), &cwd) {
                log::debug!("Runtime {} -> {}", dependency, path.display());
                return Ok(path);
            }
        }

        Err(unavailable(format!(
            "runtime {} not found (tried {})",
            dependency,
            candidates.join(", ")
        )))
    }
}

fn unavailable(message: String) -> KegError {
    KegError::install(InstallErrorKind::DependencyUnavailable, message)
}

#[cfg(unix)]
pub(crate) fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub(crate) fn is_executable(path: &Path) -> bool {
    path.is_file()
}
