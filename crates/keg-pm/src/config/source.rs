use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{KegError, Result};

/// Project configuration file name
pub const PROJECT_CONFIG_FILE: &str = "keg.toml";

/// Represents the source of a configuration value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Default,
    Global(PathBuf),
    Project(PathBuf),
    Environment(String),
}

impl ConfigSource {
    pub fn describe(&self) -> String {
        match self {
            ConfigSource::Default => "default".to_string(),
            ConfigSource::Global(path) => format!("global ({})", path.display()),
            ConfigSource::Project(path) => format!("project ({})", path.display()),
            ConfigSource::Environment(var) => var.clone(),
        }
    }
}

/// Configuration as written in a TOML file; every key is optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct RawConfig {
    pub prefix_root: Option<String>,
    pub http_timeout: Option<u64>,
    pub connect_timeout: Option<u64>,
    pub max_retries: Option<u32>,
    pub max_download_size: Option<u64>,
    pub process_timeout: Option<u64>,
    pub proxy: Option<String>,
    pub cafile: Option<String>,
    pub runtimes: IndexMap<String, String>,
}

/// Loads configuration from files and the environment
#[derive(Debug)]
pub struct ConfigLoader {
    use_environment: bool,
}

impl ConfigLoader {
    pub fn new(use_environment: bool) -> Self {
        Self { use_environment }
    }

    /// Get a non-empty environment variable
    pub fn get_env(&self, var: &str) -> Option<String> {
        if !self.use_environment {
            return None;
        }

        env::var(var).ok().filter(|s| !s.is_empty())
    }

    /// Get a config value from the environment: "max-retries" -> `KEG_MAX_RETRIES`
    pub fn get_env_config(&self, key: &str) -> Option<String> {
        let env_var = format!("KEG_{}", key.replace('-', "_").to_uppercase());
        self.get_env(&env_var)
    }

    /// Parse a numeric environment value, reporting the variable on failure
    pub fn get_env_number<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>> {
        match self.get_env_config(key) {
            Some(value) => value.parse::<T>().map(Some).map_err(|_| {
                KegError::Config(format!(
                    "KEG_{} must be a non-negative integer, got '{}'",
                    key.replace('-', "_").to_uppercase(),
                    value
                ))
            }),
            None => Ok(None),
        }
    }

    /// The keg home directory holding the global config
    pub fn get_keg_home(&self) -> PathBuf {
        if let Some(home) = self.get_env("KEG_HOME") {
            return expand_path(&home);
        }

        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "keg") {
            proj_dirs.config_dir().to_path_buf()
        } else if let Some(base) = directories::BaseDirs::new() {
            base.home_dir().join(".keg")
        } else {
            PathBuf::from(".keg")
        }
    }

    /// Where prefixes live when nothing else is configured
    pub fn default_prefix_root(&self) -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "keg") {
            proj_dirs.data_dir().join("Cellar")
        } else {
            self.get_keg_home().join("Cellar")
        }
    }

    /// Load a TOML config file; a missing file is an empty config
    pub fn load_config_file<P: AsRef<Path>>(&self, path: P) -> Result<RawConfig> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(RawConfig::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| KegError::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        toml::from_str(&contents)
            .map_err(|e| KegError::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Load `config.toml` from the keg home directory
    pub fn load_global_config(&self) -> Result<(RawConfig, PathBuf)> {
        let path = self.get_keg_home().join("config.toml");
        Ok((self.load_config_file(&path)?, path))
    }

    /// Find `keg.toml` in `start_dir` or any of its parents
    pub fn find_project_config(&self, start_dir: &Path) -> Option<PathBuf> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(PROJECT_CONFIG_FILE);
            if config_path.is_file() {
                return Some(config_path);
            }

            if !current.pop() {
                return None;
            }
        }
    }
}

/// Expand `~` and environment references in a configured path
pub fn expand_path(value: &str) -> PathBuf {
    match shellexpand::full(value) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(value).as_ref()),
    }
}
