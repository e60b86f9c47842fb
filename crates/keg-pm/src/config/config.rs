use indexmap::IndexMap;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::source::{expand_path, ConfigLoader, ConfigSource, RawConfig};
use crate::error::Result;
use crate::http::HttpClientConfig;

const DEFAULT_HTTP_TIMEOUT: u64 = 30;
const DEFAULT_CONNECT_TIMEOUT: u64 = 10;
const DEFAULT_PROCESS_TIMEOUT: u64 = 300;

/// Effective keg configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Directory holding `<name>/<version>` prefixes
    pub prefix_root: PathBuf,
    /// Whole-request HTTP timeout in seconds
    pub http_timeout: u64,
    pub connect_timeout: u64,
    /// Retries after a failed download; 0 means a single attempt
    pub max_retries: u32,
    /// Largest archive accepted from the network in bytes
    pub max_download_size: Option<u64>,
    /// Limit for install and test commands in seconds; 0 disables it
    pub process_timeout: u64,
    pub proxy: Option<String>,
    pub cafile: Option<PathBuf>,
    /// Runtime dependency name -> interpreter path
    pub runtimes: IndexMap<String, PathBuf>,
    #[serde(skip)]
    sources: Vec<ConfigSource>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prefix_root: ConfigLoader::new(false).default_prefix_root(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_retries: 0,
            max_download_size: None,
            process_timeout: DEFAULT_PROCESS_TIMEOUT,
            proxy: None,
            cafile: None,
            runtimes: IndexMap::new(),
            sources: vec![ConfigSource::Default],
        }
    }
}

impl Config {
    /// Build the configuration for a working directory.
    ///
    /// `use_environment` controls whether `KEG_*` variables are consulted.
    pub fn build(working_dir: Option<&Path>, use_environment: bool) -> Result<Self> {
        let loader = ConfigLoader::new(use_environment);
        let mut config = Config::default();

        if loader.get_env("KEG_HOME").is_some() {
            config.prefix_root = loader.get_keg_home().join("Cellar");
        }

        let (global, global_path) = loader.load_global_config()?;
        if global != RawConfig::default() {
            log::debug!("Loaded global config {}", global_path.display());
            config.merge(global, ConfigSource::Global(global_path));
        }

        if let Some(dir) = working_dir {
            if let Some(project_path) = loader.find_project_config(dir) {
                let project = loader.load_config_file(&project_path)?;
                log::debug!("Loaded project config {}", project_path.display());
                config.merge(project, ConfigSource::Project(project_path));
            }
        }

        config.apply_environment(&loader)?;
        Ok(config)
    }

    /// Overlay the keys present in `raw`
    pub fn merge(&mut self, raw: RawConfig, source: ConfigSource) {
        if let Some(root) = raw.prefix_root {
            self.prefix_root = expand_path(&root);
        }
        if let Some(timeout) = raw.http_timeout {
            self.http_timeout = timeout;
        }
        if let Some(timeout) = raw.connect_timeout {
            self.connect_timeout = timeout;
        }
        if let Some(retries) = raw.max_retries {
            self.max_retries = retries;
        }
        if raw.max_download_size.is_some() {
            self.max_download_size = raw.max_download_size;
        }
        if let Some(timeout) = raw.process_timeout {
            self.process_timeout = timeout;
        }
        if raw.proxy.is_some() {
            self.proxy = raw.proxy;
        }
        if let Some(cafile) = raw.cafile {
            self.cafile = Some(expand_path(&cafile));
        }
        for (name, path) in raw.runtimes {
            self.runtimes.insert(name, expand_path(&path));
        }
        self.sources.push(source);
    }

    fn apply_environment(&mut self, loader: &ConfigLoader) -> Result<()> {
        if let Some(root) = loader.get_env_config("prefix-root") {
            self.prefix_root = expand_path(&root);
            self.sources.push(ConfigSource::Environment("KEG_PREFIX_ROOT".to_string()));
        }
        if let Some(timeout) = loader.get_env_number("http-timeout")? {
            self.http_timeout = timeout;
            self.sources.push(ConfigSource::Environment("KEG_HTTP_TIMEOUT".to_string()));
        }
        if let Some(timeout) = loader.get_env_number("connect-timeout")? {
            self.connect_timeout = timeout;
            self.sources.push(ConfigSource::Environment("KEG_CONNECT_TIMEOUT".to_string()));
        }
        if let Some(retries) = loader.get_env_number("max-retries")? {
            self.max_retries = retries;
            self.sources.push(ConfigSource::Environment("KEG_MAX_RETRIES".to_string()));
        }
        if let Some(size) = loader.get_env_number("max-download-size")? {
            self.max_download_size = Some(size);
            self.sources.push(ConfigSource::Environment("KEG_MAX_DOWNLOAD_SIZE".to_string()));
        }
        if let Some(timeout) = loader.get_env_number("process-timeout")? {
            self.process_timeout = timeout;
            self.sources.push(ConfigSource::Environment("KEG_PROCESS_TIMEOUT".to_string()));
        }
        if let Some(proxy) = loader.get_env_config("proxy") {
            self.proxy = Some(proxy);
            self.sources.push(ConfigSource::Environment("KEG_PROXY".to_string()));
        }
        if let Some(cafile) = loader.get_env_config("cafile") {
            self.cafile = Some(expand_path(&cafile));
            self.sources.push(ConfigSource::Environment("KEG_CAFILE".to_string()));
        }
        Ok(())
    }

    /// Sources that contributed, lowest priority first
    pub fn sources(&self) -> &[ConfigSource] {
        &self.sources
    }

    /// Default install prefix for a formula version
    pub fn prefix_for(&self, name: &str, version: &str) -> PathBuf {
        self.prefix_root.join(name).join(version)
    }

    pub fn process_timeout(&self) -> Option<Duration> {
        if self.process_timeout == 0 {
            None
        } else {
            Some(Duration::from_secs(self.process_timeout))
        }
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        let mut http = HttpClientConfig::new()
            .with_timeout(Duration::from_secs(self.http_timeout))
            .with_connect_timeout(Duration::from_secs(self.connect_timeout))
            .with_max_retries(self.max_retries);

        if let Some(proxy) = &self.proxy {
            http = http.with_proxy(proxy.clone());
        }
        if let Some(cafile) = &self.cafile {
            http = http.with_cafile(cafile.clone());
        }
        if let Some(size) = self.max_download_size {
            http = http.with_max_size(size);
        }
        http
    }

    pub fn runtime_override(&self, dependency: &str) -> Option<&Path> {
        self.runtimes.get(dependency).map(PathBuf::as_path)
    }
}
