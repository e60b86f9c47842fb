//! Configuration management.
//!
//! Values are merged from several sources, highest priority first:
//!
//! 1. Command-line flags (applied by the caller)
//! 2. Environment variables (`KEG_*`)
//! 3. Project `keg.toml`, searched upward from the working directory
//! 4. Global `config.toml` in the keg home directory
//! 5. Built-in defaults
//!
//! ```toml
//! prefix-root = "~/.keg/Cellar"
//! http-timeout = 60
//! max-retries = 2
//! process-timeout = 300
//!
//! [runtimes]
//! "python@3.12" = "/opt/python/3.12/bin/python3"
//! ```

mod config;
mod source;

pub use config::Config;
pub use source::{ConfigLoader, ConfigSource, RawConfig};
