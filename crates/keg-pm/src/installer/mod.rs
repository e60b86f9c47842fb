//! Package installation into a provisioned prefix.

mod binary;
mod runtime;
mod strategy;

pub use binary::{executables_in, BinaryLinker};
pub use runtime::RuntimeResolver;
pub use strategy::InstallStrategy;

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

use crate::downloader::{ArchiveExtractor, ArchiveType};
use crate::environment::EnvironmentHandle;
use crate::formula::Formula;
use crate::process::{self, CommandOutput, ProcessError};
use crate::{InstallErrorKind, KegError, Result};

const STDERR_TAIL_LINES: usize = 20;

/// What an install produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub strategy: InstallStrategy,
    /// Resolved runtime executable, if the install needed one
    pub runtime: Option<PathBuf>,
    /// Executables registered in `<prefix>/bin`
    pub entry_points: Vec<PathBuf>,
    /// Number of files unpacked into `<prefix>/src`
    pub extracted: usize,
}

/// Unpacks an archive into a prefix and runs the formula's install strategy
pub struct PackageInstaller {
    resolver: RuntimeResolver,
    process_timeout: Option<Duration>,
}

impl PackageInstaller {
    pub fn new(resolver: RuntimeResolver) -> Self {
        Self {
            resolver,
            process_timeout: None,
        }
    }

    pub fn with_process_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.process_timeout = timeout;
        self
    }

    /// Install `archive` (the formula's verified source) into `env`
    pub async fn install(
        &self,
        env: &EnvironmentHandle,
        archive: &[u8],
        formula: &Formula,
    ) -> Result<InstallOutcome> {
        let archive_type = ArchiveType::detect(&formula.url, archive).ok_or_else(|| {
            KegError::install(
                InstallErrorKind::UnsupportedArchive,
                format!("cannot determine the archive type of {}", formula.url),
            )
        })?;

        // Nothing from an earlier install may satisfy this one.
        clear_dir(&env.bin_dir())?;
        clear_dir(&env.libexec_dir())?;

        let src = env.src_dir();
        clear_dir(&src)?;
        let extracted = ArchiveExtractor::extract(archive, archive_type, &src)?;
        log::info!("Unpacked {} files into {}", extracted, src.display());

        let strategy = InstallStrategy::parse(&formula.install);
        let runtime = formula
            .runtime_dependency
            .as_deref()
            .or(strategy.default_runtime())
            .map(|dependency| self.resolver.resolve(dependency))
            .transpose()?;

        match &strategy {
            InstallStrategy::Virtualenv => self.install_virtualenv(env, runtime.as_deref()).await?,
            InstallStrategy::Shell(script) => {
                self.install_shell(env, script, runtime.as_deref()).await?
            }
        }

        let entry_points = BinaryLinker::new(env.bin_dir()).entry_points()?;
        if entry_points.is_empty() {
            return Err(KegError::install(
                InstallErrorKind::NoEntryPoint,
                format!("no executables in {}", env.bin_dir().display()),
            ));
        }

        Ok(InstallOutcome {
            strategy,
            runtime,
            entry_points,
            extracted,
        })
    }

    async fn install_virtualenv(&self, env: &EnvironmentHandle, python: Option<&Path>) -> Result<()> {
        let python = python.ok_or_else(|| {
            KegError::install(
                InstallErrorKind::DependencyUnavailable,
                "a virtualenv install needs a python runtime",
            )
        })?;
        let venv = env.libexec_dir();

        log::info!("Creating virtualenv in {}", venv.display());
        let mut command = Command::new(python);
        command.arg("-m").arg("venv").arg(&venv);
        self.run_checked(command, "python -m venv").await?;

        let venv_bin = venv.join("bin");
        let before: HashSet<PathBuf> = executables_in(&venv_bin)?.into_iter().collect();

        log::info!("Installing {} with pip", env.src_dir().display());
        let mut command = Command::new(venv_bin.join("python"));
        command
            .args(["-m", "pip", "install", "--disable-pip-version-check", "--no-input"])
            .arg(env.src_dir())
            .current_dir(env.src_dir());
        self.run_checked(command, "pip install").await?;

        let scripts: Vec<PathBuf> = executables_in(&venv_bin)?
            .into_iter()
            .filter(|path| !before.contains(path))
            .collect();
        BinaryLinker::new(env.bin_dir()).link(&scripts).await?;

        Ok(())
    }

    async fn install_shell(
        &self,
        env: &EnvironmentHandle,
        script: &str,
        runtime: Option<&Path>,
    ) -> Result<()> {
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(script)
            .current_dir(env.src_dir())
            .env("PREFIX", env.prefix())
            .env("KEG_PREFIX", env.prefix())
            .env("KEG_BIN", env.bin_dir())
            .env("KEG_LIBEXEC", env.libexec_dir());

        if let Some(runtime) = runtime {
            command.env("KEG_RUNTIME", runtime);
            if let Some(dir) = runtime.parent() {
                command.env("PATH", prepend_path(dir));
            }
        }

        log::info!("Running install script in {}", env.src_dir().display());
        self.run_checked(command, "install script").await?;
        Ok(())
    }

    async fn run_checked(&self, command: Command, what: &str) -> Result<CommandOutput> {
        let output = process::run(command, self.process_timeout)
            .await
            .map_err(|e| command_failed(what, e))?;

        if !output.success() {
            return Err(KegError::install(
                InstallErrorKind::CommandFailed,
                format!(
                    "{} failed with {}: {}",
                    what,
                    output.describe_status(),
                    output.stderr_tail(STDERR_TAIL_LINES)
                ),
            ));
        }
        Ok(output)
    }
}

fn command_failed(what: &str, e: ProcessError) -> KegError {
    KegError::install(InstallErrorKind::CommandFailed, format!("{}: {}", what, e))
}

fn prepend_path(dir: &Path) -> OsString {
    let mut paths = vec![dir.to_path_buf()];
    if let Some(existing) = std::env::var_os("PATH") {
        paths.extend(std::env::split_paths(&existing));
    }
    std::env::join_paths(paths).unwrap_or_else(|_| dir.as_os_str().to_os_string())
}

fn clear_dir(dir: &Path) -> Result<()> {
    let disk_write = |e: std::io::Error| {
        KegError::install(
            InstallErrorKind::DiskWrite,
            format!("Failed to prepare {}: {}", dir.display(), e),
        )
    };

    if dir.exists() {
        std::fs::remove_dir_all(dir).map_err(disk_write)?;
    }
    std::fs::create_dir_all(dir).map_err(disk_write)
}
