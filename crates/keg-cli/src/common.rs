//! Helpers shared by the commands.

use anyhow::{Context, Result};
use keg_pm::downloader::{HttpFetcher, SourceFetcher};
use keg_pm::http::HttpClient;
use keg_pm::{Config, ErrorKind, Formula, InstallPipeline, KegError, ProvisionMode, Stage};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::progress::StageReporter;

/// Exit code for failures that carry no [`ErrorKind`]
pub const GENERIC_FAILURE: u8 = 2;

/// A failed pipeline stage, reported as `<stage> failed (<kind>): <message>`
#[derive(Debug)]
pub struct StageFailure {
    pub stage: Option<Stage>,
    pub kind: ErrorKind,
    pub message: String,
}

impl StageFailure {
    pub fn new(stage: Stage, err: KegError) -> Self {
        Self {
            stage: Some(stage),
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.kind.exit_code()
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::output::failure_line(self.stage, self.kind, &self.message))
    }
}

impl std::error::Error for StageFailure {}

/// Exit code for an error returned by a command
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(failure) = cause.downcast_ref::<StageFailure>() {
            return failure.exit_code();
        }
        if let Some(keg) = cause.downcast_ref::<KegError>() {
            return keg.exit_code();
        }
    }
    GENERIC_FAILURE
}

/// Load and validate a formula; failures are resolve-stage failures
pub fn load_formula(path: &Path) -> Result<Formula> {
    Formula::load(path).map_err(|e| StageFailure::new(Stage::Resolve, e).into())
}

/// Effective configuration for the current directory
pub fn load_config() -> Result<Config> {
    let cwd = std::env::current_dir().context("Failed to resolve working directory")?;
    Config::build(Some(&cwd), true).context("Failed to load configuration")
}

/// `--prefix` if given, else `<prefix-root>/<name>/<version>`
pub fn resolve_prefix(config: &Config, formula: &Formula, explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(prefix) = explicit {
        return Ok(prefix.to_path_buf());
    }
    let version = formula
        .version()
        .map_err(|e| StageFailure::new(Stage::Resolve, e))?;
    Ok(config.prefix_for(&formula.name, &version))
}

/// Pipeline whose fetch progress and stages are shown by `reporter`
pub fn build_pipeline(
    config: &Config,
    reporter: Arc<StageReporter>,
    mode: ProvisionMode,
) -> Result<InstallPipeline> {
    let client = HttpClient::with_config(config.http_client_config())
        .context("Failed to create HTTP client")?;

    let progress_reporter = reporter.clone();
    let http = HttpFetcher::new(Arc::new(client)).with_progress(Arc::new(move |done, total| {
        progress_reporter.download_progress(done, total)
    }));

    let mut pipeline =
        InstallPipeline::with_fetcher_from_config(Arc::new(SourceFetcher::new(http)), config)
            .with_mode(mode);
    pipeline.add_listener(reporter);
    Ok(pipeline)
}
