//! The install pipeline: fetch, verify, provision, install, accept.
//!
//! Each stage runs only after the previous one succeeded, and the first
//! failure ends the run. Progress is recorded as a sequence of
//! [`InstallState`]s in the returned [`InstallResult`].

mod state;

pub use state::{InstallState, StateTracker};

use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::acceptance::AcceptanceRunner;
use crate::config::Config;
use crate::downloader::{verify_sha256, ArchiveFetcher, HttpFetcher, SourceFetcher};
use crate::environment::{
    EnvironmentHandle, EnvironmentProvisioner, InstallReceipt, ProvisionMode,
};
use crate::formula::Formula;
use crate::http::HttpClient;
use crate::installer::{InstallOutcome, PackageInstaller, RuntimeResolver};
use crate::process::CommandOutput;
use crate::{ErrorKind, KegError, Result};

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    /// Formula validation and version resolution
    Resolve,
    Fetch,
    Verify,
    Provision,
    Install,
    Accept,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Resolve => "resolve",
            Stage::Fetch => "fetch",
            Stage::Verify => "verify",
            Stage::Provision => "provision",
            Stage::Install => "install",
            Stage::Accept => "accept",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Observer of pipeline progress
pub trait PipelineListener: Send + Sync {
    /// A stage is about to run
    fn stage_started(&self, _stage: Stage) {}

    /// The run moved from `from` to `to`
    fn transition(&self, from: InstallState, to: InstallState);

    /// Higher priority listeners are notified first
    fn priority(&self) -> i32 {
        0
    }
}

/// Outcome of one pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallResult {
    pub success: bool,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// The prefix, set only when the install succeeded
    pub installed_path: Option<PathBuf>,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<Stage>,
    pub states: Vec<InstallState>,
    pub entry_points: Vec<PathBuf>,
}

impl InstallResult {
    pub fn final_state(&self) -> InstallState {
        self.states.last().copied().unwrap_or(InstallState::Pending)
    }

    /// 0 on success, otherwise the exit code of the failure kind
    pub fn exit_code(&self) -> u8 {
        self.error_kind.map(|kind| kind.exit_code()).unwrap_or(0)
    }
}

/// Runs formulas through the five install stages
pub struct InstallPipeline {
    fetcher: Arc<dyn ArchiveFetcher>,
    installer: PackageInstaller,
    acceptance: AcceptanceRunner,
    mode: ProvisionMode,
    listeners: Vec<Arc<dyn PipelineListener>>,
}

/// What a run has done so far, for result building and rollback
#[derive(Default)]
struct RunContext {
    version: Option<String>,
    env: Option<EnvironmentHandle>,
    created_prefix: bool,
    stage: Option<Stage>,
}

impl InstallPipeline {
    pub fn new(
        fetcher: Arc<dyn ArchiveFetcher>,
        installer: PackageInstaller,
        acceptance: AcceptanceRunner,
    ) -> Self {
        Self {
            fetcher,
            installer,
            acceptance,
            mode: ProvisionMode::Reuse,
            listeners: Vec::new(),
        }
    }

    /// Pipeline wired from configuration: HTTP client, runtimes and timeouts
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Arc::new(HttpClient::with_config(config.http_client_config())?);
        let fetcher = Arc::new(SourceFetcher::new(HttpFetcher::new(client)));
        Ok(Self::with_fetcher_from_config(fetcher, config))
    }

    /// Like [`from_config`](Self::from_config) with a caller-built fetcher
    pub fn with_fetcher_from_config(fetcher: Arc<dyn ArchiveFetcher>, config: &Config) -> Self {
        let installer = PackageInstaller::new(RuntimeResolver::from_config(config))
            .with_process_timeout(config.process_timeout());
        let acceptance = AcceptanceRunner::new().with_timeout(config.process_timeout());
        Self::new(fetcher, installer, acceptance)
    }

    pub fn with_mode(mut self, mode: ProvisionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn add_listener(&mut self, listener: Arc<dyn PipelineListener>) {
        self.listeners.push(listener);
        self.listeners.sort_by_key(|l| std::cmp::Reverse(l.priority()));
    }

    /// Run all stages for `formula` into `prefix`
    pub async fn run(&self, formula: &Formula, prefix: &Path) -> InstallResult {
        let mut tracker = StateTracker::new();
        let mut ctx = RunContext::default();

        match self.execute(formula, prefix, &mut tracker, &mut ctx).await {
            Ok(outcome) => {
                log::info!("Installed {} into {}", formula.name, prefix.display());
                InstallResult {
                    success: true,
                    name: formula.name.clone(),
                    version: ctx.version,
                    installed_path: Some(prefix.to_path_buf()),
                    error_kind: None,
                    error_message: None,
                    failed_stage: None,
                    states: tracker.into_history(),
                    entry_points: outcome.entry_points,
                }
            }
            Err(err) => {
                let kind = err.kind();
                log::warn!(
                    "{} failed at {}: {}",
                    formula.name,
                    ctx.stage.map(|s| s.name()).unwrap_or("start"),
                    err
                );

                self.record(&mut tracker, InstallState::Failed(kind))
                    .unwrap_or_else(|e| log::error!("{}", e));
                self.rollback(&ctx);

                InstallResult {
                    success: false,
                    name: formula.name.clone(),
                    version: ctx.version,
                    installed_path: None,
                    error_kind: Some(kind),
                    error_message: Some(err.to_string()),
                    failed_stage: ctx.stage,
                    states: tracker.into_history(),
                    entry_points: Vec::new(),
                }
            }
        }
    }

    async fn execute(
        &self,
        formula: &Formula,
        prefix: &Path,
        tracker: &mut StateTracker,
        ctx: &mut RunContext,
    ) -> Result<InstallOutcome> {
        self.begin(ctx, Stage::Resolve);
        formula.validate()?;
        let version = formula.version()?;
        ctx.version = Some(version.clone());

        self.begin(ctx, Stage::Fetch);
        let archive = self.fetcher.fetch(&formula.url).await?;
        self.record(tracker, InstallState::Fetched)?;

        self.begin(ctx, Stage::Verify);
        verify_sha256(&archive, &formula.sha256)?;
        self.record(tracker, InstallState::Verified)?;

        self.begin(ctx, Stage::Provision);
        let existed = prefix.exists();
        let env = EnvironmentProvisioner::new(&formula.name, &version)
            .with_mode(self.mode)
            .provision(prefix)?;
        ctx.created_prefix = !existed || self.mode == ProvisionMode::Reset;
        ctx.env = Some(env.clone());
        InstallReceipt::remove(env.prefix())?;
        self.record(tracker, InstallState::Provisioned)?;

        self.begin(ctx, Stage::Install);
        let outcome = self.installer.install(&env, &archive, formula).await?;
        self.record(tracker, InstallState::Installed)?;

        self.begin(ctx, Stage::Accept);
        self.acceptance.accept(&env, &formula.test).await?;
        receipt(formula, &version, &env, &outcome).write(env.prefix())?;
        self.record(tracker, InstallState::Accepted)?;

        Ok(outcome)
    }

    /// Re-run the acceptance check against an installed prefix
    pub async fn accept_only(&self, formula: &Formula, prefix: &Path) -> Result<CommandOutput> {
        formula.validate()?;
        let version = formula.version()?;
        let env = EnvironmentProvisioner::new(&formula.name, &version).open(prefix)?;

        if !env.is_installed() {
            return Err(KegError::environment(
                prefix,
                "no install receipt; run `keg install` first",
            ));
        }

        for listener in &self.listeners {
            listener.stage_started(Stage::Accept);
        }
        self.acceptance.accept(&env, &formula.test).await
    }

    fn begin(&self, ctx: &mut RunContext, stage: Stage) {
        log::debug!("Stage {}", stage);
        ctx.stage = Some(stage);
        for listener in &self.listeners {
            listener.stage_started(stage);
        }
    }

    fn record(&self, tracker: &mut StateTracker, next: InstallState) -> Result<()> {
        let from = tracker.advance(next)?;
        for listener in &self.listeners {
            listener.transition(from, next);
        }
        Ok(())
    }

    fn rollback(&self, ctx: &RunContext) {
        let Some(env) = &ctx.env else {
            return;
        };

        let result = if ctx.created_prefix {
            log::info!("Rolling back {}", env.prefix().display());
            EnvironmentProvisioner::destroy(env.prefix())
        } else {
            InstallReceipt::remove(env.prefix())
        };

        if let Err(e) = result {
            log::warn!("Rollback incomplete: {}", e);
        }
    }
}

fn receipt(
    formula: &Formula,
    version: &str,
    env: &EnvironmentHandle,
    outcome: &InstallOutcome,
) -> InstallReceipt {
    InstallReceipt {
        name: formula.name.clone(),
        version: version.to_string(),
        url: formula.url.clone(),
        sha256: formula.sha256.to_lowercase(),
        runtime_dependency: formula.runtime_dependency.clone(),
        runtime: outcome.runtime.clone(),
        strategy: outcome.strategy.name().to_string(),
        entry_points: outcome
            .entry_points
            .iter()
            .map(|path| {
                path.strip_prefix(env.prefix())
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|_| path.clone())
            })
            .collect(),
        installed_at: Utc::now(),
        keg_version: env!("CARGO_PKG_VERSION").to_string(),
    }
}
