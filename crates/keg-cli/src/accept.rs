//! Test command - re-run the acceptance check of an installed formula.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

use keg_pm::{ErrorKind, ProvisionMode, Stage};

use crate::common::{build_pipeline, load_config, load_formula, resolve_prefix, StageFailure};
use crate::output::Output;
use crate::progress::{ProgressManager, StageReporter};

#[derive(Args, Debug)]
pub struct TestArgs {
    /// Formula file (.rb, .toml or .json)
    #[arg(value_name = "FORMULA")]
    pub formula: PathBuf,

    /// Installed prefix (defaults to <prefix-root>/<name>/<version>)
    #[arg(long)]
    pub prefix: Option<PathBuf>,
}

pub async fn execute(args: TestArgs, output: &Output) -> Result<u8> {
    let formula = load_formula(&args.formula)?;
    let config = load_config()?;
    let prefix = resolve_prefix(&config, &formula, args.prefix.as_deref())?;

    let reporter = Arc::new(StageReporter::new(
        ProgressManager::new(!output.is_quiet() && output.term().is_term()),
        formula.name.clone(),
    ));
    let pipeline = build_pipeline(&config, reporter, ProvisionMode::Reuse)?;

    let result = pipeline.accept_only(&formula, &prefix).await;
    let stage = match result.as_ref().map_err(|e| e.kind()) {
        Err(ErrorKind::Environment) => Stage::Provision,
        Err(ErrorKind::Acceptance) | Ok(_) => Stage::Accept,
        Err(_) => Stage::Resolve,
    };
    let check = result.map_err(|e| StageFailure::new(stage, e))?;

    output.success(&format!("{} passed its acceptance check", formula.name));
    output.verbose(check.combined().trim_end());
    Ok(0)
}
