//! Install command - run the full pipeline for a formula.

use anyhow::Result;
use clap::Args;
use console::style;
use std::path::PathBuf;
use std::sync::Arc;

use keg_pm::ProvisionMode;

use crate::common::{build_pipeline, load_config, load_formula, resolve_prefix};
use crate::output::Output;
use crate::progress::{ProgressManager, StageReporter};

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Formula file (.rb, .toml or .json)
    #[arg(value_name = "FORMULA")]
    pub formula: PathBuf,

    /// Install into this directory instead of <prefix-root>/<name>/<version>
    #[arg(long)]
    pub prefix: Option<PathBuf>,

    /// Remove an existing install of this version before installing
    #[arg(long)]
    pub reset: bool,

    /// Download retries (overrides max-retries)
    #[arg(long, value_name = "N")]
    pub retries: Option<u32>,

    /// Print the install result as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: InstallArgs, output: &mut Output) -> Result<u8> {
    output.set_json_mode(args.json);

    let formula = load_formula(&args.formula)?;
    let mut config = load_config()?;
    if let Some(retries) = args.retries {
        config.max_retries = retries;
    }
    let prefix = resolve_prefix(&config, &formula, args.prefix.as_deref())?;

    let mode = if args.reset {
        ProvisionMode::Reset
    } else {
        ProvisionMode::Reuse
    };

    let show_progress = !output.is_json() && !output.is_quiet() && output.term().is_term();
    let reporter = Arc::new(StageReporter::new(
        ProgressManager::new(show_progress),
        formula.name.clone(),
    ));
    let pipeline = build_pipeline(&config, reporter, mode)?;

    output.info(&format!(
        "Installing {} into {}",
        style(&formula.name).bold(),
        prefix.display()
    ));

    let result = pipeline.run(&formula, &prefix).await;
    output.json(&result);

    if result.success {
        output.success(&format!(
            "{} {} installed",
            formula.name,
            result.version.as_deref().unwrap_or_default()
        ));
        for entry_point in &result.entry_points {
            output.list_item("→", &entry_point.display().to_string());
        }
        output.verbose(&format!(
            "States: {}",
            result
                .states
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(" → ")
        ));
    } else if let Some(kind) = result.error_kind {
        output.stage_failure(
            result.failed_stage,
            kind,
            result.error_message.as_deref().unwrap_or_default(),
        );
    }

    Ok(result.exit_code())
}
