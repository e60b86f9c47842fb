//! Uninstall command - remove a formula's prefix.

use anyhow::{bail, Context, Result};
use clap::Args;
use dialoguer::Confirm;
use std::path::{Path, PathBuf};

use keg_pm::EnvironmentProvisioner;

use crate::common::{load_config, load_formula, resolve_prefix};
use crate::output::Output;

#[derive(Args, Debug)]
pub struct UninstallArgs {
    /// Formula file (.rb, .toml or .json)
    #[arg(value_name = "FORMULA")]
    pub formula: PathBuf,

    /// Prefix to remove (defaults to <prefix-root>/<name>/<version>)
    #[arg(long)]
    pub prefix: Option<PathBuf>,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub force: bool,
}

pub fn execute(args: UninstallArgs, output: &Output) -> Result<u8> {
    let formula = load_formula(&args.formula)?;
    let config = load_config()?;
    let prefix = resolve_prefix(&config, &formula, args.prefix.as_deref())?;

    if !prefix.exists() {
        output.warning(&format!("{} is not installed at {}", formula.name, prefix.display()));
        return Ok(0);
    }

    if !args.force {
        if !output.term().is_term() {
            bail!("Refusing to remove {} without --force", prefix.display());
        }
        let confirmed = Confirm::new()
            .with_prompt(format!("Remove {}?", prefix.display()))
            .default(false)
            .interact_on(output.term())
            .context("Failed to read confirmation")?;
        if !confirmed {
            output.info("Aborted");
            return Ok(0);
        }
    }

    EnvironmentProvisioner::destroy(&prefix)?;
    if args.prefix.is_none() {
        remove_empty_formula_dir(&config.prefix_root.join(&formula.name), &prefix);
    }

    output.success(&format!("Removed {}", prefix.display()));
    Ok(0)
}

/// Drop `<prefix-root>/<name>` once its last version is gone
fn remove_empty_formula_dir(formula_dir: &Path, prefix: &Path) {
    if prefix.parent() != Some(formula_dir) {
        return;
    }
    match std::fs::read_dir(formula_dir) {
        Ok(mut entries) => {
            if entries.next().is_none() {
                if let Err(e) = std::fs::remove_dir(formula_dir) {
                    log::warn!("Could not remove {}: {}", formula_dir.display(), e);
                }
            }
        }
        Err(e) => log::warn!("Could not read {}: {}", formula_dir.display(), e),
    }
}
