//! Info command - show a formula and whether it is installed.

use anyhow::Result;
use clap::Args;
use console::style;
use serde::Serialize;
use std::path::PathBuf;

use keg_pm::{Formula, InstallReceipt, InstallStrategy};

use crate::common::{load_config, load_formula, resolve_prefix};
use crate::output::Output;

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Formula file (.rb, .toml or .json)
    #[arg(value_name = "FORMULA")]
    pub formula: PathBuf,

    /// Prefix to inspect (defaults to <prefix-root>/<name>/<version>)
    #[arg(long)]
    pub prefix: Option<PathBuf>,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct FormulaInfo<'a> {
    formula: &'a Formula,
    version: String,
    strategy: &'static str,
    prefix: PathBuf,
    installed: bool,
    receipt: Option<InstallReceipt>,
}

pub fn execute(args: InfoArgs, output: &mut Output) -> Result<u8> {
    output.set_json_mode(args.json);

    let formula = load_formula(&args.formula)?;
    let config = load_config()?;
    let prefix = resolve_prefix(&config, &formula, args.prefix.as_deref())?;
    let version = formula.version()?;
    let receipt = InstallReceipt::read(&prefix).unwrap_or_else(|e| {
        log::warn!("{}", e);
        None
    });

    let info = FormulaInfo {
        formula: &formula,
        version,
        strategy: InstallStrategy::parse(&formula.install).name(),
        prefix,
        installed: receipt.is_some(),
        receipt,
    };

    if output.is_json() {
        output.json(&info);
        return Ok(0);
    }

    output.writeln(&format!(
        "{} {}",
        style(&formula.name).green().bold(),
        style(&info.version).yellow()
    ));
    if let Some(desc) = &formula.desc {
        output.writeln(desc);
    }
    output.writeln("");
    if let Some(homepage) = &formula.homepage {
        output.field("homepage", homepage);
    }
    if let Some(license) = &formula.license {
        output.field("license", license);
    }
    output.field("url", &formula.url);
    output.field("sha256", &formula.sha256);
    output.field(
        "depends on",
        formula.runtime_dependency.as_deref().unwrap_or("nothing"),
    );
    output.field("install", info.strategy);
    output.field("test", &formula.test.command);
    output.field("prefix", &info.prefix.display().to_string());

    match &info.receipt {
        Some(receipt) => {
            output.field(
                "status",
                &format!(
                    "{} on {}",
                    style("installed").green(),
                    receipt.installed_at.format("%Y-%m-%d %H:%M UTC")
                ),
            );
            for entry_point in &receipt.entry_points {
                output.list_item("→", &entry_point.display().to_string());
            }
        }
        None => output.field("status", &style("not installed").dim().to_string()),
    }

    Ok(0)
}
