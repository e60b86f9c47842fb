//! Config command - show the effective configuration and where it came from.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use keg_pm::Config;

use crate::common::load_config;
use crate::output::Output;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct ConfigReport<'a> {
    config: &'a Config,
    sources: Vec<String>,
}

pub fn execute(args: ConfigArgs, output: &mut Output) -> Result<u8> {
    output.set_json_mode(args.json);
    let config = load_config()?;
    let sources: Vec<String> = config.sources().iter().map(|s| s.describe()).collect();

    if output.is_json() {
        output.json(&ConfigReport {
            config: &config,
            sources,
        });
        return Ok(0);
    }

    let rendered = toml::to_string_pretty(&config).context("Failed to render configuration")?;
    print!("{}", rendered);

    output.writeln("");
    output.writeln("Loaded from:");
    for source in &sources {
        output.list_item("-", source);
    }

    Ok(0)
}
