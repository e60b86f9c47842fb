//! Convert command - re-render a formula in another declaration format.

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use std::path::PathBuf;

use keg_pm::{FormulaFormat, FormulaLoader};

use crate::common::load_formula;
use crate::output::Output;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Ruby,
    Toml,
    Json,
}

impl From<FormatArg> for FormulaFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Ruby => FormulaFormat::Ruby,
            FormatArg::Toml => FormulaFormat::Toml,
            FormatArg::Json => FormulaFormat::Json,
        }
    }
}

#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Formula file (.rb, .toml or .json)
    #[arg(value_name = "FORMULA")]
    pub formula: PathBuf,

    /// Target format
    #[arg(long, value_enum)]
    pub to: FormatArg,

    /// Write to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn execute(args: ConvertArgs, output: &Output) -> Result<u8> {
    let formula = load_formula(&args.formula)?;
    let rendered = FormulaLoader::render(&formula, args.to.into())
        .with_context(|| format!("Failed to render {}", args.formula.display()))?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, &rendered)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            output.success(&format!("Wrote {}", path.display()));
        }
        None => print!("{}", rendered),
    }

    Ok(0)
}
