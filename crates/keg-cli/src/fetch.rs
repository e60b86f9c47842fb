//! Fetch command - download and verify a formula's archive without installing.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

use keg_pm::downloader::{compute_sha256, verify_sha256, ArchiveFetcher, HttpFetcher, SourceFetcher};
use keg_pm::http::HttpClient;
use keg_pm::Stage;

use crate::common::{load_config, load_formula, StageFailure};
use crate::output::Output;
use crate::progress::{format_bytes, ProgressManager};

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Formula file (.rb, .toml or .json)
    #[arg(value_name = "FORMULA")]
    pub formula: PathBuf,

    /// Save the verified archive here
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Download retries (overrides max-retries)
    #[arg(long, value_name = "N")]
    pub retries: Option<u32>,
}

pub async fn execute(args: FetchArgs, output: &Output) -> Result<u8> {
    let formula = load_formula(&args.formula)?;
    let mut config = load_config()?;
    if let Some(retries) = args.retries {
        config.max_retries = retries;
    }

    let client = HttpClient::with_config(config.http_client_config())
        .context("Failed to create HTTP client")?;
    let fetcher = SourceFetcher::new(HttpFetcher::new(Arc::new(client)));

    let progress = ProgressManager::new(!output.is_quiet() && output.term().is_term());
    let spinner = progress.create_spinner(&format!("Fetching {}", formula.url));
    let fetched = fetcher.fetch(&formula.url).await;
    spinner.finish_and_clear();

    let bytes = fetched.map_err(|e| StageFailure::new(Stage::Fetch, e))?;
    verify_sha256(&bytes, &formula.sha256).map_err(|e| StageFailure::new(Stage::Verify, e))?;

    output.success(&format!(
        "{} verified ({})",
        formula.url,
        format_bytes(bytes.len() as u64)
    ));
    println!("{}  {}", compute_sha256(&bytes), formula.url);

    if let Some(path) = &args.output {
        std::fs::write(path, &bytes)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        output.verbose(&format!("Saved to {}", path.display()));
    }

    Ok(0)
}
