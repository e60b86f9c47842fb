mod accept;
mod checksum;
mod common;
mod config;
mod convert;
mod fetch;
mod info;
mod install;
mod output;
mod progress;
mod uninstall;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::process::ExitCode;

use common::{exit_code_for, StageFailure};
use output::{Output, Verbosity};

#[derive(Parser, Debug)]
#[command(name = "keg")]
#[command(about = "Install command-line tools from formula declarations", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_ansi: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch, verify, provision, install and test a formula
    Install(install::InstallArgs),

    /// Download and verify a formula's archive only
    Fetch(fetch::FetchArgs),

    /// Run the acceptance check against an installed formula
    Test(accept::TestArgs),

    /// Show a formula and its install status
    Info(info::InfoArgs),

    /// Re-render a formula as Ruby, TOML or JSON
    Convert(convert::ConvertArgs),

    /// Compute or verify a file digest
    Checksum(checksum::ChecksumArgs),

    /// Remove an installed formula
    Uninstall(uninstall::UninstallArgs),

    /// Show the effective configuration
    Config(config::ConfigArgs),

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_logging(verbosity: Verbosity) {
    // RUST_LOG takes precedence over -v/-q
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(verbosity.log_filter()))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn run(cli: Cli, output: &mut Output) -> Result<u8> {
    match cli.command {
        Commands::Install(args) => {
            let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
            rt.block_on(install::execute(args, output))
        }
        Commands::Fetch(args) => {
            let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
            rt.block_on(fetch::execute(args, output))
        }
        Commands::Test(args) => {
            let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
            rt.block_on(accept::execute(args, output))
        }
        Commands::Info(args) => info::execute(args, output),
        Commands::Convert(args) => convert::execute(args, output),
        Commands::Checksum(args) => checksum::execute(args, output),
        Commands::Uninstall(args) => uninstall::execute(args, output),
        Commands::Config(args) => config::execute(args, output),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "keg", &mut std::io::stdout());
            Ok(0)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_ansi {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let verbosity = Verbosity::from_flags(cli.verbose, cli.quiet);
    init_logging(verbosity);
    let mut output = Output::new(verbosity);

    match run(cli, &mut output) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            if let Some(failure) = e.downcast_ref::<StageFailure>() {
                output.stage_failure(failure.stage, failure.kind, &failure.message);
            } else {
                eprintln!("Error: {}", e);
                for cause in e.chain().skip(1) {
                    eprintln!("  Caused by: {}", cause);
                }
            }
            ExitCode::from(exit_code_for(&e))
        }
    }
}
