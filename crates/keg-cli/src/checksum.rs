//! Checksum command - compute or verify a file digest.

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use std::path::PathBuf;

use keg_pm::downloader::{compute_checksum, verify_checksum};
use keg_pm::ChecksumType;

use crate::output::Output;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AlgorithmArg {
    Md5,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl From<AlgorithmArg> for ChecksumType {
    fn from(algorithm: AlgorithmArg) -> Self {
        match algorithm {
            AlgorithmArg::Md5 => ChecksumType::Md5,
            AlgorithmArg::Sha1 => ChecksumType::Sha1,
            AlgorithmArg::Sha256 => ChecksumType::Sha256,
            AlgorithmArg::Sha384 => ChecksumType::Sha384,
            AlgorithmArg::Sha512 => ChecksumType::Sha512,
        }
    }
}

#[derive(Args, Debug)]
pub struct ChecksumArgs {
    /// File to hash
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Verify against this digest; the algorithm follows from its length
    #[arg(long, value_name = "DIGEST", conflicts_with = "algorithm")]
    pub expect: Option<String>,

    /// Digest algorithm to compute
    #[arg(short, long, value_enum, default_value = "sha256")]
    pub algorithm: AlgorithmArg,
}

pub fn execute(args: ChecksumArgs, output: &Output) -> Result<u8> {
    let bytes = std::fs::read(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    match &args.expect {
        Some(expected) => {
            let algorithm = verify_checksum(&bytes, expected)?;
            output.success(&format!(
                "{} matches ({})",
                args.file.display(),
                algorithm.name()
            ));
        }
        None => {
            let digest = compute_checksum(&bytes, args.algorithm.into());
            println!("{}  {}", digest, args.file.display());
        }
    }

    Ok(0)
}
