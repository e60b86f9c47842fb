pub mod acceptance;
pub mod config;
pub mod downloader;
pub mod environment;
pub mod error;
pub mod formula;
pub mod http;
pub mod installer;
pub mod pipeline;
pub mod process;

pub use error::{ErrorKind, InstallErrorKind, KegError, Result};
pub use acceptance::AcceptanceRunner;
pub use config::{Config, ConfigLoader, ConfigSource};
pub use downloader::{ArchiveFetcher, ArchiveType, ChecksumType, FileFetcher, HttpFetcher, SourceFetcher};
pub use environment::{EnvironmentHandle, EnvironmentProvisioner, InstallReceipt, ProvisionMode};
pub use formula::{Formula, FormulaFormat, FormulaLoader, FormulaTest};
pub use installer::{InstallOutcome, InstallStrategy, PackageInstaller, RuntimeResolver};
pub use pipeline::{InstallPipeline, InstallResult, InstallState, PipelineListener, Stage, StateTracker};
