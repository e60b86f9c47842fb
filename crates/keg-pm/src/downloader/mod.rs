//! Archive retrieval, integrity checking and extraction.
//!
//! Fetchers only produce bytes. Nothing touches the filesystem until the
//! digest has been verified and an environment has been provisioned.

mod archive;
mod checksum;
mod fetcher;

pub use archive::{ArchiveExtractor, ArchiveType};
pub use checksum::{compute_checksum, compute_sha256, verify_checksum, verify_sha256, ChecksumType};
pub use fetcher::{ArchiveFetcher, FileFetcher, HttpFetcher, ProgressCallback, SourceFetcher};
