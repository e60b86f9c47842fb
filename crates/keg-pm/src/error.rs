use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::http::HttpError;
use crate::pipeline::InstallState;

/// Distinct reasons a package installation can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallErrorKind {
    UnsupportedArchive,
    CorruptArchive,
    DependencyUnavailable,
    DiskWrite,
    CommandFailed,
    NoEntryPoint,
}

impl InstallErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallErrorKind::UnsupportedArchive => "unsupported archive",
            InstallErrorKind::CorruptArchive => "corrupt archive",
            InstallErrorKind::DependencyUnavailable => "dependency unavailable",
            InstallErrorKind::DiskWrite => "disk write failure",
            InstallErrorKind::CommandFailed => "install command failed",
            InstallErrorKind::NoEntryPoint => "no entry point",
        }
    }
}

impl fmt::Display for InstallErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum KegError {
    // Fetch errors
    #[error("Network error fetching {url}: {reason}")]
    Network { url: String, reason: String },

    // Digest errors
    #[error("Integrity check failed: expected {expected}, got {actual}")]
    Integrity { expected: String, actual: String },

    #[error("Malformed digest '{digest}': {reason}")]
    MalformedDigest { digest: String, reason: String },

    // Environment errors
    #[error("Environment error at {path}: {reason}")]
    Environment { path: String, reason: String },

    // Installation errors
    #[error("Installation failed ({kind}): {message}")]
    Install {
        kind: InstallErrorKind,
        message: String,
    },

    // Acceptance errors
    #[error("Acceptance check failed: {0}")]
    Acceptance(String),

    // Formula errors
    #[error("Invalid formula: {message}")]
    InvalidFormula { message: String },

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Illegal state transition: {from} -> {to}")]
    InvalidTransition { from: InstallState, to: InstallState },
}

impl KegError {
    pub fn install(kind: InstallErrorKind, message: impl Into<String>) -> Self {
        KegError::Install {
            kind,
            message: message.into(),
        }
    }

    pub fn environment(path: &std::path::Path, reason: impl Into<String>) -> Self {
        KegError::Environment {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_formula(message: impl Into<String>) -> Self {
        KegError::InvalidFormula {
            message: message.into(),
        }
    }

    /// Classify this error for reporting and exit codes.
    pub fn kind(&self) -> ErrorKind {
        match self {
            KegError::Network { .. } => ErrorKind::Network,
            KegError::Integrity { .. } | KegError::MalformedDigest { .. } => ErrorKind::Integrity,
            KegError::Environment { .. } => ErrorKind::Environment,
            KegError::Install { kind, .. } => ErrorKind::Install(*kind),
            KegError::Acceptance(_) => ErrorKind::Acceptance,
            KegError::InvalidFormula { .. } => ErrorKind::Formula,
            KegError::Config(_) => ErrorKind::Config,
            KegError::Io(_) => ErrorKind::Install(InstallErrorKind::DiskWrite),
            KegError::InvalidTransition { .. } => ErrorKind::Internal,
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.kind().exit_code()
    }
}

impl From<HttpError> for KegError {
    fn from(e: HttpError) -> Self {
        let url = match &e {
            HttpError::HttpStatus { url, .. }
            | HttpError::TooLarge { url, .. }
            | HttpError::MaxRetries { url } => url.clone(),
            HttpError::Request(err) => err.url().map(|u| u.to_string()).unwrap_or_default(),
            _ => String::new(),
        };
        KegError::Network {
            url,
            reason: e.to_string(),
        }
    }
}

/// Copyable classification of a [`KegError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind", content = "subkind")]
pub enum ErrorKind {
    Network,
    Integrity,
    Environment,
    Install(InstallErrorKind),
    Acceptance,
    Formula,
    Config,
    Internal,
}

impl ErrorKind {
    /// Process exit code: 1 network/integrity, 2 environment/install, 3 acceptance.
    pub fn exit_code(&self) -> u8 {
        match self {
            ErrorKind::Network | ErrorKind::Integrity => 1,
            ErrorKind::Environment
            | ErrorKind::Install(_)
            | ErrorKind::Formula
            | ErrorKind::Config
            | ErrorKind::Internal => 2,
            ErrorKind::Acceptance => 3,
        }
    }

    pub fn name(&self) -> String {
        match self {
            ErrorKind::Network => "NetworkError".to_string(),
            ErrorKind::Integrity => "IntegrityError".to_string(),
            ErrorKind::Environment => "EnvironmentError".to_string(),
            ErrorKind::Install(kind) => format!("InstallError({})", kind),
            ErrorKind::Acceptance => "AcceptanceError".to_string(),
            ErrorKind::Formula => "FormulaError".to_string(),
            ErrorKind::Config => "ConfigError".to_string(),
            ErrorKind::Internal => "InternalError".to_string(),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

pub type Result<T> = std::result::Result<T, KegError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let network = KegError::Network {
            url: "https://example.com/a.tar.gz".to_string(),
            reason: "connection refused".to_string(),
        };
        assert_eq!(network.exit_code(), 1);

        let integrity = KegError::Integrity {
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        };
        assert_eq!(integrity.exit_code(), 1);

        let env = KegError::environment(std::path::Path::new("/tmp/x"), "not a directory");
        assert_eq!(env.exit_code(), 2);

        let install = KegError::install(InstallErrorKind::DependencyUnavailable, "python3.12 not found");
        assert_eq!(install.exit_code(), 2);
        assert_eq!(install.kind(), ErrorKind::Install(InstallErrorKind::DependencyUnavailable));

        assert_eq!(KegError::Acceptance("missing output".to_string()).exit_code(), 3);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(ErrorKind::Integrity.to_string(), "IntegrityError");
        assert_eq!(
            ErrorKind::Install(InstallErrorKind::UnsupportedArchive).to_string(),
            "InstallError(unsupported archive)"
        );
    }

    #[test]
    fn test_error_kind_serializes_subkind() {
        let json = serde_json::to_string(&ErrorKind::Install(InstallErrorKind::NoEntryPoint)).unwrap();
        assert_eq!(json, r#"{"kind":"install","subkind":"no-entry-point"}"#);
        let json = serde_json::to_string(&ErrorKind::Network).unwrap();
        assert_eq!(json, r#"{"kind":"network"}"#);
    }
}
