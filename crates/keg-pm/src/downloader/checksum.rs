//! Digest computation and verification for fetched archives.

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::{KegError, Result};

/// Supported checksum types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumType {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
    Md5,
}

impl ChecksumType {
    /// Detect checksum type from length of hex string
    pub fn from_hex_length(len: usize) -> Option<Self> {
        match len {
            32 => Some(ChecksumType::Md5),
            40 => Some(ChecksumType::Sha1),
            64 => Some(ChecksumType::Sha256),
            96 => Some(ChecksumType::Sha384),
            128 => Some(ChecksumType::Sha512),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChecksumType::Sha1 => "sha1",
            ChecksumType::Sha256 => "sha256",
            ChecksumType::Sha384 => "sha384",
            ChecksumType::Sha512 => "sha512",
            ChecksumType::Md5 => "md5",
        }
    }

    pub fn hex_length(&self) -> usize {
        match self {
            ChecksumType::Md5 => 32,
            ChecksumType::Sha1 => 40,
            ChecksumType::Sha256 => 64,
            ChecksumType::Sha384 => 96,
            ChecksumType::Sha512 => 128,
        }
    }
}

impl std::str::FromStr for ChecksumType {
    type Err = KegError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sha1" => Ok(ChecksumType::Sha1),
            "sha256" => Ok(ChecksumType::Sha256),
            "sha384" => Ok(ChecksumType::Sha384),
            "sha512" => Ok(ChecksumType::Sha512),
            "md5" => Ok(ChecksumType::Md5),
            other => Err(KegError::MalformedDigest {
                digest: other.to_string(),
                reason: "unknown checksum algorithm".to_string(),
            }),
        }
    }
}

/// Compute the lowercase hex digest of `bytes`
pub fn compute_checksum(bytes: &[u8], checksum_type: ChecksumType) -> String {
    match checksum_type {
        ChecksumType::Sha1 => format!("{:x}", Sha1::digest(bytes)),
        ChecksumType::Sha256 => format!("{:x}", Sha256::digest(bytes)),
        ChecksumType::Sha384 => format!("{:x}", Sha384::digest(bytes)),
        ChecksumType::Sha512 => format!("{:x}", Sha512::digest(bytes)),
        ChecksumType::Md5 => format!("{:x}", Md5::digest(bytes)),
    }
}

pub fn compute_sha256(bytes: &[u8]) -> String {
    compute_checksum(bytes, ChecksumType::Sha256)
}

/// Check that `expected` is a hex string of the length `checksum_type` produces
fn ensure_well_formed(expected: &str, checksum_type: ChecksumType) -> Result<()> {
    if expected.len() != checksum_type.hex_length() {
        return Err(KegError::MalformedDigest {
            digest: expected.to_string(),
            reason: format!(
                "{} digests are {} hex characters, got {}",
                checksum_type.name(),
                checksum_type.hex_length(),
                expected.len()
            ),
        });
    }
    if !expected.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(KegError::MalformedDigest {
            digest: expected.to_string(),
            reason: "digest contains non-hexadecimal characters".to_string(),
        });
    }
    Ok(())
}

/// Verify `bytes` against `expected`, detecting the algorithm from its length.
///
/// Fails closed: a malformed or mismatching digest is an error.
pub fn verify_checksum(bytes: &[u8], expected: &str) -> Result<ChecksumType> {
    let checksum_type = ChecksumType::from_hex_length(expected.len()).ok_or_else(|| {
        KegError::MalformedDigest {
            digest: expected.to_string(),
            reason: format!("no known digest is {} hex characters long", expected.len()),
        }
    })?;
    ensure_well_formed(expected, checksum_type)?;

    let actual = compute_checksum(bytes, checksum_type);
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(KegError::Integrity {
            expected: expected.to_lowercase(),
            actual,
        });
    }

    Ok(checksum_type)
}

/// Verify `bytes` against an expected SHA-256 digest
pub fn verify_sha256(bytes: &[u8], expected: &str) -> Result<()> {
    ensure_well_formed(expected, ChecksumType::Sha256)?;

    let actual = compute_sha256(bytes);
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(KegError::Integrity {
            expected: expected.to_lowercase(),
            actual,
        });
    }

    log::debug!("sha256 verified: {}", actual);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // SHA-256 of "hello world"
    const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_checksum_type_from_hex_length() {
        assert_eq!(ChecksumType::from_hex_length(32), Some(ChecksumType::Md5));
        assert_eq!(ChecksumType::from_hex_length(40), Some(ChecksumType::Sha1));
        assert_eq!(ChecksumType::from_hex_length(64), Some(ChecksumType::Sha256));
        assert_eq!(ChecksumType::from_hex_length(96), Some(ChecksumType::Sha384));
        assert_eq!(ChecksumType::from_hex_length(128), Some(ChecksumType::Sha512));
        assert_eq!(ChecksumType::from_hex_length(65), None);
    }

    #[test]
    fn test_compute_sha256() {
        assert_eq!(compute_sha256(b"hello world"), HELLO_SHA256);
    }

    #[test]
    fn test_verify_sha256() {
        assert!(verify_sha256(b"hello world", HELLO_SHA256).is_ok());
        assert!(verify_sha256(b"hello world", &HELLO_SHA256.to_uppercase()).is_ok());
    }

    #[test]
    fn test_verify_sha256_mismatch() {
        let wrong = "0000000000000000000000000000000000000000000000000000000000000000";
        match verify_sha256(b"hello world", wrong) {
            Err(KegError::Integrity { expected, actual }) => {
                assert_eq!(expected, wrong);
                assert_eq!(actual, HELLO_SHA256);
            }
            other => panic!("expected integrity error, got {:?}", other),
        }
    }

    #[test]
    fn test_verify_rejects_every_single_character_flip() {
        for i in 0..HELLO_SHA256.len() {
            let mut tampered: Vec<char> = HELLO_SHA256.chars().collect();
            tampered[i] = if tampered[i] == '0' { '1' } else { '0' };
            let tampered: String = tampered.into_iter().collect();
            let err = verify_sha256(b"hello world", &tampered).unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::Integrity);
        }
    }

    #[test]
    fn test_verify_sha256_rejects_malformed_digest() {
        let too_long = format!("{}0", HELLO_SHA256);
        assert!(matches!(
            verify_sha256(b"hello world", &too_long),
            Err(KegError::MalformedDigest { .. })
        ));

        let not_hex = "z".repeat(64);
        assert!(matches!(
            verify_sha256(b"hello world", &not_hex),
            Err(KegError::MalformedDigest { .. })
        ));
    }

    #[test]
    fn test_verify_checksum_detects_algorithm() {
        let md5 = "5eb63bbbe01eeed093cb22bb8f5acdc3";
        assert_eq!(verify_checksum(b"hello world", md5).unwrap(), ChecksumType::Md5);

        let sha1 = "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed";
        assert_eq!(verify_checksum(b"hello world", sha1).unwrap(), ChecksumType::Sha1);

        assert_eq!(verify_checksum(b"hello world", HELLO_SHA256).unwrap(), ChecksumType::Sha256);
        assert!(verify_checksum(b"hello world", "abc").is_err());
    }

    #[test]
    fn test_checksum_type_from_str() {
        assert_eq!("SHA256".parse::<ChecksumType>().unwrap(), ChecksumType::Sha256);
        assert!("crc32".parse::<ChecksumType>().is_err());
    }
}
