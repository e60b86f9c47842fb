//! Archive extraction (zip, tar, tar.gz, tar.bz2, tar.xz) from in-memory bytes.

use flate2::read::GzDecoder;
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};

use crate::error::InstallErrorKind;
use crate::{KegError, Result};

/// Supported archive types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveType {
    Zip,
    Tar,
    TarGz,
    TarBz2,
    TarXz,
}

impl ArchiveType {
    /// Detect archive type from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let path_str = path.to_string_lossy().to_lowercase();

        if path_str.ends_with(".zip") || path_str.ends_with(".whl") {
            Some(ArchiveType::Zip)
        } else if path_str.ends_with(".tar.gz") || path_str.ends_with(".tgz") {
            Some(ArchiveType::TarGz)
        } else if path_str.ends_with(".tar.bz2") || path_str.ends_with(".tbz2") {
            Some(ArchiveType::TarBz2)
        } else if path_str.ends_with(".tar.xz") || path_str.ends_with(".txz") {
            Some(ArchiveType::TarXz)
        } else if path_str.ends_with(".tar") {
            Some(ArchiveType::Tar)
        } else {
            None
        }
    }

    /// Detect archive type from leading magic bytes
    pub fn from_magic(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0x1f, 0x8b]) {
            Some(ArchiveType::TarGz)
        } else if bytes.starts_with(b"BZh") {
            Some(ArchiveType::TarBz2)
        } else if bytes.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]) {
            Some(ArchiveType::TarXz)
        } else if bytes.starts_with(b"PK\x03\x04") {
            Some(ArchiveType::Zip)
        } else if bytes.len() > 262 && &bytes[257..262] == b"ustar" {
            Some(ArchiveType::Tar)
        } else {
            None
        }
    }

    /// Detect from the URL's file name first, then from content
    pub fn detect(url: &str, bytes: &[u8]) -> Option<Self> {
        let path_part = url.split(['?', '#']).next().unwrap_or(url);
        Self::from_path(Path::new(path_part)).or_else(|| Self::from_magic(bytes))
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveType::Zip => "zip",
            ArchiveType::Tar => "tar",
            ArchiveType::TarGz => "tar.gz",
            ArchiveType::TarBz2 => "tar.bz2",
            ArchiveType::TarXz => "tar.xz",
        }
    }
}

fn corrupt(message: String) -> KegError {
    KegError::install(InstallErrorKind::CorruptArchive, message)
}

fn disk_write(path: &Path, e: std::io::Error) -> KegError {
    KegError::install(
        InstallErrorKind::DiskWrite,
        format!("Failed to write {}: {}", path.display(), e),
    )
}

/// Archive extractor
pub struct ArchiveExtractor;

impl ArchiveExtractor {
    /// Extract `bytes` into `dest_dir`, stripping a single shared top-level directory
    pub fn extract(bytes: &[u8], archive_type: ArchiveType, dest_dir: &Path) -> Result<usize> {
        std::fs::create_dir_all(dest_dir).map_err(|e| disk_write(dest_dir, e))?;

        let names = Self::entry_names(bytes, archive_type)?;
        let strip = usize::from(common_top_level_dir(&names).is_some());

        log::debug!(
            "Extracting {} {} entries into {} (strip {})",
            names.len(),
            archive_type.extension(),
            dest_dir.display(),
            strip
        );

        match archive_type {
            ArchiveType::Zip => Self::extract_zip(bytes, dest_dir, strip),
            ArchiveType::Tar => Self::extract_tar(Cursor::new(bytes), dest_dir, strip),
            ArchiveType::TarGz => Self::extract_tar(GzDecoder::new(Cursor::new(bytes)), dest_dir, strip),
            ArchiveType::TarBz2 => {
                Self::extract_tar(bzip2::read::BzDecoder::new(Cursor::new(bytes)), dest_dir, strip)
            }
            ArchiveType::TarXz => {
                Self::extract_tar(xz2::read::XzDecoder::new(Cursor::new(bytes)), dest_dir, strip)
            }
        }
    }

    /// List entry paths without extracting
    pub fn entry_names(bytes: &[u8], archive_type: ArchiveType) -> Result<Vec<PathBuf>> {
        match archive_type {
            ArchiveType::Zip => {
                let archive = zip::ZipArchive::new(Cursor::new(bytes))
                    .map_err(|e| corrupt(format!("Failed to open zip: {}", e)))?;
                Ok(archive.file_names().map(PathBuf::from).collect())
            }
            ArchiveType::Tar => Self::tar_names(Cursor::new(bytes)),
            ArchiveType::TarGz => Self::tar_names(GzDecoder::new(Cursor::new(bytes))),
            ArchiveType::TarBz2 => Self::tar_names(bzip2::read::BzDecoder::new(Cursor::new(bytes))),
            ArchiveType::TarXz => Self::tar_names(xz2::read::XzDecoder::new(Cursor::new(bytes))),
        }
    }

    fn tar_names<R: Read>(reader: R) -> Result<Vec<PathBuf>> {
        let mut archive = tar::Archive::new(reader);
        let mut names = Vec::new();
        for entry in archive
            .entries()
            .map_err(|e| corrupt(format!("Failed to read tar: {}", e)))?
        {
            let entry = entry.map_err(|e| corrupt(format!("Failed to read tar entry: {}", e)))?;
            let path = entry
                .path()
                .map_err(|e| corrupt(format!("Invalid path in tar: {}", e)))?;
            names.push(path.into_owned());
        }
        Ok(names)
    }

    fn extract_zip(bytes: &[u8], dest_dir: &Path, strip: usize) -> Result<usize> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| corrupt(format!("Failed to open zip: {}", e)))?;
        let mut extracted = 0;

        for i in 0..archive.len() {
            let mut file = archive
                .by_index(i)
                .map_err(|e| corrupt(format!("Failed to read zip entry: {}", e)))?;

            let Some(relative) = safe_relative_path(Path::new(file.name()), strip)? else {
                continue;
            };
            ensure_no_symlink_on_path(dest_dir, &relative)?;
            let outpath = dest_dir.join(&relative);

            if file.is_dir() {
                std::fs::create_dir_all(&outpath).map_err(|e| disk_write(&outpath, e))?;
                continue;
            }

            if let Some(parent) = outpath.parent() {
                std::fs::create_dir_all(parent).map_err(|e| disk_write(parent, e))?;
            }
            let mut outfile = std::fs::File::create(&outpath).map_err(|e| disk_write(&outpath, e))?;
            std::io::copy(&mut file, &mut outfile)
                .map_err(|e| corrupt(format!("Failed to extract {}: {}", relative.display(), e)))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = file.unix_mode() {
                    std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode))
                        .map_err(|e| disk_write(&outpath, e))?;
                }
            }
            extracted += 1;
        }

        Ok(extracted)
    }

    fn extract_tar<R: Read>(reader: R, dest_dir: &Path, strip: usize) -> Result<usize> {
        let mut archive = tar::Archive::new(reader);
        archive.set_preserve_permissions(true);
        let mut extracted = 0;

        for entry in archive
            .entries()
            .map_err(|e| corrupt(format!("Failed to read tar: {}", e)))?
        {
            let mut entry = entry.map_err(|e| corrupt(format!("Failed to read tar entry: {}", e)))?;
            let path = entry
                .path()
                .map_err(|e| corrupt(format!("Invalid path in tar: {}", e)))?
                .into_owned();

            let Some(relative) = safe_relative_path(&path, strip)? else {
                continue;
            };
            ensure_no_symlink_on_path(dest_dir, &relative)?;
            let outpath = dest_dir.join(&relative);
            let entry_type = entry.header().entry_type();

            if entry_type.is_dir() {
                std::fs::create_dir_all(&outpath).map_err(|e| disk_write(&outpath, e))?;
                continue;
            }

            if let Some(parent) = outpath.parent() {
                std::fs::create_dir_all(parent).map_err(|e| disk_write(parent, e))?;
            }

            if entry_type.is_symlink() || entry_type.is_hard_link() {
                let target = entry
                    .link_name()
                    .map_err(|e| corrupt(format!("Invalid link in tar: {}", e)))?
                    .ok_or_else(|| corrupt(format!("Link {} has no target", path.display())))?
                    .into_owned();

                if entry_type.is_hard_link() {
                    Self::copy_hard_link(dest_dir, &target, strip, &outpath)?;
                    extracted += 1;
                    continue;
                }
                if !symlink_stays_inside(&relative, &target) {
                    return Err(corrupt(format!(
                        "Symlink {} points outside the archive: {}",
                        path.display(),
                        target.display()
                    )));
                }
            }

            entry
                .unpack(&outpath)
                .map_err(|e| corrupt(format!("Failed to extract {}: {}", relative.display(), e)))?;
            extracted += 1;
        }

        Ok(extracted)
    }

    /// Hard links name an earlier entry by its archive path; materialise them as copies
    fn copy_hard_link(dest_dir: &Path, target: &Path, strip: usize, outpath: &Path) -> Result<()> {
        let source = safe_relative_path(target, strip)?
            .ok_or_else(|| corrupt(format!("Hard link to {} has no target", target.display())))?;
        ensure_no_symlink_on_path(dest_dir, &source)?;

        let source = dest_dir.join(source);
        std::fs::copy(&source, outpath)
            .map_err(|e| corrupt(format!("Failed to link {}: {}", source.display(), e)))?;
        Ok(())
    }
}

/// Refuse entries whose location inside `dest_dir` already is, or goes through, a symlink
fn ensure_no_symlink_on_path(dest_dir: &Path, relative: &Path) -> Result<()> {
    let mut current = dest_dir.to_path_buf();
    for component in relative.components() {
        current.push(component);
        match std::fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(corrupt(format!(
                    "Archive entry {} goes through a symlink",
                    relative.display()
                )));
            }
            Ok(_) => {}
            Err(_) => break,
        }
    }
    Ok(())
}

/// Whether a symlink at `relative` pointing to `target` resolves inside the extraction root
fn symlink_stays_inside(relative: &Path, target: &Path) -> bool {
    let mut depth = relative.parent().map(|p| p.components().count()).unwrap_or(0);

    for component in target.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir if depth > 0 => depth -= 1,
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

/// Strip `strip` leading components and reject anything that could escape the destination.
///
/// Returns `None` for entries that vanish after stripping (the top-level directory itself).
fn safe_relative_path(path: &Path, strip: usize) -> Result<Option<PathBuf>> {
    let mut relative = PathBuf::new();

    for (index, component) in path.components().enumerate() {
        match component {
            Component::Normal(part) => {
                if index >= strip {
                    relative.push(part);
                }
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(corrupt(format!(
                    "Path traversal detected in archive: {}",
                    path.display()
                )));
            }
        }
    }

    if relative.as_os_str().is_empty() {
        Ok(None)
    } else {
        Ok(Some(relative))
    }
}

/// The single directory every entry lives under, if there is one
fn common_top_level_dir(names: &[PathBuf]) -> Option<PathBuf> {
    let mut prefix: Option<&std::ffi::OsStr> = None;
    let mut has_nested = false;

    for name in names {
        let mut components = name.components().filter(|c| !matches!(c, Component::CurDir));
        let Some(Component::Normal(first)) = components.next() else {
            return None;
        };

        match prefix {
            None => prefix = Some(first),
            Some(existing) if existing == first => {}
            Some(_) => return None,
        }

        // Single-component entries can only be the shared directory itself
        has_nested |= components.next().is_some();
    }

    if has_nested {
        prefix.map(PathBuf::from)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::TempDir;

    fn tar_gz(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (path, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_archive_type_from_path() {
        assert_eq!(ArchiveType::from_path(Path::new("package.zip")), Some(ArchiveType::Zip));
        assert_eq!(ArchiveType::from_path(Path::new("package.tar.gz")), Some(ArchiveType::TarGz));
        assert_eq!(ArchiveType::from_path(Path::new("package.tgz")), Some(ArchiveType::TarGz));
        assert_eq!(ArchiveType::from_path(Path::new("package.tar.bz2")), Some(ArchiveType::TarBz2));
        assert_eq!(ArchiveType::from_path(Path::new("package.tar.xz")), Some(ArchiveType::TarXz));
        assert_eq!(ArchiveType::from_path(Path::new("package.tar")), Some(ArchiveType::Tar));
        assert_eq!(ArchiveType::from_path(Path::new("package.txt")), None);
    }

    #[test]
    fn test_archive_type_from_magic() {
        assert_eq!(ArchiveType::from_magic(&[0x1f, 0x8b, 0x08]), Some(ArchiveType::TarGz));
        assert_eq!(ArchiveType::from_magic(b"BZh91AY"), Some(ArchiveType::TarBz2));
        assert_eq!(ArchiveType::from_magic(b"PK\x03\x04rest"), Some(ArchiveType::Zip));
        assert_eq!(ArchiveType::from_magic(b"#!/bin/sh\n"), None);
    }

    #[test]
    fn test_detect_ignores_query_string() {
        let bytes = b"irrelevant";
        assert_eq!(
            ArchiveType::detect("https://example.com/tool-1.0.tar.gz?download=1", bytes),
            Some(ArchiveType::TarGz)
        );
        assert_eq!(ArchiveType::detect("https://example.com/download", bytes), None);
    }

    #[test]
    fn test_extract_tar_gz_strips_top_level_dir() {
        let bytes = tar_gz(&[
            ("tool-1.0/bin/tool", b"#!/bin/sh\necho tool\n"),
            ("tool-1.0/README", b"readme"),
        ]);
        let temp = TempDir::new().unwrap();

        let count = ArchiveExtractor::extract(&bytes, ArchiveType::TarGz, temp.path()).unwrap();

        assert_eq!(count, 2);
        assert!(temp.path().join("bin/tool").is_file());
        assert!(temp.path().join("README").is_file());
        assert!(!temp.path().join("tool-1.0").exists());
    }

    #[test]
    fn test_extract_flat_archive_keeps_paths() {
        let bytes = tar_gz(&[("setup.py", b"print()"), ("pkg/__init__.py", b"")]);
        let temp = TempDir::new().unwrap();

        ArchiveExtractor::extract(&bytes, ArchiveType::TarGz, temp.path()).unwrap();

        assert!(temp.path().join("setup.py").is_file());
        assert!(temp.path().join("pkg/__init__.py").is_file());
    }

    #[test]
    fn test_extract_corrupt_gzip() {
        let temp = TempDir::new().unwrap();
        let err = ArchiveExtractor::extract(&[0x1f, 0x8b, 0, 1, 2, 3], ArchiveType::TarGz, temp.path())
            .unwrap_err();
        assert_eq!(
            err.kind(),
            crate::ErrorKind::Install(InstallErrorKind::CorruptArchive)
        );
    }

    #[test]
    fn test_safe_relative_path_rejects_traversal() {
        assert!(safe_relative_path(Path::new("pkg/../../etc/passwd"), 0).is_err());
        assert!(safe_relative_path(Path::new("/etc/passwd"), 0).is_err());
        assert_eq!(
            safe_relative_path(Path::new("pkg/bin/tool"), 1).unwrap(),
            Some(PathBuf::from("bin/tool"))
        );
        assert_eq!(safe_relative_path(Path::new("pkg/"), 1).unwrap(), None);
    }

    #[test]
    fn test_symlink_stays_inside() {
        assert!(symlink_stays_inside(Path::new("bin/tool"), Path::new("../lib/tool")));
        assert!(symlink_stays_inside(Path::new("tool"), Path::new("real")));
        assert!(!symlink_stays_inside(Path::new("tool"), Path::new("../outside")));
        assert!(!symlink_stays_inside(Path::new("bin/tool"), Path::new("../../outside")));
        assert!(!symlink_stays_inside(Path::new("tool"), Path::new("/etc/passwd")));
    }

    #[cfg(unix)]
    fn tar_with_symlink(link: &str, target: &str, after: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());

        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_size(0);
        header.set_mode(0o777);
        header.set_link_name(target).unwrap();
        header.set_cksum();
        builder.append_data(&mut header, link, std::io::empty()).unwrap();

        for (path, data) in after {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[cfg(unix)]
    #[test]
    fn test_extract_refuses_write_through_escaping_symlink() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("src");
        let outside = temp.path().join("outside");
        std::fs::create_dir_all(&outside).unwrap();

        let bytes = tar_with_symlink(
            "pkg/evil",
            outside.to_str().unwrap(),
            &[("pkg/evil/pwned", b"gotcha")],
        );
        let err = ArchiveExtractor::extract(&bytes, ArchiveType::Tar, &dest).unwrap_err();

        assert_eq!(err.kind(), crate::ErrorKind::Install(InstallErrorKind::CorruptArchive));
        assert!(!outside.join("pwned").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_extract_refuses_relative_escaping_symlink() {
        let temp = TempDir::new().unwrap();
        let bytes = tar_with_symlink("pkg/up", "../../..", &[("pkg/README", b"readme")]);

        let err = ArchiveExtractor::extract(&bytes, ArchiveType::Tar, temp.path()).unwrap_err();
        assert!(err.to_string().contains("points outside"));
    }

    #[cfg(unix)]
    #[test]
    fn test_extract_refuses_entry_below_inner_symlink() {
        let temp = TempDir::new().unwrap();
        let bytes = tar_with_symlink(
            "pkg/link",
            "sub",
            &[("pkg/sub/keep", b"ok"), ("pkg/link/file", b"through")],
        );

        let err = ArchiveExtractor::extract(&bytes, ArchiveType::Tar, temp.path()).unwrap_err();
        assert!(err.to_string().contains("goes through a symlink"));
    }

    #[cfg(unix)]
    #[test]
    fn test_extract_keeps_inner_symlink() {
        let temp = TempDir::new().unwrap();
        let bytes = tar_with_symlink("pkg/bin/tool", "../real", &[("pkg/real", b"#!/bin/sh\n")]);

        let count = ArchiveExtractor::extract(&bytes, ArchiveType::Tar, temp.path()).unwrap();

        assert_eq!(count, 2);
        let link = temp.path().join("bin/tool");
        assert!(std::fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(std::fs::read(&link).unwrap(), b"#!/bin/sh\n");
    }

    #[test]
    fn test_common_top_level_dir() {
        let names = vec![PathBuf::from("a-1.0/"), PathBuf::from("a-1.0/x"), PathBuf::from("a-1.0/y/z")];
        assert_eq!(common_top_level_dir(&names), Some(PathBuf::from("a-1.0")));

        let names = vec![PathBuf::from("a/x"), PathBuf::from("b/y")];
        assert_eq!(common_top_level_dir(&names), None);

        let names = vec![PathBuf::from("only-file")];
        assert_eq!(common_top_level_dir(&names), None);
    }
}
