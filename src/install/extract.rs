//! Archive extraction into a staging directory
//!
//! Handles `.zip` and `.tar.gz` modpack artifacts. Every entry name is
//! normalised and checked before anything is written for it.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use log::debug;
use tokio_util::sync::CancellationToken;
use zip::ZipArchive;

use crate::error::{LauncherError, Result};

/// Archive container, detected from the file's magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    pub fn detect(path: &Path) -> Result<Self> {
        let mut magic = [0u8; 4];
        let mut file = File::open(path).map_err(|e| LauncherError::io("open_archive", path, e))?;
        let read = file
            .read(&mut magic)
            .map_err(|e| LauncherError::io("read_archive_header", path, e))?;

        match &magic[..read] {
            [b'P', b'K', 0x03, 0x04] | [b'P', b'K', 0x05, 0x06] => Ok(Self::Zip),
            [0x1f, 0x8b, ..] => Ok(Self::TarGz),
            _ => Err(LauncherError::archive(path, "unrecognised archive format")),
        }
    }
}

/// Normalise an archive entry name into a path relative to the extraction root.
///
/// Backslashes count as separators. Absolute paths, drive prefixes and `..`
/// segments are rejected; `.` segments are dropped. An empty result means the
/// entry names the root itself.
pub(crate) fn sanitize_entry_path(entry: &str) -> Result<PathBuf> {
    let normalized = entry.replace('\\', "/");
    let traversal = || LauncherError::PathTraversal {
        entry: entry.to_string(),
    };

    if normalized.starts_with('/') || has_drive_root(&normalized) {
        return Err(traversal());
    }

    let mut sanitized = PathBuf::new();
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(segment) => sanitized.push(segment),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(traversal());
            }
        }
    }
    Ok(sanitized)
}

/// `C:` or `C:/...`. Drive-relative names like `C:file` are left to
/// `Component::Prefix`, which only exists on Windows.
fn has_drive_root(normalized: &str) -> bool {
    match normalized.as_bytes() {
        [letter, b':'] | [letter, b':', b'/', ..] => letter.is_ascii_alphabetic(),
        _ => false,
    }
}

fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(LauncherError::Cancelled {
            operation: "extract",
        });
    }
    Ok(())
}

/// Copy one entry's bytes; read-side corruption is an archive error, write-side an IO error.
fn copy_entry(
    reader: &mut impl Read,
    destination: &Path,
    archive_path: &Path,
    entry: &str,
) -> Result<()> {
    let mut output = File::create(destination)
        .map_err(|e| LauncherError::io("create_entry_file", destination, e))?;
    io::copy(reader, &mut output).map_err(|e| match e.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
            LauncherError::archive(archive_path, format!("entry {entry:?}: {e}"))
        }
        _ => LauncherError::io("write_entry_file", destination, e),
    })?;
    Ok(())
}

fn create_parent(destination: &Path) -> Result<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|e| LauncherError::io("create_entry_parent", parent, e))?;
    }
    Ok(())
}

#[cfg(unix)]
fn apply_mode(destination: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = mode & 0o777;
    if mode == 0 {
        return Ok(());
    }
    fs::set_permissions(destination, fs::Permissions::from_mode(mode))
        .map_err(|e| LauncherError::io("set_entry_permissions", destination, e))
}

#[cfg(not(unix))]
fn apply_mode(_destination: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

const S_IFMT: u32 = 0o170_000;
const S_IFLNK: u32 = 0o120_000;

/// Extract a zip archive into `root`. Returns the number of files written.
pub(crate) fn extract_zip(archive_path: &Path, root: &Path, cancel: &CancellationToken) -> Result<usize> {
    let file = File::open(archive_path).map_err(|e| LauncherError::io("open_archive", archive_path, e))?;
    let mut archive = ZipArchive::new(file).map_err(|e| LauncherError::archive(archive_path, e))?;

    // Reject the whole archive before writing anything if any name is unsafe.
    for name in archive.file_names() {
        sanitize_entry_path(name)?;
    }

    let mut files = 0;
    for index in 0..archive.len() {
        ensure_not_cancelled(cancel)?;

        let mut entry = archive
            .by_index(index)
            .map_err(|e| LauncherError::archive(archive_path, e))?;
        let name = entry.name().to_string();
        let relative = sanitize_entry_path(&name)?;
        if relative.as_os_str().is_empty() {
            continue;
        }
        let destination = root.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&destination)
                .map_err(|e| LauncherError::io("create_entry_dir", &destination, e))?;
            continue;
        }

        if let Some(mode) = entry.unix_mode()
            && mode & S_IFMT == S_IFLNK
        {
            return Err(LauncherError::UnsupportedEntry {
                entry: name,
                kind: "symlink".to_string(),
            });
        }

        // Parent chain is created per file; directory entries may be missing or out of order.
        create_parent(&destination)?;
        copy_entry(&mut entry, &destination, archive_path, &name)?;
        if let Some(mode) = entry.unix_mode() {
            apply_mode(&destination, mode)?;
        }
        debug!("Extracted {}", relative.display());
        files += 1;
    }

    Ok(files)
}

/// Extract a gzip-compressed tar archive into `root`. Returns the number of files written.
pub(crate) fn extract_tar_gz(
    archive_path: &Path,
    root: &Path,
    cancel: &CancellationToken,
) -> Result<usize> {
    let file = File::open(archive_path).map_err(|e| LauncherError::io("open_archive", archive_path, e))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    let entries = archive
        .entries()
        .map_err(|e| LauncherError::archive(archive_path, e))?;

    let mut files = 0;
    for entry in entries {
        ensure_not_cancelled(cancel)?;

        let mut entry = entry.map_err(|e| LauncherError::archive(archive_path, e))?;
        let name = entry
            .path()
            .map_err(|e| LauncherError::archive(archive_path, e))?
            .to_string_lossy()
            .into_owned();
        let relative = sanitize_entry_path(&name)?;
        if relative.as_os_str().is_empty() {
            continue;
        }
        let destination = root.join(&relative);

        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            fs::create_dir_all(&destination)
                .map_err(|e| LauncherError::io("create_entry_dir", &destination, e))?;
            continue;
        }
        if !entry_type.is_file() {
            return Err(LauncherError::UnsupportedEntry {
                entry: name,
                kind: format!("{entry_type:?}"),
            });
        }

        create_parent(&destination)?;
        copy_entry(&mut entry, &destination, archive_path, &name)?;
        if let Ok(mode) = entry.header().mode() {
            apply_mode(&destination, mode)?;
        }
        debug!("Extracted {}", relative.display());
        files += 1;
    }

    Ok(files)
}
