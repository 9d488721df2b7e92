//! Staged directory swap
//!
//! Content is extracted into a hidden sibling of the target and only swapped in
//! once extraction finished. The previous content is parked in a second hidden
//! sibling until the swap succeeded, and moved back if it did not.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, error, info};
use tempfile::TempDir;

use crate::error::{LauncherError, Result};
use crate::fsutil;

/// Create an empty staging directory next to `target`.
pub(crate) fn create_staging(target: &Path) -> Result<TempDir> {
    let parent = fsutil::parent_dir(target);
    fs::create_dir_all(parent).map_err(|e| LauncherError::io("create_install_parent", parent, e))?;

    let staging = tempfile::Builder::new()
        .prefix(".staging-")
        .tempdir_in(parent)
        .map_err(|e| LauncherError::io("create_staging_dir", parent, e))?;
    debug!("Staging into {}", staging.path().display());
    Ok(staging)
}

/// Replace `target` with the contents of `staging`.
///
/// On success the old content is gone and `target` holds exactly what was
/// staged. On failure `target` holds what it held before.
pub(crate) fn publish(staging: TempDir, target: &Path) -> Result<()> {
    let parent = fsutil::parent_dir(target);
    set_install_mode(staging.path())?;

    let previous = park_previous(target, parent)?;

    let staged: PathBuf = staging.keep();
    if let Err(e) = fs::rename(&staged, target) {
        if let Err(cleanup) = fs::remove_dir_all(&staged) {
            debug!("Could not remove {}: {cleanup}", staged.display());
        }
        if let Some((backup, held)) = previous {
            restore_previous(backup, &held, target);
        }
        return Err(LauncherError::io("publish_install", target, e));
    }

    // Dropping the backup TempDir removes the old content.
    drop(previous);
    info!("Installed content published to {}", target.display());
    Ok(())
}

/// Move existing content out of the way, returning the guard that owns it.
fn park_previous(target: &Path, parent: &Path) -> Result<Option<(TempDir, PathBuf)>> {
    match fs::symlink_metadata(target) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(LauncherError::io("inspect_install_dir", target, e)),
    }

    let backup = tempfile::Builder::new()
        .prefix(".previous-")
        .tempdir_in(parent)
        .map_err(|e| LauncherError::io("create_backup_dir", parent, e))?;
    let held = backup.path().join("content");
    fs::rename(target, &held).map_err(|e| LauncherError::io("park_previous_install", target, e))?;
    debug!("Previous content parked at {}", held.display());
    Ok(Some((backup, held)))
}

/// Move parked content back to `target`. If that fails the backup directory is
/// kept on disk, since it holds the only remaining copy.
fn restore_previous(backup: TempDir, held: &Path, target: &Path) {
    match fs::rename(held, target) {
        Ok(()) => debug!("Previous content restored to {}", target.display()),
        Err(restore) => {
            let kept = backup.keep();
            error!(
                "Failed to restore previous content to {}: {restore}; it is kept at {}",
                target.display(),
                kept.join("content").display()
            );
        }
    }
}

#[cfg(unix)]
fn set_install_mode(dir: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    // tempdir_in creates 0o700; the installed tree should look like a normal directory.
    fs::set_permissions(dir, fs::Permissions::from_mode(0o755))
        .map_err(|e| LauncherError::io("set_install_permissions", dir, e))
}

#[cfg(not(unix))]
fn set_install_mode(_dir: &Path) -> Result<()> {
    Ok(())
}
