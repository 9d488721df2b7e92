//! Small filesystem helpers shared by the persisted records and the installer

use std::io::Write;
use std::path::Path;

use crate::error::{LauncherError, Result};

/// Write `contents` to `path` via a sibling temp file and rename, so readers
/// never observe a half-written record.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = parent_dir(path);
    std::fs::create_dir_all(parent)
        .map_err(|e| LauncherError::io("create_parent_dir", parent, e))?;

    let mut temp = tempfile::Builder::new()
        .prefix(".tmp-")
        .tempfile_in(parent)
        .map_err(|e| LauncherError::io("create_temp_file", parent, e))?;
    temp.write_all(contents)
        .map_err(|e| LauncherError::io("write_temp_file", temp.path(), e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| LauncherError::io("sync_temp_file", temp.path(), e))?;
    temp.persist(path)
        .map_err(|e| LauncherError::io("persist_file", path, e.error))?;
    Ok(())
}

/// Directory a sibling temp file or directory should be created in.
pub(crate) fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
