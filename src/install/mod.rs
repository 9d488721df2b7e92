//! Modpack installation
//!
//! Extracts a downloaded archive into the install directory without ever
//! leaving it half-written.
//!
//! ## Module Organization
//!
//! - `extract` - Zip and tar.gz extraction with entry-name sanitising
//! - `staging` - Hidden sibling staging directory and the final swap

mod extract;
mod staging;

use std::path::{Path, PathBuf};

use log::{info, warn};
use tokio_util::sync::CancellationToken;

pub use extract::ArchiveFormat;

use crate::error::{LauncherError, Result};

/// Summary of a completed install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub target: PathBuf,
    pub format: ArchiveFormat,
    pub files: usize,
}

/// Unpacks modpack archives into an install directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackageInstaller;

impl PackageInstaller {
    pub fn new() -> Self {
        Self
    }

    /// Extract `archive` into `target`, replacing whatever `target` held.
    ///
    /// Extraction runs on the blocking pool. The cancellation token is checked
    /// between entries; a cancelled or failed install leaves `target` exactly
    /// as it was.
    pub async fn install(
        &self,
        archive: &Path,
        target: &Path,
        cancel: &CancellationToken,
    ) -> Result<InstallReport> {
        let archive = archive.to_path_buf();
        let target_path = target.to_path_buf();
        let cancel = cancel.clone();
        let installer = *self;

        tokio::task::spawn_blocking(move || installer.install_blocking(&archive, &target_path, &cancel))
            .await
            .map_err(|e| LauncherError::io("install_task", target, std::io::Error::other(e)))?
    }

    /// Synchronous form of [`PackageInstaller::install`].
    pub fn install_blocking(
        &self,
        archive: &Path,
        target: &Path,
        cancel: &CancellationToken,
    ) -> Result<InstallReport> {
        let format = ArchiveFormat::detect(archive)?;
        info!(
            "Installing {} ({format:?}) into {}",
            archive.display(),
            target.display()
        );

        let staging = staging::create_staging(target)?;
        let files = match format {
            ArchiveFormat::Zip => extract::extract_zip(archive, staging.path(), cancel),
            ArchiveFormat::TarGz => extract::extract_tar_gz(archive, staging.path(), cancel),
        }
        .inspect_err(|e| warn!("Extraction of {} failed: {e}", archive.display()))?;

        if cancel.is_cancelled() {
            return Err(LauncherError::Cancelled {
                operation: "extract",
            });
        }

        staging::publish(staging, target)?;
        Ok(InstallReport {
            target: target.to_path_buf(),
            format,
            files,
        })
    }
}
