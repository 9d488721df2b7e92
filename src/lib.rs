//! Aurora SMP launcher library
//!
//! Keeps the locally installed modpack in sync with the latest release and
//! launches it with the current account's identity.
//!
//! ## Module Organization
//!
//! - `version` - Version markers, comparison and the installed-version record
//! - `account` - Saved accounts and the current selection
//! - `download` - Streaming artifact download with progress
//! - `install` - Archive extraction and staged replacement of the install directory
//! - `launch` - Launch request construction and child process supervision
//! - `pipeline` - The orchestrator state machine and its event channel
//! - `config` - `launcher.toml` and the on-disk layout

pub mod account;
pub mod config;
pub mod download;
pub mod error;
mod fsutil;
pub mod install;
pub mod launch;
pub mod pipeline;
pub mod version;

pub use account::{Account, AccountStore};
pub use config::{LauncherConfig, LauncherPaths};
pub use download::{ArtifactDownloader, DownloadProgress, http_client};
pub use error::{ErrorKind, LauncherError, Result};
pub use install::{ArchiveFormat, InstallReport, PackageInstaller};
pub use launch::{LaunchRequest, LaunchSettings, ProcessExit, ProcessLauncher, RunningProcess};
pub use pipeline::{
    OrchestratorHandle, PipelineCommand, PipelineSettings, PipelineState, StatusEvent,
    UpdateOrchestrator,
};
pub use version::{VersionMarker, VersionRecord, VersionSource, VersionStatus, compare};
