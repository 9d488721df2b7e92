//! Pipeline states, observer events and commands

use std::fmt;

use crate::account::Account;
use crate::download::DownloadProgress;
use crate::error::ErrorKind;
use crate::launch::ProcessExit;
use crate::version::VersionMarker;

/// Where the orchestrator currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    CheckingVersion,
    /// The latest marker could not be resolved.
    CheckFailed,
    UpToDate,
    UpdateAvailable,
    Downloading,
    Extracting,
    InstallFailed,
    Ready,
    Launching,
    Running,
    Exited(ProcessExit),
    LaunchFailed,
}

impl PipelineState {
    /// The attempt is over; only a new play or check intent moves on from here.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::CheckFailed | Self::InstallFailed | Self::Exited(_) | Self::LaunchFailed
        )
    }

    /// States whose work honours the cancellation token.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::Downloading | Self::Extracting)
    }

    /// A play intent from here needs a fresh version check first.
    pub(crate) fn needs_check(&self) -> bool {
        matches!(self, Self::Idle) || self.is_terminal()
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::CheckingVersion => f.write_str("checking version"),
            Self::CheckFailed => f.write_str("version check failed"),
            Self::UpToDate => f.write_str("up to date"),
            Self::UpdateAvailable => f.write_str("update available"),
            Self::Downloading => f.write_str("downloading"),
            Self::Extracting => f.write_str("extracting"),
            Self::InstallFailed => f.write_str("install failed"),
            Self::Ready => f.write_str("ready"),
            Self::Launching => f.write_str("launching"),
            Self::Running => f.write_str("running"),
            Self::Exited(exit) => write!(f, "exited ({exit})"),
            Self::LaunchFailed => f.write_str("launch failed"),
        }
    }
}

/// Everything the observer is told, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    State {
        state: PipelineState,
        message: String,
        /// Set when the transition was caused by an error.
        error: Option<ErrorKind>,
    },
    Progress(DownloadProgress),
    Versions {
        installed: VersionMarker,
        latest: VersionMarker,
    },
    /// A play intent is waiting for an account to be added or selected.
    AccountRequired,
    AccountChanged(Account),
    /// An account command was refused; the pipeline state is unchanged.
    AccountRejected(String),
}

/// Intents accepted by a running orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineCommand {
    Check,
    Play,
    AddAccount(Account),
    /// Account id or display name.
    SelectAccount(String),
    Shutdown,
}
