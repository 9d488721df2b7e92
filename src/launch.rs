//! Child process construction and supervision
//!
//! A [`LaunchRequest`] is built fresh for every launch from the current account
//! and the install directory, then handed to [`ProcessLauncher`]. Spawn errors
//! come back synchronously; the exit is awaited separately so the caller keeps
//! delivering events while the game runs.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use log::{info, warn};
use tokio::process::{Child, Command};

use crate::account::Account;
use crate::error::{LauncherError, Result};

/// Runtime settings that do not depend on the account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSettings {
    pub java_path: PathBuf,
    /// Heap limit as accepted by `-Xmx`, e.g. `3G`.
    pub max_memory: String,
    /// Loader jar, relative to the install directory.
    pub loader_jar: String,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            java_path: PathBuf::from("java"),
            max_memory: "3G".to_string(),
            loader_jar: "forge.jar".to_string(),
        }
    }
}

/// Fully resolved invocation. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    executable_path: PathBuf,
    working_directory: PathBuf,
    arguments: Vec<String>,
}

impl LaunchRequest {
    /// Memory flag, loader jar, then identity arguments.
    ///
    /// Offline accounts get `--username` only. Premium accounts also get
    /// `--uuid` and `--accessToken`.
    pub fn build(settings: &LaunchSettings, account: &Account, install_dir: &Path) -> Self {
        let mut arguments = vec![
            format!("-Xmx{}", settings.max_memory),
            "-jar".to_string(),
            install_dir.join(&settings.loader_jar).to_string_lossy().into_owned(),
            "--username".to_string(),
            account.display_name().to_string(),
        ];
        if account.is_premium() {
            arguments.extend([
                "--uuid".to_string(),
                account.uuid().to_string(),
                "--accessToken".to_string(),
                account.access_token().to_string(),
            ]);
        }

        Self {
            executable_path: settings.java_path.clone(),
            working_directory: install_dir.to_path_buf(),
            arguments,
        }
    }

    pub fn executable_path(&self) -> &Path {
        &self.executable_path
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// Arguments with the access token masked, for logging.
    pub fn redacted_arguments(&self) -> Vec<&str> {
        let mut masked = Vec::with_capacity(self.arguments.len());
        let mut hide_next = false;
        for arg in &self.arguments {
            masked.push(if hide_next { "***" } else { arg.as_str() });
            hide_next = arg == "--accessToken";
        }
        masked
    }
}

/// How the child finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    Code(i32),
    /// Terminated by a signal; the number is unavailable on some platforms.
    Signalled(Option<i32>),
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        matches!(self, Self::Code(0))
    }

    fn from_status(status: ExitStatus) -> Self {
        match status.code() {
            Some(code) => Self::Code(code),
            None => Self::Signalled(signal_of(status)),
        }
    }
}

#[cfg(unix)]
fn signal_of(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn signal_of(_status: ExitStatus) -> Option<i32> {
    None
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "exit code {code}"),
            Self::Signalled(Some(signal)) => write!(f, "signal {signal}"),
            Self::Signalled(None) => f.write_str("terminated by signal"),
        }
    }
}

/// Spawns launch requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLauncher;

impl ProcessLauncher {
    pub fn new() -> Self {
        Self
    }

    /// Start the child. Failure to start is returned here, never deferred.
    pub fn spawn(&self, request: &LaunchRequest) -> Result<RunningProcess> {
        info!(
            "Launching {} {} in {}",
            request.executable_path.display(),
            request.redacted_arguments().join(" "),
            request.working_directory.display()
        );

        let child = Command::new(&request.executable_path)
            .args(&request.arguments)
            .current_dir(&request.working_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| LauncherError::Spawn {
                program: request.executable_path.clone(),
                source,
            })?;

        let pid = child.id();
        info!(
            "Game process spawned (PID: {})",
            pid.map_or("unavailable".to_string(), |p| p.to_string())
        );
        Ok(RunningProcess {
            child,
            program: request.executable_path.clone(),
        })
    }
}

/// A spawned child awaiting completion.
#[derive(Debug)]
pub struct RunningProcess {
    child: Child,
    program: PathBuf,
}

impl RunningProcess {
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the child to exit. Not cancellable.
    pub async fn wait(mut self) -> Result<ProcessExit> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| LauncherError::io("wait_for_game", &self.program, e))?;
        let exit = ProcessExit::from_status(status);
        if exit.success() {
            info!("Game process exited cleanly");
        } else {
            warn!("Game process ended with {exit}");
        }
        Ok(exit)
    }
}
