//! Update-then-launch state machine

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use super::state::{PipelineCommand, PipelineState, StatusEvent};
use crate::account::{Account, AccountStore};
use crate::config::LauncherPaths;
use crate::download::{ArtifactDownloader, DownloadProgress};
use crate::error::LauncherError;
use crate::install::PackageInstaller;
use crate::launch::{LaunchRequest, LaunchSettings, ProcessLauncher};
use crate::version::{self, VersionMarker, VersionRecord, VersionSource, VersionStatus};

/// Bounded queue between the orchestrator and its observer.
pub const EVENT_BUFFER: usize = 64;
const COMMAND_BUFFER: usize = 16;
const PROGRESS_BUFFER: usize = 32;

/// Everything the orchestrator needs to know about where things live.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub paths: LauncherPaths,
    pub artifact_url: String,
    pub version_source: VersionSource,
    pub launch: LaunchSettings,
    pub inactivity_timeout: Duration,
}

/// Cloneable handle for sending intents to a running orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    commands: mpsc::Sender<PipelineCommand>,
    cancel: Arc<Mutex<CancellationToken>>,
}

impl OrchestratorHandle {
    /// Queue a command. Fails only when the orchestrator has stopped.
    pub async fn send(&self, command: PipelineCommand) -> Result<(), PipelineCommand> {
        self.commands.send(command).await.map_err(|e| e.0)
    }

    /// Cancel the download or extraction of the current attempt, if any.
    pub fn cancel(&self) {
        info!("Cancellation requested");
        lock_token(&self.cancel).cancel();
    }
}

fn lock_token(token: &Mutex<CancellationToken>) -> MutexGuard<'_, CancellationToken> {
    token.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the pipeline state, both version markers and the account store.
///
/// Steps run one at a time. Every failure inside a step becomes a state
/// transition carrying a message; nothing is returned to the caller as an
/// error.
pub struct UpdateOrchestrator {
    settings: PipelineSettings,
    client: reqwest::Client,
    accounts: AccountStore,
    downloader: ArtifactDownloader,
    installer: PackageInstaller,
    launcher: ProcessLauncher,
    state: PipelineState,
    installed: VersionMarker,
    latest: VersionMarker,
    events: mpsc::Sender<StatusEvent>,
    observer_gone: bool,
    commands: mpsc::Receiver<PipelineCommand>,
    cancel: Arc<Mutex<CancellationToken>>,
    pending_play: bool,
}

impl UpdateOrchestrator {
    /// Build an orchestrator in `Idle`, reading the installed marker from disk.
    pub fn new(
        settings: PipelineSettings,
        client: reqwest::Client,
        accounts: AccountStore,
    ) -> (Self, OrchestratorHandle, mpsc::Receiver<StatusEvent>) {
        let (events, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (commands_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let cancel = Arc::new(Mutex::new(CancellationToken::new()));

        let installed = match VersionRecord::load(&settings.paths.versions_file) {
            Ok(record) => record.installed_version,
            Err(e) => {
                warn!("Ignoring unreadable version record, treating content as not installed: {e}");
                VersionMarker::none()
            }
        };

        let orchestrator = Self {
            downloader: ArtifactDownloader::new(client.clone(), settings.inactivity_timeout),
            settings,
            client,
            accounts,
            installer: PackageInstaller::new(),
            launcher: ProcessLauncher::new(),
            state: PipelineState::Idle,
            installed,
            latest: VersionMarker::unknown(),
            events,
            observer_gone: false,
            commands,
            cancel: cancel.clone(),
            pending_play: false,
        };
        let handle = OrchestratorHandle {
            commands: commands_tx,
            cancel,
        };
        (orchestrator, handle, events_rx)
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn installed(&self) -> &VersionMarker {
        &self.installed
    }

    pub fn latest(&self) -> &VersionMarker {
        &self.latest
    }

    pub fn accounts(&self) -> &AccountStore {
        &self.accounts
    }

    /// Check once, then serve commands until `Shutdown` or every handle is dropped.
    pub async fn run(mut self) -> PipelineState {
        self.check_version().await;

        while let Some(command) = self.commands.recv().await {
            debug!("Command: {command:?}");
            match command {
                PipelineCommand::Check => {
                    self.check_version().await;
                }
                PipelineCommand::Play => self.play().await,
                PipelineCommand::AddAccount(account) => self.add_account(account).await,
                PipelineCommand::SelectAccount(id_or_name) => self.select_account(&id_or_name).await,
                PipelineCommand::Shutdown => break,
            }
        }

        info!("Orchestrator stopped in state {}", self.state);
        self.state
    }

    /// Resolve the latest marker and compare it with the installed one.
    pub async fn check_version(&mut self) -> PipelineState {
        self.transition(PipelineState::CheckingVersion, "Checking for updates")
            .await;

        let latest = match self.settings.version_source.resolve(&self.client).await {
            Ok(latest) => latest,
            Err(e) => {
                self.fail(PipelineState::CheckFailed, &e).await;
                return self.state;
            }
        };
        self.latest = latest;
        self.emit_versions().await;

        match version::compare(&self.installed, &self.latest) {
            VersionStatus::UpToDate => {
                let message = format!("Version {} is installed", self.installed);
                self.transition(PipelineState::UpToDate, message).await;
            }
            VersionStatus::UpdateAvailable => {
                let message = format!("Update available: {} -> {}", self.installed, self.latest);
                self.transition(PipelineState::UpdateAvailable, message).await;
            }
        }
        self.state
    }

    /// Update if needed, then launch with the current account.
    ///
    /// Without a current account the intent is parked and the observer is asked
    /// for one; adding or selecting an account resumes it.
    pub async fn play(&mut self) {
        if self.accounts.current().is_none() {
            info!("Play requested without an account, waiting for one");
            self.pending_play = true;
            self.emit(StatusEvent::AccountRequired).await;
            return;
        }
        self.pending_play = false;

        if self.state.needs_check() {
            self.check_version().await;
        }

        match self.state {
            PipelineState::UpToDate | PipelineState::Ready => self.launch().await,
            PipelineState::UpdateAvailable => {
                if self.update().await {
                    self.launch().await;
                }
            }
            other => debug!("Play ignored in state {other}"),
        }
    }

    pub async fn add_account(&mut self, account: Account) {
        let result = self.accounts.add(account).cloned();
        self.account_changed(result).await;
    }

    pub async fn select_account(&mut self, id_or_name: &str) {
        let result = self.accounts.select(id_or_name).cloned();
        self.account_changed(result).await;
    }

    async fn account_changed(&mut self, result: Result<Account, LauncherError>) {
        match result {
            Ok(account) => {
                info!("Current account is now {}", account.display_name());
                self.emit(StatusEvent::AccountChanged(account)).await;
                if self.pending_play {
                    self.play().await;
                }
            }
            Err(e) => {
                warn!("Account change refused: {e}");
                self.emit(StatusEvent::AccountRejected(e.to_string())).await;
            }
        }
    }

    /// Download and install the latest artifact. Returns true on `Ready`.
    async fn update(&mut self) -> bool {
        let cancel = self.fresh_cancel_token();
        let archive = self.settings.paths.archive_path.clone();

        self.transition(
            PipelineState::Downloading,
            format!("Downloading version {}", self.latest),
        )
        .await;
        if let Err(e) = self.download_with_progress(&archive, &cancel).await {
            remove_archive(&archive);
            self.fail(PipelineState::InstallFailed, &e).await;
            return false;
        }

        self.transition(PipelineState::Extracting, "Installing modpack")
            .await;
        let installed = self
            .installer
            .install(&archive, &self.settings.paths.install_dir, &cancel)
            .await;
        remove_archive(&archive);
        if let Err(e) = installed {
            self.fail(PipelineState::InstallFailed, &e).await;
            return false;
        }

        let record = VersionRecord {
            installed_version: self.latest.clone(),
        };
        if let Err(e) = record.save(&self.settings.paths.versions_file) {
            self.fail(PipelineState::InstallFailed, &e).await;
            return false;
        }
        self.installed = record.installed_version;
        self.emit_versions().await;

        let message = format!("Version {} installed", self.installed);
        self.transition(PipelineState::Ready, message).await;
        true
    }

    /// Run the download while forwarding its progress to the observer.
    async fn download_with_progress(
        &mut self,
        archive: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64, LauncherError> {
        let (progress_tx, mut progress_rx) = mpsc::channel::<DownloadProgress>(PROGRESS_BUFFER);
        let downloader = self.downloader.clone();
        let url = self.settings.artifact_url.clone();
        let archive = archive.to_path_buf();
        let cancel = cancel.clone();

        // The sender is dropped with the future, which ends the forwarding loop.
        let download = async move {
            downloader
                .download(&url, &archive, &progress_tx, &cancel)
                .await
        };

        let events = self.events.clone();
        let forward = async move {
            let mut undelivered = None;
            while let Some(progress) = progress_rx.recv().await {
                undelivered = match events.try_send(StatusEvent::Progress(progress)) {
                    Ok(()) | Err(TrySendError::Closed(_)) => None,
                    Err(TrySendError::Full(_)) => Some(progress),
                };
            }
            undelivered
        };

        let (result, undelivered) = tokio::join!(download, forward);
        // The final snapshot must reach the observer even if per-chunk ones were dropped.
        if let Some(last) = undelivered {
            self.emit(StatusEvent::Progress(last)).await;
        }
        result
    }

    async fn launch(&mut self) {
        let Some(account) = self.accounts.current().cloned() else {
            self.pending_play = true;
            self.emit(StatusEvent::AccountRequired).await;
            return;
        };

        self.transition(
            PipelineState::Launching,
            format!("Launching as {}", account.display_name()),
        )
        .await;

        let request = LaunchRequest::build(
            &self.settings.launch,
            &account,
            &self.settings.paths.install_dir,
        );
        let process = match self.launcher.spawn(&request) {
            Ok(process) => process,
            Err(e) => {
                self.fail(PipelineState::LaunchFailed, &e).await;
                return;
            }
        };

        self.transition(PipelineState::Running, "Game is running").await;
        match process.wait().await {
            Ok(exit) => {
                let message = if exit.success() {
                    "Game exited normally".to_string()
                } else {
                    format!("Game ended with {exit}")
                };
                self.transition(PipelineState::Exited(exit), message).await;
            }
            Err(e) => self.fail(PipelineState::LaunchFailed, &e).await,
        }
    }

    fn fresh_cancel_token(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *lock_token(&self.cancel) = token.clone();
        token
    }

    async fn transition(&mut self, state: PipelineState, message: impl Into<String>) {
        let message = message.into();
        info!("{} -> {}: {message}", self.state, state);
        self.state = state;
        self.emit(StatusEvent::State {
            state,
            message,
            error: None,
        })
        .await;
    }

    async fn fail(&mut self, state: PipelineState, err: &LauncherError) {
        if err.is_cancelled() {
            warn!("{} -> {}: {err}", self.state, state);
        } else {
            error!("{} -> {}: {err}", self.state, state);
        }
        self.state = state;
        self.emit(StatusEvent::State {
            state,
            message: err.to_string(),
            error: Some(err.kind()),
        })
        .await;
    }

    async fn emit_versions(&mut self) {
        let event = StatusEvent::Versions {
            installed: self.installed.clone(),
            latest: self.latest.clone(),
        };
        self.emit(event).await;
    }

    /// Reliable delivery; a departed observer is noted once and then ignored.
    async fn emit(&mut self, event: StatusEvent) {
        if self.observer_gone {
            return;
        }
        if self.events.send(event).await.is_err() {
            warn!("Status observer went away, continuing without notifications");
            self.observer_gone = true;
        }
    }
}

fn remove_archive(archive: &Path) {
    match std::fs::remove_file(archive) {
        Ok(()) => debug!("Removed {}", archive.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {}: {e}", archive.display()),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::error::ErrorKind;
    use crate::launch::ProcessExit;

    type TestResult<T> = anyhow::Result<T>;

    fn settings(root: &Path, java_path: PathBuf, version_source: VersionSource) -> PipelineSettings {
        PipelineSettings {
            paths: LauncherPaths::new(root),
            // Nothing listens on port 1; connections are refused immediately.
            artifact_url: "http://127.0.0.1:1/modpack.zip".to_string(),
            version_source,
            launch: LaunchSettings {
                java_path,
                ..LaunchSettings::default()
            },
            inactivity_timeout: Duration::from_secs(5),
        }
    }

    fn fixed(version: &str) -> VersionSource {
        VersionSource::Fixed {
            version: version.to_string(),
        }
    }

    fn client() -> reqwest::Client {
        reqwest::Client::builder()
            .no_proxy()
            .build()
            .expect("test http client")
    }

    fn orchestrator(
        settings: PipelineSettings,
        accounts: AccountStore,
    ) -> (UpdateOrchestrator, mpsc::Receiver<StatusEvent>) {
        let (orchestrator, _handle, events) =
            UpdateOrchestrator::new(settings, client(), accounts);
        (orchestrator, events)
    }

    fn drain(events: &mut mpsc::Receiver<StatusEvent>) -> Vec<StatusEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = events.try_recv() {
            drained.push(event);
        }
        drained
    }

    fn states(events: &[StatusEvent]) -> Vec<PipelineState> {
        events
            .iter()
            .filter_map(|event| match event {
                StatusEvent::State { state, .. } => Some(*state),
                _ => None,
            })
            .collect()
    }

    fn seed_install(root: &Path, version: &str) -> TestResult<()> {
        let paths = LauncherPaths::new(root);
        std::fs::create_dir_all(&paths.install_dir)?;
        std::fs::write(paths.install_dir.join("forge.jar"), b"jar")?;
        VersionRecord {
            installed_version: VersionMarker::new(version),
        }
        .save(&paths.versions_file)?;
        Ok(())
    }

    fn store_with(root: &Path, account: Account) -> TestResult<AccountStore> {
        let mut store = AccountStore::new(LauncherPaths::new(root).accounts_file);
        store.add(account)?;
        Ok(store)
    }

    #[tokio::test]
    async fn check_reports_update_when_nothing_installed() -> TestResult<()> {
        let temp = tempfile::tempdir()?;
        let (mut orchestrator, mut events) = orchestrator(
            settings(temp.path(), PathBuf::from("java"), fixed("1.0")),
            AccountStore::new(temp.path().join("accounts.json")),
        );

        assert_eq!(orchestrator.check_version().await, PipelineState::UpdateAvailable);

        let events = drain(&mut events);
        assert_eq!(
            states(&events),
            [PipelineState::CheckingVersion, PipelineState::UpdateAvailable]
        );
        assert!(events.contains(&StatusEvent::Versions {
            installed: VersionMarker::none(),
            latest: VersionMarker::new("1.0"),
        }));
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_version_source_is_check_failed() -> TestResult<()> {
        let temp = tempfile::tempdir()?;
        let source = VersionSource::Http {
            url: "http://127.0.0.1:1/version".to_string(),
        };
        let (mut orchestrator, mut events) = orchestrator(
            settings(temp.path(), PathBuf::from("java"), source),
            AccountStore::new(temp.path().join("accounts.json")),
        );

        assert_eq!(orchestrator.check_version().await, PipelineState::CheckFailed);
        assert!(orchestrator.latest().is_unknown());
        assert!(drain(&mut events).iter().any(|event| matches!(
            event,
            StatusEvent::State {
                state: PipelineState::CheckFailed,
                error: Some(ErrorKind::Network),
                ..
            }
        )));
        Ok(())
    }

    #[tokio::test]
    async fn play_without_account_waits_for_one() -> TestResult<()> {
        let temp = tempfile::tempdir()?;
        seed_install(temp.path(), "1.0")?;
        let (mut orchestrator, mut events) = orchestrator(
            settings(temp.path(), temp.path().join("no-such-java"), fixed("1.0")),
            AccountStore::new(temp.path().join("accounts.json")),
        );

        orchestrator.play().await;
        assert_eq!(drain(&mut events), [StatusEvent::AccountRequired]);
        assert_eq!(orchestrator.state(), PipelineState::Idle);

        // Adding an account resumes the parked intent.
        orchestrator.add_account(Account::offline("Steve")?).await;
        let events = drain(&mut events);
        assert!(matches!(events.first(), Some(StatusEvent::AccountChanged(a)) if a.display_name() == "Steve"));
        assert_eq!(
            states(&events),
            [
                PipelineState::CheckingVersion,
                PipelineState::UpToDate,
                PipelineState::Launching,
                PipelineState::LaunchFailed,
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn spawn_failure_is_launch_failed() -> TestResult<()> {
        let temp = tempfile::tempdir()?;
        seed_install(temp.path(), "1.0")?;
        let accounts = store_with(temp.path(), Account::offline("Steve")?)?;
        let (mut orchestrator, mut events) = orchestrator(
            settings(temp.path(), temp.path().join("no-such-java"), fixed("1.0")),
            accounts,
        );

        orchestrator.play().await;

        assert_eq!(orchestrator.state(), PipelineState::LaunchFailed);
        assert!(drain(&mut events).iter().any(|event| matches!(
            event,
            StatusEvent::State {
                state: PipelineState::LaunchFailed,
                error: Some(ErrorKind::Spawn),
                ..
            }
        )));
        Ok(())
    }

    #[tokio::test]
    async fn failed_download_keeps_previous_install() -> TestResult<()> {
        let temp = tempfile::tempdir()?;
        seed_install(temp.path(), "0.9")?;
        let accounts = store_with(temp.path(), Account::offline("Steve")?)?;
        let (mut orchestrator, mut events) = orchestrator(
            settings(temp.path(), PathBuf::from("java"), fixed("1.0")),
            accounts,
        );

        orchestrator.play().await;

        assert_eq!(orchestrator.state(), PipelineState::InstallFailed);
        assert_eq!(orchestrator.installed().as_str(), "0.9");
        let paths = LauncherPaths::new(temp.path());
        assert_eq!(std::fs::read(paths.install_dir.join("forge.jar"))?, b"jar");
        assert!(!paths.archive_path.exists());
        assert_eq!(
            VersionRecord::load(&paths.versions_file)?.installed_version.as_str(),
            "0.9"
        );
        assert_eq!(
            states(&drain(&mut events)),
            [
                PipelineState::CheckingVersion,
                PipelineState::UpdateAvailable,
                PipelineState::Downloading,
                PipelineState::InstallFailed,
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn unknown_account_selection_is_rejected() -> TestResult<()> {
        let temp = tempfile::tempdir()?;
        let (mut orchestrator, mut events) = orchestrator(
            settings(temp.path(), PathBuf::from("java"), fixed("1.0")),
            AccountStore::new(temp.path().join("accounts.json")),
        );

        orchestrator.select_account("nobody").await;

        assert!(matches!(
            drain(&mut events).as_slice(),
            [StatusEvent::AccountRejected(_)]
        ));
        assert_eq!(orchestrator.state(), PipelineState::Idle);
        Ok(())
    }

    #[tokio::test]
    async fn unpersistable_account_is_rejected_and_not_used() -> TestResult<()> {
        let temp = tempfile::tempdir()?;
        let accounts_file = temp.path().join("accounts.json");
        std::fs::create_dir_all(&accounts_file)?;
        let (mut orchestrator, mut events) = orchestrator(
            settings(temp.path(), PathBuf::from("java"), fixed("1.0")),
            AccountStore::new(&accounts_file),
        );

        orchestrator.play().await;
        orchestrator.add_account(Account::offline("Steve")?).await;

        let drained = drain(&mut events);
        assert!(matches!(
            drained.as_slice(),
            [StatusEvent::AccountRequired, StatusEvent::AccountRejected(_)]
        ));
        assert!(orchestrator.accounts().current().is_none());
        assert!(orchestrator.accounts().list().is_empty());
        assert_eq!(orchestrator.state(), PipelineState::Idle);
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn up_to_date_install_launches_and_reports_exit() -> TestResult<()> {
        let temp = tempfile::tempdir()?;
        seed_install(temp.path(), "1.0")?;
        let accounts = store_with(temp.path(), Account::premium("Alex", "u1", "t1")?)?;
        let (mut orchestrator, mut events) = orchestrator(
            settings(temp.path(), which::which("true")?, fixed("1.0")),
            accounts,
        );

        orchestrator.play().await;

        assert_eq!(
            states(&drain(&mut events)),
            [
                PipelineState::CheckingVersion,
                PipelineState::UpToDate,
                PipelineState::Launching,
                PipelineState::Running,
                PipelineState::Exited(ProcessExit::Code(0)),
            ]
        );

        // A new play from a terminal state starts over with a check.
        orchestrator.play().await;
        assert_eq!(
            states(&drain(&mut events)).first(),
            Some(&PipelineState::CheckingVersion)
        );
        Ok(())
    }

    #[tokio::test]
    async fn handle_cancel_targets_the_current_attempt_only() -> TestResult<()> {
        let temp = tempfile::tempdir()?;
        let (orchestrator, handle, _events) = UpdateOrchestrator::new(
            settings(temp.path(), PathBuf::from("java"), fixed("1.0")),
            client(),
            AccountStore::new(temp.path().join("accounts.json")),
        );

        let first = orchestrator.fresh_cancel_token();
        handle.cancel();
        assert!(first.is_cancelled());

        let second = orchestrator.fresh_cancel_token();
        assert!(!second.is_cancelled());
        Ok(())
    }
}
