//! Command runners for the launcher binary
//!
//! `play` and `check` start an orchestrator on a background task and observe
//! its events from the main task; the account and status commands work on
//! the persisted records directly.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use aurora_launcher::{
    Account, AccountStore, DownloadProgress, ErrorKind, LauncherConfig, OrchestratorHandle,
    PipelineCommand, PipelineState, StatusEvent, UpdateOrchestrator, VersionRecord, http_client,
};

use crate::cli::AccountCmd;
use crate::wizard::{self, AccountChoice, describe};

fn print_colored(color: Color, bold: bool, text: &str) {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(bold));
    let _ = writeln!(stdout, "{text}");
    let _ = stdout.reset();
}

/// Check, update if needed and launch. Errors unless the game exits cleanly.
pub async fn run_play(config: &LauncherConfig) -> Result<()> {
    let (handle, events, task, known) = start_orchestrator(config)?;
    let mut observer = TerminalObserver::new(Goal::Play, handle.clone(), known);
    let finished = observer.observe(events).await?;
    stop_orchestrator(&handle, task).await?;

    match finished {
        PipelineState::Exited(exit) if exit.success() => Ok(()),
        other => bail!("Game did not exit cleanly ({other})"),
    }
}

/// Resolve both markers. Returns true when the install is up to date.
pub async fn run_check(config: &LauncherConfig) -> Result<bool> {
    let (handle, events, task, known) = start_orchestrator(config)?;
    let mut observer = TerminalObserver::new(Goal::Check, handle.clone(), known);
    let settled = observer.observe(events).await?;
    stop_orchestrator(&handle, task).await?;
    Ok(settled == PipelineState::UpToDate)
}

fn start_orchestrator(
    config: &LauncherConfig,
) -> Result<(
    OrchestratorHandle,
    mpsc::Receiver<StatusEvent>,
    JoinHandle<PipelineState>,
    Vec<Account>,
)> {
    let settings = config.pipeline_settings()?;
    let accounts = AccountStore::load(&settings.paths.accounts_file)
        .context("Failed to load saved accounts")?;
    let known = accounts.list().to_vec();
    let client = http_client(config.connect_timeout()).context("Failed to build HTTP client")?;

    let (orchestrator, handle, events) = UpdateOrchestrator::new(settings, client, accounts);
    let task = tokio::spawn(orchestrator.run());
    Ok((handle, events, task, known))
}

async fn stop_orchestrator(handle: &OrchestratorHandle, task: JoinHandle<PipelineState>) -> Result<()> {
    if handle.send(PipelineCommand::Shutdown).await.is_err() {
        debug!("Orchestrator already stopped");
    }
    let final_state = task.await.context("Orchestrator task failed")?;
    debug!("Orchestrator finished in state {final_state}");
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Goal {
    Check,
    Play,
}

/// Renders pipeline events on the terminal and answers account requests.
struct TerminalObserver {
    goal: Goal,
    handle: OrchestratorHandle,
    known: Vec<Account>,
    state: PipelineState,
    play_sent: bool,
    bar: Option<ProgressBar>,
}

impl TerminalObserver {
    fn new(goal: Goal, handle: OrchestratorHandle, known: Vec<Account>) -> Self {
        Self {
            goal,
            handle,
            known,
            state: PipelineState::Idle,
            play_sent: false,
            bar: None,
        }
    }

    /// Consume events until the goal is reached, returning the state it ended in.
    async fn observe(&mut self, mut events: mpsc::Receiver<StatusEvent>) -> Result<PipelineState> {
        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        bail!("Launcher pipeline stopped unexpectedly");
                    };
                    if let Some(finished) = self.handle_event(event).await? {
                        return Ok(finished);
                    }
                }
                signal = tokio::signal::ctrl_c() => {
                    signal.context("Failed to listen for Ctrl-C")?;
                    if self.state.is_cancellable() {
                        self.handle.cancel();
                    } else if self.state == PipelineState::Running {
                        debug!("Interrupt delivered to the game process");
                    } else {
                        bail!("Interrupted");
                    }
                }
            }
        }
    }

    async fn handle_event(&mut self, event: StatusEvent) -> Result<Option<PipelineState>> {
        match event {
            StatusEvent::State {
                state,
                message,
                error,
            } => {
                self.state = state;
                self.render_state(state, &message, error);
                self.advance(state, &message).await
            }
            StatusEvent::Progress(progress) => {
                self.render_progress(progress)?;
                Ok(None)
            }
            StatusEvent::Versions { installed, latest } => {
                self.print(Color::White, false, &format!("   Installed: {installed}   Latest: {latest}"));
                Ok(None)
            }
            StatusEvent::AccountRequired => {
                let known = self.known.clone();
                let choice = tokio::task::spawn_blocking(move || wizard::prompt_account(&known))
                    .await
                    .context("Account prompt task failed")??;
                let command = match choice {
                    AccountChoice::Existing(id) => PipelineCommand::SelectAccount(id),
                    AccountChoice::Create(account) => PipelineCommand::AddAccount(account),
                };
                self.handle
                    .send(command)
                    .await
                    .map_err(|_| anyhow!("Launcher pipeline stopped unexpectedly"))?;
                Ok(None)
            }
            StatusEvent::AccountChanged(account) => {
                self.print(
                    Color::Green,
                    false,
                    &format!("👤 Playing as {}", account.display_name()),
                );
                if !self.known.iter().any(|a| a.id() == account.id()) {
                    self.known.push(account);
                }
                Ok(None)
            }
            StatusEvent::AccountRejected(reason) => Err(anyhow!("Account not usable: {reason}")),
        }
    }

    /// Decide what the observed state means for the goal.
    async fn advance(&mut self, state: PipelineState, message: &str) -> Result<Option<PipelineState>> {
        match (self.goal, state) {
            (Goal::Check, PipelineState::UpToDate | PipelineState::UpdateAvailable) => Ok(Some(state)),
            (_, PipelineState::CheckFailed) => Err(anyhow!("Version check failed: {message}")),
            (Goal::Play, PipelineState::UpToDate | PipelineState::UpdateAvailable) if !self.play_sent => {
                self.play_sent = true;
                self.handle
                    .send(PipelineCommand::Play)
                    .await
                    .map_err(|_| anyhow!("Launcher pipeline stopped unexpectedly"))?;
                Ok(None)
            }
            (Goal::Play, PipelineState::InstallFailed | PipelineState::LaunchFailed) => {
                Err(anyhow!("{state}: {message}"))
            }
            (Goal::Play, PipelineState::Exited(_)) => Ok(Some(state)),
            _ => Ok(None),
        }
    }

    fn render_state(&mut self, state: PipelineState, message: &str, error: Option<ErrorKind>) {
        if state != PipelineState::Downloading
            && let Some(bar) = self.bar.take()
        {
            bar.finish_and_clear();
        }

        let (color, icon) = match (state, error) {
            (_, Some(ErrorKind::Cancelled)) => (Color::Yellow, "⚠"),
            (_, Some(ErrorKind::PathTraversal)) => (Color::Red, "⛔"),
            (_, Some(_)) => (Color::Red, "❌"),
            (PipelineState::CheckingVersion, _) => (Color::Cyan, "🔍"),
            (PipelineState::UpdateAvailable, _) => (Color::Yellow, "⬆"),
            (PipelineState::Downloading, _) => (Color::Cyan, "📥"),
            (PipelineState::Extracting, _) => (Color::Cyan, "📦"),
            (PipelineState::Launching | PipelineState::Running, _) => (Color::Cyan, "🚀"),
            (PipelineState::Exited(exit), _) if !exit.success() => (Color::Yellow, "⚠"),
            _ => (Color::Green, "✅"),
        };
        self.print(color, error.is_some(), &format!("{icon} {message}"));
    }

    fn render_progress(&mut self, progress: DownloadProgress) -> Result<()> {
        let bar = match self.bar.take() {
            Some(bar) => bar,
            None => new_download_bar(progress.total_bytes)?,
        };
        if let Some(total) = progress.total_bytes {
            bar.set_length(total);
        }
        bar.set_position(progress.bytes_read);
        self.bar = Some(bar);
        Ok(())
    }

    fn print(&self, color: Color, bold: bool, text: &str) {
        match &self.bar {
            Some(bar) => bar.suspend(|| print_colored(color, bold, text)),
            None => print_colored(color, bold, text),
        }
    }
}

fn new_download_bar(total_bytes: Option<u64>) -> Result<ProgressBar> {
    let bar = match total_bytes {
        Some(total) => {
            let bar = ProgressBar::new(total);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("   [{bar:50.green/blue}] {bytes}/{total_bytes}  {bytes_per_sec}")
                    .context("Invalid progress bar template")?
                    .progress_chars("█▓░"),
            );
            bar
        }
        None => {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::default_spinner()
                    .template("   {spinner:.green} {bytes}  {bytes_per_sec}")
                    .context("Invalid progress bar template")?,
            );
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        }
    };
    Ok(bar)
}

/// Print paths, installed version and the current account.
pub fn show_status(config: &LauncherConfig, config_path: &Path) -> Result<()> {
    let paths = config.paths()?;
    let record = VersionRecord::load(&paths.versions_file).context("Failed to read version record")?;
    let accounts = AccountStore::load(&paths.accounts_file).context("Failed to load saved accounts")?;

    print_colored(Color::Cyan, true, "Aurora SMP launcher");
    println!("   Config:     {}", config_path.display());
    println!("   Data dir:   {}", paths.root.display());
    println!("   Modpack:    {}", paths.install_dir.display());
    println!("   Installed:  {}", record.installed_version);
    println!("   Runtime:    {}", config.resolve_java().display());
    match accounts.current() {
        Some(account) => println!("   Account:    {}", describe(account)),
        None => print_colored(Color::Yellow, false, "   Account:    none (you will be asked on play)"),
    }
    Ok(())
}

/// Account management subcommands.
pub fn run_accounts(config: &LauncherConfig, action: AccountCmd) -> Result<()> {
    let paths = config.paths()?;
    let mut store = AccountStore::load(&paths.accounts_file).context("Failed to load saved accounts")?;

    match action {
        AccountCmd::List => {
            if store.list().is_empty() {
                println!("No saved accounts");
                return Ok(());
            }
            let current = store.current().map(|a| a.id().to_string());
            for account in store.list() {
                let marker = if current.as_deref() == Some(account.id()) { "*" } else { " " };
                println!("{marker} {}  {}", describe(account), account.id());
            }
        }
        AccountCmd::AddOffline { name } => {
            let account = store.add(Account::offline(&name)?)?;
            print_colored(Color::Green, false, &format!("✓ Added {}", describe(account)));
        }
        AccountCmd::AddPremium {
            name,
            uuid,
            access_token,
        } => {
            let account = store.add(Account::premium(&name, &uuid, &access_token)?)?;
            print_colored(Color::Green, false, &format!("✓ Added {}", describe(account)));
        }
        AccountCmd::Select { account } => {
            let account = store.select(&account)?;
            print_colored(Color::Green, false, &format!("✓ Now playing as {}", describe(account)));
        }
    }
    Ok(())
}
