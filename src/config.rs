//! Launcher configuration (`launcher.toml`) and the on-disk layout under the data directory

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::launch::LaunchSettings;
use crate::pipeline::PipelineSettings;
use crate::version::VersionSource;

/// Modpack archive published for the server.
pub const DEFAULT_ARTIFACT_URL: &str =
    "https://edge.forgecdn.net/files/4743/756/Aurora_SMP_BR_Server-1.0.zip";

/// Launcher root under the home directory when `data_dir` is unset.
pub const DEFAULT_DATA_DIR_NAME: &str = "AuroraSMP";

/// Launcher configuration (`launcher.toml`). Every key is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    /// Root for accounts, version record and installed content.
    pub data_dir: Option<PathBuf>,
    pub artifact_url: String,
    /// Runtime executable; resolved from `JAVA_HOME` or `PATH` when unset.
    pub java_path: Option<PathBuf>,
    pub max_memory: String,
    pub loader_jar: String,
    pub connect_timeout_secs: u64,
    /// Longest gap between received chunks before a download counts as stalled.
    pub inactivity_timeout_secs: u64,
    pub version_source: VersionSource,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            artifact_url: DEFAULT_ARTIFACT_URL.to_string(),
            java_path: None,
            max_memory: "3G".to_string(),
            loader_jar: "forge.jar".to_string(),
            connect_timeout_secs: 30,
            inactivity_timeout_secs: 300,
            version_source: VersionSource::default(),
        }
    }
}

impl LauncherConfig {
    /// `<config dir>/aurora-launcher/launcher.toml`
    pub fn default_path() -> Result<PathBuf> {
        Ok(dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?
            .join("aurora-launcher")
            .join("launcher.toml"))
    }

    /// Load `path`, writing the defaults there first if it does not exist.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("Config not found at {}, creating default configuration", path.display());

            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).context("Failed to create config directory")?;
            }

            let default_toml = toml::to_string_pretty(&Self::default())
                .context("Failed to serialize default config")?;
            fs::write(path, default_toml).context("Failed to write config file")?;

            info!("Created default configuration at {}", path.display());
        }

        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        debug!("Using config from: {}", path.display());
        Ok(config)
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(dirs::home_dir()
                .ok_or_else(|| anyhow!("Could not determine home directory"))?
                .join(DEFAULT_DATA_DIR_NAME)),
        }
    }

    pub fn paths(&self) -> Result<LauncherPaths> {
        Ok(LauncherPaths::new(self.data_dir()?))
    }

    /// Everything the orchestrator needs, with the runtime resolved.
    pub fn pipeline_settings(&self) -> Result<PipelineSettings> {
        Ok(PipelineSettings {
            paths: self.paths()?,
            artifact_url: self.artifact_url.clone(),
            version_source: self.version_source.clone(),
            launch: self.launch_settings(),
            inactivity_timeout: self.inactivity_timeout(),
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    pub fn launch_settings(&self) -> LaunchSettings {
        LaunchSettings {
            java_path: self.resolve_java(),
            max_memory: self.max_memory.clone(),
            loader_jar: self.loader_jar.clone(),
        }
    }

    /// Configured path, then `$JAVA_HOME/bin/java`, then `java` on `PATH`.
    pub fn resolve_java(&self) -> PathBuf {
        if let Some(path) = &self.java_path {
            return path.clone();
        }

        if let Some(home) = std::env::var_os("JAVA_HOME") {
            let candidate = Path::new(&home).join("bin").join(java_binary_name());
            if candidate.is_file() {
                debug!("Using runtime from JAVA_HOME: {}", candidate.display());
                return candidate;
            }
        }

        which::which(java_binary_name()).unwrap_or_else(|_| {
            warn!("java binary not found in PATH, relying on the process search path");
            PathBuf::from(java_binary_name())
        })
    }
}

fn java_binary_name() -> &'static str {
    if cfg!(windows) { "java.exe" } else { "java" }
}

/// Files and directories under the launcher root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherPaths {
    pub root: PathBuf,
    pub accounts_file: PathBuf,
    pub versions_file: PathBuf,
    pub install_dir: PathBuf,
    /// Download target; removed again after every install attempt.
    pub archive_path: PathBuf,
}

impl LauncherPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            accounts_file: root.join("accounts.json"),
            versions_file: root.join("versions.json"),
            install_dir: root.join("modpack"),
            archive_path: root.join("modpack.zip"),
            root,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult<T> = anyhow::Result<T>;

    #[test]
    fn missing_config_is_created_with_defaults() -> TestResult<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("launcher.toml");

        let config = LauncherConfig::load_or_create(&path)?;

        assert_eq!(config, LauncherConfig::default());
        let written = fs::read_to_string(&path)?;
        assert!(written.contains("artifact_url"));
        assert!(written.contains("kind = \"fixed\""));
        assert_eq!(LauncherConfig::load_or_create(&path)?, config);
        Ok(())
    }

    #[test]
    fn partial_config_keeps_other_defaults() -> TestResult<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("launcher.toml");
        fs::write(
            &path,
            r#"
data_dir = "/srv/aurora"
max_memory = "6G"

[version_source]
kind = "http"
url = "https://example.invalid/latest"
"#,
        )?;

        let config = LauncherConfig::load_or_create(&path)?;

        assert_eq!(config.max_memory, "6G");
        assert_eq!(config.loader_jar, "forge.jar");
        assert_eq!(config.artifact_url, DEFAULT_ARTIFACT_URL);
        assert_eq!(
            config.version_source,
            VersionSource::Http {
                url: "https://example.invalid/latest".to_string()
            }
        );
        assert_eq!(config.paths()?.install_dir, PathBuf::from("/srv/aurora/modpack"));
        Ok(())
    }

    #[test]
    fn malformed_config_is_an_error() -> TestResult<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("launcher.toml");
        fs::write(&path, "max_memory = [")?;
        assert!(LauncherConfig::load_or_create(&path).is_err());
        Ok(())
    }

    #[test]
    fn paths_hang_off_the_root() {
        let paths = LauncherPaths::new("/home/u/AuroraSMP");
        assert_eq!(paths.accounts_file, PathBuf::from("/home/u/AuroraSMP/accounts.json"));
        assert_eq!(paths.versions_file, PathBuf::from("/home/u/AuroraSMP/versions.json"));
        assert_eq!(paths.install_dir, PathBuf::from("/home/u/AuroraSMP/modpack"));
        assert_eq!(paths.archive_path, PathBuf::from("/home/u/AuroraSMP/modpack.zip"));
    }

    #[test]
    fn explicit_java_path_wins() {
        let config = LauncherConfig {
            java_path: Some(PathBuf::from("/opt/jdk/bin/java")),
            max_memory: "4G".to_string(),
            ..LauncherConfig::default()
        };
        let settings = config.launch_settings();
        assert_eq!(settings.java_path, PathBuf::from("/opt/jdk/bin/java"));
        assert_eq!(settings.max_memory, "4G");
    }
}
