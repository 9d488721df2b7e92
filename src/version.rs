//! Version markers, comparison and the persisted installed-version record
//!
//! A marker is an opaque string compared for byte equality only. There is no
//! ordering: any difference between installed and latest means an update.

use std::fmt;
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{LauncherError, Result};
use crate::fsutil;

/// Opaque version identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionMarker(String);

impl VersionMarker {
    /// Installed marker when nothing has ever been installed.
    pub const NONE: &'static str = "none";
    /// Latest marker before the remote source has been resolved.
    pub const UNKNOWN: &'static str = "unknown";

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn none() -> Self {
        Self::new(Self::NONE)
    }

    pub fn unknown() -> Self {
        Self::new(Self::UNKNOWN)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_none(&self) -> bool {
        self.0 == Self::NONE
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == Self::UNKNOWN
    }
}

impl fmt::Display for VersionMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of comparing the installed marker with the latest one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionStatus {
    UpToDate,
    UpdateAvailable,
}

/// Compare installed content against the latest marker.
pub fn compare(installed: &VersionMarker, latest: &VersionMarker) -> VersionStatus {
    if installed.as_str().as_bytes() == latest.as_str().as_bytes() {
        VersionStatus::UpToDate
    } else {
        VersionStatus::UpdateAvailable
    }
}

/// On-disk record of the installed version (`versions.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    pub installed_version: VersionMarker,
}

impl Default for VersionRecord {
    fn default() -> Self {
        Self {
            installed_version: VersionMarker::none(),
        }
    }
}

impl VersionRecord {
    /// Read the record; a missing file means nothing is installed.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| LauncherError::json("read_version_record", path, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No version record at {}, assuming nothing installed", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(LauncherError::io("read_version_record", path, e)),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| LauncherError::json("write_version_record", path, e))?;
        fsutil::write_atomic(path, json.as_bytes())?;
        info!("Recorded installed version {}", self.installed_version);
        Ok(())
    }
}

/// Where the latest marker comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum VersionSource {
    /// Marker pinned in configuration.
    Fixed { version: String },
    /// Plain GET; body is `{"version": "..."}` or the bare marker.
    Http { url: String },
}

impl Default for VersionSource {
    fn default() -> Self {
        Self::Fixed {
            version: "1.0".to_string(),
        }
    }
}

#[derive(Deserialize)]
struct VersionDocument {
    version: String,
}

impl VersionSource {
    fn name(&self) -> String {
        match self {
            Self::Fixed { .. } => "fixed".to_string(),
            Self::Http { url } => url.clone(),
        }
    }

    /// Resolve the latest marker. Never cached; every call asks the source again.
    pub async fn resolve(&self, client: &reqwest::Client) -> Result<VersionMarker> {
        let raw = match self {
            Self::Fixed { version } => version.clone(),
            Self::Http { url } => {
                let body = client
                    .get(url)
                    .send()
                    .await
                    .and_then(reqwest::Response::error_for_status)
                    .map_err(|e| LauncherError::network(url.as_str(), e))?
                    .text()
                    .await
                    .map_err(|e| LauncherError::network(url.as_str(), e))?;
                parse_version_body(&body)
            }
        };

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(LauncherError::InvalidVersion {
                source_name: self.name(),
                reason: "empty version string",
            });
        }
        Ok(VersionMarker::new(trimmed))
    }
}

fn parse_version_body(body: &str) -> String {
    match serde_json::from_str::<VersionDocument>(body) {
        Ok(doc) => doc.version,
        Err(_) => body.to_string(),
    }
}
