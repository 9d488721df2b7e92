//! Known identities and the current selection
//!
//! The store keeps accounts in insertion order and persists the whole list plus
//! the id of the current account to `accounts.json` whenever it changes.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LauncherError, Result};
use crate::fsutil;

/// A launchable identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    id: String,
    display_name: String,
    uuid: String,
    access_token: String,
    is_premium: bool,
}

impl Account {
    /// Local identity with a synthesised uuid and no access token.
    pub fn offline(display_name: &str) -> Result<Self> {
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            display_name: validate_name(display_name)?,
            // Same shape as identity-provider uuids: 32 hex digits, no dashes.
            uuid: Uuid::new_v4().simple().to_string(),
            access_token: String::new(),
            is_premium: false,
        })
    }

    /// Identity issued by the external identity provider.
    pub fn premium(display_name: &str, uuid: &str, access_token: &str) -> Result<Self> {
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            display_name: validate_name(display_name)?,
            uuid: uuid.to_string(),
            access_token: access_token.to_string(),
            is_premium: true,
        })
    }

    /// Fill in credentials after an identity exchange. Offline accounts keep theirs.
    pub fn set_credentials(&mut self, uuid: &str, access_token: &str) -> bool {
        if !self.is_premium {
            return false;
        }
        self.uuid = uuid.to_string();
        self.access_token = access_token.to_string();
        true
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn is_premium(&self) -> bool {
        self.is_premium
    }
}

fn validate_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
        return Err(LauncherError::InvalidUsername(name.to_string()));
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountsRecord {
    #[serde(default)]
    accounts: Vec<Account>,
    #[serde(default)]
    current: Option<String>,
}

/// In-memory account list backed by `accounts.json`.
#[derive(Debug)]
pub struct AccountStore {
    path: PathBuf,
    accounts: Vec<Account>,
    current: Option<String>,
}

impl AccountStore {
    /// Empty store that will persist to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            accounts: Vec::new(),
            current: None,
        }
    }

    /// Read the store from disk; a missing file is an empty list.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let record = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str::<AccountsRecord>(&content)
                .map_err(|e| LauncherError::json("read_accounts", &path, e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No accounts file at {}", path.display());
                AccountsRecord::default()
            }
            Err(e) => return Err(LauncherError::io("read_accounts", &path, e)),
        };

        let current = match record.current {
            Some(id) if record.accounts.iter().any(|a| a.id == id) => Some(id),
            dangling => {
                if let Some(id) = dangling {
                    warn!("Current account {id} not found in {}, using first account", path.display());
                }
                record.accounts.first().map(|a| a.id.clone())
            }
        };

        info!("Loaded {} account(s) from {}", record.accounts.len(), path.display());
        Ok(Self {
            path,
            accounts: record.accounts,
            current,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accounts in insertion order.
    pub fn list(&self) -> &[Account] {
        &self.accounts
    }

    pub fn current(&self) -> Option<&Account> {
        let id = self.current.as_deref()?;
        self.accounts.iter().find(|a| a.id == id)
    }

    /// Append an account, make it current and persist.
    ///
    /// Nothing changes in memory when the write fails.
    pub fn add(&mut self, account: Account) -> Result<&Account> {
        info!(
            "Adding {} account {}",
            if account.is_premium { "premium" } else { "offline" },
            account.display_name
        );
        let mut accounts = self.accounts.clone();
        let current = Some(account.id.clone());
        accounts.push(account);
        self.write_record(accounts.as_slice(), current.as_deref())?;

        self.accounts = accounts;
        self.current = current;
        self.current().ok_or_else(|| LauncherError::UnknownAccount(String::new()))
    }

    /// Make an existing account current, matching on id first, then display name.
    pub fn select(&mut self, id_or_name: &str) -> Result<&Account> {
        let id = self
            .find(id_or_name)
            .map(|a| a.id.clone())
            .ok_or_else(|| LauncherError::UnknownAccount(id_or_name.to_string()))?;
        self.write_record(&self.accounts, Some(id.as_str()))?;
        self.current = Some(id);
        self.current()
            .ok_or_else(|| LauncherError::UnknownAccount(id_or_name.to_string()))
    }

    pub fn find(&self, id_or_name: &str) -> Option<&Account> {
        self.accounts
            .iter()
            .find(|a| a.id == id_or_name)
            .or_else(|| self.find_by_name(id_or_name))
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.display_name == name)
    }

    pub fn persist(&self) -> Result<()> {
        self.write_record(&self.accounts, self.current.as_deref())
    }

    /// Write a candidate record; callers commit it to `self` only on success.
    fn write_record(&self, accounts: &[Account], current: Option<&str>) -> Result<()> {
        let record = AccountsRecord {
            accounts: accounts.to_vec(),
            current: current.map(str::to_string),
        };
        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| LauncherError::json("write_accounts", &self.path, e))?;
        fsutil::write_atomic(&self.path, json.as_bytes())
    }
}
