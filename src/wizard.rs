//! Interactive account prompts

use anyhow::{Result, anyhow};
use inquire::{Select, Text};

use aurora_launcher::{Account, LauncherError};

const ADD_OFFLINE: &str = "➕ Add offline account";

/// What the user picked when an account was required.
#[derive(Debug, Clone)]
pub enum AccountChoice {
    /// Id of a saved account.
    Existing(String),
    Create(Account),
}

/// Ask for an account: pick a saved one or create an offline one.
///
/// Blocking; run it on the blocking pool from async code.
pub fn prompt_account(known: &[Account]) -> Result<AccountChoice> {
    if known.is_empty() {
        return prompt_offline_account().map(AccountChoice::Create);
    }

    let mut options: Vec<String> = known.iter().map(describe).collect();
    options.push(ADD_OFFLINE.to_string());

    let picked = Select::new("Play as:", options)
        .with_help_message("Saved accounts are stored in accounts.json")
        .raw_prompt()
        .map_err(|e| anyhow!("Prompt cancelled: {}", e))?;

    match known.get(picked.index) {
        Some(account) => Ok(AccountChoice::Existing(account.id().to_string())),
        None => prompt_offline_account().map(AccountChoice::Create),
    }
}

fn prompt_offline_account() -> Result<Account> {
    loop {
        let name = Text::new("Username:")
            .with_help_message("Offline accounts get a generated uuid and no access token")
            .prompt()
            .map_err(|e| anyhow!("Prompt cancelled: {}", e))?;

        match Account::offline(&name) {
            Ok(account) => return Ok(account),
            Err(LauncherError::InvalidUsername(_)) => {
                eprintln!("⚠ Usernames cannot be empty or contain spaces");
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// `Name (premium)` or `Name (offline)`.
pub fn describe(account: &Account) -> String {
    let kind = if account.is_premium() { "premium" } else { "offline" };
    format!("{} ({kind})", account.display_name())
}
