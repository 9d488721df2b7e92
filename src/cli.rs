use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "Aurora SMP modpack updater and launcher")]
pub struct Args {
    /// Path to configuration file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Sub‑commands (play, check, etc.)
    #[command(subcommand)]
    pub sub: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Check for updates, install if needed and launch (default if no sub‑command)
    Play,
    /// Resolve installed and latest versions (Exit 0 = up to date, 1 = update available)
    Check,
    /// Show paths, installed version and current account
    Status,
    /// Manage saved accounts
    Accounts {
        #[command(subcommand)]
        action: AccountCmd,
    },
}

#[derive(Subcommand, Debug)]
pub enum AccountCmd {
    /// List saved accounts (current one marked with *)
    List,
    /// Add a local account with a generated uuid
    AddOffline { name: String },
    /// Add an account with identity-provider credentials
    AddPremium {
        name: String,
        #[arg(long)]
        uuid: String,
        #[arg(long)]
        access_token: String,
    },
    /// Make an account current, by id or display name
    Select { account: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_play() -> anyhow::Result<()> {
        let args = Args::try_parse_from(["aurora-launcher"])?;
        assert!(args.sub.is_none());
        assert!(args.config.is_none());
        Ok(())
    }

    #[test]
    fn premium_account_flags_parse() -> anyhow::Result<()> {
        let args = Args::try_parse_from([
            "aurora-launcher",
            "accounts",
            "add-premium",
            "Alex",
            "--uuid",
            "u1",
            "--access-token",
            "t1",
            "--config",
            "/tmp/launcher.toml",
        ])?;
        assert_eq!(args.config, Some(PathBuf::from("/tmp/launcher.toml")));
        match args.sub {
            Some(Cmd::Accounts {
                action:
                    AccountCmd::AddPremium {
                        name,
                        uuid,
                        access_token,
                    },
            }) => assert_eq!((name.as_str(), uuid.as_str(), access_token.as_str()), ("Alex", "u1", "t1")),
            other => anyhow::bail!("unexpected parse: {other:?}"),
        }
        Ok(())
    }
}
