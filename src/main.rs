mod cli;
mod runners;
mod wizard;

use anyhow::Result;
use aurora_launcher::LauncherConfig;
use clap::Parser;
use log::error;

fn main() {
    // Initialize logger with custom format
    env_logger::Builder::new()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("FATAL: Failed to create Tokio runtime: {e}");
            std::process::exit(1);
        }
    };
    match rt.block_on(real_main()) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{e:#}");
            std::process::exit(1);
        }
    }
}

async fn real_main() -> Result<i32> {
    let args = cli::Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => LauncherConfig::default_path()?,
    };
    let config = LauncherConfig::load_or_create(&config_path)?;

    match args.sub.unwrap_or(cli::Cmd::Play) {
        cli::Cmd::Play => {
            runners::run_play(&config).await?;
            Ok(0)
        }
        cli::Cmd::Check => {
            let up_to_date = runners::run_check(&config).await?;
            Ok(if up_to_date { 0 } else { 1 })
        }
        cli::Cmd::Status => {
            runners::show_status(&config, &config_path)?;
            Ok(0)
        }
        cli::Cmd::Accounts { action } => {
            runners::run_accounts(&config, action)?;
            Ok(0)
        }
    }
}
