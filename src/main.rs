//! berth - CLI entry point that dispatches to subcommands

use berth::cli::{Cli, Commands};
use berth::config::{Config, ConfigManager};
use berth::error::{BerthError, BerthResult};
use berth::orchestration::shutdown_token;
use clap::Parser;
use console::style;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> BerthResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };

    let local_config_path = if cli.no_local {
        None
    } else {
        let cwd = std::env::current_dir()
            .map_err(|e| BerthError::io("getting current directory", e))?;
        ConfigManager::find_local_config(&cwd)
    };

    let config = config_manager
        .load_merged(local_config_path.as_deref())
        .await?;

    init_logging(cli.verbose, &config);
    if let Some(path) = &local_config_path {
        debug!("Found local config: {}", path.display());
    }

    // Ctrl-C aborts pending external commands and stops `run`
    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown_token().cancel();
        }
    });

    match cli.command {
        Commands::Pull(args) => berth::cli::commands::pull(args, &config).await,
        Commands::Export(args) => berth::cli::commands::export(args, &config).await,
        Commands::Key(args) => berth::cli::commands::key(args, &config).await,
        Commands::Run(args) => berth::cli::commands::run(args, &config).await,
        Commands::Config(args) => {
            berth::cli::commands::config(args, &config, &config_manager).await
        }
    }
}

/// Install the subscriber: 0 = warn, 1 = info, 2+ = debug
fn init_logging(verbose: u8, config: &Config) {
    let filter = match verbose {
        0 => EnvFilter::new("berth=warn"),
        1 => EnvFilter::new("berth=info"),
        _ => EnvFilter::new("berth=debug"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if config.general.log_format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}
