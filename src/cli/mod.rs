//! CLI subcommand definitions and handlers.
//!
//! Uses clap derive to define the subcommand hierarchy:
//! - `start` (default) -- run the poll server
//! - `config show|path` -- inspect configuration
//! - `version` -- print build/version info

use crate::channels::{DynChatSource, TwitchChatSource};
use crate::config;
use crate::logging;
use crate::polls::create_engine;
use crate::server;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;

/// Short-lived Twitch chat polls over HTTP.
#[derive(Parser, Debug)]
#[command(
    name = "chatpoll",
    version = env!("CARGO_PKG_VERSION"),
    about = "Run short-lived polls against Twitch chat"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the poll server (default when no subcommand is given).
    Start,

    /// Inspect configuration.
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Print version, build date, and git commit information.
    Version,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the fully loaded configuration (secrets redacted) as JSON.
    Show,

    /// Print the resolved configuration file path.
    Path,
}

/// Dispatch a parsed command line
pub async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command.unwrap_or(Command::Start) {
        Command::Start => handle_start().await,
        Command::Config(ConfigCommand::Show) => handle_config_show(),
        Command::Config(ConfigCommand::Path) => {
            handle_config_path();
            Ok(())
        }
        Command::Version => {
            handle_version();
            Ok(())
        }
    }
}

/// Run the `start` subcommand.
pub async fn handle_start() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = config::load_config()?;
    logging::init_tracing(&cfg.logging)?;

    let twitch = TwitchChatSource::new(cfg.twitch.clone());
    info!(nick = %twitch.nick(), url = %cfg.twitch.url, "Using Twitch chat");
    let source: DynChatSource = Arc::new(twitch);

    let engine = create_engine(source, cfg.polls.clone());
    server::run(&cfg.server.address(), engine).await?;
    Ok(())
}

/// Run the `config show` subcommand.
pub fn handle_config_show() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = config::load_config()?;
    let pretty = serde_json::to_string_pretty(&config::redacted(&cfg)?)?;
    println!("{}", pretty);
    Ok(())
}

/// Run the `config path` subcommand.
pub fn handle_config_path() {
    println!("{}", config::get_config_path().display());
}

/// Run the `version` subcommand.
pub fn handle_version() {
    println!("chatpoll {}", env!("CARGO_PKG_VERSION"));
    println!("  Build date: {}", env!("CHATPOLL_BUILD_DATE"));
    println!("  Git commit: {}", env!("CHATPOLL_GIT_HASH"));
    println!(
        "  Platform:   {} ({})",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
}
