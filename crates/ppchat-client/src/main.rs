//! ppchat client entry point.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load config, init logging
//!  └─ console reader thread (ppchat-console → BoundedCommandQueue)
//!  └─ optional auto-connect from --connect
//!  └─ dispatch loop on the main thread until /quit or /shutdown
//!       └─ ClientConsole ── TcpConnector ── ClientSession
//!                                            ├─ write half (main thread)
//!                                            └─ receive thread
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ppchat_client::application::commands::{parse_target, ClientCommand};
use ppchat_client::application::dispatch::{ClientConsole, CommandOutcome};
use ppchat_client::infrastructure::network::TcpConnector;
use ppchat_core::{ConsoleInput, PpchatConfig, SharedContext};

/// How long the main loop waits for a console line before re-checking quit.
const CONSOLE_POLL_INTERVAL: Duration = Duration::from_millis(10);

// ── CLI argument definitions ──────────────────────────────────────────────────

/// ppchat client.
///
/// Connects to one ppchat server at a time and sends every line typed on
/// the console.  Type `/help` once running for the list of commands.
#[derive(Debug, Parser)]
#[command(name = "ppchat-client", about = "Plain TCP chat client", version)]
struct Cli {
    /// Path to a TOML config file.  Defaults to the platform config dir.
    #[arg(long, env = "PPCHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Connect on start-up, as `ip`, `ip:port` or `[ipv6]:port`.
    #[arg(long, value_name = "IP[:PORT]")]
    connect: Option<String>,
}

impl Cli {
    /// The `/connect` command equivalent to `--connect`, if given.
    fn startup_command(&self) -> Option<ClientCommand> {
        self.connect.as_deref().map(|target| {
            let (host, port) = parse_target(target);
            ClientCommand::Connect { host, port }
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config =
        PpchatConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    // Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    let context = SharedContext::new();
    info!("Client has been started at {}.", context.started_at_text());

    // The reader is never joined: it may be blocked on stdin at exit.
    let input = ConsoleInput::from_config(&config.input);
    input
        .spawn_stdin_reader(Arc::clone(&context))
        .context("failed to start console reader")?;

    let connector = TcpConnector::new(Arc::clone(&context), config.session.clone());
    let mut console = ClientConsole::new(Arc::clone(&context), connector, &config.network.port);

    if let Some(command) = cli.startup_command() {
        console.execute(command);
    }

    while !context.is_quit() {
        if let Some(line) = input.wait_console_line(CONSOLE_POLL_INTERVAL) {
            if console.handle_line(&line) == CommandOutcome::Quit {
                break;
            }
        }
    }

    console.shutdown();
    info!("Client has been shut down.");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_without_connect_has_no_startup_command() {
        let cli = Cli::parse_from(["ppchat-client"]);
        assert_eq!(cli.startup_command(), None);
    }

    #[test]
    fn test_cli_connect_becomes_connect_command() {
        // Arrange
        let cli = Cli::parse_from(["ppchat-client", "--connect", "[::1]:4000"]);

        // Act
        let command = cli.startup_command();

        // Assert
        assert_eq!(
            command,
            Some(ClientCommand::Connect {
                host: "::1".to_string(),
                port: Some("4000".to_string()),
            })
        );
    }
}
