//! ppchat server entry point.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load config, apply CLI overrides, init logging
//!  └─ SessionRegistry::bind()          -- listening socket
//!  └─ start threads
//!       ├─ accept loop     (ppchat-accept, one session thread per client)
//!       └─ console reader  (ppchat-console → BoundedCommandQueue)
//!  └─ dispatch loop on the main thread until /quit, /shutdown or a fatal
//!     accept error raises the quit flag
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ppchat_core::{ConsoleInput, PpchatConfig, SharedContext};
use ppchat_server::application::dispatch::{CommandOutcome, ServerConsole};
use ppchat_server::infrastructure::network::SessionRegistry;

/// How long the main loop waits for a console line before re-checking quit.
const CONSOLE_POLL_INTERVAL: Duration = Duration::from_millis(10);

// ── CLI argument definitions ──────────────────────────────────────────────────

/// ppchat server.
///
/// Accepts any number of TCP clients, logs every message they send and,
/// with echo back enabled, writes each message back to its sender.
#[derive(Debug, Parser)]
#[command(name = "ppchat-server", about = "Plain TCP chat server", version)]
struct Cli {
    /// Port to listen on.  Overrides `network.port` from the config file.
    #[arg(long, env = "PPCHAT_PORT")]
    port: Option<String>,

    /// Path to a TOML config file.  Defaults to the platform config dir.
    #[arg(long, env = "PPCHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Start with echo back enabled.
    #[arg(long)]
    echo: bool,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<(PpchatConfig, bool)> {
        let mut config = PpchatConfig::load(self.config.as_deref())
            .context("failed to load configuration")?;
        if let Some(port) = self.port {
            config.network.port = port;
        }
        Ok((config, self.echo))
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let (config, echo) = Cli::parse().into_config()?;

    // Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    let context = SharedContext::with_echo(echo);
    info!("Server has been started at {}.", context.started_at_text());

    let registry = SessionRegistry::bind(
        &config.network.port,
        Arc::clone(&context),
        config.session.clone(),
    )
    .with_context(|| format!("failed to listen on port {}", config.network.port))?;
    info!("listening on port {}", registry.local_addr().port());

    let console = ServerConsole::new(
        Arc::clone(&context),
        registry.active_sessions_handle(),
    );
    let accept_thread = registry.spawn().context("failed to start accept thread")?;

    // The reader is never joined: it may be blocked on stdin at exit.
    let input = ConsoleInput::from_config(&config.input);
    input
        .spawn_stdin_reader(Arc::clone(&context))
        .context("failed to start console reader")?;

    while !context.is_quit() {
        if let Some(line) = input.wait_console_line(CONSOLE_POLL_INTERVAL) {
            if console.handle_line(&line) == CommandOutcome::Quit {
                break;
            }
        }
    }

    let accepted = accept_thread
        .join()
        .map_err(|_| anyhow::anyhow!("accept thread panicked"))?;
    info!("Server has been shut down.");
    accepted.context("accept loop failed")
}

// ── Tests ─────────────────────────────────────────────────────────────────────
