//! Executes server console commands.
//!
//! [`ServerConsole::handle_line`] is called by the main loop for every line
//! the console reader queued.  Output goes to the log through `tracing`.

use std::sync::Arc;

use ppchat_core::context::format_time_span;
use ppchat_core::SharedContext;
use tracing::{debug, info};

use super::commands::{ServerCommand, HELP_TEXT};

/// Source of the live session count shown by `/status`.
#[cfg_attr(test, mockall::automock)]
pub trait SessionCounter: Send + Sync {
    fn active_sessions(&self) -> usize;
}

/// What the main loop should do after a line was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Continue,
    Quit,
}

/// Server-side console command dispatcher.
pub struct ServerConsole<S: SessionCounter> {
    context: Arc<SharedContext>,
    sessions: S,
}

impl<S: SessionCounter> ServerConsole<S> {
    pub fn new(context: Arc<SharedContext>, sessions: S) -> Self {
        Self { context, sessions }
    }

    pub fn handle_line(&self, line: &str) -> CommandOutcome {
        match ServerCommand::parse(line) {
            Ok(Some(command)) => self.execute(command),
            Ok(None) => {
                debug!("ignoring non-command console input");
                CommandOutcome::Continue
            }
            Err(e) => {
                info!("{e}");
                CommandOutcome::Continue
            }
        }
    }

    pub fn execute(&self, command: ServerCommand) -> CommandOutcome {
        match command {
            ServerCommand::Shutdown => {
                self.context.request_quit();
                info!("Shutting down the server...");
                return CommandOutcome::Quit;
            }
            ServerCommand::Status => info!("{}", self.status_report()),
            ServerCommand::EchoBack => {
                let enabled = self.context.toggle_echo();
                info!("Echo back has been {}.", enabled_text(enabled));
            }
            ServerCommand::Help => info!("{HELP_TEXT}"),
        }
        CommandOutcome::Continue
    }

    /// Multi-line runtime summary printed by `/status`.
    pub fn status_report(&self) -> String {
        let stats = self.context.stats().snapshot();
        format!(
            "Server has been started at {} and is running for {}.\n\
             Network info:\n\
             \tActive sessions: {}\n\
             \tMessages:\n\
             \t\t   received: {}\n\
             \t\t       sent: {}\n\
             \t\techoed back: {}\n\
             \tBytes:\n\
             \t\t   received: {}\n\
             \t\t       sent: {}\n\
             \t\techoed back: {}\n\
             Echo back is {}.",
            self.context.started_at_text(),
            format_time_span(self.context.uptime()),
            self.sessions.active_sessions(),
            stats.messages_received,
            stats.messages_sent,
            stats.messages_echoed_back,
            stats.bytes_received,
            stats.bytes_sent,
            stats.bytes_echoed_back,
            enabled_text(self.context.echo_enabled()),
        )
    }
}

fn enabled_text(enabled: bool) -> &'static str {
    if enabled {
        "enabled"
    } else {
        "disabled"
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
