//! Server console command parsing.
//!
//! Lines starting with `/` are commands; anything else typed on the server
//! console is ignored.  Matching is exact, so `/status now` is unknown.

use thiserror::Error;

/// A recognised server console command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerCommand {
    /// `/shutdown` or `/quit`.
    Shutdown,
    /// `/status`.
    Status,
    /// `/echo_back`.
    EchoBack,
    /// `/help`.
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Unknown command '{0}'. Type '/help' to see all available commands.")]
    Unknown(String),
}

impl ServerCommand {
    /// Parses one normalised console line.
    ///
    /// Returns `Ok(None)` for lines that are not commands.
    ///
    /// # Errors
    ///
    /// [`CommandError::Unknown`] for a `/`-prefixed line that matches no
    /// command.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        if !line.starts_with('/') {
            return Ok(None);
        }

        let command = match line {
            "/shutdown" | "/quit" => Self::Shutdown,
            "/status" => Self::Status,
            "/echo_back" => Self::EchoBack,
            "/help" => Self::Help,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}

pub const HELP_TEXT: &str = "Available commands:

\tNote:
\t<arg> - Required argument.
\t[arg] - Optional argument.

\t/shutdown, /quit   -  Shuts down the server.
\t/status            -  Prints runtime information.
\t/echo_back         -  Enables or disables message echo back.
\t                      Received messages will be sent back.
\t/help              -  Prints help message.";
