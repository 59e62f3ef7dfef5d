//! Client console command parsing.
//!
//! A line starting with `/` is a command whose name is the first
//! space-separated token.  Any other line is sent to the server as-is
//! (an implicit `/send`).

use thiserror::Error;

/// A recognised client console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// `/connect <ip> [port]`.
    Connect { host: String, port: Option<String> },
    /// `/send <message>` or plain text.
    Send(String),
    /// `/send_file <filepath>`; recognised but not implemented.
    SendFile,
    /// `/disconnect`.
    Disconnect,
    /// `/status`.
    Status,
    /// `/help`.
    Help,
    /// `/shutdown` or `/quit`.
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("You didn't provide any arguments. Use: \"/connect <ip> [port]\".")]
    MissingConnectTarget,

    #[error("Message has to be at least 1 character long.")]
    EmptyMessage,

    #[error("Unknown command '{0}'. Type '/help' to see all available commands.")]
    Unknown(String),
}

impl ClientCommand {
    /// Parses one normalised console line.
    ///
    /// # Errors
    ///
    /// [`CommandError`] describing what is wrong with the line; its
    /// `Display` text is meant for the user.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        if !line.starts_with('/') {
            return Ok(Self::Send(line.to_string()));
        }

        let mut tokens = line.split(' ').filter(|t| !t.is_empty());
        let name = tokens.next().unwrap_or(line);

        match name {
            "/connect" => {
                let host = tokens.next().ok_or(CommandError::MissingConnectTarget)?;
                Ok(Self::Connect {
                    host: host.to_string(),
                    port: tokens.next().map(str::to_string),
                })
            }
            "/send" => match line.strip_prefix("/send ") {
                Some(message) if !message.is_empty() => Ok(Self::Send(message.to_string())),
                _ => Err(CommandError::EmptyMessage),
            },
            "/send_file" => Ok(Self::SendFile),
            "/disconnect" => Ok(Self::Disconnect),
            "/status" => Ok(Self::Status),
            "/help" => Ok(Self::Help),
            "/shutdown" | "/quit" => Ok(Self::Shutdown),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

/// Splits a `--connect` value into host and optional port.
///
/// Accepts `host`, `host:port`, `[v6]` and `[v6]:port`.  A bare IPv6
/// address such as `::1` is taken as a host without port.
pub fn parse_target(target: &str) -> (String, Option<String>) {
    if let Some(rest) = target.strip_prefix('[') {
        if let Some((host, after)) = rest.split_once(']') {
            let port = after.strip_prefix(':').filter(|p| !p.is_empty());
            return (host.to_string(), port.map(str::to_string));
        }
    }

    match target.split_once(':') {
        Some((host, port)) if !port.contains(':') && !port.is_empty() => {
            (host.to_string(), Some(port.to_string()))
        }
        _ => (target.to_string(), None),
    }
}

pub const HELP_TEXT: &str = "Available commands:

\tNote:
\t<arg> - Required argument.
\t[arg] - Optional argument.

\t/shutdown, /quit       -  Shuts down the client.
\t/status                -  Prints runtime information.
\t/connect <ip> [port]   -  Connects to specified server.
\t/send <message>        -  Sends message to connected server.
\t/send_file <filepath>  -  Sends file to connected server.
\t/disconnect            -  Disconnects from connected server.
\t/help                  -  Prints help message.";
