//! Error taxonomy shared by the client and server.
//!
//! Setup failures (resolve, create, bind, listen, accept) are fatal for the
//! process.  Per-connection failures (`ReceiveFailed`, `SendFailed` on the
//! server side) stay inside the session that hit them.  `QueueFull` and
//! `QueueEmpty` are advisory and never shown to the user.

use std::fmt;
use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// How a failed receive call is classified by the session loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveFailure {
    /// The peer reset the connection (RST).
    PeerReset,
    /// The connection was aborted on the local side or by the network stack.
    PeerAborted,
    /// The call was cut short by a local shutdown or the read timeout.
    /// Not an error: the loop re-checks its stop condition.
    Interrupted,
    /// Anything else.
    Other,
}

impl ReceiveFailure {
    /// Maps an I/O error from a receive call onto the session taxonomy.
    pub fn classify(error: &io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::ConnectionReset => Self::PeerReset,
            io::ErrorKind::ConnectionAborted => Self::PeerAborted,
            io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                Self::Interrupted
            }
            _ => Self::Other,
        }
    }
}

impl fmt::Display for ReceiveFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::PeerReset => "connection reset by peer",
            Self::PeerAborted => "connection aborted",
            Self::Interrupted => "interrupted",
            Self::Other => "receive error",
        };
        f.write_str(text)
    }
}

/// Errors raised by the sockets layer and the session engine.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("couldn't resolve address '{host}:{port}': {}", describe_os_error(.source))]
    AddressResolutionFailed {
        host: String,
        port: String,
        #[source]
        source: io::Error,
    },

    #[error("couldn't create socket: {}", describe_os_error(.source))]
    SocketCreateFailed {
        #[source]
        source: io::Error,
    },

    #[error("couldn't bind listen socket on {addr}: {}", describe_os_error(.source))]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("couldn't listen on {addr}: {}", describe_os_error(.source))]
    ListenFailed {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("couldn't accept client connection: {}", describe_os_error(.source))]
    AcceptFailed {
        #[source]
        source: io::Error,
    },

    #[error("couldn't connect to server '{host}:{port}': {}", describe_os_error(.source))]
    ConnectFailed {
        host: String,
        port: String,
        #[source]
        source: io::Error,
    },

    #[error("couldn't send message to '{peer}': {}", describe_os_error(.source))]
    SendFailed {
        peer: String,
        #[source]
        source: io::Error,
    },

    #[error("couldn't receive network data from '{peer}' ({kind}): {}", describe_os_error(.source))]
    ReceiveFailed {
        peer: String,
        kind: ReceiveFailure,
        #[source]
        source: io::Error,
    },

    #[error("couldn't disconnect from '{peer}': {}", describe_os_error(.source))]
    DisconnectFailed {
        peer: String,
        #[source]
        source: io::Error,
    },

    #[error("not connected")]
    NotConnected,

    #[error("command queue is full")]
    QueueFull,

    #[error("command queue is empty")]
    QueueEmpty,
}

impl NetError {
    /// Returns `true` for the advisory queue conditions that are never reported.
    pub fn is_advisory(&self) -> bool {
        matches!(self, Self::QueueFull | Self::QueueEmpty)
    }
}

/// Renders an I/O error as its human-readable description followed by the
/// platform error code, when one exists.
///
/// `std::io::Error`'s own `Display` already appends `(os error N)` for OS
/// errors, so this only normalises synthetic errors (no code) and keeps the
/// format stable for log scraping.
pub fn describe_os_error(error: &io::Error) -> String {
    match error.raw_os_error() {
        Some(code) => {
            let text = error.to_string();
            if text.contains("os error") {
                text
            } else {
                format!("{text} (os error {code})")
            }
        }
        None => error.to_string(),
    }
}
