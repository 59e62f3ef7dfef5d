//! Executes client console commands.
//!
//! The client talks to one server at a time.  [`ClientConsole`] owns that
//! connection (if any) and applies each console line to it:
//!
//! ```text
//!   Disconnected ──/connect ok──► Connected ──/disconnect──► Disconnected
//!        ▲                           │
//!        └──── send failure, or ─────┘
//!              server closed the connection
//! ```
//!
//! A failed send is scoped to the connection: it is logged, the connection
//! is torn down and the client keeps running.

use std::sync::Arc;

use ppchat_core::context::format_time_span;
use ppchat_core::{NetError, SharedContext};
use tracing::{error, info, warn};

use super::commands::{ClientCommand, HELP_TEXT};

/// One live connection to a server.
pub trait ChatConnection: Send {
    /// `host:port` as typed by the user.
    fn peer(&self) -> &str;

    /// Sends all of `bytes`, returning how many were written.
    fn send(&mut self, bytes: &[u8]) -> Result<usize, NetError>;

    /// `true` once the server side has gone away.
    fn is_closed(&self) -> bool;

    /// Shuts the connection down and waits for its receive thread.
    fn shutdown(&mut self) -> Result<(), NetError>;
}

/// Opens connections.
pub trait Connector {
    fn connect(&self, host: &str, port: &str) -> Result<Box<dyn ChatConnection>, NetError>;
}

/// What the main loop should do after a line was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Continue,
    Quit,
}

/// Client-side console command dispatcher.
pub struct ClientConsole<C: Connector> {
    context: Arc<SharedContext>,
    connector: C,
    default_port: String,
    connection: Option<Box<dyn ChatConnection>>,
}

impl<C: Connector> ClientConsole<C> {
    pub fn new(context: Arc<SharedContext>, connector: C, default_port: impl Into<String>) -> Self {
        Self {
            context,
            connector,
            default_port: default_port.into(),
            connection: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// `host:port` of the current server, if connected.
    pub fn connected_peer(&self) -> Option<&str> {
        self.connection.as_deref().map(|c| c.peer())
    }

    pub fn handle_line(&mut self, line: &str) -> CommandOutcome {
        self.drop_closed_connection();
        match ClientCommand::parse(line) {
            Ok(command) => self.execute(command),
            Err(e) => {
                info!("{e}");
                CommandOutcome::Continue
            }
        }
    }

    pub fn execute(&mut self, command: ClientCommand) -> CommandOutcome {
        match command {
            ClientCommand::Connect { host, port } => self.connect(&host, port.as_deref()),
            ClientCommand::Send(message) => self.send(&message),
            ClientCommand::SendFile => error!("Not implemented yet."),
            ClientCommand::Disconnect => self.disconnect(),
            ClientCommand::Status => info!("{}", self.status_report()),
            ClientCommand::Help => info!("{HELP_TEXT}"),
            ClientCommand::Shutdown => {
                self.context.request_quit();
                info!("Shutting down the client...");
                return CommandOutcome::Quit;
            }
        }
        CommandOutcome::Continue
    }

    fn connect(&mut self, host: &str, port: Option<&str>) {
        if let Some(peer) = self.connected_peer() {
            info!("You are already connected to server '{peer}'.");
            return;
        }

        let port = port.unwrap_or(self.default_port.as_str());
        match self.connector.connect(host, port) {
            Ok(connection) => {
                info!("Connected to server '{}'.", connection.peer());
                self.connection = Some(connection);
            }
            Err(e) => error!("{e}"),
        }
    }

    fn send(&mut self, message: &str) {
        let Some(connection) = self.connection.as_mut() else {
            info!("You are not connected to any server.");
            return;
        };

        match connection.send(message.as_bytes()) {
            Ok(sent) => info!("Sent message: \"{message}\" ({sent} bytes)."),
            Err(e) => {
                error!("{e}");
                self.close_connection();
            }
        }
    }

    fn disconnect(&mut self) {
        match self.connection.as_deref() {
            Some(connection) => {
                let peer = connection.peer().to_string();
                self.close_connection();
                info!("Disconnected from '{peer}'.");
            }
            None => info!("You are not connected to any server."),
        }
    }

    fn close_connection(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.shutdown() {
                warn!("{e}");
            }
        }
    }

    fn drop_closed_connection(&mut self) {
        if self.connection.as_deref().is_some_and(|c| c.is_closed()) {
            if let Some(peer) = self.connected_peer() {
                info!("Connection with '{peer}' is gone.");
            }
            self.close_connection();
        }
    }

    /// Disconnects from the current server, if any.  Called on exit.
    pub fn shutdown(&mut self) {
        self.close_connection();
    }

    /// Multi-line runtime summary printed by `/status`.
    pub fn status_report(&self) -> String {
        let stats = self.context.stats().snapshot();
        let connection = match self.connected_peer() {
            Some(peer) => format!("Currently connected to server '{peer}'."),
            None => "Currently not connected to any server.".to_string(),
        };
        format!(
            "Client has been started at {} and is running for {}.\n\
             Network info:\n\
             \tMessages:\n\
             \t\t   received: {}\n\
             \t\t       sent: {}\n\
             \tBytes:\n\
             \t\t   received: {}\n\
             \t\t       sent: {}\n\
             {}",
            self.context.started_at_text(),
            format_time_span(self.context.uptime()),
            stats.messages_received,
            stats.messages_sent,
            stats.bytes_received,
            stats.bytes_sent,
            connection,
        )
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::mock::MockConnector;

    fn console() -> (ClientConsole<MockConnector>, MockConnector, Arc<SharedContext>) {
        let connector = MockConnector::new();
        let ctx = SharedContext::new();
        let console = ClientConsole::new(Arc::clone(&ctx), connector.clone(), "1337");
        (console, connector, ctx)
    }

    #[test]
    fn test_connect_uses_default_port_when_omitted() {
        // Arrange
        let (mut console, connector, _ctx) = console();

        // Act
        console.handle_line("/connect ::1");

        // Assert
        assert_eq!(connector.connect_calls(), vec![("::1".to_string(), "1337".to_string())]);
        assert_eq!(console.connected_peer(), Some("::1:1337"));
    }

    #[test]
    fn test_connect_refused_while_already_connected() {
        let (mut console, connector, _ctx) = console();

        console.handle_line("/connect 10.0.0.1 4000");
        console.handle_line("/connect 10.0.0.2");

        assert_eq!(connector.connect_calls().len(), 1);
        assert_eq!(console.connected_peer(), Some("10.0.0.1:4000"));
    }

    #[test]
    fn test_failed_connect_leaves_client_disconnected() {
        let (mut console, connector, _ctx) = console();
        connector.fail_connects(true);

        console.handle_line("/connect 10.0.0.1");

        assert!(!console.is_connected());
    }

    #[test]
    fn test_plain_text_and_send_command_reach_the_server() {
        // Arrange
        let (mut console, connector, _ctx) = console();
        console.handle_line("/connect ::1");

        // Act
        console.handle_line("hello");
        console.handle_line("/send world");

        // Assert
        assert_eq!(connector.sent(), vec![b"hello".to_vec(), b"world".to_vec()]);
    }

    #[test]
    fn test_send_while_disconnected_sends_nothing() {
        let (mut console, connector, _ctx) = console();

        assert_eq!(console.handle_line("hello"), CommandOutcome::Continue);

        assert!(connector.sent().is_empty());
    }

    #[test]
    fn test_send_failure_disconnects_but_keeps_running() {
        // Arrange
        let (mut console, connector, ctx) = console();
        console.handle_line("/connect ::1");
        connector.fail_sends(true);

        // Act
        let outcome = console.handle_line("hello");

        // Assert
        assert_eq!(outcome, CommandOutcome::Continue);
        assert!(!console.is_connected());
        assert!(!ctx.is_quit());
        assert_eq!(connector.shutdown_count(), 1);
    }

    #[test]
    fn test_disconnect_shuts_connection_down_once() {
        let (mut console, connector, _ctx) = console();
        console.handle_line("/connect ::1");

        console.handle_line("/disconnect");
        console.handle_line("/disconnect");

        assert!(!console.is_connected());
        assert_eq!(connector.shutdown_count(), 1);
    }

    #[test]
    fn test_closed_connection_is_dropped_before_next_command() {
        // Arrange
        let (mut console, connector, _ctx) = console();
        console.handle_line("/connect ::1");
        connector.close_remote();

        // Act
        console.handle_line("/status");

        // Assert
        assert!(!console.is_connected());
        assert_eq!(connector.shutdown_count(), 1);
    }

    #[test]
    fn test_status_report_shows_connection_state() {
        let (mut console, _connector, _ctx) = console();
        assert!(console
            .status_report()
            .contains("Currently not connected to any server."));

        console.handle_line("/connect 10.0.0.1 4000");

        assert!(console
            .status_report()
            .contains("Currently connected to server '10.0.0.1:4000'."));
    }

    #[test]
    fn test_quit_raises_quit_flag() {
        let (mut console, _connector, ctx) = console();

        assert_eq!(console.handle_line("/quit"), CommandOutcome::Quit);
        assert!(ctx.is_quit());
    }

    #[test]
    fn test_shutdown_disconnects_current_connection() {
        let (mut console, connector, _ctx) = console();
        console.handle_line("/connect ::1");

        console.shutdown();

        assert!(!console.is_connected());
        assert_eq!(connector.shutdown_count(), 1);
    }
}
