//! Per-connection receive loop shared by the client and the server.
//!
//! A [`ConnectionSession`] owns one [`SocketHandle`] and, once spawned, one
//! OS thread.  Each pass of the loop makes a single receive call and treats
//! whatever it returns as one complete message.  TCP does not preserve write
//! boundaries, so a peer's single write can arrive split across several
//! messages, or several writes can arrive as one; ppchat has no framing and
//! accepts that.
//!
//! # State machine
//!
//! ```text
//!             n > 0 (record, echo)
//!             interrupted / timeout
//!            ┌──────────┐
//!            ▼          │
//!         Active ───────┘
//!            │ n == 0, reset, abort          ┌──────────┐
//!            ├──────────────────────────────►│          │
//!            │ other error, echo failure      │  Closed  │
//!            └──────────► Closing ───────────►│          │
//!                    (shutdown-send attempt)  └──────────┘
//! ```
//!
//! The loop also stops when the process-wide quit flag or the session's own
//! stop flag is raised.  On every exit path the socket is closed exactly
//! once and a [`SessionEvent::Closed`] is emitted.

use std::borrow::Cow;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info};
use uuid::Uuid;

use crate::context::SharedContext;
use crate::error::{NetError, ReceiveFailure};
use crate::socket::{send_all, SocketHandle, Transport};

/// Identifies one session for the lifetime of the process.
pub type SessionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Closing,
    Closed,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer closed its sending side (zero-length read).
    PeerClosed,
    /// The peer reset the connection.
    PeerReset,
    /// The connection was aborted.
    PeerAborted,
    /// A receive failed for any other reason.
    ReceiveError,
    /// Writing an echo back to the peer failed.
    EchoFailed,
    /// The quit flag or the session's stop flag ended the loop.
    LocalShutdown,
}

/// Whether received messages are written back to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoPolicy {
    /// Never echo (client sessions).
    Never,
    /// Echo while the shared context's echo flag is set (server sessions).
    FollowContext,
}

/// Payload of one successful receive call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message(Vec<u8>);

impl Message {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lossy UTF-8 rendering for logs.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }
}

/// Notifications a session sends to whoever is observing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Message {
        session_id: SessionId,
        peer: String,
        message: Message,
    },
    Closed {
        session_id: SessionId,
        peer: String,
        reason: CloseReason,
    },
}

/// What a finished session reports back through its join handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub peer: String,
    pub reason: CloseReason,
    pub messages_received: u64,
    pub bytes_received: u64,
}

/// One connection and its receive loop.
pub struct ConnectionSession<T: Transport> {
    id: SessionId,
    socket: SocketHandle<T>,
    peer: String,
    receive_buffer: Vec<u8>,
    state: SessionState,
    close_reason: Option<CloseReason>,
    echo: EchoPolicy,
    context: Arc<SharedContext>,
    stop: Arc<AtomicBool>,
    events: Option<Sender<SessionEvent>>,
    messages_received: u64,
    bytes_received: u64,
}

impl<T: Transport> ConnectionSession<T> {
    /// Wraps a connected transport.  The session starts `Active` with a
    /// receive buffer of [`crate::RECEIVE_BUFFER_SIZE`] bytes and no echo.
    pub fn new(transport: T, peer: impl Into<String>, context: Arc<SharedContext>) -> Self {
        Self {
            id: Uuid::new_v4(),
            socket: SocketHandle::new(transport),
            peer: peer.into(),
            receive_buffer: vec![0u8; crate::RECEIVE_BUFFER_SIZE],
            state: SessionState::Active,
            close_reason: None,
            echo: EchoPolicy::Never,
            context,
            stop: Arc::new(AtomicBool::new(false)),
            events: None,
            messages_received: 0,
            bytes_received: 0,
        }
    }

    /// Sets the receive buffer capacity `R`.  Messages carry at most
    /// `R - 1` bytes; values below 2 are raised to 2.
    pub fn with_receive_buffer_size(mut self, size: usize) -> Self {
        self.receive_buffer = vec![0u8; size.max(2)];
        self
    }

    pub fn with_echo(mut self, echo: EchoPolicy) -> Self {
        self.echo = echo;
        self
    }

    /// Routes [`SessionEvent`]s to `events`.  A dropped receiver is ignored.
    pub fn with_events(mut self, events: Sender<SessionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    /// Flag that asks this session alone to stop.  Whoever raises it should
    /// also shut the socket down so a blocked receive returns.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    fn stop_requested(&self) -> bool {
        self.context.is_quit() || self.stop.load(Ordering::SeqCst)
    }

    /// Makes one receive attempt and applies the resulting transition.
    pub fn step(&mut self) -> SessionState {
        if self.state != SessionState::Active {
            return self.state;
        }

        let limit = self.receive_buffer.len() - 1;
        let result = match self.socket.transport_mut() {
            Some(transport) => transport.receive(&mut self.receive_buffer[..limit]),
            None => {
                self.close_reason.get_or_insert(CloseReason::LocalShutdown);
                self.state = SessionState::Closed;
                return self.state;
            }
        };

        match result {
            Ok(0) if self.stop_requested() => {
                // Unblocked by our own shutdown; the loop condition ends it.
            }
            Ok(0) => {
                info!("connection with '{}' has been closed", self.peer);
                self.shut_down(CloseReason::PeerClosed);
            }
            Ok(n) => {
                let n = n.min(limit);
                let message = Message::new(self.receive_buffer[..n].to_vec());
                self.on_message(message);
            }
            Err(e) => self.on_receive_error(e),
        }

        self.state
    }

    fn on_message(&mut self, message: Message) {
        self.messages_received += 1;
        self.bytes_received += message.len() as u64;
        self.context.stats().record_received(message.len());
        info!(
            "received {} bytes from '{}'. Message: \"{}\"",
            message.len(),
            self.peer,
            message.text()
        );

        let echo = self.echo == EchoPolicy::FollowContext && self.context.echo_enabled();
        let echo_copy = echo.then(|| message.clone());

        self.emit(SessionEvent::Message {
            session_id: self.id,
            peer: self.peer.clone(),
            message,
        });

        if let Some(message) = echo_copy {
            self.echo_back(&message);
        }
    }

    fn echo_back(&mut self, message: &Message) {
        let Some(transport) = self.socket.transport_mut() else {
            return;
        };

        match send_all(transport, message.as_bytes()) {
            Ok(()) => {
                self.context.stats().record_echoed(message.len());
                info!(
                    "sent {} bytes to '{}'. Message: \"{}\"",
                    message.len(),
                    self.peer,
                    message.text()
                );
            }
            Err(source) => {
                let err = NetError::SendFailed {
                    peer: self.peer.clone(),
                    source,
                };
                error!("{err}");
                self.state = SessionState::Closing;
                self.shut_down(CloseReason::EchoFailed);
            }
        }
    }

    fn on_receive_error(&mut self, e: io::Error) {
        match ReceiveFailure::classify(&e) {
            ReceiveFailure::Interrupted => {}
            ReceiveFailure::PeerReset => {
                info!(
                    "connection with '{}' has been abruptly closed by remote peer",
                    self.peer
                );
                self.shut_down(CloseReason::PeerReset);
            }
            ReceiveFailure::PeerAborted => {
                info!("connection with '{}' has been aborted", self.peer);
                self.shut_down(CloseReason::PeerAborted);
            }
            kind @ ReceiveFailure::Other => {
                let err = NetError::ReceiveFailed {
                    peer: self.peer.clone(),
                    kind,
                    source: e,
                };
                error!("{err}");
                self.state = SessionState::Closing;
                self.shut_down(CloseReason::ReceiveError);
            }
        }
    }

    /// Attempts a shutdown-send, then releases the socket.
    fn shut_down(&mut self, reason: CloseReason) {
        self.close_reason.get_or_insert(reason);
        if let Some(transport) = self.socket.transport_mut() {
            if let Err(e) = transport.shutdown_send() {
                match e.kind() {
                    io::ErrorKind::NotConnected => {
                        debug!("'{}' already disconnected", self.peer)
                    }
                    _ => {
                        let err = NetError::DisconnectFailed {
                            peer: self.peer.clone(),
                            source: e,
                        };
                        error!("{err}");
                    }
                }
            }
        }
        if self.socket.close() {
            debug!("released socket for '{}'", self.peer);
        }
        self.state = SessionState::Closed;
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    /// Runs the receive loop to completion on the current thread.
    pub fn run(mut self) -> SessionSummary {
        while self.state == SessionState::Active && !self.stop_requested() {
            self.step();
        }

        if self.state != SessionState::Closed {
            self.shut_down(CloseReason::LocalShutdown);
        }

        let reason = self.close_reason.unwrap_or(CloseReason::LocalShutdown);
        self.emit(SessionEvent::Closed {
            session_id: self.id,
            peer: self.peer.clone(),
            reason,
        });

        SessionSummary {
            session_id: self.id,
            peer: self.peer.clone(),
            reason,
            messages_received: self.messages_received,
            bytes_received: self.bytes_received,
        }
    }
}

impl<T: Transport + 'static> ConnectionSession<T> {
    /// Moves the session onto its own thread and starts the receive loop.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be created.
    pub fn spawn(self) -> io::Result<JoinHandle<SessionSummary>> {
        thread::Builder::new()
            .name(format!("ppchat-session-{}", self.peer))
            .spawn(move || self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::mock::{ReceiveStep, ScriptedTransport, TransportCall};
    use crate::socket::MockTransport;
    use std::sync::mpsc;

    fn scripted(
        steps: Vec<ReceiveStep>,
    ) -> (ConnectionSession<ScriptedTransport>, Arc<crate::socket::mock::CallLog>, Arc<SharedContext>) {
        let (transport, log) = ScriptedTransport::new(steps);
        let ctx = SharedContext::new();
        let session = ConnectionSession::new(transport, "::1", Arc::clone(&ctx));
        (session, log, ctx)
    }

    #[test]
    fn test_zero_length_read_closes_and_releases_socket_once() {
        // Arrange
        let (session, log, _ctx) = scripted(vec![ReceiveStep::Eof]);

        // Act
        let summary = session.run();

        // Assert
        assert_eq!(summary.reason, CloseReason::PeerClosed);
        assert_eq!(log.shutdown_count(), 1);
        assert_eq!(log.close_count(), 1, "socket must be released exactly once");
    }

    #[test]
    fn test_step_transitions_to_closed_on_zero_length_read() {
        let (mut session, _log, _ctx) = scripted(vec![ReceiveStep::Eof]);

        assert_eq!(session.step(), SessionState::Closed);
        assert_eq!(session.close_reason(), Some(CloseReason::PeerClosed));
        // Further steps are no-ops.
        assert_eq!(session.step(), SessionState::Closed);
    }

    #[test]
    fn test_received_data_emits_message_events_in_order() {
        // Arrange
        let (session, _log, ctx) = scripted(vec![
            ReceiveStep::Data(b"first".to_vec()),
            ReceiveStep::Data(b"second".to_vec()),
            ReceiveStep::Eof,
        ]);
        let (tx, rx) = mpsc::channel();

        // Act
        let summary = session.with_events(tx).run();

        // Assert
        let events: Vec<SessionEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 3);
        match (&events[0], &events[1]) {
            (
                SessionEvent::Message { message: a, .. },
                SessionEvent::Message { message: b, .. },
            ) => {
                assert_eq!(a.as_bytes(), b"first");
                assert_eq!(b.as_bytes(), b"second");
            }
            other => panic!("unexpected events: {other:?}"),
        }
        assert!(matches!(
            events[2],
            SessionEvent::Closed { reason: CloseReason::PeerClosed, .. }
        ));
        assert_eq!(summary.messages_received, 2);
        assert_eq!(summary.bytes_received, 11);
        assert_eq!(ctx.stats().snapshot().messages_received, 2);
    }

    #[test]
    fn test_message_is_capped_at_buffer_size_minus_one() {
        // Arrange – R = 8, so at most 7 bytes per message
        let (session, _log, _ctx) = scripted(vec![
            ReceiveStep::Data(b"0123456789abcdef".to_vec()),
            ReceiveStep::Eof,
        ]);
        let (tx, rx) = mpsc::channel();

        // Act
        session.with_receive_buffer_size(8).with_events(tx).run();

        // Assert
        match rx.recv().unwrap() {
            SessionEvent::Message { message, .. } => assert_eq!(message.as_bytes(), b"0123456"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_peer_reset_closes_with_distinct_reason() {
        let (session, log, _ctx) =
            scripted(vec![ReceiveStep::Error(io::ErrorKind::ConnectionReset)]);

        let summary = session.run();

        assert_eq!(summary.reason, CloseReason::PeerReset);
        assert_eq!(log.shutdown_count(), 1);
        assert_eq!(log.close_count(), 1);
    }

    #[test]
    fn test_peer_abort_closes_with_distinct_reason() {
        let (session, log, _ctx) =
            scripted(vec![ReceiveStep::Error(io::ErrorKind::ConnectionAborted)]);

        assert_eq!(session.run().reason, CloseReason::PeerAborted);
        assert_eq!(log.close_count(), 1);
    }

    #[test]
    fn test_other_receive_error_closes_session() {
        let (mut session, log, _ctx) =
            scripted(vec![ReceiveStep::Error(io::ErrorKind::PermissionDenied)]);

        assert_eq!(session.step(), SessionState::Closed);
        assert_eq!(session.close_reason(), Some(CloseReason::ReceiveError));
        assert_eq!(log.shutdown_count(), 1);
        assert_eq!(log.close_count(), 1);
    }

    #[test]
    fn test_interrupted_receive_keeps_session_active() {
        // Arrange
        let (mut session, _log, _ctx) = scripted(vec![
            ReceiveStep::Error(io::ErrorKind::WouldBlock),
            ReceiveStep::Error(io::ErrorKind::Interrupted),
            ReceiveStep::Data(b"still here".to_vec()),
        ]);

        // Act / Assert
        assert_eq!(session.step(), SessionState::Active);
        assert_eq!(session.step(), SessionState::Active);
        assert_eq!(session.step(), SessionState::Active);
        assert_eq!(session.close_reason(), None);
    }

    #[test]
    fn test_echo_sends_message_back_before_next_receive() {
        // Arrange
        let (session, log, ctx) = scripted(vec![
            ReceiveStep::Data(b"hello".to_vec()),
            ReceiveStep::Data(b"world".to_vec()),
            ReceiveStep::Eof,
        ]);
        ctx.set_echo(true);

        // Act
        session.with_echo(EchoPolicy::FollowContext).run();

        // Assert
        assert_eq!(
            log.calls(),
            vec![
                TransportCall::Receive,
                TransportCall::Send(b"hello".to_vec()),
                TransportCall::Receive,
                TransportCall::Send(b"world".to_vec()),
                TransportCall::Receive,
                TransportCall::ShutdownSend,
                TransportCall::Close,
            ]
        );
        let snap = ctx.stats().snapshot();
        assert_eq!(snap.messages_echoed_back, 2);
        assert_eq!(snap.bytes_echoed_back, 10);
        assert_eq!(snap.messages_sent, 2);
    }

    #[test]
    fn test_echo_disabled_sends_nothing() {
        let (session, log, _ctx) =
            scripted(vec![ReceiveStep::Data(b"hello".to_vec()), ReceiveStep::Eof]);

        session.with_echo(EchoPolicy::FollowContext).run();

        assert!(log.sent().is_empty());
    }

    #[test]
    fn test_client_session_ignores_echo_flag() {
        let (session, log, ctx) =
            scripted(vec![ReceiveStep::Data(b"hello".to_vec()), ReceiveStep::Eof]);
        ctx.set_echo(true);

        session.run();

        assert!(log.sent().is_empty());
    }

    #[test]
    fn test_failed_echo_forces_close() {
        // Arrange
        let (mut transport, log) = ScriptedTransport::new(vec![
            ReceiveStep::Data(b"hello".to_vec()),
            ReceiveStep::Data(b"never read".to_vec()),
        ]);
        transport.fail_sends = Some(io::ErrorKind::BrokenPipe);
        let ctx = SharedContext::with_echo(true);
        let session = ConnectionSession::new(transport, "10.0.0.1", Arc::clone(&ctx))
            .with_echo(EchoPolicy::FollowContext);

        // Act
        let summary = session.run();

        // Assert
        assert_eq!(summary.reason, CloseReason::EchoFailed);
        let receives = log
            .calls()
            .iter()
            .filter(|c| **c == TransportCall::Receive)
            .count();
        assert_eq!(receives, 1, "no receive after a failed echo");
        assert_eq!(log.close_count(), 1);
        assert_eq!(ctx.stats().snapshot().messages_echoed_back, 0);
    }

    #[test]
    fn test_quit_flag_stops_loop_and_closes_once() {
        let (session, log, ctx) = scripted(vec![ReceiveStep::Data(b"unread".to_vec())]);
        ctx.request_quit();

        let summary = session.run();

        assert_eq!(summary.reason, CloseReason::LocalShutdown);
        assert!(!log.calls().contains(&TransportCall::Receive));
        assert_eq!(log.close_count(), 1);
    }

    #[test]
    fn test_zero_read_after_local_stop_is_not_peer_close() {
        // Arrange
        let (mut session, log, _ctx) = scripted(vec![ReceiveStep::Eof]);
        let stop = session.stop_handle();
        stop.store(true, Ordering::SeqCst);

        // Act
        let state = session.step();
        let summary = session.run();

        // Assert
        assert_eq!(state, SessionState::Active);
        assert_eq!(summary.reason, CloseReason::LocalShutdown);
        assert_eq!(log.close_count(), 1);
    }

    #[test]
    fn test_reset_with_mock_transport_shuts_down_and_closes_once() {
        // Arrange
        let mut transport = MockTransport::new();
        transport
            .expect_receive()
            .times(1)
            .returning(|_| Err(io::Error::new(io::ErrorKind::ConnectionReset, "rst")));
        transport.expect_shutdown_send().times(1).returning(|| {
            Err(io::Error::new(io::ErrorKind::NotConnected, "gone"))
        });
        transport.expect_close().times(1).returning(|| Ok(()));
        transport.expect_send().never();

        // Act
        let summary = ConnectionSession::new(transport, "::1", SharedContext::new()).run();

        // Assert – call counts are verified when the mock is dropped
        assert_eq!(summary.reason, CloseReason::PeerReset);
    }

    #[test]
    fn test_spawned_session_reports_summary_through_join_handle() {
        let (session, _log, _ctx) =
            scripted(vec![ReceiveStep::Data(b"hi".to_vec()), ReceiveStep::Eof]);
        let id = session.id();

        let summary = session.spawn().unwrap().join().expect("session thread panicked");

        assert_eq!(summary.session_id, id);
        assert_eq!(summary.messages_received, 1);
        assert_eq!(summary.peer, "::1");
    }

    #[test]
    fn test_message_text_is_lossy_utf8() {
        let message = Message::new(vec![b'o', b'k', 0xFF]);
        assert_eq!(message.text(), "ok\u{FFFD}");
        assert_eq!(message.len(), 3);
    }
}
