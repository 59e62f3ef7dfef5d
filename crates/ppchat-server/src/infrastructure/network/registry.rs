//! Listening socket and per-client session threads.
//!
//! The registry binds one passive socket (dual-stack IPv6 preferred, IPv4
//! fallback, see [`bind_listener`]) and runs the accept loop on its own
//! thread.  Every accepted client gets a fresh [`ConnectionSession`] with a
//! random [`SessionId`], running on a dedicated thread that owns the
//! accepted stream.  There is no cap on the number of sessions.
//!
//! # Accept loop
//!
//! The listener is non-blocking and polled every [`ACCEPT_POLL_INTERVAL`].
//! Between polls the loop checks the shared quit flag and joins session
//! threads that have finished.  Any accept error other than "would block"
//! or "interrupted" is fatal: the loop raises the quit flag, waits for the
//! sessions to wind down and returns [`NetError::AcceptFailed`].  Failing
//! to set up one accepted connection only drops that connection.
//!
//! Sessions notice quit within one socket read timeout, so shutdown joins
//! every session thread instead of abandoning blocked ones.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ppchat_core::config::SessionConfig;
use ppchat_core::session::{EchoPolicy, SessionSummary};
use ppchat_core::socket::{address_to_text, bind_listener, prepare_session_stream};
use ppchat_core::{
    describe_os_error, ConnectionSession, NetError, SessionEvent, SessionId, SharedContext,
};
use tracing::{debug, error, info, warn};

use crate::application::dispatch::SessionCounter;

/// How long the accept loop sleeps when no client is waiting.
pub const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Prepares an accepted stream before its session starts.
type StreamSetup = Box<dyn Fn(&TcpStream, Duration) -> io::Result<()> + Send>;

/// Shared count of sessions whose thread has not finished yet.
#[derive(Debug, Clone, Default)]
pub struct ActiveSessions(Arc<AtomicUsize>);

impl ActiveSessions {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn increment(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement(&self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SessionCounter for ActiveSessions {
    fn active_sessions(&self) -> usize {
        self.get()
    }
}

struct RunningSession {
    id: SessionId,
    peer: String,
    stop: Arc<AtomicBool>,
    handle: JoinHandle<SessionSummary>,
}

/// Owns the listener and every live session thread.
pub struct SessionRegistry {
    listener: TcpListener,
    local_addr: SocketAddr,
    context: Arc<SharedContext>,
    settings: SessionConfig,
    sessions: Vec<RunningSession>,
    active: ActiveSessions,
    events: Option<Sender<SessionEvent>>,
    stream_setup: StreamSetup,
}

impl SessionRegistry {
    /// Binds the listening socket on `port` (use `"0"` for an ephemeral
    /// port).
    ///
    /// # Errors
    ///
    /// Any [`NetError`] from address parsing, socket creation, bind or
    /// listen.
    pub fn bind(
        port: &str,
        context: Arc<SharedContext>,
        settings: SessionConfig,
    ) -> Result<Self, NetError> {
        let listener = bind_listener(port)?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| NetError::SocketCreateFailed { source })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| NetError::ListenFailed {
                addr: local_addr,
                source,
            })?;

        Ok(Self {
            listener,
            local_addr,
            context,
            settings,
            sessions: Vec::new(),
            active: ActiveSessions::default(),
            events: None,
            stream_setup: Box::new(prepare_session_stream),
        })
    }

    /// Forwards every session's events to `events`.
    pub fn with_events(mut self, events: Sender<SessionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn active_sessions(&self) -> usize {
        self.active.get()
    }

    /// A handle that keeps reporting the session count after the registry
    /// has moved onto the accept thread.
    pub fn active_sessions_handle(&self) -> ActiveSessions {
        self.active.clone()
    }

    /// Accepts at most one pending client without blocking.
    ///
    /// # Errors
    ///
    /// [`NetError::AcceptFailed`] for any accept error other than "no client
    /// waiting" or an interrupted call.  A client whose connection cannot be
    /// set up is logged and dropped, giving `Ok(None)`.
    pub fn accept_one(&mut self) -> Result<Option<SessionId>, NetError> {
        match self.listener.accept() {
            Ok((stream, addr)) => Ok(self.start_session(stream, addr)),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
                Ok(None)
            }
            Err(source) => Err(NetError::AcceptFailed { source }),
        }
    }

    fn start_session(&mut self, stream: TcpStream, addr: SocketAddr) -> Option<SessionId> {
        let peer = address_to_text(&addr);
        if let Err(e) = (self.stream_setup)(&stream, self.settings.read_timeout()) {
            warn!(
                "couldn't set up connection with '{peer}': {}",
                describe_os_error(&e)
            );
            return None;
        }

        let mut session = ConnectionSession::new(stream, peer.clone(), Arc::clone(&self.context))
            .with_receive_buffer_size(self.settings.receive_buffer_size)
            .with_echo(EchoPolicy::FollowContext);
        if let Some(events) = &self.events {
            session = session.with_events(events.clone());
        }
        let id = session.id();
        let stop = session.stop_handle();

        let active = self.active.clone();
        active.increment();
        let spawned = thread::Builder::new()
            .name(format!("ppchat-session-{peer}"))
            .spawn(move || {
                let summary = session.run();
                active.decrement();
                summary
            });
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.active.decrement();
                error!(
                    "couldn't start session for '{peer}': {}",
                    describe_os_error(&e)
                );
                return None;
            }
        };

        info!("'{peer}' has connected");
        debug!("session {id} started for '{peer}'");
        self.sessions.push(RunningSession {
            id,
            peer,
            stop,
            handle,
        });
        Some(id)
    }

    /// Joins session threads that have already finished.
    pub fn reap_finished(&mut self) {
        let (finished, running): (Vec<_>, Vec<_>) = self
            .sessions
            .drain(..)
            .partition(|s| s.handle.is_finished());
        self.sessions = running;
        for session in finished {
            join_session(session);
        }
    }

    /// Runs the accept loop until the quit flag is raised, then joins every
    /// session.
    ///
    /// # Errors
    ///
    /// [`NetError::AcceptFailed`] when accepting fails; the quit flag is
    /// raised before returning so the rest of the process shuts down too.
    pub fn run(mut self) -> Result<(), NetError> {
        info!("accepting clients on {}", self.local_addr);
        let mut result = Ok(());

        while !self.context.is_quit() {
            match self.accept_one() {
                Ok(Some(_)) => continue,
                Ok(None) => {
                    self.reap_finished();
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    error!("{e}");
                    self.context.request_quit();
                    result = Err(e);
                }
            }
        }

        self.shutdown();
        result
    }

    /// Moves the registry onto the accept thread.
    pub fn spawn(self) -> io::Result<JoinHandle<Result<(), NetError>>> {
        thread::Builder::new()
            .name("ppchat-accept".to_string())
            .spawn(move || self.run())
    }

    #[cfg(test)]
    fn with_stream_setup(
        mut self,
        setup: impl Fn(&TcpStream, Duration) -> io::Result<()> + Send + 'static,
    ) -> Self {
        self.stream_setup = Box::new(setup);
        self
    }

    fn shutdown(&mut self) {
        for session in &self.sessions {
            session.stop.store(true, Ordering::SeqCst);
        }
        for session in self.sessions.drain(..) {
            join_session(session);
        }
        debug!("all sessions joined");
    }
}

fn join_session(session: RunningSession) {
    match session.handle.join() {
        Ok(summary) => debug!(
            "session {} with '{}' ended ({:?}, {} messages, {} bytes)",
            summary.session_id,
            summary.peer,
            summary.reason,
            summary.messages_received,
            summary.bytes_received
        ),
        Err(_) => warn!("session {} with '{}' panicked", session.id, session.peer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::time::Instant;

    fn fast_settings() -> SessionConfig {
        SessionConfig {
            receive_buffer_size: 64,
            read_timeout_ms: 20,
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_bind_on_ephemeral_port_reports_local_addr() {
        let registry = SessionRegistry::bind("0", SharedContext::new(), fast_settings()).unwrap();
        assert_ne!(registry.local_addr().port(), 0);
        assert_eq!(registry.active_sessions(), 0);
    }

    #[test]
    fn test_bind_rejects_invalid_port() {
        let result = SessionRegistry::bind("not-a-port", SharedContext::new(), fast_settings());
        assert!(matches!(result, Err(NetError::AddressResolutionFailed { .. })));
    }

    #[test]
    fn test_accept_one_without_pending_client_returns_none() {
        let mut registry =
            SessionRegistry::bind("0", SharedContext::new(), fast_settings()).unwrap();
        assert!(matches!(registry.accept_one(), Ok(None)));
    }

    #[test]
    fn test_accepted_client_runs_session_until_disconnect() {
        // Arrange
        let ctx = SharedContext::new();
        let mut registry = SessionRegistry::bind("0", Arc::clone(&ctx), fast_settings()).unwrap();
        let port = registry.local_addr().port();
        let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();

        // Act – accept, send, disconnect
        assert!(wait_until(|| matches!(registry.accept_one(), Ok(Some(_)))));
        assert_eq!(registry.active_sessions(), 1);
        client.write_all(b"hi").unwrap();
        assert!(wait_until(|| ctx.stats().snapshot().messages_received == 1));
        drop(client);

        // Assert
        assert!(wait_until(|| registry.active_sessions() == 0));
        registry.reap_finished();
        assert!(registry.sessions.is_empty());
    }

    #[test]
    fn test_run_stops_on_quit_and_joins_sessions() {
        // Arrange
        let ctx = SharedContext::with_echo(true);
        let registry = SessionRegistry::bind("0", Arc::clone(&ctx), fast_settings()).unwrap();
        let port = registry.local_addr().port();
        let active = registry.active_sessions_handle();
        let accept_thread = registry.spawn().unwrap();

        let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        client.write_all(b"ping").unwrap();
        let mut echoed = [0u8; 4];
        client.read_exact(&mut echoed).unwrap();

        // Act
        ctx.request_quit();
        let result = accept_thread.join().expect("accept thread panicked");

        // Assert
        assert!(result.is_ok());
        assert_eq!(&echoed, b"ping");
        assert_eq!(active.get(), 0, "every session thread must have finished");
    }

    #[test]
    fn test_connection_setup_failure_drops_only_that_client() {
        // Arrange – the first accepted stream fails its setup
        let ctx = SharedContext::with_echo(true);
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&attempts);
        let registry = SessionRegistry::bind("0", Arc::clone(&ctx), fast_settings())
            .unwrap()
            .with_stream_setup(move |stream, timeout| {
                if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(io::Error::new(io::ErrorKind::InvalidInput, "setup refused"))
                } else {
                    prepare_session_stream(stream, timeout)
                }
            });
        let port = registry.local_addr().port();
        let active = registry.active_sessions_handle();
        let accept_thread = registry.spawn().unwrap();

        // Act
        let mut rejected = TcpStream::connect(("127.0.0.1", port)).unwrap();
        rejected
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut buf = [0u8; 4];
        let rejected_read = rejected.read(&mut buf);

        let mut accepted = TcpStream::connect(("127.0.0.1", port)).unwrap();
        accepted
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        accepted.write_all(b"pong").unwrap();
        let mut echoed = [0u8; 4];
        accepted.read_exact(&mut echoed).unwrap();

        // Assert
        match rejected_read {
            Ok(n) => assert_eq!(n, 0, "dropped client must see end of stream"),
            Err(e) => assert!(
                !matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut),
                "dropped client was left hanging: {e}"
            ),
        }
        assert_eq!(&echoed, b"pong");
        assert!(!ctx.is_quit());
        assert_eq!(active.get(), 1);

        ctx.request_quit();
        assert!(accept_thread.join().expect("accept thread panicked").is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
