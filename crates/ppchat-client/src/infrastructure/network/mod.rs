//! TCP connection to a ppchat server.
//!
//! A [`ClientSession`] is made of two halves of one socket:
//!
//! - the **receive half** is moved into a [`ConnectionSession`] running on
//!   its own thread.  It logs everything the server sends and never echoes.
//! - the **write half** is a `try_clone` of the same stream, kept by the
//!   main thread for [`ClientSession::send`].
//!
//! Disconnecting raises the session's stop flag, shuts the socket down so a
//! blocked receive returns, and joins the receive thread.

use std::io;
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::JoinHandle;

use ppchat_core::config::SessionConfig;
use ppchat_core::session::SessionSummary;
use ppchat_core::socket::{connect, prepare_session_stream};
use ppchat_core::{
    send_all, ConnectionSession, NetError, SessionEvent, SharedContext, SocketHandle, Transport,
};
use tracing::debug;

use crate::application::dispatch::{ChatConnection, Connector};

/// One live connection to a server.
pub struct ClientSession {
    peer: String,
    remote_addr: SocketAddr,
    writer: SocketHandle<TcpStream>,
    stop: Arc<AtomicBool>,
    receiver: Option<JoinHandle<SessionSummary>>,
    context: Arc<SharedContext>,
}

impl ClientSession {
    /// Connects to `host:port` and starts the receive thread.
    ///
    /// # Errors
    ///
    /// - [`NetError::AddressResolutionFailed`] for a bad port or unknown host.
    /// - [`NetError::ConnectFailed`] when no resolved address accepted, or
    ///   the connected socket could not be prepared.
    pub fn connect(
        host: &str,
        port: &str,
        context: Arc<SharedContext>,
        settings: &SessionConfig,
    ) -> Result<Self, NetError> {
        Self::connect_with_events(host, port, context, settings, None)
    }

    /// Like [`ClientSession::connect`], forwarding session events to
    /// `events`.
    pub fn connect_with_events(
        host: &str,
        port: &str,
        context: Arc<SharedContext>,
        settings: &SessionConfig,
        events: Option<Sender<SessionEvent>>,
    ) -> Result<Self, NetError> {
        let (stream, remote_addr) = connect(host, port)?;
        let setup_failed = |source: io::Error| NetError::ConnectFailed {
            host: host.to_string(),
            port: port.to_string(),
            source,
        };
        prepare_session_stream(&stream, settings.read_timeout()).map_err(setup_failed)?;
        let writer = stream.try_clone().map_err(setup_failed)?;

        let mut session = ConnectionSession::new(stream, host, Arc::clone(&context))
            .with_receive_buffer_size(settings.receive_buffer_size);
        if let Some(events) = events {
            session = session.with_events(events);
        }
        let stop = session.stop_handle();
        let receiver = session.spawn().map_err(setup_failed)?;
        debug!("connected to {remote_addr}");

        Ok(Self {
            peer: format!("{host}:{port}"),
            remote_addr,
            writer: SocketHandle::new(writer),
            stop,
            receiver: Some(receiver),
            context,
        })
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Sends all of `bytes` to the server.
    ///
    /// # Errors
    ///
    /// [`NetError::NotConnected`] after a disconnect, [`NetError::SendFailed`]
    /// when the socket rejects the write.
    pub fn send(&mut self, bytes: &[u8]) -> Result<usize, NetError> {
        let writer = self.writer.transport_mut().ok_or(NetError::NotConnected)?;
        send_all(writer, bytes).map_err(|source| NetError::SendFailed {
            peer: self.peer.clone(),
            source,
        })?;
        self.context.stats().record_sent(bytes.len());
        Ok(bytes.len())
    }

    /// Disconnects from the server and waits for the receive thread.
    ///
    /// # Errors
    ///
    /// [`NetError::DisconnectFailed`] when the shutdown-send fails for a
    /// reason other than the peer already being gone.
    pub fn disconnect(mut self) -> Result<(), NetError> {
        self.close()
    }

    /// `true` once the receive thread has finished.
    pub fn is_closed(&self) -> bool {
        self.receiver.as_ref().map_or(true, |h| h.is_finished())
    }

    fn close(&mut self) -> Result<(), NetError> {
        self.stop.store(true, Ordering::SeqCst);

        let mut result = Ok(());
        if let Some(writer) = self.writer.transport_mut() {
            if let Err(source) = writer.shutdown_send() {
                if source.kind() != io::ErrorKind::NotConnected {
                    result = Err(NetError::DisconnectFailed {
                        peer: self.peer.clone(),
                        source,
                    });
                }
            }
        }
        // Both directions go down here, which also wakes the receive thread.
        self.writer.close();

        if let Some(receiver) = self.receiver.take() {
            match receiver.join() {
                Ok(summary) => debug!(
                    "receive thread for '{}' ended ({:?})",
                    self.peer, summary.reason
                ),
                Err(_) => debug!("receive thread for '{}' panicked", self.peer),
            }
        }
        result
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            debug!("{e}");
        }
    }
}

impl ChatConnection for ClientSession {
    fn peer(&self) -> &str {
        &self.peer
    }

    fn send(&mut self, bytes: &[u8]) -> Result<usize, NetError> {
        ClientSession::send(self, bytes)
    }

    fn is_closed(&self) -> bool {
        ClientSession::is_closed(self)
    }

    fn shutdown(&mut self) -> Result<(), NetError> {
        self.close()
    }
}

/// Opens real TCP connections for the console dispatcher.
pub struct TcpConnector {
    context: Arc<SharedContext>,
    settings: SessionConfig,
}

impl TcpConnector {
    pub fn new(context: Arc<SharedContext>, settings: SessionConfig) -> Self {
        Self { context, settings }
    }
}

impl Connector for TcpConnector {
    fn connect(&self, host: &str, port: &str) -> Result<Box<dyn ChatConnection>, NetError> {
        let session = ClientSession::connect(host, port, Arc::clone(&self.context), &self.settings)?;
        Ok(Box::new(session))
    }
}
