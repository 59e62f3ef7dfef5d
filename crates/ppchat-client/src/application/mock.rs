//! Mock connector for unit testing the console dispatcher.
//!
//! Connections made through [`MockConnector`] never touch the network.
//! Every clone shares one state, so a test keeps a clone to inspect what
//! the dispatcher did and to flip failure switches mid-test.

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use ppchat_core::NetError;

use super::dispatch::{ChatConnection, Connector};

#[derive(Debug, Default)]
struct MockState {
    connect_calls: Vec<(String, String)>,
    sent: Vec<Vec<u8>>,
    shutdowns: usize,
    fail_connects: bool,
    fail_sends: bool,
    remote_closed: bool,
}

/// A [`Connector`] whose connections record what was sent to them.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `connect` fail with `ConnectFailed`.
    pub fn fail_connects(&self, fail: bool) {
        self.state.lock().fail_connects = fail;
    }

    /// Makes every following `send` fail with `SendFailed`.
    pub fn fail_sends(&self, fail: bool) {
        self.state.lock().fail_sends = fail;
    }

    /// Marks open connections as closed by the server.
    pub fn close_remote(&self) {
        self.state.lock().remote_closed = true;
    }

    /// `(host, port)` of every connect attempt.
    pub fn connect_calls(&self) -> Vec<(String, String)> {
        self.state.lock().connect_calls.clone()
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.state.lock().sent.clone()
    }

    pub fn shutdown_count(&self) -> usize {
        self.state.lock().shutdowns
    }
}

impl Connector for MockConnector {
    fn connect(&self, host: &str, port: &str) -> Result<Box<dyn ChatConnection>, NetError> {
        let mut state = self.state.lock();
        state.connect_calls.push((host.to_string(), port.to_string()));
        if state.fail_connects {
            return Err(NetError::ConnectFailed {
                host: host.to_string(),
                port: port.to_string(),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "mock refused"),
            });
        }
        state.remote_closed = false;

        Ok(Box::new(MockConnection {
            peer: format!("{host}:{port}"),
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockConnection {
    peer: String,
    state: Arc<Mutex<MockState>>,
}

impl ChatConnection for MockConnection {
    fn peer(&self) -> &str {
        &self.peer
    }

    fn send(&mut self, bytes: &[u8]) -> Result<usize, NetError> {
        let mut state = self.state.lock();
        if state.fail_sends {
            return Err(NetError::SendFailed {
                peer: self.peer.clone(),
                source: io::Error::new(io::ErrorKind::BrokenPipe, "mock send failure"),
            });
        }
        state.sent.push(bytes.to_vec());
        Ok(bytes.len())
    }

    fn is_closed(&self) -> bool {
        self.state.lock().remote_closed
    }

    fn shutdown(&mut self) -> Result<(), NetError> {
        self.state.lock().shutdowns += 1;
        Ok(())
    }
}
