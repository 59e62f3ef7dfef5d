//! Scripted transport for exercising the session engine without sockets.
//!
//! Each `receive` call pops the next [`ReceiveStep`] from the script.  Every
//! call (receive, send, shutdown, close) is appended to a shared call log so
//! tests can assert on ordering, e.g. that an echo `send` happened before the
//! next `receive`.  The log lives behind an `Arc` and survives the transport
//! being moved into a session thread.
//!
//! When the script runs out, `receive` reports an orderly close (`Ok(0)`) so
//! a forgotten step ends the loop instead of hanging the test.
//!
//! ```ignore
//! let (transport, log) = ScriptedTransport::new([
//!     ReceiveStep::Data(b"hello".to_vec()),
//!     ReceiveStep::Eof,
//! ]);
//! // ... run a ConnectionSession over `transport` ...
//! assert_eq!(log.close_count(), 1);
//! ```

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use super::Transport;

/// One scripted outcome of a `receive` call.
#[derive(Debug, Clone)]
pub enum ReceiveStep {
    /// Deliver these bytes (truncated to the caller's buffer).
    Data(Vec<u8>),
    /// Peer closed the stream (`Ok(0)`).
    Eof,
    /// Fail with an error of this kind.
    Error(io::ErrorKind),
}

/// A recorded call on the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Receive,
    Send(Vec<u8>),
    ShutdownSend,
    Close,
}

/// Shared record of everything the transport was asked to do.
#[derive(Debug, Default)]
pub struct CallLog {
    calls: Mutex<Vec<TransportCall>>,
}

impl CallLog {
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().clone()
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                TransportCall::Send(bytes) => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn close_count(&self) -> usize {
        self.count(&TransportCall::Close)
    }

    pub fn shutdown_count(&self) -> usize {
        self.count(&TransportCall::ShutdownSend)
    }

    fn count(&self, wanted: &TransportCall) -> usize {
        self.calls.lock().iter().filter(|c| *c == wanted).count()
    }

    fn push(&self, call: TransportCall) {
        self.calls.lock().push(call);
    }
}

/// A [`Transport`] that replays a fixed script of receive outcomes.
#[derive(Debug)]
pub struct ScriptedTransport {
    script: VecDeque<ReceiveStep>,
    log: Arc<CallLog>,
    /// When set, every `send` fails with this error kind.
    pub fail_sends: Option<io::ErrorKind>,
}

impl ScriptedTransport {
    /// Creates a transport and returns it with a handle to its call log.
    pub fn new(script: impl IntoIterator<Item = ReceiveStep>) -> (Self, Arc<CallLog>) {
        let log = Arc::new(CallLog::default());
        let transport = Self {
            script: script.into_iter().collect(),
            log: Arc::clone(&log),
            fail_sends: None,
        };
        (transport, log)
    }
}

impl Transport for ScriptedTransport {
    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.log.push(TransportCall::Receive);
        match self.script.pop_front() {
            Some(ReceiveStep::Data(bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                Ok(n)
            }
            Some(ReceiveStep::Error(kind)) => Err(io::Error::new(kind, "scripted receive failure")),
            Some(ReceiveStep::Eof) | None => Ok(0),
        }
    }

    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(kind) = self.fail_sends {
            return Err(io::Error::new(kind, "scripted send failure"));
        }
        self.log.push(TransportCall::Send(buf.to_vec()));
        Ok(buf.len())
    }

    fn shutdown_send(&mut self) -> io::Result<()> {
        self.log.push(TransportCall::ShutdownSend);
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.log.push(TransportCall::Close);
        Ok(())
    }
}
