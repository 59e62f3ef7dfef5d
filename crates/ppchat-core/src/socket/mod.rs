//! Thin sockets layer under the session engine.
//!
//! - [`Transport`] is the seam the receive loop drives: receive, send,
//!   shutdown-send, close.  `TcpStream` implements it for real traffic; the
//!   [`mock`] module provides a scripted fake for tests.
//! - [`SocketHandle`] owns one transport and carries the explicit "invalid"
//!   state.  Closing is idempotent: the first call releases the transport,
//!   later calls do nothing.
//! - [`bind_listener`] and [`connect`] wrap address resolution, socket
//!   creation, option-setting, bind/listen and connect, translating failures
//!   into [`NetError`].

pub mod mock;

use std::io::{self, Read, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, error, warn};

use crate::error::{describe_os_error, NetError};

/// Pending-connection backlog handed to `listen`.
pub const LISTEN_BACKLOG: i32 = 128;

/// Byte-stream operations the session engine needs from a connected socket.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send {
    /// Reads into `buf`; `Ok(0)` means the peer closed its sending side.
    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes as much of `buf` as the socket accepts in one call.
    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Signals the peer that no more data will be sent.
    fn shutdown_send(&mut self) -> io::Result<()>;

    /// Releases the connection.  Called at most once per handle.
    fn close(&mut self) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read(buf)
    }

    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write(buf)
    }

    fn shutdown_send(&mut self) -> io::Result<()> {
        self.shutdown(Shutdown::Write)
    }

    fn close(&mut self) -> io::Result<()> {
        // The descriptor itself goes away when the stream is dropped.
        match self.shutdown(Shutdown::Both) {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

/// Exclusive owner of one connected transport.
///
/// A handle is either valid (holds a transport) or invalid.  Dropping a
/// valid handle closes it.
pub struct SocketHandle<T: Transport> {
    inner: Option<T>,
}

impl<T: Transport> SocketHandle<T> {
    /// A handle that is not connected to anything.
    pub const INVALID: Self = Self { inner: None };

    pub fn new(transport: T) -> Self {
        Self {
            inner: Some(transport),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.inner.is_some()
    }

    pub fn transport_mut(&mut self) -> Option<&mut T> {
        self.inner.as_mut()
    }

    /// Closes the transport if the handle is still valid.
    ///
    /// Returns `true` when this call performed the close, `false` when the
    /// handle was already invalid.
    pub fn close(&mut self) -> bool {
        match self.inner.take() {
            Some(mut transport) => {
                if let Err(e) = transport.close() {
                    debug!("socket close reported: {}", describe_os_error(&e));
                }
                true
            }
            None => false,
        }
    }
}

impl<T: Transport> Drop for SocketHandle<T> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Writes all of `bytes`, retrying short sends.
///
/// # Errors
///
/// Propagates the first send error; a send that accepts zero bytes is
/// reported as `WriteZero`.
pub fn send_all<T: Transport + ?Sized>(transport: &mut T, mut bytes: &[u8]) -> io::Result<()> {
    while !bytes.is_empty() {
        match transport.send(bytes) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "socket accepted no bytes",
                ))
            }
            Ok(n) => bytes = &bytes[n..],
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Puts an accepted or connected stream into the mode the receive loop
/// expects: blocking, with a read timeout so the loop can notice the quit
/// flag between reads.
pub fn prepare_session_stream(stream: &TcpStream, read_timeout: Duration) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(read_timeout.max(Duration::from_millis(1))))
}

/// Parses a caller-supplied port string.
pub fn parse_port(host: &str, port: &str) -> Result<u16, NetError> {
    port.trim()
        .parse::<u16>()
        .map_err(|e| NetError::AddressResolutionFailed {
            host: host.to_string(),
            port: port.to_string(),
            source: io::Error::new(io::ErrorKind::InvalidInput, e),
        })
}

/// Creates, configures, binds and starts listening on a passive socket.
///
/// A dual-stack IPv6 socket (`IPV6_V6ONLY` off, IPv4 clients appear as
/// IPv4-mapped addresses) is tried first; if that cannot be set up the
/// listener falls back to IPv4 only.
///
/// # Errors
///
/// Returns the IPv4 attempt's error when both attempts fail.
pub fn bind_listener(port: &str) -> Result<TcpListener, NetError> {
    let port = parse_port("::", port)?;

    let v6 = SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port);
    match bind_with(v6, true) {
        Ok(listener) => Ok(listener),
        Err(e) => {
            warn!("dual-stack listener unavailable ({e}); falling back to IPv4");
            bind_with(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port), false)
        }
    }
}

/// Binds a listener on one specific address.
pub fn bind_with(addr: SocketAddr, dual_stack: bool) -> Result<TcpListener, NetError> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(|source| NetError::SocketCreateFailed { source })?;

    if dual_stack && addr.is_ipv6() {
        if let Err(e) = socket.set_only_v6(false) {
            error!(
                "couldn't turn off IPV6_V6ONLY, IPv4 clients won't be able to connect: {}",
                describe_os_error(&e)
            );
        }
    }

    socket
        .bind(&addr.into())
        .map_err(|source| NetError::BindFailed { addr, source })?;
    socket
        .listen(LISTEN_BACKLOG)
        .map_err(|source| NetError::ListenFailed { addr, source })?;

    Ok(socket.into())
}

/// Resolves `host:port` and connects to the first address that accepts.
///
/// IPv6 results are tried before IPv4 ones.
///
/// # Errors
///
/// - [`NetError::AddressResolutionFailed`] for a bad port or unknown host.
/// - [`NetError::ConnectFailed`] carrying the last connect error when no
///   address accepted.
pub fn connect(host: &str, port: &str) -> Result<(TcpStream, SocketAddr), NetError> {
    let port_number = parse_port(host, port)?;
    let resolve_failed = |source: io::Error| NetError::AddressResolutionFailed {
        host: host.to_string(),
        port: port.to_string(),
        source,
    };

    let mut addresses: Vec<SocketAddr> = (host, port_number)
        .to_socket_addrs()
        .map_err(resolve_failed)?
        .collect();
    addresses.sort_by_key(|a| a.is_ipv4());

    let mut last_error =
        io::Error::new(io::ErrorKind::AddrNotAvailable, "host resolved to no addresses");
    for addr in addresses {
        match TcpStream::connect(addr) {
            Ok(stream) => return Ok((stream, addr)),
            Err(e) => {
                debug!("connect to {addr} failed: {e}");
                last_error = e;
            }
        }
    }

    Err(NetError::ConnectFailed {
        host: host.to_string(),
        port: port.to_string(),
        source: last_error,
    })
}

/// Text form of a peer's IP address, as shown in logs.
pub fn address_to_text(addr: &SocketAddr) -> String {
    addr.ip().to_string()
}
