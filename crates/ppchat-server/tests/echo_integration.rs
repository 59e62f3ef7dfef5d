//! End-to-end echo tests against a running `SessionRegistry`.
//!
//! A registry is bound on an ephemeral port and its accept loop runs on a
//! background thread, exactly as in the binary.  A plain `TcpStream` plays
//! the client.
//!
//! - echo on: `"hello"` comes back byte-identical,
//! - echo off: nothing comes back,
//! - toggling echo through the console dispatcher takes effect for an
//!   already connected client.

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ppchat_core::config::SessionConfig;
use ppchat_core::SharedContext;
use ppchat_server::application::dispatch::ServerConsole;
use ppchat_server::infrastructure::network::SessionRegistry;

fn settings() -> SessionConfig {
    SessionConfig {
        receive_buffer_size: 4096,
        read_timeout_ms: 20,
    }
}

fn connect(port: u16) -> TcpStream {
    let stream = TcpStream::connect(("127.0.0.1", port)).expect("connect");
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream
}

fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met in time");
        std::thread::sleep(Duration::from_millis(5));
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[test]
fn test_echo_enabled_returns_hello() {
    // Arrange
    let ctx = SharedContext::with_echo(true);
    let registry = SessionRegistry::bind("0", Arc::clone(&ctx), settings()).unwrap();
    let port = registry.local_addr().port();
    let accept_thread = registry.spawn().unwrap();
    let mut client = connect(port);

    // Act
    client.write_all(b"hello").unwrap();
    let mut reply = [0u8; 5];
    client.read_exact(&mut reply).unwrap();

    // Assert
    assert_eq!(&reply, b"hello");

    ctx.request_quit();
    accept_thread.join().unwrap().unwrap();
}

#[test]
fn test_echo_disabled_sends_nothing_back() {
    // Arrange
    let ctx = SharedContext::new();
    let registry = SessionRegistry::bind("0", Arc::clone(&ctx), settings()).unwrap();
    let port = registry.local_addr().port();
    let accept_thread = registry.spawn().unwrap();
    let mut client = connect(port);

    // Act
    client.write_all(b"hello").unwrap();
    wait_for(|| ctx.stats().snapshot().messages_received >= 1);
    client
        .set_read_timeout(Some(Duration::from_millis(100)))
        .unwrap();
    let mut buf = [0u8; 16];
    let read = client.read(&mut buf);

    // Assert – the read times out; nothing was written back
    match read {
        Err(e) => assert!(matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)),
        Ok(n) => panic!("expected no echo, got {n} bytes"),
    }
    assert_eq!(ctx.stats().snapshot().messages_echoed_back, 0);

    ctx.request_quit();
    accept_thread.join().unwrap().unwrap();
}

#[test]
fn test_echo_toggle_from_console_applies_to_connected_client() {
    // Arrange
    let ctx = SharedContext::new();
    let registry = SessionRegistry::bind("0", Arc::clone(&ctx), settings()).unwrap();
    let port = registry.local_addr().port();
    let console = ServerConsole::new(Arc::clone(&ctx), registry.active_sessions_handle());
    let accept_thread = registry.spawn().unwrap();
    let mut client = connect(port);
    wait_for(|| console.status_report().contains("Active sessions: 1"));

    // Act
    console.handle_line("/echo_back");
    client.write_all(b"again").unwrap();
    let mut reply = [0u8; 5];
    client.read_exact(&mut reply).unwrap();

    // Assert
    assert_eq!(&reply, b"again");

    console.handle_line("/quit");
    accept_thread.join().unwrap().unwrap();
}

#[test]
fn test_client_disconnect_is_noticed_by_server() {
    let ctx = SharedContext::new();
    let registry = SessionRegistry::bind("0", Arc::clone(&ctx), settings()).unwrap();
    let port = registry.local_addr().port();
    let active = registry.active_sessions_handle();
    let accept_thread = registry.spawn().unwrap();

    let client = connect(port);
    wait_for(|| active.get() == 1);
    drop(client);
    wait_for(|| active.get() == 0);

    ctx.request_quit();
    accept_thread.join().unwrap().unwrap();
}
