//! # ppchat-core
//!
//! Shared library for the ppchat client and server containing the
//! connection-session engine, the bounded console command queue, the
//! network byte-order codec, and the thin sockets layer they sit on.
//!
//! This crate is used by both the server and client applications.
//!
//! # Architecture overview
//!
//! ppchat is a plain TCP chat tool: the server accepts any number of clients
//! and logs (optionally echoes back) whatever they send; the client connects
//! to one server at a time and sends lines typed on the console.
//!
//! - **`byte_order`** – Host/network byte-order conversion for buffers of any
//!   width, plus fixed-width helpers for the primitive numeric types.
//!
//! - **`queue`** – `BoundedCommandQueue`: a fixed-capacity ring of fixed-size
//!   text slots that hands console lines from the reader thread to the main
//!   dispatch loop.
//!
//! - **`session`** – `ConnectionSession`: the per-connection receive loop that
//!   turns reads into messages, classifies socket failures, and tears the
//!   connection down.
//!
//! - **`socket`** – The `Transport` seam the session drives, the
//!   `SocketHandle` with its idempotent close, and the listener/connect
//!   helpers.
//!
//! - **`context`** – Process-wide state (quit flag, echo flag, traffic
//!   counters) shared by every thread through an `Arc`.
//!
//! - **`console`**, **`config`**, **`error`** – Console reader thread, TOML
//!   configuration, and the error taxonomy.

pub mod byte_order;
pub mod config;
pub mod console;
pub mod context;
pub mod error;
pub mod queue;
pub mod session;
pub mod socket;
pub mod stats;

pub use byte_order::{host_to_network, network_to_host, NetworkOrder};
pub use config::{ConfigError, PpchatConfig};
pub use console::ConsoleInput;
pub use context::SharedContext;
pub use error::{describe_os_error, NetError, ReceiveFailure};
pub use queue::BoundedCommandQueue;
pub use session::{
    CloseReason, ConnectionSession, EchoPolicy, Message, SessionEvent, SessionId, SessionState,
    SessionSummary,
};
pub use socket::{send_all, SocketHandle, Transport};
pub use stats::{StatsSnapshot, TrafficCounters};

/// Port used when the caller does not supply one.
pub const DEFAULT_PORT: &str = "1337";
/// Receive buffer capacity `R`; a single message carries at most `R - 1` bytes.
pub const RECEIVE_BUFFER_SIZE: usize = 4096;
/// Size in bytes of one console command queue slot.
pub const INPUT_QUEUE_ITEM_SIZE: usize = 256;
/// Number of slots in the console command queue.
pub const INPUT_QUEUE_MAX_ITEMS: usize = 4;
