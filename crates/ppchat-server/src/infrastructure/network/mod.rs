//! Network infrastructure for the server.
//!
//! # Sub-modules
//!
//! - **`registry`** – Owns the listening socket, accepts clients and runs
//!   one `ConnectionSession` thread per client until shutdown.

pub mod registry;

pub use registry::{ActiveSessions, SessionRegistry};
