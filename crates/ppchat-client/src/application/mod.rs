//! Application layer of the client: console commands and their execution.
//!
//! # Sub-modules
//!
//! - **`commands`** – Parses console lines into [`commands::ClientCommand`]s.
//!   Plain text is an implicit `/send`.
//! - **`dispatch`** – Holds at most one connection and executes commands
//!   against it.  Connections are reached through the [`dispatch::Connector`]
//!   and [`dispatch::ChatConnection`] traits so this layer never touches a
//!   socket.
//! - **`mock`** – In-memory connector for unit tests.

pub mod commands;
pub mod dispatch;
pub mod mock;
