//! Application layer of the server: console command handling.
//!
//! # Sub-modules
//!
//! - **`commands`** – Parses console lines into [`commands::ServerCommand`]s.
//! - **`dispatch`** – Executes commands against the shared context:
//!   shutdown, status report, echo toggle, help.
//!
//! Nothing here touches sockets.  The number of live sessions reaches the
//! dispatcher through the [`dispatch::SessionCounter`] trait, implemented by
//! the network layer.

pub mod commands;
pub mod dispatch;
