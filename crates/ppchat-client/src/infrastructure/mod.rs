//! Infrastructure layer for the client.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `ppchat_core`, but MUST NOT be imported by the `application` layer.

pub mod network;
