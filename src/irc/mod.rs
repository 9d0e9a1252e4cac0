//! IRC protocol layer: line parsing, the per-connection state machine and
//! the socket tasks that carry it.

pub mod commands;
pub mod connection;
pub mod error;
pub mod isupport;
pub mod manager;
pub mod message;
pub mod proxy;
pub mod sasl;
pub mod tls;
pub mod transport;
