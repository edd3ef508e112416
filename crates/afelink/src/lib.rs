//! Host-side JSON-RPC link to AFE bridge firmware over serial.
//!
//! The bridge exchanges bare JSON objects over a serial line. afelink frames
//! them by brace balance, correlates responses with requests by id, and
//! exposes register-level helpers on top.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte sources with bounded-time reads (serial ports, sockets)
//! - [`frame`]: brace-balanced frame accumulator and timeout guard
//! - [`rpc`]: request envelope, response correlation, register helpers

/// Re-export transport types.
pub mod transport {
    pub use afelink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use afelink_frame::*;
}

/// Re-export request/response types.
pub mod rpc {
    pub use afelink_rpc::*;
}

pub use afelink_rpc::{params, Connection, ConnectionConfig, Exchange, Response, RpcError};
