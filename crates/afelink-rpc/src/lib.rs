//! Request/response correlation for the AFE bridge JSON protocol.
//!
//! Requests are `{"method":..,"id":..,"params":{..}}` objects written to the
//! link; the first frame read back is taken as the response and checked
//! against the request id. One request is in flight per connection.
//!
//! ```no_run
//! # fn main() -> afelink_rpc::Result<()> {
//! use afelink_rpc::{params, Connection};
//! use afelink_transport::{SerialConfig, SerialStream};
//!
//! let port = SerialStream::open(&SerialConfig::new("/dev/ttyACM0"))?;
//! let mut conn = Connection::open(port);
//! if let Some(resp) = conn.exchange_request("rd", params([("address", 0x0400u32)]), None)? {
//!     println!("{}", resp.result);
//! }
//! # Ok(())
//! # }
//! ```

pub mod canonical;
pub mod connection;
mod correlate;
pub mod envelope;
pub mod error;
pub mod register;
pub mod response;
pub mod shared;

#[cfg(feature = "async")]
pub mod async_connection;

pub use canonical::{canonicalize, to_wire_u32, CANONICAL_FIELDS};
pub use connection::{Connection, ConnectionConfig, Exchange};
pub use envelope::{params, Envelope, Params};
pub use error::{Result, RpcError};
pub use register::{
    clear_bits, poll_register, read_fifo, read_register, reset, set_bits, write_masked,
    write_register, PollConfig, DONE,
};
pub use response::{Reply, Response};
pub use shared::SharedConnection;

#[cfg(feature = "async")]
pub use async_connection::{AsyncConnection, SharedAsyncConnection};
