//! Transport abstraction for field-device sessions.
//!
//! A [`Transport`] is a connected byte source with a remote-address accessor.
//! Sessions read from it and never write; device-side connection management
//! (serial line discipline, SNMP addressing) lives outside this crate.

mod error;
mod identity;
mod net;
mod traits;

pub use error::{Result, TransportError};
pub use identity::{Identity, TransportKind};
pub use net::{TcpTransport, UdpTransport};
pub use traits::Transport;
