//! Single field-device session orchestration.
//!
//! A [`Session`] turns a raw transport byte stream into validated, stamped
//! frames: it attaches the heartbeat, crc, and stamps stages in that fixed
//! order, routes integrity failures, pumps the transport in a read loop, and
//! tears everything down when a stage raises a fatal condition.
//!
//! The session itself never decides device-protocol semantics; it only does
//! integrity and framing plumbing and reports outward through signal and
//! alarm streams.

mod error;
mod router;
mod session;

pub use error::{Result, SessionError};
pub use session::{Phase, Session, SessionConfig, READ_BUFFER_SIZE};
