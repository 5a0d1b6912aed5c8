//! Session pipelines for byte-stream field devices.
//!
//! fieldlink connects to a device over a byte transport and runs the inbound
//! stream through a three-stage pipeline: a heartbeat monitor that watches
//! read cadence, a crc filter that drops corrupt frames, and a stamping
//! framer that tags surviving frames with the session identity. Signals and
//! alarms flow out on shared channels so one supervisor can watch a fleet of
//! sessions.
//!
//! # Crate Structure
//!
//! - [`transport`] — Connected byte sources (TCP, connected UDP) and the
//!   session identity grammar
//! - [`stage`] — The pluggable pipeline stages, their registry, and the
//!   signal/alarm event types
//! - [`session`] — Session lifecycle: attachment, pipeline wiring, the read
//!   loop, and teardown

/// Re-export transport types.
pub mod transport {
    pub use fieldlink_transport::*;
}

/// Re-export stage types.
pub mod stage {
    pub use fieldlink_stage::*;
}

/// Re-export session types.
pub mod session {
    pub use fieldlink_session::*;
}
