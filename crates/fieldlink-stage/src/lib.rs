//! Pluggable processing stages for field-device pipelines.
//!
//! A stage is a long-lived task behind a channel interface: it is handed its
//! configuration and channel endpoints exactly once through [`Stage::init`],
//! reports outward through shared [`EventSinks`], and stops when the session's
//! cancellation token fires. Three stages ship with this crate:
//!
//! - [`liveness`] — "heartbeat": counts consecutive missed activity windows
//! - [`integrity`] — "crc": CRC-16/Modbus filtering into pass/fail outputs
//! - [`stamp`] — "stamps": tags and timestamps frames for the output stream
//!
//! Sessions obtain stages through an injected [`StageRegistry`] so tests can
//! substitute fakes without global state.

mod config;
mod error;
mod event;
mod registry;
mod stage;

pub mod integrity;
pub mod liveness;
pub mod stamp;

pub use config::StageConfig;
pub use error::{Result, StageError};
pub use event::{Alarm, AlarmKind, EventSinks, Signal, SignalKind, DEFAULT_EVENT_CAPACITY};
pub use registry::{StageFactory, StageRegistry};
pub use stage::Stage;
