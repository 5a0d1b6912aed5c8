use tokio::task::JoinHandle;

use crate::config::StageConfig;
use crate::error::Result;

/// A pluggable processing unit in a session pipeline.
///
/// `init` consumes the stage's configuration — sub-identity, event sinks,
/// cancellation token, tunables, and channel endpoints — and spawns the
/// stage's long-lived task. The wiring is immutable afterwards: a second
/// `init` fails, and the channel endpoints live until the task exits.
///
/// `init` must be called from within a Tokio runtime; it spawns the stage
/// task with `tokio::spawn`.
pub trait Stage: Send {
    /// Registry name this stage answers to.
    fn name(&self) -> &'static str;

    /// Wire the stage and start its task. Exactly-once.
    fn init(&mut self, config: StageConfig) -> Result<()>;

    /// Take the stage task's join handle for teardown. Yields once.
    fn handle(&mut self) -> Option<JoinHandle<()>>;
}
