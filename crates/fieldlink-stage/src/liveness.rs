//! Heartbeat stage: watches data activity and raises a fatal signal once the
//! link has been silent (or explicitly absent) too many times in a row.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::StageConfig;
use crate::error::{Result, StageError};
use crate::event::{EventSinks, Signal, SignalKind};
use crate::stage::Stage;

/// Registry name of this stage.
pub const STAGE_NAME: &str = "heartbeat";

/// Default silent-window length before a miss is counted.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

/// Default consecutive-miss limit.
pub const DEFAULT_MISS_LIMIT: u32 = 3;

/// A present/absent notification indicating data activity since the last check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessEvent {
    /// Bytes arrived from the device.
    Present,
    /// The read loop observed end-of-stream.
    Absent,
}

/// Configuration consumed by [`LivenessMonitor`] at init.
pub struct LivenessConfig {
    /// Sub-identity, `"<session>:<remote>:heartbeat"`.
    pub unique_id: String,
    pub sinks: EventSinks,
    pub cancel: CancellationToken,
    /// A window this long without any event counts as one miss.
    pub timeout: Duration,
    /// Consecutive misses at which the fatal signal fires.
    pub miss_limit: u32,
    /// Present/absent notifications from the read loop.
    pub events: mpsc::Receiver<LivenessEvent>,
}

/// The heartbeat stage.
///
/// An `Absent` event and a silent timeout window each count as one miss; a
/// `Present` event resets the count. Reaching the limit emits exactly one
/// fatal-liveness signal and cancels the session token.
#[derive(Default)]
pub struct LivenessMonitor {
    handle: Option<JoinHandle<()>>,
    initialized: bool,
}

impl LivenessMonitor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Stage for LivenessMonitor {
    fn name(&self) -> &'static str {
        STAGE_NAME
    }

    fn init(&mut self, config: StageConfig) -> Result<()> {
        if self.initialized {
            return Err(StageError::AlreadyInitialized(STAGE_NAME));
        }
        let config = match config {
            StageConfig::Liveness(config) => config,
            other => {
                return Err(StageError::ConfigMismatch {
                    stage: STAGE_NAME,
                    got: other.kind(),
                })
            }
        };
        self.initialized = true;
        self.handle = Some(tokio::spawn(run(config)));
        Ok(())
    }

    fn handle(&mut self) -> Option<JoinHandle<()>> {
        self.handle.take()
    }
}

async fn run(mut config: LivenessConfig) {
    let mut misses = 0u32;
    loop {
        let event = tokio::select! {
            _ = config.cancel.cancelled() => break,
            event = tokio::time::timeout(config.timeout, config.events.recv()) => event,
        };

        match event {
            Ok(Some(LivenessEvent::Present)) => {
                misses = 0;
                continue;
            }
            Ok(Some(LivenessEvent::Absent)) => misses += 1,
            // Read loop gone; the session is being dismantled.
            Ok(None) => break,
            // Silent window.
            Err(_) => misses += 1,
        }

        // Only a counted miss can reach the limit; activity never does.
        if misses >= config.miss_limit {
            tracing::warn!(id = %config.unique_id, misses, "liveness miss limit reached");
            config
                .sinks
                .signal(Signal::new(
                    SignalKind::FatalLiveness,
                    config.unique_id.clone(),
                    format!(
                        "{misses} consecutive liveness misses (limit {})",
                        config.miss_limit
                    ),
                ))
                .await;
            config.cancel.cancel();
            break;
        }
    }
}
