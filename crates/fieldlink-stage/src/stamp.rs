//! Stamps stage: finalizes frames for the external consumer by attaching the
//! session's stamp tag and, optionally, an arrival timestamp.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{BufMut, Bytes, BytesMut};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::StageConfig;
use crate::error::{Result, StageError};
use crate::event::EventSinks;
use crate::stage::Stage;

/// Registry name of this stage.
pub const STAGE_NAME: &str = "stamps";

/// Default separator token between stamp fields and the frame body.
pub const DEFAULT_SEPARATOR: &[u8] = b"/-/";

/// Where stamp metadata is placed relative to the frame body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StampMode {
    /// `stamp [sep millis] sep body`
    Head,
    /// `body sep stamp [sep millis]`
    Tail,
}

/// Configuration consumed by [`StampFramer`] at init.
pub struct StampConfig {
    /// Sub-identity, `"<session>:<remote>:stamps"`.
    pub unique_id: String,
    pub sinks: EventSinks,
    pub cancel: CancellationToken,
    pub mode: StampMode,
    /// Separator token between fields.
    pub separator: Bytes,
    /// Attach a Unix-epoch millisecond timestamp to every frame.
    pub auto_timestamp: bool,
    /// Stamp tag, conventionally the session identity.
    pub stamp: Bytes,
    /// Integrity-passed frames from the dispatch router.
    pub raw: mpsc::Receiver<Bytes>,
    /// Finalized frames for the external consumer.
    pub out: mpsc::Sender<Bytes>,
}

/// The stamps stage.
#[derive(Default)]
pub struct StampFramer {
    handle: Option<JoinHandle<()>>,
    initialized: bool,
}

impl StampFramer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Stage for StampFramer {
    fn name(&self) -> &'static str {
        STAGE_NAME
    }

    fn init(&mut self, config: StageConfig) -> Result<()> {
        if self.initialized {
            return Err(StageError::AlreadyInitialized(STAGE_NAME));
        }
        let config = match config {
            StageConfig::Stamp(config) => config,
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

async fn run(mut config: StampConfig) {
    loop {
        let frame = tokio::select! {
            _ = config.cancel.cancelled() => break,
            frame = config.raw.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let stamped = compose(&config, &frame, now_unix_millis());
        let delivered = tokio::select! {
            _ = config.cancel.cancelled() => false,
            sent = config.out.send(stamped) => sent.is_ok(),
        };
        if !delivered {
            break;
        }
    }
}

fn compose(config: &StampConfig, body: &[u8], millis: u128) -> Bytes {
    let timestamp = config.auto_timestamp.then(|| millis.to_string());
    let mut out = BytesMut::with_capacity(
        body.len()
            + config.stamp.len()
            + 2 * config.separator.len()
            + timestamp.as_ref().map_or(0, String::len),
    );

    match config.mode {
        StampMode::Head => {
            out.put_slice(&config.stamp);
            out.put_slice(&config.separator);
            if let Some(timestamp) = &timestamp {
                out.put_slice(timestamp.as_bytes());
                out.put_slice(&config.separator);
            }
            out.put_slice(body);
        }
        StampMode::Tail => {
            out.put_slice(body);
            out.put_slice(&config.separator);
            out.put_slice(&config.stamp);
            if let Some(timestamp) = &timestamp {
                out.put_slice(&config.separator);
                out.put_slice(timestamp.as_bytes());
            }
        }
    }
    out.freeze()
}

fn now_unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}
