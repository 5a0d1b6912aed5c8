//! CRC stage: validates the trailing CRC-16/Modbus check value on each frame
//! and splits the stream into pass and fail outputs.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::StageConfig;
use crate::error::{Result, StageError};
use crate::event::{EventSinks, Signal, SignalKind};
use crate::stage::Stage;

/// Registry name of this stage.
pub const STAGE_NAME: &str = "crc";

/// Default consecutive-failure limit.
pub const DEFAULT_FAIL_LIMIT: u32 = 20;

/// Smallest checkable frame: one body byte plus the two check bytes.
pub const MIN_FRAME_LEN: usize = 3;

/// CRC-16/Modbus over `data` (poly 0xA001 reflected, init 0xFFFF).
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0xFFFFu16;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Append the check value to a frame body, in the given byte order.
///
/// Mainly useful for tests and device simulators.
pub fn seal(body: &[u8], big_endian: bool) -> Bytes {
    let crc = crc16(body);
    let mut frame = BytesMut::with_capacity(body.len() + 2);
    frame.put_slice(body);
    if big_endian {
        frame.put_u16(crc);
    } else {
        frame.put_u16_le(crc);
    }
    frame.freeze()
}

/// Check a full frame's trailing CRC.
pub fn verify(frame: &[u8], big_endian: bool) -> bool {
    if frame.len() < MIN_FRAME_LEN {
        return false;
    }
    let (body, check) = frame.split_at(frame.len() - 2);
    let expected = if big_endian {
        u16::from_be_bytes([check[0], check[1]])
    } else {
        u16::from_le_bytes([check[0], check[1]])
    };
    crc16(body) == expected
}

/// Configuration consumed by [`IntegrityFilter`] at init.
pub struct IntegrityConfig {
    /// Sub-identity, `"<session>:<remote>:crc"`.
    pub unique_id: String,
    pub sinks: EventSinks,
    pub cancel: CancellationToken,
    /// Byte order of the trailing check value.
    pub big_endian: bool,
    /// Consecutive failures at which the fatal signal fires.
    pub fail_limit: u32,
    /// Raw frames from the read loop.
    pub raw: mpsc::Receiver<Bytes>,
    /// Frames whose check passed, forwarded unmodified.
    pub pass: mpsc::Sender<Bytes>,
    /// Frames whose check failed, for the dispatch router to classify.
    pub fail: mpsc::Sender<Bytes>,
}

/// The crc stage.
///
/// Every received frame goes to exactly one output. A pass resets the
/// consecutive-failure count; reaching the limit emits exactly one
/// fatal-integrity signal and cancels the session token.
#[derive(Default)]
pub struct IntegrityFilter {
    handle: Option<JoinHandle<()>>,
    initialized: bool,
}

impl IntegrityFilter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Stage for IntegrityFilter {
    fn name(&self) -> &'static str {
        STAGE_NAME
    }

    fn init(&mut self, config: StageConfig) -> Result<()> {
        if self.initialized {
            return Err(StageError::AlreadyInitialized(STAGE_NAME));
        }
        let config = match config {
            StageConfig::Integrity(config) => config,
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

async fn run(mut config: IntegrityConfig) {
    let mut consecutive_failures = 0u32;
    loop {
        let frame = tokio::select! {
            _ = config.cancel.cancelled() => break,
            frame = config.raw.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        if verify(&frame, config.big_endian) {
            consecutive_failures = 0;
            let delivered = tokio::select! {
                _ = config.cancel.cancelled() => false,
                sent = config.pass.send(frame) => sent.is_ok(),
            };
            if !delivered {
                break;
            }
        } else {
            consecutive_failures += 1;
            tracing::debug!(
                id = %config.unique_id,
                consecutive_failures,
                "frame failed integrity check"
            );
            let delivered = tokio::select! {
                _ = config.cancel.cancelled() => false,
                sent = config.fail.send(frame) => sent.is_ok(),
            };
            if !delivered {
                break;
            }
            if consecutive_failures >= config.fail_limit {
                config
                    .sinks
                    .signal(Signal::new(
                        SignalKind::FatalIntegrity,
                        config.unique_id.clone(),
                        format!(
                            "{consecutive_failures} consecutive integrity failures (limit {})",
                            config.fail_limit
                        ),
                    ))
                    .await;
                config.cancel.cancel();
                break;
            }
        }
    }
}
