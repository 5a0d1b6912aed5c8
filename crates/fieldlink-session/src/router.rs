use bytes::Bytes;
use fieldlink_stage::{Alarm, AlarmKind, EventSinks, Signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Marker announcing a factory-fresh device: ASCII "IO".
///
/// Devices introduce themselves with a fixed 4-byte frame that carries no
/// check value and therefore always lands on the crc fail output.
pub(crate) const ANNOUNCEMENT_MARKER: [u8; 2] = [0x49, 0x4F];

/// Length of a device announcement frame.
pub(crate) const ANNOUNCEMENT_LEN: usize = 4;

/// Classify every integrity-failed frame into exactly one outward event.
pub(crate) fn spawn_failure_classifier(
    identity: String,
    mut failed: mpsc::Receiver<Bytes>,
    sinks: EventSinks,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => break,
                frame = failed.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };

            if frame.len() == ANNOUNCEMENT_LEN && frame[..2] == ANNOUNCEMENT_MARKER {
                // Detail carries the text form plus the exact bytes as hex;
                // the two device-ID bytes need not be valid UTF-8.
                sinks
                    .signal(Signal::new(
                        SignalKind::NewDeviceAnnouncement,
                        identity.clone(),
                        format!(
                            "{} (hex {})",
                            String::from_utf8_lossy(&frame),
                            hex::encode(&frame)
                        ),
                    ))
                    .await;
            } else {
                sinks
                    .alarm(Alarm::new(
                        AlarmKind::UnresolvedSource,
                        identity.clone(),
                        hex::encode(&frame),
                    ))
                    .await;
            }
        }
    })
}

/// Forward every integrity-passed frame to the stamps input, unmodified and
/// in arrival order.
pub(crate) fn spawn_pass_forwarder(
    mut passed: mpsc::Receiver<Bytes>,
    stamps: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => break,
                frame = passed.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };

            let delivered = tokio::select! {
                _ = cancel.cancelled() => false,
                sent = stamps.send(frame) => sent.is_ok(),
            };
            if !delivered {
                break;
            }
        }
    })
}
