use serde::Serialize;
use tokio::sync::mpsc;

/// Default bound for the signal and alarm channels.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Signal kinds delivered outward to the supervising layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalKind {
    /// Session pipeline fully wired.
    InitSuccess,
    /// Read loop started.
    Running,
    /// A failed frame matched the device announcement marker.
    NewDeviceAnnouncement,
    /// Liveness consecutive-miss limit exceeded; session must tear down.
    FatalLiveness,
    /// Integrity consecutive-failure limit exceeded; session must tear down.
    FatalIntegrity,
}

impl SignalKind {
    /// True for signal kinds whose receipt mandates session teardown.
    pub fn is_fatal(self) -> bool {
        matches!(self, SignalKind::FatalLiveness | SignalKind::FatalIntegrity)
    }
}

/// Alarm kinds delivered outward to the supervising layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlarmKind {
    DuplicateAttachment,
    UnknownStage,
    StageInitFailed,
    ConfigurationError,
    ReadConnectionError,
    UnresolvedSource,
}

/// A tagged outward event; never inspected by the stage that emits it.
#[derive(Debug, Clone, Serialize)]
pub struct Signal {
    pub kind: SignalKind,
    /// Identity of the session or stage that raised the signal.
    pub origin: String,
    pub detail: String,
}

impl Signal {
    pub fn new(kind: SignalKind, origin: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            origin: origin.into(),
            detail: detail.into(),
        }
    }
}

/// A tagged outward error event; reaction is the consumer's responsibility.
#[derive(Debug, Clone, Serialize)]
pub struct Alarm {
    pub kind: AlarmKind,
    /// Identity of the session or stage that raised the alarm.
    pub origin: String,
    pub detail: String,
}

impl Alarm {
    pub fn new(kind: AlarmKind, origin: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            origin: origin.into(),
            detail: detail.into(),
        }
    }
}

/// Shared signal/alarm senders handed to every stage of a session.
///
/// Multiple writers, one logical consumer above the session layer. Sends on a
/// closed sink are logged and dropped rather than treated as failures: losing
/// the supervisor must never wedge the pipeline.
#[derive(Debug, Clone)]
pub struct EventSinks {
    signals: mpsc::Sender<Signal>,
    alarms: mpsc::Sender<Alarm>,
}

impl EventSinks {
    /// Wrap existing senders.
    pub fn new(signals: mpsc::Sender<Signal>, alarms: mpsc::Sender<Alarm>) -> Self {
        Self { signals, alarms }
    }

    /// Create sinks plus their consumer ends with the given channel bound.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<Signal>, mpsc::Receiver<Alarm>) {
        let (signal_tx, signal_rx) = mpsc::channel(capacity);
        let (alarm_tx, alarm_rx) = mpsc::channel(capacity);
        (Self::new(signal_tx, alarm_tx), signal_rx, alarm_rx)
    }

    /// True once either consumer end has been dropped.
    pub fn is_closed(&self) -> bool {
        self.signals.is_closed() || self.alarms.is_closed()
    }

    /// Deliver a signal, awaiting sink capacity.
    pub async fn signal(&self, signal: Signal) {
        if self.signals.send(signal).await.is_err() {
            tracing::debug!("signal sink closed, event dropped");
        }
    }

    /// Deliver an alarm, awaiting sink capacity.
    pub async fn alarm(&self, alarm: Alarm) {
        if self.alarms.send(alarm).await.is_err() {
            tracing::debug!("alarm sink closed, event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_arrive_in_order() {
        let (sinks, mut signals, mut alarms) = EventSinks::bounded(DEFAULT_EVENT_CAPACITY);

        sinks.signal(Signal::new(SignalKind::Running, "id", "")).await;
        sinks
            .alarm(Alarm::new(AlarmKind::UnknownStage, "id", "bogus"))
            .await;

        assert_eq!(signals.recv().await.unwrap().kind, SignalKind::Running);
        let alarm = alarms.recv().await.unwrap();
        assert_eq!(alarm.kind, AlarmKind::UnknownStage);
        assert_eq!(alarm.detail, "bogus");
    }

    #[tokio::test]
    async fn closed_sink_drops_event_without_error() {
        let (sinks, signals, alarms) = EventSinks::bounded(1);
        drop(signals);
        drop(alarms);

        assert!(sinks.is_closed());
        // Must not panic or block.
        sinks.signal(Signal::new(SignalKind::Running, "id", "")).await;
        sinks.alarm(Alarm::new(AlarmKind::UnresolvedSource, "id", "")).await;
    }

    #[test]
    fn fatal_kind_classification() {
        assert!(SignalKind::FatalLiveness.is_fatal());
        assert!(SignalKind::FatalIntegrity.is_fatal());
        assert!(!SignalKind::InitSuccess.is_fatal());
        assert!(!SignalKind::Running.is_fatal());
        assert!(!SignalKind::NewDeviceAnnouncement.is_fatal());
    }
}
