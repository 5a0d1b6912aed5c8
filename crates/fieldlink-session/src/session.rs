use bytes::Bytes;
use fieldlink_stage::integrity::{self, IntegrityConfig};
use fieldlink_stage::liveness::{self, LivenessConfig, LivenessEvent};
use fieldlink_stage::stamp::{self, StampConfig, StampMode};
use fieldlink_stage::{
    Alarm, AlarmKind, EventSinks, Signal, SignalKind, Stage, StageConfig, StageRegistry,
};
use fieldlink_transport::Transport;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SessionError};
use crate::router;

/// Fixed read buffer size for the read loop.
pub const READ_BUFFER_SIZE: usize = 4096;

/// Inter-stage handoffs hold at most one frame in flight, so a slow stage
/// stalls its producer instead of buffering unbounded data.
const STAGE_CHANNEL_CAPACITY: usize = 1;

/// Session lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Constructed, nothing attached.
    Created,
    /// All three stages attached, routing tasks started.
    Configured,
    /// Read loop started.
    Running,
    /// A fatal condition cancelled the session token; teardown pending.
    Terminating,
    /// Transport released, tasks joined, stages detached.
    Destroyed,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Phase::Created => "created",
            Phase::Configured => "configured",
            Phase::Running => "running",
            Phase::Terminating => "terminating",
            Phase::Destroyed => "destroyed",
        }
    }
}

/// Session tunables, passed through to the stage configs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Heartbeat silent-window length.
    pub liveness_timeout: Duration,
    /// Heartbeat consecutive-miss limit.
    pub liveness_miss_limit: u32,
    /// Byte order of the trailing crc check value.
    pub integrity_big_endian: bool,
    /// Crc consecutive-failure limit.
    pub integrity_fail_limit: u32,
    /// Stamp placement.
    pub stamp_mode: StampMode,
    /// Separator token between stamp fields.
    pub stamp_separator: Bytes,
    /// Attach a millisecond timestamp to every output frame.
    pub auto_timestamp: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            liveness_timeout: liveness::DEFAULT_TIMEOUT,
            liveness_miss_limit: liveness::DEFAULT_MISS_LIMIT,
            integrity_big_endian: true,
            integrity_fail_limit: integrity::DEFAULT_FAIL_LIMIT,
            stamp_mode: StampMode::Head,
            stamp_separator: Bytes::from_static(stamp::DEFAULT_SEPARATOR),
            auto_timestamp: true,
        }
    }
}

struct AttachedStage {
    name: String,
    stage: Box<dyn Stage>,
}

/// A single field-device session.
///
/// Owns the transport, the attached stages, and every inter-stage channel.
/// Externally observed through the shared signal/alarm streams and the
/// stamped-frame output stream; torn down through [`Session::shutdown`] once
/// the cancellation token fires.
pub struct Session<T: Transport + 'static> {
    identity: String,
    config: SessionConfig,
    registry: StageRegistry,
    sinks: EventSinks,
    cancel: CancellationToken,
    phase: Phase,
    transport: Option<T>,
    attached: Vec<AttachedStage>,
    liveness_tx: Option<mpsc::Sender<LivenessEvent>>,
    integrity_tx: Option<mpsc::Sender<Bytes>>,
    output_rx: Option<mpsc::Receiver<Bytes>>,
    tasks: Vec<JoinHandle<()>>,
}

impl<T: Transport + 'static> Session<T> {
    /// Create an empty session keyed by `identity`
    /// (canonically `"<address-or-device>:<port-or-NULL>:<KIND>"`).
    pub fn new(identity: impl Into<String>, registry: StageRegistry, sinks: EventSinks) -> Self {
        Self {
            identity: identity.into(),
            config: SessionConfig::default(),
            registry,
            sinks,
            cancel: CancellationToken::new(),
            phase: Phase::Created,
            transport: None,
            attached: Vec::new(),
            liveness_tx: None,
            integrity_tx: None,
            output_rx: None,
            tasks: Vec::new(),
        }
    }

    /// Override the default tunables.
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// The session's external key.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        if self.phase == Phase::Running && self.cancel.is_cancelled() {
            Phase::Terminating
        } else {
            self.phase
        }
    }

    /// Names of the attached stages, in attachment order.
    pub fn attached_stages(&self) -> Vec<&str> {
        self.attached.iter().map(|s| s.name.as_str()).collect()
    }

    /// The token fatal conditions cancel; supervisors await it to observe
    /// the Running → Terminating transition.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Take the stamped-frame output stream. Yields once.
    pub fn take_output(&mut self) -> Option<mpsc::Receiver<Bytes>> {
        self.output_rx.take()
    }

    /// Attach the named stage with `config`.
    ///
    /// Every failure path emits exactly one alarm and returns `false` without
    /// mutating the session; success records the stage and emits nothing.
    pub(crate) async fn attach(&mut self, name: &str, config: StageConfig) -> bool {
        if self.attached.iter().any(|attached| attached.name == name) {
            self.sinks
                .alarm(Alarm::new(
                    AlarmKind::DuplicateAttachment,
                    self.identity.clone(),
                    format!("stage {name:?} is already attached to this session"),
                ))
                .await;
            return false;
        }

        let Some(mut stage) = self.registry.create(name) else {
            self.sinks
                .alarm(Alarm::new(
                    AlarmKind::UnknownStage,
                    self.identity.clone(),
                    format!("stage {name:?} is not registered"),
                ))
                .await;
            return false;
        };

        if let Err(err) = stage.init(config) {
            self.sinks
                .alarm(Alarm::new(
                    AlarmKind::StageInitFailed,
                    self.identity.clone(),
                    format!("stage {name:?} failed to initialize: {err}"),
                ))
                .await;
            return false;
        }

        self.attached.push(AttachedStage {
            name: name.to_string(),
            stage,
        });
        true
    }

    /// Wire the pipeline: attach heartbeat, crc, and stamps in that fixed
    /// order, then start the dispatch-router tasks.
    ///
    /// Preconditions are checked before any side effect. On a failed
    /// attachment the earlier stages stay attached (no rollback) and the
    /// error names the stage; the cause was already alarmed.
    pub async fn init(&mut self, transport: T) -> Result<()> {
        if self.phase != Phase::Created {
            return Err(SessionError::InvalidPhase {
                phase: self.phase.as_str(),
            });
        }
        if self.identity.is_empty() {
            self.sinks
                .alarm(Alarm::new(
                    AlarmKind::ConfigurationError,
                    self.identity.clone(),
                    "session identity is empty",
                ))
                .await;
            return Err(SessionError::MissingIdentity);
        }
        if self.sinks.is_closed() {
            return Err(SessionError::EventSinksClosed);
        }

        let remote = transport.remote_addr();
        self.transport = Some(transport);

        let (liveness_tx, liveness_rx) = mpsc::channel(STAGE_CHANNEL_CAPACITY);
        let config = StageConfig::Liveness(LivenessConfig {
            unique_id: format!("{}:{}:{}", self.identity, remote, liveness::STAGE_NAME),
            sinks: self.sinks.clone(),
            cancel: self.cancel.clone(),
            timeout: self.config.liveness_timeout,
            miss_limit: self.config.liveness_miss_limit,
            events: liveness_rx,
        });
        if !self.attach(liveness::STAGE_NAME, config).await {
            return Err(SessionError::AttachFailed {
                stage: liveness::STAGE_NAME,
            });
        }
        self.liveness_tx = Some(liveness_tx);

        let (raw_tx, raw_rx) = mpsc::channel(STAGE_CHANNEL_CAPACITY);
        let (pass_tx, pass_rx) = mpsc::channel(STAGE_CHANNEL_CAPACITY);
        let (fail_tx, fail_rx) = mpsc::channel(STAGE_CHANNEL_CAPACITY);
        let config = StageConfig::Integrity(IntegrityConfig {
            unique_id: format!("{}:{}:{}", self.identity, remote, integrity::STAGE_NAME),
            sinks: self.sinks.clone(),
            cancel: self.cancel.clone(),
            big_endian: self.config.integrity_big_endian,
            fail_limit: self.config.integrity_fail_limit,
            raw: raw_rx,
            pass: pass_tx,
            fail: fail_tx,
        });
        if !self.attach(integrity::STAGE_NAME, config).await {
            return Err(SessionError::AttachFailed {
                stage: integrity::STAGE_NAME,
            });
        }
        self.integrity_tx = Some(raw_tx);

        let (stamps_tx, stamps_rx) = mpsc::channel(STAGE_CHANNEL_CAPACITY);
        let (out_tx, out_rx) = mpsc::channel(STAGE_CHANNEL_CAPACITY);
        let config = StageConfig::Stamp(StampConfig {
            unique_id: format!("{}:{}:{}", self.identity, remote, stamp::STAGE_NAME),
            sinks: self.sinks.clone(),
            cancel: self.cancel.clone(),
            mode: self.config.stamp_mode,
            separator: self.config.stamp_separator.clone(),
            auto_timestamp: self.config.auto_timestamp,
            stamp: Bytes::copy_from_slice(self.identity.as_bytes()),
            raw: stamps_rx,
            out: out_tx,
        });
        if !self.attach(stamp::STAGE_NAME, config).await {
            return Err(SessionError::AttachFailed {
                stage: stamp::STAGE_NAME,
            });
        }
        self.output_rx = Some(out_rx);

        self.tasks.push(router::spawn_failure_classifier(
            self.identity.clone(),
            fail_rx,
            self.sinks.clone(),
            self.cancel.clone(),
        ));
        self.tasks.push(router::spawn_pass_forwarder(
            pass_rx,
            stamps_tx,
            self.cancel.clone(),
        ));

        self.phase = Phase::Configured;
        self.sinks
            .signal(Signal::new(
                SignalKind::InitSuccess,
                self.identity.clone(),
                "session pipeline configured",
            ))
            .await;
        Ok(())
    }

    /// Start the read loop. The transport moves into the loop task, which is
    /// its only reader for the rest of the session's life.
    pub async fn run(&mut self) -> Result<()> {
        if self.phase != Phase::Configured {
            return Err(match self.phase {
                Phase::Created => SessionError::NotConfigured,
                phase => SessionError::InvalidPhase {
                    phase: phase.as_str(),
                },
            });
        }
        let transport = self.transport.take().ok_or(SessionError::NotConfigured)?;
        let liveness = self.liveness_tx.clone().ok_or(SessionError::NotConfigured)?;
        let integrity = self.integrity_tx.clone().ok_or(SessionError::NotConfigured)?;

        self.sinks
            .signal(Signal::new(
                SignalKind::Running,
                self.identity.clone(),
                "read loop started",
            ))
            .await;

        self.tasks.push(spawn_read_loop(
            self.identity.clone(),
            transport,
            liveness,
            integrity,
            self.sinks.clone(),
            self.cancel.clone(),
        ));
        self.phase = Phase::Running;
        Ok(())
    }

    /// Deterministic teardown: cancel every task, join them all, detach the
    /// stages, release the transport.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        for mut attached in self.attached.drain(..) {
            if let Some(handle) = attached.stage.handle() {
                let _ = handle.await;
            }
        }
        self.transport = None;
        self.liveness_tx = None;
        self.integrity_tx = None;
        self.phase = Phase::Destroyed;
        tracing::debug!(id = %self.identity, "session destroyed");
    }
}

fn spawn_read_loop<T: Transport + 'static>(
    identity: String,
    mut transport: T,
    liveness: mpsc::Sender<LivenessEvent>,
    integrity: mpsc::Sender<Bytes>,
    sinks: EventSinks,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = [0u8; READ_BUFFER_SIZE];
        loop {
            let read = tokio::select! {
                _ = cancel.cancelled() => break,
                read = transport.read(&mut buf) => read,
            };

            match read {
                Err(err) => {
                    // Transient; keep reading.
                    sinks
                        .alarm(Alarm::new(
                            AlarmKind::ReadConnectionError,
                            identity.clone(),
                            err.to_string(),
                        ))
                        .await;
                }
                Ok(0) => {
                    // End-of-stream counts as one liveness miss; the
                    // heartbeat stage owns the decision to give up.
                    if !send_or_cancelled(&cancel, &liveness, LivenessEvent::Absent).await {
                        break;
                    }
                }
                Ok(n) => {
                    if !send_or_cancelled(&cancel, &liveness, LivenessEvent::Present).await {
                        break;
                    }
                    let frame = Bytes::copy_from_slice(&buf[..n]);
                    if !send_or_cancelled(&cancel, &integrity, frame).await {
                        break;
                    }
                }
            }
        }
        // Dropping the transport here releases the device link.
        tracing::debug!(id = %identity, "read loop stopped, transport released");
    })
}

/// Send that races the session token so a stalled downstream never prevents
/// teardown. `false` means the session is over (cancelled or receiver gone).
async fn send_or_cancelled<M>(
    cancel: &CancellationToken,
    tx: &mpsc::Sender<M>,
    message: M,
) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        sent = tx.send(message) => sent.is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io;

    use async_trait::async_trait;
    use fieldlink_stage::integrity::seal;
    use fieldlink_stage::{StageError, DEFAULT_EVENT_CAPACITY};

    use super::*;

    const IDENTITY: &str = "192.168.1.10:6668:TCP";

    enum Step {
        Data(Vec<u8>),
        Eof,
        Error(io::ErrorKind),
    }

    /// Replays a fixed script, then blocks forever.
    struct ScriptedTransport {
        script: VecDeque<Step>,
    }

    impl ScriptedTransport {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                script: steps.into_iter().collect(),
            }
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.script.pop_front() {
                Some(Step::Data(bytes)) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                Some(Step::Eof) => Ok(0),
                Some(Step::Error(kind)) => Err(io::Error::from(kind)),
                None => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }

        fn remote_addr(&self) -> String {
            "192.168.1.10:6668".to_string()
        }
    }

    /// Stage whose init always fails; for attachment-error tests.
    struct BrokenStage;

    impl Stage for BrokenStage {
        fn name(&self) -> &'static str {
            "broken"
        }
        fn init(&mut self, _config: StageConfig) -> fieldlink_stage::Result<()> {
            Err(StageError::AlreadyInitialized("broken"))
        }
        fn handle(&mut self) -> Option<JoinHandle<()>> {
            None
        }
    }

    /// Heartbeat stand-in that forwards liveness events to a test channel.
    struct RecordingLiveness {
        events_out: mpsc::Sender<LivenessEvent>,
        handle: Option<JoinHandle<()>>,
    }

    impl Stage for RecordingLiveness {
        fn name(&self) -> &'static str {
            liveness::STAGE_NAME
        }
        fn init(&mut self, config: StageConfig) -> fieldlink_stage::Result<()> {
            let StageConfig::Liveness(mut config) = config else {
                panic!("recording liveness handed a foreign config");
            };
            let out = self.events_out.clone();
            self.handle = Some(tokio::spawn(async move {
                while let Some(event) = config.events.recv().await {
                    if out.send(event).await.is_err() {
                        break;
                    }
                }
            }));
            Ok(())
        }
        fn handle(&mut self) -> Option<JoinHandle<()>> {
            self.handle.take()
        }
    }

    fn liveness_config(sinks: &EventSinks, cancel: &CancellationToken) -> StageConfig {
        let (_tx, events) = mpsc::channel(1);
        StageConfig::Liveness(LivenessConfig {
            unique_id: format!("{IDENTITY}:heartbeat"),
            sinks: sinks.clone(),
            cancel: cancel.clone(),
            timeout: liveness::DEFAULT_TIMEOUT,
            miss_limit: liveness::DEFAULT_MISS_LIMIT,
            events,
        })
    }

    fn session_with_builtins() -> (
        Session<ScriptedTransport>,
        mpsc::Receiver<Signal>,
        mpsc::Receiver<Alarm>,
    ) {
        let (sinks, signals, alarms) = EventSinks::bounded(DEFAULT_EVENT_CAPACITY);
        let session = Session::new(IDENTITY, StageRegistry::with_builtins(), sinks).with_config(
            SessionConfig {
                auto_timestamp: false,
                ..SessionConfig::default()
            },
        );
        (session, signals, alarms)
    }

    #[tokio::test]
    async fn attach_is_exactly_once_per_name() {
        let (mut session, _signals, mut alarms) = session_with_builtins();
        let sinks_probe = {
            let (sinks, _s, _a) = EventSinks::bounded(1);
            sinks
        };
        let cancel = session.cancel_token();

        assert!(session.attach("heartbeat", liveness_config(&sinks_probe, &cancel)).await);
        assert!(!session.attach("heartbeat", liveness_config(&sinks_probe, &cancel)).await);
        assert!(!session.attach("heartbeat", liveness_config(&sinks_probe, &cancel)).await);

        assert_eq!(session.attached_stages(), vec!["heartbeat"]);
        let first = alarms.try_recv().unwrap();
        assert_eq!(first.kind, AlarmKind::DuplicateAttachment);
        assert_eq!(first.origin, IDENTITY);
        let second = alarms.try_recv().unwrap();
        assert_eq!(second.kind, AlarmKind::DuplicateAttachment);
        assert!(alarms.try_recv().is_err());

        session.shutdown().await;
    }

    #[tokio::test]
    async fn attach_unknown_stage_alarms_once() {
        let (mut session, _signals, mut alarms) = session_with_builtins();
        let cancel = session.cancel_token();
        let sinks = {
            let (sinks, _s, _a) = EventSinks::bounded(1);
            sinks
        };

        assert!(!session.attach("bogus", liveness_config(&sinks, &cancel)).await);
        assert!(session.attached_stages().is_empty());

        let alarm = alarms.try_recv().unwrap();
        assert_eq!(alarm.kind, AlarmKind::UnknownStage);
        assert!(alarm.detail.contains("bogus"));
        assert!(alarms.try_recv().is_err());
    }

    #[tokio::test]
    async fn attach_reports_stage_init_failure() {
        let (sinks, _signals, mut alarms) = EventSinks::bounded(DEFAULT_EVENT_CAPACITY);
        let mut registry = StageRegistry::new();
        registry.register("broken", || Box::new(BrokenStage));
        let mut session: Session<ScriptedTransport> = Session::new(IDENTITY, registry, sinks);
        let cancel = session.cancel_token();
        let probe = {
            let (sinks, _s, _a) = EventSinks::bounded(1);
            sinks
        };

        assert!(!session.attach("broken", liveness_config(&probe, &cancel)).await);
        assert!(session.attached_stages().is_empty());

        let alarm = alarms.try_recv().unwrap();
        assert_eq!(alarm.kind, AlarmKind::StageInitFailed);
        assert!(alarm.detail.contains("already initialized"));
    }

    #[tokio::test]
    async fn init_rejects_empty_identity_before_any_side_effect() {
        let (sinks, _signals, mut alarms) = EventSinks::bounded(DEFAULT_EVENT_CAPACITY);
        let mut session = Session::new("", StageRegistry::with_builtins(), sinks);

        let err = session
            .init(ScriptedTransport::new(Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::MissingIdentity));
        assert!(session.attached_stages().is_empty());
        assert_eq!(session.phase(), Phase::Created);

        let alarm = alarms.try_recv().unwrap();
        assert_eq!(alarm.kind, AlarmKind::ConfigurationError);
    }

    #[tokio::test]
    async fn init_rejects_closed_event_sinks() {
        let (sinks, signals, alarms) = EventSinks::bounded(1);
        drop(signals);
        drop(alarms);
        let mut session = Session::new(IDENTITY, StageRegistry::with_builtins(), sinks);

        let err = session
            .init(ScriptedTransport::new(Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::EventSinksClosed));
        assert!(session.attached_stages().is_empty());
    }

    #[tokio::test]
    async fn init_attaches_stages_in_fixed_order() {
        let (mut session, mut signals, mut alarms) = session_with_builtins();

        session.init(ScriptedTransport::new(Vec::new())).await.unwrap();

        assert_eq!(session.attached_stages(), vec!["heartbeat", "crc", "stamps"]);
        assert_eq!(session.phase(), Phase::Configured);
        assert_eq!(signals.try_recv().unwrap().kind, SignalKind::InitSuccess);
        assert!(alarms.try_recv().is_err());

        session.shutdown().await;
        assert_eq!(session.phase(), Phase::Destroyed);
        assert!(session.attached_stages().is_empty());
    }

    #[tokio::test]
    async fn failed_crc_attach_leaves_heartbeat_attached() {
        let (sinks, mut signals, mut alarms) = EventSinks::bounded(DEFAULT_EVENT_CAPACITY);
        let mut registry = StageRegistry::with_builtins();
        registry.register("crc", || Box::new(BrokenStage));
        let mut session: Session<ScriptedTransport> = Session::new(IDENTITY, registry, sinks);

        let err = session
            .init(ScriptedTransport::new(Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::AttachFailed { stage: "crc" }));
        // No rollback of the earlier attachment.
        assert_eq!(session.attached_stages(), vec!["heartbeat"]);
        assert_eq!(alarms.try_recv().unwrap().kind, AlarmKind::StageInitFailed);
        assert!(signals.try_recv().is_err());

        session.shutdown().await;
    }

    #[tokio::test]
    async fn run_before_init_is_rejected() {
        let (mut session, _signals, _alarms) = session_with_builtins();
        assert!(matches!(
            session.run().await,
            Err(SessionError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn single_read_flows_to_stamped_output() {
        // One clean 10-byte read end to end: no errors, one stamped frame.
        let (mut session, mut signals, mut alarms) = session_with_builtins();
        let frame = seal(b"12345678", true);
        assert_eq!(frame.len(), 10);

        session
            .init(ScriptedTransport::new(vec![Step::Data(frame.to_vec())]))
            .await
            .unwrap();
        let mut output = session.take_output().unwrap();
        session.run().await.unwrap();

        let stamped = output.recv().await.unwrap();
        let mut expected = Vec::new();
        expected.extend_from_slice(IDENTITY.as_bytes());
        expected.extend_from_slice(b"/-/");
        expected.extend_from_slice(&frame);
        assert_eq!(stamped, Bytes::from(expected));

        assert_eq!(signals.recv().await.unwrap().kind, SignalKind::InitSuccess);
        assert_eq!(signals.recv().await.unwrap().kind, SignalKind::Running);
        assert!(alarms.try_recv().is_err());

        session.shutdown().await;
    }

    #[tokio::test]
    async fn read_bytes_produce_one_present_and_one_frame() {
        let (sinks, _signals, _alarms) = EventSinks::bounded(DEFAULT_EVENT_CAPACITY);
        let (events_tx, mut events_rx) = mpsc::channel(16);
        let mut registry = StageRegistry::with_builtins();
        registry.register("heartbeat", move || {
            Box::new(RecordingLiveness {
                events_out: events_tx.clone(),
                handle: None,
            })
        });
        let mut session = Session::new(IDENTITY, registry, sinks).with_config(SessionConfig {
            auto_timestamp: false,
            ..SessionConfig::default()
        });

        let frame = seal(b"reading", true);
        session
            .init(ScriptedTransport::new(vec![Step::Data(frame.to_vec())]))
            .await
            .unwrap();
        let mut output = session.take_output().unwrap();
        session.run().await.unwrap();

        assert_eq!(events_rx.recv().await.unwrap(), LivenessEvent::Present);
        let stamped = output.recv().await.unwrap();
        assert!(stamped.ends_with(&frame));
        assert!(events_rx.try_recv().is_err());

        session.shutdown().await;
    }

    #[tokio::test]
    async fn end_of_stream_is_a_transient_liveness_miss() {
        let (sinks, _signals, mut alarms) = EventSinks::bounded(DEFAULT_EVENT_CAPACITY);
        let (events_tx, mut events_rx) = mpsc::channel(16);
        let mut registry = StageRegistry::with_builtins();
        registry.register("heartbeat", move || {
            Box::new(RecordingLiveness {
                events_out: events_tx.clone(),
                handle: None,
            })
        });
        let mut session = Session::new(IDENTITY, registry, sinks);

        let frame = seal(b"after-eof", true);
        session
            .init(ScriptedTransport::new(vec![
                Step::Eof,
                Step::Eof,
                Step::Eof,
                Step::Data(frame.to_vec()),
            ]))
            .await
            .unwrap();
        let mut output = session.take_output().unwrap();
        session.run().await.unwrap();

        // One absent notification per end-of-stream, and the loop keeps going.
        for _ in 0..3 {
            assert_eq!(events_rx.recv().await.unwrap(), LivenessEvent::Absent);
        }
        assert_eq!(events_rx.recv().await.unwrap(), LivenessEvent::Present);
        assert!(output.recv().await.is_some());
        assert!(alarms.try_recv().is_err());

        session.shutdown().await;
    }

    #[tokio::test]
    async fn read_error_alarms_and_loop_continues() {
        let (mut session, _signals, mut alarms) = session_with_builtins();
        let frame = seal(b"after-err", true);

        session
            .init(ScriptedTransport::new(vec![
                Step::Error(io::ErrorKind::ConnectionReset),
                Step::Data(frame.to_vec()),
            ]))
            .await
            .unwrap();
        let mut output = session.take_output().unwrap();
        session.run().await.unwrap();

        assert!(output.recv().await.is_some());
        let alarm = alarms.recv().await.unwrap();
        assert_eq!(alarm.kind, AlarmKind::ReadConnectionError);

        session.shutdown().await;
    }

    #[tokio::test]
    async fn integrity_limit_tears_the_session_down() {
        let (sinks, mut signals, mut alarms) = EventSinks::bounded(DEFAULT_EVENT_CAPACITY);
        let mut session = Session::new(IDENTITY, StageRegistry::with_builtins(), sinks)
            .with_config(SessionConfig {
                integrity_fail_limit: 2,
                auto_timestamp: false,
                ..SessionConfig::default()
            });

        session
            .init(ScriptedTransport::new(vec![
                Step::Data(b"garbage-frame-1".to_vec()),
                Step::Data(b"garbage-frame-2".to_vec()),
            ]))
            .await
            .unwrap();
        session.run().await.unwrap();

        // Both failed frames are classified (neither is an announcement)...
        assert_eq!(alarms.recv().await.unwrap().kind, AlarmKind::UnresolvedSource);
        assert_eq!(alarms.recv().await.unwrap().kind, AlarmKind::UnresolvedSource);
        // ...and the second one trips the fatal limit.
        let fatal = loop {
            let signal = signals.recv().await.unwrap();
            if signal.kind.is_fatal() {
                break signal;
            }
        };
        assert_eq!(fatal.kind, SignalKind::FatalIntegrity);

        session.cancel_token().cancelled().await;
        assert_eq!(session.phase(), Phase::Terminating);
        session.shutdown().await;
        assert_eq!(session.phase(), Phase::Destroyed);
    }

    #[tokio::test]
    async fn announcement_frames_signal_new_device() {
        let (mut session, mut signals, mut alarms) = session_with_builtins();

        session
            .init(ScriptedTransport::new(vec![Step::Data(b"IO\x2a\x2b".to_vec())]))
            .await
            .unwrap();
        session.run().await.unwrap();

        let announcement = loop {
            let signal = signals.recv().await.unwrap();
            if signal.kind == SignalKind::NewDeviceAnnouncement {
                break signal;
            }
        };
        assert!(announcement.detail.contains(&hex::encode(b"IO\x2a\x2b")));
        assert!(alarms.try_recv().is_err());

        session.shutdown().await;
    }
}
