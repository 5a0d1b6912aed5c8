/// Errors returned by session configuration and wiring.
///
/// Attachment failures carry only the failed stage name here; the underlying
/// cause was already delivered once on the alarm stream.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The session identity string is empty.
    #[error("session identity is empty")]
    MissingIdentity,

    /// A signal or alarm sink has no consumer.
    #[error("event sinks are closed")]
    EventSinksClosed,

    /// A stage failed to attach during pipeline wiring.
    #[error("failed to attach stage {stage:?}")]
    AttachFailed { stage: &'static str },

    /// `run` was called before a successful `init`.
    #[error("session is not configured")]
    NotConfigured,

    /// `init` or `run` was called twice.
    #[error("session is already {phase}")]
    InvalidPhase { phase: &'static str },
}

pub type Result<T> = std::result::Result<T, SessionError>;
