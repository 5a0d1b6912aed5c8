use crate::integrity::IntegrityConfig;
use crate::liveness::LivenessConfig;
use crate::stamp::StampConfig;

/// Per-stage configuration, consumed exactly once by [`crate::Stage::init`].
///
/// Each variant carries the stage's sub-identity, cloned event sinks, the
/// session's cancellation token, stage tunables, and the channel endpoints
/// the stage will serve. A stage handed the wrong variant rejects it with
/// [`crate::StageError::ConfigMismatch`].
pub enum StageConfig {
    Liveness(LivenessConfig),
    Integrity(IntegrityConfig),
    Stamp(StampConfig),
}

impl StageConfig {
    /// Variant name, used in mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            StageConfig::Liveness(_) => crate::liveness::STAGE_NAME,
            StageConfig::Integrity(_) => crate::integrity::STAGE_NAME,
            StageConfig::Stamp(_) => crate::stamp::STAGE_NAME,
        }
    }
}
