/// Errors that can occur when initializing a stage.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// The stage received a config variant meant for a different stage.
    #[error("stage {stage:?} cannot init from a {got:?} config")]
    ConfigMismatch {
        stage: &'static str,
        got: &'static str,
    },

    /// `init` was called a second time on the same stage instance.
    #[error("stage {0:?} is already initialized")]
    AlreadyInitialized(&'static str),
}

pub type Result<T> = std::result::Result<T, StageError>;
