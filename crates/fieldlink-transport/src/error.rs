/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to connect to the specified address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A session identity string did not match `<device>:<port-or-NULL>:<KIND>`.
    #[error("invalid identity {value:?}: {reason}")]
    InvalidIdentity {
        value: String,
        reason: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, TransportError>;
