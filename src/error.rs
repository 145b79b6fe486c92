/// Error delivered to request callers.
///
/// `Display` renders the caller-facing message, which is what the
/// application shows to users.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// The transport could not be constructed when the coordinator was built.
    #[error("request transport is not ready")]
    NotReady,
    /// No endpoint is registered under the requested key.
    #[error("endpoint configuration not found: {key}")]
    Config { key: String },
    /// The request was sent (or attempted) but no response came back.
    #[error("{message}")]
    Network {
        message: String,
        /// Socket-level code such as `ETIMEDOUT`, when identifiable.
        code: Option<String>,
    },
    /// A response arrived with a non-success HTTP status.
    #[error("{message}")]
    Http { status: u16, message: String },
    /// The envelope carried a non-success business code.
    #[error("{message}")]
    Business { code: String, message: String },
    /// The request could not be built or its response could not be read.
    #[error("{0}")]
    Transport(String),
    /// The pending delivery was discarded before an outcome was known.
    #[error("request abandoned before completion")]
    Abandoned,
}

impl RequestError {
    /// Whether this error feeds the backoff state machine instead of
    /// failing immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Business { code, .. } => crate::codes::is_retryable_code(code),
            Self::NotReady
            | Self::Config { .. }
            | Self::Http { .. }
            | Self::Transport(_)
            | Self::Abandoned => false,
        }
    }
}

/// Failure reported by a [`Transport`](crate::Transport) implementation.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// A response was received with this non-success status.
    #[error("http status {status}")]
    Status { status: u16 },
    /// The request left the client but nothing came back.
    #[error("no response")]
    NoResponse { code: Option<String> },
    /// The request never left the client, or the reply could not be read.
    #[error("request not sent: {message}")]
    NotSent { message: String },
}

/// Failure reported by a [`Scheduler`](crate::Scheduler).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    /// A timer with the same key is still pending.
    #[error("timer '{0}' is already scheduled")]
    DuplicateKey(String),
    /// No tokio runtime was captured or is current.
    #[error("no tokio runtime available for timers")]
    NoRuntime,
}
