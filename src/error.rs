//! Error handling for the sampled load crate.

/// A specialized `Result` type for load sampling operations.
pub type Result<T> = std::result::Result<T, LoadError>;

/// The error type shared by sources, the sampler and the accessors.
///
/// Errors are cloned into every reading handed out by an accessor, so every
/// variant carries owned, comparable data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    /// The queue length counter could not be opened. Permanent for the sampler.
    #[error("failed to initialize processor queue length counter: {0}")]
    SourceInit(String),

    /// A single counter read failed. Cleared by the next successful tick.
    #[error("failed to read processor queue length: {0}")]
    SourceRead(String),

    /// The CPU utilization fallback failed
    #[error("CPU utilization fallback unavailable: {0}")]
    Fallback(String),

    /// Counter data could not be parsed
    #[error("failed to parse counter data: {0}")]
    Parse(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// The sampler could not be started
    #[error("failed to start load sampler: {0}")]
    Spawn(String),

    /// The sampler task ended without being cancelled
    #[error("load sampler stopped: {0}")]
    Stopped(String),

    /// A wait on the sampler was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// The query has no implementation on this platform
    #[error("not implemented yet")]
    NotImplemented,
}

impl LoadError {
    /// Create a new counter initialization error
    pub fn source_init_error(msg: impl Into<String>) -> Self {
        Self::SourceInit(msg.into())
    }

    /// Create a new counter read error
    pub fn source_read_error(msg: impl Into<String>) -> Self {
        Self::SourceRead(msg.into())
    }

    /// Create a new fallback error
    pub fn fallback_error(msg: impl Into<String>) -> Self {
        Self::Fallback(msg.into())
    }

    /// Create a new parse error
    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new spawn error
    pub fn spawn_error(msg: impl Into<String>) -> Self {
        Self::Spawn(msg.into())
    }

    /// Create a new stopped-sampler error
    pub fn stopped_error(msg: impl Into<String>) -> Self {
        Self::Stopped(msg.into())
    }

    /// Whether the sampler can recover from this error on a later tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::SourceRead(_) | Self::Fallback(_))
    }
}
