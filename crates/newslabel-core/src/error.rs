//! Error types for newslabel

/// Result type alias using newslabel's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for newslabel operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Retryable service failure (rate limit, timeout, transient 5xx)
    #[error("transient service error: {0}")]
    Transient(String),

    /// Non-retryable service failure (bad credentials, rejected request, unsupported model)
    #[error("fatal service error: {0}")]
    Fatal(String),

    /// Configuration errors, including unknown pricing
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed responses or invalid input data
    #[error("validation error: {0}")]
    Validation(String),

    /// Checkpoint read/write failures
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Network/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Tabular data errors
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Operator interrupt
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Create a new transient error
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Create a new fatal error
    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Whether the failed operation may succeed if attempted again
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Whether this error ends a run regardless of the per-record failure policy
    pub fn aborts_run(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Persistence(_) | Self::Io(_) | Self::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(Error::transient("429").is_retryable());
        assert!(!Error::fatal("401").is_retryable());

        assert!(Error::config("no pricing").aborts_run());
        assert!(Error::persistence("disk full").aborts_run());
        assert!(!Error::fatal("bad request").aborts_run());
        assert!(!Error::validation("malformed").aborts_run());
    }

    #[test]
    fn test_error_display() {
        let err = Error::config("unknown model 'x'");
        assert_eq!(err.to_string(), "configuration error: unknown model 'x'");
    }
}
