//! Error types for request tracing.

use thiserror::Error;

/// Boxed error type accepted as the source of an [`AttributeError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A specialised Result type for configuration and setup operations.
pub type Result<T> = std::result::Result<T, TracingError>;

/// Errors that can occur while configuring request tracing.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum TracingError {
    /// Configuration could not be loaded or parsed.
    #[error("configuration error")]
    Config(#[source] Box<figment::Error>),

    /// Tracing subscriber initialisation failed.
    #[error("failed to initialise tracing")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

impl From<figment::Error> for TracingError {
    fn from(err: figment::Error) -> Self {
        TracingError::Config(Box::new(err))
    }
}

/// Failure raised by an attribute provider while deriving span attributes.
#[derive(Debug, Error)]
#[error("attribute provider failed: {source}")]
pub struct AttributeError {
    #[source]
    source: BoxError,
}

impl AttributeError {
    /// Wraps any error as an attribute provider failure.
    pub fn new(source: impl Into<BoxError>) -> Self {
        Self {
            source: source.into(),
        }
    }
}
