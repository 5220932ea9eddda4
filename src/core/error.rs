//! Error types for the pipeline engine.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::core::traits::Element;

/// Execution contracts a stage object can be adapted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Contract {
    /// One value in, one value out.
    Transform,
    /// No input, emits a flow.
    Produce,
    /// Flow in, flow out.
    Run,
    /// `fill` values, then `compute` once.
    FillCompute,
    /// `fill` values, `request` any number of times.
    FillRequest,
    /// Push a single value into a waiting accumulator.
    FillInto,
}

impl fmt::Display for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Contract::Transform => "Transform",
            Contract::Produce => "Produce",
            Contract::Run => "Run",
            Contract::FillCompute => "FillCompute",
            Contract::FillRequest => "FillRequest",
            Contract::FillInto => "FillInto",
        };
        f.write_str(name)
    }
}

/// The main error type for the pipeline engine.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// An object cannot be adapted to the requested contract.
    #[error("capability mismatch: {element} cannot be used as {contract}")]
    CapabilityMismatch {
        /// Debug rendering of the offending object
        element: String,
        /// Contract that was requested
        contract: Contract,
    },

    /// A constructor argument is out of range.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// One pipeline is a strict prefix of another during a head merge.
    #[error("ambiguous merge: {0}")]
    AmbiguousMerge(String),

    /// A stage was entered again while it was already in use.
    #[error("stage is busy: {0}")]
    StageBusy(String),

    /// A stage failed while processing a value.
    #[error("stage error: {0}")]
    Stage(Arc<dyn std::error::Error + Send + Sync>),

    /// I/O failure, typically from the cache store.
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// A cached value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(Arc<serde_json::Error>),

    /// A custom error with a message
    #[error("{0}")]
    Custom(String),
}

// Convenience constructors
impl Error {
    /// Capability mismatch for `element` against `contract`
    pub fn mismatch(element: &dyn fmt::Debug, contract: Contract) -> Self {
        Error::CapabilityMismatch {
            element: format!("{:?}", element),
            contract,
        }
    }

    /// Capability mismatch that also lists what `element` does support
    pub fn unsupported(element: &mut dyn Element, contract: Contract) -> Self {
        let supported: Vec<String> = element
            .contracts()
            .iter()
            .map(|contract| contract.to_string())
            .collect();
        let supported = if supported.is_empty() {
            "nothing".to_string()
        } else {
            supported.join(", ")
        };
        Error::CapabilityMismatch {
            element: format!("{:?} (supports {})", element, supported),
            contract,
        }
    }

    /// Create a stage error from any error type
    pub fn stage<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Error::Stage(Arc::new(error))
    }

    /// Create a configuration-value error
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Error::InvalidValue(message.into())
    }

    /// Create a custom error with a message
    pub fn custom<S: Into<String>>(message: S) -> Self {
        Error::Custom(message.into())
    }

    /// Whether this error was raised while building a pipeline rather than
    /// while running one.
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            Error::CapabilityMismatch { .. } | Error::InvalidValue(_) | Error::AmbiguousMerge(_)
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(Arc::new(e))
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Custom(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Custom(s.to_string())
    }
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Helper trait for converting foreign errors into a stage error
pub trait IntoError<T> {
    fn into_stage_error(self) -> Result<T>;
}

impl<T, E> IntoError<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn into_stage_error(self) -> Result<T> {
        self.map_err(Error::stage)
    }
}
