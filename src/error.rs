use thiserror::Error;

/// Errors surfaced by the distribution engine.
///
/// Per-recipient transfer failures never appear here; they are recorded as
/// failed outcomes on the run instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DistributionError {
    /// Malformed input, raised before any I/O
    #[error("validation failed: {0}")]
    Validation(String),

    /// Distributing account cannot cover the requested total
    #[error("insufficient balance: required {required}, available {available}")]
    Resource { required: f64, available: f64 },

    /// Unclassified transport failure while resolving `context`
    #[error("network error while {context}: {message}")]
    Network { context: String, message: String },

    #[error("storage error: {0}")]
    Storage(String),
}

impl DistributionError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn network(context: impl Into<String>, err: &anyhow::Error) -> Self {
        Self::Network {
            context: context.into(),
            message: format!("{err:#}"),
        }
    }

    pub fn storage(err: &anyhow::Error) -> Self {
        Self::Storage(format!("{err:#}"))
    }
}

pub type Result<T, E = DistributionError> = std::result::Result<T, E>;
