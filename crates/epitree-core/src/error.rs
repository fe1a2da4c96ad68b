//! Error taxonomy shared by every epitree crate.

/// Errors that can end a simulation run or reject its inputs.
///
/// Every variant is fatal for the run that produced it. Aggregate counts that
/// drifted from the true compartment sums would invalidate everything computed
/// afterwards, so no operation continues past one of these.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    /// An exogenous input series violates its contract (unsorted times,
    /// decreasing cumulative imported cases, ...).
    #[error("Malformed input series: {0}")]
    MalformedInputSeries(String),

    /// A forced infection or recovery asked for more susceptibles than exist.
    #[error("Insufficient susceptibles: requested {requested}, available {available}")]
    InsufficientSusceptibles { requested: u64, available: u64 },

    /// Population bookkeeping reached a state that should be unreachable.
    #[error("Internal invariant violation: {0}")]
    InternalInvariantViolation(String),

    /// The configuration is structurally invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A record of a text series could not be parsed.
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SimulationError {
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InternalInvariantViolation(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedInputSeries(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }
}

pub type Result<T, E = SimulationError> = std::result::Result<T, E>;
