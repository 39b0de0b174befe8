// Error taxonomy for the impact prediction core

use thiserror::Error;

/// Every failure the core reports to its caller.
///
/// None of these are retried internally.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImpactError {
    #[error("invalid orbital elements: {reason}")]
    InvalidElements { reason: String },

    #[error("numeric instability in {context}")]
    NumericInstability { context: String },

    #[error("simulation failure: {context}")]
    SimulationFailure { context: String },

    #[error("no data available for '{query}'")]
    DataUnavailable { query: String },

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("bad configuration value for {key}: {reason}")]
    Config { key: String, reason: String },

    #[error("feed request failed: {0}")]
    Feed(String),
}

impl ImpactError {
    pub(crate) fn invalid_elements(reason: impl Into<String>) -> Self {
        ImpactError::InvalidElements {
            reason: reason.into(),
        }
    }

    pub(crate) fn instability(context: impl Into<String>) -> Self {
        ImpactError::NumericInstability {
            context: context.into(),
        }
    }

    pub(crate) fn simulation(context: impl Into<String>) -> Self {
        ImpactError::SimulationFailure {
            context: context.into(),
        }
    }

    pub(crate) fn parameter(name: &'static str, reason: impl Into<String>) -> Self {
        ImpactError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ImpactError::InvalidElements { .. } => "invalid_elements",
            ImpactError::NumericInstability { .. } => "numeric_instability",
            ImpactError::SimulationFailure { .. } => "simulation_failure",
            ImpactError::DataUnavailable { .. } => "data_unavailable",
            ImpactError::InvalidParameter { .. } => "invalid_parameter",
            ImpactError::Config { .. } => "config",
            ImpactError::Feed(_) => "feed",
        }
    }
}

impl From<reqwest::Error> for ImpactError {
    fn from(e: reqwest::Error) -> Self {
        ImpactError::Feed(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ImpactError>;
