use thiserror::Error;

/// Failures that abort a single trading cycle. None of these are fatal to the
/// process: the scheduling loop logs them and the next cycle is the retry.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("market data unavailable: {0}")]
    DataUnavailable(String),

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("model response unparseable: {0}")]
    ModelResponseUnparseable(String),

    #[error("order execution failed: {0}")]
    OrderExecutionFailed(String),
}

/// Startup-time configuration errors. The only error class that is fatal to
/// the process.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {var}: {value}")]
    InvalidVar { var: &'static str, value: String },
}
