use thiserror::Error;

/// Error types for the itc-fit library.
///
/// Numerical trouble and convergence failures are not errors: they are
/// reported as data on [`Convergence`](crate::optimizer::Convergence). The
/// variants below abort an operation before (or instead of) producing a result.
#[derive(Error, Debug)]
pub enum ItcError {
    /// Error indicating a mismatch in vector dimensions.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// A global fit was requested without any experiments.
    #[error("Global fit requires at least one experiment")]
    NoExperiments,

    /// Invalid combination of constraints, bounds or settings.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Experiment data that cannot be fitted (no injections, zero volumes, ...).
    #[error("Invalid experiment: {0}")]
    InvalidExperiment(String),

    /// Too few bootstrap iterations survived to estimate a spread.
    #[error("Bootstrap failed: {succeeded} of {requested} iterations converged ({failed} failed)")]
    BootstrapFailed {
        requested: usize,
        succeeded: usize,
        failed: usize,
    },

    /// The operation was cancelled through a cancellation token.
    #[error("Operation cancelled")]
    Cancelled,

    /// The bootstrap worker pool could not be created.
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Generic error for cases that don't fit the other categories.
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for itc-fit operations.
pub type Result<T> = std::result::Result<T, ItcError>;

impl From<rayon::ThreadPoolBuildError> for ItcError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        ItcError::ThreadPool(err.to_string())
    }
}

/// Extensions for converting from other error types.
impl From<String> for ItcError {
    fn from(s: String) -> Self {
        ItcError::Other(s)
    }
}

impl From<&str> for ItcError {
    fn from(s: &str) -> Self {
        ItcError::Other(s.to_string())
    }
}
