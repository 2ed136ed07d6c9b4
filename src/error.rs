use thiserror::Error;

/// Errors returned by the factorization, clustering, and consensus routines in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// No samples (or no runs) were given.
    #[error("empty input")]
    EmptyInput,

    /// A configuration value is out of range.
    #[error("invalid parameter {name}: {message}")]
    InvalidParameter {
        /// Field or argument that was rejected.
        name: &'static str,
        /// Constraint it violates.
        message: &'static str,
    },

    /// More clusters (or parts) were requested than there are items to fill them.
    #[error("invalid cluster count: requested {requested}, but only {n_items} items")]
    InvalidClusterCount {
        /// Clusters or parts asked for.
        requested: usize,
        /// Samples or graph vertices available.
        n_items: usize,
    },

    /// Rows, label vectors, or matrices disagree in length.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Length set by the first row (or the other operand).
        expected: usize,
        /// Offending length.
        found: usize,
    },

    /// A data entry is outside the domain an algorithm accepts (negative, NaN, ...).
    #[error("invalid value at ({row}, {col}): {message}")]
    InvalidValue {
        /// Sample index.
        row: usize,
        /// Feature index.
        col: usize,
        /// What the entry must satisfy.
        message: &'static str,
    },

    /// One ensemble member failed; the whole fit is aborted.
    #[error("ensemble member {index} failed: {source}")]
    Estimator {
        /// Index of the failed base clustering.
        index: usize,
        /// Underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// The consensus stage failed.
    #[error("consensus failed: {0}")]
    Consensus(#[source] Box<Error>),

    /// Internal inconsistency not covered above.
    #[error("{0}")]
    Other(String),
}

/// Result type used by this crate.
pub type Result<T> = std::result::Result<T, Error>;
