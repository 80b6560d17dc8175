//! Error kinds shared by the drivers and the tempering engine.

use thiserror::Error;

/// Boxed error type used to carry failures out of sampler and model code.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while driving a chain.
///
/// Argument validation happens eagerly, before any sampler call, so an
/// `InvalidArgument` never leaves partial state behind. Sampler and numeric
/// failures abort the run in progress; nothing is retried internally.
#[derive(Debug, Error)]
pub enum Error {
    /// A driver or tempering option failed validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A sampler step or model evaluation failed; the source error is
    /// propagated unchanged.
    #[error("sampler failure: {0}")]
    Sampler(BoxError),

    /// A numeric operation (barrier construction, bisection) left the
    /// representable range or lost monotonicity.
    #[error("numeric failure: {0}")]
    Numeric(String),

    /// A parallel worker died. Raised only after all dispatched workers
    /// have settled and the progress channel is closed.
    #[error("worker failure: {0}")]
    Worker(String),
}

impl Error {
    /// Wraps an arbitrary error (or message) as a sampler failure.
    pub fn sampler(err: impl Into<BoxError>) -> Self {
        Error::Sampler(err.into())
    }
}
