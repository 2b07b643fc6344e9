// src/error.rs

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by pool construction, configuration, and selection.
///
/// Failures of the caller-supplied operation itself are carried by
/// [`crate::retry::RetryError`], which stays generic over the operation's
/// error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Every key in the pool is disabled or cooling down.
    #[error("no eligible API keys available")]
    NoEligibleKeys,

    /// A pool was constructed with an empty key list.
    #[error("pool '{pool}' has no API keys configured")]
    EmptyKeyList { pool: String },

    /// Registry lookup for an unknown pool name.
    #[error("no pool named '{0}'")]
    PoolNotFound(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error belongs to the retryable service-unavailable class.
    ///
    /// `NoEligibleKeys` means the pool is temporarily exhausted and a later
    /// attempt may succeed once a cooldown expires; configuration and lookup
    /// errors will not fix themselves and should not be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NoEligibleKeys)
    }
}
