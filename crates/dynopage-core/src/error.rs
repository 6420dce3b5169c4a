//! Error type shared across the crate.

use dynopage_model::StoreError;

/// Errors surfaced by query construction and execution.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A table or client was assembled with missing or inconsistent pieces.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A caller-supplied argument cannot be used: unknown index, malformed
    /// cursor token, key attributes missing from a record.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A conditional write found its condition unmet.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// The store rejected or failed the request.
    #[error("store error: {0}")]
    Transport(#[source] StoreError),
}

impl Error {
    pub(crate) fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub(crate) fn precondition_failed(msg: impl Into<String>) -> Self {
        Self::PreconditionFailed(msg.into())
    }

    /// Whether this is a failed conditional write.
    #[must_use]
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, Self::PreconditionFailed(_))
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        if err.is_conditional_check_failed() {
            Self::PreconditionFailed(err.message.clone())
        } else {
            Self::Transport(err)
        }
    }
}

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;
