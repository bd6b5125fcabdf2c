//! Types for working with errors produced by Tranq.

use std::error::Error as StdError;

/// A specialized `Result` type for Tranq.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents all the ways a method can fail within Tranq.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A propagation rule was violated: an existing transaction where none is
    /// permitted, a missing transaction where one is mandatory, or an attempt
    /// to complete an already-completed transaction.
    #[error("illegal transaction state: {0}")]
    IllegalState(String),

    /// A nested transaction was requested but the resource manager cannot
    /// honor it, or nested transactions are disabled in the configuration.
    #[error("nested transaction not supported: {0}")]
    NestedNotSupported(String),

    /// The requested propagation requires suspending the current transaction
    /// but the resource manager cannot suspend.
    #[error("transaction suspension not supported by this resource manager")]
    SuspensionNotSupported,

    /// A transaction timeout below the permitted minimum was requested.
    /// `-1` means "use the infrastructure default"; smaller values are
    /// rejected before any resource is touched.
    #[error("invalid transaction timeout: {seconds}")]
    InvalidTimeout { seconds: i32 },

    /// Commit could not proceed because the transaction was marked
    /// rollback-only; the transaction has been rolled back instead.
    #[error("transaction rolled back because it has been marked as rollback-only")]
    UnexpectedRollback(String),

    /// An unexpected failure inside the resource manager during commit or
    /// rollback processing.
    #[error("transaction system failure during {operation}: {source}")]
    System {
        operation: &'static str,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// API misuse, such as releasing a savepoint when none is held or binding
    /// a resource key twice.
    #[error("transaction usage error: {0}")]
    Usage(String),

    /// An error raised by the resource manager itself, passed through opaquely.
    #[error("resource manager error: {0}")]
    Resource(#[source] Box<dyn StdError + Send + Sync>),

    /// An error raised by a registered synchronization callback.
    #[error("transaction synchronization error: {0}")]
    Synchronization(String),
}

impl Error {
    /// Wrap an arbitrary resource-manager failure.
    pub fn resource(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Error::Resource(err.into())
    }

    /// Wrap a commit/rollback-phase failure from the resource manager.
    pub fn system(
        operation: &'static str,
        err: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Error::System {
            operation,
            source: err.into(),
        }
    }

    pub(crate) fn illegal_state(msg: impl Into<String>) -> Self {
        Error::IllegalState(msg.into())
    }

    pub(crate) fn usage(msg: impl Into<String>) -> Self {
        Error::Usage(msg.into())
    }
}
