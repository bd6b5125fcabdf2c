//! Completion synchronizations.
//!
//! Arbitrary participants (connection holders, caches, message sessions)
//! implement [`TransactionSynchronization`] and register with the binding
//! registry to be notified around transaction completion. The orchestrator
//! invokes the callbacks in a fixed order; the fan-out helpers in this module
//! implement the per-phase error semantics.

use std::sync::Arc;

use tracing::warn;

use crate::error::Result;

enum_mode! {
    /// The outcome reported to [`TransactionSynchronization::after_completion`].
    pub CompletionStatus {
        /// The transaction committed.
        Committed => "committed",
        /// The transaction rolled back.
        RolledBack => "rolled back",
        /// The outcome is unknown, typically because completion itself failed.
        Unknown => "unknown",
    }
    default Unknown
}

/// Callback interface for participants in a transaction's lifecycle.
///
/// All methods default to no-ops; a participant overrides the ones it cares
/// about. Within one phase, synchronizations are invoked in registration
/// order.
///
/// Error semantics differ per phase:
///
/// - [`before_commit`](Self::before_commit) errors abort the commit and
///   divert to rollback handling.
/// - [`before_completion`](Self::before_completion) errors are logged and do
///   not affect the outcome.
/// - [`after_commit`](Self::after_commit) errors propagate to the caller,
///   but the transaction is already committed and remains so;
///   `after_completion` still runs with [`CompletionStatus::Committed`].
/// - [`after_completion`](Self::after_completion) errors are logged
///   per-synchronization and never prevent invocation of the next one.
pub trait TransactionSynchronization {
    /// The enclosing transaction is being suspended. Unbind any flow-local
    /// state held on its behalf.
    fn suspend(&self) {}

    /// The enclosing transaction was resumed after suspension. Rebind state
    /// released in [`suspend`](Self::suspend).
    fn resume(&self) {}

    /// Flush pending work to the underlying resource, if applicable.
    fn flush(&self) {}

    /// Invoked before the transaction manager commits, while the transaction
    /// is still fully live. `read_only` reflects the transaction definition.
    fn before_commit(&self, read_only: bool) -> Result<()> {
        let _ = read_only;
        Ok(())
    }

    /// Invoked before commit or rollback, after `before_commit`. A last
    /// chance to release flow-bound resources while the transaction exists.
    fn before_completion(&self) -> Result<()> {
        Ok(())
    }

    /// Invoked after a successful physical commit.
    fn after_commit(&self) -> Result<()> {
        Ok(())
    }

    /// Invoked after commit or rollback with the final outcome. The
    /// transaction is gone; flow state has not yet been torn down.
    fn after_completion(&self, status: CompletionStatus) -> Result<()> {
        let _ = status;
        Ok(())
    }
}

/// Fire `before_commit` in registration order. The first error aborts.
pub(crate) fn invoke_before_commit(
    synchronizations: &[Arc<dyn TransactionSynchronization>],
    read_only: bool,
) -> Result<()> {
    for sync in synchronizations {
        sync.before_commit(read_only)?;
    }
    Ok(())
}

/// Fire `before_completion` in registration order, logging errors.
pub(crate) fn invoke_before_completion(
    synchronizations: &[Arc<dyn TransactionSynchronization>],
) {
    for sync in synchronizations {
        if let Err(err) = sync.before_completion() {
            warn!(error = %err, "synchronization before_completion failed");
        }
    }
}

/// Fire `after_commit` in registration order. The first error propagates to
/// the caller; the transaction is committed regardless.
pub(crate) fn invoke_after_commit(
    synchronizations: &[Arc<dyn TransactionSynchronization>],
) -> Result<()> {
    for sync in synchronizations {
        sync.after_commit()?;
    }
    Ok(())
}

/// Fire `after_completion` in registration order. Errors are logged
/// per-synchronization; every synchronization is invoked.
pub(crate) fn invoke_after_completion(
    synchronizations: &[Arc<dyn TransactionSynchronization>],
    status: CompletionStatus,
) {
    for sync in synchronizations {
        if let Err(err) = sync.after_completion(status) {
            warn!(error = %err, "synchronization after_completion failed");
        }
    }
}

/// Fire `flush` in registration order.
pub(crate) fn invoke_flush(synchronizations: &[Arc<dyn TransactionSynchronization>]) {
    for sync in synchronizations {
        sync.flush();
    }
}
