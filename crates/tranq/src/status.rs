use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use crate::{
    binding,
    definition::Isolation,
    logger::TransactionLogger,
    manager::ResourceManager,
    synchronization::{self, TransactionSynchronization},
};

/// Snapshot of a transaction displaced by suspension: the resource manager's
/// suspension token, the synchronizations that belonged to the suspended
/// scope, and the ambient attributes that were cleared from the registry.
///
/// Created inside suspend, consumed exactly once by resume.
pub struct SuspendedFlow<S> {
    pub(crate) resource: Option<S>,
    // None when no synchronization scope was active at suspend time; an
    // empty Vec restores an active scope with zero registrations.
    pub(crate) synchronizations: Option<Vec<Arc<dyn TransactionSynchronization>>>,
    pub(crate) name: Option<String>,
    pub(crate) read_only: bool,
    pub(crate) isolation: Option<Isolation>,
    pub(crate) was_active: bool,
}

/// The handle returned by
/// [`get_transaction`](crate::TransactionOrchestrator::get_transaction) and
/// consumed by [`commit`](crate::TransactionOrchestrator::commit) or
/// [`rollback`](crate::TransactionOrchestrator::rollback).
///
/// A status describes one logical transaction scope: it may own a fresh
/// physical transaction, participate in an existing one, hold a savepoint
/// for a nested scope, or be empty (no transaction at all). It also carries
/// the suspended enclosing transaction, if this scope displaced one.
pub struct TransactionStatus<R: ResourceManager> {
    pub(crate) transaction: Option<R::Transaction>,
    pub(crate) new_transaction: bool,
    pub(crate) new_synchronization: bool,
    pub(crate) read_only: bool,
    pub(crate) debug: bool,
    pub(crate) suspended: Option<SuspendedFlow<R::Suspended>>,
    pub(crate) savepoint: Option<R::Savepoint>,
    pub(crate) local_rollback_only: bool,
    pub(crate) completed: bool,
    pub(crate) logger: Option<TransactionLogger>,
}

impl<R: ResourceManager> TransactionStatus<R> {
    /// Whether this scope carries an actual transaction object.
    pub fn has_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Whether this scope began a fresh physical transaction (as opposed to
    /// participating in an existing one or running empty).
    pub fn is_new_transaction(&self) -> bool {
        self.new_transaction
    }

    /// Whether this scope initialized the flow's synchronization registry.
    pub fn is_new_synchronization(&self) -> bool {
        self.new_synchronization
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Whether this scope holds a savepoint (nested propagation over an
    /// existing transaction).
    pub fn has_savepoint(&self) -> bool {
        self.savepoint.is_some()
    }

    /// Mark this scope rollback-only. The orchestrator turns the eventual
    /// commit into a rollback.
    pub fn set_rollback_only(&mut self) {
        self.local_rollback_only = true;
    }

    /// Whether this scope was marked rollback-only via
    /// [`set_rollback_only`](Self::set_rollback_only). The global marker on
    /// the underlying transaction is tracked by the resource manager and
    /// checked by the orchestrator at commit.
    pub fn is_rollback_only(&self) -> bool {
        self.local_rollback_only
    }

    /// Whether commit or rollback has run for this scope.
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Flush pending work of all registered synchronizations to the
    /// underlying resource.
    pub fn flush(&self) {
        if binding::is_synchronization_active() {
            synchronization::invoke_flush(&binding::synchronizations());
        }
    }

    /// Access the resource manager's transaction object, if present.
    pub fn transaction(&self) -> Option<&R::Transaction> {
        self.transaction.as_ref()
    }
}

impl<R: ResourceManager> Debug for TransactionStatus<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionStatus")
            .field("has_transaction", &self.transaction.is_some())
            .field("new_transaction", &self.new_transaction)
            .field("new_synchronization", &self.new_synchronization)
            .field("read_only", &self.read_only)
            .field("has_savepoint", &self.savepoint.is_some())
            .field("has_suspended", &self.suspended.is_some())
            .field("rollback_only", &self.local_rollback_only)
            .field("completed", &self.completed)
            .finish()
    }
}
