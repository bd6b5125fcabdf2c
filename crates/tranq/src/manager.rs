use std::sync::Arc;

use tracing::warn;

use crate::{
    definition::TransactionDefinition,
    error::{Error, Result},
    synchronization::{self, CompletionStatus, TransactionSynchronization},
};

/// The operations the orchestrator requires of a concrete resource manager
/// (a relational driver, a distributed coordinator, a message-broker
/// session, ...).
///
/// The three associated types are opaque to the orchestrator: it stores and
/// moves them but never inspects them. Suspension and savepoint tokens are
/// consumed exactly once.
///
/// Most methods have defaults describing a minimal manager: one that cannot
/// suspend, cannot nest, has no global rollback marker, and needs no
/// cleanup. Implementations override the capabilities they actually have.
pub trait ResourceManager {
    /// The resource-manager-specific transaction object.
    type Transaction;
    /// Token describing a suspended transaction, returned by
    /// [`suspend`](Self::suspend) and consumed by [`resume`](Self::resume).
    type Suspended;
    /// Savepoint token.
    type Savepoint;

    /// Produce a transaction object for the current flow. The object may
    /// represent an already-active transaction; the orchestrator checks with
    /// [`is_existing`](Self::is_existing).
    fn acquire(&self) -> Result<Self::Transaction>;

    /// Whether the given transaction object represents an active transaction.
    fn is_existing(&self, transaction: &Self::Transaction) -> Result<bool>;

    /// Begin a fresh physical transaction with the given attributes. Timeout
    /// and isolation from the definition are hints for the manager to apply
    /// or ignore.
    fn begin(
        &self,
        transaction: &mut Self::Transaction,
        definition: &TransactionDefinition,
    ) -> Result<()>;

    /// Suspend the active transaction, detaching its resources from the
    /// current flow. The returned token is held by the orchestrator and
    /// handed back to [`resume`](Self::resume) exactly once.
    fn suspend(&self, transaction: &mut Self::Transaction) -> Result<Self::Suspended> {
        let _ = transaction;
        Err(Error::SuspensionNotSupported)
    }

    /// Reinstate a previously suspended transaction. `transaction` is the
    /// object of the completing transaction, when one exists.
    fn resume(
        &self,
        transaction: Option<&mut Self::Transaction>,
        suspended: Self::Suspended,
    ) -> Result<()> {
        let _ = (transaction, suspended);
        Err(Error::SuspensionNotSupported)
    }

    /// Physically commit.
    fn commit(&self, transaction: &mut Self::Transaction) -> Result<()>;

    /// Physically roll back.
    fn rollback(&self, transaction: &mut Self::Transaction) -> Result<()>;

    /// Mark the underlying transaction rollback-only, on behalf of a
    /// participating scope that failed.
    fn set_rollback_only(&self, transaction: &mut Self::Transaction) -> Result<()>;

    /// Whether any participant has marked the underlying transaction
    /// rollback-only.
    fn is_global_rollback_only(&self, transaction: &Self::Transaction) -> bool {
        let _ = transaction;
        false
    }

    /// Release resources held by the transaction object after completion.
    /// Invoked once for statuses that began a physical transaction.
    fn cleanup(&self, transaction: &mut Self::Transaction) {
        let _ = transaction;
    }

    /// Whether the given transaction can carry savepoints.
    fn supports_savepoints(&self, transaction: &Self::Transaction) -> bool {
        let _ = transaction;
        false
    }

    /// Create a savepoint inside the active transaction.
    fn create_savepoint(&self, transaction: &mut Self::Transaction) -> Result<Self::Savepoint> {
        let _ = transaction;
        Err(Error::NestedNotSupported(
            "resource manager does not support savepoints".into(),
        ))
    }

    /// Roll the active transaction back to the given savepoint. The
    /// savepoint remains valid and must still be released.
    fn rollback_to_savepoint(
        &self,
        transaction: &mut Self::Transaction,
        savepoint: &Self::Savepoint,
    ) -> Result<()> {
        let _ = (transaction, savepoint);
        Err(Error::NestedNotSupported(
            "resource manager does not support savepoints".into(),
        ))
    }

    /// Release the given savepoint without rolling back.
    fn release_savepoint(
        &self,
        transaction: &mut Self::Transaction,
        savepoint: Self::Savepoint,
    ) -> Result<()> {
        let _ = (transaction, savepoint);
        Err(Error::NestedNotSupported(
            "resource manager does not support savepoints".into(),
        ))
    }

    /// Whether nested propagation should use a savepoint on the existing
    /// transaction (`true`, the single-resource realization) or a genuinely
    /// nested physical transaction via [`begin`](Self::begin) (`false`, for
    /// coordinators that support real nesting).
    fn use_savepoint_for_nested(&self) -> bool {
        true
    }

    /// Whether commit should proceed even when the transaction is globally
    /// marked rollback-only, leaving the outcome to the manager.
    fn commit_on_global_rollback_only(&self) -> bool {
        false
    }

    /// Hook invoked at the start of commit processing, before any
    /// synchronization fires. An error aborts the commit.
    fn prepare_for_commit(&self, transaction: &mut Self::Transaction) -> Result<()> {
        let _ = transaction;
        Ok(())
    }

    /// A participating scope that owned its own synchronization list has
    /// completed; the enclosing transaction decides the final outcome later.
    /// Managers that can attach callbacks to the underlying transaction
    /// override this to defer the hand-off; the default reports `Unknown`
    /// immediately.
    fn register_after_completion_with_existing(
        &self,
        transaction: &mut Self::Transaction,
        synchronizations: Vec<Arc<dyn TransactionSynchronization>>,
    ) {
        let _ = transaction;
        warn!(
            "cannot register completion callbacks with the enclosing transaction - \
             invoking immediately with unknown outcome"
        );
        synchronization::invoke_after_completion(&synchronizations, CompletionStatus::Unknown);
    }
}
