//! Test support for tranq: a scriptable in-memory resource manager and a
//! recording synchronization, both reporting into a shared event trace so
//! tests can assert on the exact order of observable effects.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tranq::{
    binding, CompletionStatus, Error, ResourceKey, ResourceManager, Result,
    TransactionDefinition, TransactionOrchestrator, TransactionSynchronization, Tranq,
};

/// A shared, ordered record of observable effects.
#[derive(Clone, Default)]
pub struct Trace(Arc<Mutex<Vec<String>>>);

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

/// The shared state of one physical mock transaction. Bound into the
/// per-flow registry under the manager's key while the transaction is
/// active, the way a real manager binds its connection holder.
pub struct MockHandle {
    rollback_only: AtomicBool,
    savepoint_seq: AtomicUsize,
    nesting_depth: AtomicUsize,
}

impl MockHandle {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            rollback_only: AtomicBool::new(false),
            savepoint_seq: AtomicUsize::new(0),
            nesting_depth: AtomicUsize::new(0),
        })
    }
}

/// Transaction object handed to the orchestrator.
pub struct MockTransaction {
    handle: Option<Arc<MockHandle>>,
}

/// Suspension token: the handle detached from the flow.
pub struct MockSuspended {
    handle: Option<Arc<MockHandle>>,
}

/// Savepoint token.
#[derive(Debug, PartialEq, Eq)]
pub struct MockSavepoint(pub String);

/// A scriptable resource manager.
///
/// Transactions are tracked through the binding registry: `begin` binds a
/// [`MockHandle`] under the manager's key, `suspend` detaches it, `resume`
/// reattaches it, and `cleanup` unbinds it, so an inner
/// `get_transaction` observes the outer transaction exactly the way
/// cooperating data-access code would. Failure injection methods arm a
/// single failure for the next matching operation.
pub struct MockManager {
    identity: Arc<()>,
    trace: Trace,
    savepoints_supported: bool,
    savepoint_for_nested: bool,
    commit_on_global_rollback_only: bool,
    suspension_supported: bool,
    fail_next_begin: AtomicBool,
    fail_next_commit: AtomicBool,
    fail_next_rollback: AtomicBool,
    fail_next_suspend: AtomicBool,
    fail_next_resume: AtomicBool,
    fail_next_prepare: AtomicBool,
    last_begin_timeout: Mutex<Option<i32>>,
}

impl Default for MockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MockManager {
    pub fn new() -> Self {
        Self {
            identity: Arc::new(()),
            trace: Trace::new(),
            savepoints_supported: true,
            savepoint_for_nested: true,
            commit_on_global_rollback_only: false,
            suspension_supported: true,
            fail_next_begin: AtomicBool::new(false),
            fail_next_commit: AtomicBool::new(false),
            fail_next_rollback: AtomicBool::new(false),
            fail_next_suspend: AtomicBool::new(false),
            fail_next_resume: AtomicBool::new(false),
            fail_next_prepare: AtomicBool::new(false),
            last_begin_timeout: Mutex::new(None),
        }
    }

    /// Disable savepoint support.
    #[must_use]
    pub fn without_savepoints(mut self) -> Self {
        self.savepoints_supported = false;
        self
    }

    /// Realize nested propagation with a genuinely nested physical
    /// transaction instead of a savepoint.
    #[must_use]
    pub fn native_nested(mut self) -> Self {
        self.savepoint_for_nested = false;
        self
    }

    /// Let commit proceed even over a globally rollback-only transaction.
    #[must_use]
    pub fn with_commit_on_global_rollback_only(mut self) -> Self {
        self.commit_on_global_rollback_only = true;
        self
    }

    /// Disable suspension support.
    #[must_use]
    pub fn without_suspension(mut self) -> Self {
        self.suspension_supported = false;
        self
    }

    /// The registry key this manager binds its handle under.
    pub fn key(&self) -> ResourceKey {
        ResourceKey::of(&self.identity)
    }

    pub fn trace(&self) -> Trace {
        self.trace.clone()
    }

    /// The timeout hint the most recent `begin` received.
    pub fn last_begin_timeout(&self) -> Option<i32> {
        *self.last_begin_timeout.lock().unwrap()
    }

    /// Mark the transaction bound on the current flow rollback-only, the way
    /// an arbitrary participant would from data-access code.
    pub fn mark_rollback_only(&self) {
        if let Some(handle) = self.bound_handle() {
            handle.rollback_only.store(true, Ordering::SeqCst);
        }
    }

    pub fn fail_next_begin(&self) {
        self.fail_next_begin.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_rollback(&self) {
        self.fail_next_rollback.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_suspend(&self) {
        self.fail_next_suspend.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_resume(&self) {
        self.fail_next_resume.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_prepare(&self) {
        self.fail_next_prepare.store(true, Ordering::SeqCst);
    }

    fn armed(&self, flag: &AtomicBool) -> bool {
        flag.swap(false, Ordering::SeqCst)
    }

    fn bound_handle(&self) -> Option<Arc<MockHandle>> {
        binding::get_resource(&self.key())
            .and_then(|holder| holder.downcast::<MockHandle>().ok())
    }
}

impl ResourceManager for MockManager {
    type Transaction = MockTransaction;
    type Suspended = MockSuspended;
    type Savepoint = MockSavepoint;

    fn acquire(&self) -> Result<Self::Transaction> {
        Ok(MockTransaction {
            handle: self.bound_handle(),
        })
    }

    fn is_existing(&self, transaction: &Self::Transaction) -> Result<bool> {
        Ok(transaction.handle.is_some())
    }

    fn begin(
        &self,
        transaction: &mut Self::Transaction,
        definition: &TransactionDefinition,
    ) -> Result<()> {
        if self.armed(&self.fail_next_begin) {
            return Err(Error::resource("injected begin failure"));
        }
        *self.last_begin_timeout.lock().unwrap() = Some(definition.get_timeout_seconds());
        match &transaction.handle {
            Some(handle) => {
                // nested physical transaction on the existing handle
                let depth = handle.nesting_depth.fetch_add(1, Ordering::SeqCst) + 1;
                self.trace.push(format!("begin(depth={depth})"));
            }
            None => {
                let handle = MockHandle::new();
                binding::bind_resource(self.key(), handle.clone())?;
                transaction.handle = Some(handle);
                self.trace.push("begin");
            }
        }
        Ok(())
    }

    fn suspend(&self, transaction: &mut Self::Transaction) -> Result<Self::Suspended> {
        if !self.suspension_supported {
            return Err(Error::SuspensionNotSupported);
        }
        if self.armed(&self.fail_next_suspend) {
            return Err(Error::resource("injected suspend failure"));
        }
        binding::unbind_resource_if_possible(&self.key());
        self.trace.push("suspend");
        Ok(MockSuspended {
            handle: transaction.handle.take(),
        })
    }

    fn resume(
        &self,
        _transaction: Option<&mut Self::Transaction>,
        suspended: Self::Suspended,
    ) -> Result<()> {
        if self.armed(&self.fail_next_resume) {
            return Err(Error::resource("injected resume failure"));
        }
        if let Some(handle) = suspended.handle {
            binding::unbind_resource_if_possible(&self.key());
            binding::bind_resource(self.key(), handle)?;
        }
        self.trace.push("resume");
        Ok(())
    }

    fn commit(&self, _transaction: &mut Self::Transaction) -> Result<()> {
        if self.armed(&self.fail_next_commit) {
            return Err(Error::system("commit", "injected commit failure"));
        }
        self.trace.push("commit");
        Ok(())
    }

    fn rollback(&self, _transaction: &mut Self::Transaction) -> Result<()> {
        if self.armed(&self.fail_next_rollback) {
            return Err(Error::system("rollback", "injected rollback failure"));
        }
        self.trace.push("rollback");
        Ok(())
    }

    fn set_rollback_only(&self, transaction: &mut Self::Transaction) -> Result<()> {
        if let Some(handle) = &transaction.handle {
            handle.rollback_only.store(true, Ordering::SeqCst);
        }
        self.trace.push("set_rollback_only");
        Ok(())
    }

    fn is_global_rollback_only(&self, transaction: &Self::Transaction) -> bool {
        transaction
            .handle
            .as_ref()
            .map(|handle| handle.rollback_only.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    fn cleanup(&self, transaction: &mut Self::Transaction) {
        let nested = transaction
            .handle
            .as_ref()
            .map(|handle| {
                handle
                    .nesting_depth
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |depth| {
                        depth.checked_sub(1)
                    })
                    .is_ok()
            })
            .unwrap_or(false);
        if !nested {
            binding::unbind_resource_if_possible(&self.key());
            transaction.handle = None;
        }
        self.trace.push("cleanup");
    }

    fn supports_savepoints(&self, _transaction: &Self::Transaction) -> bool {
        self.savepoints_supported
    }

    fn create_savepoint(&self, transaction: &mut Self::Transaction) -> Result<Self::Savepoint> {
        let handle = transaction
            .handle
            .as_ref()
            .ok_or_else(|| Error::resource("no active transaction for savepoint"))?;
        let seq = handle.savepoint_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let name = format!("sp{seq}");
        self.trace.push(format!("savepoint.create({name})"));
        Ok(MockSavepoint(name))
    }

    fn rollback_to_savepoint(
        &self,
        _transaction: &mut Self::Transaction,
        savepoint: &Self::Savepoint,
    ) -> Result<()> {
        self.trace.push(format!("savepoint.rollback({})", savepoint.0));
        Ok(())
    }

    fn release_savepoint(
        &self,
        _transaction: &mut Self::Transaction,
        savepoint: Self::Savepoint,
    ) -> Result<()> {
        self.trace.push(format!("savepoint.release({})", savepoint.0));
        Ok(())
    }

    fn use_savepoint_for_nested(&self) -> bool {
        self.savepoint_for_nested
    }

    fn commit_on_global_rollback_only(&self) -> bool {
        self.commit_on_global_rollback_only
    }

    fn prepare_for_commit(&self, _transaction: &mut Self::Transaction) -> Result<()> {
        if self.armed(&self.fail_next_prepare) {
            return Err(Error::resource("injected prepare failure"));
        }
        Ok(())
    }
}

/// A synchronization that records every callback it receives, optionally
/// failing the next invocation of a chosen phase.
pub struct Probe {
    label: String,
    trace: Trace,
    fail_next_before_commit: AtomicBool,
    fail_next_before_completion: AtomicBool,
    fail_next_after_commit: AtomicBool,
    fail_next_after_completion: AtomicBool,
}

impl Probe {
    pub fn new(label: impl Into<String>, trace: &Trace) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            trace: trace.clone(),
            fail_next_before_commit: AtomicBool::new(false),
            fail_next_before_completion: AtomicBool::new(false),
            fail_next_after_commit: AtomicBool::new(false),
            fail_next_after_completion: AtomicBool::new(false),
        })
    }

    /// Create a probe and register it with the active synchronization scope.
    pub fn registered(label: impl Into<String>, trace: &Trace) -> Result<Arc<Self>> {
        let probe = Self::new(label, trace);
        binding::register_synchronization(probe.clone())?;
        Ok(probe)
    }

    pub fn fail_next_before_commit(&self) {
        self.fail_next_before_commit.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_before_completion(&self) {
        self.fail_next_before_completion.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_after_commit(&self) {
        self.fail_next_after_commit.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_after_completion(&self) {
        self.fail_next_after_completion.store(true, Ordering::SeqCst);
    }

    fn armed(&self, flag: &AtomicBool) -> bool {
        flag.swap(false, Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Probe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Probe").field("label", &self.label).finish()
    }
}

impl TransactionSynchronization for Probe {
    fn suspend(&self) {
        self.trace.push(format!("{}.suspend", self.label));
    }

    fn resume(&self) {
        self.trace.push(format!("{}.resume", self.label));
    }

    fn flush(&self) {
        self.trace.push(format!("{}.flush", self.label));
    }

    fn before_commit(&self, read_only: bool) -> Result<()> {
        self.trace
            .push(format!("{}.before_commit(read_only={read_only})", self.label));
        if self.armed(&self.fail_next_before_commit) {
            return Err(Error::Synchronization(format!(
                "{} failed in before_commit",
                self.label
            )));
        }
        Ok(())
    }

    fn before_completion(&self) -> Result<()> {
        self.trace.push(format!("{}.before_completion", self.label));
        if self.armed(&self.fail_next_before_completion) {
            return Err(Error::Synchronization(format!(
                "{} failed in before_completion",
                self.label
            )));
        }
        Ok(())
    }

    fn after_commit(&self) -> Result<()> {
        self.trace.push(format!("{}.after_commit", self.label));
        if self.armed(&self.fail_next_after_commit) {
            return Err(Error::Synchronization(format!(
                "{} failed in after_commit",
                self.label
            )));
        }
        Ok(())
    }

    fn after_completion(&self, status: CompletionStatus) -> Result<()> {
        self.trace
            .push(format!("{}.after_completion({status})", self.label));
        if self.armed(&self.fail_next_after_completion) {
            return Err(Error::Synchronization(format!(
                "{} failed in after_completion",
                self.label
            )));
        }
        Ok(())
    }
}

/// An orchestrator over a fresh [`MockManager`] with default configuration.
pub fn orchestrator() -> TransactionOrchestrator<MockManager> {
    TransactionOrchestrator::new(MockManager::new())
}

/// An orchestrator over a fresh [`MockManager`] with the given configuration.
pub fn orchestrator_with(config: Tranq) -> TransactionOrchestrator<MockManager> {
    config.build(MockManager::new())
}
