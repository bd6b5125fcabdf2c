//! The orchestration core: propagation decisions, the suspend/resume
//! protocol, savepoint-based nesting, and the commit/rollback state machine.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::{
    binding,
    definition::{Isolation, Propagation, TransactionDefinition, DEFAULT_TIMEOUT},
    error::{Error, Result},
    logger::TransactionLogger,
    manager::ResourceManager,
    status::{SuspendedFlow, TransactionStatus},
    synchronization::{self, CompletionStatus, TransactionSynchronization},
    tranq::{SynchronizationPolicy, Tranq},
};

/// Drives transactions for a single resource manager.
///
/// The orchestrator owns the propagation decision table: given the
/// caller-requested [`TransactionDefinition`] and whether the calling flow
/// already participates in a transaction, it begins, joins, suspends, or
/// nests, and returns a [`TransactionStatus`] describing the resulting scope.
/// [`commit`](Self::commit) and [`rollback`](Self::rollback) complete a
/// scope, firing the registered synchronizations in a fixed order and
/// reinstating any transaction the scope displaced.
///
/// Construct one through [`Tranq::build`](crate::Tranq::build) or
/// [`new`](Self::new) for default configuration.
pub struct TransactionOrchestrator<R: ResourceManager> {
    manager: R,
    config: Tranq,
}

impl<R: ResourceManager> TransactionOrchestrator<R> {
    /// An orchestrator with default configuration.
    pub fn new(manager: R) -> Self {
        Self::with_config(manager, Tranq::new())
    }

    pub fn with_config(manager: R, config: Tranq) -> Self {
        Self { manager, config }
    }

    /// The underlying resource manager.
    pub fn manager(&self) -> &R {
        &self.manager
    }

    pub fn config(&self) -> &Tranq {
        &self.config
    }

    /// Obtain a transaction scope according to the definition's propagation
    /// behavior, beginning, joining, suspending, or nesting as required.
    pub fn get_transaction(
        &self,
        definition: &TransactionDefinition,
    ) -> Result<TransactionStatus<R>> {
        let def = self.effective_definition(definition);
        if def.get_timeout_seconds() < DEFAULT_TIMEOUT {
            return Err(Error::InvalidTimeout {
                seconds: def.get_timeout_seconds(),
            });
        }

        let mut transaction = self.manager.acquire()?;
        let debug_enabled = tracing::enabled!(tracing::Level::DEBUG);

        if self.manager.is_existing(&transaction)? {
            return self.handle_existing(&def, transaction, debug_enabled);
        }

        match def.get_propagation() {
            Propagation::Mandatory => Err(Error::illegal_state(
                "no existing transaction found for transaction marked with propagation 'mandatory'",
            )),
            Propagation::Required | Propagation::RequiresNew | Propagation::Nested => {
                // A synchronization-only scope may be active without a
                // physical transaction; it is displaced like a real one.
                let suspended = self.suspend_flow(None)?;
                if debug_enabled {
                    debug!(
                        name = def.get_name().unwrap_or("<unnamed>"),
                        propagation = %def.get_propagation(),
                        "creating new transaction"
                    );
                }
                match self.manager.begin(&mut transaction, &def) {
                    Ok(()) => {
                        let new_sync =
                            self.config.synchronization != SynchronizationPolicy::Never;
                        self.prepare_status(
                            &def,
                            Some(transaction),
                            true,
                            new_sync,
                            debug_enabled,
                            suspended,
                        )
                    }
                    Err(err) => {
                        self.resume_after_begin_failure(None, suspended, &err);
                        Err(err)
                    }
                }
            }
            Propagation::Supports | Propagation::NotSupported | Propagation::Never => {
                if def.get_isolation() != Isolation::Default {
                    warn!(
                        isolation = %def.get_isolation(),
                        "custom isolation level specified but no actual transaction initiated; \
                         isolation level will effectively be ignored"
                    );
                }
                let new_sync = self.config.synchronization == SynchronizationPolicy::Always;
                self.prepare_status(&def, None, true, new_sync, debug_enabled, None)
            }
        }
    }

    fn handle_existing(
        &self,
        def: &TransactionDefinition,
        mut transaction: R::Transaction,
        debug_enabled: bool,
    ) -> Result<TransactionStatus<R>> {
        match def.get_propagation() {
            Propagation::Never => Err(Error::illegal_state(
                "existing transaction found for transaction marked with propagation 'never'",
            )),
            Propagation::NotSupported => {
                if debug_enabled {
                    debug!("suspending current transaction");
                }
                let suspended = self.suspend_flow(Some(&mut transaction))?;
                let new_sync = self.config.synchronization == SynchronizationPolicy::Always;
                self.prepare_status(def, None, false, new_sync, debug_enabled, suspended)
            }
            Propagation::RequiresNew => {
                if debug_enabled {
                    debug!("suspending current transaction, creating new transaction");
                }
                let suspended = self.suspend_flow(Some(&mut transaction))?;
                match self.manager.begin(&mut transaction, def) {
                    Ok(()) => {
                        let new_sync =
                            self.config.synchronization != SynchronizationPolicy::Never;
                        self.prepare_status(
                            def,
                            Some(transaction),
                            true,
                            new_sync,
                            debug_enabled,
                            suspended,
                        )
                    }
                    Err(err) => {
                        self.resume_after_begin_failure(Some(&mut transaction), suspended, &err);
                        Err(err)
                    }
                }
            }
            Propagation::Nested => {
                if !self.config.nested_transaction_allowed {
                    return Err(Error::NestedNotSupported(
                        "nested transactions are disabled by default - \
                         enable 'nested_transactions' in the configuration"
                            .into(),
                    ));
                }
                if debug_enabled {
                    debug!("creating nested transaction");
                }
                if self.manager.use_savepoint_for_nested() {
                    // A savepoint scope inside the existing transaction; the
                    // enclosing synchronization registry stays in charge.
                    let mut status =
                        self.build_status(def, Some(transaction), false, false, debug_enabled, None);
                    self.create_and_hold_savepoint(&mut status)?;
                    Ok(status)
                } else {
                    self.manager.begin(&mut transaction, def)?;
                    let new_sync = self.config.synchronization != SynchronizationPolicy::Never;
                    self.prepare_status(def, Some(transaction), true, new_sync, debug_enabled, None)
                }
            }
            Propagation::Required | Propagation::Supports | Propagation::Mandatory => {
                if self.config.validate_existing_transaction {
                    if def.get_isolation() != Isolation::Default
                        && binding::current_isolation() != Some(def.get_isolation())
                    {
                        return Err(Error::illegal_state(format!(
                            "participating transaction specifies isolation level '{}' \
                             which is incompatible with the existing transaction",
                            def.get_isolation(),
                        )));
                    }
                    if !def.is_read_only() && binding::is_current_read_only() {
                        return Err(Error::illegal_state(
                            "participating transaction is not marked as read-only \
                             but the existing transaction is",
                        ));
                    }
                }
                if debug_enabled {
                    debug!("participating in existing transaction");
                }
                let new_sync = self.config.synchronization != SynchronizationPolicy::Never;
                self.prepare_status(def, Some(transaction), false, new_sync, debug_enabled, None)
            }
        }
    }

    /// Apply the configured default timeout when the definition leaves the
    /// timeout at the infrastructure default.
    fn effective_definition(&self, definition: &TransactionDefinition) -> TransactionDefinition {
        let mut def = definition.clone();
        if def.get_timeout_seconds() == DEFAULT_TIMEOUT
            && self.config.default_timeout != DEFAULT_TIMEOUT
        {
            def = def.timeout_seconds(self.config.default_timeout);
        }
        def
    }

    fn build_status(
        &self,
        def: &TransactionDefinition,
        transaction: Option<R::Transaction>,
        new_transaction: bool,
        new_synchronization: bool,
        debug_enabled: bool,
        suspended: Option<SuspendedFlow<R::Suspended>>,
    ) -> TransactionStatus<R> {
        let actual_new_sync = new_synchronization && !binding::is_synchronization_active();
        let logger = if new_transaction
            && transaction.is_some()
            && self.config.log_settings.is_enabled()
        {
            Some(TransactionLogger::new(
                def.get_name().map(str::to_owned),
                def.get_propagation().as_str(),
                self.config.log_settings.clone(),
            ))
        } else {
            None
        };
        TransactionStatus {
            transaction,
            new_transaction,
            new_synchronization: actual_new_sync,
            read_only: def.is_read_only(),
            debug: debug_enabled,
            suspended,
            savepoint: None,
            local_rollback_only: false,
            completed: false,
            logger,
        }
    }

    fn prepare_status(
        &self,
        def: &TransactionDefinition,
        transaction: Option<R::Transaction>,
        new_transaction: bool,
        new_synchronization: bool,
        debug_enabled: bool,
        suspended: Option<SuspendedFlow<R::Suspended>>,
    ) -> Result<TransactionStatus<R>> {
        let status = self.build_status(
            def,
            transaction,
            new_transaction,
            new_synchronization,
            debug_enabled,
            suspended,
        );
        self.prepare_synchronization(&status, def)?;
        Ok(status)
    }

    /// Initialize the flow's ambient attributes for a scope that owns the
    /// synchronization registry.
    fn prepare_synchronization(
        &self,
        status: &TransactionStatus<R>,
        def: &TransactionDefinition,
    ) -> Result<()> {
        if status.new_synchronization {
            binding::set_actual_transaction_active(status.has_transaction());
            binding::set_current_isolation(match def.get_isolation() {
                Isolation::Default => None,
                other => Some(other),
            });
            binding::set_current_read_only(def.is_read_only());
            binding::set_current_name(def.get_name().map(str::to_owned));
            binding::init_synchronization()?;
        }
        Ok(())
    }

    // ===== suspension / resumption =====

    /// Capture the flow's ambient state: notify and collect the registered
    /// synchronizations, suspend the physical transaction when one is given,
    /// then snapshot and clear the scalar attributes.
    fn suspend_flow(
        &self,
        transaction: Option<&mut R::Transaction>,
    ) -> Result<Option<SuspendedFlow<R::Suspended>>> {
        if binding::is_synchronization_active() {
            let suspended_syncs = self.suspend_synchronizations();
            let resource = match transaction {
                Some(tx) => match self.manager.suspend(tx) {
                    Ok(token) => Some(token),
                    Err(err) => {
                        // The transaction stays live; reinstate the
                        // synchronizations we already detached.
                        if let Err(resume_err) = self.resume_synchronizations(suspended_syncs) {
                            warn!(
                                error = %resume_err,
                                "failed to reinstate synchronizations after suspension failure"
                            );
                        }
                        return Err(err);
                    }
                },
                None => None,
            };
            let name = binding::current_name();
            binding::set_current_name(None);
            let read_only = binding::is_current_read_only();
            binding::set_current_read_only(false);
            let isolation = binding::current_isolation();
            binding::set_current_isolation(None);
            let was_active = binding::is_actual_transaction_active();
            binding::set_actual_transaction_active(false);
            Ok(Some(SuspendedFlow {
                resource,
                synchronizations: Some(suspended_syncs),
                name,
                read_only,
                isolation,
                was_active,
            }))
        } else if let Some(tx) = transaction {
            let resource = self.manager.suspend(tx)?;
            Ok(Some(SuspendedFlow {
                resource: Some(resource),
                synchronizations: None,
                name: None,
                read_only: false,
                isolation: None,
                was_active: false,
            }))
        } else {
            Ok(None)
        }
    }

    /// Reinstate a suspended flow: resource-level resume first, then the
    /// scalar attributes, then the synchronizations in their original order.
    fn resume_flow(
        &self,
        transaction: Option<&mut R::Transaction>,
        holder: SuspendedFlow<R::Suspended>,
    ) -> Result<()> {
        if let Some(resource) = holder.resource {
            self.manager.resume(transaction, resource)?;
        }
        if let Some(synchronizations) = holder.synchronizations {
            binding::set_actual_transaction_active(holder.was_active);
            binding::set_current_isolation(holder.isolation);
            binding::set_current_read_only(holder.read_only);
            binding::set_current_name(holder.name);
            self.resume_synchronizations(synchronizations)?;
        }
        Ok(())
    }

    fn suspend_synchronizations(&self) -> Vec<Arc<dyn TransactionSynchronization>> {
        let synchronizations = binding::synchronizations();
        for sync in &synchronizations {
            sync.suspend();
        }
        binding::clear_synchronization();
        synchronizations
    }

    fn resume_synchronizations(
        &self,
        synchronizations: Vec<Arc<dyn TransactionSynchronization>>,
    ) -> Result<()> {
        binding::init_synchronization()?;
        for sync in synchronizations {
            sync.resume();
            binding::register_synchronization(sync)?;
        }
        Ok(())
    }

    fn resume_after_begin_failure(
        &self,
        transaction: Option<&mut R::Transaction>,
        suspended: Option<SuspendedFlow<R::Suspended>>,
        begin_error: &Error,
    ) {
        if let Some(holder) = suspended {
            if let Err(err) = self.resume_flow(transaction, holder) {
                error!(
                    error = %err,
                    begin_error = %begin_error,
                    "failed to resume suspended transaction after begin failure"
                );
            }
        }
    }

    // ===== savepoints =====

    /// Create a savepoint in the scope's transaction.
    pub fn create_savepoint(&self, status: &mut TransactionStatus<R>) -> Result<R::Savepoint> {
        let tx = status
            .transaction
            .as_mut()
            .ok_or_else(|| Error::usage("cannot create savepoint - no transaction available"))?;
        if !self.manager.supports_savepoints(tx) {
            return Err(Error::NestedNotSupported(
                "transaction does not support savepoints".into(),
            ));
        }
        self.manager.create_savepoint(tx)
    }

    /// Roll the scope's transaction back to the given savepoint. The
    /// savepoint stays valid and must still be released.
    pub fn rollback_to_savepoint(
        &self,
        status: &mut TransactionStatus<R>,
        savepoint: &R::Savepoint,
    ) -> Result<()> {
        let tx = status
            .transaction
            .as_mut()
            .ok_or_else(|| Error::usage("cannot roll back to savepoint - no transaction available"))?;
        self.manager.rollback_to_savepoint(tx, savepoint)
    }

    /// Release the given savepoint without rolling back.
    pub fn release_savepoint(
        &self,
        status: &mut TransactionStatus<R>,
        savepoint: R::Savepoint,
    ) -> Result<()> {
        let tx = status
            .transaction
            .as_mut()
            .ok_or_else(|| Error::usage("cannot release savepoint - no transaction available"))?;
        self.manager.release_savepoint(tx, savepoint)
    }

    fn create_and_hold_savepoint(&self, status: &mut TransactionStatus<R>) -> Result<()> {
        let savepoint = self.create_savepoint(status)?;
        status.savepoint = Some(savepoint);
        Ok(())
    }

    fn rollback_to_held_savepoint(&self, status: &mut TransactionStatus<R>) -> Result<()> {
        let savepoint = status.savepoint.take().ok_or_else(|| {
            Error::usage("cannot roll back to savepoint - no savepoint associated with this scope")
        })?;
        let tx = status
            .transaction
            .as_mut()
            .ok_or_else(|| Error::usage("cannot roll back to savepoint - no transaction available"))?;
        self.manager.rollback_to_savepoint(tx, &savepoint)?;
        self.manager.release_savepoint(tx, savepoint)
    }

    fn release_held_savepoint(&self, status: &mut TransactionStatus<R>) -> Result<()> {
        let savepoint = status.savepoint.take().ok_or_else(|| {
            Error::usage("cannot release savepoint - no savepoint associated with this scope")
        })?;
        let tx = status
            .transaction
            .as_mut()
            .ok_or_else(|| Error::usage("cannot release savepoint - no transaction available"))?;
        self.manager.release_savepoint(tx, savepoint)
    }

    // ===== commit =====

    /// Complete the scope by committing.
    ///
    /// A scope marked rollback-only (locally via
    /// [`TransactionStatus::set_rollback_only`], or globally on the
    /// underlying transaction by any participant) is rolled back instead;
    /// the global case reports [`Error::UnexpectedRollback`].
    pub fn commit(&self, status: &mut TransactionStatus<R>) -> Result<()> {
        if status.completed {
            return Err(Error::illegal_state(
                "transaction is already completed - \
                 do not call commit or rollback more than once per transaction",
            ));
        }
        if status.local_rollback_only {
            if status.debug {
                debug!("transactional code has requested rollback");
            }
            return self.process_rollback(status, false);
        }
        if !self.manager.commit_on_global_rollback_only() && self.is_global_rollback_only(status) {
            if status.debug {
                debug!("transaction is marked as rollback-only but commit was requested");
            }
            return self.process_rollback(status, true);
        }
        self.process_commit(status)
    }

    fn is_global_rollback_only(&self, status: &TransactionStatus<R>) -> bool {
        status
            .transaction
            .as_ref()
            .map(|tx| self.manager.is_global_rollback_only(tx))
            .unwrap_or(false)
    }

    fn process_commit(&self, status: &mut TransactionStatus<R>) -> Result<()> {
        let result = self.commit_inner(status);
        self.cleanup_after_completion(status);
        result
    }

    fn commit_inner(&self, status: &mut TransactionStatus<R>) -> Result<()> {
        // A pre-commit hook failure diverts to rollback handling before the
        // completion phase has started.
        if let Err(err) = self.run_pre_commit_hooks(status) {
            self.trigger_before_completion(status);
            return self.rollback_on_commit_failure(status, err);
        }
        self.trigger_before_completion(status);

        match self.perform_commit(status) {
            Ok(()) => {
                // An after-commit error reaches the caller, but the
                // transaction is committed and completion still reports so.
                let after_commit = self.trigger_after_commit(status);
                self.trigger_after_completion(status, CompletionStatus::Committed);
                after_commit
            }
            Err(err @ Error::UnexpectedRollback(_)) => {
                self.trigger_after_completion(status, CompletionStatus::RolledBack);
                Err(err)
            }
            Err(err) => {
                if self.config.rollback_on_commit_failure {
                    self.rollback_on_commit_failure(status, err)
                } else {
                    self.trigger_after_completion(status, CompletionStatus::Unknown);
                    Err(err)
                }
            }
        }
    }

    fn run_pre_commit_hooks(&self, status: &mut TransactionStatus<R>) -> Result<()> {
        if let Some(tx) = status.transaction.as_mut() {
            self.manager.prepare_for_commit(tx)?;
        }
        self.trigger_before_commit(status)
    }

    fn perform_commit(&self, status: &mut TransactionStatus<R>) -> Result<()> {
        let mut unexpected_rollback = false;
        if status.has_savepoint() {
            if status.debug {
                debug!("releasing transaction savepoint");
            }
            unexpected_rollback = self.is_global_rollback_only(status);
            self.release_held_savepoint(status)?;
        } else if status.new_transaction {
            if status.debug {
                debug!("initiating transaction commit");
            }
            unexpected_rollback = self.is_global_rollback_only(status);
            if let Some(tx) = status.transaction.as_mut() {
                self.manager.commit(tx)?;
            }
        } else if self.config.fail_early_on_global_rollback_only {
            unexpected_rollback = self.is_global_rollback_only(status);
        }
        if unexpected_rollback {
            return Err(Error::UnexpectedRollback(
                "transaction silently rolled back because it has been marked as rollback-only"
                    .into(),
            ));
        }
        Ok(())
    }

    /// A commit attempt failed; roll back (or mark a joined transaction
    /// rollback-only) and report the failure.
    fn rollback_on_commit_failure(
        &self,
        status: &mut TransactionStatus<R>,
        commit_error: Error,
    ) -> Result<()> {
        let rollback_result = if status.new_transaction {
            if status.debug {
                debug!("initiating transaction rollback after commit failure");
            }
            match status.transaction.as_mut() {
                Some(tx) => self.manager.rollback(tx),
                None => Ok(()),
            }
        } else if status.has_transaction() && self.config.global_rollback_on_participation_failure
        {
            match status.transaction.as_mut() {
                Some(tx) => self.manager.set_rollback_only(tx),
                None => Ok(()),
            }
        } else {
            Ok(())
        };

        match rollback_result {
            Ok(()) => {
                self.trigger_after_completion(status, CompletionStatus::RolledBack);
                Err(commit_error)
            }
            Err(rollback_error) => {
                error!(error = %commit_error, "commit failure overridden by rollback failure");
                self.trigger_after_completion(status, CompletionStatus::Unknown);
                Err(rollback_error)
            }
        }
    }

    // ===== rollback =====

    /// Complete the scope by rolling back.
    pub fn rollback(&self, status: &mut TransactionStatus<R>) -> Result<()> {
        if status.completed {
            return Err(Error::illegal_state(
                "transaction is already completed - \
                 do not call commit or rollback more than once per transaction",
            ));
        }
        self.process_rollback(status, false)
    }

    fn process_rollback(&self, status: &mut TransactionStatus<R>, unexpected: bool) -> Result<()> {
        let result = self.rollback_inner(status, unexpected);
        self.cleanup_after_completion(status);
        result
    }

    fn rollback_inner(&self, status: &mut TransactionStatus<R>, unexpected: bool) -> Result<()> {
        let mut unexpected_rollback = unexpected;
        self.trigger_before_completion(status);

        match self.perform_rollback(status, &mut unexpected_rollback) {
            Err(err) => {
                self.trigger_after_completion(status, CompletionStatus::Unknown);
                Err(err)
            }
            Ok(()) => {
                self.trigger_after_completion(status, CompletionStatus::RolledBack);
                if unexpected_rollback {
                    Err(Error::UnexpectedRollback(
                        "transaction rolled back because it has been marked as rollback-only"
                            .into(),
                    ))
                } else {
                    Ok(())
                }
            }
        }
    }

    fn perform_rollback(
        &self,
        status: &mut TransactionStatus<R>,
        unexpected_rollback: &mut bool,
    ) -> Result<()> {
        if status.has_savepoint() {
            if status.debug {
                debug!("rolling back transaction to savepoint");
            }
            self.rollback_to_held_savepoint(status)
        } else if status.new_transaction {
            if status.debug {
                debug!("initiating transaction rollback");
            }
            match status.transaction.as_mut() {
                Some(tx) => self.manager.rollback(tx),
                None => Ok(()),
            }
        } else {
            if status.has_transaction() {
                if status.local_rollback_only
                    || self.config.global_rollback_on_participation_failure
                {
                    if status.debug {
                        debug!(
                            "participating transaction failed - \
                             marking existing transaction as rollback-only"
                        );
                    }
                    if let Some(tx) = status.transaction.as_mut() {
                        self.manager.set_rollback_only(tx)?;
                    }
                } else if status.debug {
                    debug!(
                        "participating transaction failed - \
                         letting transaction originator decide on rollback"
                    );
                }
            } else {
                debug!("should roll back transaction but cannot - no transaction available");
            }
            // The unexpected-rollback outcome surfaces at the outermost
            // boundary unless fail-early is configured.
            if !self.config.fail_early_on_global_rollback_only {
                *unexpected_rollback = false;
            }
            Ok(())
        }
    }

    // ===== synchronization fan-out =====

    fn trigger_before_commit(&self, status: &TransactionStatus<R>) -> Result<()> {
        if status.new_synchronization {
            synchronization::invoke_before_commit(&binding::synchronizations(), status.read_only)?;
        }
        Ok(())
    }

    fn trigger_before_completion(&self, status: &TransactionStatus<R>) {
        if status.new_synchronization {
            synchronization::invoke_before_completion(&binding::synchronizations());
        }
    }

    fn trigger_after_commit(&self, status: &TransactionStatus<R>) -> Result<()> {
        if status.new_synchronization {
            synchronization::invoke_after_commit(&binding::synchronizations())?;
        }
        Ok(())
    }

    fn trigger_after_completion(
        &self,
        status: &mut TransactionStatus<R>,
        completion: CompletionStatus,
    ) {
        if status.new_synchronization {
            let synchronizations = binding::take_synchronizations();
            if !status.has_transaction() || status.new_transaction {
                // This scope decided the outcome; report it directly.
                synchronization::invoke_after_completion(&synchronizations, completion);
            } else if !synchronizations.is_empty() {
                // Participating scope with its own synchronizations: the
                // enclosing transaction's owner decides the final outcome.
                if let Some(tx) = status.transaction.as_mut() {
                    self.manager
                        .register_after_completion_with_existing(tx, synchronizations);
                }
            }
        }
        if let Some(logger) = status.logger.take() {
            logger.finish(completion.as_str());
        }
    }

    // ===== completion cleanup =====

    /// Tear the completed scope down: flag it, clear the synchronization
    /// registry it owned, let the manager release resources, and reinstate
    /// any displaced transaction.
    fn cleanup_after_completion(&self, status: &mut TransactionStatus<R>) {
        status.completed = true;
        if status.new_synchronization {
            binding::clear();
        }
        if status.new_transaction {
            if let Some(tx) = status.transaction.as_mut() {
                self.manager.cleanup(tx);
            }
        }
        if let Some(holder) = status.suspended.take() {
            if status.debug {
                debug!("resuming suspended transaction after completion of inner transaction");
            }
            if let Err(err) = self.resume_flow(status.transaction.as_mut(), holder) {
                // The originating commit/rollback outcome must not be masked.
                error!(error = %err, "failed to resume suspended transaction after completion");
            }
        }
    }

    // ===== convenience =====

    /// Run a closure inside a transaction scope: commit on `Ok`, roll back
    /// on `Err`. A rollback failure is reported in place of the closure's
    /// error.
    pub fn execute<T, F>(&self, definition: &TransactionDefinition, f: F) -> Result<T>
    where
        F: FnOnce(&mut TransactionStatus<R>) -> Result<T>,
    {
        let mut status = self.get_transaction(definition)?;
        match f(&mut status) {
            Ok(value) => {
                self.commit(&mut status)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback(&mut status) {
                    error!(error = %err, "application error overridden by rollback failure");
                    return Err(rollback_err);
                }
                Err(err)
            }
        }
    }
}
