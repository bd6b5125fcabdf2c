use std::time::Duration;

use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::{
    definition::DEFAULT_TIMEOUT, logger::LogSettings, manager::ResourceManager,
    orchestrator::TransactionOrchestrator,
};

enum_mode! {
    /// When a transaction scope activates the flow's synchronization
    /// registry.
    pub SynchronizationPolicy {
        /// Activate for every scope, even empty ones without a physical
        /// transaction.
        Always => "always",
        /// Activate only for scopes carrying an actual transaction.
        OnActualTransaction => "on_actual_transaction",
        /// Never activate; synchronizations are not supported.
        Never => "never",
    }
    default Always
}

/// Configure and build a [`TransactionOrchestrator`].
///
/// ```
/// use tranq::Tranq;
/// # use tranq_test::MockManager;
///
/// let orchestrator = Tranq::new()
///     .nested_transactions(true)
///     .rollback_on_commit_failure(true)
///     .build(MockManager::new());
/// ```
///
/// Configuration is fixed once the orchestrator is built. The struct
/// serializes for persistence of manager settings; the diagnostic log
/// settings are transient and re-initialized to defaults on load.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tranq {
    pub(crate) nested_transaction_allowed: bool,
    pub(crate) validate_existing_transaction: bool,
    pub(crate) global_rollback_on_participation_failure: bool,
    pub(crate) fail_early_on_global_rollback_only: bool,
    pub(crate) rollback_on_commit_failure: bool,
    pub(crate) synchronization: SynchronizationPolicy,
    pub(crate) default_timeout: i32,

    #[serde(skip, default)]
    pub(crate) log_settings: LogSettings,
}

impl Default for Tranq {
    fn default() -> Self {
        Self::new()
    }
}

impl Tranq {
    /// Construct `Self` with default options.
    ///
    /// See the source of this method for the current defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nested_transaction_allowed: false,
            validate_existing_transaction: false,
            global_rollback_on_participation_failure: true,
            fail_early_on_global_rollback_only: false,
            rollback_on_commit_failure: false,
            synchronization: SynchronizationPolicy::Always,
            default_timeout: DEFAULT_TIMEOUT,
            log_settings: Default::default(),
        }
    }

    /// Allow `Nested` propagation. Disabled by default; when disabled, a
    /// nested request over an existing transaction fails with
    /// [`Error::NestedNotSupported`](crate::Error::NestedNotSupported).
    #[must_use]
    pub fn nested_transactions(mut self, allowed: bool) -> Self {
        self.nested_transaction_allowed = allowed;
        self
    }

    /// Validate isolation and read-only compatibility when participating in
    /// an existing transaction. Disabled by default: participation is
    /// lenient and the definition's hints are ignored.
    #[must_use]
    pub fn validate_existing(mut self, validate: bool) -> Self {
        self.validate_existing_transaction = validate;
        self
    }

    /// Mark the underlying transaction rollback-only when a participating
    /// scope rolls back. Enabled by default: a failed participant dooms the
    /// whole transaction.
    ///
    /// When disabled, only a participant that explicitly marked its scope
    /// rollback-only dooms the transaction; an ordinary participant rollback
    /// leaves the decision to the transaction's originator.
    #[must_use]
    pub fn global_rollback_on_participation_failure(mut self, global_rollback: bool) -> Self {
        self.global_rollback_on_participation_failure = global_rollback;
        self
    }

    /// Report [`Error::UnexpectedRollback`](crate::Error::UnexpectedRollback)
    /// as soon as a participating scope completes over a rollback-only
    /// transaction, instead of at the outermost commit. Disabled by default.
    #[must_use]
    pub fn fail_early_on_global_rollback_only(mut self, fail_early: bool) -> Self {
        self.fail_early_on_global_rollback_only = fail_early;
        self
    }

    /// Physically roll back when the commit call itself fails. Disabled by
    /// default: the resource manager is assumed to have discarded the
    /// transaction on a failed commit.
    #[must_use]
    pub fn rollback_on_commit_failure(mut self, rollback: bool) -> Self {
        self.rollback_on_commit_failure = rollback;
        self
    }

    /// When to activate the flow's synchronization registry. The default is
    /// [`SynchronizationPolicy::Always`].
    #[must_use]
    pub fn synchronization(mut self, policy: SynchronizationPolicy) -> Self {
        self.synchronization = policy;
        self
    }

    /// Default timeout hint in seconds for definitions that leave the
    /// timeout unspecified. `-1` (the default) passes "infrastructure
    /// default" through to the resource manager.
    #[must_use]
    pub fn default_timeout(mut self, seconds: i32) -> Self {
        self.default_timeout = seconds;
        self
    }

    /// Level at which completed transaction lifecycles are logged.
    #[must_use]
    pub fn log_lifecycle(mut self, level: LevelFilter) -> Self {
        self.log_settings.log_lifecycle(level);
        self
    }

    /// Level and threshold for reporting slow transactions.
    #[must_use]
    pub fn log_slow_transactions(mut self, level: LevelFilter, duration: Duration) -> Self {
        self.log_settings.log_slow_transactions(level, duration);
        self
    }

    /// Build an orchestrator driving the given resource manager.
    pub fn build<R: ResourceManager>(self, manager: R) -> TransactionOrchestrator<R> {
        TransactionOrchestrator::with_config(manager, self)
    }
}
