use serde::{Deserialize, Serialize};

/// Timeout value meaning "use the infrastructure default".
pub const DEFAULT_TIMEOUT: i32 = -1;

enum_mode! {
    /// How a transactional operation relates to a transaction that may
    /// already be active on the calling flow.
    pub Propagation {
        /// Join the current transaction, or begin a new one if none exists.
        Required => "required",
        /// Join the current transaction if one exists, otherwise run
        /// non-transactionally.
        Supports => "supports",
        /// Join the current transaction; fail if none exists.
        Mandatory => "mandatory",
        /// Suspend the current transaction if one exists and begin a new one.
        RequiresNew => "requires_new",
        /// Suspend the current transaction if one exists and run
        /// non-transactionally.
        NotSupported => "not_supported",
        /// Run non-transactionally; fail if a transaction exists.
        Never => "never",
        /// Run inside a nested transaction if one exists, otherwise begin a
        /// new one.
        Nested => "nested",
    }
    default Required
}

enum_mode! {
    /// Requested isolation level, passed through to the resource manager as
    /// a hint.
    pub Isolation {
        /// Use the resource manager's default isolation.
        Default => "default",
        ReadUncommitted => "read_uncommitted",
        ReadCommitted => "read_committed",
        RepeatableRead => "repeatable_read",
        Serializable => "serializable",
    }
    default Default
}

/// The caller-supplied attributes of a transactional unit of work.
///
/// A definition is immutable once handed to
/// [`get_transaction`](crate::TransactionOrchestrator::get_transaction). The
/// builder-style setters make the common cases read naturally:
///
/// ```
/// use tranq::{Propagation, TransactionDefinition};
///
/// let def = TransactionDefinition::new()
///     .propagation(Propagation::RequiresNew)
///     .read_only(true)
///     .name("report-export");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDefinition {
    propagation: Propagation,
    isolation: Isolation,
    timeout_seconds: i32,
    read_only: bool,
    name: Option<String>,
}

impl TransactionDefinition {
    /// Construct a definition with default attributes: `Required`
    /// propagation, default isolation, infrastructure-default timeout,
    /// read-write, unnamed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            propagation: Propagation::default(),
            isolation: Isolation::default(),
            timeout_seconds: DEFAULT_TIMEOUT,
            read_only: false,
            name: None,
        }
    }

    /// Set the propagation behavior.
    #[must_use]
    pub fn propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = propagation;
        self
    }

    /// Set the isolation level hint.
    #[must_use]
    pub fn isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = isolation;
        self
    }

    /// Set the timeout hint in seconds. `-1` means "infrastructure default".
    /// Values below `-1` are rejected when the definition is used.
    #[must_use]
    pub fn timeout_seconds(mut self, seconds: i32) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Mark the unit of work as read-only. This is a hint to the resource
    /// manager and to participating data-access code.
    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Set a diagnostic name for the transaction.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn get_propagation(&self) -> Propagation {
        self.propagation
    }

    pub fn get_isolation(&self) -> Isolation {
        self.isolation
    }

    pub fn get_timeout_seconds(&self) -> i32 {
        self.timeout_seconds
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn get_name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl Default for TransactionDefinition {
    fn default() -> Self {
        Self::new()
    }
}
