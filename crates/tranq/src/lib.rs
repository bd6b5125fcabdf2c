//! A resource-manager-agnostic transaction orchestration engine.
//!
//! tranq layers declarative propagation semantics, savepoint-based nested
//! transactions, suspension and resumption of enclosing transactions, and
//! completion synchronizations on top of any transactional resource: a
//! relational connection, a distributed coordinator, a message-broker
//! session. A concrete resource manager implements [`ResourceManager`]; the
//! [`TransactionOrchestrator`] drives it and keeps the per-flow
//! [`binding`] registry visible to cooperating data-access code.

#[macro_use]
/// Macro helper for enum mode definitions.
mod enum_mode;
#[macro_use]
/// Transaction lifecycle logging.
mod logger;

/// The per-flow binding registry.
pub mod binding;
/// Transaction definitions: propagation, isolation, timeout, read-only.
mod definition;
/// Error types and result helpers.
pub mod error;
/// The resource manager contract.
mod manager;
/// The orchestration core.
mod orchestrator;
/// Transaction status handles and suspension snapshots.
mod status;
/// Completion synchronizations and callback fan-out.
mod synchronization;
/// Orchestrator configuration.
mod tranq;

pub use crate::{
    binding::{RegistrySnapshot, ResourceHolder, ResourceKey},
    definition::{Isolation, Propagation, TransactionDefinition, DEFAULT_TIMEOUT},
    error::{Error, Result},
    logger::LogSettings,
    manager::ResourceManager,
    orchestrator::TransactionOrchestrator,
    status::{SuspendedFlow, TransactionStatus},
    synchronization::{CompletionStatus, TransactionSynchronization},
    tranq::{SynchronizationPolicy, Tranq},
};
