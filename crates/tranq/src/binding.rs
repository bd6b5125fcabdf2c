//! The per-flow binding registry.
//!
//! Each thread owns a private registry that holds the resources, completion
//! synchronizations, and ambient attributes of the transaction currently
//! active on that thread. The registry is the rendezvous point between the
//! orchestrator and resource-manager code: resource managers bind their
//! holders here on begin and look them up from data-access code, while the
//! orchestrator drives the synchronization list and the ambient attributes.
//!
//! Nothing in this module is shared across threads. A child thread can be
//! given a shallow snapshot of the parent's inheritable bindings via
//! [`inheritable_snapshot`] and [`install_snapshot`]; mutations after the
//! hand-off are local to each thread.

use std::any::Any;
use std::cell::RefCell;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::{
    definition::Isolation,
    error::{Error, Result},
    synchronization::TransactionSynchronization,
};

/// An opaque resource holder as stored in the registry. The orchestrator
/// never looks inside; resource managers downcast to their own holder types.
pub type ResourceHolder = Arc<dyn Any + Send + Sync>;

/// Identity of a bound resource, typically the connection factory the holder
/// was obtained from.
///
/// Keys compare either by name or by the address of a shared allocation:
///
/// ```
/// use std::sync::Arc;
/// use tranq::ResourceKey;
///
/// let factory = Arc::new("connection factory");
/// let by_identity = ResourceKey::of(&factory);
/// let by_name = ResourceKey::named("reporting-db");
/// assert_ne!(by_identity, by_name);
/// ```
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ResourceKey(KeyRepr);

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
enum KeyRepr {
    Named(String),
    Address(usize),
}

impl ResourceKey {
    /// A key identified by name.
    pub fn named(name: impl Into<String>) -> Self {
        ResourceKey(KeyRepr::Named(name.into()))
    }

    /// A key identified by the allocation behind a shared handle. Two clones
    /// of the same `Arc` produce equal keys.
    pub fn of<T: ?Sized>(handle: &Arc<T>) -> Self {
        ResourceKey(KeyRepr::Address(Arc::as_ptr(handle) as *const () as usize))
    }
}

struct Binding {
    holder: ResourceHolder,
    inheritable: bool,
}

/// A shallow copy of a flow's inheritable bindings, captured in the parent
/// at spawn time and installed in the child.
pub struct RegistrySnapshot {
    resources: Vec<(ResourceKey, ResourceHolder)>,
}

#[derive(Default)]
struct FlowState {
    resources: IndexMap<ResourceKey, Binding>,
    // None means no synchronization scope is active on this flow.
    synchronizations: Option<Vec<Arc<dyn TransactionSynchronization>>>,
    current_name: Option<String>,
    read_only: bool,
    isolation: Option<Isolation>,
    actual_transaction_active: bool,
}

thread_local! {
    static FLOW: RefCell<FlowState> = RefCell::new(FlowState::default());
}

/// Bind a resource holder for the given key on the current flow.
///
/// Fails with [`Error::Usage`] if the key is already bound.
pub fn bind_resource(key: ResourceKey, holder: ResourceHolder) -> Result<()> {
    bind(key, holder, false)
}

/// Like [`bind_resource`], but the binding is included in
/// [`inheritable_snapshot`] so spawned flows can see it.
pub fn bind_resource_inheritable(key: ResourceKey, holder: ResourceHolder) -> Result<()> {
    bind(key, holder, true)
}

fn bind(key: ResourceKey, holder: ResourceHolder, inheritable: bool) -> Result<()> {
    FLOW.with(|flow| {
        let mut flow = flow.borrow_mut();
        if flow.resources.contains_key(&key) {
            return Err(Error::usage(format!(
                "already a resource bound for key {key:?}"
            )));
        }
        flow.resources.insert(key, Binding { holder, inheritable });
        Ok(())
    })
}

/// Remove and return the holder bound for the given key.
///
/// Fails with [`Error::Usage`] if no holder is bound.
pub fn unbind_resource(key: &ResourceKey) -> Result<ResourceHolder> {
    unbind_resource_if_possible(key)
        .ok_or_else(|| Error::usage(format!("no resource bound for key {key:?}")))
}

/// Remove and return the holder bound for the given key, if any. Intended
/// for teardown on failure paths where the binding may already be gone.
pub fn unbind_resource_if_possible(key: &ResourceKey) -> Option<ResourceHolder> {
    FLOW.with(|flow| {
        flow.borrow_mut()
            .resources
            .shift_remove(key)
            .map(|binding| binding.holder)
    })
}

/// The holder bound for the given key, if any.
pub fn get_resource(key: &ResourceKey) -> Option<ResourceHolder> {
    FLOW.with(|flow| {
        flow.borrow()
            .resources
            .get(key)
            .map(|binding| binding.holder.clone())
    })
}

/// Whether a holder is bound for the given key.
pub fn has_resource(key: &ResourceKey) -> bool {
    FLOW.with(|flow| flow.borrow().resources.contains_key(key))
}

/// Capture a shallow copy of the inheritable bindings on this flow.
pub fn inheritable_snapshot() -> RegistrySnapshot {
    FLOW.with(|flow| RegistrySnapshot {
        resources: flow
            .borrow()
            .resources
            .iter()
            .filter(|(_, binding)| binding.inheritable)
            .map(|(key, binding)| (key.clone(), binding.holder.clone()))
            .collect(),
    })
}

/// Install a snapshot captured in another flow. Existing bindings for the
/// same keys are replaced.
pub fn install_snapshot(snapshot: RegistrySnapshot) {
    FLOW.with(|flow| {
        let mut flow = flow.borrow_mut();
        for (key, holder) in snapshot.resources {
            flow.resources.insert(
                key,
                Binding {
                    holder,
                    inheritable: true,
                },
            );
        }
    });
}

/// Activate the synchronization scope for the current flow.
///
/// Fails with [`Error::IllegalState`] if synchronization is already active.
pub fn init_synchronization() -> Result<()> {
    FLOW.with(|flow| {
        let mut flow = flow.borrow_mut();
        if flow.synchronizations.is_some() {
            return Err(Error::illegal_state(
                "cannot activate transaction synchronization - already active",
            ));
        }
        flow.synchronizations = Some(Vec::new());
        Ok(())
    })
}

/// Whether a synchronization scope is active on the current flow.
pub fn is_synchronization_active() -> bool {
    FLOW.with(|flow| flow.borrow().synchronizations.is_some())
}

/// Register a synchronization with the active scope. Invocation order of
/// completion callbacks follows registration order.
///
/// Fails with [`Error::IllegalState`] if no scope is active.
pub fn register_synchronization(sync: Arc<dyn TransactionSynchronization>) -> Result<()> {
    FLOW.with(|flow| {
        let mut flow = flow.borrow_mut();
        match flow.synchronizations.as_mut() {
            Some(synchronizations) => {
                synchronizations.push(sync);
                Ok(())
            }
            None => Err(Error::illegal_state(
                "transaction synchronization is not active",
            )),
        }
    })
}

/// A snapshot of the registered synchronizations, in registration order.
/// Empty when no scope is active.
pub fn synchronizations() -> Vec<Arc<dyn TransactionSynchronization>> {
    FLOW.with(|flow| {
        flow.borrow()
            .synchronizations
            .as_ref()
            .cloned()
            .unwrap_or_default()
    })
}

/// Deactivate the synchronization scope, dropping all registrations.
pub fn clear_synchronization() {
    FLOW.with(|flow| flow.borrow_mut().synchronizations = None);
}

/// Remove the registered synchronizations, leaving the scope active. Used
/// while suspending: the suspended scope's synchronizations move into the
/// suspension holder.
pub(crate) fn take_synchronizations() -> Vec<Arc<dyn TransactionSynchronization>> {
    FLOW.with(|flow| {
        flow.borrow_mut()
            .synchronizations
            .take()
            .unwrap_or_default()
    })
}

pub fn set_current_name(name: Option<String>) {
    FLOW.with(|flow| flow.borrow_mut().current_name = name);
}

/// The diagnostic name of the transaction active on this flow, if any.
pub fn current_name() -> Option<String> {
    FLOW.with(|flow| flow.borrow().current_name.clone())
}

pub fn set_current_read_only(read_only: bool) {
    FLOW.with(|flow| flow.borrow_mut().read_only = read_only);
}

pub fn is_current_read_only() -> bool {
    FLOW.with(|flow| flow.borrow().read_only)
}

pub fn set_current_isolation(isolation: Option<Isolation>) {
    FLOW.with(|flow| flow.borrow_mut().isolation = isolation);
}

pub fn current_isolation() -> Option<Isolation> {
    FLOW.with(|flow| flow.borrow().isolation)
}

pub fn set_actual_transaction_active(active: bool) {
    FLOW.with(|flow| flow.borrow_mut().actual_transaction_active = active);
}

/// Whether a physical transaction is active on this flow.
pub fn is_actual_transaction_active() -> bool {
    FLOW.with(|flow| flow.borrow().actual_transaction_active)
}

/// Tear down the synchronization scope and all ambient attributes. Resource
/// bindings are owned by resource managers and stay untouched.
pub fn clear() {
    FLOW.with(|flow| {
        let mut flow = flow.borrow_mut();
        flow.synchronizations = None;
        flow.current_name = None;
        flow.read_only = false;
        flow.isolation = None;
        flow.actual_transaction_active = false;
    });
}
