use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::config::ContainerConfig;
use crate::container::binding::{BindingTable, FactoryEntry, Instance};
use crate::container::builder::ContainerBuilder;
use crate::container::descriptor::ServiceId;
use crate::container::disposal::DisposalStack;
use crate::container::guard::ResolutionGuard;
use crate::container::lazy::LazySlot;
use crate::container::lifetime::Lifetime;
use crate::container::tokens::ServiceToken;
use crate::errors::CoreError;

/// Composition root or one of its scopes.
///
/// A scope borrows its parent, so it can never outlive it and never owns it.
/// Every container in a tree shares the same [`BindingTable`]; each one caches its
/// own scoped instances and records the disposables it created. Singletons are
/// cached and disposed by the root only.
pub struct Container<'a> {
    id: Uuid,
    parent: Option<&'a Container<'a>>,
    root: Option<&'a Container<'a>>,
    depth: usize,
    bindings: Arc<BindingTable>,
    config: Arc<ContainerConfig>,
    slots: HashMap<ServiceId, LazySlot<Instance>>,
    disposables: DisposalStack,
    disposed: AtomicBool,
}

impl std::fmt::Debug for Container<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.id)
            .field("parent", &self.parent.map(|parent| parent.id))
            .field("depth", &self.depth)
            .field("bindings", &self.bindings.len())
            .field("slots", &self.slots.len())
            .field("disposables", &self.disposables)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl Container<'static> {
    /// Create a composition root with the default configuration
    pub fn new(bindings: Arc<BindingTable>) -> Self {
        Self::with_config(bindings, ContainerConfig::default())
    }

    /// Create a composition root with an explicit configuration
    pub fn with_config(bindings: Arc<BindingTable>, config: ContainerConfig) -> Self {
        let id = Uuid::new_v4();
        let slots = allocate_slots(&bindings, true);

        tracing::debug!(container = %id, bindings = bindings.len(), "created composition root");

        Self {
            id,
            parent: None,
            root: None,
            depth: 0,
            bindings,
            config: Arc::new(config),
            slots,
            disposables: DisposalStack::new(id.to_string()),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }
}

impl<'a> Container<'a> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Nesting level below the root; the root itself is at depth 0
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn parent(&self) -> Option<&'a Container<'a>> {
        self.parent
    }

    /// The composition root of this tree, `self` when this is the root
    pub fn root(&self) -> &Container<'a> {
        self.root.unwrap_or(self)
    }

    pub fn bindings(&self) -> &Arc<BindingTable> {
        &self.bindings
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Number of disposables this container will release on `dispose`
    pub fn pending_disposals(&self) -> usize {
        self.disposables.len()
    }

    pub fn is_registered<T: ?Sized + 'static>(&self) -> bool {
        self.bindings.contains(&ServiceId::of::<T>())
    }

    /// Resolve the unnamed binding of `T`
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, CoreError> {
        let service_id = ServiceId::of::<T>();
        let instance = self.resolve_id(&service_id)?;
        downcast::<T>(&service_id, instance)
    }

    /// Resolve the binding of `T` registered under `name`
    pub fn resolve_named<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, CoreError> {
        let service_id = ServiceId::named::<T>(name);
        let instance = self.resolve_id(&service_id)?;
        downcast::<T>(&service_id, instance)
    }

    /// Resolve the accessor described by a service token
    pub fn resolve_token<Tok: ServiceToken>(&self) -> Result<Arc<Tok::Service>, CoreError> {
        let service_id = Tok::service_id();
        let instance = self.resolve_id(&service_id)?;
        downcast::<Tok::Service>(&service_id, instance)
    }

    /// Resolve a service without knowing its type statically
    pub fn resolve_id(&self, service_id: &ServiceId) -> Result<Instance, CoreError> {
        if self.is_disposed() {
            return Err(CoreError::container_disposed(self.id));
        }

        let entry = self
            .bindings
            .lookup(service_id)
            .ok_or_else(|| CoreError::unregistered(service_id.to_string()))?;

        let _guard = if self.config.detect_cycles {
            Some(ResolutionGuard::enter(service_id)?)
        } else {
            None
        };

        tracing::trace!(
            container = %self.id,
            service = %service_id,
            lifetime = %entry.lifetime(),
            "resolving service"
        );

        match entry.lifetime() {
            Lifetime::Transient => self.create(service_id, entry),
            Lifetime::Scoped => self.resolve_cached(service_id, entry),
            Lifetime::Singleton => self.root().resolve_cached(service_id, entry),
        }
    }

    /// Return the instance cached in this container's slot, creating it on first use
    fn resolve_cached(&self, service_id: &ServiceId, entry: &FactoryEntry) -> Result<Instance, CoreError> {
        if self.is_disposed() {
            return Err(CoreError::container_disposed(self.id));
        }

        let slot = self.slots.get(service_id).ok_or_else(|| {
            CoreError::configuration(format!(
                "container {} holds no slot for {} service {}",
                self.id,
                entry.lifetime(),
                service_id
            ))
        })?;

        slot.get_or_try_init(self.config.failure_policy, || self.create(service_id, entry))
    }

    /// Run the factory against this container and take ownership of any disposable
    fn create(&self, service_id: &ServiceId, entry: &FactoryEntry) -> Result<Instance, CoreError> {
        let created = entry.create(service_id, self).inspect_err(|error| {
            tracing::warn!(
                container = %self.id,
                service = %service_id,
                error = %error,
                "service factory failed"
            );
        })?;

        if let Some(disposer) = created.disposer {
            if let Err(error) = self.disposables.push(service_id.clone(), disposer.clone()) {
                // Created while the container was being torn down; release it right away.
                if let Err(dispose_error) = disposer.dispose() {
                    tracing::warn!(
                        container = %self.id,
                        service = %service_id,
                        error = %dispose_error,
                        "failed to release instance created during disposal"
                    );
                }
                return Err(error);
            }
        }

        tracing::debug!(container = %self.id, service = %service_id, "created service instance");
        Ok(created.instance)
    }

    /// Create a child scope sharing this container's bindings and singletons
    pub fn create_scope(&self) -> Result<Container<'_>, CoreError> {
        if self.is_disposed() {
            return Err(CoreError::container_disposed(self.id));
        }

        let depth = self.depth + 1;
        if let Some(max) = self.config.max_scope_depth {
            if depth > max {
                return Err(CoreError::configuration(format!(
                    "scope depth {} exceeds the configured maximum of {}",
                    depth, max
                )));
            }
        }

        let id = Uuid::new_v4();
        tracing::debug!(container = %id, parent = %self.id, depth, "created scope");

        Ok(Container {
            id,
            parent: Some(self),
            root: Some(self.root()),
            depth,
            bindings: Arc::clone(&self.bindings),
            config: Arc::clone(&self.config),
            slots: allocate_slots(&self.bindings, false),
            disposables: DisposalStack::new(id.to_string()),
            disposed: AtomicBool::new(false),
        })
    }

    /// Release every disposable this container created, most recent first.
    ///
    /// Only the first call does anything. Parents and child scopes are left alone,
    /// so singletons are released only when the root itself is disposed.
    pub fn dispose(&self) -> Result<(), CoreError> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        tracing::debug!(
            container = %self.id,
            depth = self.depth,
            pending = self.disposables.len(),
            "disposing container"
        );

        self.disposables.drain_all(self.config.disposal_policy)
    }
}

impl Drop for Container<'_> {
    fn drop(&mut self) {
        if !self.config.dispose_on_drop || self.is_disposed() {
            return;
        }

        if let Err(error) = self.dispose() {
            tracing::error!(container = %self.id, error = %error, "dispose on drop failed");
        }
    }
}

/// A root caches scoped and singleton services; a scope caches scoped ones only
fn allocate_slots(bindings: &BindingTable, is_root: bool) -> HashMap<ServiceId, LazySlot<Instance>> {
    bindings
        .iter()
        .filter(|(_, entry)| match entry.lifetime() {
            Lifetime::Transient => false,
            Lifetime::Scoped => true,
            Lifetime::Singleton => is_root,
        })
        .map(|(service_id, _)| (service_id.clone(), LazySlot::new(service_id.to_string())))
        .collect()
}

fn downcast<T: ?Sized + Send + Sync + 'static>(service_id: &ServiceId, instance: Instance) -> Result<Arc<T>, CoreError> {
    instance
        .downcast_ref::<Arc<T>>()
        .cloned()
        .ok_or_else(|| CoreError::TypeMismatch {
            service: service_id.to_string(),
            expected: std::any::type_name::<T>().to_string(),
        })
}
