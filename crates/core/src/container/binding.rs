use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::container::container::Container;
use crate::container::descriptor::ServiceId;
use crate::container::disposal::Disposable;
use crate::container::lifetime::Lifetime;
use crate::container::tokens::ServiceToken;
use crate::errors::{BoxError, CoreError};

/// Type-erased service instance.
///
/// The erased value is always an `Arc<T>` for the declared service type `T`, which
/// lets `T` be unsized (`dyn Trait`) and keeps identity observable via `Arc::ptr_eq`.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// What a factory hands back to the container
pub struct Created {
    pub instance: Instance,
    pub disposer: Option<Arc<dyn Disposable>>,
}

/// Factory function stored in the binding table
pub type FactoryFn = Box<dyn Fn(&Container<'_>) -> Result<Created, BoxError> + Send + Sync>;

/// Lifetime and factory for one service key
pub struct FactoryEntry {
    lifetime: Lifetime,
    disposable: bool,
    factory: FactoryFn,
}

impl std::fmt::Debug for FactoryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactoryEntry")
            .field("lifetime", &self.lifetime)
            .field("disposable", &self.disposable)
            .field("factory", &"<factory_fn>")
            .finish()
    }
}

impl FactoryEntry {
    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    /// Whether instances are registered for disposal when created
    pub fn is_disposable(&self) -> bool {
        self.disposable
    }

    /// Run the factory against the container that is resolving the service
    pub fn create(&self, service_id: &ServiceId, container: &Container<'_>) -> Result<Created, CoreError> {
        (self.factory)(container)
            .map_err(|error| CoreError::from_factory(&service_id.to_string(), error))
    }
}

/// One `(key, lifetime, factory)` triple handed to the binding table
#[derive(Debug)]
pub struct Binding {
    pub service_id: ServiceId,
    pub entry: FactoryEntry,
}

impl Binding {
    /// Bind `T` under its type alone
    pub fn new<T, F>(lifetime: Lifetime, factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Container<'_>) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        Self::plain(ServiceId::of::<T>(), lifetime, factory)
    }

    /// Bind `T` under an accessor name, so one type can carry several bindings
    pub fn named<T, F>(name: impl Into<String>, lifetime: Lifetime, factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Container<'_>) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        Self::plain(ServiceId::named::<T>(name), lifetime, factory)
    }

    /// Bind a disposable `T`; every instance is released when its owning container is disposed
    pub fn disposable<T, F>(lifetime: Lifetime, factory: F) -> Self
    where
        T: Disposable + 'static,
        F: Fn(&Container<'_>) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        Self::with_disposer(ServiceId::of::<T>(), lifetime, factory)
    }

    /// Named variant of [`Binding::disposable`]
    pub fn named_disposable<T, F>(name: impl Into<String>, lifetime: Lifetime, factory: F) -> Self
    where
        T: Disposable + 'static,
        F: Fn(&Container<'_>) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        Self::with_disposer(ServiceId::named::<T>(name), lifetime, factory)
    }

    /// Bind the accessor described by a service token
    pub fn token<Tok, F>(lifetime: Lifetime, factory: F) -> Self
    where
        Tok: ServiceToken,
        F: Fn(&Container<'_>) -> Result<Arc<Tok::Service>, BoxError> + Send + Sync + 'static,
    {
        Self::plain(Tok::service_id(), lifetime, factory)
    }

    fn plain<T, F>(service_id: ServiceId, lifetime: Lifetime, factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Container<'_>) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        let factory: FactoryFn = Box::new(move |container: &Container<'_>| {
            let service = factory(container)?;
            Ok(Created {
                instance: Arc::new(service) as Instance,
                disposer: None,
            })
        });

        Self {
            service_id,
            entry: FactoryEntry {
                lifetime,
                disposable: false,
                factory,
            },
        }
    }

    fn with_disposer<T, F>(service_id: ServiceId, lifetime: Lifetime, factory: F) -> Self
    where
        T: Disposable + 'static,
        F: Fn(&Container<'_>) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        let factory: FactoryFn = Box::new(move |container: &Container<'_>| {
            let service = factory(container)?;
            let disposer: Arc<dyn Disposable> = service.clone();
            Ok(Created {
                instance: Arc::new(service) as Instance,
                disposer: Some(disposer),
            })
        });

        Self {
            service_id,
            entry: FactoryEntry {
                lifetime,
                disposable: true,
                factory,
            },
        }
    }
}

/// Immutable mapping from service key to factory entry, shared by a container tree
#[derive(Debug, Default)]
pub struct BindingTable {
    entries: HashMap<ServiceId, FactoryEntry>,
    order: Vec<ServiceId>,
}

impl BindingTable {
    pub fn builder() -> BindingTableBuilder {
        BindingTableBuilder::new()
    }

    /// Build the table from an externally produced binding list.
    ///
    /// Fails with a configuration error on the first key bound twice.
    pub fn from_bindings(bindings: impl IntoIterator<Item = Binding>) -> Result<Self, CoreError> {
        let mut table = Self::default();

        for Binding { service_id, entry } in bindings {
            if table.entries.contains_key(&service_id) {
                return Err(CoreError::configuration(format!(
                    "duplicate binding for {}",
                    service_id
                )));
            }
            table.order.push(service_id.clone());
            table.entries.insert(service_id, entry);
        }

        tracing::debug!(bindings = table.order.len(), "binding table built");
        Ok(table)
    }

    pub fn lookup(&self, service_id: &ServiceId) -> Option<&FactoryEntry> {
        self.entries.get(service_id)
    }

    pub fn contains(&self, service_id: &ServiceId) -> bool {
        self.entries.contains_key(service_id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Keys in registration order
    pub fn service_ids(&self) -> &[ServiceId] {
        &self.order
    }

    /// Entries in registration order
    pub fn iter(&self) -> impl Iterator<Item = (&ServiceId, &FactoryEntry)> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get_key_value(id))
    }
}

/// Enumerates bindings at startup and validates them into a [`BindingTable`]
#[derive(Debug, Default)]
pub struct BindingTableBuilder {
    bindings: Vec<Binding>,
}

impl BindingTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_binding(mut self, binding: Binding) -> Self {
        self.bindings.push(binding);
        self
    }

    pub fn add<T, F>(self, lifetime: Lifetime, factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Container<'_>) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        self.add_binding(Binding::new::<T, F>(lifetime, factory))
    }

    pub fn add_transient<T, F>(self, factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Container<'_>) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        self.add::<T, F>(Lifetime::Transient, factory)
    }

    pub fn add_scoped<T, F>(self, factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Container<'_>) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        self.add::<T, F>(Lifetime::Scoped, factory)
    }

    pub fn add_singleton<T, F>(self, factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Container<'_>) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        self.add::<T, F>(Lifetime::Singleton, factory)
    }

    pub fn add_named<T, F>(self, name: impl Into<String>, lifetime: Lifetime, factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Container<'_>) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        self.add_binding(Binding::named::<T, F>(name, lifetime, factory))
    }

    pub fn add_disposable<T, F>(self, lifetime: Lifetime, factory: F) -> Self
    where
        T: Disposable + 'static,
        F: Fn(&Container<'_>) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        self.add_binding(Binding::disposable::<T, F>(lifetime, factory))
    }

    pub fn add_named_disposable<T, F>(self, name: impl Into<String>, lifetime: Lifetime, factory: F) -> Self
    where
        T: Disposable + 'static,
        F: Fn(&Container<'_>) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        self.add_binding(Binding::named_disposable::<T, F>(name, lifetime, factory))
    }

    pub fn add_token<Tok, F>(self, lifetime: Lifetime, factory: F) -> Self
    where
        Tok: ServiceToken,
        F: Fn(&Container<'_>) -> Result<Arc<Tok::Service>, BoxError> + Send + Sync + 'static,
    {
        self.add_binding(Binding::token::<Tok, F>(lifetime, factory))
    }

    pub fn count(&self) -> usize {
        self.bindings.len()
    }

    pub fn build(self) -> Result<BindingTable, CoreError> {
        BindingTable::from_bindings(self.bindings)
    }
}
