//! Service registration and resolution.
//!
//! A small container: services are registered by type with a
//! lifetime and a factory, and may declare the services they depend on so the
//! provider can check the graph up front when `validate_on_build` is set.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{Error, Result};
use crate::host::HostedService;

type Instance = Arc<dyn Any + Send + Sync>;
type Factory = Arc<dyn Fn(&Resolver<'_>) -> Result<Instance> + Send + Sync>;
type HostedFactory = Box<dyn Fn(&ServiceProvider) -> Result<Arc<dyn HostedService>> + Send + Sync>;

/// How long a resolved instance lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceLifetime {
    /// One instance for the whole provider.
    Singleton,
    /// One instance per scope.
    Scoped,
    /// A new instance per resolution.
    Transient,
}

impl std::fmt::Display for ServiceLifetime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Singleton => "singleton",
            Self::Scoped => "scoped",
            Self::Transient => "transient",
        };
        write!(f, "{}", name)
    }
}

/// Checks applied by the service provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceProviderOptions {
    /// Reject scoped services resolved from the root provider or captured by
    /// singletons.
    pub validate_scopes: bool,
    /// Check every declared dependency when the provider is built.
    pub validate_on_build: bool,
}

impl ServiceProviderOptions {
    /// Create options with both checks disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set scope validation.
    pub fn with_validate_scopes(mut self, validate: bool) -> Self {
        self.validate_scopes = validate;
        self
    }

    /// Set build-time validation.
    pub fn with_validate_on_build(mut self, validate: bool) -> Self {
        self.validate_on_build = validate;
        self
    }
}

/// A single service registration.
#[derive(Clone)]
pub struct ServiceDescriptor {
    type_id: TypeId,
    type_name: &'static str,
    lifetime: ServiceLifetime,
    dependencies: Vec<(TypeId, &'static str)>,
    factory: Factory,
}

impl ServiceDescriptor {
    fn with_factory<T, F>(lifetime: ServiceLifetime, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            lifetime,
            dependencies: Vec::new(),
            factory: Arc::new(move |resolver| {
                let value = factory(resolver)?;
                Ok(Arc::new(value) as Instance)
            }),
        }
    }

    /// Singleton built on first use.
    pub fn singleton<T, F>(factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<T> + Send + Sync + 'static,
    {
        Self::with_factory(ServiceLifetime::Singleton, factory)
    }

    /// Scoped service.
    pub fn scoped<T, F>(factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<T> + Send + Sync + 'static,
    {
        Self::with_factory(ServiceLifetime::Scoped, factory)
    }

    /// Transient service.
    pub fn transient<T, F>(factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<T> + Send + Sync + 'static,
    {
        Self::with_factory(ServiceLifetime::Transient, factory)
    }

    /// Singleton wrapping an existing value.
    pub fn instance<T: Send + Sync + 'static>(value: T) -> Self {
        let instance: Instance = Arc::new(value);
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            lifetime: ServiceLifetime::Singleton,
            dependencies: Vec::new(),
            factory: Arc::new(move |_| Ok(instance.clone())),
        }
    }

    /// Declare that the factory resolves `D`.
    pub fn depends_on<D: 'static>(mut self) -> Self {
        self.dependencies.push((TypeId::of::<D>(), type_name::<D>()));
        self
    }

    /// Service type name.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Service lifetime.
    pub fn lifetime(&self) -> ServiceLifetime {
        self.lifetime
    }
}

impl std::fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("type", &self.type_name)
            .field("lifetime", &self.lifetime)
            .field(
                "dependencies",
                &self.dependencies.iter().map(|(_, n)| *n).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Registrations collected while configuring a host.
#[derive(Default)]
pub struct ServiceCollection {
    descriptors: Vec<ServiceDescriptor>,
    hosted: Vec<HostedFactory>,
}

impl ServiceCollection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descriptor. A later registration for the same type replaces the
    /// earlier one at resolution time.
    pub fn add(&mut self, descriptor: ServiceDescriptor) -> &mut Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Add a singleton built on first use.
    pub fn add_singleton<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<T> + Send + Sync + 'static,
    {
        self.add(ServiceDescriptor::singleton(factory))
    }

    /// Add an existing value as a singleton.
    pub fn add_instance<T: Send + Sync + 'static>(&mut self, value: T) -> &mut Self {
        self.add(ServiceDescriptor::instance(value))
    }

    /// Add a scoped service.
    pub fn add_scoped<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<T> + Send + Sync + 'static,
    {
        self.add(ServiceDescriptor::scoped(factory))
    }

    /// Add a transient service.
    pub fn add_transient<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<T> + Send + Sync + 'static,
    {
        self.add(ServiceDescriptor::transient(factory))
    }

    /// Add a hosted service, started and stopped together with the host.
    pub fn add_hosted_service<F>(&mut self, factory: F) -> &mut Self
    where
        F: Fn(&ServiceProvider) -> Result<Arc<dyn HostedService>> + Send + Sync + 'static,
    {
        self.hosted.push(Box::new(factory));
        self
    }

    /// Check whether `T` is registered.
    pub fn contains<T: 'static>(&self) -> bool {
        let id = TypeId::of::<T>();
        self.descriptors.iter().any(|d| d.type_id == id)
    }

    /// Number of service registrations, hosted services excluded.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Check if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty() && self.hosted.is_empty()
    }

    pub(crate) fn take_hosted(&mut self) -> Vec<HostedFactory> {
        std::mem::take(&mut self.hosted)
    }

    /// Build a provider, running the checks enabled in `options`.
    pub fn build(self, options: ServiceProviderOptions) -> Result<ServiceProvider> {
        let mut descriptors: HashMap<TypeId, ServiceDescriptor> = HashMap::new();
        for descriptor in self.descriptors {
            descriptors.insert(descriptor.type_id, descriptor);
        }

        if options.validate_on_build || options.validate_scopes {
            validate(&descriptors, options)?;
        }

        Ok(ServiceProvider {
            inner: Arc::new(ProviderInner {
                descriptors,
                singletons: DashMap::new(),
                root_scoped: DashMap::new(),
                options,
            }),
        })
    }
}

impl std::fmt::Debug for ServiceCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceCollection")
            .field("descriptors", &self.descriptors)
            .field("hosted", &self.hosted.len())
            .finish()
    }
}

fn validate(
    descriptors: &HashMap<TypeId, ServiceDescriptor>,
    options: ServiceProviderOptions,
) -> Result<()> {
    for descriptor in descriptors.values() {
        for (dep_id, dep_name) in &descriptor.dependencies {
            let Some(dependency) = descriptors.get(dep_id) else {
                if options.validate_on_build {
                    return Err(Error::MissingDependency {
                        service: descriptor.type_name,
                        dependency: *dep_name,
                    });
                }
                continue;
            };

            if options.validate_scopes
                && descriptor.lifetime == ServiceLifetime::Singleton
                && dependency.lifetime == ServiceLifetime::Scoped
            {
                return Err(Error::ScopeViolation {
                    service: dependency.type_name,
                    context: format!("singleton {}", descriptor.type_name),
                });
            }
        }
    }
    Ok(())
}

struct ProviderInner {
    descriptors: HashMap<TypeId, ServiceDescriptor>,
    singletons: DashMap<TypeId, Instance>,
    // Scoped services resolved from the root when scope validation is off.
    root_scoped: DashMap<TypeId, Instance>,
    options: ServiceProviderOptions,
}

/// Resolves registered services.
#[derive(Clone)]
pub struct ServiceProvider {
    inner: Arc<ProviderInner>,
}

impl ServiceProvider {
    /// Options the provider was built with.
    pub fn options(&self) -> ServiceProviderOptions {
        self.inner.options
    }

    /// Resolve a required service from the root.
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.resolver().get()
    }

    /// Resolve an optional service from the root.
    pub fn try_get<T: Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>> {
        self.resolver().try_get()
    }

    /// Check whether `T` is registered.
    pub fn contains<T: 'static>(&self) -> bool {
        self.inner.descriptors.contains_key(&TypeId::of::<T>())
    }

    /// Open a new scope.
    pub fn create_scope(&self) -> ServiceScope {
        ServiceScope {
            provider: self.clone(),
            instances: DashMap::new(),
        }
    }

    fn resolver(&self) -> Resolver<'_> {
        Resolver {
            provider: self,
            scope: None,
        }
    }

    fn resolve(&self, type_id: TypeId, scope: Option<&ServiceScope>) -> Result<Option<Instance>> {
        let Some(descriptor) = self.inner.descriptors.get(&type_id) else {
            return Ok(None);
        };

        let instance = match descriptor.lifetime {
            ServiceLifetime::Singleton => {
                if let Some(existing) = cached(&self.inner.singletons, type_id) {
                    return Ok(Some(existing));
                }
                let built = (descriptor.factory)(&Resolver {
                    provider: self,
                    scope: None,
                })?;
                store(&self.inner.singletons, type_id, built)
            }
            ServiceLifetime::Scoped => {
                let cache = match scope {
                    Some(scope) => &scope.instances,
                    None if self.inner.options.validate_scopes => {
                        return Err(Error::ScopeViolation {
                            service: descriptor.type_name,
                            context: "the root provider".to_string(),
                        });
                    }
                    None => &self.inner.root_scoped,
                };
                if let Some(existing) = cached(cache, type_id) {
                    return Ok(Some(existing));
                }
                let built = (descriptor.factory)(&Resolver {
                    provider: self,
                    scope,
                })?;
                store(cache, type_id, built)
            }
            ServiceLifetime::Transient => (descriptor.factory)(&Resolver {
                provider: self,
                scope,
            })?,
        };

        Ok(Some(instance))
    }
}

impl std::fmt::Debug for ServiceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceProvider")
            .field("services", &self.inner.descriptors.len())
            .field("options", &self.inner.options)
            .finish()
    }
}

// The map guard must not be held while a factory runs: factories resolve
// other services, which may hash to the same shard.
fn cached(map: &DashMap<TypeId, Instance>, type_id: TypeId) -> Option<Instance> {
    map.get(&type_id).map(|entry| entry.value().clone())
}

fn store(map: &DashMap<TypeId, Instance>, type_id: TypeId, built: Instance) -> Instance {
    map.entry(type_id).or_insert(built).value().clone()
}

/// A resolution scope. Scoped services are cached per scope.
pub struct ServiceScope {
    provider: ServiceProvider,
    instances: DashMap<TypeId, Instance>,
}

impl ServiceScope {
    /// Resolve a required service in this scope.
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.resolver().get()
    }

    /// Resolve an optional service in this scope.
    pub fn try_get<T: Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>> {
        self.resolver().try_get()
    }

    fn resolver(&self) -> Resolver<'_> {
        Resolver {
            provider: &self.provider,
            scope: Some(self),
        }
    }
}

impl std::fmt::Debug for ServiceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceScope")
            .field("instances", &self.instances.len())
            .finish()
    }
}

/// Handed to factories to resolve their dependencies.
pub struct Resolver<'a> {
    provider: &'a ServiceProvider,
    scope: Option<&'a ServiceScope>,
}

impl Resolver<'_> {
    /// Resolve a required service.
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.try_get()?
            .ok_or(Error::ServiceNotFound(type_name::<T>()))
    }

    /// Resolve an optional service.
    pub fn try_get<T: Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>> {
        match self.provider.resolve(TypeId::of::<T>(), self.scope)? {
            None => Ok(None),
            Some(instance) => instance
                .downcast::<T>()
                .map(Some)
                .map_err(|_| Error::ServiceConstruction {
                    service: type_name::<T>(),
                    message: "registered instance has a different type".to_string(),
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Pool {
        size: usize,
    }

    struct Repository {
        pool: Arc<Pool>,
    }

    struct RequestContext {
        id: usize,
    }

    struct Cache {
        _ctx: Arc<RequestContext>,
    }

    fn request_context_factory() -> impl Fn(&Resolver<'_>) -> Result<RequestContext> {
        let next = Arc::new(AtomicUsize::new(0));
        move |_| {
            Ok(RequestContext {
                id: next.fetch_add(1, Ordering::Relaxed),
            })
        }
    }

    #[test]
    fn test_singleton_is_shared() {
        let mut services = ServiceCollection::new();
        services.add_singleton(|_| Ok(Pool { size: 4 }));
        services.add_transient(|r| Ok(Repository { pool: r.get::<Pool>()? }));

        let provider = services.build(ServiceProviderOptions::default()).unwrap();
        let a = provider.get::<Repository>().unwrap();
        let b = provider.get::<Repository>().unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a.pool, &b.pool));
        assert_eq!(a.pool.size, 4);
    }

    #[test]
    fn test_scoped_per_scope() {
        let mut services = ServiceCollection::new();
        services.add_scoped(request_context_factory());

        let provider = services.build(ServiceProviderOptions::default()).unwrap();
        let first = provider.create_scope();
        let second = provider.create_scope();

        let a1 = first.get::<RequestContext>().unwrap();
        let a2 = first.get::<RequestContext>().unwrap();
        let b = second.get::<RequestContext>().unwrap();

        assert!(Arc::ptr_eq(&a1, &a2));
        assert_ne!(a1.id, b.id);
    }

    #[test]
    fn test_scoped_from_root_allowed_without_validation() {
        let mut services = ServiceCollection::new();
        services.add_scoped(request_context_factory());

        let provider = services.build(ServiceProviderOptions::default()).unwrap();
        let a = provider.get::<RequestContext>().unwrap();
        let b = provider.get::<RequestContext>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_scoped_from_root_rejected_with_validation() {
        let mut services = ServiceCollection::new();
        services.add_scoped(request_context_factory());

        let provider = services
            .build(ServiceProviderOptions::new().with_validate_scopes(true))
            .unwrap();

        assert!(matches!(
            provider.get::<RequestContext>(),
            Err(Error::ScopeViolation { .. })
        ));
        assert!(provider.create_scope().get::<RequestContext>().is_ok());
    }

    #[test]
    fn test_singleton_capturing_scoped_rejected_at_resolution() {
        let mut services = ServiceCollection::new();
        services.add_scoped(request_context_factory());
        services.add_singleton(|r| Ok(Cache { _ctx: r.get::<RequestContext>()? }));

        let provider = services
            .build(ServiceProviderOptions::new().with_validate_scopes(true))
            .unwrap();

        let scope = provider.create_scope();
        assert!(matches!(
            scope.get::<Cache>(),
            Err(Error::ScopeViolation { .. })
        ));
    }

    #[test]
    fn test_validate_on_build_missing_dependency() {
        let build = |options| {
            let mut services = ServiceCollection::new();
            services.add(
                ServiceDescriptor::transient(|r| Ok(Repository { pool: r.get::<Pool>()? }))
                    .depends_on::<Pool>(),
            );
            services.build(options)
        };

        assert!(build(ServiceProviderOptions::default()).is_ok());
        assert!(matches!(
            build(ServiceProviderOptions::new().with_validate_on_build(true)),
            Err(Error::MissingDependency { .. })
        ));
    }

    #[test]
    fn test_validate_on_build_singleton_scoped_dependency() {
        let build = |options| {
            let mut services = ServiceCollection::new();
            services.add_scoped(request_context_factory());
            services.add(
                ServiceDescriptor::singleton(|r| Ok(Cache { _ctx: r.get::<RequestContext>()? }))
                    .depends_on::<RequestContext>(),
            );
            services.build(options)
        };

        assert!(build(ServiceProviderOptions::new().with_validate_on_build(true)).is_ok());
        assert!(matches!(
            build(
                ServiceProviderOptions::new()
                    .with_validate_on_build(true)
                    .with_validate_scopes(true)
            ),
            Err(Error::ScopeViolation { .. })
        ));

        // Scope validation alone checks declared lifetimes but not presence.
        assert!(matches!(
            build(ServiceProviderOptions::new().with_validate_scopes(true)),
            Err(Error::ScopeViolation { .. })
        ));
    }

    #[test]
    fn test_scope_validation_ignores_missing_dependency() {
        let mut services = ServiceCollection::new();
        services.add(
            ServiceDescriptor::transient(|r| Ok(Repository { pool: r.get::<Pool>()? }))
                .depends_on::<Pool>(),
        );

        assert!(services
            .build(ServiceProviderOptions::new().with_validate_scopes(true))
            .is_ok());
    }

    #[test]
    fn test_missing_service() {
        let provider = ServiceCollection::new()
            .build(ServiceProviderOptions::default())
            .unwrap();

        assert!(provider.try_get::<Pool>().unwrap().is_none());
        assert!(matches!(
            provider.get::<Pool>(),
            Err(Error::ServiceNotFound(_))
        ));
    }

    #[test]
    fn test_last_registration_wins() {
        let mut services = ServiceCollection::new();
        services.add_instance(Pool { size: 1 });
        services.add_instance(Pool { size: 2 });

        let provider = services.build(ServiceProviderOptions::default()).unwrap();
        assert_eq!(provider.get::<Pool>().unwrap().size, 2);
    }
}
