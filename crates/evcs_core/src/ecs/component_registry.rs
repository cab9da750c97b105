//! # Component Registry
//!
//! Assigns type ids to component types and owns one fixed pool per type.
//!
//! Setup happens in two phases, enforced by the types:
//!
//! ```text
//! ComponentRegistryBuilder ── register_type::<T>() ×N ──► allocate_pools() ──► ComponentRegistry
//!        (no memory yet)                                  (all pools, once)     (create / get)
//! ```
//!
//! At runtime each pool locks its index bookkeeping only for the duration of
//! `create` and `destroy`. Component data is locked per slot, so a guard on
//! one component never blocks another. Reference counts are atomics outside
//! both locks.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::MappedMutexGuard;

use super::component::{AnyComponent, Component, ComponentGuard, ComponentHandle};
use super::types::{ComponentType, ComponentTypeId, Identifier};
use crate::config::limits::MAX_COMPONENT_ALIGN;
use crate::config::EcsConfig;
use crate::error::{EcsError, EcsResult};
use crate::memory::refcount::{PoolRef, SlotOwner};
use crate::memory::{ObjectPool, PoolStats, SlotCounts, SlotKey};

/// Metadata recorded for a registered component type.
#[derive(Clone, Debug)]
pub struct ComponentTypeInfo {
    name: String,
    size: usize,
    align: usize,
    capacity: usize,
    rust_type: TypeId,
    write_default: fn(&mut [u8]),
}

impl ComponentTypeInfo {
    /// Returns the display name given at registration.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the object size in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Returns the object alignment in bytes.
    #[must_use]
    pub const fn align(&self) -> usize {
        self.align
    }

    /// Returns the pool capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

fn write_default<T: Component>(bytes: &mut [u8]) {
    *bytemuck::from_bytes_mut::<T>(bytes) = T::default();
}

// =============================================================================
// REGISTRATION PHASE
// =============================================================================

/// Collects component types before any pool memory exists.
///
/// # Example
///
/// ```rust,ignore
/// let mut builder = ComponentRegistryBuilder::new(&config);
/// let position = builder.register_type::<Position>("Position")?;
/// let registry = builder.allocate_pools()?;
/// let handle = registry.create(&position)?;
/// ```
#[derive(Debug)]
pub struct ComponentRegistryBuilder {
    config: EcsConfig,
    types: Vec<ComponentTypeInfo>,
    by_rust_type: HashMap<TypeId, ComponentTypeId>,
}

impl ComponentRegistryBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new(config: &EcsConfig) -> Self {
        Self {
            config: config.clone(),
            types: Vec::with_capacity(config.max_component_types),
            by_rust_type: HashMap::with_capacity(config.max_component_types),
        }
    }

    /// Returns the number of registered types.
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Registers `T`, sizing its pool from the config.
    ///
    /// # Errors
    ///
    /// See [`ComponentRegistryBuilder::register_type_with_capacity`].
    pub fn register_type<T: Component>(&mut self, name: &str) -> EcsResult<ComponentType<T>> {
        let capacity = self.config.pool_size_for(name, T::POOL_SIZE);
        self.register_type_with_capacity(name, capacity)
    }

    /// Registers `T` with an explicit pool capacity.
    ///
    /// # Errors
    ///
    /// - [`EcsError::DuplicateRegistration`] if `T` or `name` is taken
    /// - [`EcsError::CapacityExceeded`] past `max_component_types`
    /// - [`EcsError::UnsupportedAlignment`] if `T` is over-aligned
    /// - [`EcsError::InvalidConfig`] for a zero capacity
    pub fn register_type_with_capacity<T: Component>(
        &mut self,
        name: &str,
        capacity: usize,
    ) -> EcsResult<ComponentType<T>> {
        let rust_type = TypeId::of::<T>();
        if self.by_rust_type.contains_key(&rust_type) || self.types.iter().any(|t| t.name == name) {
            return Err(EcsError::DuplicateRegistration { name: name.to_owned() });
        }
        if self.types.len() >= self.config.max_component_types {
            return Err(EcsError::CapacityExceeded {
                resource: "component types",
                capacity: self.config.max_component_types,
            });
        }
        let align = std::mem::align_of::<T>();
        if align > MAX_COMPONENT_ALIGN {
            return Err(EcsError::UnsupportedAlignment {
                name: name.to_owned(),
                align,
                max: MAX_COMPONENT_ALIGN,
            });
        }
        if capacity == 0 {
            return Err(EcsError::InvalidConfig(format!(
                "component pool `{name}` must be greater than zero"
            )));
        }

        // Bounded by max_component_types, which validate() caps at u16::MAX.
        let id = ComponentTypeId::new(self.types.len() as u16);
        let size = std::mem::size_of::<T>();
        self.types.push(ComponentTypeInfo {
            name: name.to_owned(),
            size,
            align,
            capacity,
            rust_type,
            write_default: write_default::<T>,
        });
        self.by_rust_type.insert(rust_type, id);

        tracing::info!(component = name, type_id = %id, size, capacity, "registered component type");
        Ok(ComponentType::new(id))
    }

    /// Allocates every registered pool and finishes setup.
    ///
    /// # Errors
    ///
    /// Propagates pool allocation failures.
    pub fn allocate_pools(self) -> EcsResult<ComponentRegistry> {
        let mut pools = self
            .types
            .iter()
            .map(|info| ObjectPool::new(info.size, info.align, info.capacity))
            .collect::<EcsResult<Vec<_>>>()?;
        let total_bytes: usize = pools.iter().map(ObjectPool::mem_size).sum();
        tracing::info!(
            bytes = total_bytes,
            types = self.types.len(),
            "allocating component pools"
        );

        for pool in &mut pools {
            pool.allocate_memory()?;
        }
        let counts = self.types.iter().map(|info| SlotCounts::new(info.capacity)).collect();

        Ok(ComponentRegistry {
            store: Arc::new(ComponentStore {
                types: self.types.into_boxed_slice(),
                by_rust_type: self.by_rust_type,
                counts,
                pools: pools.into_boxed_slice(),
            }),
        })
    }
}

// =============================================================================
// RUNTIME PHASE
// =============================================================================

/// Shared state behind every component handle.
pub(crate) struct ComponentStore {
    types: Box<[ComponentTypeInfo]>,
    by_rust_type: HashMap<TypeId, ComponentTypeId>,
    counts: Box<[SlotCounts]>,
    pools: Box<[ObjectPool]>,
}

impl ComponentStore {
    pub(crate) fn is_type<T: Component>(&self, type_id: ComponentTypeId) -> bool {
        self.types
            .get(type_id.index())
            .is_some_and(|info| info.rust_type == TypeId::of::<T>())
    }

    pub(crate) fn lock_object<T: Component>(
        &self,
        type_id: ComponentTypeId,
        index: usize,
    ) -> Option<MappedMutexGuard<'_, T>> {
        self.pools.get(type_id.index())?.get::<T>(index)
    }

    pub(crate) fn lock_bytes(&self, type_id: ComponentTypeId, index: usize) -> Option<MappedMutexGuard<'_, [u8]>> {
        self.pools.get(type_id.index())?.at(index)
    }
}

impl SlotOwner for ComponentStore {
    fn counts(&self, class: usize) -> &SlotCounts {
        &self.counts[class]
    }

    fn destroy(&self, class: usize, key: SlotKey) {
        let index = key.index() as usize;
        self.counts[class].retire(index);
        if let Err(error) = self.pools[class].deallocate(index) {
            tracing::error!(type_id = class, id = index, %error, "component slot release failed");
        } else {
            tracing::trace!(type_id = class, id = index, "destroyed component");
        }
    }
}

/// Pool owner for every registered component type.
///
/// Cheap to clone; clones share the same pools.
#[derive(Clone)]
pub struct ComponentRegistry {
    store: Arc<ComponentStore>,
}

impl ComponentRegistry {
    /// Creates a component holding `T::default()`.
    ///
    /// # Errors
    ///
    /// - [`EcsError::UnregisteredComponent`] if the token is foreign
    /// - [`EcsError::CapacityExceeded`] if the type's pool is full
    pub fn create<T: Component>(&self, component_type: &ComponentType<T>) -> EcsResult<ComponentHandle<T>> {
        self.create_with(component_type, T::default())
    }

    /// Creates a component holding `value`.
    ///
    /// # Errors
    ///
    /// Same as [`ComponentRegistry::create`].
    pub fn create_with<T: Component>(
        &self,
        component_type: &ComponentType<T>,
        value: T,
    ) -> EcsResult<ComponentHandle<T>> {
        let type_id = component_type.id();
        if !self.store.is_type::<T>(type_id) {
            return Err(EcsError::UnregisteredComponent(type_id));
        }
        let key = self.allocate(type_id, |pool, index| {
            if let Some(mut slot) = pool.get::<T>(index) {
                *slot = value;
            }
        })?;
        Ok(ComponentHandle::from_checked(self.adopt(type_id, key)))
    }

    /// Creates a default-constructed component by runtime type id.
    ///
    /// # Errors
    ///
    /// - [`EcsError::UnregisteredComponent`] for an unknown id
    /// - [`EcsError::CapacityExceeded`] if the type's pool is full
    pub fn create_any(&self, type_id: ComponentTypeId) -> EcsResult<AnyComponent> {
        let info = self
            .store
            .types
            .get(type_id.index())
            .ok_or(EcsError::UnregisteredComponent(type_id))?;
        let init = info.write_default;
        let key = self.allocate(type_id, |pool, index| {
            if let Some(mut bytes) = pool.at(index) {
                init(&mut bytes);
            }
        })?;
        Ok(self.adopt(type_id, key))
    }

    /// Locks a live component by id.
    ///
    /// The guard keeps the component alive until it drops. Returns `None`
    /// for a foreign token or a free slot.
    #[must_use]
    pub fn get<T: Component>(&self, component_type: &ComponentType<T>, id: Identifier) -> Option<ComponentGuard<'_, T>> {
        if !self.store.is_type::<T>(component_type.id()) {
            return None;
        }
        let owner = self.handle(component_type.id(), id)?;
        let data = self.store.lock_object::<T>(component_type.id(), id as usize)?;
        Some(ComponentGuard::new(data, Some(owner)))
    }

    /// Locks a live component's bytes by runtime type id.
    #[must_use]
    pub fn get_bytes(&self, type_id: ComponentTypeId, id: Identifier) -> Option<ComponentGuard<'_, [u8]>> {
        let owner = self.handle(type_id, id)?;
        let data = self.store.lock_bytes(type_id, id as usize)?;
        Some(ComponentGuard::new(data, Some(owner)))
    }

    /// Returns a new owning handle to a live component.
    #[must_use]
    pub fn handle(&self, type_id: ComponentTypeId, id: Identifier) -> Option<AnyComponent> {
        let counts = self.store.counts.get(type_id.index())?;
        let key = counts.live_key(id as usize)?;
        PoolRef::upgrade(&self.store, type_id.class(), key).map(AnyComponent::from_raw)
    }

    /// Looks up the token for an already registered Rust type.
    #[must_use]
    pub fn type_id_of<T: Component>(&self) -> Option<ComponentType<T>> {
        self.store
            .by_rust_type
            .get(&TypeId::of::<T>())
            .map(|id| ComponentType::new(*id))
    }

    /// Returns registration metadata.
    #[must_use]
    pub fn type_info(&self, type_id: ComponentTypeId) -> Option<&ComponentTypeInfo> {
        self.store.types.get(type_id.index())
    }

    /// Returns the number of registered types.
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.store.types.len()
    }

    /// Returns occupancy counters for one type's pool.
    #[must_use]
    pub fn stats(&self, type_id: ComponentTypeId) -> Option<PoolStats> {
        self.store.pools.get(type_id.index()).map(ObjectPool::stats)
    }

    fn allocate<F>(&self, type_id: ComponentTypeId, init: F) -> EcsResult<SlotKey>
    where
        F: FnOnce(&ObjectPool, usize),
    {
        let pool = self
            .store
            .pools
            .get(type_id.index())
            .ok_or(EcsError::UnregisteredComponent(type_id))?;
        let index = pool.allocate().map_err(|error| match error {
            EcsError::CapacityExceeded { capacity, .. } => EcsError::CapacityExceeded {
                resource: "component pool",
                capacity,
            },
            other => other,
        })?;
        // Counted live only once the value is in place.
        init(pool, index);
        let key = self.store.counts[type_id.index()].activate(index);
        tracing::trace!(type_id = %type_id, id = key.index(), "created component");
        Ok(key)
    }

    fn adopt(&self, type_id: ComponentTypeId, key: SlotKey) -> AnyComponent {
        AnyComponent::from_raw(PoolRef::adopt(Arc::clone(&self.store), type_id.class(), key))
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("types", &self.store.types.iter().map(ComponentTypeInfo::name).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::{Pod, Zeroable};

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Health {
        current: u32,
        max: u32,
    }

    impl Component for Health {}

    #[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Mana(u32);

    impl Default for Mana {
        fn default() -> Self {
            Self(50)
        }
    }

    impl Component for Mana {
        const POOL_SIZE: Option<usize> = Some(3);
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    #[repr(C, align(16))]
    struct Wide([u8; 16]);

    // SAFETY: one byte array, no padding, every bit pattern valid.
    #[allow(unsafe_code)]
    unsafe impl Zeroable for Wide {}
    #[allow(unsafe_code)]
    unsafe impl Pod for Wide {}

    impl Component for Wide {}

    fn registry() -> (ComponentRegistry, ComponentType<Health>, ComponentType<Mana>) {
        let mut builder = ComponentRegistryBuilder::new(&EcsConfig::default());
        let health = builder.register_type_with_capacity::<Health>("Health", 2).unwrap();
        let mana = builder.register_type::<Mana>("Mana").unwrap();
        (builder.allocate_pools().unwrap(), health, mana)
    }

    #[test]
    fn test_type_ids_follow_registration_order() {
        let (registry, health, mana) = registry();
        assert_eq!(health.id().index(), 0);
        assert_eq!(mana.id().index(), 1);
        assert_eq!(registry.type_count(), 2);
        assert_eq!(registry.type_info(mana.id()).unwrap().capacity(), 3);
        assert_eq!(registry.type_id_of::<Health>(), Some(health));
    }

    #[test]
    fn test_duplicate_registration() {
        let mut builder = ComponentRegistryBuilder::new(&EcsConfig::default());
        builder.register_type::<Health>("Health").unwrap();
        assert_eq!(
            builder.register_type::<Health>("Other").unwrap_err(),
            EcsError::DuplicateRegistration { name: "Other".into() }
        );
        assert_eq!(
            builder.register_type::<Mana>("Health").unwrap_err(),
            EcsError::DuplicateRegistration { name: "Health".into() }
        );
    }

    #[test]
    fn test_type_table_full() {
        let config = EcsConfig {
            max_component_types: 1,
            ..EcsConfig::default()
        };
        let mut builder = ComponentRegistryBuilder::new(&config);
        builder.register_type::<Health>("Health").unwrap();
        assert_eq!(
            builder.register_type::<Mana>("Mana").unwrap_err(),
            EcsError::CapacityExceeded { resource: "component types", capacity: 1 }
        );
    }

    #[test]
    fn test_over_aligned_type_rejected() {
        let mut builder = ComponentRegistryBuilder::new(&EcsConfig::default());
        assert!(matches!(
            builder.register_type::<Wide>("Wide"),
            Err(EcsError::UnsupportedAlignment { align: 16, .. })
        ));
    }

    #[test]
    fn test_config_override_wins() {
        let mut config = EcsConfig::default();
        config.component_pool_sizes.insert("Mana".into(), 7);
        let mut builder = ComponentRegistryBuilder::new(&config);
        let mana = builder.register_type::<Mana>("Mana").unwrap();
        let registry = builder.allocate_pools().unwrap();
        assert_eq!(registry.type_info(mana.id()).unwrap().capacity(), 7);
    }

    #[test]
    fn test_create_constructs_default() {
        let (registry, _, mana) = registry();
        let handle = registry.create(&mana).unwrap();
        assert_eq!(handle.get(), Mana(50));
        assert_eq!(*registry.get(&mana, handle.id()).unwrap(), Mana(50));
    }

    #[test]
    fn test_pool_exhaustion_and_reuse() {
        let (registry, health, _) = registry();
        let a = registry.create_with(&health, Health { current: 1, max: 1 }).unwrap();
        let b = registry.create(&health).unwrap();
        assert_eq!(
            registry.create(&health).unwrap_err(),
            EcsError::CapacityExceeded { resource: "component pool", capacity: 2 }
        );

        let freed = a.id();
        drop(a);
        let c = registry.create(&health).unwrap();
        assert_eq!(c.id(), freed);
        // Slot was zero-filled then default-constructed.
        assert_eq!(c.get(), Health::default());
        assert_ne!(b.id(), c.id());
    }

    #[test]
    fn test_get_misses_after_destroy() {
        let (registry, health, _) = registry();
        let handle = registry.create(&health).unwrap();
        let id = handle.id();
        drop(handle);
        assert!(registry.get(&health, id).is_none());
        assert!(registry.handle(health.id(), id).is_none());
    }

    #[test]
    fn test_lock_writes_through() {
        let (registry, health, _) = registry();
        let handle = registry.create(&health).unwrap();
        handle.lock().current = 9;
        assert_eq!(registry.get(&health, handle.id()).unwrap().current, 9);
    }

    #[test]
    fn test_guards_on_different_components_coexist() {
        let (registry, health, mana) = registry();
        let h = registry.create_with(&health, Health { current: 3, max: 9 }).unwrap();
        let m = registry.create(&mana).unwrap();
        let other = registry.create(&health).unwrap();

        let mut h_guard = h.lock();
        let m_guard = m.lock();
        let mut other_guard = other.lock();
        h_guard.current += m_guard.0;
        other_guard.max = h_guard.max;
        drop((h_guard, m_guard, other_guard));

        assert_eq!(h.get(), Health { current: 53, max: 9 });
        assert_eq!(other.get().max, 9);
    }

    #[test]
    fn test_create_and_destroy_while_guard_held() {
        let (registry, health, mana) = registry();
        let held = registry.create(&health).unwrap();
        let spare = registry.create(&mana).unwrap();
        let _guard = held.lock();

        let (tx, rx) = std::sync::mpsc::channel();
        let worker = registry.clone();
        std::thread::spawn(move || {
            let created = worker.create(&health).unwrap();
            drop(spare);
            tx.send((created.get(), worker.stats(mana.id()).unwrap().live)).unwrap();
        });
        assert_eq!(
            rx.recv_timeout(std::time::Duration::from_secs(5)),
            Ok((Health::default(), 0))
        );
    }

    #[test]
    fn test_get_guard_keeps_component_alive() {
        let (registry, health, _) = registry();
        let handle = registry.create_with(&health, Health { current: 4, max: 4 }).unwrap();
        let id = handle.id();

        let guard = registry.get(&health, id).unwrap();
        drop(handle);
        assert_eq!(guard.current, 4);
        assert_eq!(registry.stats(health.id()).unwrap().live, 1);

        drop(guard);
        assert!(registry.get(&health, id).is_none());
        assert_eq!(registry.stats(health.id()).unwrap().live, 0);
    }

    #[test]
    fn test_create_any_and_downcast() {
        let (registry, health, mana) = registry();
        let any = registry.create_any(mana.id()).unwrap();
        assert_eq!(any.bytes().len(), 4);

        let any = any.downcast(&health).unwrap_err();
        let typed = any.downcast(&mana).unwrap();
        assert_eq!(typed.get(), Mana(50));

        assert_eq!(
            registry.create_any(ComponentTypeId::new(9)).unwrap_err(),
            EcsError::UnregisteredComponent(ComponentTypeId::new(9))
        );
    }

    #[test]
    fn test_foreign_token_rejected() {
        let (registry, _, _) = registry();
        let mut other = ComponentRegistryBuilder::new(&EcsConfig::default());
        other.register_type::<Mana>("Mana").unwrap();
        let foreign_health = other.register_type::<Health>("Health").unwrap();
        // Id 1 is `Mana` in `registry`, not `Health`.
        assert_eq!(
            registry.create(&foreign_health).unwrap_err(),
            EcsError::UnregisteredComponent(foreign_health.id())
        );
    }

    #[test]
    fn test_weak_handle_expiry() {
        let (registry, health, _) = registry();
        let handle = registry.create(&health).unwrap();
        let weak = handle.downgrade();
        assert!(weak.upgrade().is_some());
        drop(handle);
        assert!(weak.is_expired());
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_stats() {
        let (registry, health, _) = registry();
        let _a = registry.create(&health).unwrap();
        let stats = registry.stats(health.id()).unwrap();
        assert_eq!(stats.live, 1);
        assert_eq!(stats.capacity, 2);
    }
}
