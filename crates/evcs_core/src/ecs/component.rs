//! # Component Handles
//!
//! Components are pure data containers with no behavior. They live in
//! per-type byte pools owned by the [`ComponentRegistry`] and are reached
//! through reference-counted handles:
//!
//! - [`ComponentHandle<T>`]: owning, typed
//! - [`AnyComponent`]: owning, type-erased (entity tables, runtime creation)
//! - [`WeakComponent<T>`] / [`WeakAnyComponent`]: non-owning, detect expiry
//!
//! When the last owning handle drops, the slot is zero-filled and returned
//! to the pool.
//!
//! [`ComponentRegistry`]: super::ComponentRegistry

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use bytemuck::{Pod, Zeroable};
use parking_lot::MappedMutexGuard;

use super::component_registry::ComponentStore;
use super::types::{ComponentType, ComponentTypeId, Identifier};
use crate::memory::refcount::{PoolRef, WeakPoolRef};

/// Marker trait for pooled components.
///
/// Components must be:
/// - `Pod`: plain old data, stored as bytes in a shared pool
/// - `Zeroable`: a zero-filled slot is a valid value
/// - `Default`: the value `create` constructs in place
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Copy, Default, Pod, Zeroable)]
/// #[repr(C)]
/// struct Position {
///     x: f32,
///     y: f32,
///     z: f32,
/// }
///
/// impl Component for Position {
///     const POOL_SIZE: Option<usize> = Some(4096);
/// }
/// ```
pub trait Component: Pod + Zeroable + Default + Send + Sync + 'static {
    /// Preferred pool capacity.
    ///
    /// A per-name entry in [`crate::EcsConfig::component_pool_sizes`]
    /// overrides it; `None` falls back to the config default.
    const POOL_SIZE: Option<usize> = None;
}

/// Exclusive access to one component's data.
///
/// Locks only this component's slot. Guards on other components, creation
/// and destruction proceed while it is alive. Locking the same component
/// twice on one thread deadlocks.
pub struct ComponentGuard<'a, T: ?Sized> {
    data: MappedMutexGuard<'a, T>,
    // Dropped after `data`, so a last release never waits on this guard.
    _owner: Option<AnyComponent>,
}

impl<'a, T: ?Sized> ComponentGuard<'a, T> {
    pub(crate) fn new(data: MappedMutexGuard<'a, T>, owner: Option<AnyComponent>) -> Self {
        Self { data, _owner: owner }
    }
}

impl<T: ?Sized> Deref for ComponentGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}

impl<T: ?Sized> DerefMut for ComponentGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.data
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for ComponentGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.data, f)
    }
}

/// Owning, type-erased handle to a pooled component.
pub struct AnyComponent {
    raw: PoolRef<ComponentStore>,
}

impl AnyComponent {
    pub(crate) fn from_raw(raw: PoolRef<ComponentStore>) -> Self {
        Self { raw }
    }

    /// Returns the pool-local id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> Identifier {
        self.raw.key().index()
    }

    /// Returns the component type id.
    #[inline]
    #[must_use]
    pub fn type_id(&self) -> ComponentTypeId {
        ComponentTypeId::new(self.raw.class())
    }

    /// Returns the number of owning handles.
    #[must_use]
    pub fn strong_count(&self) -> u32 {
        self.raw.strong_count()
    }

    /// Creates a non-owning handle.
    #[must_use]
    pub fn downgrade(&self) -> WeakAnyComponent {
        WeakAnyComponent {
            raw: self.raw.downgrade(),
        }
    }

    /// Converts to a typed handle if `component_type` matches.
    ///
    /// # Errors
    ///
    /// Returns the handle unchanged on a type mismatch.
    pub fn downcast<T: Component>(self, component_type: &ComponentType<T>) -> Result<ComponentHandle<T>, Self> {
        if self.type_id() == component_type.id() && self.raw.owner().is_type::<T>(self.type_id()) {
            Ok(ComponentHandle {
                raw: self,
                _marker: PhantomData,
            })
        } else {
            Err(self)
        }
    }

    /// Locks the component's raw bytes.
    #[must_use]
    pub fn bytes(&self) -> ComponentGuard<'_, [u8]> {
        match self.raw.owner().lock_bytes(self.type_id(), self.raw.index()) {
            Some(data) => ComponentGuard::new(data, None),
            None => unreachable!("live component {} has no pool slot", self.id()),
        }
    }

    /// Returns `true` if both handles refer to the same component.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.raw.ptr_eq(&other.raw)
    }
}

impl Clone for AnyComponent {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
        }
    }
}

impl fmt::Debug for AnyComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyComponent")
            .field("type_id", &self.type_id())
            .field("id", &self.id())
            .finish()
    }
}

/// Owning, typed handle to a pooled component.
///
/// # Example
///
/// ```rust,ignore
/// let position = registry.create(&position_type)?;
/// position.lock().x += 1.0;
/// let copy: Position = position.get();
/// ```
pub struct ComponentHandle<T> {
    raw: AnyComponent,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Component> ComponentHandle<T> {
    /// Wraps a handle the caller has already type-checked.
    pub(crate) fn from_checked(raw: AnyComponent) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// Returns the pool-local id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> Identifier {
        self.raw.id()
    }

    /// Returns the component type id.
    #[inline]
    #[must_use]
    pub fn type_id(&self) -> ComponentTypeId {
        self.raw.type_id()
    }

    /// Locks the component for reading and writing.
    ///
    /// Waits only while another guard on this same component is alive.
    #[must_use]
    pub fn lock(&self) -> ComponentGuard<'_, T> {
        match self.raw.raw.owner().lock_object::<T>(self.type_id(), self.raw.raw.index()) {
            Some(data) => ComponentGuard::new(data, None),
            None => unreachable!("live component {} has no pool slot", self.id()),
        }
    }

    /// Copies the current value out.
    #[must_use]
    pub fn get(&self) -> T {
        *self.lock()
    }

    /// Overwrites the current value.
    pub fn set(&self, value: T) {
        *self.lock() = value;
    }

    /// Returns the number of owning handles.
    #[must_use]
    pub fn strong_count(&self) -> u32 {
        self.raw.strong_count()
    }

    /// Creates a non-owning handle.
    #[must_use]
    pub fn downgrade(&self) -> WeakComponent<T> {
        WeakComponent {
            raw: self.raw.downgrade(),
            _marker: PhantomData,
        }
    }

    /// Borrows the type-erased handle.
    #[inline]
    #[must_use]
    pub fn as_any(&self) -> &AnyComponent {
        &self.raw
    }

    /// Drops the type information.
    #[inline]
    #[must_use]
    pub fn into_any(self) -> AnyComponent {
        self.raw
    }
}

impl<T> Clone for ComponentHandle<T> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for ComponentHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentHandle")
            .field("type", &std::any::type_name::<T>())
            .field("type_id", &self.raw.type_id())
            .field("id", &self.raw.id())
            .finish()
    }
}

/// Non-owning, type-erased component reference.
pub struct WeakAnyComponent {
    raw: WeakPoolRef<ComponentStore>,
}

impl WeakAnyComponent {
    /// Returns the component type id.
    #[inline]
    #[must_use]
    pub fn type_id(&self) -> ComponentTypeId {
        ComponentTypeId::new(self.raw.class())
    }

    /// Returns the pool-local id the component had.
    #[inline]
    #[must_use]
    pub fn id(&self) -> Identifier {
        self.raw.key().index()
    }

    /// Returns an owning handle if the component is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<AnyComponent> {
        self.raw.upgrade().map(AnyComponent::from_raw)
    }

    /// Returns `true` once the component has been destroyed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.raw.is_expired()
    }
}

impl Clone for WeakAnyComponent {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
        }
    }
}

impl fmt::Debug for WeakAnyComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakAnyComponent")
            .field("type_id", &self.type_id())
            .field("id", &self.id())
            .field("expired", &self.is_expired())
            .finish()
    }
}

/// Non-owning, typed component reference.
pub struct WeakComponent<T> {
    raw: WeakAnyComponent,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Component> WeakComponent<T> {
    /// Returns an owning handle if the component is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<ComponentHandle<T>> {
        self.raw.upgrade().map(|raw| ComponentHandle {
            raw,
            _marker: PhantomData,
        })
    }

    /// Returns `true` once the component has been destroyed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.raw.is_expired()
    }

    /// Borrows the type-erased weak handle.
    #[inline]
    #[must_use]
    pub fn as_any(&self) -> &WeakAnyComponent {
        &self.raw
    }
}

impl<T> Clone for WeakComponent<T> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            _marker: PhantomData,
        }
    }
}
