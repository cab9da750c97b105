//! # Entities
//!
//! An entity is a pool slot holding two small sorted tables:
//!
//! - components, at most one per component type
//! - views, at most one per view type
//!
//! The entity owns both. Adding a component binds it into every view the
//! entity already has; adding a view back-fills it from every component the
//! entity already has, so the order of attachment does not matter.

use std::cmp::Ordering;
use std::fmt;

use super::component::{AnyComponent, Component, ComponentHandle, WeakAnyComponent};
use super::entity_manager::EntityStore;
use super::types::{ComponentType, ComponentTypeId, Identifier, ViewTypeId};
use super::view::ViewHandle;
use crate::collections::SortedSlotArray;
use crate::config::limits::{MAX_COMPONENTS_PER_ENTITY, MAX_VIEWS_PER_ENTITY};
use crate::error::{EcsError, EcsResult};
use crate::memory::refcount::{PoolRef, WeakPoolRef};

#[derive(Clone, Debug)]
struct ComponentEntry {
    component_type: ComponentTypeId,
    handle: AnyComponent,
}

impl PartialEq for ComponentEntry {
    fn eq(&self, other: &Self) -> bool {
        self.component_type == other.component_type
    }
}

impl Eq for ComponentEntry {}

impl PartialOrd for ComponentEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ComponentEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.component_type.cmp(&other.component_type)
    }
}

#[derive(Clone, Debug)]
struct ViewEntry {
    view_type: ViewTypeId,
    handle: ViewHandle,
}

impl PartialEq for ViewEntry {
    fn eq(&self, other: &Self) -> bool {
        self.view_type == other.view_type
    }
}

impl Eq for ViewEntry {}

impl PartialOrd for ViewEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ViewEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.view_type.cmp(&other.view_type)
    }
}

/// What one entity slot holds.
#[derive(Debug, Default)]
pub(crate) struct EntityRecord {
    components: SortedSlotArray<ComponentEntry, MAX_COMPONENTS_PER_ENTITY>,
    views: SortedSlotArray<ViewEntry, MAX_VIEWS_PER_ENTITY>,
}

impl EntityRecord {
    fn find_component(&self, component_type: ComponentTypeId) -> Option<&ComponentEntry> {
        let index = self
            .components
            .search(|entry| component_type.cmp(&entry.component_type))?;
        self.components.get(index)
    }

    fn find_view(&self, view_type: ViewTypeId) -> Option<&ViewEntry> {
        let index = self.views.search(|entry| view_type.cmp(&entry.view_type))?;
        self.views.get(index)
    }
}

/// Owning handle to a pooled entity.
///
/// The entity, and every component and view it owns, is destroyed when the
/// last handle drops. Handles held by the manager for owned entities count.
///
/// # Example
///
/// ```rust,ignore
/// let entity = manager.create()?;
/// entity.add_component(components.create(&position)?)?;
/// entity.add_view(views.create(moving)?)?;
///
/// let position = entity.component(&position).unwrap();
/// ```
#[derive(Clone)]
pub struct EntityHandle {
    raw: PoolRef<EntityStore>,
}

impl EntityHandle {
    pub(crate) fn from_raw(raw: PoolRef<EntityStore>) -> Self {
        Self { raw }
    }

    /// Returns the pool-local id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> Identifier {
        self.raw.key().index()
    }

    /// Attaches a component and binds it into the entity's views.
    ///
    /// # Errors
    ///
    /// - [`EcsError::DuplicateComponent`] if a component of that type is
    ///   already attached
    /// - [`EcsError::CapacityExceeded`] past
    ///   [`MAX_COMPONENTS_PER_ENTITY`]
    pub fn add_component<T: Component>(&self, component: ComponentHandle<T>) -> EcsResult<()> {
        self.add_component_any(component.into_any())
    }

    /// Type-erased [`EntityHandle::add_component`].
    ///
    /// # Errors
    ///
    /// Same as [`EntityHandle::add_component`].
    pub fn add_component_any(&self, component: AnyComponent) -> EcsResult<()> {
        let component_type = component.type_id();
        let weak = component.downgrade();
        let views: Vec<ViewHandle> = {
            let mut state = self.raw.owner().lock();
            let record = state.record_mut(self.raw.index());
            if record.find_component(component_type).is_some() {
                return Err(EcsError::DuplicateComponent {
                    entity: self.id(),
                    component: component_type,
                });
            }
            if record.components.is_full() {
                return Err(EcsError::CapacityExceeded {
                    resource: "entity components",
                    capacity: MAX_COMPONENTS_PER_ENTITY,
                });
            }
            record.components.insert(ComponentEntry {
                component_type,
                handle: component,
            })?;
            record.views.iter().map(|entry| entry.handle.clone()).collect()
        };

        for view in &views {
            view.on_component_added(&weak);
        }
        Ok(())
    }

    /// Returns the attached component of type `T`.
    #[must_use]
    pub fn component<T: Component>(&self, component_type: &ComponentType<T>) -> Option<ComponentHandle<T>> {
        self.component_any(component_type.id())?
            .downcast(component_type)
            .ok()
    }

    /// Returns the attached component of `component_type`.
    #[must_use]
    pub fn component_any(&self, component_type: ComponentTypeId) -> Option<AnyComponent> {
        let state = self.raw.owner().lock();
        state
            .record(self.raw.index())?
            .find_component(component_type)
            .map(|entry| entry.handle.clone())
    }

    /// Attaches a view and back-fills it from the entity's components.
    ///
    /// # Errors
    ///
    /// - [`EcsError::DuplicateView`] if a view of that type is already
    ///   attached
    /// - [`EcsError::CapacityExceeded`] past [`MAX_VIEWS_PER_ENTITY`]
    pub fn add_view(&self, view: ViewHandle) -> EcsResult<()> {
        let view_type = view.view_type();
        let bound_view = view.clone();
        let components: Vec<WeakAnyComponent> = {
            let mut state = self.raw.owner().lock();
            let record = state.record_mut(self.raw.index());
            if record.find_view(view_type).is_some() {
                return Err(EcsError::DuplicateView {
                    entity: self.id(),
                    view: view_type,
                });
            }
            if record.views.is_full() {
                return Err(EcsError::CapacityExceeded {
                    resource: "entity views",
                    capacity: MAX_VIEWS_PER_ENTITY,
                });
            }
            record.views.insert(ViewEntry { view_type, handle: view })?;
            record
                .components
                .iter()
                .map(|entry| entry.handle.downgrade())
                .collect()
        };

        for component in &components {
            bound_view.on_component_added(component);
        }
        Ok(())
    }

    /// Creates a view of `view_type` and attaches it.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::ViewRegistry::create`] and
    /// [`EntityHandle::add_view`] failures.
    pub fn create_view(&self, view_type: ViewTypeId) -> EcsResult<ViewHandle> {
        if self.view(view_type).is_some() {
            return Err(EcsError::DuplicateView {
                entity: self.id(),
                view: view_type,
            });
        }
        let view = self.raw.owner().views().create(view_type)?;
        self.add_view(view.clone())?;
        Ok(view)
    }

    /// Returns the attached view of `view_type`.
    #[must_use]
    pub fn view(&self, view_type: ViewTypeId) -> Option<ViewHandle> {
        let state = self.raw.owner().lock();
        state
            .record(self.raw.index())?
            .find_view(view_type)
            .map(|entry| entry.handle.clone())
    }

    /// Returns the attached component types in ascending order.
    #[must_use]
    pub fn component_types(&self) -> Vec<ComponentTypeId> {
        let state = self.raw.owner().lock();
        state.record(self.raw.index()).map_or_else(Vec::new, |record| {
            record.components.iter().map(|entry| entry.component_type).collect()
        })
    }

    /// Returns the number of attached components.
    #[must_use]
    pub fn component_count(&self) -> usize {
        let state = self.raw.owner().lock();
        state.record(self.raw.index()).map_or(0, |record| record.components.len())
    }

    /// Returns the number of attached views.
    #[must_use]
    pub fn view_count(&self) -> usize {
        let state = self.raw.owner().lock();
        state.record(self.raw.index()).map_or(0, |record| record.views.len())
    }

    /// Drops the manager's reference to an owned entity.
    ///
    /// The entity dies once no other handle is left. Returns `false` if the
    /// manager did not own it.
    pub fn kill(&self) -> bool {
        self.raw.owner().release(self.id())
    }

    /// Returns the number of owning handles.
    #[must_use]
    pub fn strong_count(&self) -> u32 {
        self.raw.strong_count()
    }

    /// Creates a non-owning handle.
    #[must_use]
    pub fn downgrade(&self) -> WeakEntity {
        WeakEntity {
            raw: self.raw.downgrade(),
        }
    }

    /// Returns `true` if both handles refer to the same entity.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.raw.ptr_eq(&other.raw)
    }
}

impl fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityHandle").field("id", &self.id()).finish()
    }
}

/// Non-owning entity reference.
#[derive(Clone)]
pub struct WeakEntity {
    raw: WeakPoolRef<EntityStore>,
}

impl WeakEntity {
    /// Returns the id the entity had.
    #[must_use]
    pub fn id(&self) -> Identifier {
        self.raw.key().index()
    }

    /// Returns an owning handle if the entity is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<EntityHandle> {
        self.raw.upgrade().map(EntityHandle::from_raw)
    }

    /// Returns `true` once the entity has been destroyed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.raw.is_expired()
    }
}

impl fmt::Debug for WeakEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakEntity")
            .field("id", &self.id())
            .field("expired", &self.is_expired())
            .finish()
    }
}
