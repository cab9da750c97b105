//! # Views
//!
//! A view is a fixed set of component slots, declared per view type, that
//! weakly observe the components of the entity owning the view. Systems walk
//! all views of a type and act on those whose slots are all bound.
//!
//! Slots never keep a component alive: once the entity (or whoever else
//! owned the component) lets it go, the slot reads as unbound again.

use std::fmt;

use super::component::{AnyComponent, Component, ComponentHandle, WeakAnyComponent};
use super::types::{ComponentType, ComponentTypeId, Identifier, ViewTypeId};
use super::view_registry::ViewStore;
use crate::memory::refcount::PoolRef;

/// Owning handle to a pooled view.
#[derive(Clone)]
pub struct ViewHandle {
    raw: PoolRef<ViewStore>,
    view_type: ViewTypeId,
}

impl ViewHandle {
    pub(crate) fn from_raw(raw: PoolRef<ViewStore>, view_type: ViewTypeId) -> Self {
        Self { raw, view_type }
    }

    /// Returns the pool-local id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> Identifier {
        self.raw.key().index()
    }

    /// Returns the view type.
    #[inline]
    #[must_use]
    pub const fn view_type(&self) -> ViewTypeId {
        self.view_type
    }

    /// Returns `true` if every slot is bound to a live component.
    ///
    /// A view with an empty signature is always complete.
    #[must_use]
    pub fn has_all_components(&self) -> bool {
        self.raw
            .owner()
            .with_slots(self.raw.index(), |slots| {
                slots
                    .iter()
                    .all(|slot| slot.component.as_ref().is_some_and(|weak| !weak.is_expired()))
            })
            .unwrap_or(false)
    }

    /// Returns the component bound to the slot of type `T`.
    ///
    /// `None` if the view has no such slot, the slot is unbound, or the
    /// component is gone.
    #[must_use]
    pub fn component<T: Component>(&self, component_type: &ComponentType<T>) -> Option<ComponentHandle<T>> {
        self.component_any(component_type.id())?
            .downcast(component_type)
            .ok()
    }

    /// Returns the component bound to the slot of `component_type`.
    #[must_use]
    pub fn component_any(&self, component_type: ComponentTypeId) -> Option<AnyComponent> {
        self.bound(component_type)?.upgrade()
    }

    /// Returns `true` if `component_id` is the live component bound to the
    /// slot of `component_type`.
    #[must_use]
    pub fn includes_component(&self, component_type: ComponentTypeId, component_id: Identifier) -> bool {
        self.bound(component_type)
            .is_some_and(|weak| weak.id() == component_id && !weak.is_expired())
    }

    /// Returns the slot component types in ascending order.
    #[must_use]
    pub fn slot_types(&self) -> Vec<ComponentTypeId> {
        self.raw
            .owner()
            .with_slots(self.raw.index(), |slots| {
                slots.iter().map(|slot| slot.component_type).collect()
            })
            .unwrap_or_default()
    }

    /// Returns the number of owning handles.
    #[must_use]
    pub fn strong_count(&self) -> u32 {
        self.raw.strong_count()
    }

    /// Returns `true` if both handles refer to the same view.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.raw.ptr_eq(&other.raw)
    }

    /// Binds a newly attached component if the view has a slot for its type.
    pub(crate) fn on_component_added(&self, component: &WeakAnyComponent) -> bool {
        self.raw.owner().bind(self.raw.index(), component)
    }

    fn bound(&self, component_type: ComponentTypeId) -> Option<WeakAnyComponent> {
        self.raw
            .owner()
            .with_slots(self.raw.index(), |slots| {
                let position = slots.search(|slot| component_type.cmp(&slot.component_type))?;
                slots.get(position)?.component.clone()
            })
            .flatten()
    }
}

impl fmt::Debug for ViewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewHandle")
            .field("view_type", &self.view_type)
            .field("id", &self.id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::{Pod, Zeroable};

    use crate::config::EcsConfig;
    use crate::ecs::{ComponentRegistry, ComponentRegistryBuilder, ViewRegistry};

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Position {
        x: f32,
        y: f32,
    }

    impl Component for Position {}

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }

    impl Component for Velocity {}

    struct Fixture {
        components: ComponentRegistry,
        views: ViewRegistry,
        position: ComponentType<Position>,
        velocity: ComponentType<Velocity>,
        moving: ViewTypeId,
    }

    fn fixture() -> Fixture {
        let config = EcsConfig::default();
        let mut builder = ComponentRegistryBuilder::new(&config);
        let position = builder.register_type::<Position>("Position").unwrap();
        let velocity = builder.register_type::<Velocity>("Velocity").unwrap();
        let views = ViewRegistry::new(&config);
        let moving = views
            .register_type("Moving", &[velocity.id(), position.id()])
            .unwrap();
        Fixture {
            components: builder.allocate_pools().unwrap(),
            views,
            position,
            velocity,
            moving,
        }
    }

    #[test]
    fn test_new_view_is_unbound() {
        let f = fixture();
        let view = f.views.create(f.moving).unwrap();
        assert!(!view.has_all_components());
        assert!(view.component(&f.position).is_none());
        assert_eq!(view.slot_types(), vec![f.position.id(), f.velocity.id()]);
    }

    #[test]
    fn test_binding_completes_view() {
        let f = fixture();
        let view = f.views.create(f.moving).unwrap();
        let position = f.components.create_with(&f.position, Position { x: 1.0, y: 2.0 }).unwrap();
        let velocity = f.components.create(&f.velocity).unwrap();

        assert!(view.on_component_added(&position.as_any().downgrade()));
        assert!(!view.has_all_components());
        assert!(view.on_component_added(&velocity.as_any().downgrade()));
        assert!(view.has_all_components());

        let bound = view.component(&f.position).unwrap();
        assert_eq!(bound.get(), Position { x: 1.0, y: 2.0 });
        assert!(view.includes_component(f.position.id(), position.id()));
        assert!(!view.includes_component(f.position.id(), position.id() + 1));
    }

    #[test]
    fn test_slot_does_not_keep_component_alive() {
        let f = fixture();
        let view = f.views.create(f.moving).unwrap();
        let position = f.components.create(&f.position).unwrap();
        let velocity = f.components.create(&f.velocity).unwrap();
        view.on_component_added(&position.as_any().downgrade());
        view.on_component_added(&velocity.as_any().downgrade());

        let id = position.id();
        drop(position);
        assert!(!view.has_all_components());
        assert!(view.component(&f.position).is_none());
        assert!(!view.includes_component(f.position.id(), id));
    }

    #[test]
    fn test_unrelated_component_is_ignored() {
        let f = fixture();
        let views = f.views.clone();
        let only_velocity = views.register_type("Drifting", &[f.velocity.id()]).unwrap();
        let view = views.create(only_velocity).unwrap();
        let position = f.components.create(&f.position).unwrap();
        assert!(!view.on_component_added(&position.as_any().downgrade()));
        assert!(view.component_any(f.position.id()).is_none());
    }

    #[test]
    fn test_empty_signature_is_complete() {
        let f = fixture();
        let marker = f.views.register_type("Marker", &[]).unwrap();
        assert!(f.views.create(marker).unwrap().has_all_components());
    }
}
