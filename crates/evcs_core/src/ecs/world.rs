//! # ECS World
//!
//! One component registry, one view registry and one entity manager, wired
//! together and sized from a single [`EcsConfig`].

use super::component::{Component, ComponentHandle};
use super::component_registry::{ComponentRegistry, ComponentRegistryBuilder};
use super::entity::EntityHandle;
use super::entity_manager::EntityManager;
use super::types::{ComponentType, ComponentTypeId, ViewTypeId};
use super::view::ViewHandle;
use super::view_registry::{ViewIter, ViewRegistry};
use crate::config::EcsConfig;
use crate::error::{EcsError, EcsResult};

/// Registration phase of a [`World`].
///
/// Every component and view type must be registered before [`build`]
/// allocates the component pools.
///
/// [`build`]: WorldBuilder::build
#[derive(Debug)]
pub struct WorldBuilder {
    config: EcsConfig,
    components: ComponentRegistryBuilder,
    views: ViewRegistry,
}

impl WorldBuilder {
    /// Creates a builder after validating `config`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidConfig`] if validation fails.
    pub fn new(config: EcsConfig) -> EcsResult<Self> {
        config.validate()?;
        Ok(Self {
            components: ComponentRegistryBuilder::new(&config),
            views: ViewRegistry::new(&config),
            config,
        })
    }

    /// Registers a component type with a config-resolved pool size.
    ///
    /// # Errors
    ///
    /// See [`ComponentRegistryBuilder::register_type_with_capacity`].
    pub fn register_component<T: Component>(&mut self, name: &str) -> EcsResult<ComponentType<T>> {
        self.components.register_type(name)
    }

    /// Registers a component type with an explicit pool size.
    ///
    /// # Errors
    ///
    /// See [`ComponentRegistryBuilder::register_type_with_capacity`].
    pub fn register_component_with_capacity<T: Component>(
        &mut self,
        name: &str,
        capacity: usize,
    ) -> EcsResult<ComponentType<T>> {
        self.components.register_type_with_capacity(name, capacity)
    }

    /// Registers a view type over already registered component types.
    ///
    /// # Errors
    ///
    /// - [`EcsError::UnregisteredComponent`] for an unknown component type
    /// - see [`ViewRegistry::register_type`]
    pub fn register_view(&mut self, name: &str, component_types: &[ComponentTypeId]) -> EcsResult<ViewTypeId> {
        if let Some(missing) = component_types
            .iter()
            .find(|id| id.index() >= self.components.type_count())
        {
            return Err(EcsError::UnregisteredComponent(*missing));
        }
        self.views.register_type(name, component_types)
    }

    /// Allocates the component pools and finishes setup.
    ///
    /// # Errors
    ///
    /// Propagates pool allocation failures.
    pub fn build(self) -> EcsResult<World> {
        let components = self.components.allocate_pools()?;
        let entities = EntityManager::new(&self.config, &self.views);
        Ok(World {
            entities,
            components,
            views: self.views,
        })
    }
}

/// The ECS world.
///
/// # Example
///
/// ```rust,ignore
/// let mut builder = WorldBuilder::new(EcsConfig::default())?;
/// let position = builder.register_component::<Position>("Position")?;
/// let velocity = builder.register_component::<Velocity>("Velocity")?;
/// let moving = builder.register_view("Moving", &[position.id(), velocity.id()])?;
/// let world = builder.build()?;
///
/// let ship = world.spawn()?;
/// world.attach(&ship, &position, Position::default())?;
/// world.attach(&ship, &velocity, Velocity { x: 1.0, ..Default::default() })?;
/// world.attach_view(&ship, moving)?;
///
/// for view in world.views_of(moving) {
///     let (Some(p), Some(v)) = (view.component(&position), view.component(&velocity)) else {
///         continue;
///     };
///     let dx = v.get().x;
///     p.lock().x += dx;
/// }
/// ```
#[derive(Debug)]
pub struct World {
    entities: EntityManager,
    components: ComponentRegistry,
    views: ViewRegistry,
}

impl World {
    /// Returns the component registry.
    #[inline]
    #[must_use]
    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    /// Returns the view registry.
    #[inline]
    #[must_use]
    pub fn views(&self) -> &ViewRegistry {
        &self.views
    }

    /// Returns the entity manager.
    #[inline]
    #[must_use]
    pub fn entities(&self) -> &EntityManager {
        &self.entities
    }

    /// Spawns an entity held by the returned handle.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::CapacityExceeded`] if the entity pool is full.
    pub fn spawn(&self) -> EcsResult<EntityHandle> {
        self.entities.create()
    }

    /// Spawns an entity the world keeps alive until released.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::CapacityExceeded`] if the entity pool is full.
    pub fn spawn_owned(&self) -> EcsResult<EntityHandle> {
        self.entities.create_owned()
    }

    /// Creates a component holding `value` and attaches it to `entity`.
    ///
    /// # Errors
    ///
    /// Propagates [`ComponentRegistry::create_with`] and
    /// [`EntityHandle::add_component`] failures.
    pub fn attach<T: Component>(
        &self,
        entity: &EntityHandle,
        component_type: &ComponentType<T>,
        value: T,
    ) -> EcsResult<ComponentHandle<T>> {
        if entity.component_any(component_type.id()).is_some() {
            return Err(EcsError::DuplicateComponent {
                entity: entity.id(),
                component: component_type.id(),
            });
        }
        let component = self.components.create_with(component_type, value)?;
        entity.add_component(component.clone())?;
        Ok(component)
    }

    /// Creates a view of `view_type` and attaches it to `entity`.
    ///
    /// # Errors
    ///
    /// See [`EntityHandle::create_view`].
    pub fn attach_view(&self, entity: &EntityHandle, view_type: ViewTypeId) -> EcsResult<ViewHandle> {
        entity.create_view(view_type)
    }

    /// Iterates over the live views of one type.
    #[must_use]
    pub fn views_of(&self, view_type: ViewTypeId) -> ViewIter {
        self.views.iter_type(view_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::{Pod, Zeroable};

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Position {
        x: f32,
        y: f32,
        z: f32,
    }

    impl Component for Position {}

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Velocity {
        x: f32,
        y: f32,
        z: f32,
    }

    impl Component for Velocity {}

    #[test]
    fn test_invalid_config_rejected() {
        let config = EcsConfig {
            max_entities: 0,
            ..EcsConfig::default()
        };
        assert!(matches!(WorldBuilder::new(config), Err(EcsError::InvalidConfig(_))));
    }

    #[test]
    fn test_view_over_unknown_component_rejected() {
        let mut builder = WorldBuilder::new(EcsConfig::default()).unwrap();
        let position = builder.register_component::<Position>("Position").unwrap();
        let unknown = ComponentTypeId::new(5);
        assert_eq!(
            builder.register_view("Broken", &[position.id(), unknown]).unwrap_err(),
            EcsError::UnregisteredComponent(unknown)
        );
    }

    #[test]
    fn test_movement_system() {
        let mut builder = WorldBuilder::new(EcsConfig::default()).unwrap();
        let position = builder.register_component::<Position>("Position").unwrap();
        let velocity = builder.register_component::<Velocity>("Velocity").unwrap();
        let moving = builder.register_view("Moving", &[position.id(), velocity.id()]).unwrap();
        let world = builder.build().unwrap();

        let mut ships = Vec::new();
        for i in 0..3u8 {
            let ship = world.spawn().unwrap();
            world.attach(&ship, &position, Position::default()).unwrap();
            world
                .attach(&ship, &velocity, Velocity { x: f32::from(i), y: 0.0, z: 0.0 })
                .unwrap();
            world.attach_view(&ship, moving).unwrap();
            ships.push(ship);
        }
        // Has a view but no velocity, so the system skips it.
        let rock = world.spawn().unwrap();
        world.attach(&rock, &position, Position::default()).unwrap();
        world.attach_view(&rock, moving).unwrap();

        let mut updated = 0;
        for view in world.views_of(moving).filter(ViewHandle::has_all_components) {
            let (Some(p), Some(v)) = (view.component(&position), view.component(&velocity)) else {
                continue;
            };
            let mut p = p.lock();
            let v = v.lock();
            p.x += v.x;
            updated += 1;
        }

        assert_eq!(updated, 3);
        let xs: Vec<f32> = ships
            .iter()
            .map(|ship| ship.component(&position).unwrap().get().x)
            .collect();
        assert_eq!(xs, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_attach_duplicate_leaves_pool_untouched() {
        let mut builder = WorldBuilder::new(EcsConfig::default()).unwrap();
        let position = builder.register_component_with_capacity::<Position>("Position", 2).unwrap();
        let world = builder.build().unwrap();

        let entity = world.spawn_owned().unwrap();
        world.attach(&entity, &position, Position::default()).unwrap();
        assert!(matches!(
            world.attach(&entity, &position, Position::default()),
            Err(EcsError::DuplicateComponent { .. })
        ));
        assert_eq!(world.components().stats(position.id()).unwrap().live, 1);
        assert_eq!(world.entities().owned_count(), 1);
    }
}
