//! # Entity / View / Component
//!
//! - Components are plain data in fixed per-type pools.
//! - Entities own components and views.
//! - Views weakly observe an entity's components and drive systems.
//!
//! Every object lives in a fixed-capacity pool and is reached through a
//! reference-counted handle. The last handle to drop returns the slot.
//!
//! ## Locking
//!
//! Each pool has one mutex around its index bookkeeping, held only inside
//! create and destroy. Component data is locked per slot. Reference counts
//! are atomics outside the mutexes, and no handle is ever dropped while a
//! registry lock is held.

mod component;
mod component_registry;
mod entity;
mod entity_manager;
mod types;
mod view;
mod view_registry;
mod world;

pub use component::{
    AnyComponent, Component, ComponentGuard, ComponentHandle, WeakAnyComponent, WeakComponent,
};
pub use component_registry::{ComponentRegistry, ComponentRegistryBuilder, ComponentTypeInfo};
pub use entity::{EntityHandle, WeakEntity};
pub use entity_manager::EntityManager;
pub use types::{ComponentType, ComponentTypeId, Identifier, ViewTypeId};
pub use view::ViewHandle;
pub use view_registry::{ViewIter, ViewRegistry};
pub use world::{World, WorldBuilder};
