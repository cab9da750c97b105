//! # EVCS Core
//!
//! Entity-View-Component storage with a fixed memory footprint:
//! - Every pool is sized once at startup, nothing grows afterwards
//! - Freed slots are reused lowest-index first
//! - Components are plain data, views weakly observe them
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  owns   ┌──────────────────┐
//! │ EntityHandle │────────►│ ComponentHandle  │◄─ ComponentRegistry (per-type pools)
//! │              │────────►│ ViewHandle       │◄─ ViewRegistry (shared pool)
//! └──────────────┘  owns   └────────┬─────────┘
//!        ▲                          │ weak slots
//!  EntityManager                    ▼
//!                              components
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use evcs_core::{EcsConfig, WorldBuilder};
//!
//! let mut builder = WorldBuilder::new(EcsConfig::load("ecs.toml")?)?;
//! let position = builder.register_component::<Position>("Position")?;
//! let moving = builder.register_view("Moving", &[position.id()])?;
//! let world = builder.build()?;
//!
//! let entity = world.spawn_owned()?;
//! world.attach(&entity, &position, Position::default())?;
//! world.attach_view(&entity, moving)?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod collections;
pub mod config;
pub mod ecs;
pub mod error;
pub mod memory;

pub use collections::SortedSlotArray;
pub use config::{limits, EcsConfig};
pub use ecs::{
    AnyComponent, Component, ComponentGuard, ComponentHandle, ComponentRegistry,
    ComponentRegistryBuilder, ComponentType, ComponentTypeId, ComponentTypeInfo, EntityHandle,
    EntityManager, Identifier, ViewHandle, ViewIter, ViewRegistry, ViewTypeId, WeakAnyComponent,
    WeakComponent, WeakEntity, World, WorldBuilder,
};
pub use error::{EcsError, EcsResult};
pub use memory::{FixedSlab, MemoryBlock, ObjectPool, PoolStats, SlotAllocator, SlotKey};
