//! # EVCS Error Types
//!
//! All errors that can occur while configuring pools, registering types, or
//! allocating entities, components and views.
//!
//! Capacity and registration failures are developer-facing misconfiguration
//! (wrong capacity constant for the game content). They are returned so the
//! caller decides whether to propagate or abort. Lookup misses are not errors:
//! they surface as `None`.

use thiserror::Error;

use crate::ecs::{ComponentTypeId, ViewTypeId};

/// Errors that can occur in the entity/view/component core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// A fixed-capacity pool, array, or type table is full.
    #[error("{resource} capacity exceeded: limit is {capacity}")]
    CapacityExceeded {
        /// What ran out of room.
        resource: &'static str,
        /// The fixed capacity that was hit.
        capacity: usize,
    },

    /// The same component type or view name was registered twice.
    #[error("type `{name}` is already registered")]
    DuplicateRegistration {
        /// Name of the offending type.
        name: String,
    },

    /// A component type id does not belong to this registry.
    #[error("component type {0} is not registered")]
    UnregisteredComponent(ComponentTypeId),

    /// A view type id does not belong to this registry.
    #[error("view type {0} is not registered")]
    UnregisteredView(ViewTypeId),

    /// `allocate_memory` was called on a pool that already owns memory.
    #[error("pool memory is already allocated")]
    PoolAlreadyAllocated,

    /// A slot was requested from a pool before its memory was allocated.
    #[error("pool memory has not been allocated")]
    PoolNotAllocated,

    /// A slot was released that is not currently allocated.
    #[error("slot {index} is not allocated")]
    SlotNotAllocated {
        /// The slot index.
        index: usize,
    },

    /// An entity already owns a component of this type.
    #[error("entity {entity} already has a component of type {component}")]
    DuplicateComponent {
        /// The entity id.
        entity: u32,
        /// The component type already present.
        component: ComponentTypeId,
    },

    /// An entity already owns a view of this type.
    #[error("entity {entity} already has a view of type {view}")]
    DuplicateView {
        /// The entity id.
        entity: u32,
        /// The view type already present.
        view: ViewTypeId,
    },

    /// A component type needs stronger alignment than pool memory provides.
    #[error("component type `{name}` requires alignment {align}, pools support at most {max}")]
    UnsupportedAlignment {
        /// Name of the component type.
        name: String,
        /// Alignment the type requires.
        align: usize,
        /// Largest supported alignment.
        max: usize,
    },

    /// A view slot signature is malformed.
    #[error("invalid view signature: {0}")]
    InvalidSignature(String),

    /// Configuration could not be read or failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for EVCS operations.
pub type EcsResult<T> = Result<T, EcsError>;
