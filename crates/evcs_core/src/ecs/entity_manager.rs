//! # Entity Manager
//!
//! Root authority for entity lifetime within one run.
//!
//! Entities are either held externally (`create`) or owned by the manager
//! (`create_owned`), in which case they survive without any outside handle
//! until `release`, `EntityHandle::kill` or `release_all`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use super::entity::{EntityHandle, EntityRecord};
use super::types::Identifier;
use super::view_registry::ViewRegistry;
use crate::config::EcsConfig;
use crate::error::{EcsError, EcsResult};
use crate::memory::refcount::{PoolRef, SlotOwner};
use crate::memory::{FixedSlab, PoolStats, SlotCounts, SlotKey};

/// Entities live in a single pool.
const ENTITY_CLASS: u16 = 0;

pub(crate) struct EntityState {
    pool: FixedSlab<EntityRecord>,
    owned: HashMap<Identifier, EntityHandle>,
}

impl EntityState {
    pub(crate) fn record(&self, index: usize) -> Option<&EntityRecord> {
        self.pool.get(index)
    }

    /// Record of an entity the caller holds a handle to.
    pub(crate) fn record_mut(&mut self, index: usize) -> &mut EntityRecord {
        match self.pool.get_mut(index) {
            Some(record) => record,
            None => unreachable!("live entity {index} has no pool slot"),
        }
    }
}

/// Shared state behind every entity handle.
pub(crate) struct EntityStore {
    counts: SlotCounts,
    views: ViewRegistry,
    state: Mutex<EntityState>,
}

impl EntityStore {
    /// Locks the entity pool.
    ///
    /// No handle may be dropped while the guard is alive.
    pub(crate) fn lock(&self) -> MutexGuard<'_, EntityState> {
        self.state.lock()
    }

    pub(crate) fn views(&self) -> &ViewRegistry {
        &self.views
    }

    /// Drops the manager's reference to an owned entity.
    pub(crate) fn release(&self, id: Identifier) -> bool {
        let handle = self.state.lock().owned.remove(&id);
        handle.is_some()
    }
}

impl SlotOwner for EntityStore {
    fn counts(&self, _class: usize) -> &SlotCounts {
        &self.counts
    }

    fn destroy(&self, _class: usize, key: SlotKey) {
        let index = key.index() as usize;
        let record = {
            let mut state = self.state.lock();
            self.counts.retire(index);
            state.pool.remove(index)
        };
        // Components and views are released here, outside the lock.
        drop(record);
        tracing::debug!(id = index, "destroyed entity");
    }
}

/// Creates entities and looks them up by id.
///
/// # Example
///
/// ```rust,ignore
/// let manager = EntityManager::new(&config, &views);
///
/// let player = manager.create_owned()?;
/// let id = player.id();
/// drop(player); // still alive, the manager owns it
///
/// assert!(manager.get(id).is_some());
/// manager.release(id);
/// assert!(manager.get(id).is_none());
/// ```
pub struct EntityManager {
    store: Arc<EntityStore>,
}

impl EntityManager {
    /// Creates a manager with `config.max_entities` slots.
    ///
    /// Views created through [`EntityHandle::create_view`] come from `views`.
    #[must_use]
    pub fn new(config: &EcsConfig, views: &ViewRegistry) -> Self {
        Self {
            store: Arc::new(EntityStore {
                counts: SlotCounts::new(config.max_entities),
                views: views.clone(),
                state: Mutex::new(EntityState {
                    pool: FixedSlab::new(config.max_entities),
                    owned: HashMap::new(),
                }),
            }),
        }
    }

    /// Creates an entity held only by the returned handle.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::CapacityExceeded`] if the entity pool is full.
    pub fn create(&self) -> EcsResult<EntityHandle> {
        let key = {
            let mut state = self.store.state.lock();
            let capacity = state.pool.capacity();
            let index = state
                .pool
                .insert(EntityRecord::default())
                .map_err(|_| EcsError::CapacityExceeded {
                    resource: "entity pool",
                    capacity,
                })?;
            self.store.counts.activate(index)
        };
        tracing::debug!(id = key.index(), "created entity");
        Ok(EntityHandle::from_raw(PoolRef::adopt(
            Arc::clone(&self.store),
            ENTITY_CLASS,
            key,
        )))
    }

    /// Creates an entity that the manager keeps alive until released.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::CapacityExceeded`] if the entity pool is full.
    pub fn create_owned(&self) -> EcsResult<EntityHandle> {
        let entity = self.create()?;
        let previous = self.store.state.lock().owned.insert(entity.id(), entity.clone());
        debug_assert!(previous.is_none(), "entity {} owned twice", entity.id());
        Ok(entity)
    }

    /// Returns a new handle to a live entity.
    #[must_use]
    pub fn get(&self, id: Identifier) -> Option<EntityHandle> {
        let key = self.store.counts.live_key(id as usize)?;
        PoolRef::upgrade(&self.store, ENTITY_CLASS, key).map(EntityHandle::from_raw)
    }

    /// Drops the manager's reference to an owned entity.
    ///
    /// Returns `false` if `id` was not owned by the manager.
    pub fn release(&self, id: Identifier) -> bool {
        self.store.release(id)
    }

    /// Drops every reference the manager holds.
    ///
    /// Returns how many owned entities were released.
    pub fn release_all(&self) -> usize {
        let owned = std::mem::take(&mut self.store.state.lock().owned);
        let released = owned.len();
        drop(owned);
        if released > 0 {
            tracing::debug!(released, "released owned entities");
        }
        released
    }

    /// Returns the number of live entities.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.store.state.lock().pool.len()
    }

    /// Returns the number of entities the manager keeps alive.
    #[must_use]
    pub fn owned_count(&self) -> usize {
        self.store.state.lock().owned.len()
    }

    /// Returns the entity pool capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.store.state.lock().pool.capacity()
    }

    /// Returns occupancy counters for the entity pool.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.store.state.lock();
        PoolStats {
            capacity: state.pool.capacity(),
            live: state.pool.len(),
            high_water: state.pool.high_water(),
        }
    }
}

impl Drop for EntityManager {
    fn drop(&mut self) {
        self.release_all();
        let live = self.live_count();
        if live > 0 {
            tracing::warn!(live, "entity manager dropped while entities are still alive");
        }
    }
}

impl std::fmt::Debug for EntityManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.store.state.lock();
        f.debug_struct("EntityManager")
            .field("live", &state.pool.len())
            .field("owned", &state.owned.len())
            .field("capacity", &state.pool.capacity())
            .finish()
    }
}
