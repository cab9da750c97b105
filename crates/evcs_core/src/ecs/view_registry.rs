//! # View Registry
//!
//! Owns every view object and keeps a `(view type, id)`-sorted record list
//! so that all views of one type occupy a contiguous range:
//!
//! ```text
//! records:  [ (0,2) (0,5) | (1,0) (1,1) (1,4) | (3,3) ]
//!             type 0       type 1              type 3
//! type 1:   first = 2, count = 3
//! ```
//!
//! All views share one slab sized by `max_views`. Each view type declares a
//! fixed signature of component types; a new view starts with every slot
//! unbound.

use std::cmp::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;

use super::component::WeakAnyComponent;
use super::types::{ComponentTypeId, Identifier, ViewTypeId};
use super::view::ViewHandle;
use crate::collections::SortedSlotArray;
use crate::config::limits::{MAX_VIEWS, MAX_VIEW_SLOTS};
use crate::config::EcsConfig;
use crate::error::{EcsError, EcsResult};
use crate::memory::refcount::{PoolRef, SlotOwner};
use crate::memory::{FixedSlab, PoolStats, SlotCounts, SlotKey};

/// Views live in a single pool.
const VIEW_CLASS: u16 = 0;

/// One component slot of a view.
///
/// Ordered by component type only.
#[derive(Clone, Debug)]
pub(crate) struct ViewSlot {
    pub(crate) component_type: ComponentTypeId,
    pub(crate) component: Option<WeakAnyComponent>,
}

impl PartialEq for ViewSlot {
    fn eq(&self, other: &Self) -> bool {
        self.component_type == other.component_type
    }
}

impl Eq for ViewSlot {}

impl PartialOrd for ViewSlot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ViewSlot {
    fn cmp(&self, other: &Self) -> Ordering {
        self.component_type.cmp(&other.component_type)
    }
}

pub(crate) type ViewSlots = SortedSlotArray<ViewSlot, MAX_VIEW_SLOTS>;

#[derive(Debug)]
struct ViewObject {
    view_type: ViewTypeId,
    slots: ViewSlots,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct ViewRecord {
    view_type: ViewTypeId,
    id: Identifier,
    generation: u32,
}

impl ViewRecord {
    const fn key(self) -> SlotKey {
        SlotKey::new(self.id, self.generation)
    }
}

#[derive(Debug)]
struct ViewTypeMeta {
    name: String,
    signature: Vec<ComponentTypeId>,
    first: usize,
    count: usize,
}

struct ViewState {
    types: Vec<ViewTypeMeta>,
    pool: FixedSlab<ViewObject>,
    records: SortedSlotArray<ViewRecord, MAX_VIEWS>,
}

impl ViewState {
    /// Shifts the per-type ranges after `records` gained an entry at `index`.
    fn note_inserted(&mut self, view_type: ViewTypeId, index: usize) {
        let meta = &mut self.types[view_type.index()];
        if meta.count == 0 {
            meta.first = index;
        }
        meta.count += 1;
        for later in self.types.iter_mut().skip(view_type.index() + 1) {
            if later.count > 0 {
                later.first += 1;
            }
        }
    }

    /// Shifts the per-type ranges after `records` lost an entry.
    fn note_removed(&mut self, view_type: ViewTypeId) {
        self.types[view_type.index()].count -= 1;
        for later in self.types.iter_mut().skip(view_type.index() + 1) {
            if later.count > 0 {
                later.first -= 1;
            }
        }
    }

    /// First record of `view_type` whose id is at least `from`.
    fn next_record(&self, view_type: ViewTypeId, from: Identifier) -> Option<ViewRecord> {
        let meta = self.types.get(view_type.index())?;
        let (mut low, mut high) = (meta.first, meta.first + meta.count);
        while low < high {
            let middle = low + (high - low) / 2;
            if self.records[middle].id < from {
                low = middle + 1;
            } else {
                high = middle;
            }
        }
        (low < meta.first + meta.count).then(|| self.records[low])
    }
}

/// Shared state behind every view handle.
pub(crate) struct ViewStore {
    counts: SlotCounts,
    max_view_types: usize,
    state: Mutex<ViewState>,
}

impl ViewStore {
    pub(crate) fn view_type_of(&self, index: usize) -> Option<ViewTypeId> {
        self.state.lock().pool.get(index).map(|view| view.view_type)
    }

    pub(crate) fn with_slots<R>(&self, index: usize, f: impl FnOnce(&ViewSlots) -> R) -> Option<R> {
        self.state.lock().pool.get(index).map(|view| f(&view.slots))
    }

    /// Binds `component` to the matching slot of a view.
    ///
    /// Returns `false` if the view has no slot of that type.
    pub(crate) fn bind(&self, index: usize, component: &WeakAnyComponent) -> bool {
        let component_type = component.type_id();
        let mut state = self.state.lock();
        let Some(view) = state.pool.get_mut(index) else {
            return false;
        };
        let Some(position) = view
            .slots
            .search(|slot| component_type.cmp(&slot.component_type))
        else {
            return false;
        };
        if let Some(slot) = view.slots.get_mut(position) {
            slot.component = Some(component.clone());
        }
        true
    }

    pub(crate) fn signature(&self, view_type: ViewTypeId) -> Vec<ComponentTypeId> {
        self.state
            .lock()
            .types
            .get(view_type.index())
            .map(|meta| meta.signature.clone())
            .unwrap_or_default()
    }
}

impl SlotOwner for ViewStore {
    fn counts(&self, _class: usize) -> &SlotCounts {
        &self.counts
    }

    fn destroy(&self, _class: usize, key: SlotKey) {
        let index = key.index() as usize;
        let removed = {
            let mut state = self.state.lock();
            self.counts.retire(index);
            let removed = state.pool.remove(index);
            if let Some(view) = &removed {
                let record = ViewRecord {
                    view_type: view.view_type,
                    id: key.index(),
                    generation: key.generation(),
                };
                if let Some(position) = state.records.search(|entry| record.cmp(entry)) {
                    state.records.remove(position);
                    state.note_removed(view.view_type);
                }
            }
            removed
        };
        match removed {
            Some(view) => tracing::trace!(view_type = %view.view_type, id = index, "destroyed view"),
            None => tracing::error!(id = index, "released view was not in the pool"),
        }
    }
}

/// Registry of view types and owner of every live view.
///
/// Cheap to clone; clones share the same pool.
///
/// # Example
///
/// ```rust,ignore
/// let views = ViewRegistry::new(&config);
/// let moving = views.register_type("Moving", &[position.id(), velocity.id()])?;
///
/// let view = views.create(moving)?;
/// entity.add_view(view)?;
///
/// for view in views.iter_type(moving) {
///     if view.has_all_components() {
///         // ...
///     }
/// }
/// ```
#[derive(Clone)]
pub struct ViewRegistry {
    store: Arc<ViewStore>,
}

impl ViewRegistry {
    /// Creates an empty registry sized from `config`.
    ///
    /// The view pool never exceeds [`MAX_VIEWS`].
    #[must_use]
    pub fn new(config: &EcsConfig) -> Self {
        let capacity = config.max_views.min(MAX_VIEWS);
        Self {
            store: Arc::new(ViewStore {
                counts: SlotCounts::new(capacity),
                max_view_types: config.max_view_types,
                state: Mutex::new(ViewState {
                    types: Vec::with_capacity(config.max_view_types),
                    pool: FixedSlab::new(capacity),
                    records: SortedSlotArray::new(),
                }),
            }),
        }
    }

    /// Registers a view type over a set of component types.
    ///
    /// Slot order follows component type ids, not the order given here.
    ///
    /// # Errors
    ///
    /// - [`EcsError::InvalidSignature`] for repeated component types or more
    ///   than [`MAX_VIEW_SLOTS`] slots
    /// - [`EcsError::DuplicateRegistration`] if `name` is taken
    /// - [`EcsError::CapacityExceeded`] past `max_view_types`
    pub fn register_type(&self, name: &str, component_types: &[ComponentTypeId]) -> EcsResult<ViewTypeId> {
        if component_types.len() > MAX_VIEW_SLOTS {
            return Err(EcsError::InvalidSignature(format!(
                "view `{name}` declares {} slots, at most {MAX_VIEW_SLOTS} are supported",
                component_types.len()
            )));
        }
        let mut signature = component_types.to_vec();
        signature.sort_unstable();
        if let Some(pair) = signature.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(EcsError::InvalidSignature(format!(
                "view `{name}` declares component type {} twice",
                pair[0]
            )));
        }

        let mut state = self.store.state.lock();
        if state.types.iter().any(|meta| meta.name == name) {
            return Err(EcsError::DuplicateRegistration { name: name.to_owned() });
        }
        if state.types.len() >= self.store.max_view_types {
            return Err(EcsError::CapacityExceeded {
                resource: "view types",
                capacity: self.store.max_view_types,
            });
        }

        // Bounded by max_view_types, which validate() caps at u16::MAX.
        let id = ViewTypeId::new(state.types.len() as u16);
        tracing::info!(view = name, view_type = %id, slots = signature.len(), "registered view type");
        state.types.push(ViewTypeMeta {
            name: name.to_owned(),
            signature,
            first: 0,
            count: 0,
        });
        Ok(id)
    }

    /// Creates a view with every slot unbound.
    ///
    /// # Errors
    ///
    /// - [`EcsError::UnregisteredView`] for an unknown type
    /// - [`EcsError::CapacityExceeded`] if the view pool is full
    pub fn create(&self, view_type: ViewTypeId) -> EcsResult<ViewHandle> {
        let key = {
            let mut state = self.store.state.lock();
            let meta = state
                .types
                .get(view_type.index())
                .ok_or(EcsError::UnregisteredView(view_type))?;

            let mut slots = ViewSlots::new();
            for component_type in &meta.signature {
                slots.insert(ViewSlot {
                    component_type: *component_type,
                    component: None,
                })?;
            }

            let capacity = state.pool.capacity();
            let index = state
                .pool
                .insert(ViewObject { view_type, slots })
                .map_err(|_| EcsError::CapacityExceeded {
                    resource: "view pool",
                    capacity,
                })?;
            let key = self.store.counts.activate(index);
            let record = ViewRecord {
                view_type,
                id: key.index(),
                generation: key.generation(),
            };
            match state.records.insert(record) {
                Ok(position) => state.note_inserted(view_type, position),
                Err(error) => {
                    self.store.counts.release(index);
                    self.store.counts.retire(index);
                    state.pool.remove(index);
                    return Err(error);
                }
            }
            key
        };
        tracing::trace!(view_type = %view_type, id = key.index(), "created view");
        Ok(self.adopt(view_type, key))
    }

    /// Returns a new handle to a live view.
    #[must_use]
    pub fn get(&self, id: Identifier) -> Option<ViewHandle> {
        let key = self.store.counts.live_key(id as usize)?;
        let raw = PoolRef::upgrade(&self.store, VIEW_CLASS, key)?;
        let view_type = self.store.view_type_of(raw.index())?;
        Some(ViewHandle::from_raw(raw, view_type))
    }

    /// Iterates over live views of one type in ascending id order.
    ///
    /// The iterator takes the registry lock once per step, so views created
    /// or destroyed mid-iteration may or may not be visited.
    #[must_use]
    pub fn iter_type(&self, view_type: ViewTypeId) -> ViewIter {
        ViewIter {
            store: Arc::clone(&self.store),
            view_type,
            next_id: Some(0),
        }
    }

    /// Returns the number of live views of one type.
    #[must_use]
    pub fn count_of(&self, view_type: ViewTypeId) -> usize {
        self.store
            .state
            .lock()
            .types
            .get(view_type.index())
            .map_or(0, |meta| meta.count)
    }

    /// Returns the name a view type was registered with.
    #[must_use]
    pub fn type_name(&self, view_type: ViewTypeId) -> Option<String> {
        self.store
            .state
            .lock()
            .types
            .get(view_type.index())
            .map(|meta| meta.name.clone())
    }

    /// Returns the sorted component signature of a view type.
    #[must_use]
    pub fn signature(&self, view_type: ViewTypeId) -> Vec<ComponentTypeId> {
        self.store.signature(view_type)
    }

    /// Returns the number of registered view types.
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.store.state.lock().types.len()
    }

    /// Returns occupancy counters for the shared view pool.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.store.state.lock();
        PoolStats {
            capacity: state.pool.capacity(),
            live: state.pool.len(),
            high_water: state.pool.high_water(),
        }
    }

    fn adopt(&self, view_type: ViewTypeId, key: SlotKey) -> ViewHandle {
        ViewHandle::from_raw(PoolRef::adopt(Arc::clone(&self.store), VIEW_CLASS, key), view_type)
    }
}

impl std::fmt::Debug for ViewRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.store.state.lock();
        f.debug_struct("ViewRegistry")
            .field("types", &state.types.iter().map(|meta| meta.name.as_str()).collect::<Vec<_>>())
            .field("live", &state.pool.len())
            .finish()
    }
}

/// Lazy iterator over the live views of one type.
///
/// Returned by [`ViewRegistry::iter_type`].
pub struct ViewIter {
    store: Arc<ViewStore>,
    view_type: ViewTypeId,
    next_id: Option<Identifier>,
}

impl Iterator for ViewIter {
    type Item = ViewHandle;

    fn next(&mut self) -> Option<ViewHandle> {
        loop {
            let from = self.next_id?;
            let record = self.store.state.lock().next_record(self.view_type, from);
            let Some(record) = record else {
                self.next_id = None;
                return None;
            };
            self.next_id = record.id.checked_add(1);
            // A view whose last handle is being dropped right now is skipped.
            if let Some(raw) = PoolRef::upgrade(&self.store, VIEW_CLASS, record.key()) {
                return Some(ViewHandle::from_raw(raw, self.view_type));
            }
        }
    }
}

impl std::fmt::Debug for ViewIter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewIter")
            .field("view_type", &self.view_type)
            .field("next_id", &self.next_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(index: u16) -> ComponentTypeId {
        ComponentTypeId::new(index)
    }

    fn registry() -> ViewRegistry {
        ViewRegistry::new(&EcsConfig::default())
    }

    fn ids(views: impl Iterator<Item = ViewHandle>) -> Vec<Identifier> {
        views.map(|view| view.id()).collect()
    }

    #[test]
    fn test_register_sorts_signature() {
        let views = registry();
        let moving = views.register_type("Moving", &[component(3), component(1)]).unwrap();
        assert_eq!(views.signature(moving), vec![component(1), component(3)]);
        assert_eq!(views.type_name(moving).as_deref(), Some("Moving"));
        assert_eq!(views.type_count(), 1);
    }

    #[test]
    fn test_register_rejects_bad_signatures() {
        let views = registry();
        assert!(matches!(
            views.register_type("Twice", &[component(1), component(1)]),
            Err(EcsError::InvalidSignature(_))
        ));
        let wide: Vec<_> = (0..=MAX_VIEW_SLOTS as u16).map(component).collect();
        assert!(matches!(
            views.register_type("Wide", &wide),
            Err(EcsError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_register_duplicate_name() {
        let views = registry();
        views.register_type("Moving", &[component(0)]).unwrap();
        assert_eq!(
            views.register_type("Moving", &[component(1)]).unwrap_err(),
            EcsError::DuplicateRegistration { name: "Moving".into() }
        );
    }

    #[test]
    fn test_view_type_table_full() {
        let config = EcsConfig {
            max_view_types: 1,
            ..EcsConfig::default()
        };
        let views = ViewRegistry::new(&config);
        views.register_type("A", &[]).unwrap();
        assert_eq!(
            views.register_type("B", &[]).unwrap_err(),
            EcsError::CapacityExceeded { resource: "view types", capacity: 1 }
        );
    }

    #[test]
    fn test_create_unregistered() {
        let views = registry();
        let missing = ViewTypeId::new(4);
        assert_eq!(views.create(missing).unwrap_err(), EcsError::UnregisteredView(missing));
    }

    #[test]
    fn test_pool_full_and_reuse() {
        let config = EcsConfig {
            max_views: 2,
            ..EcsConfig::default()
        };
        let views = ViewRegistry::new(&config);
        let ty = views.register_type("Empty", &[]).unwrap();
        let a = views.create(ty).unwrap();
        let _b = views.create(ty).unwrap();
        assert_eq!(
            views.create(ty).unwrap_err(),
            EcsError::CapacityExceeded { resource: "view pool", capacity: 2 }
        );

        let freed = a.id();
        drop(a);
        assert!(views.get(freed).is_none());
        assert_eq!(views.create(ty).unwrap().id(), freed);
    }

    #[test]
    fn test_iteration_ranges_per_type() {
        let views = registry();
        let a = views.register_type("A", &[component(0)]).unwrap();
        let b = views.register_type("B", &[component(1)]).unwrap();
        let c = views.register_type("C", &[component(2)]).unwrap();

        // Interleave creation so the ranges must shift.
        let b0 = views.create(b).unwrap();
        let c0 = views.create(c).unwrap();
        let a0 = views.create(a).unwrap();
        let b1 = views.create(b).unwrap();
        let a1 = views.create(a).unwrap();

        assert_eq!(ids(views.iter_type(a)), vec![a0.id(), a1.id()]);
        assert_eq!(ids(views.iter_type(b)), vec![b0.id(), b1.id()]);
        assert_eq!(ids(views.iter_type(c)), vec![c0.id()]);
        assert_eq!(views.count_of(b), 2);

        drop(b0);
        drop(a0);
        assert_eq!(ids(views.iter_type(a)), vec![a1.id()]);
        assert_eq!(ids(views.iter_type(b)), vec![b1.id()]);
        assert_eq!(ids(views.iter_type(c)), vec![c0.id()]);

        drop(c0);
        assert_eq!(views.iter_type(c).count(), 0);
        assert_eq!(views.count_of(c), 0);
    }

    #[test]
    fn test_iteration_is_restartable() {
        let views = registry();
        let ty = views.register_type("A", &[]).unwrap();
        let _held: Vec<_> = (0..3).map(|_| views.create(ty).unwrap()).collect();

        let iter = views.iter_type(ty);
        assert_eq!(iter.count(), 3);
        assert_eq!(views.iter_type(ty).count(), 3);
    }

    #[test]
    fn test_get_returns_view_type() {
        let views = registry();
        let _a = views.register_type("A", &[]).unwrap();
        let b = views.register_type("B", &[]).unwrap();
        let view = views.create(b).unwrap();
        let found = views.get(view.id()).unwrap();
        assert_eq!(found.view_type(), b);
        assert!(found.ptr_eq(&view));
    }

    #[test]
    fn test_stats() {
        let views = registry();
        let ty = views.register_type("A", &[]).unwrap();
        let a = views.create(ty).unwrap();
        let _b = views.create(ty).unwrap();
        drop(a);
        let stats = views.stats();
        assert_eq!(stats.live, 1);
        assert_eq!(stats.high_water, 2);
    }
}
