// ============================================================================
// observable-collections - ObservableConcurrentMap
// A concurrent map that announces structural changes and forwards the
// change notifications of the values it stores
// ============================================================================

use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;

use crate::core::types::{
    ChangeNotify, CollectionChange, FieldChange, ItemChanged, SharedMerge, SubscriptionId,
};
use crate::notify::ObserverList;

/// Observer of structural map changes.
pub type MapObserver<V> = dyn Fn(&CollectionChange<Arc<V>>) + Send + Sync;

/// Observer of field changes on stored values.
pub type ItemObserver<K, V> = dyn Fn(&ItemChanged<K, V>) + Send + Sync;

// =============================================================================
// INTERNALS
// =============================================================================

struct MapEvents<K, V> {
    structural: ObserverList<MapObserver<V>>,
    items: ObserverList<ItemObserver<K, V>>,
}

/// Shared between a stored entry and the router attached to its value.
#[derive(Default)]
struct LinkState {
    detached: AtomicBool,
    /// Threads running `add_or_merge` on the value. Their own change
    /// notifications are reported as a Replace, not as item changes.
    merging: Mutex<Vec<ThreadId>>,
}

impl LinkState {
    fn forwards(&self) -> bool {
        if self.detached.load(Ordering::Acquire) {
            return false;
        }
        let current = thread::current().id();
        !self.merging.lock().contains(&current)
    }

    fn begin_merge(self: &Arc<Self>) -> MergeGuard {
        let thread = thread::current().id();
        self.merging.lock().push(thread);
        MergeGuard {
            state: Arc::clone(self),
            thread,
        }
    }
}

/// Mutes the merging thread on one value until dropped.
struct MergeGuard {
    state: Arc<LinkState>,
    thread: ThreadId,
}

impl Drop for MergeGuard {
    fn drop(&mut self) {
        let mut merging = self.state.merging.lock();
        if let Some(index) = merging.iter().position(|id| *id == self.thread) {
            merging.swap_remove(index);
        }
    }
}

/// A stored value plus the subscription routing its changes to the map.
///
/// Dropping a slot detaches the subscription, so every path that takes a
/// value out of the map (remove, replace, clear, dropping the map) tears the
/// subscription down with it.
struct Slot<V: ChangeNotify> {
    value: Arc<V>,
    id: SubscriptionId,
    state: Arc<LinkState>,
}

impl<V: ChangeNotify> Slot<V> {
    fn detach(&self) {
        if self.state.detached.swap(true, Ordering::AcqRel) {
            return;
        }
        self.value.off_change(self.id);
    }
}

impl<V: ChangeNotify> Drop for Slot<V> {
    fn drop(&mut self) {
        self.detach();
    }
}

// =============================================================================
// OBSERVABLE CONCURRENT MAP
// =============================================================================

/// A thread-safe key/value store over [`ChangeNotify`] values.
///
/// Two event streams:
/// 1. Structural: every successful mutation emits exactly one
///    [`CollectionChange`] (`Add`, `Replace`, `Remove`, or `Reset` for
///    [`clear`](Self::clear)), after the mutation is visible to readers.
/// 2. Item: a stored value announcing a field change is forwarded as an
///    [`ItemChanged`], without any structural event.
///
/// Every present key has exactly one change subscription on its value; a
/// value loses its subscription in the same step that removes or replaces
/// it. Dropping the map detaches all of them.
///
/// Events are delivered after the map's internal shard lock is released, so
/// observers may call back into the map. Factories passed to
/// [`add_or_update`](Self::add_or_update) and [`get_or_add`](Self::get_or_add)
/// run while the key's shard is locked: they must not touch the same map.
///
/// # Example
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use observable_collections::{CollectionChange, ObservableConcurrentMap, Tracked};
///
/// let sessions: ObservableConcurrentMap<u32, Tracked<String>> = ObservableConcurrentMap::new();
///
/// let log = Arc::new(Mutex::new(Vec::new()));
/// let sink = log.clone();
/// sessions.subscribe(move |change: &CollectionChange<Arc<Tracked<String>>>| {
///     sink.lock().unwrap().push(change.action());
/// });
///
/// assert!(sessions.try_add(1, Tracked::new("alice".to_string())));
/// assert!(!sessions.try_add(1, Tracked::new("again".to_string())));
/// assert_eq!(sessions.get(&1).unwrap().get(), "alice");
///
/// let removed = sessions.try_remove(&1).unwrap();
/// assert_eq!(removed.get(), "alice");
///
/// assert_eq!(*log.lock().unwrap(), vec!["add", "remove"]);
/// ```
pub struct ObservableConcurrentMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: ChangeNotify,
{
    entries: DashMap<K, Slot<V>>,
    events: Arc<MapEvents<K, V>>,
}

impl<K, V> ObservableConcurrentMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: ChangeNotify,
{
    /// Create a new empty map.
    pub fn new() -> Self {
        Self::from_dashmap(DashMap::new())
    }

    /// Create a map with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::from_dashmap(DashMap::with_capacity(capacity))
    }

    /// Create a map with an explicit number of lock shards.
    ///
    /// # Panics
    ///
    /// Panics if `shard_amount` is not a power of two greater than one.
    pub fn with_capacity_and_shard_amount(capacity: usize, shard_amount: usize) -> Self {
        Self::from_dashmap(DashMap::with_capacity_and_shard_amount(capacity, shard_amount))
    }

    /// Create a map from initial entries, subscribing to every value.
    ///
    /// No events are emitted. On duplicate keys the last value wins.
    pub fn from_entries<I, A>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, A)>,
        A: Into<Arc<V>>,
    {
        let map = Self::new();
        for (key, value) in entries {
            let slot = map.attach(&key, value.into());
            map.entries.insert(key, slot);
        }
        map
    }

    fn from_dashmap(entries: DashMap<K, Slot<V>>) -> Self {
        Self {
            entries,
            events: Arc::new(MapEvents {
                structural: ObserverList::new(),
                items: ObserverList::new(),
            }),
        }
    }

    /// Subscribe the map's router to `value` and wrap both in a slot.
    fn attach(&self, key: &K, value: Arc<V>) -> Slot<V> {
        let state = Arc::new(LinkState::default());

        let router = {
            let events: Weak<MapEvents<K, V>> = Arc::downgrade(&self.events);
            let target: Weak<V> = Arc::downgrade(&value);
            let state = Arc::clone(&state);
            let key = key.clone();
            move |change: &FieldChange| {
                if !state.forwards() {
                    tracing::trace!("ignoring change from a detached or merging value");
                    return;
                }
                let (Some(events), Some(value)) = (events.upgrade(), target.upgrade()) else {
                    return;
                };
                let event = ItemChanged {
                    key: key.clone(),
                    value,
                    field: change.field,
                };
                events.items.emit(|observer| observer(&event));
            }
        };

        let id = value.on_change(Arc::new(router));
        Slot { value, id, state }
    }

    fn emit(&self, change: CollectionChange<Arc<V>>) {
        tracing::trace!(action = change.action(), len = self.entries.len(), "map changed");
        self.events.structural.emit(|observer| observer(&change));
    }

    // =========================================================================
    // SUBSCRIPTIONS
    // =========================================================================

    /// Observe structural changes.
    pub fn subscribe(
        &self,
        observer: impl Fn(&CollectionChange<Arc<V>>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.events.structural.subscribe(Arc::new(observer))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.structural.unsubscribe(id)
    }

    /// Observe field changes of stored values.
    pub fn subscribe_items(
        &self,
        observer: impl Fn(&ItemChanged<K, V>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.events.items.subscribe(Arc::new(observer))
    }

    pub fn unsubscribe_items(&self, id: SubscriptionId) -> bool {
        self.events.items.unsubscribe(id)
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// The value stored for `key`, or `None`.
    pub fn get<Q>(&self, key: &Q) -> Option<Arc<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(key).map(|slot| Arc::clone(&slot.value))
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys present at the time of the call, in no particular order.
    pub fn keys(&self) -> Vec<K> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Values present at the time of the call, in no particular order.
    pub fn values(&self) -> Vec<Arc<V>> {
        self.entries
            .iter()
            .map(|entry| Arc::clone(&entry.value().value))
            .collect()
    }

    /// Entries present at the time of the call, in no particular order.
    pub fn snapshot(&self) -> Vec<(K, Arc<V>)> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(&entry.value().value)))
            .collect()
    }

    // =========================================================================
    // INSERTS
    // =========================================================================

    /// Insert `value` if `key` is absent. Emits `Add` on success.
    pub fn try_add(&self, key: K, value: impl Into<Arc<V>>) -> bool {
        let value = value.into();
        match self.entries.entry(key) {
            Entry::Occupied(_) => return false,
            Entry::Vacant(vacant) => {
                let slot = self.attach(vacant.key(), Arc::clone(&value));
                vacant.insert(slot);
            }
        }
        self.emit(CollectionChange::Add(value));
        true
    }

    /// Return the stored value, or insert the one built by `factory`.
    ///
    /// Emits `Add` only when a value was inserted.
    pub fn get_or_add<F, A>(&self, key: K, factory: F) -> Arc<V>
    where
        F: FnOnce(&K) -> A,
        A: Into<Arc<V>>,
    {
        let value = match self.entries.entry(key) {
            Entry::Occupied(occupied) => return Arc::clone(&occupied.get().value),
            Entry::Vacant(vacant) => {
                let value: Arc<V> = factory(vacant.key()).into();
                let slot = self.attach(vacant.key(), Arc::clone(&value));
                vacant.insert(slot);
                value
            }
        };
        self.emit(CollectionChange::Add(Arc::clone(&value)));
        value
    }

    /// [`get_or_add`](Self::get_or_add) with a ready value.
    pub fn get_or_add_value(&self, key: K, value: impl Into<Arc<V>>) -> Arc<V> {
        self.get_or_add(key, |_| value)
    }

    /// Insert the value built by `add` if `key` is absent, otherwise replace
    /// the stored value with the result of `update`.
    ///
    /// Emits `Add` or `Replace { new, old }`. The update function runs under
    /// the key's shard lock and exactly once per call; it must be a pure
    /// function of its inputs. If it returns the stored `Arc` unchanged, the
    /// subscription is kept and `Replace` carries the same value twice.
    pub fn add_or_update<A, U, AV, UV>(&self, key: K, add: A, update: U) -> Arc<V>
    where
        A: FnOnce(&K) -> AV,
        U: FnOnce(&K, &Arc<V>) -> UV,
        AV: Into<Arc<V>>,
        UV: Into<Arc<V>>,
    {
        let (value, change) = match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                let old = Arc::clone(&occupied.get().value);
                let new: Arc<V> = update(occupied.key(), &old).into();
                if !Arc::ptr_eq(&new, &old) {
                    occupied.get().detach();
                    let slot = self.attach(occupied.key(), Arc::clone(&new));
                    occupied.insert(slot);
                }
                let change = CollectionChange::Replace {
                    new: Arc::clone(&new),
                    old,
                };
                (new, change)
            }
            Entry::Vacant(vacant) => {
                let value: Arc<V> = add(vacant.key()).into();
                let slot = self.attach(vacant.key(), Arc::clone(&value));
                vacant.insert(slot);
                (Arc::clone(&value), CollectionChange::Add(value))
            }
        };
        self.emit(change);
        value
    }

    /// [`add_or_update`](Self::add_or_update) with a ready value for the
    /// insert case.
    pub fn add_or_update_value<U, UV>(&self, key: K, value: impl Into<Arc<V>>, update: U) -> Arc<V>
    where
        U: FnOnce(&K, &Arc<V>) -> UV,
        UV: Into<Arc<V>>,
    {
        self.add_or_update(key, |_| value, update)
    }

    /// Insert `value` if `key` is absent; otherwise merge its fields into the
    /// stored value in place (the stored `Arc` is kept).
    ///
    /// Emits `Add`, or `Replace { new: stored, old: snapshot_before_merge }`.
    /// The merge runs outside the map's locks and exactly once. Change
    /// notifications the merge raises on the calling thread are not forwarded
    /// as item changes; changes made by other threads meanwhile still are. If the key is removed while the merge runs, the merged value
    /// is returned but no `Replace` is emitted (the `Remove` already was).
    pub fn add_or_merge(&self, key: K, value: impl Into<Arc<V>>) -> Arc<V>
    where
        V: SharedMerge,
    {
        let incoming = value.into();

        let (stored, state, guard): (Arc<V>, Arc<LinkState>, MergeGuard) =
            match self.entries.entry(key) {
                Entry::Vacant(vacant) => {
                    let slot = self.attach(vacant.key(), Arc::clone(&incoming));
                    vacant.insert(slot);
                    self.emit(CollectionChange::Add(Arc::clone(&incoming)));
                    return incoming;
                }
                Entry::Occupied(occupied) => {
                    let slot = occupied.get();
                    let guard = slot.state.begin_merge();
                    (Arc::clone(&slot.value), Arc::clone(&slot.state), guard)
                }
            };

        let old = Arc::new(stored.snapshot());
        stored.merge_shared(&incoming);
        drop(guard);

        if state.detached.load(Ordering::Acquire) {
            tracing::trace!("merge target was removed concurrently; skipping replace");
            return stored;
        }

        self.emit(CollectionChange::Replace {
            new: Arc::clone(&stored),
            old,
        });
        stored
    }

    /// Replace the value for `key` with `new_value` if the stored value is
    /// `comparison` (same `Arc`). Emits `Replace { new, old }` on success.
    pub fn try_update(&self, key: &K, new_value: impl Into<Arc<V>>, comparison: &Arc<V>) -> bool {
        let new_value = new_value.into();
        let old = {
            let Some(mut slot) = self.entries.get_mut(key) else {
                return false;
            };
            if !Arc::ptr_eq(&slot.value, comparison) {
                return false;
            }
            let old = Arc::clone(&slot.value);
            if !Arc::ptr_eq(&old, &new_value) {
                slot.detach();
                let replacement = self.attach(slot.key(), Arc::clone(&new_value));
                *slot.value_mut() = replacement;
            }
            old
        };
        self.emit(CollectionChange::Replace {
            new: new_value,
            old,
        });
        true
    }

    // =========================================================================
    // REMOVALS
    // =========================================================================

    /// Remove `key`, returning its value. Emits `Remove` on success.
    pub fn try_remove<Q>(&self, key: &Q) -> Option<Arc<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let (_, slot) = self.entries.remove(key)?;
        let value = Arc::clone(&slot.value);
        drop(slot);
        self.emit(CollectionChange::Remove(Arc::clone(&value)));
        Some(value)
    }

    /// Remove every entry and emit a single `Reset`.
    pub fn clear(&self) {
        let mut removed = 0usize;
        self.entries.retain(|_, _| {
            removed += 1;
            false
        });
        tracing::debug!(removed, "cleared map");
        self.emit(CollectionChange::Reset);
    }
}

impl<K, V> Default for ObservableConcurrentMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: ChangeNotify,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for ObservableConcurrentMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static + fmt::Debug,
    V: ChangeNotify + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableConcurrentMap")
            .field("len", &self.entries.len())
            .field("observers", &self.events.structural.len())
            .field("item_observers", &self.events.items.len())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
