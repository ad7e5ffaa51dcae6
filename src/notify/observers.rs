// ============================================================================
// observable-collections - Observer Lists
// Explicit subscriber bookkeeping with generational tokens
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use slotmap::SlotMap;

use crate::core::types::{ChangeCallback, ChangeNotify, FieldChange, SubscriptionId};

// =============================================================================
// OBSERVER LIST
// =============================================================================

/// A set of callbacks owned by the type that emits to them.
///
/// `F` is the (usually unsized) callback type, e.g.
/// `dyn Fn(&Event) + Send + Sync`. Subscribing and unsubscribing are O(1).
///
/// [`emit`](ObserverList::emit) copies the current callbacks out under the
/// read lock and invokes them after releasing it. Callbacks may therefore
/// subscribe or unsubscribe (themselves included) while being notified, and
/// a slow callback never holds the list's lock.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use observable_collections::notify::ObserverList;
///
/// let list: ObserverList<dyn Fn(&u32) + Send + Sync> = ObserverList::new();
/// let total = Arc::new(AtomicUsize::new(0));
///
/// let sink = total.clone();
/// let id = list.subscribe(Arc::new(move |n: &u32| {
///     sink.fetch_add(*n as usize, Ordering::SeqCst);
/// }));
///
/// list.emit(|observer| observer(&5));
/// assert_eq!(total.load(Ordering::SeqCst), 5);
///
/// assert!(list.unsubscribe(id));
/// list.emit(|observer| observer(&5));
/// assert_eq!(total.load(Ordering::SeqCst), 5);
/// ```
pub struct ObserverList<F: ?Sized> {
    slots: RwLock<SlotMap<SubscriptionId, Arc<F>>>,
}

impl<F: ?Sized> ObserverList<F> {
    /// Create an empty list.
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(SlotMap::with_key()),
        }
    }

    /// Attach a callback, returning the token that detaches it.
    pub fn subscribe(&self, observer: Arc<F>) -> SubscriptionId {
        self.slots.write().insert(observer)
    }

    /// Detach a callback. Returns false for unknown or already removed tokens.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.slots.write().remove(id).is_some()
    }

    /// Whether `id` is currently attached.
    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.slots.read().contains_key(id)
    }

    /// Number of attached callbacks.
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Detach every callback.
    pub fn clear(&self) {
        self.slots.write().clear();
    }

    /// Invoke `f` once per attached callback, outside the lock.
    pub fn emit(&self, mut f: impl FnMut(&F)) {
        let observers: Vec<Arc<F>> = {
            let slots = self.slots.read();
            if slots.is_empty() {
                return;
            }
            slots.values().cloned().collect()
        };

        for observer in &observers {
            f(observer.as_ref());
        }
    }
}

impl<F: ?Sized> Default for ObserverList<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized> fmt::Debug for ObserverList<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverList")
            .field("len", &self.len())
            .finish()
    }
}

// =============================================================================
// CHANGE NOTIFIER
// =============================================================================

/// Reusable [`ChangeNotify`] implementation for value types to embed.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use observable_collections::{ChangeNotify, FieldChange};
/// use observable_collections::notify::ChangeNotifier;
///
/// let notifier = ChangeNotifier::new();
/// let hits = Arc::new(AtomicUsize::new(0));
///
/// let sink = hits.clone();
/// let id = notifier.on_change(Arc::new(move |change: &FieldChange| {
///     assert_eq!(change.field, Some("name"));
///     sink.fetch_add(1, Ordering::SeqCst);
/// }));
///
/// notifier.notify_field("name");
/// notifier.off_change(id);
/// notifier.notify_field("name");
///
/// assert_eq!(hits.load(Ordering::SeqCst), 1);
/// ```
#[derive(Default)]
pub struct ChangeNotifier {
    observers: ObserverList<dyn Fn(&FieldChange) + Send + Sync>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notify every attached callback.
    pub fn notify(&self, change: FieldChange) {
        self.observers.emit(|callback| callback(&change));
    }

    /// Notify that the field `name` changed.
    pub fn notify_field(&self, name: &'static str) {
        self.notify(FieldChange::field(name));
    }

    /// Number of attached change callbacks.
    pub fn subscriber_count(&self) -> usize {
        self.observers.len()
    }
}

impl ChangeNotify for ChangeNotifier {
    fn on_change(&self, callback: ChangeCallback) -> SubscriptionId {
        self.observers.subscribe(callback)
    }

    fn off_change(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
