// ============================================================================
// observable-collections - Tracked Value
// A thread-safe value that announces its own changes
// ============================================================================

use std::fmt;

use parking_lot::RwLock;

use crate::core::types::{
    ChangeCallback, ChangeNotify, FieldChange, Merge, SharedMerge, SubscriptionId,
};
use crate::notify::ChangeNotifier;

// =============================================================================
// TRACKED<T>
// =============================================================================

/// A value guarded by a lock that notifies change subscribers on every write.
///
/// This is the stock [`ChangeNotify`] value for
/// [`ObservableConcurrentMap`](crate::ObservableConcurrentMap): share it as
/// `Arc<Tracked<T>>`, mutate it from anywhere, and the map forwards the
/// change to its item observers.
///
/// Callbacks always run after the write lock is released, so a callback may
/// read the value it was notified about.
///
/// # Example
///
/// ```
/// use observable_collections::Tracked;
///
/// let count = Tracked::new(0);
/// assert_eq!(count.get(), 0);
///
/// count.set(5);
/// assert_eq!(count.get(), 5);
///
/// count.update(|n| *n += 1);
/// assert_eq!(count.with(|n| *n * 2), 12);
/// ```
pub struct Tracked<T> {
    value: RwLock<T>,
    notifier: ChangeNotifier,
}

impl<T> Tracked<T> {
    /// Create a new tracked value.
    pub fn new(value: T) -> Self {
        Self {
            value: RwLock::new(value),
            notifier: ChangeNotifier::new(),
        }
    }

    /// Get the current value (cloning).
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.value.read().clone()
    }

    /// Access the current value with a closure (avoids cloning).
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&*self.value.read())
    }

    /// Replace the value.
    ///
    /// Returns true if the value changed. Writing a value equal to the current
    /// one sends no notification.
    pub fn set(&self, value: T) -> bool
    where
        T: PartialEq,
    {
        let changed = {
            let mut current = self.value.write();
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        };
        if changed {
            self.notifier.notify(FieldChange::whole());
        }
        changed
    }

    /// Update the value in place; always notifies a whole-value change.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let out = f(&mut *self.value.write());
        self.notifier.notify(FieldChange::whole());
        out
    }

    /// Update one field in place and notify a change of `field`.
    ///
    /// ```
    /// use observable_collections::Tracked;
    ///
    /// #[derive(Clone)]
    /// struct Peer { addr: String, online: bool }
    ///
    /// let peer = Tracked::new(Peer { addr: "10.0.0.1".into(), online: false });
    /// peer.update_field("online", |p| p.online = true);
    /// assert!(peer.with(|p| p.online));
    /// ```
    pub fn update_field<R>(&self, field: &'static str, f: impl FnOnce(&mut T) -> R) -> R {
        let out = f(&mut *self.value.write());
        self.notifier.notify(FieldChange::field(field));
        out
    }

    /// Number of attached change callbacks.
    pub fn subscriber_count(&self) -> usize {
        self.notifier.subscriber_count()
    }

    /// Consume the wrapper, returning the value.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T: Send + Sync + 'static> ChangeNotify for Tracked<T> {
    fn on_change(&self, callback: ChangeCallback) -> SubscriptionId {
        self.notifier.on_change(callback)
    }

    fn off_change(&self, id: SubscriptionId) -> bool {
        self.notifier.off_change(id)
    }
}

impl<T: Merge + Clone> SharedMerge for Tracked<T> {
    fn merge_shared(&self, source: &Self) {
        if std::ptr::eq(self, source) {
            return;
        }
        // Never hold both locks at once.
        let incoming = source.get();
        self.value.write().merge_from(&incoming);
        self.notifier.notify(FieldChange::whole());
    }

    fn snapshot(&self) -> Self {
        Tracked::new(self.get())
    }
}

impl<T: Default> Default for Tracked<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> From<T> for Tracked<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for Tracked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracked")
            .field("value", &*self.value.read())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
