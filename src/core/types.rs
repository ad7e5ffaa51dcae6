// ============================================================================
// observable-collections - Type Definitions
// Capabilities consumed from stored values and the events the collections emit
// ============================================================================

use std::sync::Arc;

slotmap::new_key_type! {
    /// Token returned by every `subscribe`/`on_change` call.
    ///
    /// Tokens are generational: once a subscription is removed, its token
    /// never matches a later subscription that happens to reuse the slot.
    pub struct SubscriptionId;
}

// =============================================================================
// VALUE CAPABILITIES
// =============================================================================

/// Describes a change announced by a value about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldChange {
    /// Name of the field that changed, `None` when the whole value changed.
    pub field: Option<&'static str>,
}

impl FieldChange {
    /// A change of one named field.
    pub const fn field(name: &'static str) -> Self {
        Self { field: Some(name) }
    }

    /// A change of the value as a whole.
    pub const fn whole() -> Self {
        Self { field: None }
    }
}

/// Callback attached to a value through [`ChangeNotify::on_change`].
pub type ChangeCallback = Arc<dyn Fn(&FieldChange) + Send + Sync>;

/// A value that can announce "one of my fields changed".
///
/// Only callbacks currently attached are notified. After
/// [`off_change`](ChangeNotify::off_change) returns, notifications that start
/// afterwards never reach the detached callback.
///
/// Most types embed a [`ChangeNotifier`](crate::notify::ChangeNotifier) and
/// delegate both methods to it.
pub trait ChangeNotify: Send + Sync + 'static {
    /// Attach a change callback.
    fn on_change(&self, callback: ChangeCallback) -> SubscriptionId;

    /// Detach a change callback. Returns false if the token was not attached.
    fn off_change(&self, id: SubscriptionId) -> bool;
}

/// Field-by-field copy of every writable field from `source` onto `self`.
///
/// Implement by hand or with [`merge_fields!`](crate::merge_fields). For a
/// serde-based generic version see [`merge_json`](crate::json::merge_json).
pub trait Merge {
    fn merge_from(&mut self, source: &Self);
}

/// Merge through a shared reference.
///
/// Values in [`ObservableConcurrentMap`](crate::ObservableConcurrentMap) live
/// behind `Arc`, so merging in place needs interior mutability.
pub trait SharedMerge {
    /// Copy every writable field of `source` onto `self` in place.
    fn merge_shared(&self, source: &Self);

    /// A detached copy of the current state, with no change subscribers.
    fn snapshot(&self) -> Self;
}

// =============================================================================
// EMITTED EVENTS
// =============================================================================

/// A structural change of a collection.
///
/// The map emits `CollectionChange<Arc<V>>`; the list collections emit
/// `CollectionChange<&T>` borrowed from their storage for the duration of the
/// callback.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionChange<T> {
    /// A new element was added.
    Add(T),
    /// An element was replaced (or merged in place, with `old` a snapshot).
    Replace { new: T, old: T },
    /// An element was removed.
    Remove(T),
    /// The collection changed wholesale; observers should re-read it.
    Reset,
}

impl<T> CollectionChange<T> {
    /// Short action name, used in logs.
    pub fn action(&self) -> &'static str {
        match self {
            CollectionChange::Add(_) => "add",
            CollectionChange::Replace { .. } => "replace",
            CollectionChange::Remove(_) => "remove",
            CollectionChange::Reset => "reset",
        }
    }

    pub fn is_reset(&self) -> bool {
        matches!(self, CollectionChange::Reset)
    }
}

/// A stored value changed one of its fields without a structural change.
#[derive(Debug, Clone)]
pub struct ItemChanged<K, V> {
    /// Key the value is stored under.
    pub key: K,
    /// The stored value itself.
    pub value: Arc<V>,
    /// The field it reported, if any.
    pub field: Option<&'static str>,
}

/// Observer of list collections.
pub type ListObserver<T> = dyn Fn(&CollectionChange<&T>) + Send + Sync;

// =============================================================================
// TESTS
// =============================================================================
