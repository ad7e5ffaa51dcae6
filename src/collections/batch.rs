// ============================================================================
// observable-collections - BatchMutableCollection
// An ordered list whose bulk updates collapse into a single Reset
// ============================================================================

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::core::error::Result;
use crate::core::types::{CollectionChange, ListObserver, SubscriptionId};
use crate::json;
use crate::notify::{ObserverList, Suppressor};

/// An ordered collection with batched notification.
///
/// Single-item mutations emit `Add`/`Remove` (and `clear` emits `Reset`)
/// right away. Inside a [`batch`](Self::batch) every event is held back and
/// one `Reset` is emitted when the outermost batch ends. The range
/// operations are batches.
///
/// Single-writer: callers serialize access.
///
/// # Example
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use observable_collections::BatchMutableCollection;
///
/// let mut list = BatchMutableCollection::new();
/// let resets = Arc::new(Mutex::new(0));
/// let counter = resets.clone();
/// list.subscribe(move |change| {
///     if change.is_reset() {
///         *counter.lock().unwrap() += 1;
///     }
/// });
///
/// list.add_range(["x", "y", "z"]);
/// assert_eq!(list.as_slice(), &["x", "y", "z"]);
/// assert_eq!(*resets.lock().unwrap(), 1);
/// ```
pub struct BatchMutableCollection<T> {
    items: Vec<T>,
    suppressor: Suppressor,
    observers: ObserverList<ListObserver<T>>,
}

impl<T> BatchMutableCollection<T> {
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::from_vec(Vec::with_capacity(capacity))
    }

    /// Wrap an existing vec. Emits nothing.
    pub fn from_vec(items: Vec<T>) -> Self {
        Self {
            items,
            suppressor: Suppressor::new(),
            observers: ObserverList::new(),
        }
    }

    // =========================================================================
    // SUBSCRIPTIONS
    // =========================================================================

    pub fn subscribe(
        &self,
        observer: impl Fn(&CollectionChange<&T>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.observers.subscribe(Arc::new(observer))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Whether a batch is in progress.
    pub fn is_suppressed(&self) -> bool {
        self.suppressor.is_active()
    }

    fn notify(&self, change: CollectionChange<&T>) {
        if self.suppressor.is_active() {
            return;
        }
        self.observers.emit(|observer| observer(&change));
    }

    // =========================================================================
    // SINGLE-ITEM MUTATION
    // =========================================================================

    /// Append `item`. Emits `Add`.
    pub fn push(&mut self, item: T) {
        self.items.push(item);
        if let Some(added) = self.items.last() {
            self.notify(CollectionChange::Add(added));
        }
    }

    /// Insert `item` at `index`. Emits `Add`.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`.
    pub fn insert(&mut self, index: usize, item: T) {
        self.items.insert(index, item);
        self.notify(CollectionChange::Add(&self.items[index]));
    }

    /// Remove the first element equal to `item`. Emits `Remove` when found;
    /// an absent item is a silent no-op.
    pub fn remove(&mut self, item: &T) -> bool
    where
        T: PartialEq,
    {
        match self.items.iter().position(|existing| existing == item) {
            Some(index) => self.remove_at(index).is_some(),
            None => false,
        }
    }

    /// Remove the element at `index`. Emits `Remove` when in range.
    pub fn remove_at(&mut self, index: usize) -> Option<T> {
        if index >= self.items.len() {
            return None;
        }
        let removed = self.items.remove(index);
        self.notify(CollectionChange::Remove(&removed));
        Some(removed)
    }

    /// Remove every element. Emits `Reset`.
    pub fn clear(&mut self) {
        self.items.clear();
        self.notify(CollectionChange::Reset);
    }

    // =========================================================================
    // BATCHES
    // =========================================================================

    /// Run `f` with notifications suppressed, then emit one `Reset`.
    ///
    /// Batches nest; only the outermost emits. If `f` panics, suppression
    /// still ends but no `Reset` is emitted.
    ///
    /// ```
    /// use observable_collections::BatchMutableCollection;
    ///
    /// let mut list = BatchMutableCollection::from_vec(vec![3, 1, 2]);
    /// let total = list.batch(|list| {
    ///     list.remove(&1);
    ///     list.push(4);
    ///     list.iter().sum::<i32>()
    /// });
    /// assert_eq!(total, 9);
    /// assert!(!list.is_suppressed());
    /// ```
    pub fn batch<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let guard = self.suppressor.suppress();
        let result = f(self);
        let outermost = guard.is_outermost();
        drop(guard);

        if outermost {
            tracing::debug!(len = self.items.len(), "batch flushed");
            self.notify(CollectionChange::Reset);
        }
        result
    }

    /// Append every item in order, then emit one `Reset`.
    ///
    /// An empty range still emits `Reset`.
    pub fn add_range(&mut self, items: impl IntoIterator<Item = T>) {
        self.batch(|this| {
            for item in items {
                this.push(item);
            }
        });
    }

    /// Remove each item in order, skipping absent ones, then emit one `Reset`.
    pub fn remove_range<I>(&mut self, items: I)
    where
        T: PartialEq,
        I: IntoIterator,
        I::Item: Borrow<T>,
    {
        self.batch(|this| {
            for item in items {
                this.remove(item.borrow());
            }
        });
    }

    /// Replace the contents with `items`, then emit one `Reset`.
    pub fn add_clear_range(&mut self, items: impl IntoIterator<Item = T>) {
        self.batch(|this| {
            this.clear();
            this.add_range(items);
        });
    }

    /// Stably sort by `key` in place, then emit one `Reset`.
    ///
    /// If `key` panics, every element stays in the collection.
    pub fn sort_by_key<K: Ord>(&mut self, key: impl FnMut(&T) -> K) {
        self.batch(|this| this.items.sort_by_key(key));
    }

    /// Stably sort by the serialized field `name`.
    ///
    /// The field exists when the first element serializes to an object that
    /// carries it. Otherwise, including when the collection is empty, nothing
    /// changes, no event is emitted and `Ok(false)` is returned. Elements that
    /// lack the field sort as `null`.
    ///
    /// ```
    /// use serde::Serialize;
    /// use observable_collections::BatchMutableCollection;
    ///
    /// #[derive(Serialize)]
    /// struct Job { name: &'static str, priority: u8 }
    ///
    /// let mut jobs = BatchMutableCollection::from_vec(vec![
    ///     Job { name: "b", priority: 2 },
    ///     Job { name: "a", priority: 1 },
    /// ]);
    /// assert!(jobs.sort_by_field("priority").unwrap());
    /// assert!(!jobs.sort_by_field("deadline").unwrap());
    /// assert_eq!(jobs.iter().map(|j| j.name).collect::<Vec<_>>(), vec!["a", "b"]);
    /// ```
    pub fn sort_by_field(&mut self, name: &str) -> Result<bool>
    where
        T: Serialize,
    {
        let Some(first) = self.items.first() else {
            return Ok(false);
        };
        if json::field_value(first, name)?.is_none() {
            return Ok(false);
        }

        let keys = self
            .items
            .iter()
            .map(|item| Ok(json::field_value(item, name)?.unwrap_or(Value::Null)))
            .collect::<Result<Vec<_>>>()?;

        let items = std::mem::take(&mut self.items);
        let mut keyed: Vec<(Value, T)> = keys.into_iter().zip(items).collect();
        keyed.sort_by(|(a, _), (b, _)| json::compare_values(a, b));
        self.add_clear_range(keyed.into_iter().map(|(_, item)| item));
        Ok(true)
    }

    // =========================================================================
    // ACCESS
    // =========================================================================

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

impl<T> Default for BatchMutableCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Clones the elements only. The clone starts with no subscribers.
impl<T: Clone> Clone for BatchMutableCollection<T> {
    fn clone(&self) -> Self {
        Self::from_vec(self.items.clone())
    }
}

impl<T> From<Vec<T>> for BatchMutableCollection<T> {
    fn from(items: Vec<T>) -> Self {
        Self::from_vec(items)
    }
}

impl<T> FromIterator<T> for BatchMutableCollection<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

impl<'a, T> IntoIterator for &'a BatchMutableCollection<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: fmt::Debug> fmt::Debug for BatchMutableCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchMutableCollection")
            .field("items", &self.items)
            .field("suppressed", &self.is_suppressed())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::sync::Mutex;

    fn observe<T: fmt::Debug + 'static>(list: &BatchMutableCollection<T>) -> Arc<Mutex<Vec<String>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        list.subscribe(move |change| {
            let line = match change {
                CollectionChange::Add(v) => format!("add {v:?}"),
                CollectionChange::Replace { new, old } => format!("replace {new:?} {old:?}"),
                CollectionChange::Remove(v) => format!("remove {v:?}"),
                CollectionChange::Reset => "reset".into(),
            };
            sink.lock().unwrap().push(line);
        });
        log
    }

    #[test]
    fn single_item_events() {
        let mut list = BatchMutableCollection::new();
        let log = observe(&list);

        list.push(1);
        list.insert(0, 0);
        assert!(list.remove(&1));
        assert!(!list.remove(&7));
        list.clear();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["add 1", "add 0", "remove 1", "reset"]
        );
    }

    #[test]
    fn add_range_emits_one_reset() {
        let mut list = BatchMutableCollection::new();
        let log = observe(&list);

        list.add_range(["x", "y", "z"]);

        assert_eq!(list.as_slice(), &["x", "y", "z"]);
        assert_eq!(*log.lock().unwrap(), vec!["reset"]);
    }

    #[test]
    fn add_range_large_still_one_reset() {
        let mut list = BatchMutableCollection::new();
        let log = observe(&list);

        list.add_range(0..10_000);

        assert_eq!(list.len(), 10_000);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn empty_add_range_adds_nothing() {
        let mut list = BatchMutableCollection::from_vec(vec![1]);
        let log = observe(&list);

        list.add_range(Vec::new());

        assert_eq!(list.as_slice(), &[1]);
        assert_eq!(*log.lock().unwrap(), vec!["reset"]);
    }

    #[test]
    fn remove_range_skips_absent() {
        let mut list = BatchMutableCollection::from_vec(vec![1, 2, 3, 2]);
        let log = observe(&list);

        list.remove_range([2, 9, 3]);

        assert_eq!(list.as_slice(), &[1, 2]);
        assert_eq!(*log.lock().unwrap(), vec!["reset"]);
    }

    #[test]
    fn remove_range_accepts_references() {
        let mut list = BatchMutableCollection::from_vec(vec!["a".to_string(), "b".to_string()]);
        let doomed = vec!["a".to_string()];

        list.remove_range(&doomed);

        assert_eq!(list.as_slice(), &["b".to_string()]);
    }

    #[test]
    fn add_clear_range_replaces_contents() {
        let mut list = BatchMutableCollection::from_vec(vec![1, 2]);
        let log = observe(&list);

        list.add_clear_range([7, 8]);
        assert_eq!(list.as_slice(), &[7, 8]);

        list.add_clear_range(Vec::new());
        assert!(list.is_empty());

        assert_eq!(*log.lock().unwrap(), vec!["reset", "reset"]);
    }

    #[test]
    fn nested_batches_emit_once() {
        let mut list = BatchMutableCollection::new();
        let log = observe(&list);

        list.batch(|outer| {
            outer.push(1);
            outer.batch(|inner| {
                inner.push(2);
                assert!(inner.is_suppressed());
            });
            assert!(outer.is_suppressed());
            outer.add_range([3, 4]);
        });

        assert!(!list.is_suppressed());
        assert_eq!(list.as_slice(), &[1, 2, 3, 4]);
        assert_eq!(*log.lock().unwrap(), vec!["reset"]);
    }

    #[test]
    fn panic_in_batch_ends_suppression() {
        let mut list = BatchMutableCollection::new();
        let log = observe(&list);

        let result = catch_unwind(AssertUnwindSafe(|| {
            let _: () = list.batch(|list| {
                list.push(1);
                panic!("boom")
            });
        }));

        assert!(result.is_err());
        assert!(!list.is_suppressed());
        assert!(log.lock().unwrap().is_empty());

        list.push(2);
        assert_eq!(*log.lock().unwrap(), vec!["add 2"]);
    }

    #[test]
    fn sort_by_key_is_stable() {
        let mut list =
            BatchMutableCollection::from_vec(vec![(2, 'a'), (1, 'b'), (2, 'c'), (1, 'd')]);
        let log = observe(&list);

        list.sort_by_key(|(n, _)| *n);

        assert_eq!(list.as_slice(), &[(1, 'b'), (1, 'd'), (2, 'a'), (2, 'c')]);
        assert_eq!(*log.lock().unwrap(), vec!["reset"]);
    }

    #[test]
    fn panicking_sort_key_keeps_elements() {
        let mut list = BatchMutableCollection::from_vec(vec![3, 1, 2]);
        let log = observe(&list);

        let result = catch_unwind(AssertUnwindSafe(|| {
            list.sort_by_key(|n| if *n == 2 { panic!("bad key") } else { *n });
        }));

        assert!(result.is_err());
        assert_eq!(list.len(), 3);
        let mut items = list.as_slice().to_vec();
        items.sort();
        assert_eq!(items, vec![1, 2, 3]);
        assert!(!list.is_suppressed());
        assert!(log.lock().unwrap().is_empty());
    }

    #[derive(Debug, Clone, PartialEq, Serialize)]
    struct Task {
        title: &'static str,
        rank: Option<i32>,
    }

    fn task(title: &'static str, rank: Option<i32>) -> Task {
        Task { title, rank }
    }

    fn titles(list: &BatchMutableCollection<Task>) -> Vec<&'static str> {
        list.iter().map(|t| t.title).collect()
    }

    #[test]
    fn sort_by_field_orders_by_value() {
        let mut list = BatchMutableCollection::from_vec(vec![
            task("c", Some(3)),
            task("a", Some(1)),
            task("none", None),
            task("b", Some(1)),
        ]);
        let log = observe(&list);

        assert!(list.sort_by_field("rank").unwrap());

        assert_eq!(titles(&list), vec!["none", "a", "b", "c"]);
        assert_eq!(*log.lock().unwrap(), vec!["reset"]);
    }

    #[test]
    fn sort_by_field_by_string() {
        let mut list = BatchMutableCollection::from_vec(vec![task("b", None), task("a", None)]);
        assert!(list.sort_by_field("title").unwrap());
        assert_eq!(titles(&list), vec!["a", "b"]);
    }

    #[test]
    fn sort_by_missing_field_is_noop() {
        let mut list =
            BatchMutableCollection::from_vec(vec![task("b", Some(2)), task("a", Some(1))]);
        let log = observe(&list);

        assert!(!list.sort_by_field("nonexistent").unwrap());

        assert_eq!(titles(&list), vec!["b", "a"]);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn sort_empty_is_noop() {
        let mut list = BatchMutableCollection::<Task>::new();
        let log = observe(&list);

        assert!(!list.sort_by_field("rank").unwrap());
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn clone_drops_subscribers() {
        let list = BatchMutableCollection::from_vec(vec![1, 2]);
        let log = observe(&list);

        let mut copy = list.clone();
        copy.push(3);

        assert_eq!(copy.as_slice(), &[1, 2, 3]);
        assert_eq!(list.len(), 2);
        assert!(log.lock().unwrap().is_empty());
    }
}
