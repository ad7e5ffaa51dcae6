// ============================================================================
// observable-collections - KeyedReconcilingCollection
// An ordered list kept unique by a derived key, reconcilable against a
// snapshot of desired state
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::core::error::{CollectionError, Result};
use crate::core::types::{CollectionChange, ListObserver, Merge, SubscriptionId};
use crate::json;
use crate::notify::ObserverList;

/// How a collection reads keys: a plain extractor, or a field lookup that
/// can also fail to serialize.
enum KeyFn<K, V> {
    Plain(Box<dyn Fn(&V) -> Option<K> + Send + Sync>),
    Fallible(Box<dyn Fn(&V) -> Result<Option<K>> + Send + Sync>),
}

/// An ordered collection whose elements are identified by a derived key.
///
/// Keys are read through an extractor fixed at construction: a closure
/// ([`new`](Self::new)) or a serialized field name ([`by_field`](Self::by_field)).
/// No two elements share a key; adding an element whose key is already
/// present merges it into the existing element instead.
///
/// Lookups are linear scans. The type targets small, UI-facing sets and is
/// single-writer: share it behind a lock or keep it on one thread.
///
/// Events: `Add` on append, `Replace { new, old }` on merge (with `old` the
/// state before the merge), `Remove` on removal, `Reset` on
/// [`clear`](Self::clear).
///
/// # Example
///
/// ```
/// use observable_collections::{KeyedReconcilingCollection, merge_fields};
///
/// #[derive(Clone, Debug, PartialEq)]
/// struct Peer { id: u32, online: bool }
/// merge_fields!(Peer { id, online });
///
/// let mut peers = KeyedReconcilingCollection::new(|p: &Peer| Some(p.id));
/// peers.add_or_merge(Peer { id: 1, online: false }).unwrap();
/// peers.add_or_merge(Peer { id: 2, online: false }).unwrap();
///
/// // Peer 1 is merged, peer 2 is pruned, peer 3 is appended.
/// peers.reconcile([Peer { id: 1, online: true }, Peer { id: 3, online: true }]).unwrap();
///
/// let ids: Vec<_> = peers.iter().map(|p| (p.id, p.online)).collect();
/// assert_eq!(ids, vec![(1, true), (3, true)]);
/// ```
pub struct KeyedReconcilingCollection<K, V> {
    items: Vec<V>,
    key_of: KeyFn<K, V>,
    key_name: String,
    observers: ObserverList<ListObserver<V>>,
}

impl<K, V> KeyedReconcilingCollection<K, V>
where
    K: PartialEq + Clone,
{
    /// Create an empty collection keyed by `key_of`.
    ///
    /// An extractor returning `None` makes the operation that asked for the
    /// key fail with [`CollectionError::MissingKey`].
    pub fn new(key_of: impl Fn(&V) -> Option<K> + Send + Sync + 'static) -> Self {
        Self::with_key_name("key", key_of)
    }

    /// Like [`new`](Self::new), naming the key in `MissingKey` errors.
    pub fn with_key_name(
        key_name: impl Into<String>,
        key_of: impl Fn(&V) -> Option<K> + Send + Sync + 'static,
    ) -> Self {
        Self::with_key_fn(key_name.into(), KeyFn::Plain(Box::new(key_of)))
    }

    fn with_key_fn(key_name: String, key_of: KeyFn<K, V>) -> Self {
        Self {
            items: Vec::new(),
            key_of,
            key_name,
            observers: ObserverList::new(),
        }
    }

    /// Create an empty collection keyed by the serialized field `field`.
    ///
    /// A value whose field is absent or `null` has no key. A value that fails
    /// to serialize, or whose field does not convert to `K`, makes key reads
    /// fail with [`CollectionError::Json`].
    ///
    /// ```
    /// use serde::Serialize;
    /// use observable_collections::{CollectionError, KeyedReconcilingCollection};
    ///
    /// #[derive(Serialize)]
    /// struct Row { id: Option<u64>, label: String }
    ///
    /// let rows = KeyedReconcilingCollection::<u64, Row>::by_field("id").unwrap();
    /// assert_eq!(rows.get_key(&Row { id: Some(4), label: "x".into() }).unwrap(), 4);
    /// assert!(matches!(
    ///     rows.get_key(&Row { id: None, label: "x".into() }),
    ///     Err(CollectionError::MissingKey { .. })
    /// ));
    /// ```
    pub fn by_field(field: impl Into<String>) -> Result<Self>
    where
        K: DeserializeOwned + 'static,
        V: Serialize + 'static,
    {
        let field = field.into();
        if field.is_empty() {
            return Err(CollectionError::InvalidArgument(
                "key field name is empty".into(),
            ));
        }

        let lookup = field.clone();
        let key_of = move |value: &V| -> Result<Option<K>> {
            match json::field_value(value, &lookup)? {
                Some(raw) if !raw.is_null() => Ok(Some(serde_json::from_value(raw)?)),
                _ => Ok(None),
            }
        };
        Ok(Self::with_key_fn(field, KeyFn::Fallible(Box::new(key_of))))
    }

    // =========================================================================
    // SUBSCRIPTIONS
    // =========================================================================

    pub fn subscribe(
        &self,
        observer: impl Fn(&CollectionChange<&V>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.observers.subscribe(Arc::new(observer))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    fn emit(&self, change: CollectionChange<&V>) {
        self.observers.emit(|observer| observer(&change));
    }

    // =========================================================================
    // KEYS
    // =========================================================================

    /// The key of `value`.
    pub fn get_key(&self, value: &V) -> Result<K> {
        let key = match &self.key_of {
            KeyFn::Plain(key_of) => key_of(value),
            KeyFn::Fallible(key_of) => key_of(value)?,
        };
        key.ok_or_else(|| CollectionError::MissingKey {
            field: self.key_name.clone(),
        })
    }

    /// Keys of every element, in order.
    pub fn keys(&self) -> Result<Vec<K>> {
        self.items.iter().map(|item| self.get_key(item)).collect()
    }

    /// Index of the element with `key`.
    ///
    /// Fails with `MissingKey` if any element scanned has no key.
    pub fn position(&self, key: &K) -> Result<Option<usize>> {
        for (index, item) in self.items.iter().enumerate() {
            if self.get_key(item)? == *key {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    pub fn contains_key(&self, key: &K) -> Result<bool> {
        Ok(self.position(key)?.is_some())
    }

    /// The element with `key`.
    pub fn get(&self, key: &K) -> Result<Option<&V>> {
        Ok(self.position(key)?.map(|index| &self.items[index]))
    }

    // =========================================================================
    // MUTATION
    // =========================================================================

    fn append(&mut self, value: V) -> &V {
        self.items.push(value);
        let index = self.items.len() - 1;
        let added = &self.items[index];
        self.observers.emit(|observer| observer(&CollectionChange::Add(added)));
        added
    }

    fn merge_at(&mut self, index: usize, source: &V) -> &V
    where
        V: Merge + Clone,
    {
        let old = self.items[index].clone();
        self.items[index].merge_from(source);
        let merged = &self.items[index];
        self.observers.emit(|observer| {
            observer(&CollectionChange::Replace {
                new: merged,
                old: &old,
            })
        });
        merged
    }

    /// Merge `value` into the element sharing its key, or append it.
    ///
    /// Returns the element now stored under the key.
    pub fn add_or_merge(&mut self, value: V) -> Result<&V>
    where
        V: Merge + Clone,
    {
        let key = self.get_key(&value)?;
        match self.position(&key)? {
            Some(index) => Ok(self.merge_at(index, &value)),
            None => Ok(self.append(value)),
        }
    }

    /// [`add_or_merge`](Self::add_or_merge) every value, in order.
    ///
    /// Every key is read before anything changes, so a `MissingKey` failure
    /// leaves the collection untouched.
    pub fn add_range(&mut self, values: impl IntoIterator<Item = V>) -> Result<()>
    where
        V: Merge + Clone,
    {
        self.upsert_all(values.into_iter().collect())?;
        Ok(())
    }

    /// Make the collection match `snapshot`.
    ///
    /// Every snapshot element is merged into its counterpart or appended (in
    /// snapshot order); then every element whose key is not in the snapshot
    /// is removed. Survivors keep their relative order. An empty snapshot
    /// clears the collection.
    ///
    /// Keys are read before anything changes, so a `MissingKey` failure
    /// leaves the collection untouched.
    pub fn reconcile(&mut self, snapshot: impl IntoIterator<Item = V>) -> Result<()>
    where
        V: Merge + Clone,
    {
        let snapshot: Vec<V> = snapshot.into_iter().collect();
        if snapshot.is_empty() {
            self.clear();
            return Ok(());
        }

        let Upserted { wanted, mut present, merged, added } = self.upsert_all(snapshot)?;

        let mut removed = 0usize;
        let mut index = 0;
        while index < self.items.len() {
            if wanted.contains(&present[index]) {
                index += 1;
                continue;
            }
            present.remove(index);
            let item = self.items.remove(index);
            self.emit(CollectionChange::Remove(&item));
            removed += 1;
        }

        tracing::debug!(merged, added, removed, len = self.items.len(), "reconciled");
        Ok(())
    }

    fn upsert_all(&mut self, values: Vec<V>) -> Result<Upserted<K>>
    where
        V: Merge + Clone,
    {
        let wanted: Vec<K> = values
            .iter()
            .map(|value| self.get_key(value))
            .collect::<Result<_>>()?;
        let mut present = self.keys()?;

        let (mut merged, mut added) = (0usize, 0usize);
        for (key, value) in wanted.iter().zip(values) {
            match present.iter().position(|existing| existing == key) {
                Some(index) => {
                    self.merge_at(index, &value);
                    merged += 1;
                }
                None => {
                    present.push(key.clone());
                    self.append(value);
                    added += 1;
                }
            }
        }

        Ok(Upserted {
            wanted,
            present,
            merged,
            added,
        })
    }

    /// Remove the element with `key`. Emits `Remove` when found.
    pub fn remove_key(&mut self, key: &K) -> Result<Option<V>> {
        let Some(index) = self.position(key)? else {
            return Ok(None);
        };
        Ok(self.remove_at(index))
    }

    /// Remove the element at `index`. Emits `Remove` when in range.
    pub fn remove_at(&mut self, index: usize) -> Option<V> {
        if index >= self.items.len() {
            return None;
        }
        let item = self.items.remove(index);
        self.emit(CollectionChange::Remove(&item));
        Some(item)
    }

    /// Remove every element and emit `Reset`.
    pub fn clear(&mut self) {
        self.items.clear();
        self.emit(CollectionChange::Reset);
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

    pub fn iter(&self) -> std::slice::Iter<'_, V> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[V] {
        &self.items
    }
}

/// Bookkeeping shared by `add_range` and `reconcile`.
struct Upserted<K> {
    /// Keys of the incoming values, in order.
    wanted: Vec<K>,
    /// Keys of the stored elements, aligned with `items`.
    present: Vec<K>,
    merged: usize,
    added: usize,
}

impl<'a, K, V> IntoIterator for &'a KeyedReconcilingCollection<K, V>
where
    K: PartialEq + Clone,
{
    type Item = &'a V;
    type IntoIter = std::slice::Iter<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<K, V: fmt::Debug> fmt::Debug for KeyedReconcilingCollection<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedReconcilingCollection")
            .field("key", &self.key_name)
            .field("items", &self.items)
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
