// ============================================================================
// observable-collections - Observable Collections for Rust
// ============================================================================
//
// Three collections that tell their observers what changed:
//
// - ObservableConcurrentMap: a sharded concurrent map that emits structural
//   events and forwards field changes of the values it holds.
// - KeyedReconcilingCollection: an ordered list kept unique by key, merged
//   and pruned against snapshots of desired state.
// - BatchMutableCollection: an ordered list whose bulk updates collapse into
//   a single Reset.
// ============================================================================

pub mod collections;
pub mod core;
pub mod json;
pub mod notify;
pub mod primitives;

mod macros;

// Re-export core items at crate root
pub use core::error::{CollectionError, Result};
pub use core::types::{
    ChangeCallback, ChangeNotify, CollectionChange, FieldChange, ItemChanged, ListObserver,
    Merge, SharedMerge, SubscriptionId,
};

pub use collections::{
    BatchMutableCollection, ItemObserver, KeyedReconcilingCollection, MapObserver,
    ObservableConcurrentMap,
};
pub use notify::ChangeNotifier;
pub use primitives::Tracked;

// =============================================================================
// TESTS
// =============================================================================
