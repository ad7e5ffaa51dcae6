// ============================================================================
// observable-collections - Core Module
// Value capabilities, emitted events and errors
// ============================================================================

pub mod error;
pub mod types;

pub use error::{CollectionError, Result};
pub use types::{
    ChangeCallback, ChangeNotify, CollectionChange, FieldChange, ItemChanged, ListObserver,
    Merge, SharedMerge, SubscriptionId,
};
