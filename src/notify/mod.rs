// ============================================================================
// observable-collections - Notification Module
// Observer lists, the stock change notifier and batch suppression
// ============================================================================

pub mod batching;
pub mod observers;

pub use batching::{SuppressGuard, Suppressor};
pub use observers::{ChangeNotifier, ObserverList};
