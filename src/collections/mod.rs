// ============================================================================
// observable-collections - Collections
// The concurrent map, the keyed reconciling list and the batch list
// ============================================================================
//
// All three emit CollectionChange events to explicit observer lists. The map
// additionally forwards field changes of its stored values as ItemChanged.
// ============================================================================

mod batch;
mod keyed;
mod map;

pub use batch::BatchMutableCollection;
pub use keyed::KeyedReconcilingCollection;
pub use map::{ItemObserver, MapObserver, ObservableConcurrentMap};
