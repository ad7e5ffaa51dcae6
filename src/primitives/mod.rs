// ============================================================================
// observable-collections - Primitives Module
// ============================================================================

pub mod tracked;

pub use tracked::Tracked;
