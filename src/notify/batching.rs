// ============================================================================
// observable-collections - Batching
// Suppress per-item notifications for the duration of a bulk update
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

// =============================================================================
// SUPPRESSOR
// =============================================================================

/// Depth-counted notification suppression.
///
/// While at least one [`SuppressGuard`] is alive, [`is_active`] reports true
/// and the owning collection holds back its per-item events. Nested
/// suppression is supported; only the outermost guard ends it.
///
/// The guard owns a handle to the counter rather than borrowing the
/// suppressor, so a collection can keep mutating itself while suppressed.
///
/// [`is_active`]: Suppressor::is_active
///
/// # Example
///
/// ```
/// use observable_collections::notify::Suppressor;
///
/// let suppressor = Suppressor::new();
/// assert!(!suppressor.is_active());
///
/// {
///     let outer = suppressor.suppress();
///     let inner = suppressor.suppress();
///     assert!(!inner.is_outermost());
///     drop(inner);
///     assert!(suppressor.is_active());
///     assert!(outer.is_outermost());
/// }
///
/// assert!(!suppressor.is_active());
/// ```
#[derive(Debug, Default)]
pub struct Suppressor {
    depth: Arc<AtomicUsize>,
}

impl Suppressor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a suppressed scope. Suppression lasts until the guard drops,
    /// including when the scope unwinds from a panic.
    pub fn suppress(&self) -> SuppressGuard {
        self.depth.fetch_add(1, Ordering::SeqCst);
        SuppressGuard {
            depth: Arc::clone(&self.depth),
        }
    }

    /// Whether any guard is currently alive.
    pub fn is_active(&self) -> bool {
        self.depth() > 0
    }

    /// Number of nested guards alive.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

/// RAII guard returned by [`Suppressor::suppress`].
#[must_use = "suppression ends as soon as the guard is dropped"]
#[derive(Debug)]
pub struct SuppressGuard {
    depth: Arc<AtomicUsize>,
}

impl SuppressGuard {
    /// True when dropping this guard ends suppression.
    pub fn is_outermost(&self) -> bool {
        self.depth.load(Ordering::SeqCst) == 1
    }
}

impl Drop for SuppressGuard {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }
}

// =============================================================================
// TESTS
// =============================================================================
