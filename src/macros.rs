// ============================================================================
// observable-collections - Macros
// ============================================================================

/// Implement [`Merge`](crate::Merge) by copying the listed fields.
///
/// Each field is cloned from the source onto the target. List every field
/// that should follow the source; fields left out keep their current value.
///
/// # Usage
///
/// ```rust
/// use observable_collections::{Merge, merge_fields};
///
/// #[derive(Clone, Debug, PartialEq)]
/// struct Device {
///     serial: String,
///     firmware: String,
///     seen: u64,
/// }
///
/// merge_fields!(Device { serial, firmware });
///
/// let mut stored = Device { serial: "a1".into(), firmware: "1.0".into(), seen: 7 };
/// stored.merge_from(&Device { serial: "a1".into(), firmware: "1.1".into(), seen: 0 });
///
/// assert_eq!(stored.firmware, "1.1");
/// assert_eq!(stored.seen, 7);
/// ```
#[macro_export]
macro_rules! merge_fields {
    ($ty:ty { $($field:ident),+ $(,)? }) => {
        impl $crate::Merge for $ty {
            fn merge_from(&mut self, source: &Self) {
                $( self.$field = ::core::clone::Clone::clone(&source.$field); )+
            }
        }
    };
}

/// Helper macro to clone variables into a move closure.
///
/// Subscriptions outlive the call that registers them, so anything a
/// callback captures has to be owned.
///
/// # Usage
///
/// ```rust
/// use std::sync::{Arc, Mutex};
/// use observable_collections::{BatchMutableCollection, cloned};
///
/// let list = BatchMutableCollection::<u32>::new();
/// let seen = Arc::new(Mutex::new(0));
///
/// list.subscribe(cloned!(seen => move |_| *seen.lock().unwrap() += 1));
/// assert_eq!(*seen.lock().unwrap(), 0);
/// ```
#[macro_export]
macro_rules! cloned {
    ($($n:ident),+ => $e:expr) => {
        {
            $( let $n = $n.clone(); )+
            $e
        }
    };
}
