//! Guard predicates for routing decisions.
//!
//! Guards are pure boolean functions. Noop nodes use them to pick a
//! transition purely from external conditions (pending events, context).

use std::marker::PhantomData;

/// Pure predicate over a value of type `T`.
///
/// # Example
///
/// ```rust
/// use waypoint::core::Guard;
///
/// let is_even = Guard::new(|n: &u32| n % 2 == 0);
///
/// assert!(is_even.check(&4));
/// assert!(!is_even.check(&3));
/// ```
pub struct Guard<T: ?Sized> {
    predicate: Box<dyn Fn(&T) -> bool + Send + Sync>,
    _phantom: PhantomData<fn(&T)>,
}

impl<T: ?Sized> Guard<T> {
    /// Create a guard from a pure predicate function.
    ///
    /// The predicate must be deterministic and thread-safe (Send + Sync).
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Guard {
            predicate: Box::new(predicate),
            _phantom: PhantomData,
        }
    }

    /// A guard that always passes.
    pub fn always() -> Self {
        Self::new(|_| true)
    }

    /// Evaluate the predicate.
    pub fn check(&self, value: &T) -> bool {
        (self.predicate)(value)
    }
}

impl<T: ?Sized> std::fmt::Debug for Guard<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guard").finish_non_exhaustive()
    }
}
