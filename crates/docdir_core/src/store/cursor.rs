//! Lazy per-element mapping over store cursors.

use crate::store::{DocumentCursor, StoreResult};

/// Decorates a cursor with a transformation applied on demand.
///
/// Nothing is transformed until the element is pulled, so mapping a large
/// result set never materializes it.
pub struct LazyMappedCursor<C, F> {
    inner: C,
    transform: F,
}

impl<C, F> LazyMappedCursor<C, F> {
    pub fn new(inner: C, transform: F) -> Self {
        Self { inner, transform }
    }

    pub fn into_inner(self) -> C {
        self.inner
    }
}

impl<C: DocumentCursor, F> LazyMappedCursor<C, F> {
    /// Delegates to the inner cursor when it is countable, else reports 0.
    pub fn total_count(&self) -> StoreResult<u64> {
        self.inner.total().unwrap_or(Ok(0))
    }
}

impl<C, F, T> Iterator for LazyMappedCursor<C, F>
where
    C: Iterator,
    F: FnMut(C::Item) -> T,
{
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.inner.next().map(&mut self.transform)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
