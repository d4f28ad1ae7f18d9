//! Atomic, hot-swappable field slots.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Identity of a [`Watched`] slot, stable across clones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldToken(u64);

/// A field whose value is replaced as a whole.
///
/// Readers get the current `Arc<T>` without locking; a writer builds a new
/// value and swaps it in. A slot may stay empty until first loaded.
pub struct Watched<T> {
    token: FieldToken,
    cell: Arc<ArcSwapOption<T>>,
}

impl<T> Watched<T> {
    /// An empty slot with a fresh token.
    pub fn new() -> Self {
        Self {
            token: FieldToken(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed)),
            cell: Arc::new(ArcSwapOption::empty()),
        }
    }

    pub fn token(&self) -> FieldToken {
        self.token
    }

    /// Current value, if any.
    pub fn load(&self) -> Option<Arc<T>> {
        self.cell.load_full()
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.load().is_some()
    }

    /// Publish a new value.
    pub fn store(&self, value: Arc<T>) {
        self.cell.store(Some(value));
    }
}

impl<T> Clone for Watched<T> {
    fn clone(&self) -> Self {
        Self {
            token: self.token,
            cell: self.cell.clone(),
        }
    }
}

impl<T> Default for Watched<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Watched<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watched")
            .field("token", &self.token)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_unique_and_shared_by_clones() {
        let a: Watched<u32> = Watched::new();
        let b: Watched<u32> = Watched::default();
        assert_ne!(a.token(), b.token());

        let c = a.clone();
        assert_eq!(a.token(), c.token());
        c.store(Arc::new(7));
        assert_eq!(*a.load().unwrap(), 7);
    }

    #[test]
    fn test_empty_until_stored() {
        let slot: Watched<String> = Watched::new();
        assert!(!slot.is_loaded());
        assert!(slot.load().is_none());
        slot.store(Arc::new("v".into()));
        assert!(slot.is_loaded());
    }
}
