//! Cache key: `(flat-file handle, logical queue-offset)`, compared by handle
//! *identity* rather than value (§3) so that handles for different queues
//! never collide even if other fields happened to coincide.

use crate::flatfile::FlatFileState;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

#[derive(Clone)]
pub struct CacheKey {
    pub flat_file: Arc<FlatFileState>,
    pub offset: i64,
}

impl CacheKey {
    pub fn new(flat_file: Arc<FlatFileState>, offset: i64) -> Self {
        Self { flat_file, offset }
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.flat_file, &other.flat_file) && self.offset == other.offset
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.flat_file) as usize).hash(state);
        self.offset.hash(state);
    }
}

impl std::fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheKey")
            .field("flat_file", &(Arc::as_ptr(&self.flat_file) as usize))
            .field("offset", &self.offset)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_state() -> Arc<FlatFileState> {
        Arc::new(FlatFileState::for_test())
    }

    #[test]
    fn keys_with_same_handle_and_offset_are_equal() {
        let handle = dummy_state();
        let a = CacheKey::new(handle.clone(), 5);
        let b = CacheKey::new(handle, 5);
        assert_eq!(a, b);
    }

    #[test]
    fn keys_with_different_handles_never_collide() {
        let a = CacheKey::new(dummy_state(), 5);
        let b = CacheKey::new(dummy_state(), 5);
        assert_ne!(a, b);
    }

    #[test]
    fn keys_with_same_handle_different_offset_differ() {
        let handle = dummy_state();
        let a = CacheKey::new(handle.clone(), 5);
        let b = CacheKey::new(handle, 6);
        assert_ne!(a, b);
    }
}
