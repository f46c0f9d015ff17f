//! Caching layer for decoded blocks
//!
//! Blocks are immutable and keyed by their own hash, so a cached entry never goes
//! stale; eviction only bounds memory.
use crate::blockchain::{Block, Sha256Hash};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

/// Thread-safe LRU cache of recently decoded blocks
pub struct BlockCache {
    cache: Mutex<LruCache<Sha256Hash, Arc<Block>>>,
}

impl BlockCache {
    pub const DEFAULT_CAPACITY: usize = 100;

    pub fn new(capacity: usize) -> Self {
        // A zero capacity still caches one block.
        let capacity_nz = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity_nz)),
        }
    }

    pub fn get(&self, hash: &Sha256Hash) -> Option<Arc<Block>> {
        let mut cache = self.cache.lock().ok()?;
        cache.get(hash).cloned()
    }

    pub fn put(&self, hash: Sha256Hash, block: Arc<Block>) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(hash, block);
        }
    }

    pub fn len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.cache.lock().map(|c| c.cap().get()).unwrap_or(0)
    }

    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }
}

impl Default for BlockCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Transaction;

    fn block(nonce: u64) -> Arc<Block> {
        Arc::new(Block::from_parts(1_700_000_000, vec![Transaction::genesis()], None, [nonce as u8; 32], nonce))
    }

    #[test]
    fn test_block_cache() {
        let cache = BlockCache::new(10);
        let b = block(1);
        cache.put(*b.hash(), b.clone());

        let retrieved = cache.get(b.hash());
        assert!(retrieved.is_some());
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lru_eviction() {
        let cache = BlockCache::new(2);
        let (a, b, c) = (block(1), block(2), block(3));
        cache.put(*a.hash(), a.clone());
        cache.put(*b.hash(), b.clone());
        cache.put(*c.hash(), c.clone());

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.capacity(), 2);
        assert!(cache.get(a.hash()).is_none());
        assert!(cache.get(c.hash()).is_some());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        assert_eq!(BlockCache::new(0).capacity(), 1);
    }
}
