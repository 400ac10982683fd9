//! Device membership cache owned by the discovery tracker

use std::collections::HashSet;
use std::num::NonZeroUsize;

use lru::LruCache;

/// Names of devices whose announcement already succeeded
///
/// Unbounded by default. With a capacity the least recently seen device is
/// evicted first and will be announced again the next time it shows up.
#[derive(Debug)]
pub enum DeviceCache {
    Unbounded(HashSet<String>),
    Bounded(LruCache<String, ()>),
}

impl DeviceCache {
    /// `None` or `Some(0)` yields the unbounded set
    pub fn new(capacity: Option<usize>) -> Self {
        match capacity.and_then(NonZeroUsize::new) {
            Some(capacity) => Self::Bounded(LruCache::new(capacity)),
            None => Self::Unbounded(HashSet::new()),
        }
    }

    /// Membership check; refreshes recency in bounded mode
    pub fn contains(&mut self, device: &str) -> bool {
        match self {
            Self::Unbounded(set) => set.contains(device),
            Self::Bounded(lru) => lru.get(device).is_some(),
        }
    }

    pub fn insert(&mut self, device: String) {
        match self {
            Self::Unbounded(set) => {
                set.insert(device);
            }
            Self::Bounded(lru) => {
                lru.put(device, ());
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Unbounded(set) => set.len(),
            Self::Bounded(lru) => lru.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
