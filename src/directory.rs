use crate::address::Address;
use crate::proxy::Proxy;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Sizing knobs for the address lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryConfig {
    buckets: usize,
    initial_capacity_per_bucket: usize,
}

impl DirectoryConfig {
    /// General-purpose sizing.
    pub const DEFAULT: Self = Self {
        buckets: 32,
        initial_capacity_per_bucket: 32,
    };

    /// A handful of actors, e.g. a unit test stage.
    pub const SMALL: Self = Self {
        buckets: 4,
        initial_capacity_per_bucket: 4,
    };

    /// Tens of thousands of live actors.
    pub const HIGH_CAPACITY: Self = Self {
        buckets: 128,
        initial_capacity_per_bucket: 8192,
    };

    pub fn new(buckets: usize, initial_capacity_per_bucket: usize) -> Self {
        Self {
            buckets: buckets.max(1),
            initial_capacity_per_bucket: initial_capacity_per_bucket.max(1),
        }
    }

    pub fn buckets(&self) -> usize {
        self.buckets
    }

    pub fn initial_capacity_per_bucket(&self) -> usize {
        self.initial_capacity_per_bucket
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A point-in-time view of directory occupancy.
#[derive(Debug, Clone)]
pub struct DirectoryStats {
    pub size: usize,
    pub distribution: Vec<usize>,
}

/// Sharded address→proxy lookup.
///
/// The directory does not own actor lifetimes; the lifecycle machine keeps
/// it in sync, inserting on `Running` entry and removing on `Stopped` entry.
/// All operations are O(1) average under per-shard guards.
pub struct Directory {
    shards: Vec<Mutex<HashMap<String, Proxy>>>,
    size: AtomicUsize,
}

impl Directory {
    pub fn new(config: DirectoryConfig) -> Self {
        let shards = (0..config.buckets())
            .map(|_| Mutex::new(HashMap::with_capacity(config.initial_capacity_per_bucket())))
            .collect();
        Self {
            shards,
            size: AtomicUsize::new(0),
        }
    }

    pub fn get(&self, address: &Address) -> Option<Proxy> {
        let key = address.to_string();
        self.shard(&key)
            .lock()
            .expect("directory shard poisoned")
            .get(&key)
            .cloned()
    }

    /// Insert or overwrite the proxy registered at an address.
    pub fn put(&self, address: &Address, proxy: Proxy) {
        let key = address.to_string();
        let previous = self
            .shard(&key)
            .lock()
            .expect("directory shard poisoned")
            .insert(key, proxy);
        if previous.is_none() {
            self.size.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Remove the registration. Returns whether the address was present.
    pub fn remove(&self, address: &Address) -> bool {
        let key = address.to_string();
        let removed = self
            .shard(&key)
            .lock()
            .expect("directory shard poisoned")
            .remove(&key)
            .is_some();
        if removed {
            self.size.fetch_sub(1, Ordering::Relaxed);
        }
        removed
    }

    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> DirectoryStats {
        let distribution = self
            .shards
            .iter()
            .map(|shard| shard.lock().expect("directory shard poisoned").len())
            .collect();
        DirectoryStats {
            size: self.size(),
            distribution,
        }
    }

    /// Snapshot of every registered proxy, in no particular order.
    pub(crate) fn all(&self) -> Vec<Proxy> {
        self.shards
            .iter()
            .flat_map(|shard| {
                shard
                    .lock()
                    .expect("directory shard poisoned")
                    .values()
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn shard(&self, key: &str) -> &Mutex<HashMap<String, Proxy>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.shards.len();
        &self.shards[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::AddressFactory;

    #[test]
    fn test_fresh_directory_is_empty() {
        let directory = Directory::new(DirectoryConfig::new(16, 8));
        let stats = directory.stats();
        assert_eq!(directory.size(), 0);
        assert_eq!(stats.size, 0);
        assert_eq!(stats.distribution.len(), 16);
        assert!(stats.distribution.iter().all(|&n| n == 0));
    }

    #[test]
    fn test_remove_absent_address_reports_missing() {
        let directory = Directory::new(DirectoryConfig::SMALL);
        let address = AddressFactory::new().unique();
        assert!(!directory.remove(&address));
        assert!(directory.get(&address).is_none());
        assert_eq!(directory.size(), 0);
    }

    #[test]
    fn test_bucket_floor_is_one() {
        let directory = Directory::new(DirectoryConfig::new(0, 0));
        assert_eq!(directory.stats().distribution.len(), 1);
    }
}
