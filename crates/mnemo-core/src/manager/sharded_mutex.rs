//! Per-id mutex sharding, to bound lock contention without a map entry per id.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use tokio::sync::{Mutex, MutexGuard};

pub struct ShardedMutex {
    shards: Vec<Mutex<()>>,
}

impl ShardedMutex {
    pub fn new(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        ShardedMutex {
            shards: (0..shard_count).map(|_| Mutex::new(())).collect(),
        }
    }

    fn index_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    /// Hold the shard covering `key` for the duration of the returned guard. Two
    /// different ids may hash to the same shard and serialise unnecessarily; this is the
    /// accepted cost of bounding the lock count.
    pub async fn lock(&self, key: &str) -> MutexGuard<'_, ()> {
        self.shards[self.index_for(key)].lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_key_serialises_through_same_shard() {
        let mutex = ShardedMutex::new(4);
        let _guard = mutex.lock("a").await;
        assert_eq!(mutex.index_for("a"), mutex.index_for("a"));
    }
}
