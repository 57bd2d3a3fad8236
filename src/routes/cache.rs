// Route cache - fixed-size chained hash table keyed by (destination, interface)

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::{RouteEntry, RouteKey};

pub const DEFAULT_BUCKETS: usize = 128;

/// What `insert` does when an entry with the same key is already cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Keep every insert as its own chain node (multi-path tolerant).
    #[default]
    Keep,
    /// Drop the previous entry for the key before inserting.
    Replace,
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "keep" => Ok(DuplicatePolicy::Keep),
            "replace" => Ok(DuplicatePolicy::Replace),
            _ => Err(format!("Invalid duplicate policy: {}", s)),
        }
    }
}

/// Store of observed routes.
///
/// The bucket count is fixed at construction. Each bucket is a chain kept in
/// insertion order, so the most recently inserted node sits at the end and is
/// the first one a lookup walking the chain backwards meets.
///
/// The cache has no interior locking: it is owned by the single dispatcher
/// loop and mutated through `&mut self`. Sharing it across threads requires
/// wrapping it in a `Mutex`, since a scan must never observe a chain being
/// mutated.
#[derive(Debug)]
pub struct RouteCache {
    buckets: Vec<Vec<RouteEntry>>,
    policy: DuplicatePolicy,
    len: usize,
}

impl Default for RouteCache {
    fn default() -> Self {
        RouteCache::new(DEFAULT_BUCKETS, DuplicatePolicy::default())
    }
}

impl RouteCache {
    /// Create an empty cache. A bucket count of zero is bumped to one.
    pub fn new(bucket_count: usize, policy: DuplicatePolicy) -> Self {
        let bucket_count = bucket_count.max(1);
        RouteCache {
            buckets: (0..bucket_count).map(|_| Vec::new()).collect(),
            policy,
            len: 0,
        }
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Add an observed route. Never fails.
    pub fn insert(&mut self, entry: RouteEntry) {
        if self.policy == DuplicatePolicy::Replace {
            self.remove(&entry.destination, entry.interface_index);
        }

        let index = self.bucket_for(&entry.destination, entry.interface_index);
        self.buckets[index].push(entry);
        self.len += 1;
    }

    /// Remove the most recently inserted entry matching the key exactly.
    ///
    /// Returns the removed entry, or `None` when nothing matched. A miss is a
    /// normal race with the kernel and not an error.
    pub fn remove(&mut self, destination: &str, interface_index: Option<u32>) -> Option<RouteEntry> {
        let key = RouteKey {
            destination,
            interface_index,
        };
        let index = self.bucket_for(destination, interface_index);
        let chain = &mut self.buckets[index];

        let position = chain.iter().rposition(|entry| entry.key() == key)?;
        self.len -= 1;
        Some(chain.remove(position))
    }

    /// Invoke `visit` for every cached route owned by `interface_index`.
    ///
    /// Routes with an unknown owner never match.
    pub fn find_by_interface<F>(&self, interface_index: u32, mut visit: F)
    where
        F: FnMut(&RouteEntry),
    {
        for entry in self.routes_on(interface_index) {
            visit(entry);
        }
    }

    /// Lazy sequence of the routes owned by `interface_index`.
    pub fn routes_on(&self, interface_index: u32) -> impl Iterator<Item = &RouteEntry> + '_ {
        self.iter()
            .filter(move |entry| entry.interface_index == Some(interface_index))
    }

    /// Every cached route, bucket by bucket.
    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> + '_ {
        self.buckets.iter().flat_map(|chain| chain.iter().rev())
    }

    fn bucket_for(&self, destination: &str, interface_index: Option<u32>) -> usize {
        bucket_index(destination, interface_index, self.buckets.len())
    }
}

/// Multiplicative string hash folded with the interface index.
///
/// An unknown interface folds in as `u32::MAX`.
fn bucket_index(destination: &str, interface_index: Option<u32>, bucket_count: usize) -> usize {
    let mut hash: u32 = 0;
    for byte in destination.bytes() {
        hash = hash.wrapping_mul(31).wrapping_add(u32::from(byte));
    }
    hash = hash.wrapping_add(interface_index.unwrap_or(u32::MAX));

    hash as usize % bucket_count
}
