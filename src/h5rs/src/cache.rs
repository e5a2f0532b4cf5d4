//! Metadata cache: a small per-kind LRU over decoded groups,
//! datatypes, and dataspaces, plus a single-slot cache for the superblock
//! and root group. Keyed by object header address since that is the only
//! stable identity every cached kind shares.

use std::collections::HashMap;

use crate::dataspace::Dataspace;
use crate::datatype::Datatype;
use crate::object_header::ObjectHeader;

#[derive(Debug)]
struct LruSlot<V> {
    value: V,
    last_used: u64,
}

/// A capacity-bounded cache keyed by file address, evicting the
/// least-recently-used entry (oldest `last_used` tick) once full.
#[derive(Debug)]
struct LruCache<V> {
    capacity: usize,
    entries: HashMap<u64, LruSlot<V>>,
    clock: u64,
}

impl<V> LruCache<V> {
    fn new(capacity: usize) -> Self {
        LruCache { capacity, entries: HashMap::new(), clock: 0 }
    }

    fn get(&mut self, key: u64) -> Option<&V> {
        self.clock += 1;
        let clock = self.clock;
        if let Some(slot) = self.entries.get_mut(&key) {
            slot.last_used = clock;
            Some(&self.entries.get(&key).unwrap().value)
        } else {
            None
        }
    }

    fn insert(&mut self, key: u64, value: V) {
        self.clock += 1;
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            if let Some((&oldest_key, _)) = self.entries.iter().min_by_key(|(_, slot)| slot.last_used) {
                self.entries.remove(&oldest_key);
            }
        }
        self.entries.insert(key, LruSlot { value, last_used: self.clock });
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

pub struct MetadataCache {
    groups: LruCache<ObjectHeader>,
    datatypes: LruCache<Datatype>,
    dataspaces: LruCache<Dataspace>,
    superblock_root: Option<(u64, ObjectHeader)>,
}

const DEFAULT_CAPACITY: usize = 128;

impl MetadataCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        MetadataCache {
            groups: LruCache::new(capacity),
            datatypes: LruCache::new(capacity),
            dataspaces: LruCache::new(capacity),
            superblock_root: None,
        }
    }

    pub fn get_group(&mut self, address: u64) -> Option<&ObjectHeader> {
        self.groups.get(address)
    }

    pub fn insert_group(&mut self, address: u64, header: ObjectHeader) {
        self.groups.insert(address, header);
    }

    pub fn get_datatype(&mut self, address: u64) -> Option<&Datatype> {
        self.datatypes.get(address)
    }

    pub fn insert_datatype(&mut self, address: u64, datatype: Datatype) {
        self.datatypes.insert(address, datatype);
    }

    pub fn get_dataspace(&mut self, address: u64) -> Option<&Dataspace> {
        self.dataspaces.get(address)
    }

    pub fn insert_dataspace(&mut self, address: u64, dataspace: Dataspace) {
        self.dataspaces.insert(address, dataspace);
    }

    pub fn cache_root_group(&mut self, address: u64, header: ObjectHeader) {
        self.superblock_root = Some((address, header));
    }

    pub fn root_group(&self, address: u64) -> Option<&ObjectHeader> {
        self.superblock_root.as_ref().filter(|(cached_addr, _)| *cached_addr == address).map(|(_, header)| header)
    }

    pub fn len(&self) -> (usize, usize, usize) {
        (self.groups.len(), self.datatypes.len(), self.dataspaces.len())
    }
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_entry_once_full() {
        let mut cache: LruCache<u8> = LruCache::new(2);
        cache.insert(1, 1);
        cache.insert(2, 2);
        cache.get(1); // touch 1, so 2 becomes the oldest
        cache.insert(3, 3);
        assert!(cache.get(2).is_none());
        assert!(cache.get(1).is_some());
        assert!(cache.get(3).is_some());
    }

    #[test]
    fn root_group_cache_is_keyed_by_address() {
        let mut cache = MetadataCache::new();
        cache.cache_root_group(100, ObjectHeader::new());
        assert!(cache.root_group(100).is_some());
        assert!(cache.root_group(200).is_none());
    }
}
