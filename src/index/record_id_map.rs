use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::warn;

use crate::core::error::Result;
use crate::memory::manager::{MemoryManager, MemoryRegion};

/// Fixed-length vector of dictionary ids: the aggregation key
/// `[dimDictId_1, .., dimDictId_k, timeDictId]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FixedIntArray(pub Vec<i32>);

impl FixedIntArray {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn hash_value(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.0.hash(&mut hasher);
        hasher.finish()
    }
}

// Entries never fill the main table beyond this share of its slots
const MAX_LOAD_NUM: usize = 3;
const MAX_LOAD_DEN: usize = 4;

struct Inner {
    region: Arc<MemoryRegion>,
    main_count: usize,
    overflow: HashMap<FixedIntArray, u32>,
    overflow_warned: bool,
}

/// Off-heap map from a fixed-length dict-id key to the doc id that
/// first carried it. Open addressing with linear probing in a single
/// region; an on-heap overflow map takes inserts once the main table
/// reaches its load limit.
///
/// Slot layout: `[docId+1 (0 = empty)][key ints...]`, so the
/// zero-initialized region needs no pre-fill pass.
pub struct RecordIdMap {
    key_len: usize,
    num_slots: usize,
    max_overflow_size: usize,
    inner: Mutex<Inner>,
}

impl RecordIdMap {
    pub fn new(
        key_len: usize,
        estimated_rows: u32,
        max_overflow_size: u32,
        manager: &Arc<MemoryManager>,
        context: &str,
    ) -> Result<Self> {
        let num_slots = (estimated_rows as usize * 2).max(16);
        let slot_bytes = (1 + key_len) * 4;
        let region = manager.allocate(num_slots * slot_bytes, context)?;
        Ok(RecordIdMap {
            key_len,
            num_slots,
            max_overflow_size: max_overflow_size as usize,
            inner: Mutex::new(Inner {
                region,
                main_count: 0,
                overflow: HashMap::new(),
                overflow_warned: false,
            }),
        })
    }

    fn slot_bytes(&self) -> usize {
        (1 + self.key_len) * 4
    }

    fn key_matches(&self, region: &MemoryRegion, slot_offset: usize, key: &FixedIntArray) -> bool {
        (0..self.key_len).all(|i| region.read_i32(slot_offset + 4 + i * 4) == key.0[i])
    }

    /// Doc id bound to `key`, inserting `next_doc_id` if absent.
    /// Returns the existing doc id on a hit, `next_doc_id` on a miss.
    pub fn put(&self, key: &FixedIntArray, next_doc_id: u32) -> u32 {
        debug_assert_eq!(key.len(), self.key_len);
        let mut inner = self.inner.lock();
        let slot_bytes = self.slot_bytes();
        let start_slot = (key.hash_value() % self.num_slots as u64) as usize;
        for probe in 0..self.num_slots {
            let slot = (start_slot + probe) % self.num_slots;
            let offset = slot * slot_bytes;
            let stored = inner.region.read_i32(offset);
            if stored == 0 {
                // Key absent from the main table; the overflow map is
                // authoritative once inserts spill there
                if let Some(&doc_id) = inner.overflow.get(key) {
                    return doc_id;
                }
                if inner.main_count < self.num_slots * MAX_LOAD_NUM / MAX_LOAD_DEN {
                    inner.region.write_i32(offset, next_doc_id as i32 + 1);
                    for (i, v) in key.0.iter().enumerate() {
                        inner.region.write_i32(offset + 4 + i * 4, *v);
                    }
                    inner.main_count += 1;
                } else {
                    inner.overflow.insert(key.clone(), next_doc_id);
                    if inner.overflow.len() > self.max_overflow_size && !inner.overflow_warned {
                        warn!(
                            overflow = inner.overflow.len(),
                            cap = self.max_overflow_size,
                            "Record-id overflow map exceeded its sizing estimate"
                        );
                        inner.overflow_warned = true;
                    }
                }
                return next_doc_id;
            }
            if self.key_matches(&inner.region, offset, key) {
                return (stored - 1) as u32;
            }
        }
        // Main table fully probed (cannot happen below the load limit);
        // fall back to the overflow map
        if let Some(&doc_id) = inner.overflow.get(key) {
            return doc_id;
        }
        inner.overflow.insert(key.clone(), next_doc_id);
        next_doc_id
    }

    /// Number of distinct keys bound so far
    pub fn size(&self) -> u32 {
        let inner = self.inner.lock();
        (inner.main_count + inner.overflow.len()) as u32
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        let len = inner.region.len();
        let mut offset = 0;
        while offset + 8 <= len {
            inner.region.write_i64(offset, 0);
            offset += 8;
        }
        while offset < len {
            inner.region.write_bytes(offset, &[0]);
            offset += 1;
        }
        inner.main_count = 0;
        inner.overflow.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::manager::MemoryManager;

    fn map(estimated_rows: u32) -> RecordIdMap {
        let manager = Arc::new(MemoryManager::new(true));
        RecordIdMap::new(3, estimated_rows, 4, &manager, "seg:__recordIdMap__").unwrap()
    }

    fn key(a: i32, b: i32, c: i32) -> FixedIntArray {
        FixedIntArray(vec![a, b, c])
    }

    #[test]
    fn put_binds_first_doc_id() {
        let m = map(100);
        assert_eq!(m.put(&key(0, 1, 2), 0), 0);
        assert_eq!(m.put(&key(0, 1, 3), 1), 1);
        // Same key resolves to the original doc id
        assert_eq!(m.put(&key(0, 1, 2), 2), 0);
        assert_eq!(m.size(), 2);
    }

    #[test]
    fn zero_key_is_distinguished_from_empty_slots() {
        let m = map(100);
        assert_eq!(m.put(&key(0, 0, 0), 0), 0);
        assert_eq!(m.put(&key(0, 0, 0), 1), 0);
        assert_eq!(m.size(), 1);
    }

    #[test]
    fn spills_to_overflow_under_load() {
        // 16 slots, load limit 12
        let m = map(1);
        for i in 0..64 {
            assert_eq!(m.put(&key(i, i, i), i as u32), i as u32);
        }
        for i in 0..64 {
            assert_eq!(m.put(&key(i, i, i), 999), i as u32);
        }
        assert_eq!(m.size(), 64);
    }

    #[test]
    fn clear_resets_all_bindings() {
        let m = map(100);
        m.put(&key(1, 2, 3), 0);
        m.put(&key(4, 5, 6), 1);
        m.clear();
        assert_eq!(m.size(), 0);
        assert_eq!(m.put(&key(1, 2, 3), 7), 7);
    }
}
