use parking_lot::RwLock;
use roaring::RoaringBitmap;

/// Realtime inverted index: dict id -> compressed bitmap of doc ids.
///
/// The single ingestion thread appends; readers take bitmap snapshots
/// and iterate in ascending doc-id order, bounded by the visibility
/// counter they sampled at snapshot time.
pub struct RealtimeInvertedIndex {
    bitmaps: RwLock<Vec<RoaringBitmap>>,
}

impl RealtimeInvertedIndex {
    pub fn new() -> Self {
        RealtimeInvertedIndex {
            bitmaps: RwLock::new(Vec::new()),
        }
    }

    pub fn add(&self, dict_id: u32, doc_id: u32) {
        let mut bitmaps = self.bitmaps.write();
        let idx = dict_id as usize;
        if idx >= bitmaps.len() {
            bitmaps.resize_with(idx + 1, RoaringBitmap::new);
        }
        bitmaps[idx].insert(doc_id);
    }

    /// Snapshot of the posting list for `dict_id`
    pub fn doc_ids(&self, dict_id: u32) -> RoaringBitmap {
        let bitmaps = self.bitmaps.read();
        bitmaps.get(dict_id as usize).cloned().unwrap_or_default()
    }

    /// Snapshot truncated to doc ids below `bound`, so iteration never
    /// yields a doc the caller has not observed as published
    pub fn doc_ids_up_to(&self, dict_id: u32, bound: u32) -> RoaringBitmap {
        let mut bitmap = self.doc_ids(dict_id);
        bitmap.remove_range(bound..);
        bitmap
    }

    /// Number of dict ids with a posting list
    pub fn len(&self) -> u32 {
        self.bitmaps.read().len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.bitmaps.read().is_empty()
    }
}

impl Default for RealtimeInvertedIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postings_are_sorted_and_snapshotted() {
        let index = RealtimeInvertedIndex::new();
        index.add(0, 2);
        index.add(0, 0);
        index.add(1, 1);
        index.add(0, 5);
        assert_eq!(index.doc_ids(0).iter().collect::<Vec<_>>(), vec![0, 2, 5]);
        assert_eq!(index.doc_ids(1).iter().collect::<Vec<_>>(), vec![1]);
        // A snapshot does not track later writes
        let snapshot = index.doc_ids(0);
        index.add(0, 9);
        assert!(!snapshot.contains(9));
        assert!(index.doc_ids(0).contains(9));
    }

    #[test]
    fn unknown_dict_id_is_empty() {
        let index = RealtimeInvertedIndex::new();
        assert!(index.doc_ids(42).is_empty());
    }

    #[test]
    fn bounded_snapshot_truncates() {
        let index = RealtimeInvertedIndex::new();
        for doc_id in [0, 3, 7, 8] {
            index.add(2, doc_id);
        }
        let bounded = index.doc_ids_up_to(2, 7);
        assert_eq!(bounded.iter().collect::<Vec<_>>(), vec![0, 3]);
    }
}
