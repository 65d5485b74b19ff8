use roaring::RoaringBitmap;
use std::sync::Arc;

use crate::index::bloom::BloomFilter;
use crate::index::dictionary::MutableDictionary;
use crate::index::forward::ForwardIndex;
use crate::index::inverted::RealtimeInvertedIndex;
use crate::schema::schema::FieldSpec;
use crate::segment::virtual_column::VirtualColumnReader;

/// Readers backing one column view
pub enum ColumnIndexes {
    Physical {
        forward: Arc<ForwardIndex>,
        inverted: Option<Arc<RealtimeInvertedIndex>>,
        dictionary: Option<Arc<MutableDictionary>>,
        bloom_filter: Option<Arc<BloomFilter>>,
    },
    Virtual {
        reader: Arc<dyn VirtualColumnReader>,
    },
}

/// Read-only per-column view handed to the query side.
///
/// `num_docs` is the visibility-counter sample taken when the view was
/// created; every traversal through this view is bounded by it.
pub struct ColumnDataSource {
    pub field_spec: FieldSpec,
    pub num_docs: u32,
    pub max_num_multi_values: u32,
    pub indexes: ColumnIndexes,
}

impl ColumnDataSource {
    pub fn is_virtual(&self) -> bool {
        matches!(self.indexes, ColumnIndexes::Virtual { .. })
    }

    pub fn forward_index(&self) -> Option<&Arc<ForwardIndex>> {
        match &self.indexes {
            ColumnIndexes::Physical { forward, .. } => Some(forward),
            ColumnIndexes::Virtual { .. } => None,
        }
    }

    pub fn dictionary(&self) -> Option<&Arc<MutableDictionary>> {
        match &self.indexes {
            ColumnIndexes::Physical { dictionary, .. } => dictionary.as_ref(),
            ColumnIndexes::Virtual { .. } => None,
        }
    }

    pub fn inverted_index(&self) -> Option<&Arc<RealtimeInvertedIndex>> {
        match &self.indexes {
            ColumnIndexes::Physical { inverted, .. } => inverted.as_ref(),
            ColumnIndexes::Virtual { .. } => None,
        }
    }

    pub fn bloom_filter(&self) -> Option<&Arc<BloomFilter>> {
        match &self.indexes {
            ColumnIndexes::Physical { bloom_filter, .. } => bloom_filter.as_ref(),
            ColumnIndexes::Virtual { .. } => None,
        }
    }

    /// Posting list for `dict_id`, bounded by this view's counter sample
    pub fn doc_ids_for(&self, dict_id: u32) -> Option<RoaringBitmap> {
        self.inverted_index()
            .map(|index| index.doc_ids_up_to(dict_id, self.num_docs))
    }
}
