use parking_lot::RwLock;
use std::sync::Arc;

use crate::core::error::{Error, ErrorKind, Result};
use crate::memory::manager::{MemoryManager, MemoryRegion};

/// Hard cap on values per row in a multi-value column
pub const MAX_MULTI_VALUES_PER_ROW: usize = 1000;

const MIN_CHUNK_BYTES: usize = 16 * 1024;
const HEADER_ENTRY_BYTES: usize = 12;

/// Fixed-width forward index: one slot per doc id.
///
/// Slot width is the raw type width for no-dictionary columns and 4
/// bytes (the dict id) otherwise. Slots are written once by the single
/// ingestion thread before the doc becomes visible; metric aggregation
/// rewrites slots only for already-visible docs.
pub struct FixedByteForwardIndex {
    region: Arc<MemoryRegion>,
    width: usize,
    capacity: u32,
}

impl FixedByteForwardIndex {
    pub fn new(
        capacity: u32,
        width: usize,
        manager: &Arc<MemoryManager>,
        context: &str,
    ) -> Result<Self> {
        let region = manager.allocate(capacity as usize * width, context)?;
        Ok(FixedByteForwardIndex {
            region,
            width,
            capacity,
        })
    }

    #[inline]
    fn offset(&self, doc_id: u32) -> usize {
        assert!(doc_id < self.capacity, "doc id {} out of range", doc_id);
        doc_id as usize * self.width
    }

    pub fn set_i32(&self, doc_id: u32, value: i32) {
        self.region.write_i32(self.offset(doc_id), value)
    }

    pub fn get_i32(&self, doc_id: u32) -> i32 {
        self.region.read_i32(self.offset(doc_id))
    }

    pub fn set_i64(&self, doc_id: u32, value: i64) {
        self.region.write_i64(self.offset(doc_id), value)
    }

    pub fn get_i64(&self, doc_id: u32) -> i64 {
        self.region.read_i64(self.offset(doc_id))
    }

    pub fn set_f32(&self, doc_id: u32, value: f32) {
        self.region.write_f32(self.offset(doc_id), value)
    }

    pub fn get_f32(&self, doc_id: u32) -> f32 {
        self.region.read_f32(self.offset(doc_id))
    }

    pub fn set_f64(&self, doc_id: u32, value: f64) {
        self.region.write_f64(self.offset(doc_id), value)
    }

    pub fn get_f64(&self, doc_id: u32) -> f64 {
        self.region.read_f64(self.offset(doc_id))
    }

    /// Dictionary id stored at `doc_id`
    pub fn get_dict_id(&self, doc_id: u32) -> u32 {
        self.get_i32(doc_id) as u32
    }

    pub fn set_dict_id(&self, doc_id: u32, dict_id: u32) {
        self.set_i32(doc_id, dict_id as i32)
    }
}

struct MultiValueState {
    chunks: Vec<Arc<MemoryRegion>>,
    write_offset: usize,
}

/// Two-level multi-value forward index: a fixed header region keyed by
/// doc id holding (chunk, start, len), and payload chunks of packed
/// i32 dict ids growing geometrically.
pub struct MultiValueForwardIndex {
    header: Arc<MemoryRegion>,
    state: RwLock<MultiValueState>,
    capacity: u32,
    manager: Arc<MemoryManager>,
    context: String,
}

impl MultiValueForwardIndex {
    pub fn new(
        capacity: u32,
        avg_num_values: u32,
        manager: &Arc<MemoryManager>,
        context: &str,
    ) -> Result<Self> {
        let header = manager.allocate(capacity as usize * HEADER_ENTRY_BYTES, context)?;
        let chunk_bytes = (avg_num_values.max(1) as usize * 2048 * 4).max(MIN_CHUNK_BYTES);
        let chunk = manager.allocate(chunk_bytes, context)?;
        Ok(MultiValueForwardIndex {
            header,
            state: RwLock::new(MultiValueState {
                chunks: vec![chunk],
                write_offset: 0,
            }),
            capacity,
            manager: manager.clone(),
            context: context.to_string(),
        })
    }

    /// Store the dict ids for `doc_id`. Must be called at most once per
    /// doc id, before the doc is published.
    pub fn set_dict_ids(&self, doc_id: u32, dict_ids: &[u32]) -> Result<()> {
        assert!(doc_id < self.capacity, "doc id {} out of range", doc_id);
        if dict_ids.len() > MAX_MULTI_VALUES_PER_ROW {
            return Err(Error::new(
                ErrorKind::Capacity,
                format!(
                    "Row has {} values in a multi-value column, cap is {}",
                    dict_ids.len(),
                    MAX_MULTI_VALUES_PER_ROW
                ),
            ));
        }
        let needed = dict_ids.len() * 4;
        let mut state = self.state.write();
        let mut chunk_idx = state.chunks.len() - 1;
        if needed > state.chunks[chunk_idx].len() - state.write_offset {
            let next_size = (state.chunks[chunk_idx].len() * 2).max(needed);
            let chunk = self.manager.allocate(next_size, &self.context)?;
            state.chunks.push(chunk);
            state.write_offset = 0;
            chunk_idx += 1;
        }
        let start = state.write_offset;
        let chunk = &state.chunks[chunk_idx];
        for (i, dict_id) in dict_ids.iter().enumerate() {
            chunk.write_i32(start + i * 4, *dict_id as i32);
        }
        state.write_offset = start + needed;
        let header_offset = doc_id as usize * HEADER_ENTRY_BYTES;
        self.header.write_i32(header_offset, chunk_idx as i32);
        self.header.write_i32(header_offset + 4, start as i32);
        self.header.write_i32(header_offset + 8, dict_ids.len() as i32);
        Ok(())
    }

    /// Dict ids stored for `doc_id`, in insertion order
    pub fn get_dict_ids(&self, doc_id: u32) -> Vec<u32> {
        assert!(doc_id < self.capacity, "doc id {} out of range", doc_id);
        let header_offset = doc_id as usize * HEADER_ENTRY_BYTES;
        let chunk_idx = self.header.read_i32(header_offset) as usize;
        let start = self.header.read_i32(header_offset + 4) as usize;
        let len = self.header.read_i32(header_offset + 8) as usize;
        let state = self.state.read();
        let chunk = &state.chunks[chunk_idx];
        (0..len)
            .map(|i| chunk.read_i32(start + i * 4) as u32)
            .collect()
    }

    pub fn num_values(&self, doc_id: u32) -> u32 {
        self.header.read_i32(doc_id as usize * HEADER_ENTRY_BYTES + 8) as u32
    }
}

/// Per-column forward index, single- or multi-value
pub enum ForwardIndex {
    SingleValue(FixedByteForwardIndex),
    MultiValue(MultiValueForwardIndex),
}

impl ForwardIndex {
    pub fn expect_single(&self) -> Result<&FixedByteForwardIndex> {
        match self {
            ForwardIndex::SingleValue(index) => Ok(index),
            ForwardIndex::MultiValue(_) => Err(Error::new(
                ErrorKind::Internal,
                "Expected single-value forward index".to_string(),
            )),
        }
    }

    pub fn expect_multi(&self) -> Result<&MultiValueForwardIndex> {
        match self {
            ForwardIndex::MultiValue(index) => Ok(index),
            ForwardIndex::SingleValue(_) => Err(Error::new(
                ErrorKind::Internal,
                "Expected multi-value forward index".to_string(),
            )),
        }
    }
}
