use memmap2::MmapMut;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::error::{Error, ErrorKind, Result};

enum Backing {
    Mapped(MmapMut),
    Heap(Box<[u8]>),
}

/// A named, zero-initialized byte region handed out by the memory manager.
///
/// Slots are written by the single ingestion thread and read by query
/// threads; a slot read is only legal for doc ids below the segment's
/// published visibility counter, whose release store happens after the
/// slot write. All typed accessors are unaligned.
pub struct MemoryRegion {
    _backing: Backing,
    ptr: *mut u8,
    len: usize,
    context: String,
}

unsafe impl Send for MemoryRegion {}
unsafe impl Sync for MemoryRegion {}

impl MemoryRegion {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    #[inline]
    fn check(&self, offset: usize, width: usize) {
        assert!(
            offset + width <= self.len,
            "Region {} access out of bounds: offset {} width {} len {}",
            self.context,
            offset,
            width,
            self.len
        );
    }

    pub fn write_i32(&self, offset: usize, value: i32) {
        self.check(offset, 4);
        unsafe { std::ptr::write_unaligned(self.ptr.add(offset) as *mut i32, value) }
    }

    pub fn read_i32(&self, offset: usize) -> i32 {
        self.check(offset, 4);
        unsafe { std::ptr::read_unaligned(self.ptr.add(offset) as *const i32) }
    }

    pub fn write_i64(&self, offset: usize, value: i64) {
        self.check(offset, 8);
        unsafe { std::ptr::write_unaligned(self.ptr.add(offset) as *mut i64, value) }
    }

    pub fn read_i64(&self, offset: usize) -> i64 {
        self.check(offset, 8);
        unsafe { std::ptr::read_unaligned(self.ptr.add(offset) as *const i64) }
    }

    pub fn write_f32(&self, offset: usize, value: f32) {
        self.write_i32(offset, value.to_bits() as i32)
    }

    pub fn read_f32(&self, offset: usize) -> f32 {
        f32::from_bits(self.read_i32(offset) as u32)
    }

    pub fn write_f64(&self, offset: usize, value: f64) {
        self.write_i64(offset, value.to_bits() as i64)
    }

    pub fn read_f64(&self, offset: usize) -> f64 {
        f64::from_bits(self.read_i64(offset) as u64)
    }

    pub fn write_bytes(&self, offset: usize, src: &[u8]) {
        self.check(offset, src.len());
        unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), self.ptr.add(offset), src.len()) }
    }

    pub fn read_bytes(&self, offset: usize, len: usize) -> &[u8] {
        self.check(offset, len);
        unsafe { std::slice::from_raw_parts(self.ptr.add(offset), len) }
    }
}

/// Allocator of named off-heap byte regions for one segment.
///
/// Owned by the segment, shared with its index structures via `Arc`.
/// `close` drops the manager's handles; regions stay alive until the
/// structures holding them are dropped as well.
pub struct MemoryManager {
    off_heap: bool,
    regions: Mutex<Vec<Arc<MemoryRegion>>>,
    total_bytes: AtomicUsize,
}

impl MemoryManager {
    pub fn new(off_heap: bool) -> Self {
        MemoryManager {
            off_heap,
            regions: Mutex::new(Vec::new()),
            total_bytes: AtomicUsize::new(0),
        }
    }

    pub fn is_off_heap(&self) -> bool {
        self.off_heap
    }

    /// Allocate a zero-initialized region of `size` bytes.
    ///
    /// `context` follows `<segmentName>:<columnName><indexKind>` and is
    /// used for observability only.
    pub fn allocate(&self, size: usize, context: &str) -> Result<Arc<MemoryRegion>> {
        if size == 0 {
            return Err(Error::new(
                ErrorKind::Internal,
                format!("Zero-sized allocation requested for {}", context),
            ));
        }
        let (backing, ptr) = if self.off_heap {
            let mut map = MmapMut::map_anon(size).map_err(|e| {
                Error::new(
                    ErrorKind::OutOfMemory,
                    format!("Failed to map {} bytes for {}: {}", size, context, e),
                )
            })?;
            let ptr = map.as_mut_ptr();
            (Backing::Mapped(map), ptr)
        } else {
            let mut buf = vec![0u8; size].into_boxed_slice();
            let ptr = buf.as_mut_ptr();
            (Backing::Heap(buf), ptr)
        };
        let region = Arc::new(MemoryRegion {
            _backing: backing,
            ptr,
            len: size,
            context: context.to_string(),
        });
        self.total_bytes.fetch_add(size, Ordering::Relaxed);
        self.regions.lock().push(Arc::clone(&region));
        debug!(context, size, "Allocated region");
        Ok(region)
    }

    pub fn total_allocated_bytes(&self) -> usize {
        self.total_bytes.load(Ordering::Relaxed)
    }

    /// Release the manager's hold on every region
    pub fn close(&self) {
        let mut regions = self.regions.lock();
        info!(
            regions = regions.len(),
            total_bytes = self.total_bytes.load(Ordering::Relaxed),
            "Closing memory manager"
        );
        regions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_round_trips() {
        for off_heap in [false, true] {
            let manager = MemoryManager::new(off_heap);
            let region = manager.allocate(64, "seg:col.sv.fwd").unwrap();
            region.write_i32(0, -7);
            region.write_i64(4, i64::MAX);
            region.write_f32(12, 1.5);
            region.write_f64(16, -2.25);
            region.write_bytes(24, b"abc");
            assert_eq!(region.read_i32(0), -7);
            assert_eq!(region.read_i64(4), i64::MAX);
            assert_eq!(region.read_f32(12), 1.5);
            assert_eq!(region.read_f64(16), -2.25);
            assert_eq!(region.read_bytes(24, 3), b"abc");
        }
    }

    #[test]
    fn regions_start_zeroed() {
        let manager = MemoryManager::new(true);
        let region = manager.allocate(16, "seg:zero").unwrap();
        assert_eq!(region.read_i64(0), 0);
        assert_eq!(region.read_i64(8), 0);
    }

    #[test]
    fn tracks_total_bytes() {
        let manager = MemoryManager::new(false);
        manager.allocate(100, "seg:a").unwrap();
        manager.allocate(28, "seg:b").unwrap();
        assert_eq!(manager.total_allocated_bytes(), 128);
        manager.close();
        // Accounting survives close; it reports lifetime allocation
        assert_eq!(manager.total_allocated_bytes(), 128);
    }

    #[test]
    fn zero_sized_allocation_is_rejected() {
        let manager = MemoryManager::new(false);
        assert!(manager.allocate(0, "seg:none").is_err());
    }

    #[test]
    #[should_panic]
    fn out_of_bounds_access_panics() {
        let manager = MemoryManager::new(false);
        let region = manager.allocate(4, "seg:small").unwrap();
        region.read_i64(0);
    }
}
