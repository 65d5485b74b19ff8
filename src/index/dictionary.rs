use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{DataType, Value};
use crate::memory::manager::{MemoryManager, MemoryRegion};

const MIN_VAR_REGION_BYTES: usize = 4096;

/// Fixed-width value that can key a dictionary
trait DictValue: Copy {
    type Key: Hash + Eq;
    fn key(self) -> Self::Key;
    fn compare(a: Self, b: Self) -> Ordering;
    fn width() -> usize;
}

impl DictValue for i32 {
    type Key = i32;
    fn key(self) -> i32 {
        self
    }
    fn compare(a: i32, b: i32) -> Ordering {
        a.cmp(&b)
    }
    fn width() -> usize {
        4
    }
}

impl DictValue for i64 {
    type Key = i64;
    fn key(self) -> i64 {
        self
    }
    fn compare(a: i64, b: i64) -> Ordering {
        a.cmp(&b)
    }
    fn width() -> usize {
        8
    }
}

impl DictValue for f32 {
    type Key = u32;
    fn key(self) -> u32 {
        self.to_bits()
    }
    fn compare(a: f32, b: f32) -> Ordering {
        a.total_cmp(&b)
    }
    fn width() -> usize {
        4
    }
}

impl DictValue for f64 {
    type Key = u64;
    fn key(self) -> u64 {
        self.to_bits()
    }
    fn compare(a: f64, b: f64) -> Ordering {
        a.total_cmp(&b)
    }
    fn width() -> usize {
        8
    }
}

/// value -> id map plus id -> value table for one fixed-width type
struct PrimitiveStore<T: DictValue> {
    values: Vec<T>,
    map: HashMap<T::Key, u32>,
}

impl<T: DictValue> PrimitiveStore<T> {
    fn with_capacity(capacity: usize) -> Self {
        PrimitiveStore {
            values: Vec::with_capacity(capacity),
            map: HashMap::with_capacity(capacity),
        }
    }

    fn index(&mut self, value: T) -> u32 {
        if let Some(&id) = self.map.get(&value.key()) {
            return id;
        }
        let id = self.values.len() as u32;
        self.values.push(value);
        self.map.insert(value.key(), id);
        id
    }

    fn index_of(&self, value: T) -> Option<u32> {
        self.map.get(&value.key()).copied()
    }

    fn get(&self, id: u32) -> T {
        self.values[id as usize]
    }

    fn len(&self) -> u32 {
        self.values.len() as u32
    }
}

/// Append-only off-heap byte store with an offset table, shared by
/// string and bytes dictionaries. Regions grow geometrically; issued
/// ids index the offset table and never move.
struct VarByteStore {
    map: HashMap<Box<[u8]>, u32>,
    // (region index, offset, len) per id
    offsets: Vec<(u32, u32, u32)>,
    regions: Vec<Arc<MemoryRegion>>,
    write_offset: usize,
    total_value_bytes: u64,
    manager: Arc<MemoryManager>,
    context: String,
}

impl VarByteStore {
    fn new(
        capacity: usize,
        avg_value_size: usize,
        manager: Arc<MemoryManager>,
        context: &str,
    ) -> Result<Self> {
        let initial = (capacity * avg_value_size.max(1)).max(MIN_VAR_REGION_BYTES);
        let region = manager.allocate(initial, context)?;
        Ok(VarByteStore {
            map: HashMap::with_capacity(capacity),
            offsets: Vec::with_capacity(capacity),
            regions: vec![region],
            write_offset: 0,
            total_value_bytes: 0,
            manager,
            context: context.to_string(),
        })
    }

    fn index(&mut self, bytes: &[u8]) -> Result<u32> {
        if let Some(&id) = self.map.get(bytes) {
            return Ok(id);
        }
        let region_idx = self.regions.len() - 1;
        let remaining = self.regions[region_idx].len() - self.write_offset;
        let region_idx = if bytes.len() > remaining {
            let next_size = (self.regions[region_idx].len() * 2).max(bytes.len());
            let region = self.manager.allocate(next_size, &self.context)?;
            self.regions.push(region);
            self.write_offset = 0;
            region_idx + 1
        } else {
            region_idx
        };
        self.regions[region_idx].write_bytes(self.write_offset, bytes);
        let id = self.offsets.len() as u32;
        self.offsets
            .push((region_idx as u32, self.write_offset as u32, bytes.len() as u32));
        self.write_offset += bytes.len();
        self.total_value_bytes += bytes.len() as u64;
        self.map.insert(bytes.into(), id);
        Ok(id)
    }

    fn index_of(&self, bytes: &[u8]) -> Option<u32> {
        self.map.get(bytes).copied()
    }

    fn get(&self, id: u32) -> Vec<u8> {
        let (region_idx, offset, len) = self.offsets[id as usize];
        self.regions[region_idx as usize]
            .read_bytes(offset as usize, len as usize)
            .to_vec()
    }

    fn len(&self) -> u32 {
        self.offsets.len() as u32
    }

    fn avg_value_size(&self) -> f64 {
        if self.offsets.is_empty() {
            0.0
        } else {
            self.total_value_bytes as f64 / self.offsets.len() as f64
        }
    }
}

enum Inner {
    Int(PrimitiveStore<i32>),
    Long(PrimitiveStore<i64>),
    Float(PrimitiveStore<f32>),
    Double(PrimitiveStore<f64>),
    Var(VarByteStore),
}

/// Per-column value -> id map with stable, insertion-ordered ids.
///
/// The single ingestion thread inserts; query threads resolve and
/// dereference concurrently. Ids are dense in `[0, len())` and never
/// change once issued.
pub struct MutableDictionary {
    data_type: DataType,
    inner: RwLock<Inner>,
}

impl MutableDictionary {
    pub fn new(
        data_type: DataType,
        initial_capacity: u32,
        avg_value_size: usize,
        manager: &Arc<MemoryManager>,
        context: &str,
    ) -> Result<Self> {
        let capacity = initial_capacity as usize;
        let inner = match data_type {
            DataType::Int => Inner::Int(PrimitiveStore::with_capacity(capacity)),
            DataType::Long => Inner::Long(PrimitiveStore::with_capacity(capacity)),
            DataType::Float => Inner::Float(PrimitiveStore::with_capacity(capacity)),
            DataType::Double => Inner::Double(PrimitiveStore::with_capacity(capacity)),
            DataType::String | DataType::Bytes => Inner::Var(VarByteStore::new(
                capacity,
                avg_value_size,
                Arc::clone(manager),
                context,
            )?),
        };
        Ok(MutableDictionary {
            data_type,
            inner: RwLock::new(inner),
        })
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Insert `value` if absent and return its id
    pub fn index(&self, value: &Value) -> Result<u32> {
        let mut inner = self.inner.write();
        match (&mut *inner, value) {
            (Inner::Int(store), Value::Int(v)) => Ok(store.index(*v)),
            (Inner::Long(store), Value::Long(v)) => Ok(store.index(*v)),
            (Inner::Float(store), Value::Float(v)) => Ok(store.index(*v)),
            (Inner::Double(store), Value::Double(v)) => Ok(store.index(*v)),
            (Inner::Var(store), Value::Str(v)) => store.index(v.as_bytes()),
            (Inner::Var(store), Value::Bytes(v)) => store.index(v),
            _ => Err(Error::new(
                ErrorKind::TypeMismatch,
                format!(
                    "Dictionary of {:?} cannot index {:?} value",
                    self.data_type,
                    value.data_type()
                ),
            )),
        }
    }

    /// Id of `value`, or `None` while the value is not present
    pub fn index_of(&self, value: &Value) -> Option<u32> {
        let inner = self.inner.read();
        match (&*inner, value) {
            (Inner::Int(store), Value::Int(v)) => store.index_of(*v),
            (Inner::Long(store), Value::Long(v)) => store.index_of(*v),
            (Inner::Float(store), Value::Float(v)) => store.index_of(*v),
            (Inner::Double(store), Value::Double(v)) => store.index_of(*v),
            (Inner::Var(store), Value::Str(v)) => store.index_of(v.as_bytes()),
            (Inner::Var(store), Value::Bytes(v)) => store.index_of(v),
            _ => None,
        }
    }

    pub fn get(&self, id: u32) -> Value {
        let inner = self.inner.read();
        match &*inner {
            Inner::Int(store) => Value::Int(store.get(id)),
            Inner::Long(store) => Value::Long(store.get(id)),
            Inner::Float(store) => Value::Float(store.get(id)),
            Inner::Double(store) => Value::Double(store.get(id)),
            Inner::Var(store) => {
                let bytes = store.get(id);
                if self.data_type == DataType::String {
                    Value::Str(String::from_utf8_lossy(&bytes).into_owned())
                } else {
                    Value::Bytes(bytes)
                }
            }
        }
    }

    /// Current cardinality
    pub fn len(&self) -> u32 {
        let inner = self.inner.read();
        match &*inner {
            Inner::Int(store) => store.len(),
            Inner::Long(store) => store.len(),
            Inner::Float(store) => store.len(),
            Inner::Double(store) => store.len(),
            Inner::Var(store) => store.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total ordering of two ids consistent with the value order
    pub fn compare(&self, id_a: u32, id_b: u32) -> Ordering {
        let inner = self.inner.read();
        match &*inner {
            Inner::Int(store) => DictValue::compare(store.get(id_a), store.get(id_b)),
            Inner::Long(store) => DictValue::compare(store.get(id_a), store.get(id_b)),
            Inner::Float(store) => DictValue::compare(store.get(id_a), store.get(id_b)),
            Inner::Double(store) => DictValue::compare(store.get(id_a), store.get(id_b)),
            Inner::Var(store) => store.get(id_a).cmp(&store.get(id_b)),
        }
    }

    /// Average stored value size in bytes, for stats
    pub fn avg_value_size(&self) -> f64 {
        let inner = self.inner.read();
        match &*inner {
            Inner::Int(_) => i32::width() as f64,
            Inner::Long(_) => i64::width() as f64,
            Inner::Float(_) => f32::width() as f64,
            Inner::Double(_) => f64::width() as f64,
            Inner::Var(store) => store.avg_value_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict(data_type: DataType) -> MutableDictionary {
        let manager = Arc::new(MemoryManager::new(false));
        MutableDictionary::new(data_type, 4, 8, &manager, "seg:col.dict").unwrap()
    }

    #[test]
    fn ids_are_dense_and_stable() {
        let d = dict(DataType::Long);
        assert_eq!(d.index(&Value::Long(100)).unwrap(), 0);
        assert_eq!(d.index(&Value::Long(50)).unwrap(), 1);
        assert_eq!(d.index(&Value::Long(100)).unwrap(), 0);
        assert_eq!(d.len(), 2);
        assert_eq!(d.index_of(&Value::Long(50)), Some(1));
        assert_eq!(d.index_of(&Value::Long(999)), None);
        assert_eq!(d.get(0), Value::Long(100));
    }

    #[test]
    fn string_dictionary_round_trip() {
        let d = dict(DataType::String);
        let a = d.index(&Value::Str("apple".to_string())).unwrap();
        let b = d.index(&Value::Str("banana".to_string())).unwrap();
        assert_eq!((a, b), (0, 1));
        assert_eq!(d.get(0), Value::Str("apple".to_string()));
        assert_eq!(d.get(1), Value::Str("banana".to_string()));
        assert_eq!(d.index_of(&Value::Str("apple".to_string())), Some(0));
        assert!((d.avg_value_size() - 5.5).abs() < 1e-9);
    }

    #[test]
    fn byte_store_growth_keeps_ids_valid() {
        let manager = Arc::new(MemoryManager::new(true));
        // Tiny initial sizing to force several region growths
        let d = MutableDictionary::new(DataType::String, 1, 1, &manager, "seg:col.dict").unwrap();
        let values: Vec<String> = (0..500).map(|i| format!("value-{:06}", i)).collect();
        for (i, v) in values.iter().enumerate() {
            assert_eq!(d.index(&Value::Str(v.clone())).unwrap(), i as u32);
        }
        for (i, v) in values.iter().enumerate() {
            assert_eq!(d.get(i as u32), Value::Str(v.clone()));
            assert_eq!(d.index_of(&Value::Str(v.clone())), Some(i as u32));
        }
    }

    #[test]
    fn compare_follows_value_order() {
        let d = dict(DataType::Int);
        d.index(&Value::Int(30)).unwrap();
        d.index(&Value::Int(-5)).unwrap();
        d.index(&Value::Int(12)).unwrap();
        assert_eq!(d.compare(1, 0), Ordering::Less);
        assert_eq!(d.compare(0, 2), Ordering::Greater);
        assert_eq!(d.compare(2, 2), Ordering::Equal);
    }

    #[test]
    fn float_compare_is_total() {
        let d = dict(DataType::Double);
        d.index(&Value::Double(f64::NAN)).unwrap();
        d.index(&Value::Double(1.0)).unwrap();
        // NaN participates in the total order instead of poisoning it
        assert_eq!(d.compare(0, 1), Ordering::Greater);
        assert_eq!(d.index_of(&Value::Double(f64::NAN)), Some(0));
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let d = dict(DataType::Int);
        assert!(d.index(&Value::Long(1)).is_err());
        assert_eq!(d.index_of(&Value::Long(1)), None);
    }

    #[test]
    fn bytes_dictionary_preserves_raw_bytes() {
        let d = dict(DataType::Bytes);
        let id = d.index(&Value::Bytes(vec![0, 255, 7])).unwrap();
        assert_eq!(d.get(id), Value::Bytes(vec![0, 255, 7]));
    }
}
