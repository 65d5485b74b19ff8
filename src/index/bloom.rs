use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;

use crate::core::types::Value;
use crate::index::dictionary::MutableDictionary;

/// Per-column membership filter, populated when the segment is sealed.
/// During ingestion the segment serves no bloom filters; the read path
/// only consumes them.
pub struct BloomFilter {
    bits: Vec<u64>,
    num_bits: u64,
    num_hashes: u32,
}

impl BloomFilter {
    pub fn with_capacity(expected_items: usize, false_positive_rate: f64) -> Self {
        let n = expected_items.max(1) as f64;
        let ln2 = std::f64::consts::LN_2;
        let num_bits = (-(n * false_positive_rate.ln()) / (ln2 * ln2)).ceil() as u64;
        let num_bits = num_bits.max(64);
        let num_hashes = ((num_bits as f64 / n) * ln2).ceil().max(1.0) as u32;
        BloomFilter {
            bits: vec![0u64; num_bits.div_ceil(64) as usize],
            num_bits,
            num_hashes,
        }
    }

    /// Filter over every value currently in `dictionary`
    pub fn from_dictionary(dictionary: &MutableDictionary, false_positive_rate: f64) -> Self {
        let cardinality = dictionary.len();
        let mut filter = Self::with_capacity(cardinality as usize, false_positive_rate);
        for id in 0..cardinality {
            filter.add(&value_key(&dictionary.get(id)));
        }
        filter
    }

    fn hash_pair(key: &[u8]) -> (u64, u64) {
        let mut h1 = DefaultHasher::new();
        h1.write(key);
        let mut h2 = DefaultHasher::new();
        h2.write_u8(0xb1);
        h2.write(key);
        (h1.finish(), h2.finish() | 1)
    }

    pub fn add(&mut self, key: &[u8]) {
        let (h1, h2) = Self::hash_pair(key);
        for i in 0..self.num_hashes {
            let bit = h1.wrapping_add((i as u64).wrapping_mul(h2)) % self.num_bits;
            self.bits[(bit / 64) as usize] |= 1 << (bit % 64);
        }
    }

    pub fn might_contain(&self, key: &[u8]) -> bool {
        let (h1, h2) = Self::hash_pair(key);
        (0..self.num_hashes).all(|i| {
            let bit = h1.wrapping_add((i as u64).wrapping_mul(h2)) % self.num_bits;
            self.bits[(bit / 64) as usize] & (1 << (bit % 64)) != 0
        })
    }

    pub fn size_bytes(&self) -> usize {
        self.bits.len() * 8
    }
}

/// Canonical key bytes of a value for membership checks
pub fn value_key(value: &Value) -> Vec<u8> {
    match value {
        Value::Int(v) => v.to_le_bytes().to_vec(),
        Value::Long(v) => v.to_le_bytes().to_vec(),
        Value::Float(v) => v.to_bits().to_le_bytes().to_vec(),
        Value::Double(v) => v.to_bits().to_le_bytes().to_vec(),
        Value::Str(v) => v.as_bytes().to_vec(),
        Value::Bytes(v) => v.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::DataType;
    use crate::memory::manager::MemoryManager;
    use std::sync::Arc;

    #[test]
    fn no_false_negatives() {
        let mut filter = BloomFilter::with_capacity(1000, 0.01);
        for i in 0..1000u32 {
            filter.add(&i.to_le_bytes());
        }
        for i in 0..1000u32 {
            assert!(filter.might_contain(&i.to_le_bytes()));
        }
    }

    #[test]
    fn false_positive_rate_is_plausible() {
        let mut filter = BloomFilter::with_capacity(1000, 0.01);
        for i in 0..1000u32 {
            filter.add(&i.to_le_bytes());
        }
        let false_positives = (10_000u32..20_000)
            .filter(|i| filter.might_contain(&i.to_le_bytes()))
            .count();
        // 1% target, allow generous slack
        assert!(false_positives < 500, "{} false positives", false_positives);
    }

    #[test]
    fn builds_from_dictionary() {
        let manager = Arc::new(MemoryManager::new(false));
        let dict =
            MutableDictionary::new(DataType::String, 4, 8, &manager, "seg:dim.dict").unwrap();
        dict.index(&Value::Str("a".to_string())).unwrap();
        dict.index(&Value::Str("b".to_string())).unwrap();
        let filter = BloomFilter::from_dictionary(&dict, 0.01);
        assert!(filter.might_contain(&value_key(&Value::Str("a".to_string()))));
        assert!(filter.might_contain(&value_key(&Value::Str("b".to_string()))));
    }
}
