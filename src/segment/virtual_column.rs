use std::sync::Arc;

use crate::core::types::Value;

/// Everything a provider may need to service reads for one column
#[derive(Debug, Clone)]
pub struct VirtualColumnContext {
    pub host_name: String,
    pub segment_name: String,
    pub column_name: String,
    pub total_doc_count: u32,
}

/// Read-side view of a virtual column
pub trait VirtualColumnReader: Send + Sync {
    fn value(&self, doc_id: u32) -> Value;
}

/// Pluggable source for columns the segment does not physically store
pub trait VirtualColumnProvider: Send + Sync {
    fn reader(&self, context: &VirtualColumnContext) -> Arc<dyn VirtualColumnReader>;
}

/// Built-in provider serving the doc id itself
pub struct DocIdVirtualColumnProvider;

struct DocIdReader;

impl VirtualColumnReader for DocIdReader {
    fn value(&self, doc_id: u32) -> Value {
        Value::Int(doc_id as i32)
    }
}

impl VirtualColumnProvider for DocIdVirtualColumnProvider {
    fn reader(&self, _context: &VirtualColumnContext) -> Arc<dyn VirtualColumnReader> {
        Arc::new(DocIdReader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> VirtualColumnContext {
        VirtualColumnContext {
            host_name: "host-1".to_string(),
            segment_name: "seg".to_string(),
            column_name: "$docId".to_string(),
            total_doc_count: 3,
        }
    }

    #[test]
    fn doc_id_provider_returns_doc_id() {
        let reader = DocIdVirtualColumnProvider.reader(&context());
        assert_eq!(reader.value(2), Value::Int(2));
    }
}
