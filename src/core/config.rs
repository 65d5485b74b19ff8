use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::core::stats::StatsHistory;
use crate::memory::manager::MemoryManager;
use crate::schema::schema::Schema;
use crate::segment::virtual_column::VirtualColumnProvider;

/// Partitioning of one column across the table's segments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnPartitionConfig {
    pub function_name: String,
    pub num_partitions: u32,
}

/// Carried through segment construction, exposed read-only
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentPartitionConfig {
    pub column_partition_map: HashMap<String, ColumnPartitionConfig>,
}

/// Everything a mutable segment needs at construction time
pub struct SegmentConfig {
    pub segment_name: String,
    pub stream_name: String,
    pub host_name: String,
    pub schema: Schema,
    pub capacity: u32,
    pub off_heap: bool,
    pub avg_num_multi_values: u32,
    pub no_dictionary_columns: HashSet<String>,
    pub inverted_index_columns: HashSet<String>,
    pub aggregate_metrics: bool,
    pub partition_config: Option<SegmentPartitionConfig>,
    pub memory_manager: Arc<MemoryManager>,
    pub stats_history: Arc<StatsHistory>,
    pub virtual_column_providers: HashMap<String, Arc<dyn VirtualColumnProvider>>,
}

impl SegmentConfig {
    pub fn new(
        segment_name: &str,
        stream_name: &str,
        schema: Schema,
        capacity: u32,
        memory_manager: Arc<MemoryManager>,
        stats_history: Arc<StatsHistory>,
    ) -> Self {
        SegmentConfig {
            segment_name: segment_name.to_string(),
            stream_name: stream_name.to_string(),
            host_name: "localhost".to_string(),
            schema,
            capacity,
            off_heap: memory_manager.is_off_heap(),
            avg_num_multi_values: 2,
            no_dictionary_columns: HashSet::new(),
            inverted_index_columns: HashSet::new(),
            aggregate_metrics: false,
            partition_config: None,
            memory_manager,
            stats_history,
            virtual_column_providers: HashMap::new(),
        }
    }
}
