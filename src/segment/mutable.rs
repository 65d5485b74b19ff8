use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::core::config::{SegmentConfig, SegmentPartitionConfig};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::stats::{ColumnStats, SegmentStats, StatsHistory};
use crate::core::types::{DataType, Row, RowMetadata, RowValue, Value};
use crate::index::bloom::BloomFilter;
use crate::index::dictionary::MutableDictionary;
use crate::index::forward::{
    FixedByteForwardIndex, ForwardIndex, MultiValueForwardIndex, MAX_MULTI_VALUES_PER_ROW,
};
use crate::index::inverted::RealtimeInvertedIndex;
use crate::index::record_id_map::{FixedIntArray, RecordIdMap};
use crate::memory::manager::MemoryManager;
use crate::schema::schema::{FieldSpec, FieldType, Schema};
use crate::segment::data_source::{ColumnDataSource, ColumnIndexes};
use crate::segment::metadata::SegmentMetadataView;
use crate::segment::virtual_column::{VirtualColumnContext, VirtualColumnProvider};

const RECORD_ID_MAP: &str = "__recordIdMap__";
const EXPECTED_COMPRESSION: u32 = 1000;
const MIN_ROWS_TO_INDEX: u32 = 1_000_000;
const MIN_RECORD_ID_MAP_CACHE_SIZE: u32 = 10_000;

const DICT_SUFFIX: &str = ".dict";
const SV_FORWARD_SUFFIX: &str = ".sv.fwd";
const MV_FORWARD_SUFFIX: &str = ".mv.fwd";

/// Dictionary ids gathered for one column of one row
enum DictEntry {
    Single(u32),
    Multi(Vec<u32>),
    /// No-dictionary column, forward index stores the raw value
    Raw,
}

/// Mutable, in-memory columnar segment.
///
/// One ingestion thread appends rows via [`index`](Self::index); any
/// number of query threads read concurrently. A row becomes visible
/// only once the visibility counter is advanced with release ordering,
/// after its forward- and inverted-index writes; readers sample the
/// counter with acquire ordering and bound all traversals by it.
pub struct MutableSegment {
    segment_name: String,
    schema: Schema,
    capacity: u32,
    off_heap: bool,
    host_name: String,
    memory_manager: Arc<MemoryManager>,
    stats_history: Arc<StatsHistory>,
    partition_config: Option<SegmentPartitionConfig>,
    virtual_column_providers: HashMap<String, Arc<dyn VirtualColumnProvider>>,

    dictionaries: HashMap<String, Arc<MutableDictionary>>,
    forward_indexes: HashMap<String, Arc<ForwardIndex>>,
    inverted_indexes: HashMap<String, Arc<RealtimeInvertedIndex>>,
    bloom_filters: HashMap<String, Arc<BloomFilter>>,
    max_num_values: HashMap<String, AtomicU32>,
    record_id_map: Option<RecordIdMap>,
    aggregate_metrics: bool,
    num_key_columns: usize,

    num_docs_indexed: AtomicU32,
    min_time: AtomicI64,
    max_time: AtomicI64,
    last_indexed_time_ms: AtomicI64,
    latest_ingestion_time_ms: AtomicI64,
    start_time: Instant,
}

impl std::fmt::Debug for MutableSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutableSegment")
            .field("segment_name", &self.segment_name)
            .field("capacity", &self.capacity)
            .field("off_heap", &self.off_heap)
            .field("host_name", &self.host_name)
            .field("num_docs_indexed", &self.num_docs_indexed)
            .finish_non_exhaustive()
    }
}

impl MutableSegment {
    pub fn new(config: SegmentConfig) -> Result<Self> {
        let SegmentConfig {
            segment_name,
            stream_name,
            host_name,
            schema,
            capacity,
            off_heap,
            avg_num_multi_values,
            no_dictionary_columns,
            inverted_index_columns,
            aggregate_metrics,
            partition_config,
            memory_manager,
            stats_history,
            virtual_column_providers,
        } = config;

        info!(
            segment = %segment_name,
            stream = %stream_name,
            capacity,
            off_heap,
            "Creating mutable segment"
        );

        let mut effective_no_dictionary = no_dictionary_columns;
        let mut dictionaries = HashMap::new();
        let mut forward_indexes = HashMap::new();
        let mut inverted_indexes = HashMap::new();
        let mut max_num_values = HashMap::new();

        for field_spec in schema.all_field_specs() {
            let column = field_spec.name.as_str();
            if field_spec.is_virtual() {
                let provider = field_spec.virtual_column_provider.as_deref().unwrap_or("");
                if !virtual_column_providers.contains_key(provider) {
                    return Err(Error::new(
                        ErrorKind::Schema,
                        format!(
                            "No virtual column provider '{}' registered for column {}",
                            provider, column
                        ),
                    ));
                }
                continue;
            }
            max_num_values.insert(column.to_string(), AtomicU32::new(0));

            // Raw storage while consuming is only supported for
            // single-value fixed-width columns without an inverted index
            let data_type = field_spec.data_type;
            let index_column_width;
            if effective_no_dictionary.contains(column)
                && field_spec.single_value
                && data_type.is_fixed_width()
                && !inverted_index_columns.contains(column)
            {
                index_column_width = data_type.width().unwrap_or(4);
            } else {
                let avg_value_size = if data_type.is_fixed_width() {
                    data_type.width().unwrap_or(4)
                } else {
                    stats_history.estimated_avg_col_size(column)
                };
                // 10% headroom on the cardinality estimate to reduce
                // the chance of resizing the dictionary
                let estimated_cardinality =
                    ((stats_history.estimated_cardinality(column) as f64 * 1.1) as u32)
                        .min(capacity.max(1));
                let dictionary = MutableDictionary::new(
                    data_type,
                    estimated_cardinality,
                    avg_value_size,
                    &memory_manager,
                    &allocation_context(&segment_name, column, DICT_SUFFIX),
                )?;
                dictionaries.insert(column.to_string(), Arc::new(dictionary));
                // The column keeps a dictionary while consuming even if
                // the config declared it no-dictionary
                effective_no_dictionary.remove(column);
                index_column_width = 4;
            }

            let forward = if field_spec.single_value {
                ForwardIndex::SingleValue(FixedByteForwardIndex::new(
                    capacity,
                    index_column_width,
                    &memory_manager,
                    &allocation_context(&segment_name, column, SV_FORWARD_SUFFIX),
                )?)
            } else {
                ForwardIndex::MultiValue(MultiValueForwardIndex::new(
                    capacity,
                    avg_num_multi_values,
                    &memory_manager,
                    &allocation_context(&segment_name, column, MV_FORWARD_SUFFIX),
                )?)
            };
            forward_indexes.insert(column.to_string(), Arc::new(forward));

            if inverted_index_columns.contains(column) {
                inverted_indexes
                    .insert(column.to_string(), Arc::new(RealtimeInvertedIndex::new()));
            }
        }

        let num_key_columns =
            schema.dimension_names().len() + usize::from(schema.time_column_name().is_some());

        let mut segment = MutableSegment {
            segment_name,
            schema,
            capacity,
            off_heap,
            host_name,
            memory_manager,
            stats_history,
            partition_config,
            virtual_column_providers,
            dictionaries,
            forward_indexes,
            inverted_indexes,
            bloom_filters: HashMap::new(),
            max_num_values,
            record_id_map: None,
            aggregate_metrics: false,
            num_key_columns,
            num_docs_indexed: AtomicU32::new(0),
            min_time: AtomicI64::new(i64::MAX),
            max_time: AtomicI64::new(i64::MIN),
            last_indexed_time_ms: AtomicI64::new(i64::MIN),
            latest_ingestion_time_ms: AtomicI64::new(i64::MIN),
            start_time: Instant::now(),
        };
        segment.record_id_map =
            segment.enable_metrics_aggregation_if_possible(aggregate_metrics, &effective_no_dictionary)?;
        Ok(segment)
    }

    /// Metric aggregation needs the config flag plus: no-dictionary
    /// single-value metrics, dictionary-encoded single-value
    /// dimensions, and a dictionary-encoded time column.
    fn enable_metrics_aggregation_if_possible(
        &mut self,
        aggregate_metrics: bool,
        no_dictionary_columns: &HashSet<String>,
    ) -> Result<Option<RecordIdMap>> {
        self.aggregate_metrics = aggregate_metrics;
        if !self.aggregate_metrics {
            info!(segment = %self.segment_name, "Metrics aggregation is disabled");
            return Ok(None);
        }

        for metric in self.schema.metric_names() {
            if !no_dictionary_columns.contains(&metric) {
                warn!(column = %metric, "Metrics aggregation disabled: dictionary-encoded metric");
                self.aggregate_metrics = false;
                break;
            }
            let spec = self.schema.field_spec_for(&metric);
            if !spec.map(|s| s.single_value).unwrap_or(false) {
                warn!(column = %metric, "Metrics aggregation disabled: multi-value metric");
                self.aggregate_metrics = false;
                break;
            }
        }

        if self.aggregate_metrics {
            for dimension in self.schema.dimension_names() {
                if no_dictionary_columns.contains(&dimension) {
                    warn!(column = %dimension, "Metrics aggregation disabled: no-dictionary dimension");
                    self.aggregate_metrics = false;
                    break;
                }
                let spec = self.schema.field_spec_for(&dimension);
                if !spec.map(|s| s.single_value).unwrap_or(false) {
                    warn!(column = %dimension, "Metrics aggregation disabled: multi-value dimension");
                    self.aggregate_metrics = false;
                    break;
                }
            }
        }

        if self.aggregate_metrics {
            if let Some(time_column) = self.schema.time_column_name() {
                if no_dictionary_columns.contains(time_column) {
                    warn!(column = %time_column, "Metrics aggregation disabled: no-dictionary time column");
                    self.aggregate_metrics = false;
                }
            }
        }

        if !self.aggregate_metrics {
            return Ok(None);
        }

        let estimated_rows_to_index = if self.stats_history.is_empty() {
            (self.capacity / EXPECTED_COMPRESSION).max(MIN_ROWS_TO_INDEX)
        } else {
            self.stats_history
                .estimated_rows_to_index()
                .max(MIN_ROWS_TO_INDEX)
        };
        let max_overflow_size = (estimated_rows_to_index / 1000).max(MIN_RECORD_ID_MAP_CACHE_SIZE);
        info!(
            estimated_rows_to_index,
            max_overflow_size, "Metrics aggregation enabled"
        );
        Ok(Some(RecordIdMap::new(
            self.num_key_columns,
            estimated_rows_to_index,
            max_overflow_size,
            &self.memory_manager,
            &allocation_context(&self.segment_name, RECORD_ID_MAP, ""),
        )?))
    }

    /// Index one row. Returns whether the segment can take more rows;
    /// ingestion must stop once this returns `false`.
    pub fn index(&self, row: &Row, row_metadata: Option<&RowMetadata>) -> Result<bool> {
        let num_docs = self.num_docs_indexed.load(Ordering::Acquire);
        if num_docs >= self.capacity {
            return Err(Error::new(
                ErrorKind::Capacity,
                format!("Segment {} is full at {} docs", self.segment_name, num_docs),
            ));
        }

        // Reject the row before any structure is touched so a failed
        // row leaves no trace
        self.validate_row(row)?;

        let dict_id_map = self.update_dictionaries(row)?;

        // Existing doc id is only possible with aggregation enabled
        let doc_id = match &self.record_id_map {
            None => num_docs,
            Some(map) => map.put(&self.dimension_key(&dict_id_map)?, num_docs),
        };

        let can_take_more = if doc_id == num_docs {
            self.add_forward_index(row, doc_id, &dict_id_map)?;
            self.add_inverted_index(doc_id, &dict_id_map);
            // Publish the doc only after every index write
            let updated = num_docs + 1;
            self.num_docs_indexed.store(updated, Ordering::Release);
            updated < self.capacity
        } else {
            if !self.aggregate_metrics {
                return Err(Error::new(
                    ErrorKind::Aggregation,
                    format!(
                        "Invalid doc id {} during indexing, expected {}",
                        doc_id, num_docs
                    ),
                ));
            }
            self.aggregate_metric_values(row, doc_id)?;
            num_docs < self.capacity
        };

        self.last_indexed_time_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        if let Some(ingestion_time) = row_metadata.and_then(|m| m.ingestion_time_ms) {
            self.latest_ingestion_time_ms
                .fetch_max(ingestion_time, Ordering::Relaxed);
        }
        Ok(can_take_more)
    }

    fn validate_row(&self, row: &Row) -> Result<()> {
        for column in row.fields.keys() {
            match self.schema.field_spec_for(column) {
                None => {
                    return Err(Error::new(
                        ErrorKind::Schema,
                        format!("Unknown column in row: {}", column),
                    ))
                }
                Some(spec) if spec.is_virtual() => {
                    return Err(Error::new(
                        ErrorKind::Schema,
                        format!("Virtual column {} cannot be ingested", column),
                    ))
                }
                Some(_) => {}
            }
        }
        for field_spec in self.schema.all_field_specs() {
            if field_spec.is_virtual() {
                continue;
            }
            let column = field_spec.name.as_str();
            let row_value = row.get(column).ok_or_else(|| {
                Error::new(
                    ErrorKind::Schema,
                    format!("Missing value for column {}", column),
                )
            })?;
            match row_value {
                RowValue::Single(value) => {
                    if !field_spec.single_value {
                        return Err(Error::new(
                            ErrorKind::TypeMismatch,
                            format!("Single value for multi-value column {}", column),
                        ));
                    }
                    self.check_value_type(field_spec, value)?;
                    if field_spec.field_type == FieldType::Time {
                        value.as_time_long()?;
                    }
                }
                RowValue::Multi(values) => {
                    if field_spec.single_value {
                        return Err(Error::new(
                            ErrorKind::TypeMismatch,
                            format!("Multi-value for single-value column {}", column),
                        ));
                    }
                    if values.len() > MAX_MULTI_VALUES_PER_ROW {
                        return Err(Error::new(
                            ErrorKind::Capacity,
                            format!(
                                "Column {} has {} values, cap is {}",
                                column,
                                values.len(),
                                MAX_MULTI_VALUES_PER_ROW
                            ),
                        ));
                    }
                    for value in values {
                        self.check_value_type(field_spec, value)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn check_value_type(&self, field_spec: &FieldSpec, value: &Value) -> Result<()> {
        if value.data_type() != field_spec.data_type {
            return Err(Error::new(
                ErrorKind::TypeMismatch,
                format!(
                    "Column {} declared {:?}, row carries {:?}",
                    field_spec.name,
                    field_spec.data_type,
                    value.data_type()
                ),
            ));
        }
        Ok(())
    }

    fn update_dictionaries(&self, row: &Row) -> Result<HashMap<String, DictEntry>> {
        let mut dict_id_map = HashMap::new();
        for field_spec in self.schema.all_field_specs() {
            if field_spec.is_virtual() {
                continue;
            }
            let column = field_spec.name.as_str();
            // Presence and shape were validated up front
            let row_value = row.get(column).ok_or_else(|| {
                Error::new(ErrorKind::Internal, format!("Lost value for {}", column))
            })?;
            let dictionary = self.dictionaries.get(column);
            let entry = match row_value {
                RowValue::Single(value) => match dictionary {
                    Some(dictionary) => DictEntry::Single(dictionary.index(value)?),
                    None => DictEntry::Raw,
                },
                RowValue::Multi(values) => {
                    let dictionary = dictionary.ok_or_else(|| {
                        Error::new(
                            ErrorKind::Internal,
                            format!("Multi-value column {} has no dictionary", column),
                        )
                    })?;
                    let mut dict_ids = Vec::with_capacity(values.len());
                    for value in values {
                        dict_ids.push(dictionary.index(value)?);
                    }
                    if let Some(max) = self.max_num_values.get(column) {
                        max.fetch_max(values.len() as u32, Ordering::Relaxed);
                    }
                    DictEntry::Multi(dict_ids)
                }
            };
            if field_spec.field_type == FieldType::Time {
                if let RowValue::Single(value) = row_value {
                    let time_value = value.as_time_long()?;
                    self.min_time.fetch_min(time_value, Ordering::Relaxed);
                    self.max_time.fetch_max(time_value, Ordering::Relaxed);
                }
            }
            dict_id_map.insert(column.to_string(), entry);
        }
        Ok(dict_id_map)
    }

    fn dimension_key(&self, dict_id_map: &HashMap<String, DictEntry>) -> Result<FixedIntArray> {
        let mut key = Vec::with_capacity(self.num_key_columns);
        for dimension in self.schema.dimension_names() {
            key.push(self.single_dict_id(dict_id_map, &dimension)?);
        }
        if let Some(time_column) = self.schema.time_column_name() {
            key.push(self.single_dict_id(dict_id_map, time_column)?);
        }
        Ok(FixedIntArray(key))
    }

    fn single_dict_id(
        &self,
        dict_id_map: &HashMap<String, DictEntry>,
        column: &str,
    ) -> Result<i32> {
        match dict_id_map.get(column) {
            Some(DictEntry::Single(dict_id)) => Ok(*dict_id as i32),
            _ => Err(Error::new(
                ErrorKind::Internal,
                format!("Aggregation key column {} has no single dict id", column),
            )),
        }
    }

    fn add_forward_index(
        &self,
        row: &Row,
        doc_id: u32,
        dict_id_map: &HashMap<String, DictEntry>,
    ) -> Result<()> {
        for field_spec in self.schema.all_field_specs() {
            if field_spec.is_virtual() {
                continue;
            }
            let column = field_spec.name.as_str();
            let forward = self.forward_index_for(column)?;
            match dict_id_map.get(column) {
                Some(DictEntry::Single(dict_id)) => {
                    forward.expect_single()?.set_dict_id(doc_id, *dict_id);
                }
                Some(DictEntry::Multi(dict_ids)) => {
                    forward.expect_multi()?.set_dict_ids(doc_id, dict_ids)?;
                }
                Some(DictEntry::Raw) => {
                    let value = row
                        .get(column)
                        .and_then(|v| match v {
                            RowValue::Single(value) => Some(value),
                            RowValue::Multi(_) => None,
                        })
                        .ok_or_else(|| {
                            Error::new(ErrorKind::Internal, format!("Lost value for {}", column))
                        })?;
                    let index = forward.expect_single()?;
                    match field_spec.data_type {
                        DataType::Int => index.set_i32(doc_id, value.as_int()?),
                        DataType::Long => index.set_i64(doc_id, value.as_long()?),
                        DataType::Float => index.set_f32(doc_id, value.as_float()?),
                        DataType::Double => index.set_f64(doc_id, value.as_double()?),
                        DataType::String | DataType::Bytes => {
                            return Err(Error::new(
                                ErrorKind::Schema,
                                format!("No raw forward index for {:?} column {}", field_spec.data_type, column),
                            ))
                        }
                    }
                }
                None => {
                    return Err(Error::new(
                        ErrorKind::Internal,
                        format!("No dict entry gathered for {}", column),
                    ))
                }
            }
        }
        Ok(())
    }

    /// Inverted indexes are updated last: once a posting is visible the
    /// doc is reachable by scans, so every other structure must already
    /// hold the row
    fn add_inverted_index(&self, doc_id: u32, dict_id_map: &HashMap<String, DictEntry>) {
        for (column, inverted) in &self.inverted_indexes {
            match dict_id_map.get(column.as_str()) {
                Some(DictEntry::Single(dict_id)) => inverted.add(*dict_id, doc_id),
                Some(DictEntry::Multi(dict_ids)) => {
                    for dict_id in dict_ids {
                        inverted.add(*dict_id, doc_id);
                    }
                }
                _ => {}
            }
        }
    }

    fn aggregate_metric_values(&self, row: &Row, doc_id: u32) -> Result<()> {
        for field_spec in self.schema.metric_field_specs() {
            let column = field_spec.name.as_str();
            let value = row
                .get(column)
                .ok_or_else(|| {
                    Error::new(ErrorKind::Internal, format!("Lost value for {}", column))
                })?
                .as_single()?;
            let index = self.forward_index_for(column)?.expect_single()?;
            match field_spec.data_type {
                DataType::Int => index.set_i32(doc_id, index.get_i32(doc_id) + value.as_int()?),
                DataType::Long => index.set_i64(doc_id, index.get_i64(doc_id) + value.as_long()?),
                DataType::Float => index.set_f32(doc_id, index.get_f32(doc_id) + value.as_float()?),
                DataType::Double => {
                    index.set_f64(doc_id, index.get_f64(doc_id) + value.as_double()?)
                }
                DataType::String | DataType::Bytes => {
                    return Err(Error::new(
                        ErrorKind::Aggregation,
                        format!("Metric column {} is not numeric", column),
                    ))
                }
            }
        }
        Ok(())
    }

    fn forward_index_for(&self, column: &str) -> Result<&Arc<ForwardIndex>> {
        self.forward_indexes.get(column).ok_or_else(|| {
            Error::new(
                ErrorKind::NotFound,
                format!("No forward index for column {}", column),
            )
        })
    }

    pub fn segment_name(&self) -> &str {
        &self.segment_name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn is_aggregate_metrics(&self) -> bool {
        self.aggregate_metrics
    }

    pub fn num_docs_indexed(&self) -> u32 {
        self.num_docs_indexed.load(Ordering::Acquire)
    }

    pub fn min_time(&self) -> Option<i64> {
        let value = self.min_time.load(Ordering::Relaxed);
        (value != i64::MAX).then_some(value)
    }

    pub fn max_time(&self) -> Option<i64> {
        let value = self.max_time.load(Ordering::Relaxed);
        (value != i64::MIN).then_some(value)
    }

    pub fn last_indexed_time_ms(&self) -> Option<i64> {
        let value = self.last_indexed_time_ms.load(Ordering::Relaxed);
        (value != i64::MIN).then_some(value)
    }

    pub fn latest_ingestion_time_ms(&self) -> Option<i64> {
        let value = self.latest_ingestion_time_ms.load(Ordering::Relaxed);
        (value != i64::MIN).then_some(value)
    }

    pub fn segment_partition_config(&self) -> Option<&SegmentPartitionConfig> {
        self.partition_config.as_ref()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.schema.column_names()
    }

    pub fn physical_column_names(&self) -> Vec<String> {
        self.schema.physical_column_names()
    }

    pub fn segment_metadata(&self) -> SegmentMetadataView<'_> {
        SegmentMetadataView::new(self)
    }

    /// Record-id map occupancy; only present with aggregation enabled
    pub fn record_id_map_size(&self) -> Option<u32> {
        self.record_id_map.as_ref().map(|map| map.size())
    }

    /// Read-side view of one column, bounded by the current counter
    pub fn data_source(&self, column: &str) -> Result<ColumnDataSource> {
        let field_spec = self
            .schema
            .field_spec_for(column)
            .ok_or_else(|| {
                Error::new(ErrorKind::NotFound, format!("Unknown column {}", column))
            })?
            .clone();
        let num_docs = self.num_docs_indexed.load(Ordering::Acquire);

        if field_spec.is_virtual() {
            let provider_name = field_spec.virtual_column_provider.as_deref().unwrap_or("");
            let provider = self.virtual_column_providers.get(provider_name).ok_or_else(|| {
                Error::new(
                    ErrorKind::Schema,
                    format!("No virtual column provider '{}' registered", provider_name),
                )
            })?;
            let context = VirtualColumnContext {
                host_name: self.host_name.clone(),
                segment_name: self.segment_name.clone(),
                column_name: column.to_string(),
                total_doc_count: num_docs,
            };
            return Ok(ColumnDataSource {
                field_spec,
                num_docs,
                max_num_multi_values: 0,
                indexes: ColumnIndexes::Virtual {
                    reader: provider.reader(&context),
                },
            });
        }

        let forward = Arc::clone(self.forward_index_for(column)?);
        Ok(ColumnDataSource {
            field_spec,
            num_docs,
            max_num_multi_values: self
                .max_num_values
                .get(column)
                .map(|v| v.load(Ordering::Relaxed))
                .unwrap_or(0),
            indexes: ColumnIndexes::Physical {
                forward,
                inverted: self.inverted_indexes.get(column).cloned(),
                dictionary: self.dictionaries.get(column).cloned(),
                bloom_filter: self.bloom_filters.get(column).cloned(),
            },
        })
    }

    /// Reconstruct the row at `doc_id` into `reuse`
    pub fn record(&self, doc_id: u32, reuse: &mut Row) -> Result<()> {
        let num_docs = self.num_docs_indexed.load(Ordering::Acquire);
        if doc_id >= num_docs {
            return Err(Error::new(
                ErrorKind::NotFound,
                format!("Doc id {} not visible, {} docs indexed", doc_id, num_docs),
            ));
        }
        reuse.clear();
        for field_spec in self.schema.all_field_specs() {
            let column = field_spec.name.as_str();
            if field_spec.is_virtual() {
                let source = self.data_source(column)?;
                if let ColumnIndexes::Virtual { reader } = source.indexes {
                    reuse.put(column, reader.value(doc_id));
                }
                continue;
            }
            let forward = self.forward_index_for(column)?;
            let dictionary = self.dictionaries.get(column);
            if field_spec.single_value {
                let index = forward.expect_single()?;
                let value = match dictionary {
                    Some(dictionary) => dictionary.get(index.get_dict_id(doc_id)),
                    None => match field_spec.data_type {
                        DataType::Int => Value::Int(index.get_i32(doc_id)),
                        DataType::Long => Value::Long(index.get_i64(doc_id)),
                        DataType::Float => Value::Float(index.get_f32(doc_id)),
                        DataType::Double => Value::Double(index.get_f64(doc_id)),
                        DataType::String | DataType::Bytes => {
                            return Err(Error::new(
                                ErrorKind::Internal,
                                format!("Raw {:?} column {}", field_spec.data_type, column),
                            ))
                        }
                    },
                };
                reuse.put(column, value);
            } else {
                let dictionary = dictionary.ok_or_else(|| {
                    Error::new(
                        ErrorKind::Internal,
                        format!("Multi-value column {} has no dictionary", column),
                    )
                })?;
                let dict_ids = forward.expect_multi()?.get_dict_ids(doc_id);
                let values = dict_ids.iter().map(|id| dictionary.get(*id)).collect();
                reuse.put_multi(column, values);
            }
        }
        Ok(())
    }

    /// Doc-id permutation visiting rows in ascending order of `column`.
    ///
    /// Sorts the dictionary ids by value order and concatenates the
    /// posting lists, so insertion order is preserved within one value.
    pub fn sorted_doc_id_iteration(&self, column: &str) -> Result<Vec<u32>> {
        let dictionary = self.dictionaries.get(column).ok_or_else(|| {
            Error::new(
                ErrorKind::Schema,
                format!("Sorted iteration needs a dictionary on column {}", column),
            )
        })?;
        let inverted = self.inverted_indexes.get(column).ok_or_else(|| {
            Error::new(
                ErrorKind::Schema,
                format!("Sorted iteration needs an inverted index on column {}", column),
            )
        })?;
        let num_docs = self.num_docs_indexed.load(Ordering::Acquire);

        let mut dict_ids: Vec<u32> = (0..dictionary.len()).collect();
        dict_ids.sort_by(|a, b| dictionary.compare(*a, *b));

        let mut doc_ids = Vec::with_capacity(num_docs as usize);
        for dict_id in dict_ids {
            doc_ids.extend(inverted.doc_ids_up_to(dict_id, num_docs).iter());
        }
        if doc_ids.len() != num_docs as usize {
            return Err(Error::new(
                ErrorKind::Internal,
                format!(
                    "Sorted iteration covered {} docs, {} indexed",
                    doc_ids.len(),
                    num_docs
                ),
            ));
        }
        Ok(doc_ids)
    }

    /// Tear the segment down: snapshot stats when off-heap and
    /// non-empty, clear the record-id map, release all memory. Errors
    /// are logged, never propagated.
    pub fn destroy(self) {
        info!(segment = %self.segment_name, "Destroying mutable segment");
        let num_docs = self.num_docs_indexed.load(Ordering::Acquire);
        if self.off_heap && num_docs > 0 {
            let num_seconds = self.start_time.elapsed().as_secs() as u32;
            let mem_used_bytes = self.memory_manager.total_allocated_bytes() as u64;
            info!(
                segment = %self.segment_name,
                mem_used_bytes,
                rows = num_docs,
                seconds = num_seconds,
                "Segment memory usage"
            );
            let mut stats = SegmentStats::new();
            stats.num_rows_consumed = num_docs;
            stats.num_rows_indexed = num_docs;
            stats.mem_used_bytes = mem_used_bytes;
            stats.num_seconds = num_seconds;
            for (column, dictionary) in &self.dictionaries {
                stats.column_stats.insert(
                    column.clone(),
                    ColumnStats {
                        cardinality: dictionary.len(),
                        avg_column_size: dictionary.avg_value_size(),
                    },
                );
            }
            if let Err(err) = self.stats_history.add_segment_stats(stats) {
                error!(segment = %self.segment_name, %err, "Failed to append segment stats");
            }
        }
        if let Some(map) = &self.record_id_map {
            map.clear();
        }
        // Dictionaries, forward and inverted indexes are dropped with
        // self; the manager releases its own region handles
        self.memory_manager.close();
    }
}

fn allocation_context(segment_name: &str, column: &str, index_kind: &str) -> String {
    format!("{}:{}{}", segment_name, column, index_kind)
}
