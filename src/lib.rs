pub mod core;
pub mod index;
pub mod memory;
pub mod schema;
pub mod segment;

/*
┌──────────────────────────── RTSEG STRUCT ARCHITECTURE ─────────────────────────────┐

┌──────────────────────────────── SEGMENT LAYER ─────────────────────────────────────┐
│                                                                                     │
│  ┌──────────────────────────────────────────────────────────────────────────────┐  │
│  │                           struct MutableSegment                               │  │
│  │  dictionaries: HashMap<String, Arc<MutableDictionary>>  // value → dict id   │  │
│  │  forward_indexes: HashMap<String, Arc<ForwardIndex>>    // doc id → value    │  │
│  │  inverted_indexes: HashMap<String, Arc<RealtimeInvertedIndex>>               │  │
│  │  bloom_filters: HashMap<String, Arc<BloomFilter>>       // seal-time only    │  │
│  │  record_id_map: Option<RecordIdMap>       // dimension key → doc id          │  │
│  │  num_docs_indexed: AtomicU32              // release-published visibility    │  │
│  │  memory_manager: Arc<MemoryManager>       // off-heap regions                │  │
│  │  stats_history: Arc<StatsHistory>         // sizing in, stats out            │  │
│  └──────────────────────────────────────────────────────────────────────────────┘  │
│                                                                                     │
│  ┌─────────────────────────┐  ┌──────────────────────────┐  ┌───────────────────┐  │
│  │ struct ColumnDataSource │  │ struct SegmentMetadataView│  │ trait Virtual-    │  │
│  │ • field_spec            │  │ • live counter reads      │  │ ColumnProvider    │  │
│  │ • num_docs (sample)     │  └──────────────────────────┘  └───────────────────┘  │
│  │ • forward/inverted/dict │                                                       │
│  └─────────────────────────┘                                                       │
└─────────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────── INDEX LAYER ───────────────────────────────────────┐
│                                                                                     │
│  ┌────────────────────────┐  ┌──────────────────────────┐  ┌────────────────────┐  │
│  │ struct MutableDictionary│  │ enum ForwardIndex        │  │ struct Realtime-   │  │
│  │ • per-type stores       │  │ • SingleValue (fixed)    │  │ InvertedIndex      │  │
│  │ • stable dense ids      │  │ • MultiValue (two-level) │  │ • Vec<RoaringBitmap>│ │
│  └────────────────────────┘  └──────────────────────────┘  └────────────────────┘  │
│                                                                                     │
│  ┌────────────────────────┐  ┌──────────────────────────┐                          │
│  │ struct RecordIdMap     │  │ struct BloomFilter       │                          │
│  │ • off-heap open addr.  │  │ • double hashing         │                          │
│  └────────────────────────┘  └──────────────────────────┘                          │
└─────────────────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────── FOUNDATION LAYER ────────────────────────────────────┐
│                                                                                     │
│  ┌────────────────────────┐  ┌──────────────────────────┐  ┌────────────────────┐  │
│  │ struct MemoryManager   │  │ struct StatsHistory      │  │ struct Schema      │  │
│  │ • named regions        │  │ • append-only file log   │  │ • FieldSpec list   │  │
│  │ • byte accounting      │  │ • sizing estimates       │  │ • time column      │  │
│  └────────────────────────┘  └──────────────────────────┘  └────────────────────┘  │
└─────────────────────────────────────────────────────────────────────────────────────┘

  Ingestion flow: Row → dictionaries → doc id (record-id map when aggregating)
                  → forward indexes → inverted indexes → publish counter

  Read flow:      sample counter → data_source(column) / record(doc_id)
                  → traversals bounded by the sample
*/
