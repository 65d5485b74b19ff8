use crate::segment::mutable::MutableSegment;

/// Live metadata over a mutable segment: every getter reads the
/// segment's counters at call time rather than a snapshot.
pub struct SegmentMetadataView<'a> {
    segment: &'a MutableSegment,
}

impl<'a> SegmentMetadataView<'a> {
    pub(crate) fn new(segment: &'a MutableSegment) -> Self {
        SegmentMetadataView { segment }
    }

    pub fn segment_name(&self) -> &str {
        self.segment.segment_name()
    }

    pub fn total_docs(&self) -> u32 {
        self.segment.num_docs_indexed()
    }

    /// In a consuming segment raw and indexed doc counts coincide
    pub fn total_raw_docs(&self) -> u32 {
        self.segment.num_docs_indexed()
    }

    pub fn last_indexed_timestamp_ms(&self) -> Option<i64> {
        self.segment.last_indexed_time_ms()
    }

    pub fn latest_ingestion_timestamp_ms(&self) -> Option<i64> {
        self.segment.latest_ingestion_time_ms()
    }

    /// `(min, max)` over the time column, present once a row is indexed
    pub fn time_interval_ms(&self) -> Option<(i64, i64)> {
        match (self.segment.min_time(), self.segment.max_time()) {
            (Some(min), Some(max)) => Some((min, max)),
            _ => None,
        }
    }
}
