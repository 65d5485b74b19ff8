use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

use crate::core::error::Result;

/// Per-column statistics captured when a segment is destroyed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnStats {
    pub cardinality: u32,
    pub avg_column_size: f64,
}

/// One stats record per completed segment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentStats {
    pub num_rows_consumed: u32,
    pub num_rows_indexed: u32,
    pub mem_used_bytes: u64,
    pub num_seconds: u32,
    pub column_stats: HashMap<String, ColumnStats>,
    pub created_at: DateTime<Utc>,
}

impl SegmentStats {
    pub fn new() -> Self {
        SegmentStats {
            num_rows_consumed: 0,
            num_rows_indexed: 0,
            mem_used_bytes: 0,
            num_seconds: 0,
            column_stats: HashMap::new(),
            created_at: Utc::now(),
        }
    }
}

impl Default for SegmentStats {
    fn default() -> Self {
        Self::new()
    }
}

// Fallbacks used until the history has at least one record for a column
const DEFAULT_EST_CARDINALITY: u32 = 100;
const DEFAULT_EST_AVG_COL_SIZE: usize = 32;
const MAX_HISTORY_ENTRIES: usize = 10;

/// Process-wide append-only log of per-segment statistics.
///
/// Read at segment construction to size dictionaries and the record-id
/// map; appended to once per segment at destroy time. File records are
/// framed as `[len u32 LE][crc32 u32 LE][bincode payload]`.
pub struct StatsHistory {
    path: Option<PathBuf>,
    entries: Mutex<Vec<SegmentStats>>,
}

impl StatsHistory {
    /// History with no backing file, starts empty
    pub fn in_memory() -> Arc<Self> {
        Arc::new(StatsHistory {
            path: None,
            entries: Mutex::new(Vec::new()),
        })
    }

    /// Load from `path`, creating the file on first use. A corrupt or
    /// truncated tail ends the load at the last good record.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Arc<Self>> {
        let path = path.as_ref().to_path_buf();
        let mut entries = Vec::new();
        if path.exists() {
            let mut file = File::open(&path)?;
            let mut data = Vec::new();
            file.read_to_end(&mut data)?;
            let mut pos = 0;
            while pos + 8 <= data.len() {
                let len = u32::from_le_bytes(data[pos..pos + 4].try_into().unwrap()) as usize;
                let crc = u32::from_le_bytes(data[pos + 4..pos + 8].try_into().unwrap());
                if pos + 8 + len > data.len() {
                    warn!(path = %path.display(), "Truncated stats record, ignoring tail");
                    break;
                }
                let payload = &data[pos + 8..pos + 8 + len];
                if crc32fast::hash(payload) != crc {
                    warn!(path = %path.display(), "Stats record checksum mismatch, ignoring tail");
                    break;
                }
                match bincode::deserialize::<SegmentStats>(payload) {
                    Ok(stats) => entries.push(stats),
                    Err(err) => {
                        warn!(path = %path.display(), %err, "Undecodable stats record, ignoring tail");
                        break;
                    }
                }
                pos += 8 + len;
            }
            if entries.len() > MAX_HISTORY_ENTRIES {
                entries.drain(..entries.len() - MAX_HISTORY_ENTRIES);
            }
        }
        Ok(Arc::new(StatsHistory {
            path: Some(path),
            entries: Mutex::new(entries),
        }))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Mean cardinality of `column` across the history
    pub fn estimated_cardinality(&self, column: &str) -> u32 {
        let entries = self.entries.lock();
        let values: Vec<u32> = entries
            .iter()
            .filter_map(|e| e.column_stats.get(column).map(|c| c.cardinality))
            .collect();
        if values.is_empty() {
            DEFAULT_EST_CARDINALITY
        } else {
            (values.iter().map(|v| *v as u64).sum::<u64>() / values.len() as u64) as u32
        }
    }

    /// Mean average value size of `column` across the history, in bytes
    pub fn estimated_avg_col_size(&self, column: &str) -> usize {
        let entries = self.entries.lock();
        let values: Vec<f64> = entries
            .iter()
            .filter_map(|e| e.column_stats.get(column).map(|c| c.avg_column_size))
            .collect();
        if values.is_empty() {
            DEFAULT_EST_AVG_COL_SIZE
        } else {
            (values.iter().sum::<f64>() / values.len() as f64).ceil() as usize
        }
    }

    /// Mean rows indexed per segment across the history
    pub fn estimated_rows_to_index(&self) -> u32 {
        let entries = self.entries.lock();
        if entries.is_empty() {
            return 0;
        }
        (entries.iter().map(|e| e.num_rows_indexed as u64).sum::<u64>() / entries.len() as u64)
            as u32
    }

    pub fn add_segment_stats(&self, stats: SegmentStats) -> Result<()> {
        let mut entries = self.entries.lock();
        if let Some(path) = &self.path {
            let payload = bincode::serialize(&stats)?;
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            file.write_all(&(payload.len() as u32).to_le_bytes())?;
            file.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
            file.write_all(&payload)?;
        }
        entries.push(stats);
        if entries.len() > MAX_HISTORY_ENTRIES {
            entries.remove(0);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats_for(column: &str, cardinality: u32, avg_size: f64, rows: u32) -> SegmentStats {
        let mut stats = SegmentStats::new();
        stats.num_rows_consumed = rows;
        stats.num_rows_indexed = rows;
        stats.column_stats.insert(
            column.to_string(),
            ColumnStats {
                cardinality,
                avg_column_size: avg_size,
            },
        );
        stats
    }

    #[test]
    fn defaults_when_empty() {
        let history = StatsHistory::in_memory();
        assert!(history.is_empty());
        assert_eq!(history.estimated_cardinality("dim"), 100);
        assert_eq!(history.estimated_avg_col_size("dim"), 32);
        assert_eq!(history.estimated_rows_to_index(), 0);
    }

    #[test]
    fn estimates_are_means() {
        let history = StatsHistory::in_memory();
        history
            .add_segment_stats(stats_for("dim", 10, 8.0, 100))
            .unwrap();
        history
            .add_segment_stats(stats_for("dim", 30, 16.0, 300))
            .unwrap();
        assert_eq!(history.estimated_cardinality("dim"), 20);
        assert_eq!(history.estimated_avg_col_size("dim"), 12);
        assert_eq!(history.estimated_rows_to_index(), 200);
        // Unknown column still falls back
        assert_eq!(history.estimated_cardinality("other"), 100);
    }

    #[test]
    fn persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.history");
        {
            let history = StatsHistory::load(&path).unwrap();
            history
                .add_segment_stats(stats_for("dim", 42, 6.0, 1000))
                .unwrap();
        }
        let reloaded = StatsHistory::load(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.estimated_cardinality("dim"), 42);
    }

    #[test]
    fn corrupt_tail_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.history");
        {
            let history = StatsHistory::load(&path).unwrap();
            history
                .add_segment_stats(stats_for("dim", 42, 6.0, 1000))
                .unwrap();
        }
        // Append garbage
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[7, 0, 0, 0, 1, 2, 3, 4, 9, 9]).unwrap();
        drop(file);
        let reloaded = StatsHistory::load(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn history_is_bounded() {
        let history = StatsHistory::in_memory();
        for i in 0..20 {
            history
                .add_segment_stats(stats_for("dim", i, 1.0, i))
                .unwrap();
        }
        assert_eq!(history.len(), MAX_HISTORY_ENTRIES);
        // Oldest entries evicted, mean reflects the last 10
        assert_eq!(history.estimated_cardinality("dim"), 14);
    }
}
