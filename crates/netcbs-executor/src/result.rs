//! Results of a network transform.

use std::fmt;
use std::time::Duration;

use arrow_array::RecordBatch;
use netcbs_query::Context;
use polars::prelude::{Column, DataFrame};

use crate::error::NetworkResult;
use crate::frame::{to_record_batch, Tabular};

/// Output table in the representation requested by
/// [`OutputFormat`](crate::OutputFormat).
#[derive(Debug, Clone)]
pub enum OutputTable {
    /// A polars frame.
    DataFrame(DataFrame),
    /// An Arrow record batch.
    RecordBatch(RecordBatch),
}

impl OutputTable {
    /// Converts to a polars frame.
    pub fn into_data_frame(self) -> NetworkResult<DataFrame> {
        match self {
            OutputTable::DataFrame(frame) => Ok(frame),
            OutputTable::RecordBatch(batch) => batch.to_frame(),
        }
    }

    /// Converts to an Arrow record batch.
    pub fn into_record_batch(self) -> NetworkResult<RecordBatch> {
        match self {
            OutputTable::DataFrame(frame) => to_record_batch(&frame),
            OutputTable::RecordBatch(batch) => Ok(batch),
        }
    }
}

impl Tabular for OutputTable {
    fn column_names(&self) -> Vec<String> {
        match self {
            OutputTable::DataFrame(frame) => Tabular::column_names(frame),
            OutputTable::RecordBatch(batch) => Tabular::column_names(batch),
        }
    }

    fn num_rows(&self) -> usize {
        match self {
            OutputTable::DataFrame(frame) => frame.height(),
            OutputTable::RecordBatch(batch) => batch.num_rows(),
        }
    }

    fn column_values(&self, name: &str) -> NetworkResult<Option<Column>> {
        match self {
            OutputTable::DataFrame(frame) => frame.column_values(name),
            OutputTable::RecordBatch(batch) => batch.column_values(name),
        }
    }

    fn to_frame(&self) -> NetworkResult<DataFrame> {
        match self {
            OutputTable::DataFrame(frame) => Ok(frame.clone()),
            OutputTable::RecordBatch(batch) => batch.to_frame(),
        }
    }
}

/// Duplicate (sample ego, alter) pairs that were merged after a hop.
///
/// Each reached alter counts once per sample ego, however many edges or
/// intermediate persons lead to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JoinCardinalityNotice {
    /// Zero-based hop index.
    pub stage: usize,
    /// Context of the hop.
    pub context: Context,
    /// Number of pairs removed.
    pub collapsed: u64,
}

impl fmt::Display for JoinCardinalityNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hop {} ({}): {} duplicate pairs collapsed",
            self.stage + 1,
            self.context,
            self.collapsed
        )
    }
}

/// Row counts for one hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageStats {
    /// Context of the hop.
    pub context: Context,
    /// Relationship rows read.
    pub rows_read: u64,
    /// Rows that passed the code filter.
    pub rows_kept: u64,
    /// Distinct (sample ego, alter) pairs after the hop.
    pub pairs: usize,
}

/// Statistics from a transform.
#[derive(Debug, Clone, Default)]
pub struct ExecutionStats {
    /// Total execution duration.
    pub duration: Duration,
    /// Per-hop counts, in hop order.
    pub stages: Vec<StageStats>,
    /// Sample egos with at least one aggregated alter.
    pub reached_egos: usize,
}

impl ExecutionStats {
    /// Total relationship rows read across hops.
    pub fn rows_read(&self) -> u64 {
        self.stages.iter().map(|s| s.rows_read).sum()
    }
}

/// Everything a transform returns.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    /// Sample columns followed by one column per aggregate.
    pub table: OutputTable,
    /// Non-fatal deduplication notices.
    pub notices: Vec<JoinCardinalityNotice>,
    /// Execution statistics.
    pub stats: ExecutionStats,
}

impl TransformOutput {
    /// Returns true if any hop collapsed duplicate pairs.
    pub fn has_notices(&self) -> bool {
        !self.notices.is_empty()
    }
}
