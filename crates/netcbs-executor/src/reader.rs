//! Streaming readers for relationship tables.
//!
//! Edges flow through a callback one at a time; a relationship table is never
//! held in memory. An optional code predicate is applied while reading.

use std::collections::BTreeSet;
use std::fs::File;
use std::path::{Path, PathBuf};

use arrow_array::cast::AsArray;
use arrow_array::types::{
    Int16Type, Int32Type, Int64Type, Int8Type, UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};
use arrow_array::Array;
use arrow_schema::DataType as ArrowType;
use netcbs_query::RelationCode;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ProjectionMask;
use tracing::debug;

use crate::error::{NetworkError, NetworkResult};
use crate::resolver::FileFormat;
use crate::schema::{ALTER_COLUMN, CODE_COLUMN, ID_COLUMN};

/// One row of a relationship table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RelationEdge {
    /// `RINPERSOON`.
    pub ego: i64,
    /// `RINPERSOONRELATIE`.
    pub alter: i64,
    /// `RELATIE`.
    pub code: RelationCode,
}

/// Row counts from one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanStats {
    /// Rows read from the file.
    pub rows_read: u64,
    /// Rows passed to the sink.
    pub rows_kept: u64,
}

/// Reads one relationship file.
#[derive(Debug, Clone)]
pub struct RelationReader {
    path: PathBuf,
    format: FileFormat,
    codes: Option<BTreeSet<RelationCode>>,
}

impl RelationReader {
    /// Creates a reader that yields every edge.
    pub fn new(path: impl Into<PathBuf>, format: FileFormat) -> Self {
        Self {
            path: path.into(),
            format,
            codes: None,
        }
    }

    /// Only yields edges whose code is in `codes`.
    pub fn with_codes(mut self, codes: BTreeSet<RelationCode>) -> Self {
        self.codes = Some(codes);
        self
    }

    /// File being read.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Streams every matching edge into `sink`.
    pub fn for_each(&self, mut sink: impl FnMut(RelationEdge)) -> NetworkResult<ScanStats> {
        let mut stats = ScanStats::default();
        let codes = self.codes.as_ref();
        let mut accept = |edge: RelationEdge| {
            stats.rows_read += 1;
            if codes.map_or(true, |c| c.contains(&edge.code)) {
                stats.rows_kept += 1;
                sink(edge);
            }
        };
        match self.format {
            FileFormat::Csv => read_csv(&self.path, &mut accept)?,
            FileFormat::Parquet => read_parquet(&self.path, &mut accept)?,
        }
        debug!(
            path = %self.path.display(),
            rows_read = stats.rows_read,
            rows_kept = stats.rows_kept,
            "scanned relationship file"
        );
        Ok(stats)
    }

    /// Collects every matching edge.
    pub fn read_all(&self) -> NetworkResult<Vec<RelationEdge>> {
        let mut edges = Vec::new();
        self.for_each(|edge| edges.push(edge))?;
        Ok(edges)
    }
}

fn parse_id(path: &Path, column: &str, field: &str) -> NetworkResult<Option<i64>> {
    let field = field.trim();
    if field.is_empty() {
        return Ok(None);
    }
    field
        .parse()
        .map(Some)
        .map_err(|_| NetworkError::read(path, format!("invalid {} '{}'", column, field)))
}

fn read_csv(path: &Path, sink: &mut dyn FnMut(RelationEdge)) -> NetworkResult<()> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .from_path(path)
        .map_err(|e| NetworkError::read(path, e))?;

    let headers = reader
        .headers()
        .map_err(|e| NetworkError::read(path, e))?
        .clone();
    let find = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| NetworkError::read(path, format!("missing column '{}'", name)))
    };
    let (ego, alter, code) = (find(ID_COLUMN)?, find(ALTER_COLUMN)?, find(CODE_COLUMN)?);

    let mut record = csv::StringRecord::new();
    while reader
        .read_record(&mut record)
        .map_err(|e| NetworkError::read(path, e))?
    {
        let field = |i: usize| record.get(i).unwrap_or("");
        let (Some(e), Some(a), Some(c)) = (
            parse_id(path, ID_COLUMN, field(ego))?,
            parse_id(path, ALTER_COLUMN, field(alter))?,
            parse_id(path, CODE_COLUMN, field(code))?,
        ) else {
            continue;
        };
        if let Ok(code) = RelationCode::try_from(c) {
            sink(RelationEdge {
                ego: e,
                alter: a,
                code,
            });
        }
    }
    Ok(())
}

macro_rules! primitive_ids {
    ($array:expr, $ty:ty) => {
        $array
            .as_primitive::<$ty>()
            .iter()
            .map(|v| v.and_then(|x| i64::try_from(x).ok()))
            .collect()
    };
}

/// Widens an integer or numeric-string column to `i64`.
fn id_column(path: &Path, name: &str, array: &dyn Array) -> NetworkResult<Vec<Option<i64>>> {
    let ids: Vec<Option<i64>> = match array.data_type() {
        ArrowType::Int8 => primitive_ids!(array, Int8Type),
        ArrowType::Int16 => primitive_ids!(array, Int16Type),
        ArrowType::Int32 => primitive_ids!(array, Int32Type),
        ArrowType::Int64 => primitive_ids!(array, Int64Type),
        ArrowType::UInt8 => primitive_ids!(array, UInt8Type),
        ArrowType::UInt16 => primitive_ids!(array, UInt16Type),
        ArrowType::UInt32 => primitive_ids!(array, UInt32Type),
        ArrowType::UInt64 => primitive_ids!(array, UInt64Type),
        ArrowType::Utf8 => array
            .as_string::<i32>()
            .iter()
            .map(|v| v.map(|s| parse_id(path, name, s)).transpose())
            .collect::<NetworkResult<Vec<_>>>()?
            .into_iter()
            .map(Option::flatten)
            .collect(),
        ArrowType::LargeUtf8 => array
            .as_string::<i64>()
            .iter()
            .map(|v| v.map(|s| parse_id(path, name, s)).transpose())
            .collect::<NetworkResult<Vec<_>>>()?
            .into_iter()
            .map(Option::flatten)
            .collect(),
        other => {
            return Err(NetworkError::read(
                path,
                format!("column '{}' has unsupported type {}", name, other),
            ))
        }
    };
    Ok(ids)
}

fn read_parquet(path: &Path, sink: &mut dyn FnMut(RelationEdge)) -> NetworkResult<()> {
    let file = File::open(path).map_err(|e| NetworkError::read(path, e))?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| NetworkError::read(path, e))?;

    let schema = builder.schema().clone();
    let indices = [ID_COLUMN, ALTER_COLUMN, CODE_COLUMN]
        .iter()
        .map(|name| {
            schema
                .index_of(name)
                .map_err(|_| NetworkError::read(path, format!("missing column '{}'", name)))
        })
        .collect::<NetworkResult<Vec<usize>>>()?;
    let mask = ProjectionMask::roots(builder.parquet_schema(), indices);

    let reader = builder
        .with_projection(mask)
        .build()
        .map_err(|e| NetworkError::read(path, e))?;

    for batch in reader {
        let batch = batch.map_err(|e| NetworkError::read(path, e))?;
        let column = |name: &str| {
            batch
                .column_by_name(name)
                .ok_or_else(|| NetworkError::read(path, format!("missing column '{}'", name)))
                .and_then(|array| id_column(path, name, array.as_ref()))
        };
        let egos = column(ID_COLUMN)?;
        let alters = column(ALTER_COLUMN)?;
        let codes = column(CODE_COLUMN)?;

        for ((ego, alter), code) in egos.into_iter().zip(alters).zip(codes) {
            let (Some(ego), Some(alter), Some(code)) = (ego, alter, code) else {
                continue;
            };
            if let Ok(code) = RelationCode::try_from(code) {
                sink(RelationEdge { ego, alter, code });
            }
        }
    }
    Ok(())
}
