//! # netcbs-executor
//!
//! Executes netCBS network path queries over the CBS POPNET relationship
//! tables.
//!
//! Given a sample of persons, a table of person characteristics and a query
//! such as `[Income] -> Family[301] -> sample`, [`transform`] follows the
//! requested relationships hop by hop and aggregates the characteristics of
//! the persons reached, per sample member. The result has one row per sample
//! row; members who reach nobody get nulls.
//!
//! ## Quick Start
//!
//! ```no_run
//! use netcbs_executor::{transform, FileFormat, TransformOptions};
//! use polars::prelude::*;
//!
//! let sample = df!("RINPERSOON" => [1i64, 2, 3])?;
//! let income = df!(
//!     "RINPERSOON" => [10i64, 20],
//!     "Income" => [100i64, 200]
//! )?;
//!
//! let options = TransformOptions::builder()
//!     .with_cbsdata_path("G:/Bevolking")
//!     .with_format(FileFormat::Csv)
//!     .with_agg_funcs(["avg", "count"])
//!     .build();
//!
//! let output = transform("[Income] -> Family[301] -> sample", &sample, &income, &options)?;
//! println!("{}", output.table.into_data_frame()?);
//! # Ok::<(), netcbs_executor::NetworkError>(())
//! ```
//!
//! ## Pipeline
//!
//! ```text
//! query ─► parse/validate ─► schema checks ─► plan ─► resolve files
//!                                                        │
//!       output ◄─ reconcile ◄─ aggregate ◄─ hop joins ◄──┘
//! ```
//!
//! Every structural problem (syntax, unknown context or code, missing
//! column, unsupported function) is reported before any file is opened.
//!
//! ## Tables
//!
//! The engine reads input tables through the [`Tabular`] trait, which hands
//! out whole columns as polars `Column`s. Polars `DataFrame` and Arrow
//! `RecordBatch` implement it; so can any caller type that can produce its
//! columns. Joins and grouped aggregation run in polars.
//!
//! ## Feature Flags
//!
//! - `parallel` - Converts result columns to Arrow in parallel using rayon
//! - `serde` - Serialize/deserialize support for options, plans and notices

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod aggregate;
mod config;
mod engine;
mod error;
mod frame;
mod graph;
mod planner;
mod reader;
mod reconcile;
mod resolver;
mod result;
mod schema;
mod transform;

pub use aggregate::{resolve_specs, AggFunc, AggregateSpec};
pub use config::{
    ExecutionMode, OutputFormat, TransformOptions, TransformOptionsBuilder, DEFAULT_CBSDATA_PATH,
    DEFAULT_NAMESPACE, DEFAULT_YEAR,
};
pub use error::{FrameRole, NetworkError, NetworkResult};
pub use frame::{to_record_batch, Tabular};
pub use graph::{PlanGraph, PlanNode};
pub use planner::{
    JoinPlan, JoinStage, ResolvedPlan, ResolvedStage, TraversalPlanner, HOP_WARNING_THRESHOLD,
};
pub use reader::{RelationEdge, RelationReader, ScanStats};
pub use reconcile::ResultReconciler;
pub use resolver::{
    format_path, latest_version, relation_directory, FileFormat, RelationLocator,
    VersionedLocator, CONVERTED_DATA_DIR,
};
pub use result::{ExecutionStats, JoinCardinalityNotice, OutputTable, StageStats, TransformOutput};
pub use schema::{ALTER_COLUMN, CODE_COLUMN, ID_COLUMN, NAMESPACE_COLUMN, SAMPLE_KEY};
pub use transform::{explain, resolve_files, transform, validate_query};

// Re-export the query crate for convenience.
pub use netcbs_query;
