//! Public entry points: validation, file resolution, planning and transform.

use std::time::Instant;

use netcbs_query::{compile, Query};
use tracing::{debug, info, warn};

use crate::aggregate::{resolve_specs, AggregateSpec};
use crate::config::{ExecutionMode, OutputFormat, TransformOptions};
use crate::engine::execute_eager;
use crate::error::NetworkResult;
use crate::frame::{to_record_batch, Tabular};
use crate::graph::PlanGraph;
use crate::planner::{JoinPlan, ResolvedStage, TraversalPlanner};
use crate::reconcile::ResultReconciler;
use crate::resolver::FileFormat;
use crate::result::{ExecutionStats, OutputTable, TransformOutput};
use crate::schema::{
    check_aggregates, check_characteristics, check_output_names, check_sample, sample_ids,
};

struct Prepared {
    query: Query,
    aggregates: Vec<AggregateSpec>,
}

/// Every check that needs no file system access, in reporting order.
fn prepare(
    query: &str,
    sample: &dyn Tabular,
    characteristics: &dyn Tabular,
    options: &TransformOptions,
) -> NetworkResult<Prepared> {
    let query = compile(query)?;
    check_sample(sample, &options.namespace)?;
    check_characteristics(characteristics, &query.variables)?;
    let aggregates = resolve_specs(&options.agg_funcs, &query.variables)?;
    check_aggregates(characteristics, &aggregates)?;
    check_output_names(sample, &aggregates)?;
    Ok(Prepared { query, aggregates })
}

/// Validates a query against the two input tables without touching any file.
///
/// Returns the normalized token sequence: `sample`, each hop outward from the
/// sample, then the variable list. Queries that differ only in direction,
/// spacing or code order give identical tokens.
///
/// # Example
///
/// ```rust
/// use netcbs_executor::{validate_query, TransformOptions};
/// use polars::prelude::*;
///
/// let sample = df!("RINPERSOON" => [1i64, 2]).unwrap();
/// let chars = df!(
///     "RINPERSOON" => [10i64, 20],
///     "Income" => [100i64, 200]
/// )
/// .unwrap();
///
/// let tokens = validate_query(
///     "sample -> Family[302, 301] -> [Income]",
///     &sample,
///     &chars,
///     &TransformOptions::default(),
/// )
/// .unwrap();
/// assert_eq!(tokens, vec!["sample", "Family[301,302]", "[Income]"]);
/// ```
pub fn validate_query(
    query: &str,
    sample: &dyn Tabular,
    characteristics: &dyn Tabular,
    options: &TransformOptions,
) -> NetworkResult<Vec<String>> {
    let prepared = prepare(query, sample, characteristics, options)?;
    Ok(prepared.query.tokens())
}

/// Plans a query without reading or resolving any file.
pub fn explain(query: &str, options: &TransformOptions) -> NetworkResult<JoinPlan> {
    let query = compile(query)?;
    let aggregates = resolve_specs(&options.agg_funcs, &query.variables)?;
    Ok(TraversalPlanner::new().plan(&query, aggregates))
}

/// Resolves the relationship file of every hop without reading any of them.
///
/// Fails with [`RelationFileNotFound`](crate::NetworkError::RelationFileNotFound)
/// for the first hop whose file is missing.
pub fn resolve_files(query: &str, options: &TransformOptions) -> NetworkResult<Vec<ResolvedStage>> {
    let plan = explain(query, options)?;
    let resolved = TraversalPlanner::new().resolve(plan, options)?;
    Ok(resolved.stages)
}

/// Computes network aggregates for every sample member.
///
/// Validation, planning and file resolution all complete before any
/// relationship file is read. The output holds every sample column followed by
/// one `<function>_<variable>` column per requested pair, with one row per
/// sample row in the original order.
pub fn transform(
    query: &str,
    sample: &dyn Tabular,
    characteristics: &dyn Tabular,
    options: &TransformOptions,
) -> NetworkResult<TransformOutput> {
    let start = Instant::now();
    let Prepared { query, aggregates } = prepare(query, sample, characteristics, options)?;
    info!(query = %query, year = options.year, "starting network transform");

    if options.format == FileFormat::Parquet {
        warn!(
            "parquet is faster but relies on \"geconverteerde data\", which may not exist for all tables"
        );
    }

    let planner = TraversalPlanner::new();
    let plan = planner.plan(&query, aggregates);
    let resolved = planner.resolve(plan, options)?;
    let ids = sample_ids(sample)?;

    let execution = match options.mode {
        ExecutionMode::Eager => execute_eager(&resolved, &ids, characteristics)?,
        ExecutionMode::Deferred => {
            let graph = PlanGraph::build(&resolved).optimize();
            debug!(graph = %graph, "optimized plan graph");
            graph.execute(&ids, characteristics)?
        }
    };

    let reconciled = ResultReconciler::new(sample).reconcile(&execution.aggregated)?;
    let table = match options.output {
        OutputFormat::DataFrame => OutputTable::DataFrame(reconciled),
        OutputFormat::RecordBatch => OutputTable::RecordBatch(to_record_batch(&reconciled)?),
    };

    let stats = ExecutionStats {
        duration: start.elapsed(),
        stages: execution.stages,
        reached_egos: execution.aggregated.height(),
    };
    info!(
        rows = table.num_rows(),
        reached = stats.reached_egos,
        elapsed_ms = stats.duration.as_millis() as u64,
        "network transform finished"
    );

    Ok(TransformOutput {
        table,
        notices: execution.notices,
        stats,
    })
}
