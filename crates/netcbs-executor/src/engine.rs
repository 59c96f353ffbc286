//! Eager execution and the join/aggregate kernels shared with the plan graph.

use std::collections::{BTreeSet, HashMap};

use netcbs_query::Context;
use polars::prelude::{col, DataFrame, DataType, IntoLazy, JoinType, NamedFrom, Series};
use tracing::{info, warn};

use crate::aggregate::AggregateSpec;
use crate::error::NetworkResult;
use crate::frame::Tabular;
use crate::planner::ResolvedPlan;
use crate::reader::{RelationEdge, RelationReader, ScanStats};
use crate::result::{JoinCardinalityNotice, StageStats};
use crate::schema::{ID_COLUMN, SAMPLE_KEY};

/// `(sample ego, reached person)`.
pub(crate) type Pair = (i64, i64);

/// Output of either execution mode, before reconciliation.
#[derive(Debug, Clone)]
pub(crate) struct Execution {
    /// `SAMPLE_KEY` plus one column per aggregate, one row per reached ego.
    pub aggregated: DataFrame,
    pub notices: Vec<JoinCardinalityNotice>,
    pub stages: Vec<StageStats>,
}

/// Every sample ego reaches itself before the first hop.
pub(crate) fn seed_pairs(sample_ids: &[i64]) -> BTreeSet<Pair> {
    sample_ids.iter().map(|id| (*id, *id)).collect()
}

/// Joins the frontier with a stream of edges on `reached person == edge ego`.
///
/// `scan` drives the edge stream into the sink it is given. The result may
/// contain duplicate pairs.
pub(crate) fn join_edges<'p, F>(
    frontier: impl IntoIterator<Item = &'p Pair>,
    scan: F,
) -> NetworkResult<(Vec<Pair>, ScanStats)>
where
    F: FnOnce(&mut dyn FnMut(RelationEdge)) -> NetworkResult<ScanStats>,
{
    let mut egos_by_person: HashMap<i64, Vec<i64>> = HashMap::new();
    for (sample, person) in frontier {
        egos_by_person.entry(*person).or_default().push(*sample);
    }

    let mut joined = Vec::new();
    let stats = scan(&mut |edge: RelationEdge| {
        if let Some(samples) = egos_by_person.get(&edge.ego) {
            joined.extend(samples.iter().map(|sample| (*sample, edge.alter)));
        }
    })?;
    Ok((joined, stats))
}

/// Removes duplicate pairs; returns the distinct set and how many collapsed.
pub(crate) fn distinct(joined: Vec<Pair>) -> (BTreeSet<Pair>, u64) {
    let produced = joined.len();
    let pairs: BTreeSet<Pair> = joined.into_iter().collect();
    let collapsed = (produced - pairs.len()) as u64;
    (pairs, collapsed)
}

/// Builds the notice for a hop, logging it when pairs collapsed.
pub(crate) fn cardinality_notice(
    stage: usize,
    context: Context,
    collapsed: u64,
) -> Option<JoinCardinalityNotice> {
    if collapsed == 0 {
        return None;
    }
    let notice = JoinCardinalityNotice {
        stage,
        context,
        collapsed,
    };
    warn!(stage = stage + 1, %context, collapsed, "duplicate pairs collapsed");
    Some(notice)
}

/// Joins the final pairs with the characteristics and aggregates per sample ego.
///
/// Only the identifier and the variables are taken from `characteristics`;
/// the identifier is widened to `Int64` to match the pairs, and all-null
/// variables are read as `Float64`. Result types follow the characteristics
/// column types, whatever subset of rows is reached.
pub(crate) fn aggregate_pairs(
    pairs: &BTreeSet<Pair>,
    characteristics: &dyn Tabular,
    variables: &[String],
    aggregates: &[AggregateSpec],
) -> NetworkResult<DataFrame> {
    let pairs = DataFrame::new(vec![
        Series::new(
            SAMPLE_KEY.into(),
            pairs.iter().map(|(sample, _)| *sample).collect::<Vec<i64>>(),
        )
        .into(),
        Series::new(
            ID_COLUMN.into(),
            pairs.iter().map(|(_, alter)| *alter).collect::<Vec<i64>>(),
        )
        .into(),
    ])?;

    let mut columns: Vec<&str> = Vec::with_capacity(variables.len() + 1);
    columns.push(ID_COLUMN);
    columns.extend(variables.iter().map(String::as_str));
    let mut casts = vec![col(ID_COLUMN).cast(DataType::Int64)];
    for variable in variables {
        if characteristics.column_dtype(variable)? == Some(DataType::Null) {
            casts.push(col(variable.as_str()).cast(DataType::Float64));
        }
    }
    let alters = characteristics
        .select_columns(&columns)?
        .lazy()
        .with_columns(casts)
        .collect()?;

    let joined = pairs.join_on(&alters, ID_COLUMN, ID_COLUMN, JoinType::Inner)?;
    joined.group_aggregate(SAMPLE_KEY, aggregates)
}

/// Runs the plan hop by hop, materializing the distinct pairs after each hop.
pub(crate) fn execute_eager(
    plan: &ResolvedPlan,
    sample_ids: &[i64],
    characteristics: &dyn Tabular,
) -> NetworkResult<Execution> {
    let mut pairs = seed_pairs(sample_ids);
    let mut notices = Vec::new();
    let mut stages = Vec::with_capacity(plan.stages.len());
    let total = plan.stages.len();

    for resolved in &plan.stages {
        let stage = &resolved.stage;
        info!(
            hop = %stage.hop,
            step = stage.index + 1,
            total,
            "processing context"
        );

        let reader =
            RelationReader::new(&resolved.path, plan.format).with_codes(stage.codes.clone());
        let (joined, scan) = join_edges(&pairs, |sink| reader.for_each(sink))?;
        let (next, collapsed) = distinct(joined);
        notices.extend(cardinality_notice(stage.index, stage.hop.context, collapsed));

        info!(step = stage.index + 1, pairs = next.len(), "context joined");
        stages.push(StageStats {
            context: stage.hop.context,
            rows_read: scan.rows_read,
            rows_kept: scan.rows_kept,
            pairs: next.len(),
        });
        pairs = next;
    }

    info!("processing final aggregation");
    let aggregated = aggregate_pairs(&pairs, characteristics, &plan.variables, &plan.aggregates)?;
    Ok(Execution {
        aggregated,
        notices,
        stages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::df;

    fn scan_of(edges: Vec<RelationEdge>) -> impl FnOnce(&mut dyn FnMut(RelationEdge)) -> NetworkResult<ScanStats> {
        move |sink: &mut dyn FnMut(RelationEdge)| {
            let n = edges.len() as u64;
            for edge in edges {
                sink(edge);
            }
            Ok(ScanStats {
                rows_read: n,
                rows_kept: n,
            })
        }
    }

    fn edge(ego: i64, alter: i64) -> RelationEdge {
        RelationEdge {
            ego,
            alter,
            code: 301,
        }
    }

    #[test]
    fn test_join_edges_carries_sample_ego() {
        let frontier: BTreeSet<Pair> = [(1, 10), (2, 10), (3, 30)].into();
        let (joined, stats) =
            join_edges(&frontier, scan_of(vec![edge(10, 100), edge(30, 300), edge(99, 1)])).unwrap();
        let joined: BTreeSet<Pair> = joined.into_iter().collect();
        assert_eq!(joined, [(1, 100), (2, 100), (3, 300)].into());
        assert_eq!(stats.rows_read, 3);
    }

    #[test]
    fn test_distinct_counts_collapsed() {
        let (pairs, collapsed) = distinct(vec![(1, 10), (1, 10), (1, 11)]);
        assert_eq!(pairs.len(), 2);
        assert_eq!(collapsed, 1);
        assert!(cardinality_notice(0, Context::Family, 0).is_none());
        assert_eq!(
            cardinality_notice(1, Context::Family, collapsed).map(|n| n.stage),
            Some(1)
        );
    }

    fn ints(frame: &DataFrame, name: &str) -> Vec<Option<i64>> {
        let column = frame.column(name).unwrap();
        column.as_materialized_series().i64().unwrap().into_iter().collect()
    }

    #[test]
    fn test_aggregate_pairs() {
        let pairs: BTreeSet<Pair> = [(1, 10), (1, 11), (2, 20), (3, 99)].into();
        let chars = df!(
            ID_COLUMN => [10i64, 11, 20],
            "Income" => [1000i64, 2000, 3000]
        )
        .unwrap();
        let specs = vec![AggregateSpec::new("avg", "Income").unwrap()];
        let out = aggregate_pairs(&pairs, &chars, &["Income".to_string()], &specs).unwrap();

        assert_eq!(Tabular::column_names(&out), vec![SAMPLE_KEY, "avg_Income"]);
        assert_eq!(ints(&out, SAMPLE_KEY), vec![Some(1), Some(2)]);
        let avg = out.column("avg_Income").unwrap().as_materialized_series().clone();
        assert_eq!(
            avg.f64().unwrap().into_iter().collect::<Vec<_>>(),
            vec![Some(1500.0), Some(3000.0)]
        );
    }

    #[test]
    fn test_aggregate_pairs_type_follows_column() {
        let chars = df!(
            ID_COLUMN => [10i32, 20],
            "Income" => [100.0, 2.5]
        )
        .unwrap();
        let specs = vec![
            AggregateSpec::new("sum", "Income").unwrap(),
            AggregateSpec::new("max", "Income").unwrap(),
        ];
        let vars = ["Income".to_string()];
        let alone = aggregate_pairs(&[(1, 10)].into(), &chars, &vars, &specs).unwrap();
        let both = aggregate_pairs(&[(1, 10), (2, 20)].into(), &chars, &vars, &specs).unwrap();

        for name in ["sum_Income", "max_Income"] {
            assert_eq!(alone.column(name).unwrap().dtype(), &DataType::Float64);
            assert_eq!(both.column(name).unwrap().dtype(), &DataType::Float64);
            assert_eq!(
                alone.column(name).unwrap().get(0).unwrap(),
                both.column(name).unwrap().get(0).unwrap()
            );
        }
    }
}
