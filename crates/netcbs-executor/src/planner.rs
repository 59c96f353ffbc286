//! Traversal planning.
//!
//! A validated [`Query`] becomes a [`JoinPlan`] with one stage per hop. The
//! plan is resolved against the file system (or a custom locator) into a
//! [`ResolvedPlan`] before anything is read.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use netcbs_query::{Hop, Query, RelationCode};
use tracing::{debug, warn};

use crate::aggregate::AggregateSpec;
use crate::config::TransformOptions;
use crate::error::NetworkResult;
use crate::resolver::FileFormat;

/// Hop count above which a performance warning is logged.
pub const HOP_WARNING_THRESHOLD: usize = 4;

/// One hop of the traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JoinStage {
    /// Zero-based position; stage 0 starts from the sample.
    pub index: usize,
    /// The hop as written.
    pub hop: Hop,
    /// Concrete codes kept from the relationship file.
    pub codes: BTreeSet<RelationCode>,
}

impl fmt::Display for JoinStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codes: Vec<String> = self.codes.iter().map(|c| c.to_string()).collect();
        write!(f, "join {} on RELATIE in ({})", self.hop.context, codes.join(","))
    }
}

/// Ordered join stages plus the final aggregation.
///
/// # Example
///
/// ```rust
/// use netcbs_executor::{resolve_specs, TraversalPlanner};
/// use netcbs_query::compile;
///
/// let query = compile("[Income] -> Family[301] -> Neighbors[all] -> sample").unwrap();
/// let specs = resolve_specs(&["avg".to_string()], &query.variables).unwrap();
/// let plan = TraversalPlanner::new().plan(&query, specs);
///
/// assert_eq!(plan.stages.len(), 2);
/// println!("{}", plan);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JoinPlan {
    /// Normalized query text.
    pub query: String,
    /// Stages in ego→alter order.
    pub stages: Vec<JoinStage>,
    /// Aggregates computed after the last stage.
    pub aggregates: Vec<AggregateSpec>,
    /// Characteristics columns the aggregates read.
    pub variables: Vec<String>,
    /// Performance hints.
    pub hints: Vec<String>,
}

impl JoinPlan {
    /// Adds a hint.
    pub fn add_hint(&mut self, hint: impl Into<String>) {
        self.hints.push(hint.into());
    }

    /// Returns true if the plan has hints.
    pub fn has_hints(&self) -> bool {
        !self.hints.is_empty()
    }
}

impl fmt::Display for JoinPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Join Plan for: {}", self.query)?;
        writeln!(f)?;

        writeln!(f, "Stages:")?;
        for stage in &self.stages {
            writeln!(f, "  {}. {}", stage.index + 1, stage)?;
        }
        let aggregates: Vec<String> = self.aggregates.iter().map(|a| a.output_name()).collect();
        writeln!(f, "Aggregate: {}", aggregates.join(", "))?;

        if !self.hints.is_empty() {
            writeln!(f)?;
            writeln!(f, "Hints:")?;
            for hint in &self.hints {
                writeln!(f, "  - {}", hint)?;
            }
        }

        Ok(())
    }
}

/// A stage bound to the file it reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStage {
    /// The planned stage, with codes as returned by the locator.
    pub stage: JoinStage,
    /// Relationship file for the stage.
    pub path: PathBuf,
}

/// A plan whose stages all have files.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPlan {
    /// Resolved stages in ego→alter order.
    pub stages: Vec<ResolvedStage>,
    /// Aggregates computed after the last stage.
    pub aggregates: Vec<AggregateSpec>,
    /// Characteristics columns the aggregates read.
    pub variables: Vec<String>,
    /// Format of every file in `stages`.
    pub format: FileFormat,
}

/// Builds and resolves join plans.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraversalPlanner;

impl TraversalPlanner {
    /// Creates a new planner.
    pub fn new() -> Self {
        Self
    }

    /// Plans one stage per hop, each filtering on the hop's resolved codes.
    pub fn plan(&self, query: &Query, aggregates: Vec<AggregateSpec>) -> JoinPlan {
        let stages = query
            .hops
            .iter()
            .enumerate()
            .map(|(index, hop)| JoinStage {
                index,
                hop: hop.clone(),
                codes: hop.resolved_codes(),
            })
            .collect();

        let mut plan = JoinPlan {
            query: query.to_string(),
            stages,
            aggregates,
            variables: query.variables.clone(),
            hints: Vec::new(),
        };

        if query.hop_count() > HOP_WARNING_THRESHOLD {
            warn!(hops = query.hop_count(), "query has more than {} hops; may be slow", HOP_WARNING_THRESHOLD);
            plan.add_hint(format!(
                "{} hops exceed {}; every hop scans a full relationship table",
                query.hop_count(),
                HOP_WARNING_THRESHOLD
            ));
        }
        if let Some(stage) = plan.stages.iter().find(|s| s.hop.codes.is_all()) {
            plan.add_hint(format!(
                "{} selects every relationship code; an explicit list reads fewer pairs",
                stage.hop
            ));
        }

        debug!(plan = %plan, "planned traversal");
        plan
    }

    /// Binds every stage to a file through the configured locator.
    pub fn resolve(&self, plan: JoinPlan, options: &TransformOptions) -> NetworkResult<ResolvedPlan> {
        let stages = plan
            .stages
            .into_iter()
            .map(|stage| {
                let (path, codes) = options.locator.locate(
                    &stage.hop,
                    options.year,
                    &options.cbsdata_path,
                    options.format,
                )?;
                debug!(hop = %stage.hop, path = %path.display(), "resolved stage");
                Ok(ResolvedStage {
                    stage: JoinStage { codes, ..stage },
                    path,
                })
            })
            .collect::<NetworkResult<Vec<_>>>()?;

        Ok(ResolvedPlan {
            stages,
            aggregates: plan.aggregates,
            variables: plan.variables,
            format: options.format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use netcbs_query::compile;

    use crate::aggregate::resolve_specs;
    use crate::error::NetworkError;

    fn plan_for(query: &str) -> JoinPlan {
        let query = compile(query).unwrap();
        let specs = resolve_specs(&["avg".to_string()], &query.variables).unwrap();
        TraversalPlanner::new().plan(&query, specs)
    }

    #[test]
    fn test_stages_follow_sample_first_order() {
        let plan = plan_for("sample -> Family[301] -> Neighbors[101] -> [Income]");
        let contexts: Vec<_> = plan.stages.iter().map(|s| s.hop.context.name()).collect();
        assert_eq!(contexts, vec!["Family", "Neighbors"]);
        assert_eq!(plan.stages[0].codes, [301].into());
        assert!(!plan.has_hints());
    }

    #[test]
    fn test_all_codes_resolved() {
        let plan = plan_for("[Income] -> Housemates[all] -> sample");
        assert_eq!(&plan.stages[0].codes, netcbs_query::Context::Housemates.codes());
        assert!(plan.has_hints());
    }

    #[test]
    fn test_long_query_hint() {
        let plan = plan_for(
            "[X] -> Family[301] -> Family[301] -> Family[301] -> Family[301] -> Family[301] -> sample",
        );
        assert!(plan.hints.iter().any(|h| h.contains("5 hops")));
    }

    #[test]
    fn test_plan_display() {
        let rendered = plan_for("[Income] -> Family[302,301] -> sample").to_string();
        assert!(rendered.contains("1. join Family on RELATIE in (301,302)"));
        assert!(rendered.contains("Aggregate: avg_Income"));
    }

    #[test]
    fn test_resolve_uses_locator() {
        let options = TransformOptions::builder()
            .with_locator(
                |hop: &Hop,
                 year: i32,
                 base: &Path,
                 _format: FileFormat|
                 -> NetworkResult<(PathBuf, BTreeSet<RelationCode>)> {
                    Ok((
                        base.join(format!("{}-{}", hop.context, year)),
                        hop.resolved_codes(),
                    ))
                },
            )
            .with_cbsdata_path("/data")
            .build();
        let resolved = TraversalPlanner::new()
            .resolve(plan_for("[Income] -> Family[301] -> sample"), &options)
            .unwrap();
        assert_eq!(resolved.stages[0].path, PathBuf::from("/data/Family-2020"));
    }

    #[test]
    fn test_resolve_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let options = TransformOptions::builder()
            .with_cbsdata_path(dir.path())
            .build();
        let err = TraversalPlanner::new()
            .resolve(plan_for("[Income] -> Colleagues[all] -> sample"), &options)
            .unwrap_err();
        assert!(matches!(err, NetworkError::RelationFileNotFound { .. }));
    }
}
