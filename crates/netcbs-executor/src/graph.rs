//! Deferred execution as an explicit plan graph.
//!
//! [`PlanGraph::build`] lays out the traversal as a tree of [`PlanNode`]s
//! without reading anything. [`PlanGraph::optimize`] rewrites the tree, and
//! execution walks it once. Results match eager execution exactly.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use netcbs_query::{Context, RelationCode};
use polars::prelude::DataFrame;
use tracing::{debug, info};

use crate::aggregate::AggregateSpec;
use crate::engine::{
    aggregate_pairs, cardinality_notice, distinct, join_edges, seed_pairs, Execution, Pair,
};
use crate::error::{NetworkError, NetworkResult};
use crate::frame::Tabular;
use crate::planner::ResolvedPlan;
use crate::reader::{RelationEdge, RelationReader, ScanStats};
use crate::result::{JoinCardinalityNotice, StageStats};
use crate::resolver::FileFormat;

/// A node of the deferred plan.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanNode {
    /// Distinct sample identifiers, each paired with itself.
    Sample,
    /// Edges of one relationship file, optionally restricted to `codes`.
    Scan {
        /// File to read.
        path: PathBuf,
        /// Its format.
        format: FileFormat,
        /// Codes applied while reading.
        codes: Option<BTreeSet<RelationCode>>,
    },
    /// Keeps edges whose code is in `codes`.
    Filter {
        /// Edge source.
        input: Box<PlanNode>,
        /// Accepted codes.
        codes: BTreeSet<RelationCode>,
    },
    /// Follows edges from the reached persons of `left`.
    Join {
        /// Hop index.
        stage: usize,
        /// Hop context.
        context: Context,
        /// Pair source.
        left: Box<PlanNode>,
        /// Edge source.
        right: Box<PlanNode>,
    },
    /// Removes duplicate pairs.
    Distinct {
        /// Hop index the pairs belong to.
        stage: usize,
        /// Hop context.
        context: Context,
        /// Pair source.
        input: Box<PlanNode>,
    },
    /// Joins pairs with the characteristics and aggregates per sample ego.
    Aggregate {
        /// Pair source.
        input: Box<PlanNode>,
        /// Characteristics columns read.
        variables: Vec<String>,
        /// Aggregates computed.
        aggregates: Vec<AggregateSpec>,
    },
}

impl PlanNode {
    fn label(&self) -> String {
        match self {
            PlanNode::Sample => "Sample".to_string(),
            PlanNode::Scan { path, format, codes } => match codes {
                Some(codes) => format!(
                    "Scan {} [{}] RELATIE in ({})",
                    path.display(),
                    format,
                    join_codes(codes)
                ),
                None => format!("Scan {} [{}]", path.display(), format),
            },
            PlanNode::Filter { codes, .. } => format!("Filter RELATIE in ({})", join_codes(codes)),
            PlanNode::Join { stage, context, .. } => format!("Join hop {} ({})", stage + 1, context),
            PlanNode::Distinct { stage, .. } => format!("Distinct hop {}", stage + 1),
            PlanNode::Aggregate { aggregates, .. } => {
                let names: Vec<String> = aggregates.iter().map(|a| a.output_name()).collect();
                format!("Aggregate {}", names.join(", "))
            }
        }
    }

    fn children(&self) -> Vec<&PlanNode> {
        match self {
            PlanNode::Sample | PlanNode::Scan { .. } => Vec::new(),
            PlanNode::Filter { input, .. }
            | PlanNode::Distinct { input, .. }
            | PlanNode::Aggregate { input, .. } => vec![input.as_ref()],
            PlanNode::Join { left, right, .. } => vec![left.as_ref(), right.as_ref()],
        }
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        writeln!(f, "{:indent$}{}", "", self.label(), indent = depth * 2)?;
        for child in self.children() {
            child.write_tree(f, depth + 1)?;
        }
        Ok(())
    }

    /// Pushes filters into scans and drops redundant distincts.
    fn optimize(self) -> PlanNode {
        match self {
            PlanNode::Filter { input, codes } => match input.optimize() {
                PlanNode::Scan {
                    path,
                    format,
                    codes: existing,
                } => {
                    let codes = match existing {
                        Some(existing) => existing.intersection(&codes).copied().collect(),
                        None => codes,
                    };
                    PlanNode::Scan {
                        path,
                        format,
                        codes: Some(codes),
                    }
                }
                other => PlanNode::Filter {
                    input: Box::new(other),
                    codes,
                },
            },
            PlanNode::Distinct {
                stage,
                context,
                input,
            } => match input.optimize() {
                inner @ PlanNode::Distinct { .. } => inner,
                other => PlanNode::Distinct {
                    stage,
                    context,
                    input: Box::new(other),
                },
            },
            PlanNode::Join {
                stage,
                context,
                left,
                right,
            } => PlanNode::Join {
                stage,
                context,
                left: Box::new(left.optimize()),
                right: Box::new(right.optimize()),
            },
            PlanNode::Aggregate {
                input,
                variables,
                aggregates,
            } => PlanNode::Aggregate {
                input: Box::new(input.optimize()),
                variables,
                aggregates,
            },
            leaf => leaf,
        }
    }
}

fn join_codes(codes: &BTreeSet<RelationCode>) -> String {
    codes
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// A deferred traversal rooted at an [`PlanNode::Aggregate`].
#[derive(Debug, Clone, PartialEq)]
pub struct PlanGraph {
    root: PlanNode,
}

impl PlanGraph {
    /// Lays out a resolved plan as `Aggregate(Distinct(Join(.., Filter(Scan))))`.
    pub fn build(plan: &ResolvedPlan) -> Self {
        let mut node = PlanNode::Sample;
        for resolved in &plan.stages {
            let stage = &resolved.stage;
            let edges = PlanNode::Filter {
                input: Box::new(PlanNode::Scan {
                    path: resolved.path.clone(),
                    format: plan.format,
                    codes: None,
                }),
                codes: stage.codes.clone(),
            };
            node = PlanNode::Distinct {
                stage: stage.index,
                context: stage.hop.context,
                input: Box::new(PlanNode::Join {
                    stage: stage.index,
                    context: stage.hop.context,
                    left: Box::new(node),
                    right: Box::new(edges),
                }),
            };
        }
        Self {
            root: PlanNode::Aggregate {
                input: Box::new(node),
                variables: plan.variables.clone(),
                aggregates: plan.aggregates.clone(),
            },
        }
    }

    /// Applies the rewrite rules.
    pub fn optimize(self) -> Self {
        Self {
            root: self.root.optimize(),
        }
    }

    /// Root node.
    pub fn root(&self) -> &PlanNode {
        &self.root
    }

    pub(crate) fn execute(
        &self,
        sample_ids: &[i64],
        characteristics: &dyn Tabular,
    ) -> NetworkResult<Execution> {
        let mut run = GraphRun {
            sample_ids,
            characteristics,
            notices: Vec::new(),
            stages: BTreeMap::new(),
        };
        let aggregated = run.table(&self.root)?;
        Ok(Execution {
            aggregated,
            notices: run.notices,
            stages: run.stages.into_values().collect(),
        })
    }
}

impl fmt::Display for PlanGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.root.write_tree(f, 0)
    }
}

struct GraphRun<'a> {
    sample_ids: &'a [i64],
    characteristics: &'a dyn Tabular,
    notices: Vec<JoinCardinalityNotice>,
    stages: BTreeMap<usize, StageStats>,
}

impl GraphRun<'_> {
    fn table(&mut self, node: &PlanNode) -> NetworkResult<DataFrame> {
        match node {
            PlanNode::Aggregate {
                input,
                variables,
                aggregates,
            } => {
                let pairs: BTreeSet<Pair> = self.pairs(input)?.into_iter().collect();
                info!("processing final aggregation");
                aggregate_pairs(&pairs, self.characteristics, variables, aggregates)
            }
            other => Err(unexpected(other, "an aggregate")),
        }
    }

    fn pairs(&mut self, node: &PlanNode) -> NetworkResult<Vec<Pair>> {
        match node {
            PlanNode::Sample => Ok(seed_pairs(self.sample_ids).into_iter().collect()),
            PlanNode::Join {
                stage,
                context,
                left,
                right,
            } => {
                let frontier = self.pairs(left)?;
                info!(step = stage + 1, %context, "processing context");
                let (joined, scan) = join_edges(&frontier, |sink| Self::edges(right, sink))?;
                self.stages.insert(
                    *stage,
                    StageStats {
                        context: *context,
                        rows_read: scan.rows_read,
                        rows_kept: scan.rows_kept,
                        pairs: joined.len(),
                    },
                );
                Ok(joined)
            }
            PlanNode::Distinct {
                stage,
                context,
                input,
            } => {
                let (pairs, collapsed) = distinct(self.pairs(input)?);
                self.notices
                    .extend(cardinality_notice(*stage, *context, collapsed));
                if let Some(stats) = self.stages.get_mut(stage) {
                    stats.pairs = pairs.len();
                }
                info!(step = stage + 1, pairs = pairs.len(), "context joined");
                Ok(pairs.into_iter().collect())
            }
            other => Err(unexpected(other, "a pair source")),
        }
    }

    fn edges(node: &PlanNode, sink: &mut dyn FnMut(RelationEdge)) -> NetworkResult<ScanStats> {
        match node {
            PlanNode::Scan {
                path,
                format,
                codes,
            } => {
                let reader = RelationReader::new(path, *format);
                let reader = match codes {
                    Some(codes) => reader.with_codes(codes.clone()),
                    None => reader,
                };
                reader.for_each(sink)
            }
            PlanNode::Filter { input, codes } => {
                let mut kept = 0u64;
                let stats = Self::edges(input, &mut |edge: RelationEdge| {
                    if codes.contains(&edge.code) {
                        kept += 1;
                        sink(edge);
                    }
                })?;
                Ok(ScanStats {
                    rows_read: stats.rows_read,
                    rows_kept: kept,
                })
            }
            other => Err(unexpected(other, "an edge source")),
        }
    }
}

fn unexpected(node: &PlanNode, expected: &str) -> NetworkError {
    debug!(node = %node.label(), expected, "malformed plan graph");
    NetworkError::Frame(format!("plan node '{}' is not {}", node.label(), expected))
}
