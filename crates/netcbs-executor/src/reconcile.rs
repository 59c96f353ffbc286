//! Attaching aggregates back onto the sample.

use polars::prelude::{col, DataFrame, DataType, IntoLazy, JoinType};

use crate::error::{FrameRole, NetworkError, NetworkResult};
use crate::frame::Tabular;
use crate::schema::{ID_COLUMN, SAMPLE_KEY};

/// Left-joins aggregation results onto the full sample.
///
/// Every sample row appears exactly once, in its original position. Egos that
/// reached no alter with characteristics get null in every aggregate column.
#[derive(Clone, Copy)]
pub struct ResultReconciler<'a> {
    sample: &'a dyn Tabular,
}

impl<'a> ResultReconciler<'a> {
    /// Creates a reconciler for `sample`.
    pub fn new(sample: &'a dyn Tabular) -> Self {
        Self { sample }
    }

    /// Appends the aggregate columns of `aggregated` to the sample.
    ///
    /// `aggregated` is keyed by `RINPERSOONsample` with one row per ego.
    pub fn reconcile(&self, aggregated: &DataFrame) -> NetworkResult<DataFrame> {
        if !aggregated.contains_column(SAMPLE_KEY) {
            return Err(NetworkError::schema(
                FrameRole::Intermediate,
                SAMPLE_KEY,
                "column is missing",
            ));
        }
        let keyed = self
            .sample
            .to_frame()?
            .lazy()
            .with_column(col(ID_COLUMN).cast(DataType::Int64).alias(SAMPLE_KEY))
            .collect()?;
        let output = keyed
            .join_on(aggregated, SAMPLE_KEY, SAMPLE_KEY, JoinType::Left)?
            .drop(SAMPLE_KEY)?;

        if output.height() != self.sample.num_rows() {
            return Err(NetworkError::Frame(format!(
                "reconciled output has {} rows but the sample has {}",
                output.height(),
                self.sample.num_rows()
            )));
        }
        Ok(output)
    }
}
