//! Aggregation functions applied to the characteristics of reached alters.

use std::fmt;

use polars::prelude::{col, lit, when, DataType, Expr, NULL};

use crate::error::{NetworkError, NetworkResult};

/// A supported aggregation function.
///
/// Null values are skipped, as in SQL. Every function except `count`
/// returns null for a group without any non-null value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AggFunc {
    /// Arithmetic mean (`avg` or `mean`).
    Avg,
    /// Sum; keeps the column's type.
    Sum,
    /// Number of non-null values.
    Count,
    /// Smallest value.
    Min,
    /// Largest value.
    Max,
    /// Sample standard deviation; null for fewer than two values.
    StddevSamp,
}

impl AggFunc {
    /// Looks up a function by name, ignoring ASCII case.
    pub fn from_name(name: &str) -> Option<AggFunc> {
        match name.trim().to_ascii_lowercase().as_str() {
            "avg" | "mean" => Some(AggFunc::Avg),
            "sum" => Some(AggFunc::Sum),
            "count" => Some(AggFunc::Count),
            "min" => Some(AggFunc::Min),
            "max" => Some(AggFunc::Max),
            "stddev_samp" => Some(AggFunc::StddevSamp),
            _ => None,
        }
    }

    /// Canonical name.
    pub fn name(self) -> &'static str {
        match self {
            AggFunc::Avg => "avg",
            AggFunc::Sum => "sum",
            AggFunc::Count => "count",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
            AggFunc::StddevSamp => "stddev_samp",
        }
    }

    /// Returns true if the function can be applied to a column of `dtype`.
    pub fn accepts(self, dtype: &DataType) -> bool {
        let numeric = dtype.is_integer() || dtype.is_float() || *dtype == DataType::Null;
        match self {
            AggFunc::Count => true,
            AggFunc::Avg | AggFunc::Sum | AggFunc::StddevSamp => numeric,
            AggFunc::Min | AggFunc::Max => {
                numeric || matches!(dtype, DataType::String | DataType::Boolean)
            }
        }
    }

    /// Grouped aggregation of `column`.
    ///
    /// The result type depends only on the column's type: `avg` and
    /// `stddev_samp` give floats, `count` gives `Int64`, and the others keep
    /// the column type.
    pub fn expr(self, column: &str) -> Expr {
        let values = col(column);
        let present = col(column).count();
        match self {
            AggFunc::Avg => values.cast(DataType::Float64).mean(),
            // polars sums an all-null group to zero
            AggFunc::Sum => when(present.eq(lit(0)))
                .then(lit(NULL))
                .otherwise(values.sum()),
            AggFunc::Count => present.cast(DataType::Int64),
            AggFunc::Min => values.min(),
            AggFunc::Max => values.max(),
            AggFunc::StddevSamp => when(present.lt_eq(lit(1)))
                .then(lit(NULL))
                .otherwise(values.cast(DataType::Float64).std(1)),
        }
    }
}

impl fmt::Display for AggFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One `(function, variable)` pair to compute.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AggregateSpec {
    /// Function to apply.
    pub func: AggFunc,
    /// Function name as requested; used for the output column name.
    pub label: String,
    /// Characteristics column to aggregate.
    pub variable: String,
}

impl AggregateSpec {
    /// Creates a spec from a requested function name.
    pub fn new(name: &str, variable: impl Into<String>) -> NetworkResult<Self> {
        let func = AggFunc::from_name(name).ok_or_else(|| {
            NetworkError::UnsupportedAggregationFunction {
                name: name.to_string(),
            }
        })?;
        Ok(Self {
            func,
            label: name.trim().to_string(),
            variable: variable.into(),
        })
    }

    /// Output column name: `<function>_<variable>`.
    pub fn output_name(&self) -> String {
        format!("{}_{}", self.label, self.variable)
    }

    /// Aggregation expression, aliased to [`output_name`](Self::output_name).
    pub fn expr(&self) -> Expr {
        self.func.expr(&self.variable).alias(self.output_name())
    }
}

/// Builds one spec per `(function, variable)` pair, function-major.
///
/// Repeated function names are requested once. An empty function list is an
/// error.
pub fn resolve_specs(
    functions: &[String],
    variables: &[String],
) -> NetworkResult<Vec<AggregateSpec>> {
    if functions.is_empty() {
        return Err(NetworkError::NoAggregationFunctions);
    }
    let mut labels: Vec<&str> = Vec::with_capacity(functions.len());
    for name in functions {
        if AggFunc::from_name(name).is_none() {
            return Err(NetworkError::UnsupportedAggregationFunction { name: name.clone() });
        }
        if !labels.contains(&name.trim()) {
            labels.push(name.trim());
        }
    }

    let mut specs = Vec::with_capacity(labels.len() * variables.len());
    for label in labels {
        for variable in variables {
            specs.push(AggregateSpec::new(label, variable.clone())?);
        }
    }
    Ok(specs)
}
