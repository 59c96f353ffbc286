//! Column names and structural checks on the caller's tables.
//!
//! Every check here runs before any relationship file is opened.

use std::collections::HashSet;

use polars::prelude::{col, lit, Column, DataType};
use tracing::warn;

use crate::aggregate::AggregateSpec;
use crate::error::{FrameRole, NetworkError, NetworkResult};
use crate::frame::Tabular;

/// Person identifier in the sample, characteristics and relationship tables.
pub const ID_COLUMN: &str = "RINPERSOON";

/// Alter identifier in relationship tables.
pub const ALTER_COLUMN: &str = "RINPERSOONRELATIE";

/// Relationship code in relationship tables.
pub const CODE_COLUMN: &str = "RELATIE";

/// Identifier namespace discriminator.
pub const NAMESPACE_COLUMN: &str = "RINPERSOONS";

/// Sample ego carried through the joins.
pub const SAMPLE_KEY: &str = "RINPERSOONsample";

fn require_column(frame: &dyn Tabular, role: FrameRole, column: &str) -> NetworkResult<Column> {
    frame
        .column_values(column)?
        .ok_or_else(|| NetworkError::schema(role, column, "column is missing"))
}

/// Checks the sample: identifier present, integral, non-null; namespace matches.
///
/// Duplicate identifiers are allowed and only logged, since the output keeps
/// one row per input row.
pub(crate) fn check_sample(sample: &dyn Tabular, namespace: &str) -> NetworkResult<()> {
    let ids = require_column(sample, FrameRole::Sample, ID_COLUMN)?;
    if !ids.dtype().is_integer() {
        return Err(NetworkError::schema(
            FrameRole::Sample,
            ID_COLUMN,
            format!("identifiers must be integers, found {}", ids.dtype()),
        ));
    }
    if ids.null_count() > 0 {
        return Err(NetworkError::schema(
            FrameRole::Sample,
            ID_COLUMN,
            format!("{} null identifiers", ids.null_count()),
        ));
    }
    if sample.contains_column(SAMPLE_KEY) {
        return Err(NetworkError::schema(
            FrameRole::Sample,
            SAMPLE_KEY,
            "column name is reserved",
        ));
    }

    let duplicates = ids.len() - ids.as_materialized_series().n_unique()?;
    if duplicates > 0 {
        warn!(duplicates, "sample contains repeated identifiers");
    }

    match sample.column_dtype(NAMESPACE_COLUMN)? {
        None => Ok(()),
        Some(DataType::String) => {
            let mismatched = sample.filter_rows(
                col(NAMESPACE_COLUMN)
                    .neq(lit(namespace))
                    .or(col(NAMESPACE_COLUMN).is_null()),
            )?;
            if mismatched.height() == 0 {
                return Ok(());
            }
            let found = mismatched
                .column(NAMESPACE_COLUMN)?
                .as_materialized_series()
                .str()?
                .get(0)
                .unwrap_or("null")
                .to_string();
            Err(NetworkError::schema(
                FrameRole::Sample,
                NAMESPACE_COLUMN,
                format!(
                    "expected '{}' but {} rows differ, first '{}'",
                    namespace,
                    mismatched.height(),
                    found
                ),
            ))
        }
        Some(other) => Err(NetworkError::schema(
            FrameRole::Sample,
            NAMESPACE_COLUMN,
            format!("expected text, found {}", other),
        )),
    }
}

/// Checks that the characteristics table has integral identifiers and every variable.
pub(crate) fn check_characteristics(
    characteristics: &dyn Tabular,
    variables: &[String],
) -> NetworkResult<()> {
    let id = require_column(characteristics, FrameRole::Characteristics, ID_COLUMN)?;
    if !(id.dtype().is_integer() || *id.dtype() == DataType::Null) {
        return Err(NetworkError::schema(
            FrameRole::Characteristics,
            ID_COLUMN,
            "identifiers must be integers",
        ));
    }

    for variable in variables {
        if variable == ID_COLUMN || variable == SAMPLE_KEY {
            return Err(NetworkError::schema(
                FrameRole::Characteristics,
                variable.as_str(),
                "identifier columns cannot be aggregated",
            ));
        }
        if !characteristics.contains_column(variable) {
            return Err(NetworkError::schema(
                FrameRole::Characteristics,
                variable.as_str(),
                "column is missing",
            ));
        }
    }
    Ok(())
}

/// Checks that every aggregate accepts its column's type.
pub(crate) fn check_aggregates(
    characteristics: &dyn Tabular,
    specs: &[AggregateSpec],
) -> NetworkResult<()> {
    for spec in specs {
        let dtype = characteristics
            .column_dtype(&spec.variable)?
            .unwrap_or(DataType::Null);
        if !spec.func.accepts(&dtype) {
            return Err(NetworkError::schema(
                FrameRole::Characteristics,
                spec.variable.as_str(),
                format!("{} cannot aggregate a {} column", spec.func, dtype),
            ));
        }
    }
    Ok(())
}

/// Rejects aggregate columns that would overwrite a sample column.
pub(crate) fn check_output_names(sample: &dyn Tabular, specs: &[AggregateSpec]) -> NetworkResult<()> {
    let mut names: HashSet<String> = HashSet::new();
    for spec in specs {
        let name = spec.output_name();
        if sample.contains_column(&name) || !names.insert(name.clone()) {
            return Err(NetworkError::schema(
                FrameRole::Sample,
                name,
                "output column already exists",
            ));
        }
    }
    Ok(())
}

/// Distinct sample identifiers in first-seen order.
pub(crate) fn sample_ids(sample: &dyn Tabular) -> NetworkResult<Vec<i64>> {
    let ids = require_column(sample, FrameRole::Sample, ID_COLUMN)?.cast(&DataType::Int64)?;
    let mut seen = HashSet::new();
    Ok(ids
        .as_materialized_series()
        .i64()?
        .into_iter()
        .flatten()
        .filter(|id| seen.insert(*id))
        .collect())
}
