//! The tabular capability interface and its adapters.
//!
//! [`Tabular`] is the seam between the engine and whatever table type the
//! caller holds. Implementors expose column names and whole columns as
//! polars [`Column`]s; filtering, projection, joins and grouped aggregation
//! are provided on top and run in polars. Adapters exist for polars
//! [`DataFrame`] and Arrow [`RecordBatch`].

use std::sync::Arc;

use arrow_array::cast::AsArray;
use arrow_array::types::{
    Float32Type, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type, UInt16Type, UInt32Type,
    UInt64Type, UInt8Type,
};
use arrow_array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int64Array, NullArray, RecordBatch, StringArray,
    UInt64Array,
};
use arrow_schema::{DataType as ArrowType, Field, Schema};
use polars::prelude::{
    col, Column, DataFrame, DataType, Expr, IntoLazy, JoinArgs, JoinType, NamedFrom, PlSmallStr,
    Series, SortMultipleOptions,
};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::aggregate::AggregateSpec;
use crate::error::{FrameRole, NetworkError, NetworkResult};

/// Row position carried through joins so the left order can be restored.
const ROW_INDEX: &str = "__row";

/// Read access to a rectangular table, plus relational operations built on it.
pub trait Tabular {
    /// Column names in order.
    fn column_names(&self) -> Vec<String>;

    /// Number of rows.
    fn num_rows(&self) -> usize;

    /// A whole column, or `None` if the table has no column called `name`.
    fn column_values(&self, name: &str) -> NetworkResult<Option<Column>>;

    /// Returns true if the table has a column called `name`.
    fn contains_column(&self, name: &str) -> bool {
        self.column_names().iter().any(|c| c == name)
    }

    /// Type of a column.
    fn column_dtype(&self, name: &str) -> NetworkResult<Option<DataType>> {
        Ok(self.column_values(name)?.map(|c| c.dtype().clone()))
    }

    /// Projects the named columns, in the given order.
    fn select_columns(&self, names: &[&str]) -> NetworkResult<DataFrame> {
        let columns = names
            .iter()
            .map(|name| {
                self.column_values(name)?.ok_or_else(|| {
                    NetworkError::schema(FrameRole::Intermediate, *name, "column is missing")
                })
            })
            .collect::<NetworkResult<Vec<Column>>>()?;
        Ok(DataFrame::new(columns)?)
    }

    /// The whole table as a polars frame.
    fn to_frame(&self) -> NetworkResult<DataFrame> {
        let names = self.column_names();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        self.select_columns(&names)
    }

    /// Keeps the rows for which `predicate` is true.
    fn filter_rows(&self, predicate: Expr) -> NetworkResult<DataFrame> {
        Ok(self.to_frame()?.lazy().filter(predicate).collect()?)
    }

    /// Equi-join on `left_on == right_on`.
    ///
    /// Output columns are every left column followed by every right column
    /// except `right_on`; right names that clash get a `_right` suffix. Left
    /// row order is preserved, and null keys never match. Key columns must
    /// have the same type.
    fn join_on(
        &self,
        right: &dyn Tabular,
        left_on: &str,
        right_on: &str,
        how: JoinType,
    ) -> NetworkResult<DataFrame> {
        if !self.contains_column(left_on) {
            return Err(NetworkError::schema(
                FrameRole::Intermediate,
                left_on,
                "join key is missing",
            ));
        }
        if !right.contains_column(right_on) {
            return Err(NetworkError::schema(
                FrameRole::Intermediate,
                right_on,
                "join key is missing",
            ));
        }

        let joined = self
            .to_frame()?
            .lazy()
            .with_row_index(ROW_INDEX, None)
            .join(
                right.to_frame()?.lazy(),
                [col(left_on)],
                [col(right_on)],
                JoinArgs::new(how),
            )
            .sort_by_exprs(
                [col(ROW_INDEX)],
                SortMultipleOptions::default().with_maintain_order(true),
            )
            .collect()?;
        Ok(joined.drop(ROW_INDEX)?)
    }

    /// Groups rows by `by` and computes every aggregate per group.
    ///
    /// Groups come out in ascending key order; rows with a null key are
    /// dropped. The output holds `by` followed by one column per spec, named
    /// by [`AggregateSpec::output_name`].
    fn group_aggregate(&self, by: &str, aggregates: &[AggregateSpec]) -> NetworkResult<DataFrame> {
        if !self.contains_column(by) {
            return Err(NetworkError::schema(
                FrameRole::Intermediate,
                by,
                "group key is missing",
            ));
        }
        if let Some(spec) = aggregates
            .iter()
            .find(|spec| !self.contains_column(&spec.variable))
        {
            return Err(NetworkError::schema(
                FrameRole::Intermediate,
                spec.variable.as_str(),
                "aggregation column is missing",
            ));
        }

        let exprs: Vec<Expr> = aggregates.iter().map(AggregateSpec::expr).collect();
        let grouped = self
            .to_frame()?
            .lazy()
            .filter(col(by).is_not_null())
            .group_by([col(by)])
            .agg(exprs)
            .sort_by_exprs([col(by)], SortMultipleOptions::default())
            .collect()?;
        Ok(grouped)
    }
}

impl Tabular for DataFrame {
    fn column_names(&self) -> Vec<String> {
        self.get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect()
    }

    fn num_rows(&self) -> usize {
        self.height()
    }

    fn column_values(&self, name: &str) -> NetworkResult<Option<Column>> {
        Ok(DataFrame::column(self, name).ok().cloned())
    }

    fn to_frame(&self) -> NetworkResult<DataFrame> {
        Ok(self.clone())
    }
}

impl Tabular for RecordBatch {
    fn column_names(&self) -> Vec<String> {
        self.schema()
            .fields()
            .iter()
            .map(|field| field.name().clone())
            .collect()
    }

    fn num_rows(&self) -> usize {
        RecordBatch::num_rows(self)
    }

    fn column_values(&self, name: &str) -> NetworkResult<Option<Column>> {
        self.column_by_name(name)
            .map(|array| arrow_to_column(name, array))
            .transpose()
    }
}

macro_rules! widened {
    ($name:expr, $array:expr, $ty:ty, $native:ty) => {
        Series::new(
            $name,
            $array
                .as_primitive::<$ty>()
                .iter()
                .map(|v| v.map(<$native>::from))
                .collect::<Vec<Option<$native>>>(),
        )
    };
}

/// Copies an Arrow array into a polars column.
///
/// Integers up to 32 bits widen to `Int64` and floats to `Float64`.
pub(crate) fn arrow_to_column(name: &str, array: &ArrayRef) -> NetworkResult<Column> {
    let name = PlSmallStr::from(name);
    let series = match array.data_type() {
        ArrowType::Int8 => widened!(name, array, Int8Type, i64),
        ArrowType::Int16 => widened!(name, array, Int16Type, i64),
        ArrowType::Int32 => widened!(name, array, Int32Type, i64),
        ArrowType::Int64 => widened!(name, array, Int64Type, i64),
        ArrowType::UInt8 => widened!(name, array, UInt8Type, i64),
        ArrowType::UInt16 => widened!(name, array, UInt16Type, i64),
        ArrowType::UInt32 => widened!(name, array, UInt32Type, i64),
        ArrowType::UInt64 => widened!(name, array, UInt64Type, u64),
        ArrowType::Float32 => widened!(name, array, Float32Type, f64),
        ArrowType::Float64 => widened!(name, array, Float64Type, f64),
        ArrowType::Boolean => Series::new(
            name,
            array.as_boolean().iter().collect::<Vec<Option<bool>>>(),
        ),
        ArrowType::Utf8 => Series::new(
            name,
            array.as_string::<i32>().iter().collect::<Vec<Option<&str>>>(),
        ),
        ArrowType::LargeUtf8 => Series::new(
            name,
            array.as_string::<i64>().iter().collect::<Vec<Option<&str>>>(),
        ),
        ArrowType::Null => Series::new_null(name, array.len()),
        other => {
            return Err(NetworkError::Frame(format!(
                "column '{}' has unsupported type {}",
                name, other
            )))
        }
    };
    Ok(series.into())
}

/// Copies a polars column into an Arrow field and array.
pub(crate) fn column_to_arrow(column: &Column) -> NetworkResult<(Field, ArrayRef)> {
    let series = column.as_materialized_series();
    let (dtype, array): (ArrowType, ArrayRef) = match series.dtype() {
        DataType::Boolean => (
            ArrowType::Boolean,
            Arc::new(series.bool()?.into_iter().collect::<BooleanArray>()),
        ),
        DataType::String => (
            ArrowType::Utf8,
            Arc::new(series.str()?.into_iter().collect::<StringArray>()),
        ),
        DataType::UInt64 => (
            ArrowType::UInt64,
            Arc::new(series.u64()?.into_iter().collect::<UInt64Array>()),
        ),
        dtype if dtype.is_float() => (
            ArrowType::Float64,
            Arc::new(
                series
                    .cast(&DataType::Float64)?
                    .f64()?
                    .into_iter()
                    .collect::<Float64Array>(),
            ),
        ),
        dtype if dtype.is_integer() => (
            ArrowType::Int64,
            Arc::new(
                series
                    .cast(&DataType::Int64)?
                    .i64()?
                    .into_iter()
                    .collect::<Int64Array>(),
            ),
        ),
        DataType::Null => (ArrowType::Null, Arc::new(NullArray::new(series.len()))),
        other => {
            return Err(NetworkError::Frame(format!(
                "column '{}' has unsupported type {}",
                series.name(),
                other
            )))
        }
    };
    Ok((Field::new(series.name().as_str(), dtype, true), array))
}

/// Copies a polars frame into an Arrow record batch.
///
/// Columns are converted independently, in parallel with the `parallel`
/// feature.
pub fn to_record_batch(frame: &DataFrame) -> NetworkResult<RecordBatch> {
    #[cfg(feature = "parallel")]
    let converted = frame
        .get_columns()
        .par_iter()
        .map(column_to_arrow)
        .collect::<NetworkResult<Vec<_>>>()?;
    #[cfg(not(feature = "parallel"))]
    let converted = frame
        .get_columns()
        .iter()
        .map(column_to_arrow)
        .collect::<NetworkResult<Vec<_>>>()?;

    let (fields, arrays): (Vec<Field>, Vec<ArrayRef>) = converted.into_iter().unzip();
    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::{Date32Array, Int32Array};
    use polars::prelude::{df, lit, AnyValue};

    fn people() -> DataFrame {
        df!(
            "RINPERSOON" => [10i64, 11, 20],
            "Income" => [100i64, 300, 200]
        )
        .unwrap()
    }

    fn ints(frame: &DataFrame, name: &str) -> Vec<Option<i64>> {
        let column = frame.column(name).unwrap();
        column.as_materialized_series().i64().unwrap().into_iter().collect()
    }

    fn floats(frame: &DataFrame, name: &str) -> Vec<Option<f64>> {
        let column = frame.column(name).unwrap();
        column.as_materialized_series().f64().unwrap().into_iter().collect()
    }

    fn batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("RINPERSOON", ArrowType::Int32, false),
            Field::new("Name", ArrowType::Utf8, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int32Array::from(vec![1, 2])),
                Arc::new(StringArray::from(vec![Some("a"), None])),
            ]
        )
        .unwrap()
    }

    #[test]
    fn test_data_frame_introspection() {
        let frame = people();
        assert_eq!(Tabular::column_names(&frame), vec!["RINPERSOON", "Income"]);
        assert_eq!(Tabular::num_rows(&frame), 3);
        assert!(frame.contains_column("Income"));
        assert!(!frame.contains_column("Age"));
        assert_eq!(frame.column_dtype("Income").unwrap(), Some(DataType::Int64));
        assert_eq!(frame.column_dtype("Age").unwrap(), None);
    }

    #[test]
    fn test_record_batch_adapter() {
        let batch = batch();
        assert_eq!(Tabular::column_names(&batch), vec!["RINPERSOON", "Name"]);
        assert_eq!(Tabular::num_rows(&batch), 2);
        assert_eq!(batch.column_dtype("RINPERSOON").unwrap(), Some(DataType::Int64));
        assert_eq!(batch.column_dtype("Name").unwrap(), Some(DataType::String));
        assert!(batch.column_values("missing").unwrap().is_none());

        let frame = batch.to_frame().unwrap();
        assert_eq!(ints(&frame, "RINPERSOON"), vec![Some(1), Some(2)]);
        assert_eq!(frame.column("Name").unwrap().null_count(), 1);
    }

    #[test]
    fn test_record_batch_rejects_unsupported_type() {
        let schema = Arc::new(Schema::new(vec![Field::new("Born", ArrowType::Date32, false)]));
        let batch = RecordBatch::try_new(schema, vec![Arc::new(Date32Array::from(vec![1]))]).unwrap();
        let err = batch.column_values("Born").unwrap_err();
        assert!(matches!(err, NetworkError::Frame(_)));
    }

    #[test]
    fn test_filter_and_select() {
        let frame = people();
        let high = frame.filter_rows(col("Income").gt(lit(150))).unwrap();
        assert_eq!(high.height(), 2);
        let ids = Tabular::select_columns(&high, &["RINPERSOON"]).unwrap();
        assert_eq!(ints(&ids, "RINPERSOON"), vec![Some(11), Some(20)]);
        assert!(Tabular::select_columns(&frame, &["nope"]).is_err());
    }

    #[test]
    fn test_left_join_preserves_order_and_rows() {
        let left = df!("id" => [20i64, 99, 10]).unwrap();
        let joined = left
            .join_on(&people(), "id", "RINPERSOON", JoinType::Left)
            .unwrap();
        assert_eq!(Tabular::column_names(&joined), vec!["id", "Income"]);
        assert_eq!(ints(&joined, "id"), vec![Some(20), Some(99), Some(10)]);
        assert_eq!(ints(&joined, "Income"), vec![Some(200), None, Some(100)]);
    }

    #[test]
    fn test_inner_join_drops_unmatched() {
        let left = df!("id" => [Some(20i64), None, Some(99)]).unwrap();
        let joined = left
            .join_on(&people(), "id", "RINPERSOON", JoinType::Inner)
            .unwrap();
        assert_eq!(joined.height(), 1);
    }

    #[test]
    fn test_join_suffixes_clashing_names() {
        let left = df!("id" => [10i64], "Income" => [1i64]).unwrap();
        let joined = left
            .join_on(&people(), "id", "RINPERSOON", JoinType::Inner)
            .unwrap();
        assert_eq!(Tabular::column_names(&joined), vec!["id", "Income", "Income_right"]);
    }

    #[test]
    fn test_join_missing_key() {
        let left = df!("id" => [10i64]).unwrap();
        let err = left
            .join_on(&people(), "ego", "RINPERSOON", JoinType::Inner)
            .unwrap_err();
        assert!(matches!(err, NetworkError::Schema { ref column, .. } if column == "ego"));
    }

    #[test]
    fn test_group_aggregate() {
        let frame = df!(
            "ego" => [Some(2i64), Some(1), Some(1), Some(2), None],
            "Income" => [Some(10i64), Some(20), Some(40), None, Some(5)]
        )
        .unwrap();
        let specs = vec![
            AggregateSpec::new("avg", "Income").unwrap(),
            AggregateSpec::new("count", "Income").unwrap(),
        ];
        let out = frame.group_aggregate("ego", &specs).unwrap();
        assert_eq!(Tabular::column_names(&out), vec!["ego", "avg_Income", "count_Income"]);
        assert_eq!(ints(&out, "ego"), vec![Some(1), Some(2)]);
        assert_eq!(floats(&out, "avg_Income"), vec![Some(30.0), Some(10.0)]);
        assert_eq!(ints(&out, "count_Income"), vec![Some(2), Some(1)]);
    }

    #[test]
    fn test_group_aggregate_missing_variable() {
        let specs = vec![AggregateSpec::new("avg", "Age").unwrap()];
        let err = people().group_aggregate("RINPERSOON", &specs).unwrap_err();
        assert!(matches!(err, NetworkError::Schema { ref column, .. } if column == "Age"));
    }

    #[test]
    fn test_to_record_batch() {
        let frame = df!(
            "RINPERSOON" => [1i64, 2],
            "avg_Income" => [Some(1.5), None],
            "Name" => ["a", "b"]
        )
        .unwrap();
        let batch = to_record_batch(&frame).unwrap();
        assert_eq!(batch.num_columns(), 3);
        assert_eq!(batch.schema().field(1).data_type(), &ArrowType::Float64);
        assert!(batch.column(1).is_null(1));

        let back = batch.to_frame().unwrap();
        assert!(back.equals_missing(&frame));
        assert_eq!(
            back.column("Name").unwrap().get(1).unwrap(),
            AnyValue::String("b")
        );
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_conversion_matches_sequential() {
        let frame = df!(
            "RINPERSOON" => [1i64, 2, 3],
            "count_Income" => [Some(2i64), None, Some(0)],
            "max_City" => [Some("Utrecht"), None, Some("Delft")],
            "flag" => [true, false, true]
        )
        .unwrap();
        let sequential = frame
            .get_columns()
            .iter()
            .map(column_to_arrow)
            .collect::<NetworkResult<Vec<_>>>()
            .unwrap();
        let (fields, arrays): (Vec<Field>, Vec<ArrayRef>) = sequential.into_iter().unzip();
        let expected = RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).unwrap();

        assert_eq!(to_record_batch(&frame).unwrap(), expected);
    }
}
