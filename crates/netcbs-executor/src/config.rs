//! Configuration for [`transform`](crate::transform).

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::resolver::{FileFormat, RelationLocator, VersionedLocator};

/// Default root of the CBS population data.
pub const DEFAULT_CBSDATA_PATH: &str = "G:/Bevolking";

/// Default data year.
pub const DEFAULT_YEAR: i32 = 2020;

/// Default value of the `RINPERSOONS` namespace discriminator.
pub const DEFAULT_NAMESPACE: &str = "R";

/// Representation of the returned table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OutputFormat {
    /// A polars `DataFrame`.
    #[default]
    DataFrame,
    /// An Arrow `RecordBatch`.
    RecordBatch,
}

/// How the join pipeline is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExecutionMode {
    /// Materialize the pairs after every hop.
    #[default]
    Eager,
    /// Build a plan graph, optimize it, and run it once.
    Deferred,
}

/// Options for a network transform.
///
/// # Example
///
/// ```rust
/// use netcbs_executor::{ExecutionMode, FileFormat, TransformOptions};
///
/// let options = TransformOptions::builder()
///     .with_year(2021)
///     .with_cbsdata_path("/data/Bevolking")
///     .with_format(FileFormat::Csv)
///     .with_agg_funcs(["avg", "count"])
///     .with_lazy(true)
///     .build();
///
/// assert_eq!(options.mode, ExecutionMode::Deferred);
/// assert_eq!(options.agg_funcs, vec!["avg", "count"]);
/// ```
#[derive(Clone)]
pub struct TransformOptions {
    /// Data year of the relationship tables.
    pub year: i32,
    /// Root directory containing one folder per POPNET table.
    pub cbsdata_path: PathBuf,
    /// File format of the relationship tables.
    pub format: FileFormat,
    /// Aggregation function names, applied to every query variable.
    pub agg_funcs: Vec<String>,
    /// Representation of the returned table.
    pub output: OutputFormat,
    /// Eager or deferred execution.
    pub mode: ExecutionMode,
    /// Resolves hops to files.
    pub locator: Arc<dyn RelationLocator>,
    /// Required value of the `RINPERSOONS` column, when the sample has one.
    pub namespace: String,
}

impl TransformOptions {
    /// Creates a new builder for TransformOptions.
    pub fn builder() -> TransformOptionsBuilder {
        TransformOptionsBuilder::default()
    }
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            year: DEFAULT_YEAR,
            cbsdata_path: PathBuf::from(DEFAULT_CBSDATA_PATH),
            format: FileFormat::Parquet,
            agg_funcs: vec!["avg".to_string()],
            output: OutputFormat::DataFrame,
            mode: ExecutionMode::Eager,
            locator: Arc::new(VersionedLocator),
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl fmt::Debug for TransformOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformOptions")
            .field("year", &self.year)
            .field("cbsdata_path", &self.cbsdata_path)
            .field("format", &self.format)
            .field("agg_funcs", &self.agg_funcs)
            .field("output", &self.output)
            .field("mode", &self.mode)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

/// Builder for TransformOptions.
#[derive(Debug, Clone, Default)]
pub struct TransformOptionsBuilder {
    options: TransformOptions,
}

impl TransformOptionsBuilder {
    /// Sets the data year.
    pub fn with_year(mut self, year: i32) -> Self {
        self.options.year = year;
        self
    }

    /// Sets the data root directory.
    pub fn with_cbsdata_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.cbsdata_path = path.into();
        self
    }

    /// Sets the relationship file format.
    pub fn with_format(mut self, format: FileFormat) -> Self {
        self.options.format = format;
        self
    }

    /// Sets the aggregation functions.
    pub fn with_agg_funcs<I, S>(mut self, funcs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.agg_funcs = funcs.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the output representation.
    pub fn with_output(mut self, output: OutputFormat) -> Self {
        self.options.output = output;
        self
    }

    /// Selects deferred (`true`) or eager (`false`) execution.
    pub fn with_lazy(mut self, lazy: bool) -> Self {
        self.options.mode = if lazy {
            ExecutionMode::Deferred
        } else {
            ExecutionMode::Eager
        };
        self
    }

    /// Sets the execution mode.
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.options.mode = mode;
        self
    }

    /// Replaces the file resolver.
    pub fn with_locator(mut self, locator: impl RelationLocator + 'static) -> Self {
        self.options.locator = Arc::new(locator);
        self
    }

    /// Sets the expected `RINPERSOONS` value.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.options.namespace = namespace.into();
        self
    }

    /// Builds the TransformOptions.
    pub fn build(self) -> TransformOptions {
        self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_options_default() {
        let options = TransformOptions::default();
        assert_eq!(options.year, 2020);
        assert_eq!(options.cbsdata_path, PathBuf::from("G:/Bevolking"));
        assert_eq!(options.format, FileFormat::Parquet);
        assert_eq!(options.agg_funcs, vec!["avg"]);
        assert_eq!(options.output, OutputFormat::DataFrame);
        assert_eq!(options.mode, ExecutionMode::Eager);
        assert_eq!(options.namespace, "R");
    }

    #[test]
    fn test_builder_chaining() {
        let options = TransformOptions::builder()
            .with_year(2018)
            .with_output(OutputFormat::RecordBatch)
            .with_mode(ExecutionMode::Deferred)
            .with_namespace("X")
            .build();

        assert_eq!(options.year, 2018);
        assert_eq!(options.output, OutputFormat::RecordBatch);
        assert_eq!(options.mode, ExecutionMode::Deferred);
        assert_eq!(options.namespace, "X");
        assert_eq!(options.format, FileFormat::Parquet);
    }

    #[test]
    fn test_debug_omits_locator() {
        let rendered = format!("{:?}", TransformOptions::default());
        assert!(rendered.contains("year: 2020"));
        assert!(!rendered.contains("locator"));
    }
}
