//! Resolution of hops to versioned relationship files on disk.
//!
//! POPNET tables live under `<base>/<TABLE>/` as semicolon-separated CSV, with
//! Parquet conversions in a `geconverteerde data` subdirectory. A file for a
//! given year is named `<TABLE without "TAB"><year>TABV<version>.<ext>`, e.g.
//! `FAMILIENETWERK2020TABV3.csv`; the highest version wins.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use netcbs_query::{parse_hop, Context, Hop, RelationCode};
use tracing::debug;

use crate::error::{NetworkError, NetworkResult};

/// Subdirectory holding the Parquet conversions of a table.
pub const CONVERTED_DATA_DIR: &str = "geconverteerde data";

/// On-disk format of the relationship tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FileFormat {
    /// Semicolon-delimited CSV with a header row.
    Csv,
    /// Apache Parquet.
    #[default]
    Parquet,
}

impl FileFormat {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Parquet => "parquet",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for FileFormat {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(FileFormat::Csv),
            "parquet" => Ok(FileFormat::Parquet),
            _ => Err(NetworkError::UnsupportedFileFormat {
                format: s.to_string(),
            }),
        }
    }
}

/// Directory holding a context's files in the given format.
pub fn relation_directory(base: &Path, context: Context, format: FileFormat) -> PathBuf {
    let dir = base.join(context.table_name());
    match format {
        FileFormat::Csv => dir,
        FileFormat::Parquet => dir.join(CONVERTED_DATA_DIR),
    }
}

/// Parses the version out of a file name, if it belongs to `context` and `year`.
fn file_version(name: &str, context: Context, year: i32, format: FileFormat) -> Option<u32> {
    let table = context.table_name();
    let stem = table.strip_suffix("TAB").unwrap_or(table);
    let prefix = format!("{}{}TABV", stem, year);
    let rest = name.strip_prefix(prefix.as_str())?;
    let (version, ext) = rest.split_once('.')?;
    if !ext.eq_ignore_ascii_case(format.extension()) || version.is_empty() {
        return None;
    }
    if !version.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    version.parse().ok()
}

/// Finds the highest-versioned file for `context` and `year`.
pub fn latest_version(
    base: &Path,
    context: Context,
    year: i32,
    format: FileFormat,
) -> NetworkResult<PathBuf> {
    let directory = relation_directory(base, context, format);
    let not_found = || NetworkError::RelationFileNotFound {
        context,
        year,
        directory: directory.clone(),
    };

    let entries = match fs::read_dir(&directory) {
        Ok(entries) => entries,
        Err(_) => return Err(not_found()),
    };

    let mut best: Option<(u32, PathBuf)> = None;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(version) = name
            .to_str()
            .and_then(|n| file_version(n, context, year, format))
        else {
            continue;
        };
        if best.as_ref().map_or(true, |(v, _)| version > *v) {
            best = Some((version, entry.path()));
        }
    }

    let (version, path) = best.ok_or_else(not_found)?;
    debug!(%context, year, version, path = %path.display(), "resolved relationship file");
    Ok(path)
}

/// Maps a hop to the file that holds its edges.
///
/// The default is [`VersionedLocator`]. Closures with the matching signature
/// implement the trait, so tests and alternative directory layouts can supply
/// their own resolution.
pub trait RelationLocator: Send + Sync {
    /// Returns the file for `hop` and the codes to keep from it.
    fn locate(
        &self,
        hop: &Hop,
        year: i32,
        base: &Path,
        format: FileFormat,
    ) -> NetworkResult<(PathBuf, BTreeSet<RelationCode>)>;
}

impl<F> RelationLocator for F
where
    F: Fn(&Hop, i32, &Path, FileFormat) -> NetworkResult<(PathBuf, BTreeSet<RelationCode>)>
        + Send
        + Sync,
{
    fn locate(
        &self,
        hop: &Hop,
        year: i32,
        base: &Path,
        format: FileFormat,
    ) -> NetworkResult<(PathBuf, BTreeSet<RelationCode>)> {
        self(hop, year, base, format)
    }
}

/// Picks the latest version of the POPNET file for the hop's context.
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionedLocator;

impl RelationLocator for VersionedLocator {
    fn locate(
        &self,
        hop: &Hop,
        year: i32,
        base: &Path,
        format: FileFormat,
    ) -> NetworkResult<(PathBuf, BTreeSet<RelationCode>)> {
        let path = latest_version(base, hop.context, year, format)?;
        Ok((path, hop.resolved_codes()))
    }
}

/// Resolves a hop string such as `Family[301]` to its file and code set.
///
/// `Family` and `Family[all]` select every code of the context.
///
/// # Examples
///
/// ```rust,no_run
/// use netcbs_executor::{format_path, FileFormat};
///
/// let (path, codes) = format_path("Family[301,302]", 2020, "G:/Bevolking", FileFormat::Csv)?;
/// assert!(codes.contains(&301));
/// println!("{}", path.display());
/// # Ok::<(), netcbs_executor::NetworkError>(())
/// ```
pub fn format_path(
    context: &str,
    year: i32,
    cbsdata_path: impl AsRef<Path>,
    format: FileFormat,
) -> NetworkResult<(PathBuf, BTreeSet<RelationCode>)> {
    let hop = parse_hop(context)?;
    VersionedLocator.locate(&hop, year, cbsdata_path.as_ref(), format)
}
