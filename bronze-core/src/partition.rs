//! Parquet storage with Hive-style date partitioning.
//!
//! Layout: `{output_dir}/partition_date={YYYY-MM-DD}/data_{YYYYMMDD_HHMMSS}.parquet`
//!
//! - Files are never overwritten. Each write goes to a hidden temp file that
//!   is then hard-linked to the first free name (`data_{ts}.parquet`,
//!   `data_{ts}_1.parquet`, ...). Linking fails on an existing name, so
//!   concurrent writers targeting one partition need no lock.
//! - A partition's content is the union of its files; re-runs add files.
//! - Every file carries a `_partition_date` column equal to its directory date.

use crate::config::OutputConfig;
use crate::table::is_numeric;
use crate::transform::{
    TransformedRecord, INGESTED_AT_COLUMN, SCHEMA_VERSION_COLUMN, SOURCE_COLUMN,
};
use chrono::{DateTime, NaiveDate, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

pub const PARTITION_DATE_COLUMN: &str = "_partition_date";
const PARTITION_PREFIX: &str = "partition_date=";
const MAX_NAME_ATTEMPTS: u32 = 1_000;
static NULL: Value = Value::Null;
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Errors from reading or writing partitioned storage.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("path not found: {0}")]
    NotFound(String),

    #[error("no parquet files in partition {0}")]
    EmptyPartition(String),

    #[error("io error on {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("parquet error: {0}")]
    Parquet(String),

    #[error("no free file name left in {0}")]
    NamesExhausted(String),
}

impl StorageError {
    fn io(path: &Path, e: std::io::Error) -> Self {
        StorageError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    }
}

/// Parquet compression codec for written files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Snappy,
    Zstd,
    Uncompressed,
}

impl Compression {
    fn to_parquet(self) -> ParquetCompression {
        match self {
            Compression::Snappy => ParquetCompression::Snappy,
            Compression::Zstd => ParquetCompression::Zstd(None),
            Compression::Uncompressed => ParquetCompression::Uncompressed,
        }
    }
}

/// Writes record sets into date partitions under a root directory.
#[derive(Debug, Clone)]
pub struct PartitionWriter {
    output_dir: PathBuf,
    compression: Compression,
}

impl PartitionWriter {
    pub fn new(output_dir: impl Into<PathBuf>, config: &OutputConfig) -> Self {
        Self {
            output_dir: output_dir.into(),
            compression: config.compression,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Directory for a partition: `{output_dir}/partition_date={date}/`
    pub fn partition_dir(&self, partition_date: NaiveDate) -> PathBuf {
        partition_dir(&self.output_dir, partition_date)
    }

    /// Write `records` as one new file in the partition for `partition_date`.
    ///
    /// Returns `None` without touching the filesystem when `records` is empty,
    /// otherwise the absolute path of the new file.
    pub fn write(
        &self,
        records: &[TransformedRecord],
        partition_date: NaiveDate,
    ) -> Result<Option<PathBuf>, StorageError> {
        self.write_at(records, partition_date, Utc::now())
    }

    /// [`write`](Self::write) with an explicit write time for the file name.
    pub fn write_at(
        &self,
        records: &[TransformedRecord],
        partition_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Option<PathBuf>, StorageError> {
        if records.is_empty() {
            tracing::warn!(%partition_date, "no records to write");
            return Ok(None);
        }

        let dir = self.partition_dir(partition_date);
        fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;

        let mut df = records_to_dataframe(records, partition_date)?;

        let stamp = now.format("%Y%m%d_%H%M%S").to_string();
        let tmp_path = dir.join(format!(
            ".data_{stamp}_{}_{}.parquet.tmp",
            std::process::id(),
            TMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));

        let linked = write_parquet(&mut df, &tmp_path, self.compression)
            .and_then(|()| link_unique(&tmp_path, &dir, &stamp));
        let _ = fs::remove_file(&tmp_path);
        let path = linked?;

        let path = fs::canonicalize(&path).map_err(|e| StorageError::io(&path, e))?;
        let size_bytes = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        tracing::info!(
            path = %path.display(),
            rows = df.height(),
            size_bytes,
            "wrote partition file"
        );

        Ok(Some(path))
    }
}

/// `{root}/partition_date={date}`
pub fn partition_dir(root: &Path, partition_date: NaiveDate) -> PathBuf {
    root.join(format!("{PARTITION_PREFIX}{}", partition_date.format("%Y-%m-%d")))
}

/// Hard-link `tmp` to the first unused `data_{stamp}[_n].parquet` in `dir`.
fn link_unique(tmp: &Path, dir: &Path, stamp: &str) -> Result<PathBuf, StorageError> {
    for n in 0..MAX_NAME_ATTEMPTS {
        let name = if n == 0 {
            format!("data_{stamp}.parquet")
        } else {
            format!("data_{stamp}_{n}.parquet")
        };
        let path = dir.join(name);
        match fs::hard_link(tmp, &path) {
            Ok(()) => return Ok(path),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(StorageError::io(&path, e)),
        }
    }
    Err(StorageError::NamesExhausted(dir.display().to_string()))
}

// ── DataFrame conversion ────────────────────────────────────────────

/// Build a DataFrame from transformed records, appending `_partition_date`.
///
/// Column order is the record's field order, then `_ingested_at`, `_source`,
/// `_schema_version`, `_partition_date`.
pub fn records_to_dataframe(
    records: &[TransformedRecord],
    partition_date: NaiveDate,
) -> Result<DataFrame, StorageError> {
    let mut columns = Vec::new();

    if let Some(first) = records.first() {
        for (idx, (name, _)) in first.fields.iter().enumerate() {
            let values: Vec<&Value> = records
                .iter()
                .map(|r| match r.fields.get(idx) {
                    Some((key, value)) if key == name => value,
                    _ => r.get(name).unwrap_or(&NULL),
                })
                .collect();
            columns.push(json_column(name, &values));
        }
    }

    let date = partition_date.format("%Y-%m-%d").to_string();
    columns.push(Column::new(
        INGESTED_AT_COLUMN.into(),
        records.iter().map(|r| r.ingested_at.as_str()).collect::<Vec<_>>(),
    ));
    columns.push(Column::new(
        SOURCE_COLUMN.into(),
        records.iter().map(|r| r.source.as_str()).collect::<Vec<_>>(),
    ));
    columns.push(Column::new(
        SCHEMA_VERSION_COLUMN.into(),
        records.iter().map(|r| r.schema_version.as_str()).collect::<Vec<_>>(),
    ));
    columns.push(Column::new(
        PARTITION_DATE_COLUMN.into(),
        vec![date.as_str(); records.len()],
    ));

    DataFrame::new(columns).map_err(|e| StorageError::Parquet(format!("dataframe creation: {e}")))
}

/// Infer a column type from JSON values: all-integer → Int64, all-numeric →
/// Float64, all-bool → Boolean, anything else (including all-null) → String.
fn json_column(name: &str, values: &[&Value]) -> Column {
    let non_null: Vec<&Value> = values.iter().copied().filter(|v| !v.is_null()).collect();
    let has_values = !non_null.is_empty();

    if has_values && non_null.iter().all(|v| v.is_i64()) {
        let data: Vec<Option<i64>> = values.iter().map(|v| v.as_i64()).collect();
        return Column::new(name.into(), data);
    }
    if has_values && non_null.iter().all(|v| v.is_number()) {
        let data: Vec<Option<f64>> = values.iter().map(|v| v.as_f64()).collect();
        return Column::new(name.into(), data);
    }
    if has_values && non_null.iter().all(|v| v.is_boolean()) {
        let data: Vec<Option<bool>> = values.iter().map(|v| v.as_bool()).collect();
        return Column::new(name.into(), data);
    }

    let data: Vec<Option<String>> = values
        .iter()
        .map(|v| match v {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })
        .collect();
    Column::new(name.into(), data)
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn write_parquet(df: &mut DataFrame, path: &Path, compression: Compression) -> Result<(), StorageError> {
    let file = fs::File::create(path).map_err(|e| StorageError::io(path, e))?;
    ParquetWriter::new(file)
        .with_compression(compression.to_parquet())
        .finish(df)
        .map_err(|e| StorageError::Parquet(format!("write {}: {e}", path.display())))?;
    Ok(())
}

fn read_parquet(path: &Path) -> Result<DataFrame, StorageError> {
    let file = fs::File::open(path).map_err(|e| StorageError::io(path, e))?;
    ParquetReader::new(file)
        .finish()
        .map_err(|e| StorageError::Parquet(format!("read {}: {e}", path.display())))
}

/// Parquet files of a partition directory, sorted by file name. Hidden temp
/// files are skipped.
pub fn partition_files(dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
    let entries = fs::read_dir(dir).map_err(|e| StorageError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StorageError::io(dir, e))?;
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if !hidden && path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("parquet") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Load a table from a single Parquet file, or the union of every file in a
/// partition directory.
pub fn read_table(path: &Path) -> Result<DataFrame, StorageError> {
    if !path.exists() {
        return Err(StorageError::NotFound(path.display().to_string()));
    }
    if !path.is_dir() {
        return read_parquet(path);
    }

    let files = partition_files(path)?;
    if files.is_empty() {
        return Err(StorageError::EmptyPartition(path.display().to_string()));
    }

    let frames = files
        .iter()
        .map(|file| read_parquet(file))
        .collect::<Result<Vec<_>, _>>()?;
    let df = union_frames(frames)?;
    tracing::debug!(path = %path.display(), files = files.len(), rows = df.height(), "loaded partition");
    Ok(df)
}

/// Stack frames written by different runs into one table.
///
/// Each run infers its own column types, so frames may disagree. Columns are
/// matched by name in first-seen order and a frame lacking a column
/// contributes nulls. An all-null column carries no type information. The
/// common type is the shared one, Float64 for mixed numeric types, and
/// String for anything else.
fn union_frames(frames: Vec<DataFrame>) -> Result<DataFrame, StorageError> {
    let mut schema: Vec<(String, Option<DataType>)> = Vec::new();
    for df in &frames {
        for col in df.get_columns() {
            let observed = (col.null_count() < col.len()).then(|| col.dtype().clone());
            match schema.iter_mut().find(|(name, _)| name.as_str() == col.name().as_str()) {
                Some((_, dtype)) => *dtype = common_type(dtype.take(), observed),
                None => schema.push((col.name().to_string(), observed)),
            }
        }
    }
    let schema: Vec<(String, DataType)> = schema
        .into_iter()
        .map(|(name, dtype)| (name, dtype.unwrap_or(DataType::String)))
        .collect();

    let mut out: Option<DataFrame> = None;
    for df in frames {
        let aligned = align_frame(&df, &schema)?;
        match out.as_mut() {
            Some(acc) => {
                acc.vstack_mut(&aligned)
                    .map_err(|e| StorageError::Parquet(format!("stack frames: {e}")))?;
            }
            None => out = Some(aligned),
        }
    }
    out.ok_or_else(|| StorageError::Parquet("no frames to stack".into()))
}

fn common_type(a: Option<DataType>, b: Option<DataType>) -> Option<DataType> {
    match (a, b) {
        (None, other) | (other, None) => other,
        (Some(a), Some(b)) if a == b => Some(a),
        (Some(a), Some(b)) if is_numeric(&a) && is_numeric(&b) => Some(DataType::Float64),
        _ => Some(DataType::String),
    }
}

/// Cast `df` to `schema`, adding null columns for names it lacks.
fn align_frame(df: &DataFrame, schema: &[(String, DataType)]) -> Result<DataFrame, StorageError> {
    let columns = schema
        .iter()
        .map(|(name, dtype)| match df.column(name) {
            Ok(col) if col.dtype() == dtype => Ok(col.clone()),
            Ok(col) => col
                .cast(dtype)
                .map_err(|e| StorageError::Parquet(format!("cast column '{name}' to {dtype}: {e}"))),
            Err(_) => Ok(Column::full_null(name.as_str().into(), df.height(), dtype)),
        })
        .collect::<Result<Vec<_>, _>>()?;
    DataFrame::new(columns).map_err(|e| StorageError::Parquet(format!("align frame: {e}")))
}

/// Summary of one partition directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionInfo {
    pub partition_date: NaiveDate,
    pub path: PathBuf,
    pub files: usize,
    pub bytes: u64,
}

/// List the partitions under `root`, sorted by date. Directories whose name
/// is not `partition_date=<valid date>` are ignored.
pub fn list_partitions(root: &Path) -> Result<Vec<PartitionInfo>, StorageError> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(root).map_err(|e| StorageError::io(root, e))?;
    let mut partitions = Vec::new();

    for entry in entries {
        let entry = entry.map_err(|e| StorageError::io(root, e))?;
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(date_str) = name.strip_prefix(PARTITION_PREFIX) else {
            continue;
        };
        let Ok(partition_date) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d") else {
            continue;
        };
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let files = partition_files(&path)?;
        let bytes = files
            .iter()
            .filter_map(|f| fs::metadata(f).ok())
            .map(|m| m.len())
            .sum();

        partitions.push(PartitionInfo {
            partition_date,
            path,
            files: files.len(),
            bytes,
        });
    }

    partitions.sort_by_key(|p| p.partition_date);
    Ok(partitions)
}
