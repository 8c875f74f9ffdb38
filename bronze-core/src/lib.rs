//! Bronze-layer ingestion and validation.
//!
//! This crate holds everything behind the `bronze` CLI:
//! - Paginated JSON fetching with retry and backoff
//! - Record transformation with ingestion metadata
//! - Date-partitioned Parquet storage with no-clobber file names
//! - A rule-based validation engine and a table profiler
//! - Command orchestration producing JSON outcomes and exit codes

pub mod config;
pub mod fetch;
pub mod partition;
pub mod pipeline;
pub mod profile;
pub mod table;
pub mod transform;
pub mod validate;

pub use config::{ConfigError, PipelineConfig};
pub use fetch::{FetchError, HttpPageSource, PageResult, PageSource, RawRecord};
pub use partition::{Compression, PartitionWriter, StorageError};
pub use pipeline::{
    run_ingest, run_validate, IngestOutcome, IngestRequest, ValidateOutcome, ValidateRequest,
};
pub use validate::{RuleSet, Threshold, ValidationResult, ValidationRule, ValidationStatus};
