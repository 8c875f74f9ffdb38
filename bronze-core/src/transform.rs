//! Raw record normalization.
//!
//! Copies an allowlist of fields from each raw record (anything else is
//! dropped) and stamps ingestion metadata. The ingestion timestamp is fixed
//! when the transformer is built, once per run, so transforming the same
//! input twice yields identical output.

use crate::config::TransformConfig;
use crate::fetch::RawRecord;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

pub const INGESTED_AT_COLUMN: &str = "_ingested_at";
pub const SOURCE_COLUMN: &str = "_source";
pub const SCHEMA_VERSION_COLUMN: &str = "_schema_version";

/// A normalized record: allowlisted fields plus run metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedRecord {
    /// Allowlisted fields in allowlist order. Absent raw fields are `Null`.
    pub fields: Vec<(String, Value)>,
    pub ingested_at: String,
    pub source: String,
    pub schema_version: String,
}

impl TransformedRecord {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }
}

impl Serialize for TransformedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 3))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.serialize_entry(INGESTED_AT_COLUMN, &self.ingested_at)?;
        map.serialize_entry(SOURCE_COLUMN, &self.source)?;
        map.serialize_entry(SCHEMA_VERSION_COLUMN, &self.schema_version)?;
        map.end()
    }
}

/// Maps raw records to [`TransformedRecord`]s.
#[derive(Debug, Clone)]
pub struct Transformer {
    config: TransformConfig,
    ingested_at: String,
}

impl Transformer {
    pub fn new(config: TransformConfig, ingested_at: DateTime<Utc>) -> Self {
        Self {
            config,
            ingested_at: format_timestamp(ingested_at),
        }
    }

    pub fn ingested_at(&self) -> &str {
        &self.ingested_at
    }

    pub fn transform(&self, records: &[RawRecord]) -> Vec<TransformedRecord> {
        records.iter().map(|r| self.transform_one(r)).collect()
    }

    fn transform_one(&self, record: &RawRecord) -> TransformedRecord {
        let fields = self
            .config
            .fields
            .iter()
            .map(|name| (name.clone(), record.get(name).cloned().unwrap_or(Value::Null)))
            .collect();

        TransformedRecord {
            fields,
            ingested_at: self.ingested_at.clone(),
            source: self.config.source.clone(),
            schema_version: self.config.schema_version.clone(),
        }
    }
}

/// ISO-8601 UTC with microsecond precision, e.g. `2024-01-01T12:00:00.000000Z`.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}
