//! Table validation engine.
//!
//! Rules are a closed set of variants evaluated in a fixed order regardless
//! of how they were declared:
//! RequiredColumns → NotNull → Unique → ValueRange → MinRows → MaxNullPercentage.
//! A failed validation is a normal result value; only structural problems
//! with the table surface as [`ValidateError`].

pub mod rules;

use crate::config::ConfigError;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Structural failures while evaluating rules. Never used for rule violations.
#[derive(Debug, Error)]
pub enum ValidateError {
    #[error("unreadable table: {0}")]
    Table(String),

    #[error("value range on non-numeric column '{column}' ({dtype})")]
    NonNumericRange { column: String, dtype: String },
}

/// Rule kinds in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RuleKind {
    RequiredColumns,
    NotNull,
    Unique,
    ValueRange,
    MinRows,
    MaxNullPercentage,
}

impl RuleKind {
    /// Key used for this rule in rules files and in `rules_applied`.
    pub fn key(self) -> &'static str {
        match self {
            RuleKind::RequiredColumns => "required_columns",
            RuleKind::NotNull => "not_null_columns",
            RuleKind::Unique => "unique_columns",
            RuleKind::ValueRange => "value_ranges",
            RuleKind::MinRows => "min_rows",
            RuleKind::MaxNullPercentage => "max_null_percentage",
        }
    }
}

/// A numeric rule parameter. Remembers whether it was written as an integer
/// so messages echo it back as given: `5` stays `5`, `5.0` stays `5.0`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "serde_json::Number")]
pub struct Threshold {
    value: f64,
    integral: bool,
}

impl Threshold {
    pub fn value(self) -> f64 {
        self.value
    }
}

impl From<f64> for Threshold {
    fn from(value: f64) -> Self {
        Self {
            value,
            integral: false,
        }
    }
}

impl From<i64> for Threshold {
    fn from(value: i64) -> Self {
        Self {
            value: value as f64,
            integral: true,
        }
    }
}

impl TryFrom<serde_json::Number> for Threshold {
    type Error = String;

    fn try_from(n: serde_json::Number) -> Result<Self, Self::Error> {
        let value = n.as_f64().ok_or_else(|| format!("{n} is not representable as f64"))?;
        Ok(Self {
            value,
            integral: !n.is_f64(),
        })
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.integral && self.value.is_finite() && self.value.fract() == 0.0 {
            write!(f, "{:.1}", self.value)
        } else {
            write!(f, "{}", self.value)
        }
    }
}

/// A single validation rule with its parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationRule {
    RequiredColumns(Vec<String>),
    NotNull(Vec<String>),
    Unique(Vec<String>),
    /// Inclusive `[min, max]` per column.
    ValueRange(BTreeMap<String, [Threshold; 2]>),
    MinRows(usize),
    /// Maximum allowed percentage (0–100) of missing values per column.
    MaxNullPercentage(BTreeMap<String, Threshold>),
}

impl ValidationRule {
    pub fn kind(&self) -> RuleKind {
        match self {
            ValidationRule::RequiredColumns(_) => RuleKind::RequiredColumns,
            ValidationRule::NotNull(_) => RuleKind::NotNull,
            ValidationRule::Unique(_) => RuleKind::Unique,
            ValidationRule::ValueRange(_) => RuleKind::ValueRange,
            ValidationRule::MinRows(_) => RuleKind::MinRows,
            ValidationRule::MaxNullPercentage(_) => RuleKind::MaxNullPercentage,
        }
    }

    pub fn evaluate(&self, df: &DataFrame) -> Result<Vec<String>, ValidateError> {
        match self {
            ValidationRule::RequiredColumns(cols) => Ok(rules::required_columns(df, cols)),
            ValidationRule::NotNull(cols) => rules::not_null(df, cols),
            ValidationRule::Unique(cols) => rules::unique(df, cols),
            ValidationRule::ValueRange(ranges) => rules::value_ranges(df, ranges),
            ValidationRule::MinRows(min) => Ok(rules::min_rows(df, *min)),
            ValidationRule::MaxNullPercentage(caps) => rules::max_null_percentage(df, caps),
        }
    }
}

/// On-disk JSON shape of a rules file. Every key is optional.
#[derive(Debug, Deserialize)]
struct RulesFile {
    required_columns: Option<Vec<String>>,
    not_null_columns: Option<Vec<String>>,
    unique_columns: Option<Vec<String>>,
    value_ranges: Option<BTreeMap<String, [Threshold; 2]>>,
    min_rows: Option<usize>,
    max_null_percentage: Option<BTreeMap<String, Threshold>>,
    #[serde(flatten)]
    unknown: BTreeMap<String, Value>,
}

/// An ordered collection of rules.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    rules: Vec<ValidationRule>,
}

impl Default for RuleSet {
    /// `id` and `_ingested_at` required, `id` non-null and unique, at least
    /// one row, no ranges and no null caps.
    fn default() -> Self {
        Self::new(vec![
            ValidationRule::RequiredColumns(vec!["id".into(), "_ingested_at".into()]),
            ValidationRule::NotNull(vec!["id".into()]),
            ValidationRule::Unique(vec!["id".into()]),
            ValidationRule::ValueRange(BTreeMap::new()),
            ValidationRule::MinRows(1),
            ValidationRule::MaxNullPercentage(BTreeMap::new()),
        ])
    }
}

impl RuleSet {
    /// Rules are stably sorted into evaluation order.
    pub fn new(mut rules: Vec<ValidationRule>) -> Self {
        rules.sort_by_key(ValidationRule::kind);
        Self { rules }
    }

    pub fn rules(&self) -> &[ValidationRule] {
        &self.rules
    }

    /// Keys of the rule kinds present, in evaluation order.
    pub fn rules_applied(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        for rule in &self.rules {
            let key = rule.kind().key();
            if keys.last().map(String::as_str) != Some(key) {
                keys.push(key.to_string());
            }
        }
        keys
    }

    /// Load a rule set from a JSON rules file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&content).map_err(|e| match e {
            ConfigError::Parse { reason, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    /// Parse a rule set from a JSON object. Unknown keys are logged and ignored.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let file: RulesFile = serde_json::from_str(content).map_err(|e| ConfigError::Parse {
            path: "<inline>".into(),
            reason: e.to_string(),
        })?;

        for key in file.unknown.keys() {
            tracing::warn!(key = key.as_str(), "ignoring unknown rule key");
        }

        let mut rules = Vec::new();
        if let Some(cols) = file.required_columns {
            rules.push(ValidationRule::RequiredColumns(cols));
        }
        if let Some(cols) = file.not_null_columns {
            rules.push(ValidationRule::NotNull(cols));
        }
        if let Some(cols) = file.unique_columns {
            rules.push(ValidationRule::Unique(cols));
        }
        if let Some(ranges) = file.value_ranges {
            for (col, [min, max]) in &ranges {
                if min.value() > max.value() {
                    return Err(ConfigError::Invalid(format!(
                        "value_ranges.{col}: min {min} exceeds max {max}"
                    )));
                }
            }
            rules.push(ValidationRule::ValueRange(ranges));
        }
        if let Some(min) = file.min_rows {
            rules.push(ValidationRule::MinRows(min));
        }
        if let Some(caps) = file.max_null_percentage {
            rules.push(ValidationRule::MaxNullPercentage(caps));
        }

        Ok(Self::new(rules))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Passed,
    Failed,
}

/// Outcome of one validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub status: ValidationStatus,
    pub errors: Vec<String>,
    pub error_count: usize,
    pub rules_applied: Vec<String>,
}

impl ValidationResult {
    fn new(errors: Vec<String>, rules_applied: Vec<String>) -> Self {
        let status = if errors.is_empty() {
            ValidationStatus::Passed
        } else {
            ValidationStatus::Failed
        };
        Self {
            status,
            error_count: errors.len(),
            errors,
            rules_applied,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == ValidationStatus::Passed
    }
}

/// Evaluate every rule and collect all messages.
pub fn validate(df: &DataFrame, rules: &RuleSet) -> Result<ValidationResult, ValidateError> {
    evaluate(df, rules, false)
}

/// Stop after the first rule that produces any message.
pub fn validate_strict(df: &DataFrame, rules: &RuleSet) -> Result<ValidationResult, ValidateError> {
    evaluate(df, rules, true)
}

fn evaluate(df: &DataFrame, rules: &RuleSet, fail_fast: bool) -> Result<ValidationResult, ValidateError> {
    let mut errors = Vec::new();
    for rule in rules.rules() {
        let found = rule.evaluate(df)?;
        let hit = !found.is_empty();
        errors.extend(found);
        if fail_fast && hit {
            tracing::debug!(rule = rule.kind().key(), "stopping at first failing rule");
            break;
        }
    }

    let result = ValidationResult::new(errors, rules.rules_applied());
    tracing::info!(
        rows = df.height(),
        columns = df.width(),
        error_count = result.error_count,
        passed = result.passed(),
        "validation complete"
    );
    Ok(result)
}
