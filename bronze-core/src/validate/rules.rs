//! Rule evaluators.
//!
//! Each evaluator receives the full table and its own parameters and returns
//! zero or more messages. Columns absent from the table are skipped silently
//! by every evaluator except `required_columns`, which is the only one that
//! reports missing columns.

use super::{Threshold, ValidateError};
use crate::table::{duplicate_count, is_numeric, missing_count, numeric_values};
use polars::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

fn table_err(e: PolarsError) -> ValidateError {
    ValidateError::Table(e.to_string())
}

pub fn required_columns(df: &DataFrame, required: &[String]) -> Vec<String> {
    let missing: BTreeSet<&str> = required
        .iter()
        .map(String::as_str)
        .filter(|name| df.column(name).is_err())
        .collect();

    if missing.is_empty() {
        return Vec::new();
    }
    let quoted: Vec<String> = missing.iter().map(|n| format!("'{n}'")).collect();
    vec![format!("Missing required columns: [{}]", quoted.join(", "))]
}

pub fn not_null(df: &DataFrame, columns: &[String]) -> Result<Vec<String>, ValidateError> {
    let mut errors = Vec::new();
    for name in columns {
        let Ok(col) = df.column(name) else { continue };
        let nulls = missing_count(col).map_err(table_err)?;
        if nulls > 0 {
            errors.push(format!("Column '{name}' has {nulls} null values"));
        }
    }
    Ok(errors)
}

pub fn unique(df: &DataFrame, columns: &[String]) -> Result<Vec<String>, ValidateError> {
    let mut errors = Vec::new();
    for name in columns {
        let Ok(col) = df.column(name) else { continue };
        let duplicates = duplicate_count(col).map_err(table_err)?;
        if duplicates > 0 {
            errors.push(format!("Column '{name}' has {duplicates} duplicate values"));
        }
    }
    Ok(errors)
}

/// Nulls are excluded from the range check entirely.
pub fn value_ranges(
    df: &DataFrame,
    ranges: &BTreeMap<String, [Threshold; 2]>,
) -> Result<Vec<String>, ValidateError> {
    let mut errors = Vec::new();
    for (name, [min, max]) in ranges {
        let Ok(col) = df.column(name) else { continue };
        if !is_numeric(col.dtype()) {
            return Err(ValidateError::NonNumericRange {
                column: name.clone(),
                dtype: col.dtype().to_string(),
            });
        }
        let out_of_range = numeric_values(col)
            .map_err(table_err)?
            .into_iter()
            .filter(|v| *v < min.value() || *v > max.value())
            .count();
        if out_of_range > 0 {
            errors.push(format!(
                "Column '{name}' has {out_of_range} values out of range [{min}, {max}]"
            ));
        }
    }
    Ok(errors)
}

pub fn min_rows(df: &DataFrame, min: usize) -> Vec<String> {
    let rows = df.height();
    if rows < min {
        vec![format!("Expected at least {min} rows, got {rows}")]
    } else {
        Vec::new()
    }
}

/// An empty table has no nulls, so it never exceeds a cap.
pub fn max_null_percentage(
    df: &DataFrame,
    caps: &BTreeMap<String, Threshold>,
) -> Result<Vec<String>, ValidateError> {
    let rows = df.height();
    let mut errors = Vec::new();
    if rows == 0 {
        return Ok(errors);
    }
    for (name, max_pct) in caps {
        let Ok(col) = df.column(name) else { continue };
        let nulls = missing_count(col).map_err(table_err)?;
        let pct = nulls as f64 / rows as f64 * 100.0;
        if pct > max_pct.value() {
            errors.push(format!(
                "Column '{name}' has {pct:.1}% null values (max allowed: {max_pct}%)"
            ));
        }
    }
    Ok(errors)
}
