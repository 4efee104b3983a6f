//! Field values carried by records.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single semantic attribute value.
///
/// Extraction output is loosely typed: ages may arrive as numbers or as
/// strings, flags as booleans. Values keep whatever shape they arrived in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    /// Blank values are null or whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Comparison key used for identity checks: trimmed, case-folded text.
    pub fn comparison_key(&self) -> String {
        self.to_string().trim().to_lowercase()
    }

    /// Whether two values differ materially (both non-blank and unequal
    /// after trimming and case folding).
    pub fn differs_materially(&self, other: &FieldValue) -> bool {
        !self.is_blank() && !other.is_blank() && self.comparison_key() != other.comparison_key()
    }

    /// Get the value as text if it is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Build a value from a raw extracted cell. Empty cells become null.
    pub fn from_raw(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            FieldValue::Null
        } else {
            FieldValue::Text(trimmed.to_string())
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Integer(n) => write!(f, "{}", n),
            FieldValue::Float(x) => write!(f, "{}", x),
            FieldValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Integer(i64::from(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}
