//! Cell values as seen by the context engine.
//!
//! The document model hands back computed display values, not formulas.
//! Values serialize untagged as the matching JSON scalar so that sampled
//! blocks read as plain JSON arrays in prompt output.

use serde::{Deserialize, Serialize};

/// A computed cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Default for CellValue {
    fn default() -> Self {
        CellValue::Empty
    }
}

impl CellValue {
    /// Parse a raw display string the way cell input is interpreted:
    /// empty -> Empty, numeric -> Number, otherwise Text.
    pub fn from_display(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return CellValue::Empty;
        }
        if let Ok(num) = trimmed.parse::<f64>() {
            return CellValue::Number(num);
        }
        CellValue::Text(trimmed.to_string())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// True for Number, or Text that parses as a number. Used by schema
    /// inference, which must treat "42" the same as 42.
    pub fn is_numeric(&self) -> bool {
        match self {
            CellValue::Number(_) => true,
            CellValue::Text(s) => s.trim().parse::<f64>().is_ok(),
            _ => false,
        }
    }

    /// The value as display text.
    pub fn to_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            CellValue::Text(s) => s.clone(),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::from_display(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}
