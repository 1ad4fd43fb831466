//! Rectangular ranges in A1 notation.
//!
//! Ranges are 0-indexed, inclusive rectangles. They render and parse in
//! Excel-style A1 notation ("A1", "B2:D10") so they read naturally in
//! prompts, logs, and classification records.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A rectangular cell range. Coordinates are 0-indexed and inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    pub start_row: usize,
    pub start_col: usize,
    pub end_row: usize,
    pub end_col: usize,
}

impl Range {
    /// Create a range, normalizing so start <= end on both axes.
    pub fn new(start_row: usize, start_col: usize, end_row: usize, end_col: usize) -> Self {
        let (start_row, end_row) = if start_row <= end_row {
            (start_row, end_row)
        } else {
            (end_row, start_row)
        };
        let (start_col, end_col) = if start_col <= end_col {
            (start_col, end_col)
        } else {
            (end_col, start_col)
        };
        Self { start_row, start_col, end_row, end_col }
    }

    /// A single-cell range.
    pub fn cell(row: usize, col: usize) -> Self {
        Self::new(row, col, row, col)
    }

    pub fn rows(&self) -> usize {
        self.end_row - self.start_row + 1
    }

    pub fn cols(&self) -> usize {
        self.end_col - self.start_col + 1
    }

    /// Whether the range covers the given cell.
    pub fn contains(&self, row: usize, col: usize) -> bool {
        row >= self.start_row && row <= self.end_row && col >= self.start_col && col <= self.end_col
    }

    /// Clamp the range to at most `max_rows` x `max_cols`, keeping the
    /// top-left corner fixed.
    pub fn clamped(&self, max_rows: usize, max_cols: usize) -> Self {
        let rows = self.rows().min(max_rows.max(1));
        let cols = self.cols().min(max_cols.max(1));
        Self {
            start_row: self.start_row,
            start_col: self.start_col,
            end_row: self.start_row + rows - 1,
            end_col: self.start_col + cols - 1,
        }
    }

    /// Parse A1 notation ("A1" or "A1:C10"). Absolute markers ($) are
    /// accepted and ignored.
    pub fn parse(s: &str) -> Result<Self, String> {
        let clean = s.trim().replace('$', "");
        if clean.is_empty() {
            return Err("empty range".to_string());
        }
        let mut parts = clean.splitn(2, ':');
        let first = parts.next().unwrap();
        let (r1, c1) = parse_cell_ref(first)?;
        match parts.next() {
            Some(second) => {
                let (r2, c2) = parse_cell_ref(second)?;
                Ok(Self::new(r1, c1, r2, c2))
            }
            None => Ok(Self::cell(r1, c1)),
        }
    }
}

impl std::fmt::Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.start_row == self.end_row && self.start_col == self.end_col {
            write!(f, "{}", cell_ref(self.start_row, self.start_col))
        } else {
            write!(
                f,
                "{}:{}",
                cell_ref(self.start_row, self.start_col),
                cell_ref(self.end_row, self.end_col)
            )
        }
    }
}

// On the wire a range is its A1 string, which keeps payload JSON compact
// and human-readable.
impl Serialize for Range {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Range {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Range::parse(&s).map_err(D::Error::custom)
    }
}

/// Convert 0-indexed column to letter(s) (0 = A, 25 = Z, 26 = AA, etc.)
pub fn col_to_letter(col: usize) -> String {
    let mut result = String::new();
    let mut n = col;
    loop {
        result.insert(0, (b'A' + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    result
}

/// Format a cell reference in A1 notation.
pub fn cell_ref(row: usize, col: usize) -> String {
    format!("{}{}", col_to_letter(col), row + 1)
}

fn parse_cell_ref(s: &str) -> Result<(usize, usize), String> {
    let mut chars = s.chars().peekable();

    let mut col_str = String::new();
    while chars.peek().map(|c| c.is_ascii_alphabetic()).unwrap_or(false) {
        col_str.push(chars.next().unwrap().to_ascii_uppercase());
    }

    let mut row_str = String::new();
    while chars.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
        row_str.push(chars.next().unwrap());
    }

    if col_str.is_empty() || row_str.is_empty() || chars.next().is_some() {
        return Err(format!("'{}' is not a cell reference", s));
    }

    let col = col_str
        .chars()
        .fold(0usize, |acc, c| acc * 26 + (c as usize - 'A' as usize + 1))
        - 1;
    let row: usize = row_str.parse().map_err(|_| format!("bad row in '{}'", s))?;
    if row == 0 {
        return Err(format!("row must be >= 1 in '{}'", s));
    }
    Ok((row - 1, col))
}
