//! Schema inference over sampled blocks.
//!
//! A schema-first summary (regions, headers, column types) is far cheaper
//! in tokens than a raw cell dump, so the builder prefers it wherever DLP
//! allows extraction to run at all.

use gridmind_core::{CellValue, Range};
use serde::{Deserialize, Serialize};

/// JSON-ish column type. Ties between string and number break toward
/// string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    String,
    Number,
}

/// One inferred column of a detected table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ColumnType,
}

/// A maximal contiguous non-empty rectangle of cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRegion {
    pub range: Range,
    pub has_header: bool,
}

/// A header+data region with typed columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedTable {
    pub range: Range,
    pub columns: Vec<ColumnSchema>,
}

/// Everything schema inference produces for one sampled block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedSchema {
    pub data_regions: Vec<DataRegion>,
    pub tables: Vec<DetectedTable>,
}

impl ExtractedSchema {
    /// The empty schema used for policy-denied blocks.
    pub fn denied() -> Self {
        Self::default()
    }
}

/// Infer data regions, headers, and column types from a sampled block.
/// `origin` is the block's top-left cell in sheet coordinates. Must not
/// be called for a policy-denied block.
pub fn extract(origin: Range, values: &[Vec<CellValue>]) -> ExtractedSchema {
    let rows = values.len();
    let cols = values.first().map(|r| r.len()).unwrap_or(0);
    if rows == 0 || cols == 0 {
        return ExtractedSchema::default();
    }

    let mut regions = Vec::new();
    let mut claimed = vec![vec![false; cols]; rows];

    for r in 0..rows {
        for c in 0..cols {
            if claimed[r][c] || values[r][c].is_empty() {
                continue;
            }
            let local = grow_region(values, r, c);
            for rr in local.start_row..=local.end_row {
                for cc in local.start_col..=local.end_col {
                    claimed[rr][cc] = true;
                }
            }
            regions.push(local);
        }
    }

    let mut data_regions = Vec::with_capacity(regions.len());
    let mut tables = Vec::new();

    for local in regions {
        let has_header = region_has_header(values, local);
        let sheet_range = Range::new(
            origin.start_row + local.start_row,
            origin.start_col + local.start_col,
            origin.start_row + local.end_row,
            origin.start_col + local.end_col,
        );
        if has_header {
            tables.push(DetectedTable {
                range: sheet_range,
                columns: region_columns(values, local),
            });
        }
        data_regions.push(DataRegion { range: sheet_range, has_header });
    }

    ExtractedSchema { data_regions, tables }
}

/// Expand outward from a seed cell to the maximal bounding rectangle with
/// no fully-empty border row/column, mirroring the current-region
/// behavior users expect from the grid.
fn grow_region(values: &[Vec<CellValue>], seed_row: usize, seed_col: usize) -> Range {
    let rows = values.len();
    let cols = values[0].len();
    let (mut r0, mut r1, mut c0, mut c1) = (seed_row, seed_row, seed_col, seed_col);

    loop {
        let mut grew = false;
        if r0 > 0 && !row_empty(values, r0 - 1, c0, c1) {
            r0 -= 1;
            grew = true;
        }
        if r1 + 1 < rows && !row_empty(values, r1 + 1, c0, c1) {
            r1 += 1;
            grew = true;
        }
        if c0 > 0 && !col_empty(values, c0 - 1, r0, r1) {
            c0 -= 1;
            grew = true;
        }
        if c1 + 1 < cols && !col_empty(values, c1 + 1, r0, r1) {
            c1 += 1;
            grew = true;
        }
        if !grew {
            break;
        }
    }

    Range::new(r0, c0, r1, c1)
}

fn row_empty(values: &[Vec<CellValue>], row: usize, c0: usize, c1: usize) -> bool {
    (c0..=c1).all(|c| values[row][c].is_empty())
}

fn col_empty(values: &[Vec<CellValue>], col: usize, r0: usize, r1: usize) -> bool {
    (r0..=r1).all(|r| values[r][col].is_empty())
}

/// Row 0 of a region is a header iff every cell is a non-numeric string
/// and at least one column's body-majority type differs from string.
/// A single-row region has no body to be a header of.
fn region_has_header(values: &[Vec<CellValue>], region: Range) -> bool {
    if region.rows() < 2 {
        return false;
    }
    let header_row = region.start_row;
    let all_text = (region.start_col..=region.end_col).all(|c| {
        matches!(&values[header_row][c], CellValue::Text(_)) && !values[header_row][c].is_numeric()
    });
    if !all_text {
        return false;
    }
    (region.start_col..=region.end_col).any(|c| {
        column_majority_type(values, region.start_row + 1, region.end_row, c) == ColumnType::Number
    })
}

fn column_majority_type(
    values: &[Vec<CellValue>],
    r0: usize,
    r1: usize,
    col: usize,
) -> ColumnType {
    let mut numbers = 0usize;
    let mut strings = 0usize;
    for r in r0..=r1 {
        match &values[r][col] {
            CellValue::Empty => {}
            v if v.is_numeric() => numbers += 1,
            _ => strings += 1,
        }
    }
    if numbers > strings {
        ColumnType::Number
    } else {
        ColumnType::String
    }
}

fn region_columns(values: &[Vec<CellValue>], region: Range) -> Vec<ColumnSchema> {
    (region.start_col..=region.end_col)
        .map(|c| ColumnSchema {
            name: values[region.start_row][c].to_text(),
            ty: column_majority_type(values, region.start_row + 1, region.end_row, c),
        })
        .collect()
}
