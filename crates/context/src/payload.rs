//! The build's user-visible output model.
//!
//! Everything here serializes through struct fields (never maps), which
//! is what makes both the compact prompt encoding and the pretty
//! snapshot byte-stable across identical builds.

use gridmind_core::{CellValue, Range, SheetId};
use serde::{Deserialize, Serialize};

use crate::metadata::{NamedRangeDef, TableDef};
use crate::schema::{ColumnSchema, DataRegion, DetectedTable};

/// Schema summary for one sheet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SheetSchemaSummary {
    pub data_regions: Vec<DataRegion>,
    pub tables: Vec<DetectedTable>,
    /// Names of workbook named ranges scoped to this sheet.
    pub named_ranges: Vec<String>,
    /// Columns of the primary (first) detected table, if any.
    pub columns: Vec<ColumnSchema>,
}

/// One sheet in the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetSummary {
    pub sheet_id: SheetId,
    pub name: String,
    pub schema: SheetSchemaSummary,
}

/// Where a data block came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Selection,
    ActiveSheetSample,
    SheetSample,
}

/// A rectangle of (possibly redacted) values included in the payload.
/// Values may contain the `"[REDACTED]"` / `"[POLICY_DENIED]"` sentinels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataBlock {
    pub kind: BlockKind,
    pub sheet_id: SheetId,
    pub range: Range,
    pub values: Vec<Vec<CellValue>>,
}

/// The caller's selection, echoed into the payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelectionRef {
    pub sheet_id: SheetId,
    pub range: Range,
}

/// Token budget the payload was built against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetInfo {
    pub max_prompt_context_tokens: usize,
}

/// Attachment metadata surfaced to the prompt (payload bytes stay out of
/// the prompt; only shape information is packed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentSummary {
    pub name: String,
    pub mime: String,
    pub bytes: usize,
}

/// The assembled workbook context. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkbookContextPayload {
    pub workbook_id: String,
    pub active_sheet_id: SheetId,
    pub sheets: Vec<SheetSummary>,
    pub tables: Vec<TableDef>,
    pub named_ranges: Vec<NamedRangeDef>,
    pub blocks: Vec<DataBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection: Option<SelectionRef>,
    pub budget: BudgetInfo,
}

/// Stable pretty snapshot of a payload, for tests and debugging. This is
/// distinct from the compact prompt encoding produced by the packer.
pub fn serialize_payload(payload: &WorkbookContextPayload) -> String {
    serde_json::to_string_pretty(payload).unwrap_or_default()
}
