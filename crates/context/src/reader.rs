//! Document reader boundary.
//!
//! The cell store lives elsewhere; the builder sees it only through these
//! traits. A build opens exactly one [`RangeSession`] lazily and routes
//! every range read of that build through it, which bounds per-build
//! resource overhead no matter how many sheets are touched.

use async_trait::async_trait;
use gridmind_core::{CellValue, Range, SheetId};

use crate::error::ContextError;

/// Per-sheet content version.
///
/// Advances only on cell-content mutation. View-only changes (freeze
/// panes, scroll, zoom) must not advance it; the sample cache relies on
/// that to skip re-reads on rebuild.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContentVersion(u64);

impl ContentVersion {
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// What the reader knows about a sheet up front.
#[derive(Debug, Clone)]
pub struct SheetMeta {
    pub id: SheetId,
    pub name: String,
    /// Bounding box of non-empty cells. None for an empty sheet.
    pub used_range: Option<Range>,
}

/// One range-reading session. Exactly one is created per `build()` call.
#[async_trait]
pub trait RangeSession: Send {
    /// Read a rectangular block of computed values.
    /// The result must be exactly `range.rows()` x `range.cols()`.
    async fn read_range(
        &mut self,
        sheet: SheetId,
        range: Range,
    ) -> Result<Vec<Vec<CellValue>>, ContextError>;
}

/// The workbook document model, seen from the context engine.
pub trait WorkbookReader: Send + Sync {
    /// Open a new reading session. Called lazily, once per build.
    fn open_session(&self) -> Result<Box<dyn RangeSession>, ContextError>;

    /// Current content version for a sheet. None if the sheet is unknown.
    fn content_version(&self, sheet: SheetId) -> Option<ContentVersion>;

    /// All sheets, in workbook order.
    fn sheets(&self) -> Vec<SheetMeta>;

    /// The currently active sheet.
    fn active_sheet(&self) -> SheetId;
}
