//! Sheet identity.
//!
//! A `SheetId` uniquely identifies a sheet within a workbook. IDs are
//! stable and never reused after a sheet is deleted, which makes them
//! safe to use as cache keys.

use serde::{Deserialize, Serialize};

/// Stable identifier for a sheet in a workbook.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SheetId(u64);

impl SheetId {
    /// Construct a SheetId from its raw value.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw value (for persistence and display).
    #[inline]
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SheetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sheet{}", self.0)
    }
}
