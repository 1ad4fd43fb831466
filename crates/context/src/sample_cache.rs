//! Per-sheet sample cache.
//!
//! One entry per sheet, keyed by (content version, DLP fingerprint).
//! Entries are replaced wholesale, never mutated in place; a stale entry
//! is simply superseded by the next put for the same sheet, so the cache
//! is bounded by the set of sheets a builder touches.

use std::sync::Arc;

use gridmind_core::{CellValue, Range, SheetId};
use rustc_hash::FxHashMap;

use crate::dlp::DlpFingerprint;
use crate::reader::ContentVersion;
use crate::schema::ExtractedSchema;

/// A sampled, redacted block and its derived schema.
///
/// `raw_values` never leaves this struct: payload assembly reads
/// `redacted_values` only. Reuse requires BOTH the content version and
/// the DLP fingerprint to match.
#[derive(Debug, Clone)]
pub struct SampleCacheEntry {
    pub sheet: SheetId,
    pub content_version: ContentVersion,
    pub dlp_fingerprint: DlpFingerprint,
    /// The sampled window in sheet coordinates.
    pub range: Range,
    /// Unredacted sample, retained for diagnostics only.
    pub raw_values: Vec<Vec<CellValue>>,
    /// What downstream consumers are allowed to see.
    pub redacted_values: Vec<Vec<CellValue>>,
    pub schema: ExtractedSchema,
    pub policy_denied: bool,
}

/// Cache of sampled sheets for one builder.
#[derive(Default)]
pub struct SheetSampleCache {
    entries: FxHashMap<SheetId, Arc<SampleCacheEntry>>,
}

impl SheetSampleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pure key match: the entry is returned iff both the content version
    /// and the fingerprint are current.
    pub fn get(
        &self,
        sheet: SheetId,
        content_version: ContentVersion,
        fingerprint: &DlpFingerprint,
    ) -> Option<Arc<SampleCacheEntry>> {
        self.entries.get(&sheet).filter(|entry| {
            entry.content_version == content_version && &entry.dlp_fingerprint == fingerprint
        }).cloned()
    }

    /// Insert or replace the entry for a sheet. Entries for other sheets
    /// are untouched.
    pub fn put(&mut self, entry: SampleCacheEntry) -> Arc<SampleCacheEntry> {
        let entry = Arc::new(entry);
        self.entries.insert(entry.sheet, entry.clone());
        entry
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
