//! Workbook metadata (named ranges, tables) with a process-wide cache.
//!
//! Provider entries arrive as raw JSON and are parsed leniently: one bad
//! entry is skipped with a warning, never fatal. The cache is explicit,
//! injectable state: builders that should share it are handed the same
//! `Arc<MetadataCache>`, and a schema-version bump is the only
//! invalidation.

use std::sync::Arc;

use gridmind_core::{Range, SheetId};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Opaque schema version from the provider. Advances only when named
/// ranges/tables actually change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SchemaVersion(u64);

impl SchemaVersion {
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// External source of named ranges and tables. Calls are synchronous and
/// assumed fast; the cache exists to avoid repeating them.
pub trait SchemaProvider: Send + Sync {
    /// Stable identity of this provider (cache key component).
    fn provider_key(&self) -> String;

    fn schema_version(&self) -> SchemaVersion;

    /// Raw named-range entries. Parsed leniently by the cache.
    fn named_ranges(&self) -> Vec<serde_json::Value>;

    /// Raw table entries. Parsed leniently by the cache.
    fn tables(&self) -> Vec<serde_json::Value>;
}

/// A named range as it appears in payload output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedRangeDef {
    pub name: String,
    pub sheet: SheetId,
    pub range: Range,
}

/// A table definition as it appears in payload output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub sheet: SheetId,
    pub range: Range,
    #[serde(default)]
    pub columns: Vec<String>,
}

/// Parsed provider metadata, sorted for deterministic output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkbookMetadata {
    pub named_ranges: Vec<NamedRangeDef>,
    pub tables: Vec<TableDef>,
}

struct MetadataCacheEntry {
    schema_version: SchemaVersion,
    metadata: Arc<WorkbookMetadata>,
}

/// Process-scope cache keyed by (provider identity, schema version).
#[derive(Default)]
pub struct MetadataCache {
    entries: Mutex<FxHashMap<String, MetadataCacheEntry>>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve metadata through the cache. Returns the metadata and
    /// whether it was a cache hit.
    pub fn resolve(&self, provider: &dyn SchemaProvider) -> (Arc<WorkbookMetadata>, bool) {
        let key = provider.provider_key();
        let version = provider.schema_version();

        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(&key) {
            if entry.schema_version == version {
                return (entry.metadata.clone(), true);
            }
        }

        let metadata = Arc::new(fetch(provider));
        entries.insert(
            key,
            MetadataCacheEntry { schema_version: version, metadata: metadata.clone() },
        );
        (metadata, false)
    }
}

/// Pull and parse provider entries, skipping anything malformed.
fn fetch(provider: &dyn SchemaProvider) -> WorkbookMetadata {
    let mut named_ranges: Vec<NamedRangeDef> = provider
        .named_ranges()
        .into_iter()
        .filter_map(|raw| match serde_json::from_value::<NamedRangeDef>(raw.clone()) {
            Ok(def) => Some(def),
            Err(e) => {
                log::warn!("skipping malformed named range entry: {e} ({raw})");
                None
            }
        })
        .collect();
    named_ranges.sort_by(|a, b| a.name.cmp(&b.name));

    let mut tables: Vec<TableDef> = provider
        .tables()
        .into_iter()
        .filter_map(|raw| match serde_json::from_value::<TableDef>(raw.clone()) {
            Ok(def) => Some(def),
            Err(e) => {
                log::warn!("skipping malformed table entry: {e} ({raw})");
                None
            }
        })
        .collect();
    tables.sort_by(|a, b| a.name.cmp(&b.name));

    WorkbookMetadata { named_ranges, tables }
}
