//! Per-build statistics.
//!
//! One instance per `build()` call, handed to the caller's callback
//! after the result is fully assembled. Never cached, never persisted by
//! this crate.

use serde::Serialize;

/// Counters and timings for one build.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildStats {
    /// Caller-declared mode (e.g. "ask", "agent").
    pub mode: String,
    /// Target model, if the caller declared one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// RFC 3339 timestamp of the build.
    pub run_at: String,
    pub duration_ms: u64,
    pub sheets_sampled: usize,
    pub blocks: usize,
    pub sample_cache_hits: usize,
    pub sample_cache_misses: usize,
    pub metadata_cache_hits: usize,
    pub metadata_cache_misses: usize,
    pub retrieval_enabled: bool,
    pub retrieved_count: usize,
    pub estimated_tokens: usize,
    pub trimmed_sections: usize,
}

/// Callback type for receiving build stats. Invoked exactly once per
/// successful build, after the result is assembled.
pub type StatsCallback = Box<dyn Fn(&BuildStats) + Send + Sync>;
