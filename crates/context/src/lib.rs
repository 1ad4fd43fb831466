//! Workbook AI-context assembly.
//!
//! Turns a live workbook into a bounded, deterministic, policy-compliant
//! text payload for a language model. The orchestrator is
//! [`builder::ContextBuilder`]; everything else is a layer it composes:
//! DLP redaction, schema inference, sample/metadata caches, retrieval,
//! and token-budgeted prompt packing.

pub mod builder;
pub mod dlp;
pub mod error;
pub mod metadata;
pub mod packer;
pub mod payload;
pub mod reader;
pub mod retrieval;
pub mod sample_cache;
pub mod schema;
pub mod stats;

pub use builder::{Attachment, BuildRequest, BuildResult, BuilderConfig, ContextBuilder};
pub use dlp::{DlpContext, DlpContextInput, DlpDecision, DlpFingerprint};
pub use error::ContextError;
pub use metadata::MetadataCache;
pub use packer::{HeuristicTokenEstimator, PromptPacker, TokenEstimator, TRIM_MARKER};
pub use payload::{serialize_payload, WorkbookContextPayload};
pub use stats::{BuildStats, StatsCallback};
