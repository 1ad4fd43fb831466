//! Build orchestration.
//!
//! `ContextBuilder::build` walks the workbook once per call: normalize
//! DLP state, sample sheets through the caches, resolve metadata, apply
//! the selection, run retrieval, pack. One range-reading session is
//! opened lazily per call and shared by every read in that call.

use std::sync::Arc;
use std::time::Instant;

use base64::Engine as _;
use gridmind_core::{CellValue, Range, SheetId};
use parking_lot::Mutex;

use crate::dlp::{
    AuditLogger, ClassificationStore, DlpContext, DlpContextInput, DlpFingerprint, DlpRedactor,
    GovernedAction,
};
use crate::error::ContextError;
use crate::metadata::{MetadataCache, SchemaProvider, WorkbookMetadata};
use crate::packer::{HeuristicTokenEstimator, PromptPacker, TokenEstimator};
use crate::payload::{
    AttachmentSummary, BlockKind, BudgetInfo, DataBlock, SelectionRef, SheetSchemaSummary,
    SheetSummary, WorkbookContextPayload,
};
use crate::reader::{RangeSession, SheetMeta, WorkbookReader};
use crate::retrieval::{RagService, RetrievalAdapter, RetrievalQuery, RetrievedChunk};
use crate::sample_cache::{SampleCacheEntry, SheetSampleCache};
use crate::schema::{self, ExtractedSchema};
use crate::stats::{BuildStats, StatsCallback};

/// Builder tunables.
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// How many sheets beyond the active one to sample.
    pub max_sheets: usize,
    /// Sample window caps, applied from the used range's top-left.
    pub max_sample_rows: usize,
    pub max_sample_cols: usize,
    /// Token budget handed to the packer.
    pub max_prompt_context_tokens: usize,
    /// The action DLP policy rules are consulted for.
    pub governed_action: GovernedAction,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            max_sheets: 4,
            max_sample_rows: 200,
            max_sample_cols: 20,
            max_prompt_context_tokens: 8000,
            governed_action: GovernedAction::AiCloudProcessing,
        }
    }
}

/// An attachment offered for context. Only shape metadata reaches the
/// prompt; a payload that fails base64 validation is skipped.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub name: String,
    pub mime: String,
    pub data_base64: String,
}

/// One build request.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub workbook_id: String,
    /// Caller-declared mode, reported in stats.
    pub mode: String,
    pub model: Option<String>,
    pub focus_question: Option<String>,
    pub selected_range: Option<SelectionRef>,
    pub dlp: Option<DlpContextInput>,
    pub attachments: Vec<Attachment>,
}

impl BuildRequest {
    pub fn new(workbook_id: impl Into<String>) -> Self {
        Self {
            workbook_id: workbook_id.into(),
            mode: "ask".to_string(),
            model: None,
            focus_question: None,
            selected_range: None,
            dlp: None,
            attachments: Vec::new(),
        }
    }
}

/// What `build()` returns.
#[derive(Debug, Clone)]
pub struct BuildResult {
    pub payload: WorkbookContextPayload,
    pub retrieved: Vec<RetrievedChunk>,
    pub prompt_context: String,
}

/// Lazily-opened range session. Exactly one underlying session per
/// build, no matter how many sheets are read.
struct LazySession<'a> {
    reader: &'a dyn WorkbookReader,
    session: Option<Box<dyn RangeSession>>,
}

impl<'a> LazySession<'a> {
    fn new(reader: &'a dyn WorkbookReader) -> Self {
        Self { reader, session: None }
    }

    async fn read_range(
        &mut self,
        sheet: SheetId,
        range: Range,
    ) -> Result<Vec<Vec<CellValue>>, ContextError> {
        if self.session.is_none() {
            self.session = Some(self.reader.open_session()?);
        }
        match self.session.as_mut() {
            Some(session) => session.read_range(sheet, range).await,
            None => Err(ContextError::SessionOpen("session unavailable".to_string())),
        }
    }
}

/// Assembles workbook context payloads.
pub struct ContextBuilder {
    reader: Arc<dyn WorkbookReader>,
    schema_provider: Option<Arc<dyn SchemaProvider>>,
    retrieval: RetrievalAdapter,
    classification_store: Option<Arc<dyn ClassificationStore>>,
    audit: Option<Arc<dyn AuditLogger>>,
    estimator: Arc<dyn TokenEstimator>,
    metadata_cache: Arc<MetadataCache>,
    samples: Mutex<SheetSampleCache>,
    on_stats: Option<StatsCallback>,
    config: BuilderConfig,
}

impl ContextBuilder {
    pub fn new(reader: Arc<dyn WorkbookReader>, metadata_cache: Arc<MetadataCache>) -> Self {
        Self {
            reader,
            schema_provider: None,
            retrieval: RetrievalAdapter::disabled(),
            classification_store: None,
            audit: None,
            estimator: Arc::new(HeuristicTokenEstimator),
            metadata_cache,
            samples: Mutex::new(SheetSampleCache::new()),
            on_stats: None,
            config: BuilderConfig::default(),
        }
    }

    pub fn with_config(mut self, config: BuilderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_schema_provider(mut self, provider: Arc<dyn SchemaProvider>) -> Self {
        self.schema_provider = Some(provider);
        self
    }

    pub fn with_rag_service(mut self, service: Arc<dyn RagService>) -> Self {
        self.retrieval = RetrievalAdapter::new(Some(service));
        self
    }

    pub fn with_classification_store(mut self, store: Arc<dyn ClassificationStore>) -> Self {
        self.classification_store = Some(store);
        self
    }

    pub fn with_audit_logger(mut self, audit: Arc<dyn AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_token_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_stats_callback(mut self, callback: StatsCallback) -> Self {
        self.on_stats = Some(callback);
        self
    }

    /// Assemble the context payload for one request.
    pub async fn build(&self, request: BuildRequest) -> Result<BuildResult, ContextError> {
        let started = Instant::now();
        let mut stats = BuildStats {
            mode: request.mode.clone(),
            model: request.model.clone(),
            run_at: chrono::Utc::now().to_rfc3339(),
            ..Default::default()
        };

        // 1. Canonical DLP state and its fingerprint, before any cache
        //    key is computed.
        let dlp = request
            .dlp
            .clone()
            .unwrap_or_default()
            .normalize(&request.workbook_id, self.classification_store.as_deref())?;
        let fingerprint = DlpFingerprint::of(&dlp);

        // 2. One session for the whole call, opened on first read.
        let mut session = LazySession::new(self.reader.as_ref());

        // 3. Active sheet first, then up to max_sheets others, in
        //    workbook order. Only the active sheet is load-bearing.
        let active_id = self.reader.active_sheet();
        let all_sheets = self.reader.sheets();
        let active_meta = all_sheets
            .iter()
            .find(|m| m.id == active_id)
            .ok_or(ContextError::SheetUnavailable(active_id))?
            .clone();

        let mut sampled: Vec<(SheetMeta, Option<Arc<SampleCacheEntry>>)> = Vec::new();
        let entry = self
            .sample_sheet(&active_meta, &dlp, &fingerprint, &mut session, &mut stats)
            .await?;
        sampled.push((active_meta, entry));

        for meta in all_sheets
            .iter()
            .filter(|m| m.id != active_id)
            .take(self.config.max_sheets)
        {
            match self
                .sample_sheet(meta, &dlp, &fingerprint, &mut session, &mut stats)
                .await
            {
                Ok(entry) => sampled.push((meta.clone(), entry)),
                Err(e) => log::warn!("skipping secondary sheet {}: {e}", meta.id),
            }
        }

        // 4. Named ranges/tables, through the shared version-keyed cache.
        let metadata = match &self.schema_provider {
            Some(provider) => {
                let (metadata, hit) = self.metadata_cache.resolve(provider.as_ref());
                if hit {
                    stats.metadata_cache_hits += 1;
                } else {
                    stats.metadata_cache_misses += 1;
                }
                metadata
            }
            None => Arc::new(WorkbookMetadata::default()),
        };

        // 5. Selection block, re-read and re-redacted on every build: the
        //    DLP state now may differ from the state at caching time.
        let mut blocks: Vec<DataBlock> = Vec::new();
        if let Some(selection) = request.selected_range {
            if self.reader.content_version(selection.sheet_id).is_none() {
                return Err(ContextError::SelectionUnavailable { sheet: selection.sheet_id });
            }
            let raw = session.read_range(selection.sheet_id, selection.range).await?;
            let redactor = DlpRedactor::new(&dlp, self.config.governed_action, self.audit.as_deref());
            let outcome = redactor.apply(selection.sheet_id, selection.range, &raw);
            blocks.push(DataBlock {
                kind: BlockKind::Selection,
                sheet_id: selection.sheet_id,
                range: selection.range,
                values: outcome.values,
            });
        }

        for (meta, entry) in &sampled {
            if let Some(entry) = entry {
                blocks.push(DataBlock {
                    kind: if meta.id == active_id {
                        BlockKind::ActiveSheetSample
                    } else {
                        BlockKind::SheetSample
                    },
                    sheet_id: meta.id,
                    range: entry.range,
                    values: entry.redacted_values.clone(),
                });
            }
        }

        // 6. Retrieval (best-effort; see retrieval module).
        stats.retrieval_enabled = self.retrieval.is_enabled();
        let retrieved = if self.retrieval.is_enabled() {
            let query = RetrievalQuery {
                workbook_id: request.workbook_id.clone(),
                focus_question: request.focus_question.clone().unwrap_or_default(),
                sheets: sampled.iter().map(|(meta, _)| meta.id).collect(),
            };
            self.retrieval.retrieve(&query).await
        } else {
            Vec::new()
        };
        stats.retrieved_count = retrieved.len();

        // 7. Attachments: validate payloads, keep shape metadata.
        let attachments = decode_attachments(&request.attachments);

        // 8. Assemble and pack.
        let sheets: Vec<SheetSummary> = sampled
            .iter()
            .map(|(meta, entry)| summarize_sheet(meta, entry.as_deref(), &metadata))
            .collect();

        let payload = WorkbookContextPayload {
            workbook_id: request.workbook_id.clone(),
            active_sheet_id: active_id,
            sheets,
            tables: metadata.tables.clone(),
            named_ranges: metadata.named_ranges.clone(),
            blocks,
            selection: request.selected_range,
            budget: BudgetInfo {
                max_prompt_context_tokens: self.config.max_prompt_context_tokens,
            },
        };

        let packer = PromptPacker::new(
            self.estimator.clone(),
            self.config.max_prompt_context_tokens,
        );
        let packed = packer.pack(&payload, &retrieved, &attachments);

        // 9. Stats, exactly once, after the result is fully assembled.
        stats.sheets_sampled = sampled.len();
        stats.blocks = payload.blocks.len();
        stats.estimated_tokens = packed.estimated_tokens;
        stats.trimmed_sections = packed.trimmed_sections.len();
        stats.duration_ms = started.elapsed().as_millis() as u64;
        if let Some(callback) = &self.on_stats {
            callback(&stats);
        }

        Ok(BuildResult {
            payload,
            retrieved,
            prompt_context: packed.prompt_context,
        })
    }

    /// Sample one sheet through the cache. Returns None for a sheet with
    /// no content to sample.
    async fn sample_sheet(
        &self,
        meta: &SheetMeta,
        dlp: &DlpContext,
        fingerprint: &DlpFingerprint,
        session: &mut LazySession<'_>,
        stats: &mut BuildStats,
    ) -> Result<Option<Arc<SampleCacheEntry>>, ContextError> {
        let version = match self.reader.content_version(meta.id) {
            Some(version) => version,
            None => return Err(ContextError::SheetUnavailable(meta.id)),
        };
        let window = match meta.used_range {
            Some(used) => used.clamped(self.config.max_sample_rows, self.config.max_sample_cols),
            None => return Ok(None),
        };

        if let Some(entry) = self.samples.lock().get(meta.id, version, fingerprint) {
            stats.sample_cache_hits += 1;
            return Ok(Some(entry));
        }
        stats.sample_cache_misses += 1;

        let raw = session.read_range(meta.id, window).await?;
        let redactor = DlpRedactor::new(dlp, self.config.governed_action, self.audit.as_deref());
        let outcome = redactor.apply(meta.id, window, &raw);
        let schema = if outcome.policy_denied {
            ExtractedSchema::denied()
        } else {
            schema::extract(window, &outcome.values)
        };

        let entry = self.samples.lock().put(SampleCacheEntry {
            sheet: meta.id,
            content_version: version,
            dlp_fingerprint: fingerprint.clone(),
            range: window,
            raw_values: raw,
            redacted_values: outcome.values,
            schema,
            policy_denied: outcome.policy_denied,
        });
        Ok(Some(entry))
    }
}

fn summarize_sheet(
    meta: &SheetMeta,
    entry: Option<&SampleCacheEntry>,
    metadata: &WorkbookMetadata,
) -> SheetSummary {
    let schema = match entry {
        Some(entry) => SheetSchemaSummary {
            data_regions: entry.schema.data_regions.clone(),
            tables: entry.schema.tables.clone(),
            named_ranges: metadata
                .named_ranges
                .iter()
                .filter(|n| n.sheet == meta.id)
                .map(|n| n.name.clone())
                .collect(),
            columns: entry
                .schema
                .tables
                .first()
                .map(|t| t.columns.clone())
                .unwrap_or_default(),
        },
        None => SheetSchemaSummary::default(),
    };
    SheetSummary { sheet_id: meta.id, name: meta.name.clone(), schema }
}

fn decode_attachments(attachments: &[Attachment]) -> Vec<AttachmentSummary> {
    attachments
        .iter()
        .filter_map(|att| {
            match base64::engine::general_purpose::STANDARD.decode(att.data_base64.as_bytes()) {
                Ok(bytes) => Some(AttachmentSummary {
                    name: att.name.clone(),
                    mime: att.mime.clone(),
                    bytes: bytes.len(),
                }),
                Err(e) => {
                    log::warn!("skipping malformed attachment '{}': {e}", att.name);
                    None
                }
            }
        })
        .collect()
}
