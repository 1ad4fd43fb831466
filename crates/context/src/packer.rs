//! Token-budgeted prompt packing.
//!
//! Sections have fixed priorities; higher packs first and is trimmed
//! last. Bodies are canonical compact JSON, so packing the same payload
//! twice yields byte-identical output, which upstream prompt caching
//! requires. Budget overflow is handled by the trimming loop, not by
//! error returns.

use std::sync::Arc;

use serde::Serialize;

use crate::payload::{AttachmentSummary, WorkbookContextPayload};
use crate::retrieval::RetrievedChunk;

/// Literal marker left in place of a trimmed section.
pub const TRIM_MARKER: &str = "trimmed to fit token budget";

/// A chat-style message, for estimators that price message framing.
#[derive(Debug, Clone, Serialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

/// Pluggable token estimator. The packer is measurably sensitive to the
/// estimator: a stricter one trims where the default would not.
pub trait TokenEstimator: Send + Sync {
    fn estimate_text_tokens(&self, text: &str) -> usize;

    fn estimate_message_tokens(&self, message: &PromptMessage) -> usize {
        // Small fixed overhead for message framing.
        self.estimate_text_tokens(&message.role) + self.estimate_text_tokens(&message.content) + 3
    }

    fn estimate_messages_tokens(&self, messages: &[PromptMessage]) -> usize {
        messages.iter().map(|m| self.estimate_message_tokens(m)).sum()
    }
}

/// Default heuristic: roughly four characters per token.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenEstimator;

impl TokenEstimator for HeuristicTokenEstimator {
    fn estimate_text_tokens(&self, text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }
}

/// Result of packing one payload.
#[derive(Debug, Clone)]
pub struct PackedPrompt {
    pub prompt_context: String,
    pub estimated_tokens: usize,
    /// Keys of sections replaced by the trim marker, lowest priority
    /// first.
    pub trimmed_sections: Vec<&'static str>,
}

struct Section {
    key: &'static str,
    body: String,
}

/// Assembles prioritized sections under a token budget.
pub struct PromptPacker {
    estimator: Arc<dyn TokenEstimator>,
    max_tokens: usize,
}

impl PromptPacker {
    pub fn new(estimator: Arc<dyn TokenEstimator>, max_tokens: usize) -> Self {
        Self { estimator, max_tokens }
    }

    /// Pack payload + retrieval + attachments into the final prompt
    /// context string.
    pub fn pack(
        &self,
        payload: &WorkbookContextPayload,
        retrieved: &[RetrievedChunk],
        attachments: &[AttachmentSummary],
    ) -> PackedPrompt {
        // Built in priority order: workbook_summary=5, sheet_schemas=4,
        // data_blocks=3, retrieved=2, attachments=1. Empty sections are
        // omitted entirely.
        let mut sections: Vec<Section> = Vec::with_capacity(5);

        sections.push(Section {
            key: "workbook_summary",
            body: compact_json(&WorkbookSummaryView::of(payload)),
        });
        if !payload.sheets.is_empty() {
            sections.push(Section {
                key: "sheet_schemas",
                body: compact_json(&payload.sheets),
            });
        }
        if !payload.blocks.is_empty() {
            sections.push(Section {
                key: "data_blocks",
                body: compact_json(&payload.blocks),
            });
        }
        if !retrieved.is_empty() {
            // Rebuilt from (text, score) pairs on purpose; see retrieval
            // module docs.
            let entries: Vec<RetrievedEntry<'_>> = retrieved
                .iter()
                .map(|c| RetrievedEntry { score: c.score, text: &c.text })
                .collect();
            sections.push(Section { key: "retrieved", body: compact_json(&entries) });
        }
        if !attachments.is_empty() {
            sections.push(Section { key: "attachments", body: compact_json(&attachments) });
        }

        let mut trimmed: Vec<&'static str> = Vec::new();
        loop {
            let text = render(&sections);
            let tokens = self.estimator.estimate_text_tokens(&text);
            if tokens <= self.max_tokens {
                return PackedPrompt {
                    prompt_context: text,
                    estimated_tokens: tokens,
                    trimmed_sections: trimmed,
                };
            }
            // Trim the lowest-priority section still carrying a body.
            // The highest-priority section is never trimmed.
            let candidate = sections
                .iter()
                .rposition(|s| s.body != TRIM_MARKER)
                .filter(|&i| i > 0);
            match candidate {
                Some(i) => {
                    sections[i].body = TRIM_MARKER.to_string();
                    trimmed.push(sections[i].key);
                }
                None => {
                    // Over budget with nothing left to trim; return as-is.
                    return PackedPrompt {
                        prompt_context: text,
                        estimated_tokens: tokens,
                        trimmed_sections: trimmed,
                    };
                }
            }
        }
    }
}

fn render(sections: &[Section]) -> String {
    sections
        .iter()
        .map(|s| format!("## {}\n{}", s.key, s.body))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn compact_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// The workbook_summary section body.
#[derive(Serialize)]
struct WorkbookSummaryView<'a> {
    workbook_id: &'a str,
    active_sheet_id: gridmind_core::SheetId,
    sheets: Vec<SheetNameView<'a>>,
    table_count: usize,
    named_range_count: usize,
}

#[derive(Serialize)]
struct SheetNameView<'a> {
    sheet_id: gridmind_core::SheetId,
    name: &'a str,
}

impl<'a> WorkbookSummaryView<'a> {
    fn of(payload: &'a WorkbookContextPayload) -> Self {
        Self {
            workbook_id: &payload.workbook_id,
            active_sheet_id: payload.active_sheet_id,
            sheets: payload
                .sheets
                .iter()
                .map(|s| SheetNameView { sheet_id: s.sheet_id, name: &s.name })
                .collect(),
            table_count: payload.tables.len(),
            named_range_count: payload.named_ranges.len(),
        }
    }
}

#[derive(Serialize)]
struct RetrievedEntry<'a> {
    score: f64,
    text: &'a str,
}
