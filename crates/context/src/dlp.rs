//! DLP context, fingerprinting, and redaction.
//!
//! The engine never evaluates policy rules itself; it consumes a policy
//! plus cell-level classification records and turns them into per-block
//! decisions. The fingerprint derived here is part of every sample cache
//! key, which is what keeps cached unredacted data from ever leaking
//! through a policy change.

use std::collections::BTreeMap;

use gridmind_core::{CellValue, Range, SheetId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ContextError;

/// Placeholder substituted for a redacted cell.
pub const REDACTED_PLACEHOLDER: &str = "[REDACTED]";

/// Placeholder substituted for every cell of a policy-denied block.
pub const POLICY_DENIED_PLACEHOLDER: &str = "[POLICY_DENIED]";

// ============================================================================
// Policy model
// ============================================================================

/// Actions a policy can govern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GovernedAction {
    AiCloudProcessing,
    AiLocalProcessing,
    Export,
}

impl GovernedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            GovernedAction::AiCloudProcessing => "ai_cloud_processing",
            GovernedAction::AiLocalProcessing => "ai_local_processing",
            GovernedAction::Export => "export",
        }
    }
}

/// Per-action rule. `redact_disallowed = true` means disallowed content
/// may be redacted in place; `false` means it must hard-block the whole
/// containing sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    #[serde(alias = "redactDisallowed")]
    pub redact_disallowed: bool,
}

/// A DLP policy as handed to the engine. Rule evaluation internals live
/// in the policy engine; only identity and the per-action flags matter
/// here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DlpPolicy {
    pub id: String,
    // BTreeMap keeps serialization order stable for fingerprinting.
    #[serde(default)]
    pub rules: BTreeMap<GovernedAction, PolicyRule>,
}

impl DlpPolicy {
    pub fn rule(&self, action: GovernedAction) -> Option<PolicyRule> {
        self.rules.get(&action).copied()
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Sensitivity label carried by a classification record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensitivityLabel {
    Public,
    Internal,
    Restricted,
}

impl SensitivityLabel {
    fn as_str(&self) -> &'static str {
        match self {
            SensitivityLabel::Public => "public",
            SensitivityLabel::Internal => "internal",
            SensitivityLabel::Restricted => "restricted",
        }
    }
}

/// A cell-level classification record from the DLP store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRecord {
    pub sheet: SheetId,
    pub range: Range,
    pub label: SensitivityLabel,
}

/// Result of classifying a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Restricted,
    Unrestricted,
}

/// Per-block decision outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DlpDecision {
    Allow,
    Redact,
    Block,
}

impl DlpDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            DlpDecision::Allow => "allow",
            DlpDecision::Redact => "redact",
            DlpDecision::Block => "block",
        }
    }
}

/// External source of classification records, consulted when the caller
/// does not supply records inline.
pub trait ClassificationStore: Send + Sync {
    fn records(&self, document_id: &str) -> Vec<ClassificationRecord>;
}

/// Audit sink for DLP decisions. Implementations are best-effort; the
/// build never waits on or fails because of the audit trail.
pub trait AuditLogger: Send + Sync {
    fn log_decision(&self, event: &DlpAuditEvent);
}

/// One audit event per governed cell-block evaluation (not per cell).
#[derive(Debug, Clone, Serialize)]
pub struct DlpAuditEvent {
    pub document_id: String,
    pub sheet: SheetId,
    pub range: Range,
    pub action: GovernedAction,
    pub decision: &'static str,
    pub restricted_cells: usize,
}

// ============================================================================
// Caller-facing context shape
// ============================================================================

/// Raw DLP context as supplied by callers.
///
/// Two historical field-naming conventions are in circulation; both
/// deserialize into this one struct via aliases, and `normalize()` is the
/// only way to get a canonical [`DlpContext`] out. Nothing downstream
/// (fingerprint, redactor, cache keys) ever sees the raw shape.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DlpContextInput {
    #[serde(alias = "docId")]
    pub document_id: Option<String>,
    #[serde(alias = "activeSheetId")]
    pub sheet_id: Option<SheetId>,
    #[serde(alias = "dlpPolicy")]
    pub policy: Option<DlpPolicy>,
    #[serde(default, alias = "classifications")]
    pub classification_records: Vec<ClassificationRecord>,
    #[serde(default, alias = "includeRestricted")]
    pub include_restricted_content: bool,
}

impl DlpContextInput {
    /// Merge into the canonical context, consulting `store` for records
    /// when none were supplied inline.
    pub fn normalize(
        self,
        fallback_document_id: &str,
        store: Option<&dyn ClassificationStore>,
    ) -> Result<DlpContext, ContextError> {
        let document_id = match self.document_id {
            Some(id) if !id.is_empty() => id,
            Some(_) => return Err(ContextError::DlpContext("empty document id".to_string())),
            None => fallback_document_id.to_string(),
        };

        let records = if self.classification_records.is_empty() {
            match store {
                Some(store) => store.records(&document_id),
                None => Vec::new(),
            }
        } else {
            self.classification_records
        };

        Ok(DlpContext {
            document_id,
            policy: self.policy,
            records,
            include_restricted: self.include_restricted_content,
        })
    }
}

/// Canonical DLP context. Everything downstream of normalization works
/// off this shape.
#[derive(Debug, Clone, Default)]
pub struct DlpContext {
    pub document_id: String,
    pub policy: Option<DlpPolicy>,
    pub records: Vec<ClassificationRecord>,
    pub include_restricted: bool,
}

// ============================================================================
// Fingerprint
// ============================================================================

/// Stable identity of the applicable DLP state, part of every sample
/// cache key. Conservative: value-equal inputs hash equal; anything else
/// is treated as a different state even if the redaction outcome would
/// coincide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DlpFingerprint(String);

impl DlpFingerprint {
    /// sha256 over (policy identity + rules + include flag + sorted records).
    pub fn of(ctx: &DlpContext) -> Self {
        let mut hasher = Sha256::new();
        match &ctx.policy {
            Some(policy) => {
                hasher.update(policy.id.as_bytes());
                hasher.update(b"\n");
                for (action, rule) in &policy.rules {
                    hasher.update(action.as_str().as_bytes());
                    hasher.update(if rule.redact_disallowed { b"=1\n" } else { b"=0\n" });
                }
            }
            None => hasher.update(b"no-policy\n"),
        }
        hasher.update(if ctx.include_restricted { b"include\n" } else { b"exclude\n" });

        // Record order must not affect identity.
        let mut records = ctx.records.clone();
        records.sort_by_key(|r| {
            (
                r.sheet.raw(),
                r.range.start_row,
                r.range.start_col,
                r.range.end_row,
                r.range.end_col,
                r.label,
            )
        });
        for record in &records {
            let line = format!("{}!{}={}\n", record.sheet, record.range, record.label.as_str());
            hasher.update(line.as_bytes());
        }

        DlpFingerprint(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Redactor
// ============================================================================

/// Outcome of applying DLP to one sampled block.
#[derive(Debug, Clone)]
pub struct RedactionOutcome {
    /// Values safe for downstream use. Either pass-through, per-cell
    /// redacted, or wholesale `[POLICY_DENIED]`.
    pub values: Vec<Vec<CellValue>>,
    /// True when the whole block was hard-blocked. Schema extraction must
    /// be skipped for the block in that case.
    pub policy_denied: bool,
    pub restricted_cells: usize,
    pub redacted_cells: usize,
}

/// Applies classification + policy to sampled blocks.
pub struct DlpRedactor<'a> {
    ctx: &'a DlpContext,
    action: GovernedAction,
    audit: Option<&'a dyn AuditLogger>,
}

impl<'a> DlpRedactor<'a> {
    pub fn new(
        ctx: &'a DlpContext,
        action: GovernedAction,
        audit: Option<&'a dyn AuditLogger>,
    ) -> Self {
        Self { ctx, action, audit }
    }

    /// Classify one cell against the record set. A cell is restricted iff
    /// a covering record carries the `restricted` label.
    pub fn classify(
        sheet: SheetId,
        row: usize,
        col: usize,
        records: &[ClassificationRecord],
    ) -> Classification {
        let restricted = records.iter().any(|r| {
            r.sheet == sheet && r.label == SensitivityLabel::Restricted && r.range.contains(row, col)
        });
        if restricted {
            Classification::Restricted
        } else {
            Classification::Unrestricted
        }
    }

    /// Decide what happens to a restricted/unrestricted cell under the
    /// governing policy rule.
    pub fn decide(
        classification: Classification,
        policy: Option<&DlpPolicy>,
        action: GovernedAction,
        include_restricted: bool,
    ) -> DlpDecision {
        match classification {
            Classification::Unrestricted => DlpDecision::Allow,
            Classification::Restricted => {
                if include_restricted {
                    return DlpDecision::Allow;
                }
                let redact_allowed = policy
                    .and_then(|p| p.rule(action))
                    .map(|r| r.redact_disallowed)
                    // No governing rule: redact rather than block.
                    .unwrap_or(true);
                if redact_allowed {
                    DlpDecision::Redact
                } else {
                    DlpDecision::Block
                }
            }
        }
    }

    /// Apply DLP to a sampled block. Emits exactly one audit event per
    /// call, covering the whole block.
    pub fn apply(
        &self,
        sheet: SheetId,
        origin: Range,
        raw: &[Vec<CellValue>],
    ) -> RedactionOutcome {
        let mut restricted_cells = 0usize;
        let mut block = false;
        let mut restricted_mask: Vec<Vec<bool>> = Vec::with_capacity(raw.len());

        for (r, row) in raw.iter().enumerate() {
            let mut mask_row = Vec::with_capacity(row.len());
            for (c, _value) in row.iter().enumerate() {
                let classification = Self::classify(
                    sheet,
                    origin.start_row + r,
                    origin.start_col + c,
                    &self.ctx.records,
                );
                let restricted = classification == Classification::Restricted;
                if restricted {
                    restricted_cells += 1;
                    let decision = Self::decide(
                        classification,
                        self.ctx.policy.as_ref(),
                        self.action,
                        self.ctx.include_restricted,
                    );
                    if decision == DlpDecision::Block {
                        block = true;
                    }
                    mask_row.push(decision == DlpDecision::Redact);
                } else {
                    mask_row.push(false);
                }
            }
            restricted_mask.push(mask_row);
        }

        let mut redacted_cells = 0usize;
        let (values, decision) = if block {
            // Partial schema inference over blocked data is itself a
            // leak, so the whole block is replaced.
            let denied = raw
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|_| CellValue::Text(POLICY_DENIED_PLACEHOLDER.to_string()))
                        .collect()
                })
                .collect();
            (denied, DlpDecision::Block)
        } else if restricted_cells > 0 && !self.ctx.include_restricted {
            let redacted = raw
                .iter()
                .enumerate()
                .map(|(r, row)| {
                    row.iter()
                        .enumerate()
                        .map(|(c, value)| {
                            if restricted_mask[r][c] {
                                redacted_cells += 1;
                                CellValue::Text(REDACTED_PLACEHOLDER.to_string())
                            } else {
                                value.clone()
                            }
                        })
                        .collect()
                })
                .collect();
            (redacted, DlpDecision::Redact)
        } else {
            (raw.to_vec(), DlpDecision::Allow)
        };

        if let Some(audit) = self.audit {
            audit.log_decision(&DlpAuditEvent {
                document_id: self.ctx.document_id.clone(),
                sheet,
                range: origin,
                action: self.action,
                decision: decision.as_str(),
                restricted_cells,
            });
        }

        RedactionOutcome {
            values,
            policy_denied: block,
            restricted_cells,
            redacted_cells,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(redact_disallowed: bool) -> DlpPolicy {
        let mut rules = BTreeMap::new();
        rules.insert(
            GovernedAction::AiCloudProcessing,
            PolicyRule { redact_disallowed },
        );
        DlpPolicy { id: "p1".to_string(), rules }
    }

    fn record(sheet: u64, range: &str) -> ClassificationRecord {
        ClassificationRecord {
            sheet: SheetId::from_raw(sheet),
            range: Range::parse(range).unwrap(),
            label: SensitivityLabel::Restricted,
        }
    }

    fn grid(rows: &[&[&str]]) -> Vec<Vec<CellValue>> {
        rows.iter()
            .map(|row| row.iter().map(|s| CellValue::from_display(s)).collect())
            .collect()
    }

    #[test]
    fn test_classify_by_covering_record() {
        let records = vec![record(1, "B2:C3")];
        let sheet = SheetId::from_raw(1);

        assert_eq!(
            DlpRedactor::classify(sheet, 1, 1, &records),
            Classification::Restricted
        );
        assert_eq!(
            DlpRedactor::classify(sheet, 0, 0, &records),
            Classification::Unrestricted
        );
        // Different sheet, same coordinates
        assert_eq!(
            DlpRedactor::classify(SheetId::from_raw(2), 1, 1, &records),
            Classification::Unrestricted
        );
    }

    #[test]
    fn test_non_restricted_labels_pass() {
        let records = vec![ClassificationRecord {
            sheet: SheetId::from_raw(1),
            range: Range::parse("A1:Z100").unwrap(),
            label: SensitivityLabel::Internal,
        }];
        assert_eq!(
            DlpRedactor::classify(SheetId::from_raw(1), 0, 0, &records),
            Classification::Unrestricted
        );
    }

    #[test]
    fn test_decide_matrix() {
        let p_redact = policy(true);
        let p_block = policy(false);
        let action = GovernedAction::AiCloudProcessing;

        assert_eq!(
            DlpRedactor::decide(Classification::Unrestricted, Some(&p_block), action, false),
            DlpDecision::Allow
        );
        assert_eq!(
            DlpRedactor::decide(Classification::Restricted, Some(&p_redact), action, false),
            DlpDecision::Redact
        );
        assert_eq!(
            DlpRedactor::decide(Classification::Restricted, Some(&p_block), action, false),
            DlpDecision::Block
        );
        // include_restricted overrides the policy entirely
        assert_eq!(
            DlpRedactor::decide(Classification::Restricted, Some(&p_block), action, true),
            DlpDecision::Allow
        );
        // No policy at all: redact, never block
        assert_eq!(
            DlpRedactor::decide(Classification::Restricted, None, action, false),
            DlpDecision::Redact
        );
    }

    #[test]
    fn test_apply_redacts_only_covered_cells() {
        let ctx = DlpContext {
            document_id: "doc".to_string(),
            policy: Some(policy(true)),
            records: vec![record(1, "B1")],
            include_restricted: false,
        };
        let redactor = DlpRedactor::new(&ctx, GovernedAction::AiCloudProcessing, None);
        let raw = grid(&[&["ok", "secret"], &["1", "2"]]);

        let outcome = redactor.apply(
            SheetId::from_raw(1),
            Range::parse("A1:B2").unwrap(),
            &raw,
        );

        assert!(!outcome.policy_denied);
        assert_eq!(outcome.redacted_cells, 1);
        assert_eq!(outcome.values[0][0], CellValue::Text("ok".to_string()));
        assert_eq!(
            outcome.values[0][1],
            CellValue::Text(REDACTED_PLACEHOLDER.to_string())
        );
        assert_eq!(outcome.values[1][0], CellValue::Number(1.0));
    }

    #[test]
    fn test_apply_block_denies_whole_block() {
        let ctx = DlpContext {
            document_id: "doc".to_string(),
            policy: Some(policy(false)),
            records: vec![record(1, "B1")],
            include_restricted: false,
        };
        let redactor = DlpRedactor::new(&ctx, GovernedAction::AiCloudProcessing, None);
        let raw = grid(&[&["ok", "secret"], &["1", "2"]]);

        let outcome = redactor.apply(
            SheetId::from_raw(1),
            Range::parse("A1:B2").unwrap(),
            &raw,
        );

        assert!(outcome.policy_denied);
        for row in &outcome.values {
            for value in row {
                assert_eq!(
                    value,
                    &CellValue::Text(POLICY_DENIED_PLACEHOLDER.to_string())
                );
            }
        }
    }

    #[test]
    fn test_apply_audits_once_per_block() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingAudit(AtomicUsize);
        impl AuditLogger for CountingAudit {
            fn log_decision(&self, _event: &DlpAuditEvent) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let ctx = DlpContext {
            document_id: "doc".to_string(),
            policy: Some(policy(true)),
            records: vec![record(1, "A1:B2")],
            include_restricted: false,
        };
        let audit = CountingAudit(AtomicUsize::new(0));
        let redactor = DlpRedactor::new(&ctx, GovernedAction::AiCloudProcessing, Some(&audit));

        let raw = grid(&[&["a", "b"], &["c", "d"]]);
        redactor.apply(SheetId::from_raw(1), Range::parse("A1:B2").unwrap(), &raw);

        // Four restricted cells, one audit event
        assert_eq!(audit.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fingerprint_stable_and_order_independent() {
        let a = DlpContext {
            document_id: "doc".to_string(),
            policy: Some(policy(true)),
            records: vec![record(1, "A1"), record(2, "B2")],
            include_restricted: false,
        };
        let b = DlpContext {
            records: vec![record(2, "B2"), record(1, "A1")],
            ..a.clone()
        };
        assert_eq!(DlpFingerprint::of(&a), DlpFingerprint::of(&b));
    }

    #[test]
    fn test_fingerprint_sensitive_to_inputs() {
        let base = DlpContext {
            document_id: "doc".to_string(),
            policy: Some(policy(true)),
            records: vec![record(1, "A1")],
            include_restricted: false,
        };
        let fp = DlpFingerprint::of(&base);

        let flipped_flag = DlpContext { include_restricted: true, ..base.clone() };
        assert_ne!(fp, DlpFingerprint::of(&flipped_flag));

        let tightened = DlpContext { policy: Some(policy(false)), ..base.clone() };
        assert_ne!(fp, DlpFingerprint::of(&tightened));

        let more_records = DlpContext {
            records: vec![record(1, "A1"), record(1, "B1")],
            ..base.clone()
        };
        assert_ne!(fp, DlpFingerprint::of(&more_records));
    }

    #[test]
    fn test_dual_shape_deserialization() {
        // Current convention
        let new_shape: DlpContextInput = serde_json::from_str(
            r#"{
                "documentId": "doc-1",
                "policy": {"id": "p1", "rules": {"ai_cloud_processing": {"redact_disallowed": true}}},
                "classificationRecords": [{"sheet": 1, "range": "A1", "label": "restricted"}],
                "includeRestrictedContent": false
            }"#,
        )
        .unwrap();

        // Legacy convention
        let legacy_shape: DlpContextInput = serde_json::from_str(
            r#"{
                "docId": "doc-1",
                "dlpPolicy": {"id": "p1", "rules": {"ai_cloud_processing": {"redactDisallowed": true}}},
                "classifications": [{"sheet": 1, "range": "A1", "label": "restricted"}],
                "includeRestricted": false
            }"#,
        )
        .unwrap();

        let a = new_shape.normalize("fallback", None).unwrap();
        let b = legacy_shape.normalize("fallback", None).unwrap();
        assert_eq!(a.document_id, b.document_id);
        assert_eq!(a.records, b.records);
        assert_eq!(DlpFingerprint::of(&a), DlpFingerprint::of(&b));
    }
}
