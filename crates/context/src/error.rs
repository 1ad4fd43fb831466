use std::fmt;

use gridmind_core::SheetId;

/// Error type for context assembly.
///
/// Only genuinely fatal conditions surface here. Malformed metadata
/// entries, bad attachments, audit failures, and retrieval failures are
/// recovered locally and never reach the caller as errors.
#[derive(Debug)]
pub enum ContextError {
    /// The document reader could not open a range-reading session.
    SessionOpen(String),
    /// A range read failed on data the build cannot proceed without.
    Read { sheet: SheetId, message: String },
    /// A sheet does not exist or has no resolvable content version.
    /// Fatal when it is the active sheet; secondary sheets are skipped.
    SheetUnavailable(SheetId),
    /// The selected range references a sheet the reader does not know.
    SelectionUnavailable { sheet: SheetId },
    /// The caller-supplied DLP context could not be normalized.
    DlpContext(String),
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionOpen(msg) => write!(f, "cannot open range session: {msg}"),
            Self::Read { sheet, message } => {
                write!(f, "range read failed on {sheet}: {message}")
            }
            Self::SheetUnavailable(sheet) => {
                write!(f, "sheet {sheet} is unavailable")
            }
            Self::SelectionUnavailable { sheet } => {
                write!(f, "selection references unknown sheet {sheet}")
            }
            Self::DlpContext(msg) => write!(f, "invalid DLP context: {msg}"),
        }
    }
}

impl std::error::Error for ContextError {}
