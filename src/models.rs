// =============================================================================
// models.rs — THE DATA STRUCTURES OF JUDICIAL FATE
// =============================================================================
//
// Everything the pipeline passes between stages lives here: the case number
// that identifies a lawsuit, the resolved document reference, the stored PDF,
// the extracted text, the decisory passage, and the one-row-per-case outcome
// record that is the whole point of the exercise.
//
// The failure taxonomies are enums, not stringly-typed exceptions. A case can
// fail at four different stages for seven different reasons, and the outcome
// table must be able to tell every one of them apart months later.
// =============================================================================

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// A CNJ-formatted case number, e.g. `0000498-37.2018.8.06.0127`.
/// Opaque to us: we never parse its internals, we only template it into
/// URLs and derive a filename from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaseId(String);

impl CaseId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Deterministic filename stem for the stored document.
    /// Case numbers only contain digits, dots and one dash, but ESAJ has
    /// surprised us before, so anything that isn't filename-safe becomes '_'.
    pub fn file_stem(&self) -> String {
        self.0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the locator found on the case detail page.
///
/// The three negative variants are expected outcomes, not errors: sealed
/// cases and missing documents are facts about the court system that we
/// record, not bugs that we retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Located {
    /// A direct link to the decision PDF.
    Document(Url),
    /// A link to the ESAJ document viewer page, which wraps the real PDF
    /// in an iframe. Needs one more request to resolve the `file=` param.
    Viewer(Url),
    /// The case is under legal secrecy ("segredo de justiça").
    /// Expected, terminal, and never retried.
    Sealed,
    /// The case page is unreachable or ESAJ says the case does not exist.
    NotFound,
    /// The page loaded fine but no movement links to a decision document.
    NoDocumentLink,
}

/// A decision PDF sitting on disk. Written once, never mutated.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub case_id: CaseId,
    pub path: PathBuf,
    pub bytes: u64,
    /// Content-Type reported by the server, when it bothered to send one.
    pub content_type: Option<String>,
    /// True when the file already existed and no download happened.
    pub from_cache: bool,
}

/// The full cleaned text of a stored document.
#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub case_id: CaseId,
    pub text: String,
}

/// Which segmentation strategy produced a decisory passage.
/// Carried on every result so downstream consumers (and our own tests)
/// can audit extraction quality per strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Matched a ruling-introduction phrase ("julgo procedente", ...).
    Anchor,
    /// Matched a dispositive section heading.
    Heading,
    /// No anchor, no heading — took the final tail fraction of the text.
    /// Low confidence by construction.
    Fallback,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Anchor => write!(f, "anchor"),
            Strategy::Heading => write!(f, "heading"),
            Strategy::Fallback => write!(f, "fallback"),
        }
    }
}

/// The operative ruling portion of a decision, plus how we found it.
#[derive(Debug, Clone)]
pub struct DecisoryText {
    pub text: String,
    pub strategy: Strategy,
}

// =============================================================================
// Failure taxonomies
// =============================================================================

/// Why a download failed. Both variants are terminal for the case.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Transient failures (timeouts, 5xx, connection resets) survived the
    /// whole retry budget. `attempts` is the exact number of requests made.
    #[error("transient failures exhausted the retry budget after {attempts} attempts")]
    TransientExhausted { attempts: u32 },

    /// A permanent HTTP answer (404, 403, ...). Retrying would only
    /// annoy the court's servers.
    #[error("document not retrievable (HTTP {status})")]
    NotRetrievable { status: u16 },

    #[error("i/o error while storing document: {0}")]
    Io(#[from] std::io::Error),
}

/// Why text extraction failed. Terminal for the case.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// The file is not a parseable PDF at all.
    #[error("corrupt or unsupported document: {0}")]
    CorruptOrUnsupported(String),

    /// The PDF parsed but carries no text layer worth keeping — usually a
    /// scanned image. Reported explicitly so "no readable text" never
    /// masquerades as "empty decision".
    #[error("document has no usable text content")]
    EmptyContent,

    #[error("i/o error while reading document: {0}")]
    Io(#[from] std::io::Error),
}

/// Why segmentation failed. Text extraction succeeded — the distinction
/// matters for failure analysis, so this never collapses into ExtractError.
#[derive(Debug, thiserror::Error)]
pub enum SegmentError {
    /// Even the tail-fraction fallback produced near-empty text.
    #[error("no decisory passage found")]
    NoDecisionFound,
}

// =============================================================================
// Outcome records
// =============================================================================

/// Terminal status of one case. Exactly one of these per input identifier,
/// always. SUCCESS if and only if decisory text is non-empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseStatus {
    Success,
    Sealed,
    NotFound,
    NoDocumentLink,
    FetchFailed,
    ExtractionFailed,
    SegmentationFailed,
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CaseStatus::Success => "SUCCESS",
            CaseStatus::Sealed => "SEALED",
            CaseStatus::NotFound => "NOT_FOUND",
            CaseStatus::NoDocumentLink => "NO_DOCUMENT_LINK",
            CaseStatus::FetchFailed => "FETCH_FAILED",
            CaseStatus::ExtractionFailed => "EXTRACTION_FAILED",
            CaseStatus::SegmentationFailed => "SEGMENTATION_FAILED",
        };
        write!(f, "{s}")
    }
}

/// One row of the outcome table. This is the sole artifact downstream
/// classification ever reads; anything with a non-SUCCESS status is
/// excluded from analysis, never treated as zero-length valid text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseOutcomeRecord {
    pub numero_processo: String,
    pub status: CaseStatus,
    /// Segmentation strategy tag; empty unless status is SUCCESS.
    pub estrategia: String,
    /// Human-readable failure detail; empty on SUCCESS.
    pub detalhe: String,
    /// When this case finished processing (success or not).
    pub processado_em: DateTime<Utc>,
    /// The decisory passage; empty unless status is SUCCESS.
    pub decisao: String,
}

impl CaseOutcomeRecord {
    /// Build a SUCCESS record. The constructor is the invariant: there is
    /// no way to produce a SUCCESS row without a non-empty decisory text.
    pub fn success(case_id: &CaseId, decisory: DecisoryText) -> Self {
        debug_assert!(!decisory.text.trim().is_empty());
        Self {
            numero_processo: case_id.as_str().to_string(),
            status: CaseStatus::Success,
            estrategia: decisory.strategy.to_string(),
            detalhe: String::new(),
            processado_em: Utc::now(),
            decisao: decisory.text,
        }
    }

    /// Build a failure record for any non-SUCCESS status.
    pub fn failure(case_id: &CaseId, status: CaseStatus, detail: impl Into<String>) -> Self {
        debug_assert!(status != CaseStatus::Success);
        Self {
            numero_processo: case_id.as_str().to_string(),
            status,
            estrategia: String::new(),
            detalhe: detail.into(),
            processado_em: Utc::now(),
            decisao: String::new(),
        }
    }
}

/// Per-status counters for the end-of-run summary.
#[derive(Debug, Default, Clone)]
pub struct RunStats {
    pub total: u64,
    pub skipped_checkpoint: u64,
    pub success: u64,
    pub sealed: u64,
    pub not_found: u64,
    pub no_document_link: u64,
    pub fetch_failed: u64,
    pub extraction_failed: u64,
    pub segmentation_failed: u64,
}

impl RunStats {
    pub fn record(&mut self, status: CaseStatus) {
        self.total += 1;
        match status {
            CaseStatus::Success => self.success += 1,
            CaseStatus::Sealed => self.sealed += 1,
            CaseStatus::NotFound => self.not_found += 1,
            CaseStatus::NoDocumentLink => self.no_document_link += 1,
            CaseStatus::FetchFailed => self.fetch_failed += 1,
            CaseStatus::ExtractionFailed => self.extraction_failed += 1,
            CaseStatus::SegmentationFailed => self.segmentation_failed += 1,
        }
    }

    pub fn failures(&self) -> u64 {
        self.total - self.success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_id_file_stem_keeps_cnj_format() {
        let id = CaseId::new("0000498-37.2018.8.06.0127");
        assert_eq!(id.file_stem(), "0000498-37.2018.8.06.0127");
    }

    #[test]
    fn test_case_id_file_stem_sanitizes_oddities() {
        let id = CaseId::new("foo/..\\bar 1");
        assert_eq!(id.file_stem(), "foo_.._bar_1");
    }

    #[test]
    fn test_case_id_trims_whitespace() {
        let id = CaseId::new("  0000498-37.2018.8.06.0127\n");
        assert_eq!(id.as_str(), "0000498-37.2018.8.06.0127");
    }

    #[test]
    fn test_success_record_carries_text_and_strategy() {
        let id = CaseId::new("0000498-37.2018.8.06.0127");
        let rec = CaseOutcomeRecord::success(
            &id,
            DecisoryText {
                text: "julgo procedente o pedido".to_string(),
                strategy: Strategy::Anchor,
            },
        );
        assert_eq!(rec.status, CaseStatus::Success);
        assert_eq!(rec.estrategia, "anchor");
        assert!(!rec.decisao.is_empty());
        assert!(rec.detalhe.is_empty());
    }

    #[test]
    fn test_failure_record_has_empty_text() {
        let id = CaseId::new("0000498-37.2018.8.06.0127");
        let rec = CaseOutcomeRecord::failure(&id, CaseStatus::Sealed, "segredo de justiça");
        assert_eq!(rec.status, CaseStatus::Sealed);
        assert!(rec.decisao.is_empty());
        assert!(rec.estrategia.is_empty());
        assert_eq!(rec.detalhe, "segredo de justiça");
    }

    #[test]
    fn test_run_stats_counts_every_status() {
        let mut stats = RunStats::default();
        stats.record(CaseStatus::Success);
        stats.record(CaseStatus::Sealed);
        stats.record(CaseStatus::FetchFailed);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.success, 1);
        assert_eq!(stats.failures(), 2);
    }
}
