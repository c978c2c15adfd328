// =============================================================================
// pipeline.rs — THE CASE PROCESSION
// =============================================================================
//
// The driver walks the input list one case at a time: locate the decision
// document, download it, extract its text, isolate the decisory passage,
// write exactly one outcome row. Sequential on purpose — the politeness gate
// makes concurrency pointless against a rate-limited public service, and a
// strict ordering makes every run trivially reproducible.
//
// Failure discipline: a case can fail, a run cannot. Component failures are
// converted into outcome rows and the procession moves on; the only errors
// that abort the run are the ones that would poison every remaining case
// anyway (unreadable input list, unwritable outcome table, broken config).
//
// Two skip paths keep re-runs cheap:
// - checkpoint skip: cases already present in the outcome table are never
//   touched again, not even with a request;
// - stored-document skip: a case whose PDF is already on disk goes straight
//   to extraction, bypassing locate and fetch entirely.
// =============================================================================

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::extractor::TextExtractor;
use crate::fetcher::DocumentFetcher;
use crate::locator::CaseLocator;
use crate::models::{CaseId, CaseOutcomeRecord, CaseStatus, Located, RunStats};
use crate::outcome_log::OutcomeLog;
use crate::politeness::PolitenessGate;
use crate::segmenter::DecisionSegmenter;

pub struct Pipeline {
    config: Arc<Config>,
    locator: CaseLocator,
    fetcher: DocumentFetcher,
    extractor: TextExtractor,
    segmenter: DecisionSegmenter,
    gate: PolitenessGate,
    shutdown: watch::Receiver<bool>,
}

impl Pipeline {
    pub fn new(
        config: Arc<Config>,
        client: reqwest::Client,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self> {
        Ok(Self {
            locator: CaseLocator::new(client.clone(), Arc::clone(&config))?,
            fetcher: DocumentFetcher::new(client, Arc::clone(&config)),
            extractor: TextExtractor::new(Arc::clone(&config)),
            segmenter: DecisionSegmenter::new(Arc::clone(&config))?,
            gate: PolitenessGate::new(config.politeness_delay),
            shutdown,
            config,
        })
    }

    /// Process the whole input list. Returns the per-status counters for
    /// the end-of-run summary.
    pub async fn run(&self) -> Result<RunStats> {
        let cases = read_case_ids(&self.config.input_list)?;
        let processed = OutcomeLog::load_processed(&self.config.outcomes_path)?;
        let mut log = OutcomeLog::open(&self.config.outcomes_path)?;
        let mut stats = RunStats::default();

        info!(
            cases = cases.len(),
            already_processed = processed.len(),
            "starting case procession"
        );

        for case_id in &cases {
            if *self.shutdown.borrow() {
                info!(
                    remaining = cases.len() as u64 - stats.total - stats.skipped_checkpoint,
                    "shutdown requested, stopping between cases"
                );
                break;
            }

            if processed.contains(case_id.as_str()) {
                debug!(case = %case_id, "already in outcome table, skipping");
                stats.skipped_checkpoint += 1;
                continue;
            }

            let record = self.process_case(case_id).await?;
            info!(case = %case_id, status = %record.status, "case finished");
            // Flushed immediately: the outcome table doubles as the resume
            // checkpoint and must survive a crash on the very next case.
            log.append(&record)?;
            stats.record(record.status);
        }

        Ok(stats)
    }

    /// Run one case through every stage. Component failures become outcome
    /// records; only configuration-level breakage escapes as `Err`.
    async fn process_case(&self, case_id: &CaseId) -> Result<CaseOutcomeRecord> {
        let stored = if self.fetcher.is_stored(case_id) {
            debug!(case = %case_id, "document already on disk, skipping locate and fetch");
            match self.fetcher.from_cache(case_id) {
                Ok(doc) => doc,
                Err(e) => {
                    return Ok(CaseOutcomeRecord::failure(
                        case_id,
                        CaseStatus::FetchFailed,
                        e.to_string(),
                    ))
                }
            }
        } else {
            self.gate.pause().await;
            let document_url = match self.locator.locate(case_id).await? {
                Located::Document(url) => url,
                Located::Viewer(viewer_url) => {
                    self.gate.pause().await;
                    match self.locator.resolve_viewer(&viewer_url).await? {
                        Some(url) => url,
                        None => {
                            return Ok(CaseOutcomeRecord::failure(
                                case_id,
                                CaseStatus::NoDocumentLink,
                                "viewer page did not reference a document",
                            ))
                        }
                    }
                }
                Located::Sealed => {
                    return Ok(CaseOutcomeRecord::failure(
                        case_id,
                        CaseStatus::Sealed,
                        "segredo de justiça",
                    ))
                }
                Located::NotFound => {
                    return Ok(CaseOutcomeRecord::failure(
                        case_id,
                        CaseStatus::NotFound,
                        "case page unreachable or unknown to ESAJ",
                    ))
                }
                Located::NoDocumentLink => {
                    return Ok(CaseOutcomeRecord::failure(
                        case_id,
                        CaseStatus::NoDocumentLink,
                        "no movement links to a decision document",
                    ))
                }
            };

            self.gate.pause().await;
            match self.fetcher.fetch(case_id, &document_url).await {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(case = %case_id, error = %e, "document fetch failed");
                    return Ok(CaseOutcomeRecord::failure(
                        case_id,
                        CaseStatus::FetchFailed,
                        e.to_string(),
                    ));
                }
            }
        };

        let extracted = match self.extractor.extract(&stored) {
            Ok(text) => text,
            Err(e) => {
                warn!(case = %case_id, error = %e, "text extraction failed");
                return Ok(CaseOutcomeRecord::failure(
                    case_id,
                    CaseStatus::ExtractionFailed,
                    e.to_string(),
                ));
            }
        };

        match self.segmenter.segment(&extracted) {
            Ok(decisory) => Ok(CaseOutcomeRecord::success(case_id, decisory)),
            Err(e) => Ok(CaseOutcomeRecord::failure(
                case_id,
                CaseStatus::SegmentationFailed,
                e.to_string(),
            )),
        }
    }
}

/// Read the input list: one case number per line, or a single-column CSV
/// with a `numero_processo` header. Duplicates are dropped, first
/// occurrence wins, order otherwise preserved.
pub fn read_case_ids(path: &Path) -> Result<Vec<CaseId>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading input list {}", path.display()))?;

    let mut seen = HashSet::new();
    let mut cases = Vec::new();
    for line in raw.lines() {
        let value = line.trim().trim_matches('"').trim();
        if value.is_empty() || value.eq_ignore_ascii_case("numero_processo") {
            continue;
        }
        if seen.insert(value.to_string()) {
            cases.push(CaseId::new(value));
        }
    }
    Ok(cases)
}
