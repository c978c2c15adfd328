// =============================================================================
// fetcher.rs — THE DOCUMENT DOWNLOADER
// =============================================================================
//
// Takes the URL the locator resolved and turns it into a PDF on disk, with
// three promises the rest of the pipeline leans on:
//
// 1. Idempotent: a file that already exists is never downloaded again.
//    Re-running a finished batch performs zero network fetches.
// 2. Bounded: every attempt carries a timeout, transient failures get a
//    fixed retry budget with backoff, and permanent HTTP answers fail the
//    case immediately. There is no code path that retries forever.
// 3. Atomic: the body lands in `<dest>.part` and is renamed into place only
//    after the last byte is written. The destination path never holds a
//    half-downloaded file, even if we die mid-transfer.
//
// What counts as transient: transport errors (timeouts, resets, DNS), 5xx,
// and 429. Everything else in 4xx is the server telling us "no" and meaning
// it — that becomes NOT_RETRIEVABLE on the spot.
// =============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use reqwest::StatusCode;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Config;
use crate::models::{CaseId, FetchError, StoredDocument};

pub struct DocumentFetcher {
    client: reqwest::Client,
    config: Arc<Config>,
}

impl DocumentFetcher {
    pub fn new(client: reqwest::Client, config: Arc<Config>) -> Self {
        Self { client, config }
    }

    /// Destination path for a case's document, derived deterministically
    /// from the case number.
    pub fn stored_path(&self, case_id: &CaseId) -> PathBuf {
        self.config.docs_dir.join(format!("{}.pdf", case_id.file_stem()))
    }

    /// Whether this case's document is already on disk.
    pub fn is_stored(&self, case_id: &CaseId) -> bool {
        self.stored_path(case_id).is_file()
    }

    /// Wrap an already-stored file as a StoredDocument without touching
    /// the network. Used by the driver's cached fast path.
    pub fn from_cache(&self, case_id: &CaseId) -> Result<StoredDocument, FetchError> {
        let path = self.stored_path(case_id);
        let meta = std::fs::metadata(&path)?;
        Ok(StoredDocument {
            case_id: case_id.clone(),
            path,
            bytes: meta.len(),
            content_type: None,
            from_cache: true,
        })
    }

    /// Download the document for one case.
    pub async fn fetch(&self, case_id: &CaseId, url: &Url) -> Result<StoredDocument, FetchError> {
        let dest = self.stored_path(case_id);

        if dest.is_file() {
            debug!(case = %case_id, path = %dest.display(), "document already stored, skipping download");
            return self.from_cache(case_id);
        }

        let budget = self.config.fetch_retry_budget.max(1);
        let mut attempts = 0u32;

        loop {
            attempts += 1;

            match self.attempt(url).await {
                Ok((body, content_type)) => {
                    let bytes = body.len() as u64;
                    self.write_atomically(&dest, &body).await?;
                    info!(
                        case = %case_id,
                        bytes = bytes,
                        attempts = attempts,
                        path = %dest.display(),
                        "document stored"
                    );
                    return Ok(StoredDocument {
                        case_id: case_id.clone(),
                        path: dest,
                        bytes,
                        content_type,
                        from_cache: false,
                    });
                }
                Err(Attempt::Permanent(status)) => {
                    warn!(case = %case_id, status = status, "document not retrievable, not retrying");
                    return Err(FetchError::NotRetrievable { status });
                }
                Err(Attempt::Transient(reason)) => {
                    if attempts >= budget {
                        warn!(
                            case = %case_id,
                            attempts = attempts,
                            reason = reason.as_str(),
                            "retry budget exhausted"
                        );
                        return Err(FetchError::TransientExhausted { attempts });
                    }
                    let backoff = self.config.retry_backoff * attempts;
                    debug!(
                        case = %case_id,
                        attempt = attempts,
                        budget = budget,
                        backoff_ms = backoff.as_millis() as u64,
                        reason = reason.as_str(),
                        "transient fetch failure, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// One GET attempt, classified into success / transient / permanent.
    async fn attempt(&self, url: &Url) -> Result<(Vec<u8>, Option<String>), Attempt> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Attempt::Transient(format!("transport error: {e}")))?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Attempt::Transient(format!("HTTP {}", status.as_u16())));
        }
        if !status.is_success() {
            return Err(Attempt::Permanent(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body = response
            .bytes()
            .await
            .map_err(|e| Attempt::Transient(format!("body read error: {e}")))?;

        Ok((body.to_vec(), content_type))
    }

    /// Write to `<dest>.part`, then rename into place. The rename is the
    /// commit point; a crash before it leaves only the .part debris.
    async fn write_atomically(&self, dest: &PathBuf, body: &[u8]) -> Result<(), FetchError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let part = dest.with_extension("pdf.part");
        tokio::fs::write(&part, body).await?;
        tokio::fs::rename(&part, dest).await?;
        Ok(())
    }
}

enum Attempt {
    /// Worth retrying within the budget.
    Transient(String),
    /// The server said no and meant it.
    Permanent(u16),
}

impl Attempt {
    fn as_str(&self) -> &str {
        match self {
            Attempt::Transient(s) => s.as_str(),
            Attempt::Permanent(_) => "permanent",
        }
    }
}
