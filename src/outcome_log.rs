// =============================================================================
// outcome_log.rs — THE OUTCOME TABLE AND RESUME CHECKPOINT
// =============================================================================
//
// One `;`-delimited CSV row per case, appended and flushed the moment the
// case finishes. That immediacy is the crash-resilience story: kill the
// process anywhere and every completed case is already on disk, so the next
// run reads the table back, skips what it finds, and picks up where it died.
// There is no separate checkpoint file to drift out of sync — the output IS
// the checkpoint.
//
// The delimiter is `;` because decisory passages are Portuguese prose full
// of commas, and the downstream spreadsheet users asked for it. The csv
// writer quotes embedded delimiters and newlines, so the passages survive
// round-trips intact.
// =============================================================================

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::models::CaseOutcomeRecord;

pub struct OutcomeLog {
    writer: csv::Writer<File>,
}

impl OutcomeLog {
    /// Open the outcome table for appending, creating it (with a header
    /// row) if it does not exist yet.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating output directory {}", parent.display()))?;
        }

        let exists = path
            .metadata()
            .map(|m| m.len() > 0)
            .unwrap_or(false);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening outcome table {}", path.display()))?;

        let writer = csv::WriterBuilder::new()
            .delimiter(b';')
            .has_headers(!exists)
            .from_writer(file);

        if exists {
            debug!(path = %path.display(), "appending to existing outcome table");
        } else {
            info!(path = %path.display(), "starting new outcome table");
        }

        Ok(Self { writer })
    }

    /// Append one finished case and flush it to disk immediately.
    pub fn append(&mut self, record: &CaseOutcomeRecord) -> Result<()> {
        self.writer
            .serialize(record)
            .context("writing outcome record")?;
        self.writer.flush().context("flushing outcome table")?;
        Ok(())
    }

    /// Read back the case numbers already present in the table. Called once
    /// at startup; these cases are skipped without any network traffic.
    pub fn load_processed(path: &Path) -> Result<HashSet<String>> {
        if !path.is_file() {
            return Ok(HashSet::new());
        }
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b';')
            .from_path(path)
            .with_context(|| format!("reading outcome table {}", path.display()))?;

        let mut seen = HashSet::new();
        for row in reader.records() {
            let row = row.context("parsing outcome table row")?;
            if let Some(numero) = row.get(0) {
                if !numero.trim().is_empty() {
                    seen.insert(numero.trim().to_string());
                }
            }
        }
        Ok(seen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CaseId, CaseStatus, DecisoryText, Strategy};
    use std::path::PathBuf;

    fn tmp_path(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sentenca_log_{tag}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir.join("outcomes.csv")
    }

    #[test]
    fn test_header_and_semicolon_delimiter() {
        let path = tmp_path("header");
        let mut log = OutcomeLog::open(&path).unwrap();
        let id = CaseId::new("0000498-37.2018.8.06.0127");
        log.append(&CaseOutcomeRecord::failure(
            &id,
            CaseStatus::Sealed,
            "segredo de justiça",
        ))
        .unwrap();
        drop(log);

        let raw = std::fs::read_to_string(&path).unwrap();
        let mut lines = raw.lines();
        assert_eq!(
            lines.next().unwrap(),
            "numero_processo;status;estrategia;detalhe;processado_em;decisao"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("0000498-37.2018.8.06.0127;SEALED;;"));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_reopen_appends_without_second_header() {
        let path = tmp_path("reopen");
        let first = CaseId::new("111");
        let second = CaseId::new("222");

        {
            let mut log = OutcomeLog::open(&path).unwrap();
            log.append(&CaseOutcomeRecord::failure(&first, CaseStatus::NotFound, "x"))
                .unwrap();
        }
        {
            let mut log = OutcomeLog::open(&path).unwrap();
            log.append(&CaseOutcomeRecord::failure(&second, CaseStatus::NotFound, "y"))
                .unwrap();
        }

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw.matches("numero_processo").count(), 1);
        assert_eq!(raw.lines().count(), 3);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_load_processed_round_trips_case_numbers() {
        let path = tmp_path("resume");
        {
            let mut log = OutcomeLog::open(&path).unwrap();
            let ok = CaseId::new("0000498-37.2018.8.06.0127");
            log.append(&CaseOutcomeRecord::success(
                &ok,
                DecisoryText {
                    // Embedded delimiter and newline must survive quoting.
                    text: "julgo procedente; condeno a ré.\nCustas pela ré.".to_string(),
                    strategy: Strategy::Anchor,
                },
            ))
            .unwrap();
            log.append(&CaseOutcomeRecord::failure(
                &CaseId::new("333"),
                CaseStatus::FetchFailed,
                "HTTP 503",
            ))
            .unwrap();
        }

        let seen = OutcomeLog::load_processed(&path).unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.contains("0000498-37.2018.8.06.0127"));
        assert!(seen.contains("333"));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_missing_table_means_empty_checkpoint() {
        let path = tmp_path("missing");
        let seen = OutcomeLog::load_processed(&path).unwrap();
        assert!(seen.is_empty());
    }
}
