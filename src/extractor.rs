// =============================================================================
// extractor.rs — THE PDF TEXT MINER
// =============================================================================
//
// Turns a stored decision PDF into clean plain text. Two failure modes, kept
// strictly apart because downstream analysis needs the difference:
//
// - CORRUPT_OR_UNSUPPORTED: the bytes are not a parseable PDF. Happens when
//   ESAJ serves an error page with a .pdf name, or the download is mangled.
// - EMPTY_CONTENT: the PDF parses but there is no text layer — scanned
//   image decisions, mostly. This is reported, never silently passed on as
//   an empty success, so "no decision" and "no readable text" stay distinct.
//
// The cleaning pass removes the noise every TJCE decision carries — court
// letterhead on each page, signature/authenticity footers, page numbers —
// and re-joins the hard-wrapped lines into paragraphs. A line ending without
// sentence-final punctuation continues its paragraph; blank lines and
// section headings break it. Numbered section headings (RELATORIO,
// FUNDAMENTACAO, DISPOSITIVO) are normalized to `### <SECTION>` markers,
// which the segmenter later leans on.
// =============================================================================

use std::sync::Arc;

use tracing::debug;

use crate::config::Config;
use crate::models::{ExtractError, ExtractedText, StoredDocument};

/// Canonical section names, with the accented spellings they appear under.
const SECTIONS: &[(&str, &[&str])] = &[
    ("RELATORIO", &["RELATÓRIO", "RELATORIO"]),
    ("FUNDAMENTACAO", &["FUNDAMENTAÇÃO", "FUNDAMENTACAO"]),
    ("DISPOSITIVO", &["DISPOSITIVO"]),
];

pub struct TextExtractor {
    config: Arc<Config>,
}

impl TextExtractor {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Extract and clean the text of a stored document.
    pub fn extract(&self, doc: &StoredDocument) -> Result<ExtractedText, ExtractError> {
        let bytes = std::fs::read(&doc.path)?;

        // Cheap sanity check before handing the bytes to the PDF parser.
        if bytes.len() < 5 || &bytes[0..4] != b"%PDF" {
            return Err(ExtractError::CorruptOrUnsupported(
                "missing %PDF header".to_string(),
            ));
        }

        let raw = pdf_extract::extract_text_from_mem(&bytes)
            .map_err(|e| ExtractError::CorruptOrUnsupported(e.to_string()))?;

        let text = self.process_raw(&raw)?;

        debug!(
            case = %doc.case_id,
            raw_chars = raw.chars().count(),
            clean_chars = text.chars().count(),
            "text extracted"
        );

        Ok(ExtractedText {
            case_id: doc.case_id.clone(),
            text,
        })
    }

    /// Clean raw page text into the paragraph form the segmenter consumes.
    /// Split out from `extract` so the cleaning path is testable without
    /// manufacturing a real PDF.
    pub fn process_raw(&self, raw: &str) -> Result<String, ExtractError> {
        let patterns = &self.config.patterns;

        let kept: Vec<&str> = raw
            .lines()
            .filter(|line| {
                !is_marked_line(line, &patterns.header_line_markers)
                    && !is_marked_line(line, &patterns.footer_line_markers)
            })
            .collect();

        let paragraphs = merge_paragraphs(&kept);
        let normalized: Vec<String> = paragraphs.iter().map(|p| normalize_heading(p)).collect();
        let text = normalized.join("\n\n").trim().to_string();

        if text.is_empty() {
            return Err(ExtractError::EmptyContent);
        }
        Ok(text)
    }
}

/// Does this line match one of the header/footer markers?
/// Markers match as prefixes of the trimmed, lowercased line, except "cep:"
/// which can appear mid-line in address blocks.
fn is_marked_line(line: &str, markers: &[String]) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }
    let lower = trimmed.to_lowercase();
    markers.iter().any(|m| {
        if m == "cep:" {
            lower.contains(m.as_str())
        } else {
            lower.starts_with(m.as_str())
        }
    })
}

/// Re-join hard-wrapped lines into paragraphs, keeping section headings as
/// their own paragraphs. A buffer ending in sentence-final punctuation
/// closes its paragraph; anything else continues onto the next line.
fn merge_paragraphs(lines: &[&str]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    let mut buffer = String::new();

    for raw_line in lines {
        let line = raw_line.trim();

        if line.is_empty() {
            if !buffer.is_empty() {
                merged.push(std::mem::take(&mut buffer));
            }
            continue;
        }

        if is_numbered_section_heading(line) || is_all_caps_line(line) {
            if !buffer.is_empty() {
                merged.push(std::mem::take(&mut buffer));
            }
            merged.push(line.to_string());
            continue;
        }

        if buffer.is_empty() {
            buffer.push_str(line);
        } else if buffer.ends_with(['.', '!', '?', ';', ':']) {
            merged.push(std::mem::take(&mut buffer));
            buffer.push_str(line);
        } else {
            buffer.push(' ');
            buffer.push_str(line);
        }
    }

    if !buffer.is_empty() {
        merged.push(buffer);
    }
    merged
}

/// `1. RELATÓRIO`, `3.DISPOSITIVO`, and the like.
fn is_numbered_section_heading(line: &str) -> bool {
    section_of_numbered_heading(line).is_some()
}

fn section_of_numbered_heading(line: &str) -> Option<&'static str> {
    let rest = line.trim_start_matches(|c: char| c.is_ascii_digit());
    if rest.len() == line.len() {
        return None; // no leading digits
    }
    let rest = rest.strip_prefix('.')?.trim_start();
    let upper = rest.to_uppercase();
    for (canonical, spellings) in SECTIONS {
        if spellings.iter().any(|s| upper.starts_with(s)) {
            return Some(canonical);
        }
    }
    None
}

/// A line that is entirely uppercase (and actually contains letters) is
/// treated as a heading, mirroring how these documents set their sections.
fn is_all_caps_line(line: &str) -> bool {
    line.chars().any(|c| c.is_alphabetic()) && !line.chars().any(|c| c.is_lowercase())
}

/// Rewrite numbered section headings to canonical `### <SECTION>` markers.
/// Everything else passes through untouched.
fn normalize_heading(paragraph: &str) -> String {
    match section_of_numbered_heading(paragraph) {
        Some(canonical) => format!("### {canonical}"),
        None => paragraph.to_string(),
    }
}
