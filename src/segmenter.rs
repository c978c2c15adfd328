// =============================================================================
// segmenter.rs — THE DISPOSITIVE ISOLATOR
// =============================================================================
//
// A Brazilian judicial decision is report, reasoning, and then the part that
// actually decides something. Downstream classification only wants that last
// part, and judges have never agreed on how to introduce it. So this module
// runs an ordered chain of strategies and takes the first that matches:
//
// 1. Anchor phrase — the LAST occurrence of a ruling-introduction formula
//    ("julgo procedente", "ante o exposto", ...). Last, not first: decisions
//    routinely quote earlier rulings, and the operative one comes at the end.
//    The slice runs to the first closing-boilerplate marker after the
//    anchor, or end of text.
// 2. Section heading — a DISPOSITIVO heading line (including the `###`
//    markers the extractor normalizes to); the slice runs to the next
//    heading or end of text.
// 3. Tail fraction — no anchor, no heading, take the configured final
//    fraction of the document and say so. Tagged `fallback` so nobody
//    mistakes it for a confident extraction.
//
// Whatever wins still has to clear a minimum length; a near-empty slice is
// NO_DECISION_FOUND, not a two-word "decision". Every result carries the
// strategy that produced it, because an 80% anchor rate and an 80% fallback
// rate are very different datasets.
//
// Strategies are independent matcher functions in a priority list, not a
// nest of conditionals — adding a vocabulary or reordering the chain should
// never require touching the others.
// =============================================================================

use std::sync::Arc;

use aho_corasick::AhoCorasick;
use anyhow::{Context, Result};
use tracing::debug;

use crate::config::Config;
use crate::models::{DecisoryText, ExtractedText, SegmentError, Strategy};

pub struct DecisionSegmenter {
    anchors: AhoCorasick,
    closings: AhoCorasick,
    headings: Vec<String>,
    tail_fraction: f64,
    min_chars: usize,
}

impl DecisionSegmenter {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let anchors = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(&config.patterns.anchor_phrases)
            .context("building anchor-phrase automaton")?;
        let closings = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(&config.patterns.closing_markers)
            .context("building closing-marker automaton")?;
        let headings = config
            .patterns
            .dispositive_headings
            .iter()
            .map(|h| h.to_lowercase())
            .collect();
        Ok(Self {
            anchors,
            closings,
            headings,
            tail_fraction: config.tail_fraction,
            min_chars: config.min_decisory_chars,
        })
    }

    /// Isolate the decisory passage from extracted text.
    pub fn segment(&self, extracted: &ExtractedText) -> Result<DecisoryText, SegmentError> {
        let text = extracted.text.as_str();

        let strategies: [(Strategy, fn(&Self, &str) -> Option<String>); 3] = [
            (Strategy::Anchor, Self::try_anchor),
            (Strategy::Heading, Self::try_heading),
            (Strategy::Fallback, Self::try_tail),
        ];

        for (strategy, matcher) in strategies {
            let Some(candidate) = matcher(self, text) else {
                continue;
            };
            if candidate.trim().chars().count() < self.min_chars {
                debug!(
                    case = %extracted.case_id,
                    strategy = %strategy,
                    chars = candidate.trim().chars().count(),
                    "candidate passage below minimum length"
                );
                return Err(SegmentError::NoDecisionFound);
            }
            debug!(
                case = %extracted.case_id,
                strategy = %strategy,
                chars = candidate.chars().count(),
                "decisory passage isolated"
            );
            return Ok(DecisoryText {
                text: candidate,
                strategy,
            });
        }

        Err(SegmentError::NoDecisionFound)
    }

    /// Strategy 1: last ruling-introduction phrase to closing marker or end.
    fn try_anchor(&self, text: &str) -> Option<String> {
        let last = self.anchors.find_iter(text).last()?;
        let start = last.start();
        let after = &text[start..];
        let end = self
            .closings
            .find_iter(after)
            .next()
            .map(|m| m.start())
            .unwrap_or(after.len());
        Some(after[..end].trim().to_string())
    }

    /// Strategy 2: last dispositive heading line to the next heading or end.
    fn try_heading(&self, text: &str) -> Option<String> {
        let mut content_start = None;

        for (line_start, line) in lines_with_offsets(text) {
            if let Some(rel) = self.heading_match_end(line) {
                content_start = Some(line_start + rel);
            }
        }
        let content_start = content_start?;
        let after = &text[content_start..];

        // Stop at the next heading-looking line, if any.
        let mut end = after.len();
        for (line_start, line) in lines_with_offsets(after) {
            if line_start == 0 {
                continue; // remainder of the heading line itself
            }
            if is_heading_boundary(line) {
                end = line_start;
                break;
            }
        }
        Some(after[..end].trim().to_string())
    }

    /// Strategy 3: the configured tail fraction, verbatim.
    fn try_tail(&self, text: &str) -> Option<String> {
        let total = text.chars().count();
        if total == 0 {
            return None;
        }
        let keep = ((total as f64) * self.tail_fraction).round() as usize;
        let keep = keep.clamp(1, total);
        Some(text.chars().skip(total - keep).collect())
    }

    /// If the line opens with a dispositive heading, return the byte offset
    /// just past the heading text within the line. Accepts numbered
    /// (`3. DISPOSITIVO`) and normalized (`### DISPOSITIVO`) forms.
    fn heading_match_end(&self, line: &str) -> Option<usize> {
        let trimmed = line.trim_start();
        let lead = line.len() - trimmed.len();

        let (body, body_off) = strip_heading_prefix(trimmed);
        let body_lower = body.to_lowercase();

        for heading in &self.headings {
            if body_lower.starts_with(heading.as_str()) {
                // Offsets in the lowercased copy line up with the original:
                // headings are matched against the same-length lowercase map.
                let heading_end = byte_len_of_prefix(body, heading.chars().count());
                return Some(lead + body_off + heading_end);
            }
        }
        None
    }
}

/// Iterate lines together with their byte offsets into the text.
fn lines_with_offsets(text: &str) -> impl Iterator<Item = (usize, &str)> {
    let mut offset = 0;
    text.split_inclusive('\n').map(move |raw| {
        let start = offset;
        offset += raw.len();
        (start, raw.trim_end_matches(['\n', '\r']))
    })
}

/// Strip `### ` markers and `3.`-style numbering off a candidate heading
/// line, returning the remainder and its byte offset within the input.
fn strip_heading_prefix(line: &str) -> (&str, usize) {
    let mut rest = line;
    if let Some(r) = rest.strip_prefix("### ") {
        rest = r;
    } else {
        let digits = rest.trim_start_matches(|c: char| c.is_ascii_digit());
        if digits.len() < rest.len() {
            if let Some(r) = digits.strip_prefix('.') {
                rest = r.trim_start();
            }
        }
    }
    (rest, line.len() - rest.len())
}

/// Byte length of the first `chars` characters of `s`.
fn byte_len_of_prefix(s: &str, chars: usize) -> usize {
    s.char_indices()
        .nth(chars)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// A line that would start a new section: `###` markers or all-caps.
fn is_heading_boundary(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }
    trimmed.starts_with("###")
        || (trimmed.chars().any(|c| c.is_alphabetic())
            && !trimmed.chars().any(|c| c.is_lowercase()))
}
