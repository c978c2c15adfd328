// =============================================================================
// locator.rs — THE CASE PAGE READER
// =============================================================================
//
// Given a case number, this module asks ESAJ's public consultation pages
// where the decision document lives. The pages are server-rendered HTML with
// no API behind them, so we read them the way the rest of this codebase
// reads text: tolerant hand-rolled scanning plus Aho-Corasick automatons,
// no full DOM parser. The markup we depend on is three things — anchor tags,
// a secrecy banner, and a "nothing here" message — and local scanning for
// those survives template noise better than brittle whole-document selectors.
//
// The three negative answers (sealed, not found, no document link) are
// return values, never errors. A sealed case is the court doing its job;
// our job is to write that down and move on.
//
// ESAJ quirk worth knowing: movement links rarely point at the PDF itself.
// They point at a viewer page that wraps the PDF in an iframe whose `src`
// carries the real path in a percent-encoded `file=` query parameter.
// `resolve_viewer` peels that onion; the driver calls it as a separate,
// politeness-gated step.
// =============================================================================

use std::sync::Arc;

use aho_corasick::AhoCorasick;
use anyhow::{Context, Result};
use tracing::{debug, warn};
use url::Url;

use crate::config::Config;
use crate::models::{CaseId, Located};

pub struct CaseLocator {
    client: reqwest::Client,
    config: Arc<Config>,
    base: Url,
    secrecy: AhoCorasick,
    missing: AhoCorasick,
}

impl CaseLocator {
    pub fn new(client: reqwest::Client, config: Arc<Config>) -> Result<Self> {
        let base = Url::parse(&config.base_url)
            .with_context(|| format!("invalid base URL: {}", config.base_url))?;
        let secrecy = build_automaton(&config.patterns.secrecy_markers)
            .context("building secrecy-marker automaton")?;
        let missing = build_automaton(&config.patterns.missing_case_markers)
            .context("building missing-case-marker automaton")?;
        Ok(Self {
            client,
            config,
            base,
            secrecy,
            missing,
        })
    }

    /// Resolve a case number to its decision-document reference.
    ///
    /// Only configuration-level breakage (an unparseable template) returns
    /// `Err`; every expected absence condition comes back as a `Located`
    /// variant.
    pub async fn locate(&self, case_id: &CaseId) -> Result<Located> {
        let page_url = self.config.detail_page_url(case_id.as_str());
        let page_url = Url::parse(&page_url)
            .with_context(|| format!("detail-page template produced an invalid URL: {page_url}"))?;

        let response = match self.client.get(page_url.clone()).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(case = %case_id, error = %e, "detail page unreachable");
                return Ok(Located::NotFound);
            }
        };

        let status = response.status();
        if !status.is_success() {
            debug!(case = %case_id, status = status.as_u16(), "detail page returned non-success");
            return Ok(Located::NotFound);
        }

        let html = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                warn!(case = %case_id, error = %e, "failed to read detail page body");
                return Ok(Located::NotFound);
            }
        };

        if self.secrecy.is_match(&html) {
            debug!(case = %case_id, "case is under legal secrecy");
            return Ok(Located::Sealed);
        }
        if self.missing.is_match(&html) {
            debug!(case = %case_id, "ESAJ reports no information for this case");
            return Ok(Located::NotFound);
        }

        let Some(href) = find_decision_link(&html, &self.config.patterns.decision_link_labels)
        else {
            debug!(case = %case_id, "page loaded but no decision link qualified");
            return Ok(Located::NoDocumentLink);
        };

        let resolved = match self.base.join(&href) {
            Ok(u) => u,
            Err(e) => {
                warn!(case = %case_id, href = href.as_str(), error = %e, "decision link is not a resolvable URL");
                return Ok(Located::NoDocumentLink);
            }
        };

        if resolved.path().to_ascii_lowercase().ends_with(".pdf") {
            debug!(case = %case_id, url = %resolved, "found direct document link");
            Ok(Located::Document(resolved))
        } else {
            debug!(case = %case_id, url = %resolved, "found viewer link, needs resolution");
            Ok(Located::Viewer(resolved))
        }
    }

    /// Fetch a viewer page and dig the real PDF URL out of its iframe.
    /// `None` means the viewer had no usable iframe or `file=` parameter —
    /// the driver records that as NO_DOCUMENT_LINK.
    pub async fn resolve_viewer(&self, viewer_url: &Url) -> Result<Option<Url>> {
        let response = match self.client.get(viewer_url.clone()).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(url = %viewer_url, error = %e, "viewer page unreachable");
                return Ok(None);
            }
        };
        if !response.status().is_success() {
            debug!(url = %viewer_url, status = response.status().as_u16(), "viewer page returned non-success");
            return Ok(None);
        }
        let html = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                warn!(url = %viewer_url, error = %e, "failed to read viewer page body");
                return Ok(None);
            }
        };
        Ok(find_viewer_pdf(&html, &self.base))
    }
}

fn build_automaton(patterns: &[String]) -> Result<AhoCorasick> {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(patterns)
        .context("invalid pattern set")
}

// =============================================================================
// HTML scanning helpers
// =============================================================================
// Pure functions, testable offline against fixture markup. Tolerant of
// whitespace, attribute order and quoting style; intolerant of nothing,
// because court websites will eventually produce every malformation there is.
// =============================================================================

/// One `<a>` tag, reduced to what we care about.
#[derive(Debug, Clone, PartialEq, Eq)]
struct AnchorTag {
    href: String,
    label: String,
}

/// Collect every anchor in the page, in document order.
///
/// Tag names are matched on a lowercased shadow of the page (ASCII
/// lowercasing preserves byte offsets), so `<A HREF=...>` works too.
fn collect_anchors(html: &str) -> Vec<AnchorTag> {
    let mut anchors = Vec::new();
    let lower = html.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let finder = memchr::memmem::Finder::new(b"<a");
    let mut pos = 0;

    while let Some(off) = finder.find(&bytes[pos..]) {
        let tag_start = pos + off;
        // Require "<a" followed by whitespace or '>' so we skip <abbr> etc.
        match bytes.get(tag_start + 2) {
            Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r') | Some(b'>') => {}
            _ => {
                pos = tag_start + 2;
                continue;
            }
        }
        let Some(open_end) = lower[tag_start..].find('>') else {
            break;
        };
        let open_end = tag_start + open_end;
        let attrs = &html[tag_start + 2..open_end];

        let Some(close) = lower[open_end..].find("</a") else {
            pos = open_end + 1;
            continue;
        };
        let close = open_end + close;
        let inner = &html[open_end + 1..close];

        if let Some(href) = find_attr(attrs, "href") {
            let label = strip_tags(inner);
            if !href.is_empty() {
                anchors.push(AnchorTag {
                    href: href.to_string(),
                    label,
                });
            }
        }
        pos = close + 3;
    }
    anchors
}

/// Pull a quoted attribute value out of a tag's attribute string.
fn find_attr<'a>(attrs: &'a str, name: &str) -> Option<&'a str> {
    let lower = attrs.to_ascii_lowercase();
    let mut search_from = 0;
    while let Some(idx) = lower[search_from..].find(name) {
        let idx = search_from + idx;
        // Must be a standalone attribute name, not a suffix of another.
        let standalone = idx == 0
            || !lower.as_bytes()[idx - 1].is_ascii_alphanumeric() && lower.as_bytes()[idx - 1] != b'-';
        let rest = attrs[idx + name.len()..].trim_start();
        if standalone {
            if let Some(rest) = rest.strip_prefix('=') {
                let rest = rest.trim_start();
                let quote = rest.chars().next()?;
                if quote == '"' || quote == '\'' {
                    let value = &rest[1..];
                    if let Some(end) = value.find(quote) {
                        return Some(&value[..end]);
                    }
                } else {
                    // Unquoted value: runs until whitespace.
                    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
                    return Some(&rest[..end]);
                }
            }
        }
        search_from = idx + name.len();
    }
    None
}

/// Drop nested tags and collapse whitespace in anchor inner text.
fn strip_tags(inner: &str) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut in_tag = false;
    for c in inner.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Find the href of the decision-document link, if any.
///
/// Label prefixes are tried in priority order across the whole page, the
/// same order the original consultation flow used (a "Julgado procedente"
/// movement outranks a bare "Decisão Interlocutória"). When no label
/// matches, any anchor pointing straight at a .pdf is accepted as a last
/// resort. When a label matches several movements, the first in document
/// order wins — movements are listed newest first.
fn find_decision_link(html: &str, labels_priority: &[String]) -> Option<String> {
    let anchors = collect_anchors(html);

    for label in labels_priority {
        let label_lower = label.to_lowercase();
        if let Some(anchor) = anchors
            .iter()
            .find(|a| a.label.to_lowercase().starts_with(&label_lower))
        {
            return Some(anchor.href.clone());
        }
    }

    anchors
        .iter()
        .find(|a| {
            let href = a.href.to_ascii_lowercase();
            let path_end = href.find('?').unwrap_or(href.len());
            href[..path_end].ends_with(".pdf")
        })
        .map(|a| a.href.clone())
}

/// Extract the real PDF URL from a viewer page: first iframe, `src`
/// attribute, `file=` query parameter (percent-decoded by the Url crate),
/// joined back against the base.
fn find_viewer_pdf(html: &str, base: &Url) -> Option<Url> {
    let lower = html.to_ascii_lowercase();
    let idx = memchr::memmem::find(lower.as_bytes(), b"<iframe")?;
    let open_end = lower[idx..].find('>')?;
    let attrs = &html[idx + 7..idx + open_end];
    let src = find_attr(attrs, "src")?;

    let viewer = base.join(src).ok()?;
    let file = viewer
        .query_pairs()
        .find(|(k, _)| k == "file")
        .map(|(_, v)| v.into_owned())?;
    if file.is_empty() {
        return None;
    }
    base.join(&file).ok()
}
