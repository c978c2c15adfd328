// =============================================================================
// config.rs — THE CONFIGURATION DESK
// =============================================================================
//
// Every tunable parameter in the engine lives here: where the input list is,
// where documents and outcomes land, how hard we lean on the court's servers,
// and which textual patterns we use to read their pages and decisions.
//
// All values can be overridden via SENTENCA_-prefixed environment variables
// (with a .env file honored for the people who keep their lives in one).
// Defaults were chosen by watching what the real ESAJ installation tolerates:
// the politeness delay in particular is not a suggestion — this is a shared
// public service and we are a guest on it.
//
// The detection pattern sets get their own struct because ESAJ page templates
// are not a stable API. When the court reworks its markup or a judge invents
// a new way to open a dispositive, the fix should be a JSON file, not a
// recompile.
// =============================================================================

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Global engine configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // INPUT / OUTPUT LOCATIONS
    // =========================================================================
    /// The case-number list produced by the upstream metadata step.
    /// Plain text, one number per line, or a single-column CSV with a
    /// `numero_processo` header.
    pub input_list: PathBuf,

    /// Directory where decision PDFs are stored, one per case, named
    /// deterministically from the case number. Safe to delete and refetch.
    pub docs_dir: PathBuf,

    /// The append-only outcome table. Doubles as the resume checkpoint:
    /// case numbers already present here are skipped on restart.
    pub outcomes_path: PathBuf,

    // =========================================================================
    // ESAJ ENDPOINTS
    // =========================================================================
    /// Base URL of the ESAJ installation. Relative document links and the
    /// viewer's `file=` paths are resolved against this.
    pub base_url: String,

    /// Case detail-page URL template; `{numero}` is replaced with the
    /// URL-encoded case number.
    pub detail_page_template: String,

    /// User-Agent sent on every request. We identify ourselves honestly:
    /// this is research tooling, not a browser in a trench coat.
    pub user_agent: String,

    // =========================================================================
    // NETWORK BEHAVIOR
    // =========================================================================
    /// Per-request timeout. No request is allowed to hang forever.
    pub request_timeout: Duration,

    /// Minimum spacing between consecutive network requests, enforced
    /// globally by the politeness gate regardless of per-case outcome.
    pub politeness_delay: Duration,

    /// Total attempts per document download before declaring the
    /// transient-failure budget exhausted.
    pub fetch_retry_budget: u32,

    /// Base backoff between retry attempts (grows linearly per attempt).
    pub retry_backoff: Duration,

    // =========================================================================
    // SEGMENTATION KNOBS
    // =========================================================================
    /// Fraction of the document tail used by the last-resort fallback
    /// strategy when neither anchor phrase nor heading matches.
    pub tail_fraction: f64,

    /// Minimum decisory-passage length in characters. Anything shorter is
    /// classified as NO_DECISION_FOUND rather than handed downstream.
    pub min_decisory_chars: usize,

    // =========================================================================
    // DETECTION PATTERNS
    // =========================================================================
    pub patterns: PatternSet,
}

impl Config {
    /// Load configuration from the environment with TJCE defaults.
    /// Only `SENTENCA_PATTERNS_FILE` can fail loudly here — a broken
    /// pattern file is a configuration error and aborts before any case.
    pub fn from_env() -> Result<Self> {
        // .env is optional; absence is not an error.
        let _ = dotenvy::dotenv();

        let patterns = match env::var("SENTENCA_PATTERNS_FILE") {
            Ok(path) => PatternSet::from_file(&path)
                .with_context(|| format!("loading pattern overrides from {path}"))?,
            Err(_) => PatternSet::default(),
        };

        Ok(Config {
            input_list: env_or_default("SENTENCA_INPUT_LIST", "data/numeros_processos.csv").into(),
            docs_dir: env_or_default("SENTENCA_DOCS_DIR", "data/decisoes").into(),
            outcomes_path: env_or_default("SENTENCA_OUTCOMES_PATH", "data/decisoes_extraidas.csv")
                .into(),

            base_url: env_or_default("SENTENCA_BASE_URL", "https://esaj.tjce.jus.br"),
            detail_page_template: env_or_default(
                "SENTENCA_DETAIL_TEMPLATE",
                "https://esaj.tjce.jus.br/cpopg/search.do?cbPesquisa=NUMPROC&dePesquisaNuUnificado={numero}&tipoNuProcesso=UNIFICADO",
            ),
            user_agent: env_or_default(
                "SENTENCA_USER_AGENT",
                "SentencaEngine/0.1 (academic-research; decision-text-study)",
            ),

            request_timeout: Duration::from_millis(
                env_or_default("SENTENCA_REQUEST_TIMEOUT_MS", "15000")
                    .parse()
                    .unwrap_or(15_000),
            ),
            politeness_delay: Duration::from_millis(
                env_or_default("SENTENCA_POLITENESS_DELAY_MS", "500")
                    .parse()
                    .unwrap_or(500),
            ),
            fetch_retry_budget: env_or_default("SENTENCA_FETCH_RETRY_BUDGET", "3")
                .parse()
                .unwrap_or(3),
            retry_backoff: Duration::from_millis(
                env_or_default("SENTENCA_RETRY_BACKOFF_MS", "2000")
                    .parse()
                    .unwrap_or(2_000),
            ),

            tail_fraction: env_or_default("SENTENCA_TAIL_FRACTION", "0.2")
                .parse()
                .unwrap_or(0.2),
            min_decisory_chars: env_or_default("SENTENCA_MIN_DECISORY_CHARS", "50")
                .parse()
                .unwrap_or(50),

            patterns,
        })
    }

    /// Render the detail-page URL for one case number.
    pub fn detail_page_url(&self, numero: &str) -> String {
        self.detail_page_template
            .replace("{numero}", &urlencoding::encode(numero))
    }
}

fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

// =============================================================================
// Pattern sets
// =============================================================================

/// Every textual pattern the engine matches against ESAJ pages and decision
/// text. These encode one jurisdiction's templates as observed in the wild;
/// they are data, not gospel, and a JSON file can replace any of them.
///
/// Matching is ASCII-case-insensitive throughout, so each accented term is
/// listed alongside its unaccented spelling where both occur in documents.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PatternSet {
    /// Markers on the detail page meaning the case is under legal secrecy.
    pub secrecy_markers: Vec<String>,

    /// Markers meaning ESAJ has no information for this case number.
    pub missing_case_markers: Vec<String>,

    /// Movement-link label prefixes that identify a decision document,
    /// in priority order. "Transitado em Julgado" is deliberately absent:
    /// it links the certificate of finality, not the ruling itself.
    pub decision_link_labels: Vec<String>,

    /// Ruling-introduction phrases for the anchor segmentation strategy.
    pub anchor_phrases: Vec<String>,

    /// Dispositive section headings for the heading strategy.
    pub dispositive_headings: Vec<String>,

    /// Closing boilerplate that ends a decisory passage when it appears
    /// after the anchor.
    pub closing_markers: Vec<String>,

    /// Line prefixes/fragments identifying page headers to strip.
    pub header_line_markers: Vec<String>,

    /// Line prefixes identifying page footers to strip.
    pub footer_line_markers: Vec<String>,
}

impl Default for PatternSet {
    fn default() -> Self {
        fn v(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        }
        Self {
            secrecy_markers: v(&[
                "segredo de justiça",
                "segredo de justica",
                "processo sigiloso",
                "tramita em sigilo",
            ]),
            missing_case_markers: v(&[
                "não existem informações disponíveis",
                "nao existem informacoes disponiveis",
                "não foi encontrado nenhum processo",
            ]),
            decision_link_labels: v(&["julgado", "decisão", "decisao", "sentença", "sentenca"]),
            anchor_phrases: v(&[
                "julgo procedente",
                "julgo improcedente",
                "julgo parcialmente procedente",
                "julgo extinto o processo",
                "julgo extinta a ação",
                "ante o exposto",
                "diante do exposto",
                "pelo exposto",
                "isto posto",
                "isso posto",
                "posto isso",
                "posto isto",
            ]),
            dispositive_headings: v(&[
                "dispositivo",
                "### dispositivo",
                "seção: dispositivo",
                "secao: dispositivo",
                "do dispositivo",
            ]),
            closing_markers: v(&[
                "este documento é cópia do original",
                "este documento e copia do original",
                "para conferir o original",
                "documento eletrônico assinado por",
                "documento eletronico assinado por",
            ]),
            header_line_markers: v(&[
                "poder judiciário",
                "poder judiciario",
                "comarca de",
                "vara ",
                "fórum",
                "forum ",
                "cep:",
                "tel",
                "email",
                "e-mail",
            ]),
            footer_line_markers: v(&[
                "este documento é cópia do original",
                "este documento e copia do original",
                "para conferir o original",
                "documento eletrônico assinado por",
                "documento eletronico assinado por",
                "fls.",
            ]),
        }
    }
}

impl PatternSet {
    /// Load overrides from a JSON file. Fields absent from the file keep
    /// their defaults (`serde(default)` on the struct).
    pub fn from_file(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let set: PatternSet = serde_json::from_str(&raw)?;
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_config;

    #[test]
    fn test_detail_page_url_encodes_numero() {
        let cfg = Config {
            detail_page_template: "https://host/search.do?n={numero}".to_string(),
            ..test_config()
        };
        assert_eq!(
            cfg.detail_page_url("0000498-37.2018.8.06.0127"),
            "https://host/search.do?n=0000498-37.2018.8.06.0127"
        );
    }

    #[test]
    fn test_default_patterns_cover_the_essentials() {
        let p = PatternSet::default();
        assert!(p.secrecy_markers.iter().any(|m| m.contains("segredo")));
        assert!(p.anchor_phrases.iter().any(|m| m == "julgo procedente"));
        assert!(p
            .dispositive_headings
            .iter()
            .any(|m| m == "dispositivo"));
    }

    #[test]
    fn test_pattern_file_partial_override() {
        let json = r#"{ "anchor_phrases": ["resolvo o mérito"] }"#;
        let set: PatternSet = serde_json::from_str(json).unwrap();
        assert_eq!(set.anchor_phrases, vec!["resolvo o mérito".to_string()]);
        // Untouched fields keep their defaults.
        assert!(!set.secrecy_markers.is_empty());
    }
}
