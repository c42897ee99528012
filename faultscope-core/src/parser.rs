//! Diagnosis decomposition — raw generator output → [`StructuredResult`]
//!
//! The generator is prompted for JSON with five prose fields, but nothing
//! fixes how it formats them. This module turns that prose into shapes the
//! presentation layer can rely on:
//! - `actions` → ordered [`ActionStep`] list, never empty
//! - `confidence` → [`ConfidenceBand`] plus a free-text rationale
//!
//! [`parse`] is total. Unrecognised formatting degrades to a single-item or
//! default-band result instead of an error.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::diagnosis::coerce_text;
use crate::models::{ActionStep, ConfidenceAssessment, ConfidenceBand, RawDiagnosis, StructuredResult};

/// Fragments this short are numbering debris ("2", "0.", "-").
const MIN_FRAGMENT_CHARS: usize = 5;

static STEP_MARKER: OnceLock<Option<Regex>> = OnceLock::new();
static LEADING_BAND: OnceLock<Option<Regex>> = OnceLock::new();
static ANY_BAND: OnceLock<Option<Regex>> = OnceLock::new();
static SENTENCE_END: OnceLock<Option<Regex>> = OnceLock::new();
static CERTAINTY_SUFFIX: OnceLock<Option<Regex>> = OnceLock::new();

fn cached(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

// ============================================================================
// PUBLIC API
// ============================================================================

/// Decompose a raw diagnosis.
pub fn parse(raw: &RawDiagnosis) -> StructuredResult {
    StructuredResult {
        summary: coerce_text(&raw.summary).trim().to_string(),
        evidence: coerce_text(&raw.evidence).trim().to_string(),
        root_cause: coerce_text(&raw.root_cause).trim().to_string(),
        actions: parse_actions(&coerce_text(&raw.actions)),
        confidence: parse_confidence(&coerce_text(&raw.confidence)),
    }
}

/// Split an actions paragraph into numbered steps.
///
/// Steps are separated by newlines or by an inline `N.` marker, so both
/// one-step-per-line text and "1. Check sensor 2. Replace fuse" work. Source
/// numerals are discarded and steps renumbered from 1.
pub fn parse_actions(actions: &str) -> Vec<ActionStep> {
    let steps: Vec<ActionStep> = split_fragments(actions)
        .into_iter()
        .map(str::trim)
        .filter(|fragment| fragment.chars().count() > MIN_FRAGMENT_CHARS)
        .map(strip_enumerator)
        .filter(|text| !text.is_empty())
        .enumerate()
        .map(|(i, text)| ActionStep {
            order: i + 1,
            text: text.to_string(),
        })
        .collect();

    if steps.is_empty() {
        return vec![ActionStep {
            order: 1,
            text: actions.trim().to_string(),
        }];
    }

    steps
}

/// Read the confidence band and its justification.
///
/// Only the leading token (after an optional "This diagnosis has a" or
/// "Confidence:" lead-in) is authoritative; failing that, the first band word
/// of the first sentence. Anything else is `Medium`.
pub fn parse_confidence(confidence: &str) -> ConfidenceAssessment {
    let text = confidence.trim();

    let leading = cached(
        &LEADING_BAND,
        r"(?i)^(?:this\s+diagnosis\s+has\s+an?\s+|confidence\s*:\s*)?(high|medium|low)\b\s*[:,\-]?\s*",
    )
    .and_then(|re| re.captures(text));

    let (band, rest) = match leading {
        Some(caps) => {
            let band = caps
                .get(1)
                .and_then(|m| ConfidenceBand::from_token(m.as_str()))
                .unwrap_or(ConfidenceBand::Medium);
            let consumed = caps.get(0).map(|m| m.end()).unwrap_or(0);
            (band, &text[consumed..])
        }
        None => (
            first_sentence_band(text).unwrap_or(ConfidenceBand::Medium),
            text,
        ),
    };

    let rationale = strip_certainty_suffix(rest).trim();
    // A bare "." or ":" left after the band is not an explanation
    let rationale = if rationale.chars().any(char::is_alphanumeric) {
        rationale.to_string()
    } else {
        String::new()
    };

    ConfidenceAssessment { band, rationale }
}

// ============================================================================
// ACTION HELPERS
// ============================================================================

/// Cut `text` at newlines and before inline step markers.
///
/// A marker is `\d+.` at the start of a line or after whitespace, followed by
/// whitespace or end of line. `3.5 mm` and `v2.1` are not markers.
fn split_fragments(text: &str) -> Vec<&str> {
    let marker = cached(&STEP_MARKER, r"(?:^|\s)\d+\.");
    let mut fragments = Vec::new();

    for line in text.split('\n') {
        let mut start = 0;
        if let Some(re) = marker {
            for m in re.find_iter(line) {
                let digit_at = m.start()
                    + m.as_str()
                        .find(|c: char| c.is_ascii_digit())
                        .unwrap_or(0);
                let terminated = line[m.end()..]
                    .chars()
                    .next()
                    .map_or(true, char::is_whitespace);
                if terminated && digit_at > start {
                    fragments.push(&line[start..digit_at]);
                    start = digit_at;
                }
            }
        }
        fragments.push(&line[start..]);
    }

    fragments
}

/// Drop one leading `N.` enumerator or `-`/`*` bullet.
fn strip_enumerator(fragment: &str) -> &str {
    let digits = fragment.len()
        - fragment
            .trim_start_matches(|c: char| c.is_ascii_digit())
            .len();

    if digits > 0 {
        if let Some(rest) = fragment[digits..].strip_prefix('.') {
            if !rest.starts_with(|c: char| c.is_ascii_digit()) {
                return rest.trim_start();
            }
        }
        return fragment;
    }

    match fragment.strip_prefix(['-', '*']) {
        Some(rest) if rest.starts_with(char::is_whitespace) => rest.trim_start(),
        _ => fragment,
    }
}

// ============================================================================
// CONFIDENCE HELPERS
// ============================================================================

fn first_sentence_band(text: &str) -> Option<ConfidenceBand> {
    let sentence = match cached(&SENTENCE_END, r"[.!?](?:\s|$)|\n").and_then(|re| re.find(text)) {
        Some(end) => &text[..end.start()],
        None => text,
    };

    cached(&ANY_BAND, r"(?i)\b(high|medium|low)\b")
        .and_then(|re| re.find(sentence))
        .and_then(|m| ConfidenceBand::from_token(m.as_str()))
}

fn strip_certainty_suffix(text: &str) -> &str {
    match cached(
        &CERTAINTY_SUFFIX,
        r"(?i)\s*degree\s+of\s+certainty\s+based\s+on\s+(?:the\s+)?retrieved\s+documentation\.?\s*$",
    )
    .and_then(|re| re.find(text))
    {
        Some(m) => &text[..m.start()],
        None => text,
    }
}

// ============================================================================
// TESTS
// ============================================================================
