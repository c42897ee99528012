//! Human-readable output for the terminal.
//!
//! Every renderer returns a `String` so output can be tested without a tty.

use std::fmt::Write as _;

use faultscope_core::models::{FileMetadata, HistoryEntry, PreviewTable};
use faultscope_core::{CurrentResult, DirectoryBrowser, SessionState};

/// Evidence excerpts are cut to this many characters.
const EVIDENCE_PREVIEW_CHARS: usize = 200;

pub fn files(files: &[FileMetadata]) -> String {
    if files.is_empty() {
        return "No uploaded log files.\n".to_string();
    }

    let width = files.iter().map(|f| f.filename.len()).max().unwrap_or(0);
    let mut out = String::new();
    for f in files {
        let size = f
            .size_bytes
            .map(human_size)
            .unwrap_or_else(|| "-".to_string());
        let uploaded = f
            .uploaded_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(out, "{:<width$}  {:>9}  {}", f.filename, size, uploaded, width = width);
    }
    out
}

/// Preview table with a row-index gutter. The header is marked `#`.
pub fn preview(table: &PreviewTable) -> String {
    if table.is_empty() {
        return "No preview available.\n".to_string();
    }

    let mut out = String::new();
    for (i, row) in table.rows().iter().enumerate() {
        let gutter = if i == 0 { "#".to_string() } else { i.to_string() };
        let _ = writeln!(out, "{:>4}  {}", gutter, row.join(" | "));
    }
    out
}

pub fn diagnosis(result: &CurrentResult) -> String {
    let s = &result.structured;
    let mut out = String::new();

    let _ = writeln!(out, "Query: {}\n", result.query);
    section(&mut out, "Summary", &s.summary);
    section(&mut out, "Evidence", &s.evidence);
    section(&mut out, "Root cause", &s.root_cause);

    let _ = writeln!(out, "Actions");
    for step in &s.actions {
        let _ = writeln!(out, "  {}. {}", step.order, step.text);
    }
    out.push('\n');

    let _ = writeln!(out, "Confidence: {}", s.confidence.band);
    if !s.confidence.rationale.is_empty() {
        let _ = writeln!(out, "  {}", s.confidence.rationale);
    }

    if !result.evidence.is_empty() {
        let _ = writeln!(out, "\nSources ({})", result.evidence.len());
        for (i, doc) in result.evidence.iter().enumerate() {
            let _ = writeln!(out, "  [{}] {}", i + 1, excerpt(doc, EVIDENCE_PREVIEW_CHARS));
        }
    }

    if let Some(rating) = result.feedback {
        let _ = writeln!(out, "\nRated: {}", rating);
    }
    out
}

pub fn history(entries: &[HistoryEntry]) -> String {
    if entries.is_empty() {
        return "No history.\n".to_string();
    }

    let mut out = String::new();
    for e in entries {
        let file = if e.filename.is_empty() { "-" } else { e.filename.as_str() };
        let when = e.timestamp.as_deref().unwrap_or("-");
        let _ = writeln!(out, "{}  [{}]  {}", when, file, e.query);
        if let Some(summary) = e.result.get("summary").and_then(|v| v.as_str()) {
            let _ = writeln!(out, "    {}", excerpt(summary, EVIDENCE_PREVIEW_CHARS));
        }
    }
    out
}

pub fn faults(filename: &str, codes: &[String]) -> String {
    if codes.is_empty() {
        return format!("No fault codes found in {}.\n", filename);
    }
    let mut out = format!("{} fault code(s) in {}:\n", codes.len(), filename);
    for code in codes {
        let _ = writeln!(out, "  {}", code);
    }
    out
}

pub fn browser(browser: &DirectoryBrowser) -> String {
    let mut out = String::new();
    let _ = write!(out, "Path: {}", browser.current_path());
    if let Some(abs) = browser.abs_path() {
        let _ = write!(out, "  ({})", abs);
    }
    if let Some(status) = browser.connection_status() {
        let _ = write!(out, "  [{}]", status);
    }
    out.push('\n');
    if let Some(err) = browser.last_error() {
        let _ = writeln!(out, "  ! {}", err);
    }

    let _ = writeln!(out, "Directories:");
    if browser.child_directories().is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for dir in browser.child_directories() {
        let _ = writeln!(out, "  {}/", dir);
    }

    let _ = writeln!(out, "Documents:");
    if browser.detected_files().is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for doc in browser.detected_files() {
        let size = doc.size.map(human_size).unwrap_or_else(|| "-".to_string());
        let _ = writeln!(out, "  {}  {}", doc.filename, size);
    }
    out
}

pub fn status(session: &SessionState) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Phase:  {:?}", session.phase());
    let _ = writeln!(out, "File:   {}", session.selected_file().unwrap_or("-"));
    let _ = writeln!(
        out,
        "Row:    {}",
        session
            .selected_row()
            .map(|r| r.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    let _ = writeln!(out, "Query:  {}", session.query());
    if !session.status().is_empty() {
        let _ = writeln!(out, "Status: {}", session.status());
    }
    out
}

fn section(out: &mut String, title: &str, body: &str) {
    let _ = writeln!(out, "{}", title);
    let body = body.trim();
    if body.is_empty() {
        let _ = writeln!(out, "  -");
    }
    for line in body.lines() {
        let _ = writeln!(out, "  {}", line);
    }
    out.push('\n');
}

/// First `max` characters on one line, with an ellipsis when cut.
pub fn excerpt(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        return flat;
    }
    let cut: String = flat.chars().take(max).collect();
    format!("{}...", cut.trim_end())
}

pub fn human_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{} B", bytes)
    } else if b < KB * KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.1} MB", b / (KB * KB))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use faultscope_core::models::{
        ActionStep, ConfidenceAssessment, ConfidenceBand, FeedbackRating, StructuredResult,
    };

    fn mock_result() -> CurrentResult {
        CurrentResult {
            query: "E102 Vacuum loss".to_string(),
            structured: StructuredResult {
                summary: "Vacuum gripper lost suction".to_string(),
                evidence: "Row 1 reports E102".to_string(),
                root_cause: "Suction cup worn".to_string(),
                actions: vec![
                    ActionStep {
                        order: 1,
                        text: "Check vacuum hose".to_string(),
                    },
                    ActionStep {
                        order: 2,
                        text: "Replace suction cup".to_string(),
                    },
                ],
                confidence: ConfidenceAssessment {
                    band: ConfidenceBand::High,
                    rationale: "matched manual section 4.2".to_string(),
                },
            },
            evidence: vec!["Fault Code: E102.\nDescription: Vacuum loss.".to_string()],
            feedback: None,
            generation: 1,
        }
    }

    // ========================================================================
    // TEST 1: Diagnosis lists actions in order with the confidence band
    // ========================================================================
    #[test]
    fn test_diagnosis_layout() {
        let out = diagnosis(&mock_result());

        assert!(out.starts_with("Query: E102 Vacuum loss"));
        let first = out.find("1. Check vacuum hose").expect("first action");
        let second = out.find("2. Replace suction cup").expect("second action");
        assert!(first < second);
        assert!(out.contains("Confidence: High\n  matched manual section 4.2"));
        assert!(out.contains("Sources (1)\n  [1] Fault Code: E102. Description: Vacuum loss."));
        assert!(!out.contains("Rated:"));
    }

    // ========================================================================
    // TEST 2: Submitted rating is shown
    // ========================================================================
    #[test]
    fn test_diagnosis_shows_rating() {
        let mut result = mock_result();
        result.feedback = Some(FeedbackRating::CanBeBetter);
        assert!(diagnosis(&result).contains("Rated: can_be_better"));
    }

    // ========================================================================
    // TEST 3: Preview marks the header and numbers data rows
    // ========================================================================
    #[test]
    fn test_preview_gutter() {
        let table = PreviewTable::from_rows(vec![
            vec!["code".to_string(), "desc".to_string()],
            vec!["E102".to_string(), "Vacuum loss".to_string()],
        ]);
        let out = preview(&table);
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines[0], "   #  code | desc");
        assert_eq!(lines[1], "   1  E102 | Vacuum loss");
    }

    // ========================================================================
    // TEST 4: Excerpts flatten whitespace and cut on char boundaries
    // ========================================================================
    #[test]
    fn test_excerpt_truncation() {
        assert_eq!(excerpt("a\n  b", 10), "a b");
        let long = "é".repeat(20);
        let cut = excerpt(&long, 5);
        assert_eq!(cut, format!("{}...", "é".repeat(5)));
    }

    // ========================================================================
    // TEST 5: Size formatting
    // ========================================================================
    #[test]
    fn test_human_size() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(2048), "2.0 KB");
        assert_eq!(human_size(3 * 1024 * 1024), "3.0 MB");
    }

    // ========================================================================
    // TEST 6: Empty listings render a placeholder
    // ========================================================================
    #[test]
    fn test_empty_listings() {
        assert_eq!(files(&[]), "No uploaded log files.\n");
        assert_eq!(history(&[]), "No history.\n");
        assert_eq!(faults("log1.csv", &[]), "No fault codes found in log1.csv.\n");
        assert_eq!(preview(&PreviewTable::default()), "No preview available.\n");
    }

    // ========================================================================
    // TEST 7: History shows "-" for knowledge-base-only queries
    // ========================================================================
    #[test]
    fn test_history_without_file() {
        let entries = vec![HistoryEntry {
            filename: String::new(),
            timestamp: Some("2026-03-01T10:00:00".to_string()),
            query: "What does ALM_3021 mean?".to_string(),
            result: serde_json::json!({ "summary": "Servo overcurrent" }),
        }];
        let out = history(&entries);
        assert!(out.contains("[-]  What does ALM_3021 mean?"));
        assert!(out.contains("    Servo overcurrent"));
    }

    // ========================================================================
    // TEST 8: Fresh browser shows its configured path and empty views
    // ========================================================================
    #[test]
    fn test_browser_empty_views() {
        let b = DirectoryBrowser::new("data/knowledge_base", ".");
        let out = browser(&b);
        assert!(out.starts_with("Path: data/knowledge_base\n"));
        assert!(out.contains("Directories:\n  (none)\nDocuments:\n  (none)\n"));
    }
}
