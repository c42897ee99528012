//! Session state for one operator.
//!
//! `SessionState` is owned by the orchestrator. Readers get accessors; every
//! mutation is `pub(crate)` and happens inside a transition.

use serde::Serialize;

use crate::models::{FeedbackRating, FileMetadata, PreviewTable, StructuredResult};

/// Coarse position in the diagnostic workflow, derived from state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    Idle,
    FileSelected,
    Previewed,
    Ready,
    Querying,
    ResultReady,
    FeedbackSubmitted,
}

/// The displayed diagnosis and everything bound to it.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentResult {
    /// Query text that produced this result
    pub query: String,
    pub structured: StructuredResult,
    /// Retrieved context documents
    pub evidence: Vec<String>,
    /// Set at most once per result
    pub feedback: Option<FeedbackRating>,
    pub generation: u64,
}

impl CurrentResult {
    pub fn feedback_submitted(&self) -> bool {
        self.feedback.is_some()
    }
}

#[derive(Debug, Default)]
pub struct SessionState {
    files: Vec<FileMetadata>,
    selected_file: Option<String>,
    preview: PreviewTable,
    indexed: bool,
    selected_row: Option<usize>,
    query: String,
    result: Option<CurrentResult>,
    analyzing: bool,
    busy: bool,
    status: String,
    issued_generation: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    // --- read side ---

    pub fn files(&self) -> &[FileMetadata] {
        &self.files
    }

    pub fn selected_file(&self) -> Option<&str> {
        self.selected_file.as_deref()
    }

    pub fn preview(&self) -> &PreviewTable {
        &self.preview
    }

    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    pub fn selected_row(&self) -> Option<usize> {
        self.selected_row
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn result(&self) -> Option<&CurrentResult> {
        self.result.as_ref()
    }

    pub fn is_analyzing(&self) -> bool {
        self.analyzing
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    /// Generation of the most recently issued query.
    pub fn latest_generation(&self) -> u64 {
        self.issued_generation
    }

    pub fn phase(&self) -> SessionPhase {
        if self.analyzing {
            return SessionPhase::Querying;
        }
        if let Some(result) = &self.result {
            return if result.feedback_submitted() {
                SessionPhase::FeedbackSubmitted
            } else {
                SessionPhase::ResultReady
            };
        }
        match &self.selected_file {
            None => SessionPhase::Idle,
            Some(_) if self.indexed => SessionPhase::Ready,
            Some(_) if !self.preview.is_empty() => SessionPhase::Previewed,
            Some(_) => SessionPhase::FileSelected,
        }
    }

    /// Query control enabled.
    pub fn can_query(&self) -> bool {
        !self.analyzing && !self.query.trim().is_empty()
    }

    /// Rating controls enabled.
    pub fn can_submit_feedback(&self) -> bool {
        self.result
            .as_ref()
            .is_some_and(|r| !r.feedback_submitted())
    }

    // --- transitions ---

    /// Switch to `filename` (or no file) and drop everything bound to the
    /// previous one. An in-flight query is superseded.
    pub(crate) fn reset_for_file(&mut self, filename: Option<String>) {
        if self.analyzing {
            self.issued_generation += 1;
            self.analyzing = false;
        }
        self.selected_file = filename;
        self.preview = PreviewTable::default();
        self.indexed = false;
        self.selected_row = None;
        self.query.clear();
        self.result = None;
    }

    pub(crate) fn set_files(&mut self, files: Vec<FileMetadata>) {
        self.files = files;
    }

    pub(crate) fn set_preview(&mut self, preview: PreviewTable) {
        self.preview = preview;
    }

    pub(crate) fn set_indexed(&mut self, indexed: bool) {
        self.indexed = indexed;
    }

    pub(crate) fn set_query_text(&mut self, text: String) {
        self.query = text;
    }

    pub(crate) fn select_row(&mut self, index: usize, text: String) {
        self.selected_row = Some(index);
        self.query = text;
    }

    pub(crate) fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    pub(crate) fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    /// Issue a new query generation and mark the session analyzing.
    pub(crate) fn begin_query(&mut self) -> u64 {
        self.issued_generation += 1;
        self.analyzing = true;
        self.issued_generation
    }

    /// Install a result if it belongs to the latest generation.
    ///
    /// Returns `false` and leaves state untouched for a superseded generation.
    pub(crate) fn apply_result(&mut self, result: CurrentResult) -> bool {
        if result.generation != self.issued_generation {
            return false;
        }
        self.result = Some(result);
        self.analyzing = false;
        true
    }

    /// Record a failed query. The displayed result, if any, stays.
    pub(crate) fn fail_query(&mut self, generation: u64) -> bool {
        if generation != self.issued_generation {
            return false;
        }
        self.analyzing = false;
        true
    }

    pub(crate) fn mark_feedback(&mut self, rating: FeedbackRating) {
        if let Some(result) = self.result.as_mut() {
            result.feedback = Some(rating);
        }
    }
}
