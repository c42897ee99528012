//! Workflow orchestrator — the diagnostic session state machine
//!
//! Drives `Idle → FileSelected → Previewed → Ready → Querying → ResultReady →
//! FeedbackSubmitted`, with the knowledge-base browser as an independent
//! sub-state. Transitions are the only mutation entry points; each validates
//! its guard, issues external calls in order, and folds the outcome into
//! [`SessionState`].
//!
//! Failure policy:
//! - Transport failures never end the session. The busy/analyzing flag is
//!   reverted and a status string names the failed stage.
//! - Multi-step transitions (upload, file selection) are not transactional;
//!   completed stages keep their effects.
//! - Queries carry a generation. Only the latest generation's response is
//!   applied, so a superseded response can never overwrite a newer one.

use std::sync::Arc;

use tokio::task::JoinSet;

use crate::api::{ApiError, DiagnosisApi, FeedbackRequest, HistorySaveRequest, ProcessResponse, QueryRequest, QueryResponse};
use crate::browser::DirectoryBrowser;
use crate::config::FaultscopeConfig;
use crate::error::{Precondition, Stage, WorkflowError};
use crate::models::FeedbackRating;
use crate::parser;
use crate::session::{CurrentResult, SessionState};

// ============================================================================
// Query handles
// ============================================================================

/// A query that has been issued but not yet sent.
///
/// Holds its own API handle so it can be awaited without borrowing the
/// orchestrator.
pub struct PendingQuery {
    generation: u64,
    request: QueryRequest,
    api: Arc<dyn DiagnosisApi>,
}

impl PendingQuery {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn request(&self) -> &QueryRequest {
        &self.request
    }

    pub async fn send(self) -> QueryOutcome {
        let response = self.api.query(&self.request).await;
        QueryOutcome {
            generation: self.generation,
            request: self.request,
            response,
        }
    }
}

/// Completed query, ready to be applied.
#[derive(Debug)]
pub struct QueryOutcome {
    pub generation: u64,
    pub request: QueryRequest,
    pub response: Result<QueryResponse, ApiError>,
}

// ============================================================================
// WorkflowOrchestrator
// ============================================================================

pub struct WorkflowOrchestrator {
    api: Arc<dyn DiagnosisApi>,
    session: SessionState,
    browser: DirectoryBrowser,
    top_k: u32,
    background: JoinSet<()>,
}

impl WorkflowOrchestrator {
    pub fn new(api: Arc<dyn DiagnosisApi>, config: &FaultscopeConfig) -> Self {
        Self {
            api,
            session: SessionState::new(),
            browser: DirectoryBrowser::new(
                &config.knowledge_base.default_path,
                &config.knowledge_base.root_path,
            ),
            top_k: config.session.top_k,
            background: JoinSet::new(),
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn browser(&self) -> &DirectoryBrowser {
        &self.browser
    }

    /// Record a stage failure: log it, surface it, hand it back.
    fn fail(&mut self, stage: Stage, source: ApiError) -> WorkflowError {
        tracing::warn!(stage = %stage, error = %source, "Workflow stage failed");
        self.session.set_status(format!("{} failed: {}", stage, source));
        WorkflowError::stage(stage, source)
    }

    // ------------------------------------------------------------------------
    // File transitions
    // ------------------------------------------------------------------------

    /// Replace the uploaded-file listing with the backend's.
    pub async fn refresh_files(&mut self) -> Result<(), WorkflowError> {
        let files = self
            .api
            .list_files()
            .await
            .map_err(|e| self.fail(Stage::FileListing, e))?;
        tracing::debug!(count = files.len(), "File listing refreshed");
        self.session.set_files(files);
        Ok(())
    }

    /// Store → preview → index → refresh listing. Each stage needs the one
    /// before it; a failure stops the pipeline but keeps earlier effects.
    ///
    /// Returns the server's canonical filename.
    pub async fn upload(&mut self, filename: &str, contents: Vec<u8>) -> Result<String, WorkflowError> {
        if filename.trim().is_empty() {
            return Err(WorkflowError::Rejected(Precondition::EmptyUpload));
        }

        self.session.set_busy(true);
        let result = self.run_upload(filename, contents).await;
        self.session.set_busy(false);
        result
    }

    async fn run_upload(&mut self, filename: &str, contents: Vec<u8>) -> Result<String, WorkflowError> {
        self.session.set_status(format!("Uploading {}...", filename));
        let ack = self
            .api
            .upload_log(filename, contents)
            .await
            .map_err(|e| self.fail(Stage::Upload, e))?;

        let canonical = ack.filename;
        if canonical != filename {
            tracing::info!(submitted = %filename, stored = %canonical, "Backend renamed upload");
        }
        self.session.reset_for_file(Some(canonical.clone()));
        self.session.set_status(format!("Uploaded {}", canonical));

        self.load_preview(&canonical).await?;
        self.index_file(&canonical).await?;
        self.refresh_files().await?;

        tracing::info!(filename = %canonical, "Upload pipeline complete");
        self.session.set_status(format!("{} uploaded and indexed", canonical));
        Ok(canonical)
    }

    /// Switch the active log. An empty name clears the selection.
    /// Any displayed result is discarded either way.
    pub async fn select_file(&mut self, filename: &str) -> Result<(), WorkflowError> {
        let filename = filename.trim();
        if filename.is_empty() {
            self.session.reset_for_file(None);
            self.session.set_status("No file selected");
            return Ok(());
        }

        self.session.reset_for_file(Some(filename.to_string()));
        self.session.set_busy(true);
        let result = self.prepare_file(filename).await;
        self.session.set_busy(false);
        result
    }

    async fn prepare_file(&mut self, filename: &str) -> Result<(), WorkflowError> {
        self.session.set_status(format!("Loading {}...", filename));
        self.load_preview(filename).await?;
        self.index_file(filename).await?;
        self.session.set_status(format!("{} ready", filename));
        Ok(())
    }

    async fn load_preview(&mut self, filename: &str) -> Result<(), WorkflowError> {
        let preview = self
            .api
            .preview(filename)
            .await
            .map_err(|e| self.fail(Stage::Preview, e))?;
        tracing::debug!(filename = %filename, rows = preview.len(), "Preview loaded");
        self.session.set_preview(preview);
        Ok(())
    }

    async fn index_file(&mut self, filename: &str) -> Result<(), WorkflowError> {
        let ack = self
            .api
            .process_log(filename)
            .await
            .map_err(|e| self.fail(Stage::Index, e))?;
        tracing::info!(filename = %filename, count = ?ack.count, "Log indexed");
        self.session.set_indexed(true);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Query transitions
    // ------------------------------------------------------------------------

    /// Copy a preview row into the query text. Does not submit.
    pub fn select_row(&mut self, index: usize) -> Result<(), WorkflowError> {
        let row = self
            .session
            .preview()
            .row(index)
            .ok_or(WorkflowError::Rejected(Precondition::NoPreviewRow))?;
        if index == 0 {
            return Err(WorkflowError::Rejected(Precondition::HeaderRow));
        }

        let text = row.join(" ");
        self.session.select_row(index, text);
        Ok(())
    }

    /// Manual query edit.
    pub fn set_query(&mut self, text: impl Into<String>) {
        self.session.set_query_text(text.into());
    }

    /// Issue a new query generation for the current text.
    ///
    /// The caller is expected to hold back while `is_analyzing()`; if it does
    /// not, the newest generation wins.
    pub fn prepare_query(&mut self) -> Result<PendingQuery, WorkflowError> {
        let query = self.session.query().trim().to_string();
        if query.is_empty() {
            return Err(WorkflowError::Rejected(Precondition::EmptyQuery));
        }

        let generation = self.session.begin_query();
        self.session.set_status("Analyzing...");
        tracing::info!(generation, top_k = self.top_k, "Submitting query");

        Ok(PendingQuery {
            generation,
            request: QueryRequest {
                query,
                top_k: self.top_k,
            },
            api: Arc::clone(&self.api),
        })
    }

    /// Fold a completed query into the session.
    ///
    /// `Ok(true)` means the result is now displayed; `Ok(false)` means the
    /// outcome was superseded and dropped. Must run inside a tokio runtime
    /// (the history append is spawned).
    pub fn apply_query(&mut self, outcome: QueryOutcome) -> Result<bool, WorkflowError> {
        let QueryOutcome {
            generation,
            request,
            response,
        } = outcome;

        match response {
            Ok(response) => {
                let current = CurrentResult {
                    query: request.query,
                    structured: parser::parse(&response.structured),
                    evidence: response.evidence,
                    feedback: None,
                    generation,
                };
                if !self.session.apply_result(current) {
                    tracing::debug!(
                        generation,
                        latest = self.session.latest_generation(),
                        "Dropping superseded query response"
                    );
                    return Ok(false);
                }
                self.session.set_status("Diagnosis ready");
                self.spawn_history_append();
                Ok(true)
            }
            Err(e) => {
                if !self.session.fail_query(generation) {
                    tracing::debug!(generation, error = %e, "Dropping superseded query failure");
                    return Ok(false);
                }
                Err(self.fail(Stage::Query, e))
            }
        }
    }

    /// Submit the current query text and apply the response.
    pub async fn query(&mut self) -> Result<bool, WorkflowError> {
        let pending = self.prepare_query()?;
        let outcome = pending.send().await;
        self.apply_query(outcome)
    }

    /// Record the current result in history without waiting on the backend.
    fn spawn_history_append(&mut self) {
        let Some(result) = self.session.result() else {
            return;
        };

        let request = HistorySaveRequest {
            filename: self.session.selected_file().unwrap_or_default().to_string(),
            query: result.query.clone(),
            result: serde_json::to_value(&result.structured).unwrap_or_default(),
        };
        let api = Arc::clone(&self.api);

        self.reap_background();
        self.background.spawn(async move {
            if let Err(e) = api.save_history(&request).await {
                tracing::warn!(error = %e, filename = %request.filename, "History append failed");
            }
        });
    }

    /// Collect background tasks that have already finished.
    fn reap_background(&mut self) {
        while let Some(joined) = self.background.try_join_next() {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "Background task aborted");
            }
        }
    }

    /// Background tasks spawned and not yet collected.
    pub fn background_tasks(&self) -> usize {
        self.background.len()
    }

    /// Wait for fire-and-forget work (history appends) to settle.
    pub async fn drain_background(&mut self) {
        while let Some(joined) = self.background.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "Background task aborted");
            }
        }
    }

    // ------------------------------------------------------------------------
    // Feedback
    // ------------------------------------------------------------------------

    /// Rate the displayed result. Allowed once per result.
    pub async fn submit_feedback(&mut self, rating: FeedbackRating) -> Result<(), WorkflowError> {
        let result = self
            .session
            .result()
            .ok_or(WorkflowError::Rejected(Precondition::NoResult))?;
        if result.feedback_submitted() {
            return Err(WorkflowError::Rejected(Precondition::FeedbackAlreadySubmitted));
        }

        let request = FeedbackRequest {
            query: result.query.clone(),
            response: serde_json::to_string(&result.structured).unwrap_or_default(),
            rating,
        };

        self.api
            .submit_feedback(&request)
            .await
            .map_err(|e| self.fail(Stage::Feedback, e))?;

        tracing::info!(rating = %rating, "Feedback submitted");
        self.session.mark_feedback(rating);
        self.session.set_status(format!("Feedback recorded: {}", rating));
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Knowledge-base browser
    // ------------------------------------------------------------------------

    pub async fn toggle_browser(&mut self) -> bool {
        self.browser.toggle(self.api.as_ref()).await
    }

    pub async fn navigate_into(&mut self, name: &str) {
        self.browser.navigate_into(self.api.as_ref(), name).await;
    }

    pub async fn navigate_up(&mut self) {
        self.browser.navigate_up(self.api.as_ref()).await;
    }

    pub fn edit_kb_path(&mut self, path: &str) {
        self.browser.edit_path(path);
    }

    pub async fn commit_kb_path(&mut self) -> bool {
        self.browser.commit_path_edit(self.api.as_ref()).await
    }

    /// Re-index the browser's current path.
    pub async fn reindex_knowledge_base(&mut self) -> Result<ProcessResponse, WorkflowError> {
        match self.browser.reindex(self.api.as_ref()).await {
            Ok(ack) => {
                self.session.set_status(
                    ack.message
                        .clone()
                        .unwrap_or_else(|| format!("Indexed {}", self.browser.current_path())),
                );
                Ok(ack)
            }
            Err(WorkflowError::Stage { stage, source }) => Err(self.fail(stage, source)),
            Err(rejected) => Err(rejected),
        }
    }
}
