//! Knowledge-base directory browser.
//!
//! Tracks a current path plus two views of it (child directories and
//! detected documents). The views are fetched independently and may briefly
//! disagree. The path is never empty; `.` is the root sentinel.

use crate::api::{ApiError, DiagnosisApi, KbDirListing, KbFilesListing, ProcessResponse};
use crate::config::ROOT_PATH;
use crate::error::{Precondition, Stage, WorkflowError};
use crate::models::KbFileMetadata;

#[derive(Debug, Clone)]
pub struct DirectoryBrowser {
    current_path: String,
    root_path: String,
    child_directories: Vec<String>,
    detected_files: Vec<KbFileMetadata>,
    connection_status: Option<String>,
    abs_path: Option<String>,
    last_error: Option<String>,
    visible: bool,
    edit_pending: bool,
}

impl DirectoryBrowser {
    pub fn new(initial_path: &str, root_path: &str) -> Self {
        Self {
            current_path: normalize(initial_path),
            root_path: normalize(root_path),
            child_directories: Vec::new(),
            detected_files: Vec::new(),
            connection_status: None,
            abs_path: None,
            last_error: None,
            visible: false,
            edit_pending: false,
        }
    }

    pub fn current_path(&self) -> &str {
        &self.current_path
    }

    pub fn child_directories(&self) -> &[String] {
        &self.child_directories
    }

    pub fn detected_files(&self) -> &[KbFileMetadata] {
        &self.detected_files
    }

    /// Backend connectivity for the current path ("connected"/"disconnected").
    pub fn connection_status(&self) -> Option<&str> {
        self.connection_status.as_deref()
    }

    pub fn abs_path(&self) -> Option<&str> {
        self.abs_path.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn has_pending_edit(&self) -> bool {
        self.edit_pending
    }

    pub fn can_reindex(&self) -> bool {
        !self.detected_files.is_empty()
    }

    /// Show or hide the browser. Opening lists the current path, falling
    /// back to the root path when that listing fails.
    pub async fn toggle(&mut self, api: &dyn DiagnosisApi) -> bool {
        self.visible = !self.visible;
        if !self.visible {
            return false;
        }

        let (dirs_ok, _) = self.refresh(api).await;
        if !dirs_ok && self.current_path != self.root_path {
            tracing::warn!(
                path = %self.current_path,
                root = %self.root_path,
                "Knowledge base path unavailable, falling back to root"
            );
            self.current_path = self.root_path.clone();
            self.refresh(api).await;
        }
        true
    }

    pub async fn navigate_into(&mut self, api: &dyn DiagnosisApi, name: &str) {
        self.current_path = join_path(&self.current_path, name);
        self.edit_pending = false;
        self.refresh(api).await;
    }

    pub async fn navigate_up(&mut self, api: &dyn DiagnosisApi) {
        self.current_path = parent_path(&self.current_path);
        self.edit_pending = false;
        self.refresh(api).await;
    }

    /// Set the path while the operator is typing. Nothing is fetched until
    /// [`commit_path_edit`](Self::commit_path_edit).
    pub fn edit_path(&mut self, path: &str) {
        self.current_path = normalize(path);
        self.edit_pending = true;
    }

    /// Focus-lost boundary for manual edits. Returns whether a refresh ran.
    pub async fn commit_path_edit(&mut self, api: &dyn DiagnosisApi) -> bool {
        if !self.edit_pending {
            return false;
        }
        self.edit_pending = false;
        self.refresh(api).await;
        true
    }

    /// Index the current path, then re-list its documents.
    pub async fn reindex(&mut self, api: &dyn DiagnosisApi) -> Result<ProcessResponse, WorkflowError> {
        if !self.can_reindex() {
            return Err(WorkflowError::Rejected(Precondition::NoDetectedFiles));
        }

        let path = self.current_path.clone();
        let ack = api
            .process_knowledge_base(&path)
            .await
            .map_err(|e| WorkflowError::stage(Stage::KnowledgeBaseIndex, e))?;
        tracing::info!(path = %path, count = ?ack.count, "Knowledge base path indexed");

        let files = api.list_kb_files(&path).await;
        self.apply_files(&path, files);
        Ok(ack)
    }

    /// Re-fetch both views of the current path concurrently. Each view is
    /// updated on its own; returns (dirs_ok, files_ok).
    pub async fn refresh(&mut self, api: &dyn DiagnosisApi) -> (bool, bool) {
        let path = self.current_path.clone();
        let (dirs, files) = futures::join!(api.list_kb_dirs(&path), api.list_kb_files(&path));
        self.last_error = None;
        let dirs_ok = self.apply_dirs(&path, dirs);
        let files_ok = self.apply_files(&path, files);
        (dirs_ok, files_ok)
    }

    fn apply_dirs(&mut self, path: &str, dirs: Result<KbDirListing, ApiError>) -> bool {
        match dirs {
            Ok(listing) => {
                self.child_directories = listing.dirs;
                true
            }
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Directory listing failed");
                self.child_directories.clear();
                self.last_error = Some(format!("{} failed: {}", Stage::DirectoryListing, e));
                false
            }
        }
    }

    fn apply_files(&mut self, path: &str, files: Result<KbFilesListing, ApiError>) -> bool {
        match files {
            Ok(listing) => {
                self.detected_files = listing.files;
                self.connection_status = listing.status;
                self.abs_path = listing.abs_path;
                true
            }
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Document listing failed");
                self.detected_files.clear();
                self.connection_status = Some("disconnected".to_string());
                self.abs_path = None;
                if self.last_error.is_none() {
                    self.last_error = Some(format!("document listing failed: {}", e));
                }
                false
            }
        }
    }
}

fn normalize(path: &str) -> String {
    let path = path.trim();
    if path.is_empty() {
        ROOT_PATH.to_string()
    } else {
        path.to_string()
    }
}

/// `base` + `/` + `name` with exactly one separator between them.
pub fn join_path(base: &str, name: &str) -> String {
    let name = name.trim().trim_matches('/');
    if name.is_empty() {
        return normalize(base);
    }

    let absolute = base.starts_with('/');
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        return if absolute {
            format!("/{}", name)
        } else {
            name.to_string()
        };
    }
    format!("{}/{}", base, name)
}

/// Drop the last segment. Relative paths bottom out at `.`, absolute at `/`.
pub fn parent_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let trimmed = path.trim_end_matches('/');

    let parent = match trimmed.rfind('/') {
        Some(i) => trimmed[..i].trim_end_matches('/'),
        None => "",
    };

    if !parent.is_empty() {
        parent.to_string()
    } else if absolute {
        "/".to_string()
    } else {
        ROOT_PATH.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_of_nested_relative() {
        assert_eq!(parent_path("a/b"), "a");
        assert_eq!(parent_path("data/knowledge_base/drives/"), "data/knowledge_base");
    }

    #[test]
    fn test_parent_never_empty() {
        assert_eq!(parent_path("a"), ".");
        assert_eq!(parent_path("."), ".");
        assert_eq!(parent_path("./manuals"), ".");
        assert_eq!(parent_path(""), ".");
    }

    #[test]
    fn test_parent_of_absolute() {
        assert_eq!(parent_path("/app/data"), "/app");
        assert_eq!(parent_path("/app"), "/");
        assert_eq!(parent_path("/"), "/");
    }

    #[test]
    fn test_parent_collapses_double_separator() {
        assert_eq!(parent_path("a//b"), "a");
    }

    #[test]
    fn test_join_single_separator() {
        assert_eq!(join_path("data", "manuals"), "data/manuals");
        assert_eq!(join_path("data/", "/manuals"), "data/manuals");
        assert_eq!(join_path(".", "manuals"), "./manuals");
        assert_eq!(join_path("/", "app"), "/app");
        assert_eq!(join_path("data", ""), "data");
    }

    #[test]
    fn test_edit_path_defers_refresh_and_never_empties() {
        let mut browser = DirectoryBrowser::new("data/knowledge_base", ".");
        browser.edit_path("   ");
        assert_eq!(browser.current_path(), ".");
        assert!(browser.has_pending_edit());
    }

    #[test]
    fn test_new_browser_is_hidden_and_cannot_reindex() {
        let browser = DirectoryBrowser::new("", ".");
        assert_eq!(browser.current_path(), ".");
        assert!(!browser.is_visible());
        assert!(!browser.can_reindex());
    }
}
