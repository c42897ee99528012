use std::fmt;

use thiserror::Error;

use crate::api::ApiError;

#[derive(Error, Debug)]
pub enum FaultscopeError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Other error: {0}")]
    Other(String),
}

/// External call a transition was waiting on when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Upload,
    Preview,
    Index,
    FileListing,
    Query,
    Feedback,
    DirectoryListing,
    KnowledgeBaseIndex,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Upload => "upload",
            Stage::Preview => "preview",
            Stage::Index => "indexing",
            Stage::FileListing => "file listing",
            Stage::Query => "query",
            Stage::Feedback => "feedback",
            Stage::DirectoryListing => "directory listing",
            Stage::KnowledgeBaseIndex => "knowledge base indexing",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transition guard that was not met. No request was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    EmptyQuery,
    NoResult,
    FeedbackAlreadySubmitted,
    NoPreviewRow,
    HeaderRow,
    NoDetectedFiles,
    EmptyUpload,
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Precondition::EmptyQuery => "query text is empty",
            Precondition::NoResult => "there is no result to rate",
            Precondition::FeedbackAlreadySubmitted => "this result has already been rated",
            Precondition::NoPreviewRow => "no such preview row",
            Precondition::HeaderRow => "the header row cannot be selected",
            Precondition::NoDetectedFiles => "no documents detected under the current path",
            Precondition::EmptyUpload => "no file to upload",
        };
        f.write_str(text)
    }
}

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Rejected: {0}")]
    Rejected(Precondition),

    #[error("{stage} failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: ApiError,
    },
}

impl WorkflowError {
    pub fn stage(stage: Stage, source: ApiError) -> Self {
        WorkflowError::Stage { stage, source }
    }

    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            WorkflowError::Stage { stage, .. } => Some(*stage),
            WorkflowError::Rejected(_) => None,
        }
    }
}
