use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// An uploaded log file as listed by `GET /api/files`.
///
/// Identity is the filename. Older backends list bare directory entries, so
/// the timestamp and size may be absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub filename: String,
    #[serde(default, rename = "upload_timestamp")]
    pub uploaded_at: Option<NaiveDateTime>,
    #[serde(default, rename = "size")]
    pub size_bytes: Option<u64>,
}

/// A document detected under a knowledge-base path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KbFileMetadata {
    pub filename: String,
    #[serde(default)]
    pub size: Option<u64>,
}
