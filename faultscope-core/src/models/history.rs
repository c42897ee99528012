use serde::{Deserialize, Serialize};

/// A stored query as returned by `GET /api/history`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub filename: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    pub query: String,
    #[serde(default)]
    pub result: serde_json::Value,
}
