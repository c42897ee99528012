use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::FaultscopeError;

/// Default location of the backend API
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Retrieval width sent with every query
pub const DEFAULT_TOP_K: u32 = 3;

/// Sentinel path the directory browser falls back to
pub const ROOT_PATH: &str = ".";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct FaultscopeConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub knowledge_base: KnowledgeBaseConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
    /// Retries apply to idempotent reads only
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_seconds: 30,
            max_retries: 3,
            retry_delay_ms: 200,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    pub top_k: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct KnowledgeBaseConfig {
    /// Path the browser opens on
    pub default_path: String,
    /// Path the browser recovers to when a listing fails
    pub root_path: String,
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            default_path: "data/knowledge_base".to_string(),
            root_path: ROOT_PATH.to_string(),
        }
    }
}

impl FaultscopeConfig {
    /// Load from a TOML file (optional) overlaid by `FAULTSCOPE__SECTION__KEY`
    /// environment variables. Missing keys fall back to defaults.
    pub fn load(path: &str) -> Result<Self, FaultscopeError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("FAULTSCOPE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;
        Ok(s.try_deserialize()?)
    }
}
