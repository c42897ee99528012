pub mod api;
pub mod browser;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod parser;
pub mod session;

pub use api::{ApiError, DiagnosisApi, HttpDiagnosisClient};
pub use browser::DirectoryBrowser;
pub use config::FaultscopeConfig;
pub use error::{FaultscopeError, Precondition, Stage, WorkflowError};
pub use orchestrator::{PendingQuery, QueryOutcome, WorkflowOrchestrator};
pub use parser::parse;
pub use session::{CurrentResult, SessionPhase, SessionState};
