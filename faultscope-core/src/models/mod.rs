pub mod diagnosis;
pub mod feedback;
pub mod file;
pub mod history;
pub mod preview;

pub use diagnosis::{ActionStep, ConfidenceAssessment, ConfidenceBand, RawDiagnosis, StructuredResult};
pub use feedback::FeedbackRating;
pub use file::{FileMetadata, KbFileMetadata};
pub use history::HistoryEntry;
pub use preview::PreviewTable;
