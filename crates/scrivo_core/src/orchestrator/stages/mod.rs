//! Concrete pipeline stages, in execution order.

mod generate;
mod ingest;
mod organize;
mod refine;
mod transcribe;

pub use generate::GenerateStage;
pub use ingest::IngestStage;
pub use organize::OrganizeStage;
pub use refine::RefineStage;
pub use transcribe::TranscribeStage;
