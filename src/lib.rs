pub mod agents;
pub mod checkpoint;
pub mod config;
pub mod document;
pub mod errors;
pub mod export;
pub mod gate;
pub mod llm;
pub mod lore;
pub mod orchestrator;
pub mod stage;

pub use errors::{CheckpointError, GenerationError, PipelineError, ValidationError};
pub use orchestrator::{Pipeline, RunOptions, RunSettings, Seed};
pub use stage::Stage;
