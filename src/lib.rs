pub mod combine;
pub mod config;
pub mod discover;
pub mod error;
pub mod pipeline;
pub mod pivot;
pub mod scrub;
pub mod table;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use pipeline::{run, RunSummary};
