pub mod config;
pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod schema;
pub mod streaming;
pub mod validation;

pub use config::PipelineConfig;
pub use error::AppError;
pub use pipeline::{run_pipeline, Pipeline, RunSummary};
pub use streaming::ChunkConfig;
