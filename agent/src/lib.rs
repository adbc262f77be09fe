pub mod analyzer;
pub mod category;
pub mod config;
pub mod data;
pub mod error;
pub mod normalizer;
pub mod prompt;
pub mod team;
pub mod types;

pub use config::AnalysisConfig;
pub use error::PipelineError;
pub use team::AnalysisPipeline;
