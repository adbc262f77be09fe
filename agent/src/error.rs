use thiserror::Error;

/// Why a single model attempt produced no usable judgment
#[derive(Debug, Error)]
pub enum AnalystError {
    #[error("{model} unavailable: {reason}")]
    Unavailable { model: String, reason: String },

    #[error("{model} returned no tool call")]
    NoToolCall { model: String, text: Option<String> },

    #[error("{model} returned malformed output: {reason}")]
    Malformed { model: String, reason: String },

    #[error("{model} timed out after {secs}s")]
    Timeout { model: String, secs: u64 },
}

/// Request-level failures surfaced to the caller
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("marketTitle is required")]
    MissingTitle,

    #[error("no model produced a usable analysis ({} attempted)", .failed.len())]
    AllModelsFailed { failed: Vec<String> },
}
