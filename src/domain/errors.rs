use thiserror::Error;

/// Errors raised while declaring, executing and evaluating a benchmark
#[derive(Debug, Error)]
pub enum BenchError {
    #[error("Method already declared: {id}")]
    DuplicateId { id: String },

    #[error("Method not found: {id}")]
    NotFound { id: String },

    #[error("Unknown layer: {layer}")]
    UnknownLayer { layer: String },

    #[error("Metric {metric} references an assay missing from the table: {layer}")]
    UnknownAssay { metric: String, layer: String },

    #[error("{method} timed out after {seconds:.2}s")]
    Timeout { method: String, seconds: f64 },

    #[error("{method} failed: {message}")]
    MethodExecution {
        method: String,
        post_step: Option<String>,
        message: String,
    },

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("No dataset attached to the benchmark plan")]
    MissingData,

    #[error("Persistence failure: {reason}")]
    Persistence { reason: String },
}

impl BenchError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        BenchError::Configuration {
            reason: reason.into(),
        }
    }
}

pub type BenchResult<T> = Result<T, BenchError>;
