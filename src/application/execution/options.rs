use crate::config::Config;
use crate::domain::errors::{BenchError, BenchResult};
use std::collections::BTreeMap;
use std::time::Duration;

/// Settings for one execution pass
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    pub parallel: bool,
    /// Worker pool size when `parallel` is set
    pub workers: usize,
    /// Budget per invocation (main call and each post-step separately)
    pub timeout: Option<Duration>,
    /// Record failures and continue; when false the first failure aborts
    pub catch_errors: bool,
    /// Layer name -> dataset column holding its ground truth
    pub truth_columns: BTreeMap<String, String>,
    /// Incremental runs keep methods that are no longer in the plan
    pub keep_all: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            parallel: false,
            workers: default_workers(),
            timeout: None,
            catch_errors: true,
            truth_columns: BTreeMap::new(),
            keep_all: true,
        }
    }
}

impl ExecutionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Fails with `Configuration` unless `seconds` is a positive, representable duration.
    pub fn with_timeout_secs(self, seconds: f64) -> BenchResult<Self> {
        Ok(self.with_timeout(timeout_from_secs(seconds)?))
    }

    pub fn with_catch_errors(mut self, catch_errors: bool) -> Self {
        self.catch_errors = catch_errors;
        self
    }

    pub fn with_truth(mut self, layer: impl Into<String>, column: impl Into<String>) -> Self {
        self.truth_columns.insert(layer.into(), column.into());
        self
    }

    pub fn with_keep_all(mut self, keep_all: bool) -> Self {
        self.keep_all = keep_all;
        self
    }

    pub(crate) fn effective_workers(&self) -> usize {
        if self.parallel { self.workers.max(1) } else { 1 }
    }
}

impl From<&Config> for ExecutionOptions {
    fn from(config: &Config) -> Self {
        Self {
            parallel: config.parallel,
            workers: config.workers,
            timeout: config
                .timeout_secs
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok()),
            catch_errors: config.catch_errors,
            ..Self::default()
        }
    }
}

pub(crate) fn timeout_from_secs(seconds: f64) -> BenchResult<Duration> {
    match Duration::try_from_secs_f64(seconds) {
        Ok(timeout) if !timeout.is_zero() => Ok(timeout),
        _ => Err(BenchError::configuration(format!(
            "timeout must be a positive number of seconds, got {}",
            seconds
        ))),
    }
}

pub(crate) fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ExecutionOptions::default();
        assert!(!options.parallel);
        assert!(options.catch_errors);
        assert!(options.timeout.is_none());
        assert!(options.keep_all);
        assert_eq!(options.effective_workers(), 1);
    }

    #[test]
    fn test_builder() {
        let options = ExecutionOptions::new()
            .with_parallel(true)
            .with_workers(0)
            .with_timeout_secs(1.5)
            .unwrap()
            .with_truth("bh", "truth");

        assert_eq!(options.effective_workers(), 1);
        assert_eq!(options.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(options.truth_columns["bh"], "truth");
    }

    #[test]
    fn test_invalid_timeout_rejected() {
        for seconds in [-1.0, 0.0, f64::NAN, f64::INFINITY, 1e30] {
            let result = ExecutionOptions::default().with_timeout_secs(seconds);
            assert!(
                matches!(result, Err(BenchError::Configuration { .. })),
                "{} should be rejected",
                seconds
            );
        }
    }
}
