use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Stage at which a method failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorOrigin {
    Main,
    PostProcess,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    pub origin: ErrorOrigin,
    pub post_step: Option<String>,
}

impl ErrorDetail {
    pub fn main(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            origin: ErrorOrigin::Main,
            post_step: None,
        }
    }

    pub fn post_process(post_step: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            origin: ErrorOrigin::PostProcess,
            post_step: Some(post_step.into()),
        }
    }
}

/// Result of one (method, post-step) combination in a session.
///
/// `Missing` is structural: the post-step belongs to another method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Missing,
    Error(ErrorDetail),
}

impl Outcome {
    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Error(_))
    }

    pub fn error(&self) -> Option<&ErrorDetail> {
        match self {
            Outcome::Error(detail) => Some(detail),
            _ => None,
        }
    }
}

/// Software environment at the time a session ran
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    pub timestamp: DateTime<Utc>,
    pub package: String,
    pub version: String,
    pub os: String,
    pub arch: String,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

/// Execution settings a session ran with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionParameters {
    pub parallel: bool,
    pub workers: usize,
    pub timeout_seconds: Option<f64>,
    pub catch_errors: bool,
    pub incremental: bool,
}

/// Record of one execution pass.
///
/// Only methods that actually ran appear in `results`; a method carried over
/// from a previous session has no entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionLog {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub environment: EnvironmentInfo,
    pub parameters: SessionParameters,
    pub results: BTreeMap<String, BTreeMap<String, Outcome>>,
}

impl SessionLog {
    pub fn new(
        environment: EnvironmentInfo,
        parameters: SessionParameters,
        results: BTreeMap<String, BTreeMap<String, Outcome>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: environment.timestamp,
            environment,
            parameters,
            results,
        }
    }

    pub fn ran(&self, method: &str) -> bool {
        self.results.contains_key(method)
    }

    pub fn outcome(&self, method: &str, post_step: &str) -> Option<&Outcome> {
        self.results.get(method).and_then(|steps| steps.get(post_step))
    }

    /// All (method, post-step, detail) failures of the session.
    pub fn failures(&self) -> Vec<(&str, &str, &ErrorDetail)> {
        self.results
            .iter()
            .flat_map(|(method, steps)| {
                steps.iter().filter_map(move |(step, outcome)| {
                    outcome
                        .error()
                        .map(|detail| (method.as_str(), step.as_str(), detail))
                })
            })
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.failures().is_empty()
    }
}
