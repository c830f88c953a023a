use crate::domain::errors::{BenchError, BenchResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Metric body: method output and ground truth as numbers (`NaN` = missing).
pub type MetricFn = dyn Fn(&[f64], &[f64], &MetricParams) -> anyhow::Result<f64> + Send + Sync;

/// Extra numeric parameter of a metric, beyond query and truth
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDecl {
    pub name: String,
    pub default: Option<f64>,
    /// Inclusive bounds checked against every grid value
    pub range: Option<(f64, f64)>,
}

/// Resolved parameter point for one metric call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricParams(BTreeMap<String, f64>);

impl MetricParams {
    pub fn new(values: BTreeMap<String, f64>) -> Self {
        Self(values)
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn require(&self, name: &str) -> anyhow::Result<f64> {
        self.get(name)
            .ok_or_else(|| anyhow::anyhow!("metric parameter {} not supplied", name))
    }

    pub fn values(&self) -> &BTreeMap<String, f64> {
        &self.0
    }
}

#[derive(Clone)]
pub struct MetricFunction {
    params: Vec<ParamDecl>,
    func: Arc<MetricFn>,
}

impl MetricFunction {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&[f64], &[f64], &MetricParams) -> anyhow::Result<f64> + Send + Sync + 'static,
    {
        Self {
            params: Vec::new(),
            func: Arc::new(func),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, default: f64) -> Self {
        self.params.push(ParamDecl {
            name: name.into(),
            default: Some(default),
            range: None,
        });
        self
    }

    pub fn with_bounded_param(mut self, name: impl Into<String>, default: f64, min: f64, max: f64) -> Self {
        self.params.push(ParamDecl {
            name: name.into(),
            default: Some(default),
            range: Some((min, max)),
        });
        self
    }

    /// Declares a parameter without a default. Such a function is rejected at
    /// registration since metrics must be callable with no extra arguments.
    pub fn with_required_param(mut self, name: impl Into<String>) -> Self {
        self.params.push(ParamDecl {
            name: name.into(),
            default: None,
            range: None,
        });
        self
    }

    pub fn params(&self) -> &[ParamDecl] {
        &self.params
    }

    pub fn validate(&self, metric: &str) -> BenchResult<()> {
        if let Some(decl) = self.params.iter().find(|p| p.default.is_none()) {
            return Err(BenchError::configuration(format!(
                "metric {} must declare a default for parameter {}",
                metric, decl.name
            )));
        }
        Ok(())
    }

    pub fn call(&self, query: &[f64], truth: &[f64], params: &MetricParams) -> anyhow::Result<f64> {
        (self.func)(query, truth, params)
    }
}

impl fmt::Debug for MetricFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricFunction")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// A metric registered against one layer of a result table.
///
/// The function itself is not persisted; built-in metrics are re-bound by
/// name when a table is loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricRegistration {
    pub layer: String,
    pub metric: String,
    pub params: Vec<ParamDecl>,
    #[serde(skip)]
    pub function: Option<MetricFunction>,
}

impl MetricRegistration {
    pub fn new(layer: impl Into<String>, metric: impl Into<String>, function: MetricFunction) -> Self {
        Self {
            layer: layer.into(),
            metric: metric.into(),
            params: function.params().to_vec(),
            function: Some(function),
        }
    }
}
