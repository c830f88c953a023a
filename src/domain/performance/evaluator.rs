use crate::domain::data::Value;
use crate::domain::errors::{BenchError, BenchResult};
use crate::domain::performance::builtin::builtin_metric;
use crate::domain::performance::metric::{MetricFunction, MetricParams, MetricRegistration, ParamDecl};
use crate::domain::results::{ResultTable, StoredMetric};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Extra parameter values to evaluate every metric at (e.g. several alphas).
pub type ParamGrid = BTreeMap<String, Vec<f64>>;

#[derive(Debug, Clone, Copy)]
pub struct EvaluateOptions {
    /// Long format: one row per (method, layer, metric, parameter point)
    pub tidy: bool,
    /// Store results in the method info table instead of returning them
    pub add_to_method_info: bool,
    /// Recompute values already stored in the method info table
    pub rerun: bool,
}

impl Default for EvaluateOptions {
    fn default() -> Self {
        Self {
            tidy: false,
            add_to_method_info: false,
            rerun: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    pub method: String,
    pub layer: String,
    pub metric: String,
    pub params: BTreeMap<String, f64>,
    /// `None` when the metric is undefined for this method (e.g. 0/0)
    pub value: Option<f64>,
}

impl MetricRow {
    /// Column label used in the wide layout, e.g. `TPR.bh[alpha=0.05]`.
    pub fn label(&self) -> String {
        if self.params.is_empty() {
            format!("{}.{}", self.metric, self.layer)
        } else {
            let params: Vec<String> = self
                .params
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect();
            format!("{}.{}[{}]", self.metric, self.layer, params.join(","))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WideRow {
    pub method: String,
    pub values: Vec<Option<f64>>,
}

/// One row per method, one column per metric and parameter combination
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WideMetrics {
    pub columns: Vec<String>,
    pub rows: Vec<WideRow>,
}

impl WideMetrics {
    pub fn from_rows(rows: &[MetricRow]) -> Self {
        let mut wide = WideMetrics::default();
        for row in rows {
            let label = row.label();
            let column = match wide.columns.iter().position(|c| *c == label) {
                Some(index) => index,
                None => {
                    wide.columns.push(label);
                    for existing in &mut wide.rows {
                        existing.values.push(None);
                    }
                    wide.columns.len() - 1
                }
            };
            let width = wide.columns.len();
            let target = match wide.rows.iter().position(|r| r.method == row.method) {
                Some(index) => &mut wide.rows[index],
                None => {
                    wide.rows.push(WideRow {
                        method: row.method.clone(),
                        values: vec![None; width],
                    });
                    let last = wide.rows.len() - 1;
                    &mut wide.rows[last]
                }
            };
            target.values[column] = row.value;
        }
        wide
    }

    pub fn get(&self, method: &str, column: &str) -> Option<f64> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.rows
            .iter()
            .find(|r| r.method == method)
            .and_then(|r| r.values[index])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetricsTable {
    Wide(WideMetrics),
    Tidy(Vec<MetricRow>),
}

/// Registers and evaluates performance metrics against a result table.
pub struct MetricEvaluator;

impl MetricEvaluator {
    /// Registers `function` as `metric` on `layer`. A registration with the
    /// same layer and metric name is replaced.
    pub fn register(table: &mut ResultTable, layer: &str, metric: &str, function: MetricFunction) -> BenchResult<()> {
        if !table.has_layer(layer) {
            return Err(BenchError::UnknownLayer {
                layer: layer.to_string(),
            });
        }
        function.validate(metric)?;

        let registration = MetricRegistration::new(layer, metric, function);
        let metrics = table.metrics_mut();
        match metrics
            .iter_mut()
            .find(|r| r.layer == layer && r.metric == metric)
        {
            Some(existing) => {
                warn!("Replacing metric {} on layer {}", metric, layer);
                *existing = registration;
            }
            None => metrics.push(registration),
        }
        Ok(())
    }

    pub fn register_builtin(table: &mut ResultTable, layer: &str, metric: &str) -> BenchResult<()> {
        let function = builtin_metric(metric)
            .ok_or_else(|| BenchError::configuration(format!("unknown built-in metric: {}", metric)))?;
        Self::register(table, layer, metric, function)
    }

    /// Computes every registered metric for every method that has ground
    /// truth and non-missing values in the metric's layer, across the cross
    /// product of `grid` (restricted to each metric's declared parameters).
    ///
    /// Returns `None` when the results were stored in the method info table.
    pub fn evaluate(table: &mut ResultTable, grid: &ParamGrid, options: EvaluateOptions) -> BenchResult<Option<MetricsTable>> {
        let mut rows = Vec::new();

        for registration in table.registered_metrics() {
            let function = registration.function.as_ref().ok_or_else(|| {
                BenchError::configuration(format!(
                    "metric {} on {} has no function attached; register it again",
                    registration.metric, registration.layer
                ))
            })?;
            let layer = table.layer(&registration.layer).ok_or_else(|| BenchError::UnknownAssay {
                metric: registration.metric.clone(),
                layer: registration.layer.clone(),
            })?;
            let Some(truth) = table.ground_truth(&registration.layer) else {
                debug!(
                    "Skipping {} on {}: no ground truth",
                    registration.metric, registration.layer
                );
                continue;
            };
            let truth = numeric(truth);
            let points = expand_grid(&registration.metric, &registration.params, grid)?;

            for (index, info) in table.method_info().iter().enumerate() {
                let Some(column) = layer.column(index) else {
                    continue;
                };
                if column.iter().all(Value::is_missing) {
                    continue;
                }
                let query = numeric(column);

                for point in &points {
                    let stored = if options.rerun {
                        None
                    } else {
                        info.performance.iter().find(|m| {
                            m.layer == registration.layer
                                && m.metric == registration.metric
                                && m.params == *point
                        })
                    };

                    let value = match stored {
                        Some(previous) => previous.value,
                        None => {
                            let raw = function
                                .call(&query, &truth, &MetricParams::new(point.clone()))
                                .map_err(|e| BenchError::MethodExecution {
                                    method: info.id.clone(),
                                    post_step: Some(registration.layer.clone()),
                                    message: format!("metric {}: {:#}", registration.metric, e),
                                })?;
                            raw.is_finite().then_some(raw)
                        }
                    };

                    rows.push(MetricRow {
                        method: info.id.clone(),
                        layer: registration.layer.clone(),
                        metric: registration.metric.clone(),
                        params: point.clone(),
                        value,
                    });
                }
            }
        }

        info!("Evaluated {} metric values", rows.len());

        if options.add_to_method_info {
            store(table, rows);
            return Ok(None);
        }

        Ok(Some(if options.tidy {
            MetricsTable::Tidy(rows)
        } else {
            MetricsTable::Wide(WideMetrics::from_rows(&rows))
        }))
    }

    /// Performance values stored in the method info table, as tidy rows.
    pub fn tidy_up(table: &ResultTable) -> Vec<MetricRow> {
        table
            .method_info()
            .iter()
            .flat_map(|info| {
                info.performance.iter().map(move |m| MetricRow {
                    method: info.id.clone(),
                    layer: m.layer.clone(),
                    metric: m.metric.clone(),
                    params: m.params.clone(),
                    value: m.value,
                })
            })
            .collect()
    }
}

fn numeric(values: &[Value]) -> Vec<f64> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(f64::NAN))
        .collect()
}

/// Cross product of grid values over the declared parameters; parameters
/// absent from the grid take their default. Grid keys the metric does not
/// declare are ignored.
fn expand_grid(metric: &str, decls: &[ParamDecl], grid: &ParamGrid) -> BenchResult<Vec<BTreeMap<String, f64>>> {
    let mut points = vec![BTreeMap::new()];

    for decl in decls {
        let values = match grid.get(&decl.name) {
            Some(values) if values.is_empty() => {
                return Err(BenchError::configuration(format!(
                    "empty value list for parameter {}",
                    decl.name
                )));
            }
            Some(values) => values.clone(),
            None => match decl.default {
                Some(default) => vec![default],
                None => {
                    return Err(BenchError::configuration(format!(
                        "metric {} has no value for parameter {}",
                        metric, decl.name
                    )));
                }
            },
        };

        if let Some((min, max)) = decl.range {
            if let Some(bad) = values.iter().find(|v| !(min..=max).contains(*v)) {
                return Err(BenchError::configuration(format!(
                    "{} = {} is outside [{}, {}]",
                    decl.name, bad, min, max
                )));
            }
        }

        points = points
            .into_iter()
            .flat_map(|point| {
                values.iter().map(move |value| {
                    let mut next = point.clone();
                    next.insert(decl.name.clone(), *value);
                    next
                })
            })
            .collect();
    }

    Ok(points)
}

fn store(table: &mut ResultTable, rows: Vec<MetricRow>) {
    for row in rows {
        let Some(info) = table
            .method_info_mut()
            .iter_mut()
            .find(|info| info.id == row.method)
        else {
            continue;
        };
        let entry = StoredMetric {
            layer: row.layer,
            metric: row.metric,
            params: row.params,
            value: row.value,
        };
        match info.performance.iter_mut().find(|m| {
            m.layer == entry.layer && m.metric == entry.metric && m.params == entry.params
        }) {
            Some(existing) => *existing = entry,
            None => info.performance.push(entry),
        }
    }
}
