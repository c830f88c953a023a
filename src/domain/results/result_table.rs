//! Tabular benchmark results.
//!
//! Rows are dataset observations and columns are methods. Each layer holds
//! the output of one post-processing step for every method; a method that
//! failed or does not declare the step has a column of `Value::Null`.

use crate::domain::data::Value;
use crate::domain::errors::{BenchError, BenchResult};
use crate::domain::performance::builtin::builtin_metric;
use crate::domain::performance::metric::MetricRegistration;
use crate::domain::session::{Outcome, SessionLog};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    name: String,
    n_rows: usize,
    /// One column per method, aligned with the table's method order
    columns: Vec<Vec<Value>>,
}

impl Layer {
    fn new(name: impl Into<String>, n_rows: usize, n_methods: usize) -> Self {
        Self {
            name: name.into(),
            n_rows,
            columns: vec![vec![Value::Null; n_rows]; n_methods],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// (rows, methods)
    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows, self.columns.len())
    }

    pub fn column(&self, method_index: usize) -> Option<&[Value]> {
        self.columns.get(method_index).map(Vec::as_slice)
    }

    pub fn cell(&self, row: usize, method_index: usize) -> Option<&Value> {
        self.columns.get(method_index).and_then(|c| c.get(row))
    }

    pub fn columns(&self) -> &[Vec<Value>] {
        &self.columns
    }
}

/// Performance value stored alongside a method's info row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMetric {
    pub layer: String,
    pub metric: String,
    pub params: BTreeMap<String, f64>,
    pub value: Option<f64>,
}

/// One row of the method info side table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodInfo {
    pub id: String,
    pub callable: String,
    pub post_steps: Vec<String>,
    pub params: BTreeMap<String, String>,
    pub package: Option<String>,
    pub version: Option<String>,
    pub metadata: BTreeMap<String, Value>,
    /// Descriptor signature at the last execution of this method
    pub signature: String,
    #[serde(default)]
    pub performance: Vec<StoredMetric>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultTable {
    n_rows: usize,
    dataset_fingerprint: Option<String>,
    methods: Vec<MethodInfo>,
    layers: Vec<Layer>,
    ground_truth: BTreeMap<String, Vec<Value>>,
    sessions: Vec<SessionLog>,
    metrics: Vec<MetricRegistration>,
}

impl ResultTable {
    pub fn new(n_rows: usize) -> Self {
        Self {
            n_rows,
            dataset_fingerprint: None,
            methods: Vec::new(),
            layers: Vec::new(),
            ground_truth: BTreeMap::new(),
            sessions: Vec::new(),
            metrics: Vec::new(),
        }
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_methods(&self) -> usize {
        self.methods.len()
    }

    pub fn method_ids(&self) -> Vec<&str> {
        self.methods.iter().map(|m| m.id.as_str()).collect()
    }

    pub fn method_info(&self) -> &[MethodInfo] {
        &self.methods
    }

    pub fn method(&self, id: &str) -> Option<&MethodInfo> {
        self.methods.iter().find(|m| m.id == id)
    }

    pub fn method_index(&self, id: &str) -> Option<usize> {
        self.methods.iter().position(|m| m.id == id)
    }

    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.name.as_str()).collect()
    }

    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name == name)
    }

    pub fn has_layer(&self, name: &str) -> bool {
        self.layer(name).is_some()
    }

    pub fn layer_column(&self, layer: &str, method: &str) -> Option<&[Value]> {
        let index = self.method_index(method)?;
        self.layer(layer)?.column(index)
    }

    pub fn ground_truth(&self, layer: &str) -> Option<&[Value]> {
        self.ground_truth.get(layer).map(Vec::as_slice)
    }

    pub fn has_ground_truth(&self, layer: &str) -> bool {
        self.ground_truth.contains_key(layer)
    }

    pub fn set_ground_truth(&mut self, layer: &str, truth: Vec<Value>) -> BenchResult<()> {
        if !self.has_layer(layer) {
            return Err(BenchError::UnknownLayer {
                layer: layer.to_string(),
            });
        }
        if truth.len() != self.n_rows {
            return Err(BenchError::configuration(format!(
                "ground truth for {} has {} values, table has {} rows",
                layer,
                truth.len(),
                self.n_rows
            )));
        }
        self.ground_truth.insert(layer.to_string(), truth);
        Ok(())
    }

    /// Execution history, oldest first.
    pub fn sessions(&self) -> &[SessionLog] {
        &self.sessions
    }

    pub fn latest_session(&self) -> Option<&SessionLog> {
        self.sessions.last()
    }

    /// Outcomes from the most recent session in which `method` ran.
    pub fn latest_outcomes(&self, method: &str) -> Option<&BTreeMap<String, Outcome>> {
        self.sessions
            .iter()
            .rev()
            .find_map(|session| session.results.get(method))
    }

    pub fn dataset_fingerprint(&self) -> Option<&str> {
        self.dataset_fingerprint.as_deref()
    }

    pub fn registered_metrics(&self) -> &[MetricRegistration] {
        &self.metrics
    }

    /// Re-attaches built-in metric functions after deserialization.
    pub fn rebind_builtin_metrics(&mut self) {
        for registration in self.metrics.iter_mut().filter(|r| r.function.is_none()) {
            match builtin_metric(&registration.metric) {
                Some(function) => registration.function = Some(function),
                None => warn!(
                    "Metric {} on {} is not built in and must be registered again",
                    registration.metric, registration.layer
                ),
            }
        }
    }

    pub(crate) fn set_dataset_fingerprint(&mut self, fingerprint: String) {
        self.dataset_fingerprint = Some(fingerprint);
    }

    pub(crate) fn metrics_mut(&mut self) -> &mut Vec<MetricRegistration> {
        &mut self.metrics
    }

    pub(crate) fn method_info_mut(&mut self) -> &mut [MethodInfo] {
        &mut self.methods
    }

    /// Inserts or replaces a method row, adding an all-missing column to every
    /// layer for a new method. Returns the method's column index.
    pub(crate) fn upsert_method(&mut self, info: MethodInfo) -> usize {
        match self.method_index(&info.id) {
            Some(index) => {
                self.methods[index] = info;
                index
            }
            None => {
                self.methods.push(info);
                for layer in &mut self.layers {
                    layer.columns.push(vec![Value::Null; self.n_rows]);
                }
                self.methods.len() - 1
            }
        }
    }

    pub(crate) fn ensure_layer(&mut self, name: &str) {
        if !self.has_layer(name) {
            self.layers
                .push(Layer::new(name, self.n_rows, self.methods.len()));
        }
    }

    /// Resets every cell of a method to missing.
    pub(crate) fn clear_method(&mut self, index: usize) {
        for layer in &mut self.layers {
            if let Some(column) = layer.columns.get_mut(index) {
                column.iter_mut().for_each(|cell| *cell = Value::Null);
            }
        }
    }

    pub(crate) fn store_column(&mut self, layer: &str, index: usize, column: Vec<Value>) {
        debug_assert_eq!(column.len(), self.n_rows);
        if let Some(target) = self
            .layers
            .iter_mut()
            .find(|l| l.name == layer)
            .and_then(|l| l.columns.get_mut(index))
        {
            *target = column;
        }
    }

    pub(crate) fn drop_method(&mut self, id: &str) {
        if let Some(index) = self.method_index(id) {
            self.methods.remove(index);
            for layer in &mut self.layers {
                layer.columns.remove(index);
            }
        }
    }

    /// Orders methods as listed; methods not listed keep their relative order
    /// after the listed ones.
    pub(crate) fn reorder_methods(&mut self, order: &[&str]) {
        let mut indices: Vec<usize> = order
            .iter()
            .filter_map(|id| self.method_index(id))
            .collect();
        for index in 0..self.methods.len() {
            if !indices.contains(&index) {
                indices.push(index);
            }
        }

        self.methods = indices.iter().map(|&i| self.methods[i].clone()).collect();
        for layer in &mut self.layers {
            layer.columns = indices.iter().map(|&i| layer.columns[i].clone()).collect();
        }
    }

    /// Keeps only the named layers, in the given order.
    pub(crate) fn retain_layers(&mut self, names: &[String]) {
        let mut kept = Vec::with_capacity(names.len());
        for name in names {
            if let Some(position) = self.layers.iter().position(|l| &l.name == name) {
                kept.push(self.layers.remove(position));
            }
        }
        self.layers = kept;
        self.ground_truth.retain(|layer, _| names.contains(layer));
    }

    pub(crate) fn push_session(&mut self, session: SessionLog) {
        self.sessions.push(session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: &str) -> MethodInfo {
        MethodInfo {
            id: id.to_string(),
            callable: "adjust".to_string(),
            post_steps: vec![id.to_string()],
            params: BTreeMap::new(),
            package: None,
            version: None,
            metadata: BTreeMap::new(),
            signature: String::new(),
            performance: Vec::new(),
        }
    }

    #[test]
    fn test_new_methods_get_missing_columns() {
        let mut table = ResultTable::new(3);
        table.upsert_method(info("a"));
        table.ensure_layer("x");
        table.store_column("x", 0, vec![Value::Number(1.0); 3]);
        let b = table.upsert_method(info("b"));

        let layer = table.layer("x").unwrap();
        assert_eq!(layer.shape(), (3, 2));
        assert_eq!(layer.cell(0, 0), Some(&Value::Number(1.0)));
        assert!(layer.column(b).unwrap().iter().all(Value::is_missing));
    }

    #[test]
    fn test_reorder_keeps_columns_aligned() {
        let mut table = ResultTable::new(1);
        table.upsert_method(info("a"));
        table.upsert_method(info("b"));
        table.upsert_method(info("c"));
        table.ensure_layer("x");
        for (i, v) in [1.0, 2.0, 3.0].iter().enumerate() {
            table.store_column("x", i, vec![Value::Number(*v)]);
        }

        table.reorder_methods(&["c", "a"]);

        assert_eq!(table.method_ids(), vec!["c", "a", "b"]);
        assert_eq!(table.layer_column("x", "c"), Some(&[Value::Number(3.0)][..]));
        assert_eq!(table.layer_column("x", "b"), Some(&[Value::Number(2.0)][..]));
    }

    #[test]
    fn test_ground_truth_validation() {
        let mut table = ResultTable::new(2);
        table.upsert_method(info("a"));

        let err = table
            .set_ground_truth("x", vec![Value::Bool(true), Value::Bool(false)])
            .unwrap_err();
        assert!(matches!(err, BenchError::UnknownLayer { .. }));

        table.ensure_layer("x");
        let err = table.set_ground_truth("x", vec![Value::Bool(true)]).unwrap_err();
        assert!(matches!(err, BenchError::Configuration { .. }));

        table
            .set_ground_truth("x", vec![Value::Bool(true), Value::Bool(false)])
            .unwrap();
        assert!(table.has_ground_truth("x"));
    }

    #[test]
    fn test_retain_layers_drops_truth_of_removed_layers() {
        let mut table = ResultTable::new(1);
        table.upsert_method(info("a"));
        table.ensure_layer("x");
        table.ensure_layer("y");
        table.set_ground_truth("y", vec![Value::Bool(true)]).unwrap();

        table.retain_layers(&["x".to_string()]);

        assert_eq!(table.layer_names(), vec!["x"]);
        assert!(!table.has_ground_truth("y"));
    }

    #[test]
    fn test_drop_method_removes_columns() {
        let mut table = ResultTable::new(1);
        table.upsert_method(info("a"));
        table.upsert_method(info("b"));
        table.ensure_layer("x");

        table.drop_method("a");

        assert_eq!(table.method_ids(), vec!["b"]);
        assert_eq!(table.layer("x").unwrap().shape(), (1, 1));
    }
}
