//! Declarative benchmark plan.
//!
//! A `BenchPlan` only records what should run. Nothing is executed until
//! the plan is handed to the execution engine.

use crate::domain::data::Dataset;
use crate::domain::design::catalog::FunctionCatalog;
use crate::domain::design::method::{MethodDescriptor, MethodPatch, MethodSnapshot};
use crate::domain::design::params::ParamExpr;
use crate::domain::errors::{BenchError, BenchResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct BenchPlan {
    data: Option<Arc<Dataset>>,
    methods: Vec<MethodDescriptor>,
}

/// Serializable form of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSnapshot {
    pub data: Option<Dataset>,
    pub methods: Vec<MethodSnapshot>,
}

/// Parameter overrides for one variant produced by [`BenchPlan::expand`].
#[derive(Debug, Clone)]
pub struct MethodVariant {
    pub id: String,
    pub params: BTreeMap<String, ParamExpr>,
}

impl MethodVariant {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, expr: ParamExpr) -> Self {
        self.params.insert(name.into(), expr);
        self
    }
}

/// Differences between two plans.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanComparison {
    pub only_in_self: Vec<String>,
    pub only_in_other: Vec<String>,
    pub changed: Vec<String>,
    pub unchanged: Vec<String>,
    pub same_data: bool,
}

impl PlanComparison {
    pub fn is_identical(&self) -> bool {
        self.same_data
            && self.only_in_self.is_empty()
            && self.only_in_other.is_empty()
            && self.changed.is_empty()
    }
}

impl BenchPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(data: Dataset) -> Self {
        Self {
            data: Some(Arc::new(data)),
            methods: Vec::new(),
        }
    }

    pub fn add(&mut self, method: MethodDescriptor) -> BenchResult<()> {
        if self.has_method(method.id()) {
            return Err(BenchError::DuplicateId {
                id: method.id().to_string(),
            });
        }
        debug!("Declared method {}", method.id());
        self.methods.push(method);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> BenchResult<MethodDescriptor> {
        let position = self.position(id)?;
        Ok(self.methods.remove(position))
    }

    /// Replaces (or detaches) the data. Method declarations are untouched and
    /// re-resolve against the new data on the next execution.
    pub fn set_data(&mut self, data: Option<Dataset>) {
        self.data = data.map(Arc::new);
    }

    pub fn data(&self) -> Option<&Dataset> {
        self.data.as_deref()
    }

    pub(crate) fn shared_data(&self) -> Option<Arc<Dataset>> {
        self.data.clone()
    }

    /// Methods in declaration order.
    pub fn list(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    pub fn ids(&self) -> Vec<&str> {
        self.methods.iter().map(|m| m.id()).collect()
    }

    pub fn method(&self, id: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.id() == id)
    }

    pub fn has_method(&self, id: &str) -> bool {
        self.method(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Union of result layer names, in order of first declaration.
    pub fn layer_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for method in &self.methods {
            for name in method.layer_names() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    pub fn modify(&mut self, id: &str, patch: MethodPatch) -> BenchResult<()> {
        let position = self.position(id)?;
        self.methods[position].apply_patch(patch);
        Ok(())
    }

    /// Replaces `id` with one copy per variant, each with its parameter
    /// overrides applied. The copies take the original's position.
    pub fn expand(&mut self, id: &str, variants: Vec<MethodVariant>, keep_original: bool) -> BenchResult<()> {
        let position = self.position(id)?;
        let original = self.methods[position].clone();

        let mut seen: Vec<&str> = Vec::new();
        for variant in &variants {
            let collides_with_plan = self.has_method(&variant.id) && (variant.id != id || keep_original);
            if collides_with_plan || seen.contains(&variant.id.as_str()) {
                return Err(BenchError::DuplicateId {
                    id: variant.id.clone(),
                });
            }
            seen.push(&variant.id);
        }

        let expanded: Vec<MethodDescriptor> = variants
            .into_iter()
            .map(|variant| {
                let mut copy = original.with_id(variant.id);
                copy.apply_patch(MethodPatch {
                    params: variant.params,
                    ..MethodPatch::default()
                });
                copy
            })
            .collect();

        let insert_at = if keep_original { position + 1 } else { position };
        if !keep_original {
            self.methods.remove(position);
        }
        for (offset, method) in expanded.into_iter().enumerate() {
            self.methods.insert(insert_at + offset, method);
        }
        Ok(())
    }

    pub fn compare(&self, other: &BenchPlan) -> PlanComparison {
        let mut comparison = PlanComparison {
            same_data: self.data() == other.data(),
            ..PlanComparison::default()
        };

        for method in &self.methods {
            match other.method(method.id()) {
                None => comparison.only_in_self.push(method.id().to_string()),
                Some(theirs) if theirs.signature() != method.signature() => {
                    comparison.changed.push(method.id().to_string())
                }
                Some(_) => comparison.unchanged.push(method.id().to_string()),
            }
        }
        comparison.only_in_other = other
            .methods
            .iter()
            .filter(|m| !self.has_method(m.id()))
            .map(|m| m.id().to_string())
            .collect();

        comparison
    }

    pub fn snapshot(&self) -> PlanSnapshot {
        PlanSnapshot {
            data: self.data().cloned(),
            methods: self.methods.iter().map(MethodDescriptor::snapshot).collect(),
        }
    }

    pub fn restore(snapshot: &PlanSnapshot, catalog: &FunctionCatalog) -> BenchResult<Self> {
        let mut plan = Self::new();
        plan.set_data(snapshot.data.clone());
        for method in &snapshot.methods {
            plan.add(MethodDescriptor::restore(method, catalog)?)?;
        }
        Ok(plan)
    }

    fn position(&self, id: &str) -> BenchResult<usize> {
        self.methods
            .iter()
            .position(|m| m.id() == id)
            .ok_or_else(|| BenchError::NotFound { id: id.to_string() })
    }
}
