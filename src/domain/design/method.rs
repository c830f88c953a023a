use crate::domain::data::Value;
use crate::domain::data::digest::digest;
use crate::domain::design::callable::{MethodCallable, PostCallable};
use crate::domain::design::catalog::FunctionCatalog;
use crate::domain::design::params::{ParamExpr, ParamExprSnapshot};
use crate::domain::errors::{BenchError, BenchResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named post-processing step of a method
#[derive(Debug, Clone, PartialEq)]
pub struct PostStep {
    pub name: String,
    pub func: PostCallable,
}

/// One entry under comparison: a callable, its bound parameters and the
/// post-processing steps whose outputs become result layers.
#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    id: String,
    callable: MethodCallable,
    params: BTreeMap<String, ParamExpr>,
    post_steps: Vec<PostStep>,
    metadata: BTreeMap<String, Value>,
}

/// Serializable form of a descriptor. Functions are referenced by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodSnapshot {
    pub id: String,
    pub callable: String,
    pub params: BTreeMap<String, ParamExprSnapshot>,
    pub post_steps: Vec<PostStepSnapshot>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostStepSnapshot {
    pub name: String,
    pub func: String,
}

/// Fields that decide whether a cached result is still valid.
#[derive(Serialize)]
struct SignatureView<'a> {
    callable: &'a str,
    params: &'a BTreeMap<String, ParamExprSnapshot>,
    post_steps: &'a [PostStepSnapshot],
}

impl MethodDescriptor {
    pub fn new(id: impl Into<String>, callable: MethodCallable) -> Self {
        Self {
            id: id.into(),
            callable,
            params: BTreeMap::new(),
            post_steps: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, expr: ParamExpr) -> Self {
        self.params.insert(name.into(), expr);
        self
    }

    /// Adds a post-step, replacing any earlier step with the same name in place.
    pub fn post_step(mut self, name: impl Into<String>, func: PostCallable) -> Self {
        self.set_post_step(PostStep {
            name: name.into(),
            func,
        });
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn callable(&self) -> &MethodCallable {
        &self.callable
    }

    pub fn params(&self) -> &BTreeMap<String, ParamExpr> {
        &self.params
    }

    /// Declared post-steps, without the implicit default.
    pub fn post_steps(&self) -> &[PostStep] {
        &self.post_steps
    }

    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    /// Post-steps as executed: the declared ones, or a single identity step
    /// named after the method when none were declared.
    ///
    /// Each step name is a result layer, so methods relying on the implicit
    /// step never share a layer; declare a common step name (e.g. `"default"`)
    /// to put several methods side by side in one layer.
    pub fn effective_post_steps(&self) -> Vec<PostStep> {
        if self.post_steps.is_empty() {
            vec![PostStep {
                name: self.id.clone(),
                func: PostCallable::identity(),
            }]
        } else {
            self.post_steps.clone()
        }
    }

    pub fn layer_names(&self) -> Vec<String> {
        self.effective_post_steps()
            .into_iter()
            .map(|step| step.name)
            .collect()
    }

    /// Human readable parameter listing for the method info table.
    pub fn param_summary(&self) -> BTreeMap<String, String> {
        self.params
            .iter()
            .map(|(name, expr)| (name.clone(), expr.to_string()))
            .collect()
    }

    pub fn snapshot(&self) -> MethodSnapshot {
        MethodSnapshot {
            id: self.id.clone(),
            callable: self.callable.name().to_string(),
            params: self
                .params
                .iter()
                .map(|(name, expr)| (name.clone(), expr.snapshot()))
                .collect(),
            post_steps: self
                .post_steps
                .iter()
                .map(|step| PostStepSnapshot {
                    name: step.name.clone(),
                    func: step.func.name().to_string(),
                })
                .collect(),
            metadata: self.metadata.clone(),
        }
    }

    /// Change-detection key: callable name, bound parameter expressions and
    /// ordered post-steps. The id and metadata do not take part.
    pub fn signature(&self) -> String {
        let snapshot = self.snapshot();
        digest(&SignatureView {
            callable: &snapshot.callable,
            params: &snapshot.params,
            post_steps: &snapshot.post_steps,
        })
    }

    pub fn restore(snapshot: &MethodSnapshot, catalog: &FunctionCatalog) -> BenchResult<Self> {
        let callable = catalog.method(&snapshot.callable).ok_or_else(|| {
            BenchError::configuration(format!(
                "method {} references unknown callable {}",
                snapshot.id, snapshot.callable
            ))
        })?;

        let mut descriptor = Self::new(snapshot.id.clone(), callable);
        for (name, expr) in &snapshot.params {
            descriptor
                .params
                .insert(name.clone(), ParamExpr::restore(expr, catalog)?);
        }
        for step in &snapshot.post_steps {
            let func = catalog.post_step(&step.func).ok_or_else(|| {
                BenchError::configuration(format!(
                    "method {} references unknown post-step function {}",
                    snapshot.id, step.func
                ))
            })?;
            descriptor.set_post_step(PostStep {
                name: step.name.clone(),
                func,
            });
        }
        descriptor.metadata = snapshot.metadata.clone();
        Ok(descriptor)
    }

    pub(crate) fn with_id(&self, id: impl Into<String>) -> Self {
        let mut copy = self.clone();
        copy.id = id.into();
        copy
    }

    pub(crate) fn apply_patch(&mut self, patch: MethodPatch) {
        if let Some(callable) = patch.callable {
            self.callable = callable;
        }
        if patch.replace_params {
            self.params.clear();
        }
        self.params.extend(patch.params);
        if let Some(steps) = patch.post_steps {
            self.post_steps.clear();
            for step in steps {
                self.set_post_step(step);
            }
        }
        self.metadata.extend(patch.metadata);
    }

    fn set_post_step(&mut self, step: PostStep) {
        match self.post_steps.iter_mut().find(|s| s.name == step.name) {
            Some(existing) => *existing = step,
            None => self.post_steps.push(step),
        }
    }
}

impl PartialEq for MethodDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.snapshot() == other.snapshot()
    }
}

/// Partial update for an existing method.
///
/// Parameters and metadata are merged into the existing ones unless
/// `replace_params` is set; post-steps, when given, replace the whole list.
#[derive(Debug, Clone, Default)]
pub struct MethodPatch {
    pub callable: Option<MethodCallable>,
    pub params: BTreeMap<String, ParamExpr>,
    pub replace_params: bool,
    pub post_steps: Option<Vec<PostStep>>,
    pub metadata: BTreeMap<String, Value>,
}

impl MethodPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callable(mut self, callable: MethodCallable) -> Self {
        self.callable = Some(callable);
        self
    }

    pub fn param(mut self, name: impl Into<String>, expr: ParamExpr) -> Self {
        self.params.insert(name.into(), expr);
        self
    }

    pub fn replace_params(mut self) -> Self {
        self.replace_params = true;
        self
    }

    pub fn post_steps(mut self, steps: Vec<PostStep>) -> Self {
        self.post_steps = Some(steps);
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adjust() -> MethodCallable {
        MethodCallable::method("adjust", |params| Ok(params.require("p")?.clone()))
    }

    fn descriptor(id: &str, method: &str) -> MethodDescriptor {
        MethodDescriptor::new(id, adjust())
            .param("p", ParamExpr::column("pval"))
            .param("method", ParamExpr::literal(method))
    }

    #[test]
    fn test_implicit_post_step_named_after_method() {
        let d = descriptor("bh", "BH");
        let steps = d.effective_post_steps();

        assert!(d.post_steps().is_empty());
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].name, "bh");
        assert_eq!(steps[0].func.name(), "identity");
    }

    #[test]
    fn test_signature_ignores_id_and_metadata() {
        let a = descriptor("bh", "BH");
        let b = descriptor("bh2", "BH").meta("note", "renamed");

        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn test_signature_tracks_params_callable_and_post_steps() {
        let base = descriptor("m", "BH");

        assert_ne!(base.signature(), descriptor("m", "bonferroni").signature());

        let other_callable = MethodDescriptor::new(
            "m",
            MethodCallable::method("adjust2", |_| Ok(Value::Null)),
        )
        .param("p", ParamExpr::column("pval"))
        .param("method", ParamExpr::literal("BH"));
        assert_ne!(base.signature(), other_callable.signature());

        let with_step = base.clone().post_step("raw", PostCallable::identity());
        assert_ne!(base.signature(), with_step.signature());
    }

    #[test]
    fn test_post_step_replaced_in_place() {
        let d = descriptor("m", "BH")
            .post_step("a", PostCallable::identity())
            .post_step("b", PostCallable::identity())
            .post_step("a", PostCallable::post("neg", |v| Ok(v.clone())));

        let names: Vec<&str> = d.post_steps().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(d.post_steps()[0].func.name(), "neg");
    }

    #[test]
    fn test_snapshot_restore_through_catalog() {
        let mut catalog = FunctionCatalog::new();
        catalog.register_method(adjust()).unwrap();

        let d = descriptor("bh", "BH")
            .post_step("raw", PostCallable::identity())
            .meta("family", "fdr");
        let restored = MethodDescriptor::restore(&d.snapshot(), &catalog).unwrap();

        assert_eq!(restored, d);
        assert_eq!(restored.signature(), d.signature());
    }

    #[test]
    fn test_restore_unknown_callable_is_configuration_error() {
        let catalog = FunctionCatalog::new();
        let err = MethodDescriptor::restore(&descriptor("bh", "BH").snapshot(), &catalog).unwrap_err();
        assert!(matches!(err, BenchError::Configuration { .. }));
    }

    #[test]
    fn test_patch_merges_params_and_metadata() {
        let mut d = descriptor("m", "BH").meta("a", 1.0);
        d.apply_patch(
            MethodPatch::new()
                .param("method", ParamExpr::literal("BY"))
                .meta("b", 2.0),
        );

        assert_eq!(d.params().len(), 2);
        assert_eq!(d.param_summary()["method"], "\"BY\"");
        assert_eq!(d.metadata().len(), 2);

        d.apply_patch(MethodPatch::new().replace_params().param("q", ParamExpr::literal(0.1)));
        assert_eq!(d.params().len(), 1);
    }
}
