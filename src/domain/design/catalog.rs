use crate::domain::design::callable::{MethodCallable, PostCallable, Transform};
use crate::domain::errors::{BenchError, BenchResult};
use std::collections::HashMap;

/// Registry of named functions used to re-bind saved plans.
#[derive(Debug, Clone, Default)]
pub struct FunctionCatalog {
    methods: HashMap<String, MethodCallable>,
    post_steps: HashMap<String, PostCallable>,
    transforms: HashMap<String, Transform>,
}

impl FunctionCatalog {
    pub fn new() -> Self {
        let mut catalog = Self::default();
        catalog
            .post_steps
            .insert("identity".to_string(), PostCallable::identity());
        catalog
    }

    pub fn register_method(&mut self, callable: MethodCallable) -> BenchResult<()> {
        insert_unique(&mut self.methods, callable.name().to_string(), callable, "method")
    }

    pub fn register_post_step(&mut self, callable: PostCallable) -> BenchResult<()> {
        insert_unique(&mut self.post_steps, callable.name().to_string(), callable, "post-step")
    }

    pub fn register_transform(&mut self, transform: Transform) -> BenchResult<()> {
        insert_unique(&mut self.transforms, transform.name().to_string(), transform, "transform")
    }

    pub fn method(&self, name: &str) -> Option<MethodCallable> {
        self.methods.get(name).cloned()
    }

    pub fn post_step(&self, name: &str) -> Option<PostCallable> {
        self.post_steps.get(name).cloned()
    }

    pub fn transform(&self, name: &str) -> Option<Transform> {
        self.transforms.get(name).cloned()
    }

    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn insert_unique<T>(map: &mut HashMap<String, T>, name: String, item: T, kind: &str) -> BenchResult<()> {
    if map.contains_key(&name) {
        return Err(BenchError::configuration(format!(
            "{} {} is already registered",
            kind, name
        )));
    }
    map.insert(name, item);
    Ok(())
}
