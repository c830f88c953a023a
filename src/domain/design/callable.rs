//! Named function references.
//!
//! A callable is identified by its registered name: two callables with the
//! same name are considered the same function when comparing method
//! definitions, and saved plans refer to callables by that name.

use crate::domain::data::Value;
use crate::domain::design::params::Params;
use std::fmt;
use std::sync::Arc;

/// Main benchmark function: resolved parameters in, raw output out.
pub type MethodFn = dyn Fn(&Params) -> anyhow::Result<Value> + Send + Sync;

/// Post-processing step applied to a method's raw output.
pub type PostFn = dyn Fn(&Value) -> anyhow::Result<Value> + Send + Sync;

/// Transform used inside parameter expressions.
pub type TransformFn = dyn Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync;

pub struct Callable<F: ?Sized> {
    name: String,
    func: Arc<F>,
}

pub type MethodCallable = Callable<MethodFn>;
pub type PostCallable = Callable<PostFn>;
pub type Transform = Callable<TransformFn>;

impl<F: ?Sized> Callable<F> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<F: ?Sized> Clone for Callable<F> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            func: Arc::clone(&self.func),
        }
    }
}

impl<F: ?Sized> PartialEq for Callable<F> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl<F: ?Sized> fmt::Debug for Callable<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callable({})", self.name)
    }
}

impl Callable<MethodFn> {
    pub fn method<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Params) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn call(&self, params: &Params) -> anyhow::Result<Value> {
        (self.func)(params)
    }
}

impl Callable<PostFn> {
    pub fn post<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Default post-step: stores the raw output unchanged.
    pub fn identity() -> Self {
        Self::post("identity", |value| Ok(value.clone()))
    }

    pub fn call(&self, value: &Value) -> anyhow::Result<Value> {
        (self.func)(value)
    }
}

impl Callable<TransformFn> {
    pub fn transform<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn call(&self, args: &[Value]) -> anyhow::Result<Value> {
        (self.func)(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_by_name() {
        let a = Callable::post("neg", |v| Ok(v.clone()));
        let b = Callable::post("neg", |_| Ok(Value::Null));
        let c = Callable::post("abs", |v| Ok(v.clone()));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(format!("{:?}", a), "Callable(neg)");
    }

    #[test]
    fn test_identity_step_returns_input() {
        let step = PostCallable::identity();
        let out = step.call(&Value::from(vec![1.0, 2.0])).unwrap();
        assert_eq!(out, Value::from(vec![1.0, 2.0]));
    }
}
