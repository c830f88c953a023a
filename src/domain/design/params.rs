//! Deferred parameter expressions.
//!
//! Bound parameters are stored unevaluated and resolved against the plan's
//! dataset only when the method runs, so the same declaration can be
//! re-executed against replacement data.

use crate::domain::data::{Dataset, Value};
use crate::domain::design::callable::Transform;
use crate::domain::design::catalog::FunctionCatalog;
use crate::domain::errors::{BenchError, BenchResult};
use anyhow::{Context, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ParamExpr {
    /// Dataset column looked up by name at execution time
    Column(String),
    Literal(Value),
    /// Named transform over resolved arguments
    Apply {
        transform: Transform,
        args: Vec<ParamExpr>,
    },
}

/// Serializable form of [`ParamExpr`]; transforms are stored by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParamExprSnapshot {
    Column { column: String },
    Literal { value: Value },
    Apply { transform: String, args: Vec<ParamExprSnapshot> },
}

impl ParamExpr {
    pub fn column(name: impl Into<String>) -> Self {
        ParamExpr::Column(name.into())
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        ParamExpr::Literal(value.into())
    }

    pub fn apply(transform: Transform, args: Vec<ParamExpr>) -> Self {
        ParamExpr::Apply { transform, args }
    }

    /// Evaluates the expression with dataset columns visible by name.
    pub fn resolve(&self, data: &Dataset) -> anyhow::Result<Value> {
        match self {
            ParamExpr::Column(name) => data
                .column(name)
                .map(|values| Value::Vector(values.to_vec()))
                .ok_or_else(|| anyhow!("object '{}' not found in dataset", name)),
            ParamExpr::Literal(value) => Ok(value.clone()),
            ParamExpr::Apply { transform, args } => {
                let resolved = args
                    .iter()
                    .map(|arg| arg.resolve(data))
                    .collect::<anyhow::Result<Vec<_>>>()?;
                transform
                    .call(&resolved)
                    .with_context(|| format!("transform {} failed", transform.name()))
            }
        }
    }

    pub fn snapshot(&self) -> ParamExprSnapshot {
        match self {
            ParamExpr::Column(name) => ParamExprSnapshot::Column {
                column: name.clone(),
            },
            ParamExpr::Literal(value) => ParamExprSnapshot::Literal {
                value: value.clone(),
            },
            ParamExpr::Apply { transform, args } => ParamExprSnapshot::Apply {
                transform: transform.name().to_string(),
                args: args.iter().map(ParamExpr::snapshot).collect(),
            },
        }
    }

    pub fn restore(snapshot: &ParamExprSnapshot, catalog: &FunctionCatalog) -> BenchResult<Self> {
        Ok(match snapshot {
            ParamExprSnapshot::Column { column } => ParamExpr::Column(column.clone()),
            ParamExprSnapshot::Literal { value } => ParamExpr::Literal(value.clone()),
            ParamExprSnapshot::Apply { transform, args } => ParamExpr::Apply {
                transform: catalog.transform(transform).ok_or_else(|| {
                    BenchError::configuration(format!("unknown transform: {}", transform))
                })?,
                args: args
                    .iter()
                    .map(|arg| ParamExpr::restore(arg, catalog))
                    .collect::<BenchResult<Vec<_>>>()?,
            },
        })
    }
}

impl fmt::Display for ParamExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamExpr::Column(name) => write!(f, "{}", name),
            ParamExpr::Literal(value) => write!(f, "{}", value),
            ParamExpr::Apply { transform, args } => {
                let parts: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({})", transform.name(), parts.join(", "))
            }
        }
    }
}

/// Resolved parameter values handed to a method.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: BTreeMap<String, Value>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn require(&self, name: &str) -> anyhow::Result<&Value> {
        self.values
            .get(name)
            .ok_or_else(|| anyhow!("argument \"{}\" is missing, with no default", name))
    }

    pub fn numbers(&self, name: &str) -> anyhow::Result<Vec<f64>> {
        let value = self.require(name)?;
        value
            .as_numbers()
            .ok_or_else(|| anyhow!("argument \"{}\" must be a vector, got {}", name, value.type_name()))
    }

    pub fn number(&self, name: &str) -> anyhow::Result<f64> {
        match self.require(name)?.as_f64() {
            Some(n) => Ok(n),
            None => bail!("argument \"{}\" must be a number", name),
        }
    }

    pub fn text(&self, name: &str) -> anyhow::Result<&str> {
        match self.require(name)?.as_str() {
            Some(s) => Ok(s),
            None => bail!("argument \"{}\" must be text", name),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Resolves every bound parameter of a method against the dataset.
pub fn resolve_params(bound: &BTreeMap<String, ParamExpr>, data: &Dataset) -> anyhow::Result<Params> {
    let mut params = Params::new();
    for (name, expr) in bound {
        let value = expr
            .resolve(data)
            .with_context(|| format!("failed to resolve parameter {}", name))?;
        params.values.insert(name.clone(), value);
    }
    Ok(params)
}
