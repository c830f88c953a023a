//! Ready-made benchmark methods, post-steps and transforms.

pub mod pvalue;

pub use pvalue::{AdjustMethod, adjust};

use crate::domain::data::Value;
use crate::domain::design::{FunctionCatalog, MethodCallable, PostCallable, Transform};
use crate::domain::errors::BenchResult;
use anyhow::{Context, bail};

/// `adjust(p, method)`: multiple-testing adjustment of a p-value vector.
pub fn adjust_method() -> MethodCallable {
    MethodCallable::method("adjust", |params| {
        let p = params.numbers("p")?;
        let method: AdjustMethod = params.text("method")?.parse()?;
        Ok(Value::from(adjust(&p, method)))
    })
}

/// Post-step flagging values at or below `cutoff`; missing values stay missing.
pub fn threshold_step(cutoff: f64) -> PostCallable {
    PostCallable::post(format!("threshold({})", cutoff), move |value| {
        let Some(items) = value.as_vector() else {
            bail!("threshold expects a vector, got {}", value.type_name());
        };
        Ok(Value::Vector(
            items
                .iter()
                .map(|v| match v.as_f64() {
                    Some(x) => Value::Bool(x <= cutoff),
                    None => Value::Null,
                })
                .collect(),
        ))
    })
}

/// `fill_missing(x, fill)`: replaces missing cells of `x` with `fill`.
pub fn fill_missing() -> Transform {
    Transform::transform("fill_missing", |args| {
        let [x, fill] = args else {
            bail!("fill_missing takes 2 arguments, got {}", args.len());
        };
        let items = x.as_vector().context("fill_missing expects a vector")?;
        Ok(Value::Vector(
            items
                .iter()
                .map(|v| if v.is_missing() { fill.clone() } else { v.clone() })
                .collect(),
        ))
    })
}

/// Catalog with the built-in methods, post-steps and transforms registered.
pub fn default_catalog() -> BenchResult<FunctionCatalog> {
    let mut catalog = FunctionCatalog::new();
    catalog.register_method(adjust_method())?;
    catalog.register_transform(fill_missing())?;
    Ok(catalog)
}
