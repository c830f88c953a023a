//! Built-in performance metrics for p-value style outputs.
//!
//! A value at or below `alpha` counts as a rejection (a called positive) and
//! a truth value other than zero/false counts as an actual positive. Rows
//! with a missing query or truth are ignored.

use crate::domain::performance::metric::{MetricFunction, MetricParams};

pub const DEFAULT_ALPHA: f64 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub struct MetricDescription {
    pub name: &'static str,
    pub description: &'static str,
}

/// Confusion counts at one significance level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Confusion {
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    pub fn_: usize,
}

impl Confusion {
    pub fn at(query: &[f64], truth: &[f64], alpha: f64) -> Self {
        let mut counts = Confusion::default();
        for (q, t) in query.iter().zip(truth) {
            if q.is_nan() || t.is_nan() {
                continue;
            }
            let called = *q <= alpha;
            let positive = *t != 0.0;
            match (called, positive) {
                (true, true) => counts.tp += 1,
                (true, false) => counts.fp += 1,
                (false, false) => counts.tn += 1,
                (false, true) => counts.fn_ += 1,
            }
        }
        counts
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        f64::NAN
    } else {
        numerator as f64 / denominator as f64
    }
}

pub fn available_metrics() -> Vec<MetricDescription> {
    vec![
        MetricDescription {
            name: "rejections",
            description: "Number of values at or below alpha",
        },
        MetricDescription {
            name: "TPR",
            description: "True positive rate (sensitivity)",
        },
        MetricDescription {
            name: "TNR",
            description: "True negative rate (specificity)",
        },
        MetricDescription {
            name: "FDR",
            description: "False discovery rate",
        },
        MetricDescription {
            name: "FNR",
            description: "False negative rate",
        },
    ]
}

/// Looks up a built-in metric by name.
pub fn builtin_metric(name: &str) -> Option<MetricFunction> {
    let body: fn(&[f64], &[f64], f64) -> f64 = match name {
        "rejections" => |query: &[f64], _: &[f64], alpha: f64| {
            query.iter().filter(|q| !q.is_nan() && **q <= alpha).count() as f64
        },
        "TPR" => |query: &[f64], truth: &[f64], alpha: f64| {
            let c = Confusion::at(query, truth, alpha);
            ratio(c.tp, c.tp + c.fn_)
        },
        "TNR" => |query: &[f64], truth: &[f64], alpha: f64| {
            let c = Confusion::at(query, truth, alpha);
            ratio(c.tn, c.tn + c.fp)
        },
        "FDR" => |query: &[f64], truth: &[f64], alpha: f64| {
            let c = Confusion::at(query, truth, alpha);
            ratio(c.fp, (c.tp + c.fp).max(1))
        },
        "FNR" => |query: &[f64], truth: &[f64], alpha: f64| {
            let c = Confusion::at(query, truth, alpha);
            ratio(c.fn_, c.fn_ + c.tp)
        },
        _ => return None,
    };

    Some(
        MetricFunction::new(move |query, truth, params: &MetricParams| {
            let alpha = params.get("alpha").unwrap_or(DEFAULT_ALPHA);
            Ok(body(query, truth, alpha))
        })
        .with_bounded_param("alpha", DEFAULT_ALPHA, 0.0, 1.0),
    )
}
