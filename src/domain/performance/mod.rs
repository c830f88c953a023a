// Performance metrics over result layers
pub mod builtin;
pub mod evaluator;
pub mod metric;

pub use builtin::{available_metrics, builtin_metric};
pub use evaluator::{EvaluateOptions, MetricEvaluator, MetricRow, MetricsTable, ParamGrid, WideMetrics};
pub use metric::{MetricFunction, MetricParams, MetricRegistration, ParamDecl};
