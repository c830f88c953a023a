// Benchmark result table
pub mod result_table;

pub use result_table::{Layer, MethodInfo, ResultTable, StoredMetric};
