// Benchmark design: method declarations and the plan that holds them
pub mod callable;
pub mod catalog;
pub mod method;
pub mod params;
pub mod plan;

pub use callable::{MethodCallable, PostCallable, Transform};
pub use catalog::FunctionCatalog;
pub use method::{MethodDescriptor, MethodPatch, PostStep};
pub use params::{ParamExpr, Params};
pub use plan::{BenchPlan, MethodVariant, PlanComparison, PlanSnapshot};
