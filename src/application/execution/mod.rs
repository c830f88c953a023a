// Benchmark execution: fault-isolated invocation, options, change detection
pub mod engine;
pub mod invoker;
pub mod options;
pub mod update;

pub use engine::ExecutionEngine;
pub use invoker::InvocationFailure;
pub use options::ExecutionOptions;
pub use update::{MethodUpdate, RunReason, UpdateAction, UpdatePlan};
