// Session summaries, metric tables and timing
pub mod benchmarking;

// Execution engine
pub mod execution;

// Ready-made methods and post-steps
pub mod methods;
