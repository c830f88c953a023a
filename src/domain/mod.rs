// Dataset and value model
pub mod data;

// Benchmark design: methods, parameters, plans
pub mod design;

// Domain-specific error types
pub mod errors;

// Performance metrics
pub mod performance;

// Port interfaces
pub mod ports;

// Result tables
pub mod results;

// Execution history
pub mod session;
