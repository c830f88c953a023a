// Dataset import/export
pub mod csv_dataset;

// Environment and provenance adapters for the execution engine
pub mod environment;
pub mod provenance;

pub mod persistence;

pub use environment::SystemEnvironment;
pub use persistence::JsonStore;
pub use provenance::{NoProvenance, StaticProvenance};
