// Dataset and dynamic value model
pub mod dataset;
pub mod digest;
pub mod value;

pub use dataset::Dataset;
pub use value::Value;
