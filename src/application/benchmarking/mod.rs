pub mod reporting;
pub mod timer;

pub use reporting::BenchmarkReporter;
pub use timer::BenchmarkTimer;
