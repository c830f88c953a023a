use std::time::Instant;
use tracing::info;

/// Logs the elapsed wall time of a scope when dropped.
///
/// ```
/// use benchdesign::application::benchmarking::timer::BenchmarkTimer;
///
/// {
///     let _timer = BenchmarkTimer::new("session");
///     // ... run methods ...
/// } // elapsed time logged here
/// ```
pub struct BenchmarkTimer {
    start: Instant,
    label: String,
}

impl BenchmarkTimer {
    pub fn new(label: &str) -> Self {
        info!("⏱️  Starting: {}", label);
        Self {
            start: Instant::now(),
            label: label.to_string(),
        }
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Drop for BenchmarkTimer {
    fn drop(&mut self) {
        info!("⏱️  Completed: {} in {:.2}s", self.label, self.elapsed_seconds());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_increases() {
        let timer = BenchmarkTimer::new("test");
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(timer.elapsed_seconds() > 0.0);
    }
}
