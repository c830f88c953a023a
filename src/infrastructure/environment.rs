use crate::domain::ports::EnvironmentProvider;
use crate::domain::session::EnvironmentInfo;
use chrono::Utc;
use std::collections::BTreeMap;

/// Environment of the running process: build metadata of this crate plus
/// the host platform.
#[derive(Debug, Clone, Default)]
pub struct SystemEnvironment {
    extra: BTreeMap<String, String>,
}

impl SystemEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a fixed entry recorded with every session (e.g. a dataset version).
    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

impl EnvironmentProvider for SystemEnvironment {
    fn capture(&self) -> EnvironmentInfo {
        let mut extra = self.extra.clone();
        if let Ok(threads) = std::thread::available_parallelism() {
            extra.insert("available_parallelism".to_string(), threads.to_string());
        }

        EnvironmentInfo {
            timestamp: Utc::now(),
            package: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            extra,
        }
    }
}
