//! Configuration for benchdesign.
//!
//! Execution defaults come from environment variables (a `.env` file is
//! loaded by the binary first). Metric parameter grids can be read from TOML.

use crate::domain::performance::ParamGrid;
use anyhow::{Context, Result, bail};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_OUTPUT_DIR: &str = "benchmark_results";

/// Execution defaults shared by the binary and library callers
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub parallel: bool,
    pub workers: usize,
    pub timeout_secs: Option<f64>,
    pub catch_errors: bool,
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            parallel: false,
            workers: available_workers(),
            timeout_secs: None,
            catch_errors: true,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let parallel = parse_or(&lookup, "BENCH_PARALLEL", defaults.parallel)?;
        let workers = parse_or(&lookup, "BENCH_WORKERS", defaults.workers)?;
        if workers == 0 {
            bail!("BENCH_WORKERS must be at least 1");
        }

        let timeout_secs = match lookup("BENCH_TIMEOUT_SECS") {
            Some(raw) => {
                let secs = raw
                    .trim()
                    .parse::<f64>()
                    .context("Failed to parse BENCH_TIMEOUT_SECS - must be a number of seconds")?;
                if secs <= 0.0 || Duration::try_from_secs_f64(secs).is_err() {
                    bail!("BENCH_TIMEOUT_SECS must be positive, got {}", raw);
                }
                Some(secs)
            }
            None => None,
        };

        let catch_errors = parse_or(&lookup, "BENCH_CATCH_ERRORS", defaults.catch_errors)?;
        let output_dir = lookup("BENCH_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.output_dir);

        Ok(Self {
            parallel,
            workers,
            timeout_secs,
            catch_errors,
            output_dir,
        })
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .to_lowercase()
            .parse::<T>()
            .with_context(|| format!("Failed to parse {}={}", key, raw)),
        None => Ok(default),
    }
}

fn available_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Loads a metric parameter grid (`alpha = [0.01, 0.05]`) from a TOML file.
pub fn load_grid_from_toml(path: &Path) -> Result<ParamGrid> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read grid config file: {}", path.display()))?;
    parse_grid(&content).with_context(|| format!("Failed to parse grid config TOML: {}", path.display()))
}

pub fn parse_grid(content: &str) -> Result<ParamGrid> {
    let grid: ParamGrid = toml::from_str(content)?;
    Ok(grid)
}
