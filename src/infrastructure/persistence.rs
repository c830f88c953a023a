//! JSON persistence of result tables and benchmark plans.
//!
//! Callables are not serializable: a plan is stored as a [`PlanSnapshot`]
//! and re-bound through a [`FunctionCatalog`] on load. Result tables keep
//! their metric registrations by name and re-attach built-in metric
//! functions after loading.

use crate::domain::design::{BenchPlan, FunctionCatalog, PlanSnapshot};
use crate::domain::errors::{BenchError, BenchResult};
use crate::domain::results::ResultTable;
use anyhow::Context;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// A single JSON document on disk
pub struct JsonStore {
    file_path: PathBuf,
}

impl JsonStore {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn exists(&self) -> bool {
        self.file_path.exists()
    }

    pub fn load<T: DeserializeOwned>(&self) -> BenchResult<Option<T>> {
        if !self.file_path.exists() {
            return Ok(None);
        }

        let value = persistence(|| {
            let content = fs::read_to_string(&self.file_path)
                .with_context(|| format!("Failed to read {}", self.file_path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", self.file_path.display()))
        })?;

        info!("Loaded {:?}", self.file_path);
        Ok(Some(value))
    }

    pub fn save<T: Serialize>(&self, value: &T) -> BenchResult<()> {
        persistence(|| {
            if let Some(parent) = self.file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).context("Failed to create output directory")?;
            }
            let content = serde_json::to_string_pretty(value).context("Failed to serialize document")?;

            // Atomic write: write to temp file then rename
            let temp_path = self.file_path.with_extension("tmp");
            fs::write(&temp_path, content).context("Failed to write temp file")?;
            fs::rename(&temp_path, &self.file_path).context("Failed to rename temp file")?;
            Ok(())
        })?;

        info!("Saved {:?}", self.file_path);
        Ok(())
    }
}

pub fn save_table(path: impl Into<PathBuf>, table: &ResultTable) -> BenchResult<()> {
    JsonStore::new(path).save(table)
}

pub fn load_table(path: impl Into<PathBuf>) -> BenchResult<ResultTable> {
    let store = JsonStore::new(path);
    let mut table: ResultTable = store.load()?.ok_or_else(|| BenchError::Persistence {
        reason: format!("no result table at {}", store.path().display()),
    })?;
    table.rebind_builtin_metrics();
    Ok(table)
}

pub fn save_plan(path: impl Into<PathBuf>, plan: &BenchPlan) -> BenchResult<()> {
    JsonStore::new(path).save(&plan.snapshot())
}

pub fn load_plan(path: impl Into<PathBuf>, catalog: &FunctionCatalog) -> BenchResult<BenchPlan> {
    let store = JsonStore::new(path);
    let snapshot: PlanSnapshot = store.load()?.ok_or_else(|| BenchError::Persistence {
        reason: format!("no plan at {}", store.path().display()),
    })?;
    BenchPlan::restore(&snapshot, catalog)
}

fn persistence<T>(f: impl FnOnce() -> anyhow::Result<T>) -> BenchResult<T> {
    f().map_err(|e| BenchError::Persistence {
        reason: format!("{:#}", e),
    })
}
