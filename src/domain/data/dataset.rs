use crate::domain::data::digest::digest;
use crate::domain::data::value::Value;
use crate::domain::errors::{BenchError, BenchResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

/// Named columns of equal length shared read-only by every method of a plan.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dataset {
    columns: Vec<Column>,
    n_rows: usize,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a column. The first column fixes the row count.
    pub fn with_column(mut self, name: impl Into<String>, values: impl Into<Vec<Value>>) -> BenchResult<Self> {
        self.push_column(name, values)?;
        Ok(self)
    }

    pub fn push_column(&mut self, name: impl Into<String>, values: impl Into<Vec<Value>>) -> BenchResult<()> {
        let name = name.into();
        let values = values.into();

        if self.has_column(&name) {
            return Err(BenchError::configuration(format!(
                "duplicate dataset column: {}",
                name
            )));
        }
        if !self.columns.is_empty() && values.len() != self.n_rows {
            return Err(BenchError::configuration(format!(
                "column {} has {} rows, dataset has {}",
                name,
                values.len(),
                self.n_rows
            )));
        }

        self.n_rows = values.len();
        self.columns.push(Column { name, values });
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Content hash used to detect that a plan's data changed between sessions.
    pub fn fingerprint(&self) -> String {
        digest(self)
    }
}
