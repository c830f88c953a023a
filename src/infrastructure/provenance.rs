use crate::domain::ports::{Provenance, ProvenanceLookup};
use anyhow::{Result, bail};
use std::collections::HashMap;

/// Provenance table filled in by the caller when callables are registered.
#[derive(Debug, Clone, Default)]
pub struct StaticProvenance {
    entries: HashMap<String, Provenance>,
}

impl StaticProvenance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, callable: impl Into<String>, package: impl Into<String>, version: impl Into<String>) -> Self {
        self.entries.insert(
            callable.into(),
            Provenance {
                package: Some(package.into()),
                version: Some(version.into()),
            },
        );
        self
    }
}

impl ProvenanceLookup for StaticProvenance {
    fn lookup(&self, callable: &str) -> Result<Provenance> {
        match self.entries.get(callable) {
            Some(provenance) => Ok(provenance.clone()),
            None => bail!("no provenance recorded for {}", callable),
        }
    }
}

/// Lookup that never knows anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProvenance;

impl ProvenanceLookup for NoProvenance {
    fn lookup(&self, _callable: &str) -> Result<Provenance> {
        Ok(Provenance::default())
    }
}
