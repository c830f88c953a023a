use crate::domain::session::EnvironmentInfo;
use anyhow::Result;

/// Captures session environment metadata (timestamp, software versions).
pub trait EnvironmentProvider: Send + Sync {
    fn capture(&self) -> EnvironmentInfo;
}

/// Software provenance of a callable
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provenance {
    pub package: Option<String>,
    pub version: Option<String>,
}

/// Best-effort lookup of where a callable comes from. Failures never fail a
/// benchmark; the provenance fields are simply left unset.
pub trait ProvenanceLookup: Send + Sync {
    fn lookup(&self, callable: &str) -> Result<Provenance>;
}
