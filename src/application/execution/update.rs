//! Change detection for incremental re-execution.
//!
//! A method is re-run when it is new, when its signature (callable name,
//! bound parameter expressions, post-steps) differs from the one recorded
//! at its last execution, when any of its outcomes in the last session it
//! ran in was an error, or when the dataset content changed. Everything
//! else is carried over from the existing table.

use crate::domain::data::Dataset;
use crate::domain::design::BenchPlan;
use crate::domain::results::ResultTable;
use crate::domain::session::Outcome;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunReason {
    New,
    Changed,
    PreviouslyFailed,
    DataChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateAction {
    Run(RunReason),
    Reuse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodUpdate {
    pub id: String,
    pub action: UpdateAction,
}

/// Dry-run view of what an incremental execution would do
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdatePlan {
    /// Plan methods in declaration order
    pub methods: Vec<MethodUpdate>,
    /// Table methods absent from the plan that stay in the table
    pub kept: Vec<String>,
    /// Table methods absent from the plan that will be removed
    pub dropped: Vec<String>,
}

impl UpdatePlan {
    pub fn should_run(&self, id: &str) -> bool {
        self.methods
            .iter()
            .any(|m| m.id == id && matches!(m.action, UpdateAction::Run(_)))
    }

    pub fn to_run(&self) -> Vec<&str> {
        self.methods
            .iter()
            .filter(|m| matches!(m.action, UpdateAction::Run(_)))
            .map(|m| m.id.as_str())
            .collect()
    }

    pub fn is_noop(&self) -> bool {
        self.to_run().is_empty() && self.dropped.is_empty()
    }
}

pub fn plan_update(plan: &BenchPlan, data: &Dataset, table: &ResultTable, keep_all: bool) -> UpdatePlan {
    let data_changed = table.dataset_fingerprint() != Some(data.fingerprint().as_str());

    let methods = plan
        .list()
        .iter()
        .map(|method| {
            let action = match table.method(method.id()) {
                _ if data_changed => UpdateAction::Run(RunReason::DataChanged),
                None => UpdateAction::Run(RunReason::New),
                Some(info) if info.signature != method.signature() => {
                    UpdateAction::Run(RunReason::Changed)
                }
                Some(_) if previously_failed(table, method.id()) => {
                    UpdateAction::Run(RunReason::PreviouslyFailed)
                }
                Some(_) => UpdateAction::Reuse,
            };
            MethodUpdate {
                id: method.id().to_string(),
                action,
            }
        })
        .collect();

    let (kept, dropped): (Vec<String>, Vec<String>) = table
        .method_ids()
        .into_iter()
        .filter(|id| !plan.has_method(id))
        .map(str::to_string)
        .partition(|_| keep_all);

    UpdatePlan {
        methods,
        kept,
        dropped,
    }
}

fn previously_failed(table: &ResultTable, id: &str) -> bool {
    table
        .latest_outcomes(id)
        .map(|outcomes| outcomes.values().any(Outcome::is_error))
        .unwrap_or(true)
}
