//! Benchmark execution engine.
//!
//! Each method is one unit of work: resolve its parameters, invoke it, then
//! run each post-step on the raw output. Units run sequentially or on a
//! fixed-size rayon pool; their results land in private per-method slots and
//! are merged into the result table on the calling thread once every unit
//! has finished, so column order always follows the plan.

use crate::application::benchmarking::timer::BenchmarkTimer;
use crate::application::execution::invoker::{InvocationFailure, invoke};
use crate::application::execution::options::ExecutionOptions;
use crate::application::execution::update::{UpdatePlan, plan_update};
use crate::domain::data::{Dataset, Value};
use crate::domain::design::params::resolve_params;
use crate::domain::design::{BenchPlan, MethodCallable, MethodDescriptor, ParamExpr, PostStep};
use crate::domain::errors::{BenchError, BenchResult};
use crate::domain::ports::{EnvironmentProvider, Provenance, ProvenanceLookup};
use crate::domain::results::{MethodInfo, ResultTable};
use crate::domain::session::{ErrorDetail, ErrorOrigin, Outcome, SessionLog, SessionParameters};
use crate::infrastructure::environment::SystemEnvironment;
use crate::infrastructure::provenance::NoProvenance;
use anyhow::bail;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Work item for one method, owning everything the worker needs
struct MethodJob {
    id: String,
    callable: MethodCallable,
    params: BTreeMap<String, ParamExpr>,
    steps: Vec<PostStep>,
}

impl MethodJob {
    fn from_descriptor(method: &MethodDescriptor) -> Self {
        Self {
            id: method.id().to_string(),
            callable: method.callable().clone(),
            params: method.params().clone(),
            steps: method.effective_post_steps(),
        }
    }
}

#[derive(Debug, Clone)]
struct StepFailure {
    origin: ErrorOrigin,
    failure: InvocationFailure,
}

impl StepFailure {
    fn detail(&self, step: &str) -> ErrorDetail {
        match self.origin {
            ErrorOrigin::Main => ErrorDetail::main(self.failure.message()),
            ErrorOrigin::PostProcess => ErrorDetail::post_process(step, self.failure.message()),
        }
    }

    fn to_error(&self, method: &str, step: &str) -> BenchError {
        let post_step = (self.origin == ErrorOrigin::PostProcess).then(|| step.to_string());
        match &self.failure {
            InvocationFailure::TimedOut(limit) => BenchError::Timeout {
                method: match &post_step {
                    Some(step) => format!("{} ({})", method, step),
                    None => method.to_string(),
                },
                seconds: limit.as_secs_f64(),
            },
            other => BenchError::MethodExecution {
                method: method.to_string(),
                post_step,
                message: other.message(),
            },
        }
    }
}

struct StepRun {
    name: String,
    result: Result<Vec<Value>, StepFailure>,
}

struct MethodRun {
    id: String,
    steps: Vec<StepRun>,
}

impl MethodRun {
    fn first_failure(&self) -> Option<BenchError> {
        self.steps.iter().find_map(|step| {
            step.result
                .as_ref()
                .err()
                .map(|failure| failure.to_error(&self.id, &step.name))
        })
    }
}

pub struct ExecutionEngine {
    environment: Arc<dyn EnvironmentProvider>,
    provenance: Arc<dyn ProvenanceLookup>,
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new(Arc::new(SystemEnvironment::default()), Arc::new(NoProvenance))
    }
}

impl ExecutionEngine {
    pub fn new(environment: Arc<dyn EnvironmentProvider>, provenance: Arc<dyn ProvenanceLookup>) -> Self {
        Self {
            environment,
            provenance,
        }
    }

    /// Runs every method of the plan and builds a fresh result table.
    ///
    /// With `catch_errors` disabled the first failure is returned and no
    /// table is produced.
    pub fn execute(&self, plan: &BenchPlan, options: &ExecutionOptions) -> BenchResult<(ResultTable, SessionLog)> {
        self.run(plan, options, None)
    }

    /// Incremental execution: re-runs only new, changed or previously failed
    /// methods and carries the rest over from `existing` into a new table.
    /// `existing` is left untouched when the update fails.
    pub fn update(
        &self,
        plan: &BenchPlan,
        existing: &ResultTable,
        options: &ExecutionOptions,
    ) -> BenchResult<(ResultTable, SessionLog)> {
        self.run(plan, options, Some(existing))
    }

    /// Reports what [`ExecutionEngine::update`] would do without running anything.
    pub fn plan_update(&self, plan: &BenchPlan, existing: &ResultTable, options: &ExecutionOptions) -> BenchResult<UpdatePlan> {
        let data = plan.data().ok_or(BenchError::MissingData)?;
        check_row_count(existing, data)?;
        Ok(plan_update(plan, data, existing, options.keep_all))
    }

    fn run(
        &self,
        plan: &BenchPlan,
        options: &ExecutionOptions,
        existing: Option<&ResultTable>,
    ) -> BenchResult<(ResultTable, SessionLog)> {
        let data = plan.shared_data().ok_or(BenchError::MissingData)?;
        let incremental = existing.is_some();

        let (mut table, selected) = match existing {
            Some(existing) => {
                check_row_count(existing, &data)?;
                let update = plan_update(plan, &data, existing, options.keep_all);
                let mut table = existing.clone();
                for id in &update.dropped {
                    info!("Dropping {} from the result table", id);
                    table.drop_method(id);
                }
                let selected: Vec<&MethodDescriptor> = plan
                    .list()
                    .iter()
                    .filter(|m| update.should_run(m.id()))
                    .collect();
                (table, selected)
            }
            None => (ResultTable::new(data.n_rows()), plan.list().iter().collect()),
        };

        let layer_order = layer_order(plan, &table);
        validate_truth(options, &data, &layer_order)?;

        let _timer = BenchmarkTimer::new(&format!(
            "benchmark session ({} of {} methods)",
            selected.len(),
            plan.len()
        ));
        info!(
            "Executing {} methods on {} rows ({}, timeout: {})",
            selected.len(),
            data.n_rows(),
            if options.parallel { "parallel" } else { "sequential" },
            options
                .timeout
                .map(|t| format!("{:.2}s", t.as_secs_f64()))
                .unwrap_or_else(|| "none".to_string())
        );

        let jobs: Vec<MethodJob> = selected.iter().map(|m| MethodJob::from_descriptor(m)).collect();
        let runs = run_jobs(jobs, &data, options)?;

        // Merge phase: single-threaded from here on
        let run_ids: HashSet<&str> = runs.iter().map(|r| r.id.as_str()).collect();
        for method in plan.list() {
            if run_ids.contains(method.id()) {
                let index = table.upsert_method(self.describe(method));
                table.clear_method(index);
            } else if let Some(index) = table.method_index(method.id()) {
                table.method_info_mut()[index].metadata = method.metadata().clone();
            }
        }
        table.reorder_methods(&plan.ids());
        for layer in &layer_order {
            table.ensure_layer(layer);
        }
        table.retain_layers(&layer_order);

        let mut results = BTreeMap::new();
        for run in &runs {
            let mut outcomes: BTreeMap<String, Outcome> = layer_order
                .iter()
                .map(|layer| (layer.clone(), Outcome::Missing))
                .collect();
            for step in &run.steps {
                let outcome = match &step.result {
                    Ok(_) => Outcome::Success,
                    Err(failure) => {
                        let detail = failure.detail(&step.name);
                        warn!(
                            method = %run.id,
                            post_step = %step.name,
                            origin = ?detail.origin,
                            "Method failed: {}",
                            detail.message
                        );
                        Outcome::Error(detail)
                    }
                };
                outcomes.insert(step.name.clone(), outcome);
            }
            results.insert(run.id.clone(), outcomes);
        }

        for run in runs {
            let Some(index) = table.method_index(&run.id) else {
                continue;
            };
            for step in run.steps {
                if let Ok(column) = step.result {
                    table.store_column(&step.name, index, column);
                }
            }
        }

        for (layer, column) in &options.truth_columns {
            let truth = data.column(column).map(<[Value]>::to_vec).unwrap_or_default();
            table.set_ground_truth(layer, truth)?;
        }
        table.set_dataset_fingerprint(data.fingerprint());

        let session = SessionLog::new(
            self.environment.capture(),
            SessionParameters {
                parallel: options.parallel,
                workers: options.effective_workers(),
                timeout_seconds: options.timeout.map(|t| t.as_secs_f64()),
                catch_errors: options.catch_errors,
                incremental,
            },
            results,
        );
        let failures = session.failures().len();
        if failures > 0 {
            warn!("Session {} finished with {} failed cells", session.id, failures);
        } else {
            info!("Session {} finished cleanly", session.id);
        }
        table.push_session(session.clone());

        Ok((table, session))
    }

    fn describe(&self, method: &MethodDescriptor) -> MethodInfo {
        let provenance = match self.provenance.lookup(method.callable().name()) {
            Ok(provenance) => provenance,
            Err(e) => {
                debug!("No provenance for {}: {}", method.callable().name(), e);
                Provenance::default()
            }
        };

        MethodInfo {
            id: method.id().to_string(),
            callable: method.callable().name().to_string(),
            post_steps: method.layer_names(),
            params: method.param_summary(),
            package: provenance.package,
            version: provenance.version,
            metadata: method.metadata().clone(),
            signature: method.signature(),
            performance: Vec::new(),
        }
    }
}

fn check_row_count(table: &ResultTable, data: &Dataset) -> BenchResult<()> {
    if table.n_rows() != data.n_rows() {
        return Err(BenchError::configuration(format!(
            "dataset has {} rows but the result table was built with {}",
            data.n_rows(),
            table.n_rows()
        )));
    }
    Ok(())
}

/// Layers of the plan's methods followed by those of methods kept from an
/// earlier session, in order of first declaration.
fn layer_order(plan: &BenchPlan, table: &ResultTable) -> Vec<String> {
    let mut layers = plan.layer_names();
    for info in table.method_info().iter().filter(|m| !plan.has_method(&m.id)) {
        for step in &info.post_steps {
            if !layers.contains(step) {
                layers.push(step.clone());
            }
        }
    }
    layers
}

fn validate_truth(options: &ExecutionOptions, data: &Dataset, layers: &[String]) -> BenchResult<()> {
    for (layer, column) in &options.truth_columns {
        if !layers.contains(layer) {
            return Err(BenchError::UnknownLayer {
                layer: layer.clone(),
            });
        }
        if !data.has_column(column) {
            return Err(BenchError::configuration(format!(
                "ground truth column {} for layer {} is not in the dataset",
                column, layer
            )));
        }
    }
    Ok(())
}

fn run_jobs(jobs: Vec<MethodJob>, data: &Arc<Dataset>, options: &ExecutionOptions) -> BenchResult<Vec<MethodRun>> {
    let n_rows = data.n_rows();
    let timeout = options.timeout;
    let catch_errors = options.catch_errors;

    let checked = |run: MethodRun| -> BenchResult<MethodRun> {
        match run.first_failure() {
            Some(error) if !catch_errors => Err(error),
            _ => Ok(run),
        }
    };

    if options.parallel && jobs.len() > 1 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.effective_workers())
            .thread_name(|i| format!("bench-worker-{}", i))
            .build()
            .map_err(|e| BenchError::configuration(format!("failed to build worker pool: {}", e)))?;

        // Indexed collect keeps plan order regardless of completion order
        let runs: Vec<MethodRun> = pool.install(|| {
            jobs.into_par_iter()
                .map(|job| run_method(job, data, n_rows, timeout))
                .collect()
        });
        // Failures are reported by plan position, not by which worker hit one first
        runs.into_iter().map(checked).collect()
    } else {
        let mut runs = Vec::with_capacity(jobs.len());
        for job in jobs {
            runs.push(checked(run_method(job, data, n_rows, timeout))?);
        }
        Ok(runs)
    }
}

fn run_method(job: MethodJob, data: &Arc<Dataset>, n_rows: usize, timeout: Option<Duration>) -> MethodRun {
    let MethodJob {
        id,
        callable,
        params,
        steps,
    } = job;
    debug!("Running {}", id);

    let main = {
        let data = Arc::clone(data);
        invoke(timeout, move || {
            let resolved = resolve_params(&params, &data)?;
            callable.call(&resolved)
        })
    };

    let steps = match main {
        Err(failure) => steps
            .into_iter()
            .map(|step| StepRun {
                name: step.name,
                result: Err(StepFailure {
                    origin: ErrorOrigin::Main,
                    failure: failure.clone(),
                }),
            })
            .collect(),
        Ok(raw) => {
            let raw = Arc::new(raw);
            steps
                .into_iter()
                .map(|step| {
                    let raw = Arc::clone(&raw);
                    let func = step.func;
                    let result = invoke(timeout, move || into_column(func.call(&raw)?, n_rows))
                        .map_err(|failure| StepFailure {
                            origin: ErrorOrigin::PostProcess,
                            failure,
                        });
                    StepRun {
                        name: step.name,
                        result,
                    }
                })
                .collect()
        }
    };

    debug!("Finished {}", id);
    MethodRun { id, steps }
}

/// Converts a post-processed output into a layer column of `n_rows` cells.
/// Missing numbers become `Value::Null`.
fn into_column(value: Value, n_rows: usize) -> anyhow::Result<Vec<Value>> {
    match value {
        Value::Vector(items) if items.len() == n_rows => {
            if items.iter().any(|v| matches!(v, Value::Vector(_))) {
                bail!("output must not contain nested vectors");
            }
            Ok(items
                .into_iter()
                .map(|v| if v.is_missing() { Value::Null } else { v })
                .collect())
        }
        Value::Vector(items) => bail!(
            "output has {} values but the dataset has {} rows",
            items.len(),
            n_rows
        ),
        other => bail!(
            "output must be a vector of {} values, got {}",
            n_rows,
            other.type_name()
        ),
    }
}
