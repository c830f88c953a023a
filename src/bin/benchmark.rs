use anyhow::Context;
use benchdesign::application::benchmarking::BenchmarkReporter;
use benchdesign::application::execution::{ExecutionEngine, ExecutionOptions, UpdateAction};
use benchdesign::application::methods::{AdjustMethod, adjust_method, threshold_step};
use benchdesign::config::{Config, load_grid_from_toml};
use benchdesign::domain::data::{Dataset, Value};
use benchdesign::domain::design::{BenchPlan, MethodDescriptor, ParamExpr, PostCallable};
use benchdesign::domain::performance::{
    EvaluateOptions, MetricEvaluator, ParamGrid, available_metrics, builtin::DEFAULT_ALPHA,
};
use benchdesign::infrastructure::csv_dataset::{load_dataset, save_dataset};
use benchdesign::infrastructure::persistence::{load_table, save_table};
use benchdesign::infrastructure::{StaticProvenance, SystemEnvironment};
use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statrs::distribution::{ContinuousCDF, Normal};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about = "Benchmark multiple-testing methods on a dataset", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a synthetic dataset of p-values with known truth
    Simulate {
        /// Output CSV path
        #[arg(short, long, default_value = "simulated.csv")]
        output: PathBuf,

        /// Number of hypotheses
        #[arg(short, long, default_value = "1000")]
        rows: usize,

        /// Fraction of true alternatives
        #[arg(long, default_value = "0.1")]
        signal: f64,

        /// Mean z-score of the alternatives
        #[arg(long, default_value = "3.0")]
        effect: f64,

        #[arg(long, default_value = "42")]
        seed: u64,
    },
    /// Run the adjustment methods on a dataset and save the result table
    Run {
        #[command(flatten)]
        design: DesignArgs,
    },
    /// Re-run only new, changed or previously failed methods
    Update {
        #[command(flatten)]
        design: DesignArgs,

        /// Report what would run without running it
        #[arg(long)]
        dry_run: bool,

        /// Remove table methods that are no longer selected
        #[arg(long)]
        prune: bool,
    },
    /// Evaluate built-in metrics on a saved result table
    Metrics {
        /// Result table JSON
        #[arg(short, long)]
        table: Option<PathBuf>,

        #[arg(short, long, default_value = "adjusted")]
        layer: String,

        /// Metrics to evaluate (comma separated, default all)
        #[arg(short, long)]
        metrics: Option<String>,

        /// Significance levels (comma separated)
        #[arg(short, long)]
        alpha: Option<String>,

        /// TOML parameter grid, overrides --alpha
        #[arg(long)]
        grid: Option<PathBuf>,

        /// One row per (method, metric, parameters)
        #[arg(long)]
        tidy: bool,

        /// Store values in the table's method info instead of printing
        #[arg(long)]
        store: bool,
    },
}

#[derive(Args)]
struct DesignArgs {
    /// Dataset CSV
    #[arg(short, long)]
    data: PathBuf,

    /// Result table JSON (default: <output dir>/table.json)
    #[arg(short, long)]
    table: Option<PathBuf>,

    /// Column holding the raw p-values
    #[arg(long, default_value = "pval")]
    pvalues: String,

    /// Column holding the truth labels
    #[arg(long)]
    truth: Option<String>,

    /// Adjustment methods (comma separated, default all)
    #[arg(long)]
    methods: Option<String>,

    /// Cutoff of the `rejected` post-step
    #[arg(long, default_value = "0.05")]
    cutoff: f64,

    /// Overrides BENCH_PARALLEL
    #[arg(short, long)]
    parallel: bool,

    /// Overrides BENCH_TIMEOUT_SECS
    #[arg(long)]
    timeout: Option<f64>,
}

impl DesignArgs {
    fn plan(&self) -> anyhow::Result<BenchPlan> {
        let data = load_dataset(&self.data)?;
        if !data.has_column(&self.pvalues) {
            anyhow::bail!("Dataset has no column named {}", self.pvalues);
        }

        let mut plan = BenchPlan::with_data(data);
        for method in parse_methods(self.methods.as_deref())? {
            let family = match method {
                AdjustMethod::Bonferroni | AdjustMethod::Holm | AdjustMethod::Hochberg => "fwer",
                AdjustMethod::BH | AdjustMethod::BY => "fdr",
            };
            plan.add(
                MethodDescriptor::new(method.name().to_lowercase(), adjust_method())
                    .param("p", ParamExpr::column(&self.pvalues))
                    .param("method", ParamExpr::literal(method.name()))
                    .post_step("adjusted", PostCallable::identity())
                    .post_step("rejected", threshold_step(self.cutoff))
                    .meta("family", family),
            )?;
        }
        Ok(plan)
    }

    fn options(&self, config: &Config) -> anyhow::Result<ExecutionOptions> {
        let mut options = ExecutionOptions::from(config);
        if self.parallel {
            options = options.with_parallel(true);
        }
        if let Some(seconds) = self.timeout {
            options = options.with_timeout_secs(seconds)?;
        }
        if let Some(truth) = &self.truth {
            options = options.with_truth("adjusted", truth.as_str());
        }
        Ok(options)
    }

    fn table_path(&self, config: &Config) -> PathBuf {
        table_path(self.table.clone(), config)
    }
}

fn table_path(table: Option<PathBuf>, config: &Config) -> PathBuf {
    table.unwrap_or_else(|| config.output_dir.join("table.json"))
}

fn parse_methods(s: Option<&str>) -> anyhow::Result<Vec<AdjustMethod>> {
    match s {
        None => Ok(AdjustMethod::all().to_vec()),
        Some(list) => list.split(',').map(|m| m.trim().parse()).collect(),
    }
}

fn parse_alphas(s: &str) -> anyhow::Result<Vec<f64>> {
    s.split(',')
        .map(|x| {
            x.trim()
                .parse::<f64>()
                .with_context(|| format!("alpha must be a number, got: {}", x))
        })
        .collect()
}

fn engine() -> ExecutionEngine {
    let version = env!("CARGO_PKG_VERSION");
    let provenance = StaticProvenance::new().with("adjust", "benchdesign", version);
    ExecutionEngine::new(Arc::new(SystemEnvironment::new()), Arc::new(provenance))
}

fn simulate(output: &Path, rows: usize, signal: f64, effect: f64, seed: u64) -> anyhow::Result<()> {
    if !(0.0..=1.0).contains(&signal) {
        anyhow::bail!("--signal must be between 0 and 1, got {}", signal);
    }
    let normal = Normal::new(0.0, 1.0).context("Failed to build standard normal")?;
    let mut rng = StdRng::seed_from_u64(seed);

    let mut truth = Vec::with_capacity(rows);
    let mut pvals = Vec::with_capacity(rows);
    for _ in 0..rows {
        let alternative = rng.random_bool(signal);
        // Box-Muller
        let u1: f64 = rng.random_range(f64::EPSILON..1.0);
        let u2: f64 = rng.random();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        let statistic = if alternative { z + effect } else { z };

        truth.push(Value::Bool(alternative));
        pvals.push(Value::Number(1.0 - normal.cdf(statistic)));
    }

    let dataset = Dataset::new().with_column("pval", pvals)?.with_column("truth", truth)?;
    save_dataset(&dataset, output)?;
    println!("📝 Simulated {} hypotheses to {}", rows, output.display());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Setup logging
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    match cli.command {
        Commands::Simulate {
            output,
            rows,
            signal,
            effect,
            seed,
        } => simulate(&output, rows, signal, effect, seed)?,

        Commands::Run { design } => {
            let plan = design.plan()?;
            let options = design.options(&config)?;
            let (table, session) = engine().execute(&plan, &options)?;

            let reporter = BenchmarkReporter::new(&config.output_dir)?;
            reporter.print_session_summary(&table, &session);
            let path = design.table_path(&config);
            save_table(&path, &table)?;
            info!("Result table saved to {:?}", path);
        }

        Commands::Update {
            design,
            dry_run,
            prune,
        } => {
            let plan = design.plan()?;
            let options = design.options(&config)?.with_keep_all(!prune);
            let path = design.table_path(&config);
            let existing = load_table(&path)?;
            let engine = engine();

            if dry_run {
                let update = engine.plan_update(&plan, &existing, &options)?;
                for method in &update.methods {
                    match method.action {
                        UpdateAction::Run(reason) => println!("  run    {:<12} ({:?})", method.id, reason),
                        UpdateAction::Reuse => println!("  reuse  {}", method.id),
                    }
                }
                for id in &update.kept {
                    println!("  keep   {}", id);
                }
                for id in &update.dropped {
                    println!("  drop   {}", id);
                }
                if update.is_noop() {
                    println!("✅ Result table is up to date");
                }
                return Ok(());
            }

            let (table, session) = engine.update(&plan, &existing, &options)?;
            let reporter = BenchmarkReporter::new(&config.output_dir)?;
            reporter.print_session_summary(&table, &session);
            save_table(&path, &table)?;
            info!("Result table saved to {:?}", path);
        }

        Commands::Metrics {
            table,
            layer,
            metrics,
            alpha,
            grid,
            tidy,
            store,
        } => {
            let path = table_path(table, &config);
            let mut table = load_table(&path)?;

            let names: Vec<String> = match metrics {
                Some(list) => list.split(',').map(|m| m.trim().to_string()).collect(),
                None => available_metrics().iter().map(|m| m.name.to_string()).collect(),
            };
            for name in &names {
                MetricEvaluator::register_builtin(&mut table, &layer, name)?;
            }

            let grid: ParamGrid = match (grid, alpha) {
                (Some(file), _) => load_grid_from_toml(&file)?,
                (None, Some(list)) => [("alpha".to_string(), parse_alphas(&list)?)].into_iter().collect(),
                (None, None) => [("alpha".to_string(), vec![DEFAULT_ALPHA])].into_iter().collect(),
            };

            let options = EvaluateOptions {
                tidy,
                add_to_method_info: store,
                ..EvaluateOptions::default()
            };
            let reporter = BenchmarkReporter::new(&config.output_dir)?;
            match MetricEvaluator::evaluate(&mut table, &grid, options)? {
                Some(result) => {
                    reporter.print_metrics(&result);
                    reporter.export_json("metrics", &result)?;
                }
                None => {
                    reporter.export_json("metrics", &MetricEvaluator::tidy_up(&table))?;
                }
            }
            // Registrations (and stored values) are kept with the table
            save_table(&path, &table)?;
        }
    }

    Ok(())
}
