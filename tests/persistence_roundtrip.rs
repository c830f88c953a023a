use benchdesign::application::execution::{ExecutionEngine, ExecutionOptions};
use benchdesign::application::methods::{adjust_method, default_catalog, fill_missing};
use benchdesign::domain::data::{Dataset, Value};
use benchdesign::domain::design::{BenchPlan, MethodCallable, MethodDescriptor, ParamExpr, PostCallable};
use benchdesign::domain::errors::BenchError;
use benchdesign::domain::performance::{EvaluateOptions, MetricEvaluator, MetricsTable, ParamGrid};
use benchdesign::infrastructure::csv_dataset::{load_dataset, save_dataset};
use benchdesign::infrastructure::persistence::{load_plan, load_table, save_plan, save_table};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn temp_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "benchdesign_it_{}_{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::SeqCst)
    ));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn dataset() -> Dataset {
    Dataset::new()
        .with_column(
            "pval",
            vec![Value::Number(0.001), Value::Null, Value::Number(0.03), Value::Number(0.7)],
        )
        .unwrap()
        .with_column(
            "truth",
            vec![Value::Bool(true), Value::Bool(true), Value::Bool(false), Value::Bool(false)],
        )
        .unwrap()
}

fn plan() -> BenchPlan {
    let filled = ParamExpr::apply(fill_missing(), vec![ParamExpr::column("pval"), ParamExpr::literal(1.0)]);
    let mut plan = BenchPlan::with_data(dataset());
    plan.add(
        MethodDescriptor::new("bh", adjust_method())
            .param("p", filled)
            .param("method", ParamExpr::literal("BH"))
            .post_step("adjusted", PostCallable::identity())
            .meta("family", "fdr"),
    )
    .unwrap();
    plan.add(
        MethodDescriptor::new("bonf", adjust_method())
            .param("p", ParamExpr::column("pval"))
            .param("method", ParamExpr::literal("bonferroni"))
            .post_step("adjusted", PostCallable::identity()),
    )
    .unwrap();
    plan
}

#[test]
fn test_table_roundtrip_keeps_results_and_metrics() {
    let dir = temp_dir();
    let options = ExecutionOptions::default().with_truth("adjusted", "truth");
    let (mut table, session) = ExecutionEngine::default().execute(&plan(), &options).unwrap();
    MetricEvaluator::register_builtin(&mut table, "adjusted", "TPR").unwrap();

    let path = dir.join("table.json");
    save_table(&path, &table).unwrap();
    let mut loaded = load_table(&path).unwrap();

    assert_eq!(loaded.method_ids(), table.method_ids());
    assert_eq!(loaded.layer("adjusted"), table.layer("adjusted"));
    assert_eq!(loaded.ground_truth("adjusted"), table.ground_truth("adjusted"));
    assert_eq!(loaded.sessions()[0].id, session.id);
    assert_eq!(loaded.method("bh").unwrap().metadata["family"], Value::from("fdr"));
    assert_eq!(loaded.dataset_fingerprint(), table.dataset_fingerprint());

    // Built-in metric functions are re-attached on load
    let grid: ParamGrid = [("alpha".to_string(), vec![0.05])].into_iter().collect();
    let result = MetricEvaluator::evaluate(&mut loaded, &grid, EvaluateOptions::default()).unwrap();
    match result {
        Some(MetricsTable::Wide(wide)) => {
            assert_eq!(wide.get("bh", "TPR.adjusted[alpha=0.05]"), Some(0.5));
        }
        other => panic!("unexpected {:?}", other),
    }

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_loaded_table_supports_incremental_update() {
    let dir = temp_dir();
    let engine = ExecutionEngine::default();
    let options = ExecutionOptions::default();
    let plan = plan();
    let (table, _) = engine.execute(&plan, &options).unwrap();

    let path = dir.join("table.json");
    save_table(&path, &table).unwrap();
    let loaded = load_table(&path).unwrap();

    let update = engine.plan_update(&plan, &loaded, &options).unwrap();
    assert!(update.is_noop());
    let (updated, session) = engine.update(&plan, &loaded, &options).unwrap();
    assert!(session.results.is_empty());
    assert_eq!(updated.sessions().len(), 2);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_infinite_cells_survive_save_and_update() {
    let dir = temp_dir();
    let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let score = {
        let calls = std::sync::Arc::clone(&calls);
        MethodCallable::method("neg_log10", move |params| {
            calls.fetch_add(1, Ordering::SeqCst);
            let p = params.numbers("p")?;
            Ok(Value::from(p.iter().map(|v| -v.log10()).collect::<Vec<_>>()))
        })
    };
    let data = Dataset::new()
        .with_column("pval", vec![Value::Number(0.0), Value::Number(0.5)])
        .unwrap();
    let mut plan = BenchPlan::with_data(data);
    plan.add(MethodDescriptor::new("score", score).param("p", ParamExpr::column("pval")))
        .unwrap();

    let engine = ExecutionEngine::default();
    let (table, _) = engine.execute(&plan, &ExecutionOptions::default()).unwrap();
    assert_eq!(table.layer_column("score", "score").unwrap()[0], Value::Number(f64::INFINITY));

    let path = dir.join("table.json");
    save_table(&path, &table).unwrap();
    let loaded = load_table(&path).unwrap();
    assert_eq!(loaded.layer("score"), table.layer("score"));

    // Carried over unchanged by an incremental run
    let (updated, _) = engine.update(&plan, &loaded, &ExecutionOptions::default()).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(updated.layer_column("score", "score").unwrap()[0], Value::Number(f64::INFINITY));
    assert!(!updated.layer_column("score", "score").unwrap()[0].is_missing());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_plan_roundtrip_rebinds_functions() {
    let dir = temp_dir();
    let original = plan();
    let path = dir.join("plan.json");
    save_plan(&path, &original).unwrap();

    let catalog = default_catalog().unwrap();
    let restored = load_plan(&path, &catalog).unwrap();
    assert!(original.compare(&restored).is_identical());
    assert_eq!(restored.ids(), vec!["bh", "bonf"]);
    assert_eq!(restored.method("bh").unwrap().signature(), original.method("bh").unwrap().signature());

    // A restored plan produces the same results
    let engine = ExecutionEngine::default();
    let (a, _) = engine.execute(&original, &ExecutionOptions::default()).unwrap();
    let (b, _) = engine.execute(&restored, &ExecutionOptions::default()).unwrap();
    assert_eq!(a.layer("adjusted"), b.layer("adjusted"));

    // Unknown callables cannot be re-bound
    let empty = benchdesign::domain::design::FunctionCatalog::new();
    assert!(matches!(load_plan(&path, &empty), Err(BenchError::Configuration { .. })));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_dataset_csv_roundtrip() {
    let dir = temp_dir();
    let path = dir.join("data.csv");
    save_dataset(&dataset(), &path).unwrap();

    let loaded = load_dataset(&path).unwrap();
    assert_eq!(loaded, dataset());
    assert_eq!(loaded.fingerprint(), dataset().fingerprint());

    let _ = fs::remove_dir_all(&dir);
}
