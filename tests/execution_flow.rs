use benchdesign::application::execution::{ExecutionEngine, ExecutionOptions};
use benchdesign::application::methods::{adjust_method, threshold_step};
use benchdesign::domain::data::{Dataset, Value};
use benchdesign::domain::design::{BenchPlan, MethodCallable, MethodDescriptor, ParamExpr, PostCallable};
use benchdesign::domain::errors::BenchError;
use benchdesign::domain::session::{ErrorOrigin, Outcome};
use std::thread;
use std::time::{Duration, Instant};

fn pvalue_data(n: usize) -> Dataset {
    let pvals: Vec<Value> = (0..n).map(|i| Value::Number((i as f64 + 1.0) / (2.0 * n as f64))).collect();
    let truth: Vec<Value> = (0..n).map(|i| Value::Bool(i % 3 == 0)).collect();
    Dataset::new()
        .with_column("pval", pvals)
        .unwrap()
        .with_column("truth", truth)
        .unwrap()
}

fn adjust(id: &str, method: &str) -> MethodDescriptor {
    MethodDescriptor::new(id, adjust_method())
        .param("p", ParamExpr::column("pval"))
        .param("method", ParamExpr::literal(method))
}

fn slow(sleep: Duration) -> MethodCallable {
    MethodCallable::method("slow", move |params| {
        thread::sleep(sleep);
        Ok(params.require("p")?.clone())
    })
}

// Methods only share a layer through a common post-step name; without one
// each method gets an implicit layer named after itself.
#[test]
fn test_two_methods_share_one_layer() {
    let mut plan = BenchPlan::with_data(pvalue_data(50));
    plan.add(adjust("bonf", "bonferroni").post_step("default", PostCallable::identity()))
        .unwrap();
    plan.add(adjust("bh", "BH").post_step("default", PostCallable::identity()))
        .unwrap();

    let options = ExecutionOptions::default().with_truth("default", "truth");
    let (table, session) = ExecutionEngine::default().execute(&plan, &options).unwrap();

    assert_eq!(table.layer_names(), vec!["default"]);
    assert_eq!(table.layer("default").unwrap().shape(), (50, 2));
    assert_eq!(table.method_ids(), vec!["bonf", "bh"]);
    assert_eq!(table.method_info().len(), 2);
    assert_eq!(table.sessions().len(), 1);
    assert!(session.is_clean());
    assert_eq!(session.outcome("bonf", "default"), Some(&Outcome::Success));
    assert_eq!(session.outcome("bh", "default"), Some(&Outcome::Success));
    assert!(table.has_ground_truth("default"));

    // Bonferroni scales every p-value by n = 50
    let bonf = table.layer_column("default", "bonf").unwrap();
    assert_eq!(bonf[0], Value::Number((0.01_f64 * 50.0).min(1.0)));
    assert_eq!(bonf[49], Value::Number(1.0));
}

#[test]
fn test_implicit_post_step_layers_include_every_method() {
    let mut plan = BenchPlan::with_data(pvalue_data(10));
    plan.add(adjust("bonf", "bonferroni")).unwrap();
    plan.add(adjust("bh", "BH")).unwrap();

    let (table, session) = ExecutionEngine::default()
        .execute(&plan, &ExecutionOptions::default())
        .unwrap();

    assert_eq!(table.layer_names(), vec!["bonf", "bh"]);
    assert_eq!(table.layer("bonf").unwrap().shape(), (10, 2));

    // The bh column of the bonf layer is structurally missing
    assert!(table.layer_column("bonf", "bh").unwrap().iter().all(Value::is_missing));
    assert_eq!(session.outcome("bh", "bonf"), Some(&Outcome::Missing));
    assert_eq!(session.outcome("bh", "bh"), Some(&Outcome::Success));
}

#[test]
fn test_main_failure_marks_every_post_step() {
    let failing = MethodCallable::method("failing", |_| anyhow::bail!("singular system"));
    let mut plan = BenchPlan::with_data(pvalue_data(5));
    plan.add(adjust("ok", "holm").post_step("raw", PostCallable::identity()))
        .unwrap();
    plan.add(
        MethodDescriptor::new("broken", failing)
            .post_step("raw", PostCallable::identity())
            .post_step("called", threshold_step(0.05)),
    )
    .unwrap();

    let (table, session) = ExecutionEngine::default()
        .execute(&plan, &ExecutionOptions::default())
        .unwrap();

    for step in ["raw", "called"] {
        let detail = session.outcome("broken", step).and_then(Outcome::error).unwrap();
        assert_eq!(detail.origin, ErrorOrigin::Main);
        assert!(detail.message.contains("singular system"));
        assert!(table.layer_column(step, "broken").unwrap().iter().all(Value::is_missing));
    }
    assert_eq!(session.outcome("ok", "raw"), Some(&Outcome::Success));
    assert_eq!(session.failures().len(), 2);
}

#[test]
fn test_post_step_failure_is_isolated() {
    let exploding = PostCallable::post("explode", |_| panic!("bad post-processing"));
    let mut plan = BenchPlan::with_data(pvalue_data(5));
    plan.add(
        adjust("bh", "BH")
            .post_step("adjusted", PostCallable::identity())
            .post_step("exploded", exploding)
            .post_step("rejected", threshold_step(0.6)),
    )
    .unwrap();

    let (table, session) = ExecutionEngine::default()
        .execute(&plan, &ExecutionOptions::default())
        .unwrap();

    let detail = session.outcome("bh", "exploded").and_then(Outcome::error).unwrap();
    assert_eq!(detail.origin, ErrorOrigin::PostProcess);
    assert_eq!(detail.post_step.as_deref(), Some("exploded"));
    assert!(detail.message.contains("bad post-processing"));

    assert_eq!(session.outcome("bh", "adjusted"), Some(&Outcome::Success));
    assert_eq!(session.outcome("bh", "rejected"), Some(&Outcome::Success));
    assert!(table.layer_column("bh", "bh").is_none());
    assert!(!table.layer_column("adjusted", "bh").unwrap()[0].is_missing());
    assert!(table.layer_column("exploded", "bh").unwrap().iter().all(Value::is_missing));
    assert_eq!(table.layer_column("rejected", "bh").unwrap()[0], Value::Bool(true));
}

#[test]
fn test_timeout_marks_method_missing() {
    let mut plan = BenchPlan::with_data(pvalue_data(4));
    plan.add(MethodDescriptor::new("slow", slow(Duration::from_secs(5))).param("p", ParamExpr::column("pval")))
        .unwrap();
    plan.add(adjust("fast", "BH")).unwrap();

    let options = ExecutionOptions::default().with_timeout_secs(1.0).unwrap();
    let start = Instant::now();
    let (table, session) = ExecutionEngine::default().execute(&plan, &options).unwrap();

    assert!(start.elapsed() < Duration::from_secs(4));
    let detail = session.outcome("slow", "slow").and_then(Outcome::error).unwrap();
    assert_eq!(detail.origin, ErrorOrigin::Main);
    assert!(detail.message.contains("timed out"));
    assert!(table.layer_column("slow", "slow").unwrap().iter().all(Value::is_missing));
    assert_eq!(session.outcome("fast", "fast"), Some(&Outcome::Success));
    assert_eq!(session.parameters.timeout_seconds, Some(1.0));
}

#[test]
fn test_catch_errors_disabled_aborts() {
    let failing = MethodCallable::method("failing", |_| anyhow::bail!("no convergence"));
    let mut plan = BenchPlan::with_data(pvalue_data(5));
    plan.add(adjust("bh", "BH")).unwrap();
    plan.add(MethodDescriptor::new("broken", failing)).unwrap();

    let options = ExecutionOptions::default().with_catch_errors(false);
    let err = ExecutionEngine::default().execute(&plan, &options).unwrap_err();
    match err {
        BenchError::MethodExecution {
            method,
            post_step,
            message,
        } => {
            assert_eq!(method, "broken");
            assert_eq!(post_step, None);
            assert!(message.contains("no convergence"));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_catch_errors_disabled_reports_timeout() {
    let mut plan = BenchPlan::with_data(pvalue_data(3));
    plan.add(MethodDescriptor::new("slow", slow(Duration::from_secs(3))).param("p", ParamExpr::column("pval")))
        .unwrap();

    let options = ExecutionOptions::default()
        .with_catch_errors(false)
        .with_timeout(Duration::from_millis(200));
    let err = ExecutionEngine::default().execute(&plan, &options).unwrap_err();
    assert!(matches!(err, BenchError::Timeout { ref method, .. } if method == "slow"));
}

#[test]
fn test_parallel_keeps_declaration_order() {
    let mut plan = BenchPlan::with_data(pvalue_data(8));
    // Earlier methods sleep longer so they finish last
    for (i, id) in ["m0", "m1", "m2", "m3"].iter().enumerate() {
        let sleep = Duration::from_millis(200 - 50 * i as u64);
        plan.add(
            MethodDescriptor::new(*id, slow(sleep))
                .param("p", ParamExpr::literal(Value::from(vec![i as f64; 8])))
                .post_step("out", PostCallable::identity()),
        )
        .unwrap();
    }

    let options = ExecutionOptions::default().with_parallel(true).with_workers(4);
    let (table, session) = ExecutionEngine::default().execute(&plan, &options).unwrap();

    assert_eq!(table.method_ids(), vec!["m0", "m1", "m2", "m3"]);
    for (i, id) in ["m0", "m1", "m2", "m3"].iter().enumerate() {
        assert_eq!(table.layer_column("out", id).unwrap()[0], Value::Number(i as f64));
    }
    assert!(session.parameters.parallel);
    assert_eq!(session.parameters.workers, 4);
    assert!(session.is_clean());
}

#[test]
fn test_parallel_failures_stay_isolated() {
    let lagging = PostCallable::post("lag", |raw| {
        thread::sleep(Duration::from_secs(3));
        Ok(raw.clone())
    });
    let failing = MethodCallable::method("failing", |_| anyhow::bail!("singular system"));

    let mut plan = BenchPlan::with_data(pvalue_data(6));
    plan.add(adjust("bh", "BH").post_step("out", PostCallable::identity()))
        .unwrap();
    plan.add(
        MethodDescriptor::new("slow", slow(Duration::from_secs(3)))
            .param("p", ParamExpr::column("pval"))
            .post_step("out", PostCallable::identity()),
    )
    .unwrap();
    plan.add(
        MethodDescriptor::new("broken", failing)
            .post_step("out", PostCallable::identity()),
    )
    .unwrap();
    plan.add(
        adjust("holm", "holm")
            .post_step("out", PostCallable::identity())
            .post_step("lagged", lagging),
    )
    .unwrap();
    plan.add(adjust("bonf", "bonferroni").post_step("out", PostCallable::identity()))
        .unwrap();

    let options = ExecutionOptions::default()
        .with_parallel(true)
        .with_workers(4)
        .with_timeout(Duration::from_millis(500));
    let start = Instant::now();
    let (table, session) = ExecutionEngine::default().execute(&plan, &options).unwrap();

    // Two 3s sleeps are cut short by the timeout
    assert!(start.elapsed() < Duration::from_secs(3));
    assert_eq!(table.method_ids(), vec!["bh", "slow", "broken", "holm", "bonf"]);

    let slow = session.outcome("slow", "out").and_then(Outcome::error).unwrap();
    assert_eq!(slow.origin, ErrorOrigin::Main);
    assert!(slow.message.contains("timed out"));

    let broken = session.outcome("broken", "out").and_then(Outcome::error).unwrap();
    assert_eq!(broken.origin, ErrorOrigin::Main);
    assert!(broken.message.contains("singular system"));

    let lagged = session.outcome("holm", "lagged").and_then(Outcome::error).unwrap();
    assert_eq!(lagged.origin, ErrorOrigin::PostProcess);
    assert_eq!(lagged.post_step.as_deref(), Some("lagged"));
    assert!(lagged.message.contains("timed out"));

    for id in ["bh", "holm", "bonf"] {
        assert_eq!(session.outcome(id, "out"), Some(&Outcome::Success));
        assert!(table.layer_column("out", id).unwrap().iter().all(|v| !v.is_missing()));
    }
    for id in ["bh", "slow", "broken", "bonf"] {
        assert_eq!(session.outcome(id, "lagged"), Some(&Outcome::Missing));
    }
    for id in ["slow", "broken"] {
        assert!(table.layer_column("out", id).unwrap().iter().all(Value::is_missing));
    }
    assert!(table.layer_column("lagged", "holm").unwrap().iter().all(Value::is_missing));
    assert_eq!(session.failures().len(), 3);
}

#[test]
fn test_parallel_abort_reports_first_declared_failure() {
    let first = MethodCallable::method("first", |_| {
        thread::sleep(Duration::from_millis(400));
        anyhow::bail!("first failed")
    });
    let second = MethodCallable::method("second", |_| anyhow::bail!("second failed"));

    let mut plan = BenchPlan::with_data(pvalue_data(3));
    plan.add(MethodDescriptor::new("first", first)).unwrap();
    plan.add(MethodDescriptor::new("second", second)).unwrap();

    let options = ExecutionOptions::default()
        .with_parallel(true)
        .with_workers(2)
        .with_catch_errors(false);
    match ExecutionEngine::default().execute(&plan, &options).unwrap_err() {
        BenchError::MethodExecution { method, message, .. } => {
            assert_eq!(method, "first");
            assert!(message.contains("first failed"));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_parallel_matches_sequential() {
    let mut plan = BenchPlan::with_data(pvalue_data(30));
    for (id, method) in [("bonf", "bonferroni"), ("holm", "holm"), ("bh", "BH"), ("by", "BY")] {
        plan.add(adjust(id, method).post_step("adjusted", PostCallable::identity()))
            .unwrap();
    }

    let engine = ExecutionEngine::default();
    let (sequential, _) = engine.execute(&plan, &ExecutionOptions::default()).unwrap();
    let (parallel, _) = engine
        .execute(&plan, &ExecutionOptions::default().with_parallel(true).with_workers(3))
        .unwrap();

    assert_eq!(sequential.layer("adjusted"), parallel.layer("adjusted"));
    assert_eq!(sequential.method_ids(), parallel.method_ids());
}

#[test]
fn test_method_info_records_descriptor() {
    let mut plan = BenchPlan::with_data(pvalue_data(5));
    plan.add(adjust("bh", "BH").meta("family", "fdr")).unwrap();

    let (table, _) = ExecutionEngine::default()
        .execute(&plan, &ExecutionOptions::default())
        .unwrap();

    let info = table.method("bh").unwrap();
    assert_eq!(info.callable, "adjust");
    assert_eq!(info.post_steps, vec!["bh"]);
    assert_eq!(info.params["p"], "pval");
    assert_eq!(info.metadata["family"], Value::from("fdr"));
    assert_eq!(info.signature, plan.method("bh").unwrap().signature());
    assert_eq!(info.package, None);
}
