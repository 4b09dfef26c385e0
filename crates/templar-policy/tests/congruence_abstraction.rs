//! Parity abstraction against the in-process Z3 backend.

use std::sync::Arc;

use templar_policy::congruence::CongruenceManager;
use templar_policy::{
    CfaNode, Congruence, LinearExpression, PathFormula, PathFormulaManager, PointerTargetSet,
    PolicyOptions, SsaMap, Template, TemplatePrecision, TransferError,
};
use templar_smt::{ShutdownNotifier, SmtTerm, SolverOptions, SolverService};
use tracing_subscriber::EnvFilter;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn service(shutdown: ShutdownNotifier) -> Arc<SolverService> {
    Arc::new(SolverService::new(SolverOptions::default(), shutdown))
}

fn assign(fmgr: PathFormulaManager, assignments: &[(&str, SmtTerm)]) -> PathFormula {
    let empty = fmgr.make_empty(SsaMap::empty(), PointerTargetSet::empty());
    assignments
        .iter()
        .fold(empty, |path, (var, value)| fmgr.make_assignment(&path, var, value))
}

fn sum(a: &str, b: &str) -> Template {
    Template::int(LinearExpression::new([(a, 1), (b, 1)]).expect("small coefficients"))
}

#[test]
fn constant_assignment_is_even() -> TestResult {
    init_tracing();
    let fmgr = PathFormulaManager::new();
    let manager = CongruenceManager::new(
        service(ShutdownNotifier::new()),
        fmgr,
        PolicyOptions::default(),
    );
    let x = Template::upper_bound("x");
    let precision = TemplatePrecision::new().with_generic(x.clone());
    let path = assign(fmgr, &[("x", SmtTerm::int(4))]);

    let state = manager.perform_abstraction(CfaNode(1), &path, &SmtTerm::bool(true), &precision)?;
    assert_eq!(state.get(&x), Some(Congruence::Even));
    assert_eq!(state.to_string(), "{x: EVEN}");
    Ok(())
}

#[test]
fn parity_follows_start_constraints() -> TestResult {
    let fmgr = PathFormulaManager::new();
    let manager = CongruenceManager::new(
        service(ShutdownNotifier::new()),
        fmgr,
        PolicyOptions::default(),
    );
    let x = Template::upper_bound("x");
    let y = Template::upper_bound("y");
    let precision = TemplatePrecision::new()
        .with_generic(x.clone())
        .with_generic(y.clone());
    // x := 2*x + 1 from any x; y is unconstrained.
    let path = assign(
        fmgr,
        &[("x", SmtTerm::int(2).mul(SmtTerm::var("x")).add(SmtTerm::int(1)))],
    );

    let state = manager.perform_abstraction(CfaNode(1), &path, &SmtTerm::bool(true), &precision)?;
    assert_eq!(state.get(&x), Some(Congruence::Odd));
    assert_eq!(state.get(&y), None);
    Ok(())
}

#[test]
fn sums_are_tracked_only_when_enabled() -> TestResult {
    let fmgr = PathFormulaManager::new();
    let solver = service(ShutdownNotifier::new());
    let x_plus_y = sum("x", "y");
    let precision = TemplatePrecision::new()
        .with_node_template(CfaNode(2), x_plus_y.clone())
        .with_generic(Template::int(LinearExpression::new([("x", 3), ("y", 1)])?));
    let path = assign(fmgr, &[("x", SmtTerm::int(1)), ("y", SmtTerm::int(3))]);

    let default = CongruenceManager::new(Arc::clone(&solver), fmgr, PolicyOptions::default());
    let state = default.perform_abstraction(CfaNode(2), &path, &SmtTerm::bool(true), &precision)?;
    assert!(state.is_empty());

    let tracking = CongruenceManager::new(
        solver,
        fmgr,
        PolicyOptions {
            track_sum_congruences: true,
        },
    );
    let state = tracking.perform_abstraction(CfaNode(2), &path, &SmtTerm::bool(true), &precision)?;
    assert_eq!(state.get(&x_plus_y), Some(Congruence::Even));
    assert_eq!(state.len(), 1);
    Ok(())
}

#[test]
fn congruence_formula_round_trips_through_the_solver() -> TestResult {
    let fmgr = PathFormulaManager::new();
    let solver = service(ShutdownNotifier::new());
    let manager = CongruenceManager::new(Arc::clone(&solver), fmgr, PolicyOptions::default());
    let precision = TemplatePrecision::new().with_generic(Template::upper_bound("x"));
    let path = assign(fmgr, &[("x", SmtTerm::int(6))]);

    let state = manager.perform_abstraction(CfaNode(1), &path, &SmtTerm::bool(true), &precision)?;
    let parity = manager.to_formula(&state, &path);
    assert!(solver.implies(&path.formula, &parity)?);
    assert!(manager.to_formula(&Default::default(), &path).is_true());
    Ok(())
}

#[test]
fn interrupted_abstraction_is_reported_as_such() {
    init_tracing();
    let shutdown = ShutdownNotifier::new();
    let fmgr = PathFormulaManager::new();
    let manager = CongruenceManager::new(service(shutdown.clone()), fmgr, PolicyOptions::default());
    let precision = TemplatePrecision::new().with_generic(Template::upper_bound("x"));
    let path = assign(fmgr, &[("x", SmtTerm::int(4))]);
    shutdown.request_shutdown("user abort");

    let result = manager.perform_abstraction(CfaNode(1), &path, &SmtTerm::bool(true), &precision);
    assert!(matches!(result, Err(TransferError::Interrupted(reason)) if reason == "user abort"));
}
