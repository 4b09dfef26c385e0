//! Scoped prover environments handed out by the solver service.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::config::SolverOptions;
use crate::error::SolverError;
use crate::shutdown::ShutdownNotifier;
use crate::solver::{DynSolver, Model, ModelValue, SatResult};
use crate::sorts::{infer_declarations, SmtSort};
use crate::terms::SmtTerm;

/// Prefix of the Boolean literals guarding tracked assertions.
pub(crate) const TRACKING_PREFIX: &str = "__trk_";

/// What a prover must be able to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProverOptions {
    pub generate_models: bool,
    pub generate_unsat_cores: bool,
    pub generate_interpolants: bool,
}

impl ProverOptions {
    pub fn with_models() -> Self {
        Self {
            generate_models: true,
            ..Self::default()
        }
    }

    pub fn with_unsat_cores() -> Self {
        Self {
            generate_unsat_cores: true,
            ..Self::default()
        }
    }
}

/// Instrumentation layered over every prover a service creates.
///
/// Logging runs first, the model consistency check second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instrumentation {
    Plain,
    Logged,
    Checked,
    LoggedChecked,
}

impl Instrumentation {
    pub fn from_options(options: &SolverOptions) -> Self {
        match (options.log_all_queries, options.check_model_consistency) {
            (false, false) => Instrumentation::Plain,
            (true, false) => Instrumentation::Logged,
            (false, true) => Instrumentation::Checked,
            (true, true) => Instrumentation::LoggedChecked,
        }
    }

    pub fn logs(self) -> bool {
        matches!(self, Instrumentation::Logged | Instrumentation::LoggedChecked)
    }

    pub fn checks_models(self) -> bool {
        matches!(self, Instrumentation::Checked | Instrumentation::LoggedChecked)
    }
}

#[derive(Debug, Default)]
struct Frame {
    assertions: Vec<SmtTerm>,
    tracked: Vec<(String, SmtTerm)>,
}

/// A solver instance with a balanced push/pop frame stack.
///
/// Free variables are declared on first use with the sort implied by their
/// position. Dropping the environment releases the underlying solver.
pub struct ProverEnvironment {
    id: u64,
    solver: DynSolver,
    backend: String,
    options: ProverOptions,
    instrumentation: Instrumentation,
    shutdown: ShutdownNotifier,
    declared: HashMap<String, SmtSort>,
    frames: Vec<Frame>,
    next_literal: usize,
    last_result: Option<SatResult>,
    last_model: Option<Model>,
}

impl ProverEnvironment {
    pub(crate) fn new(
        id: u64,
        solver: DynSolver,
        backend: &str,
        options: ProverOptions,
        instrumentation: Instrumentation,
        shutdown: ShutdownNotifier,
    ) -> Self {
        if instrumentation.logs() {
            debug!(prover = id, backend, ?options, "opened prover");
        }
        Self {
            id,
            solver,
            backend: backend.to_string(),
            options,
            instrumentation,
            shutdown,
            declared: HashMap::new(),
            frames: vec![Frame::default()],
            next_literal: 0,
            last_result: None,
            last_model: None,
        }
    }

    pub fn options(&self) -> ProverOptions {
        self.options
    }

    pub fn instrumentation(&self) -> Instrumentation {
        self.instrumentation
    }

    pub fn backend_name(&self) -> &str {
        &self.backend
    }

    /// Number of open `push` scopes.
    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    pub fn push(&mut self) -> Result<(), SolverError> {
        self.solver.push()?;
        self.frames.push(Frame::default());
        self.invalidate();
        if self.instrumentation.logs() {
            debug!(prover = self.id, depth = self.depth(), "push");
        }
        Ok(())
    }

    pub fn pop(&mut self) -> Result<(), SolverError> {
        if self.frames.len() <= 1 {
            return Err(SolverError::Internal(
                "pop without a matching push".into(),
            ));
        }
        self.solver.pop()?;
        self.frames.pop();
        self.invalidate();
        if self.instrumentation.logs() {
            debug!(prover = self.id, depth = self.depth(), "pop");
        }
        Ok(())
    }

    pub fn assert_term(&mut self, term: &SmtTerm) -> Result<(), SolverError> {
        self.declare_free_vars(term)?;
        self.solver.assert(term)?;
        if self.instrumentation.logs() {
            debug!(prover = self.id, %term, "assert");
        }
        self.top_frame().assertions.push(term.clone());
        self.invalidate();
        Ok(())
    }

    /// Assert `term` so that it can appear in an unsat core.
    pub fn assert_tracked(&mut self, term: &SmtTerm) -> Result<(), SolverError> {
        if !self.options.generate_unsat_cores {
            return Err(SolverError::Internal(
                "tracked assertion on a prover without unsat-core generation".into(),
            ));
        }
        self.track(term).map(|_| ())
    }

    /// Guard `term` with a fresh Boolean literal and return the literal.
    pub(crate) fn track(&mut self, term: &SmtTerm) -> Result<String, SolverError> {
        let literal = format!("{TRACKING_PREFIX}{}", self.next_literal);
        self.next_literal += 1;
        self.declare_free_vars(term)?;
        self.solver.declare_var(&literal, &SmtSort::Bool)?;
        self.solver
            .assert(&SmtTerm::var(literal.clone()).implies(term.clone()))?;
        if self.instrumentation.logs() {
            debug!(prover = self.id, %literal, %term, "assert tracked");
        }
        self.top_frame().tracked.push((literal.clone(), term.clone()));
        self.invalidate();
        Ok(literal)
    }

    /// Check the active assertions.
    ///
    /// Shutdown requests are observed when a check starts. A check already
    /// running inside the backend finishes or hits `timeout_secs` first.
    pub fn check_sat(&mut self) -> Result<SatResult, SolverError> {
        self.shutdown.check()?;
        let literals: Vec<String> = self.active_tracked().map(|(l, _)| l.clone()).collect();
        let want_model = self.options.generate_models || self.instrumentation.checks_models();

        let (mut result, model) = if want_model {
            let names: Vec<(String, SmtSort)> = self
                .declared
                .iter()
                .map(|(name, sort)| (name.clone(), *sort))
                .collect();
            let vars: Vec<(&str, &SmtSort)> =
                names.iter().map(|(n, s)| (n.as_str(), s)).collect();
            if literals.is_empty() {
                self.solver.check_sat_with_model(&vars)?
            } else {
                self.solver.check_sat_assuming_with_model(&literals, &vars)?
            }
        } else if literals.is_empty() {
            (self.solver.check_sat()?, None)
        } else {
            (self.solver.check_sat_assuming(&literals)?, None)
        };

        if matches!(result, SatResult::Unknown(_)) && self.shutdown.should_shutdown() {
            // The engine gave up because we asked it to.
            self.shutdown.check()?;
        }
        if self.instrumentation.checks_models() && result == SatResult::Sat {
            if let Some(model) = &model {
                if let Some(violated) = self.first_violated(model) {
                    warn!(
                        prover = self.id,
                        backend = %self.backend,
                        assertion = %violated,
                        "model does not satisfy an active assertion"
                    );
                    result = SatResult::Unknown(format!(
                        "inconsistent model for assertion {violated}"
                    ));
                }
            }
        }
        if self.instrumentation.logs() {
            debug!(prover = self.id, ?result, "check-sat");
        }
        self.last_model = if self.options.generate_models && result == SatResult::Sat {
            model
        } else {
            None
        };
        self.last_result = Some(result.clone());
        Ok(result)
    }

    /// `Ok(true)` if the active assertions are unsatisfiable.
    ///
    /// An `unknown` answer is an error.
    pub fn is_unsat(&mut self) -> Result<bool, SolverError> {
        match self.check_sat()? {
            SatResult::Unsat => Ok(true),
            SatResult::Sat => Ok(false),
            SatResult::Unknown(reason) => Err(SolverError::Unknown(reason)),
        }
    }

    /// Model of the last satisfiable check.
    pub fn model(&self) -> Result<&Model, SolverError> {
        if !self.options.generate_models {
            return Err(SolverError::Internal(
                "model requested from a prover without model generation".into(),
            ));
        }
        self.last_model.as_ref().ok_or_else(|| {
            SolverError::Internal("no model: the last check was not satisfiable".into())
        })
    }

    /// Tracked assertions forming an unsat core of the last check.
    pub fn unsat_core(&mut self) -> Result<Vec<SmtTerm>, SolverError> {
        if !self.options.generate_unsat_cores {
            return Err(SolverError::Internal(
                "unsat core requested from a prover without unsat-core generation".into(),
            ));
        }
        if self.last_result != Some(SatResult::Unsat) {
            return Err(SolverError::Internal(
                "no unsat core: the last check was not unsatisfiable".into(),
            ));
        }
        let names = self.solver.get_unsat_core_assumptions()?;
        let core: Vec<SmtTerm> = self
            .active_tracked()
            .filter(|(literal, _)| names.contains(literal))
            .map(|(_, term)| term.clone())
            .collect();
        if self.instrumentation.logs() {
            debug!(prover = self.id, size = core.len(), "unsat core");
        }
        Ok(core)
    }

    /// Drop every scope, assertion and declaration, leaving an empty prover
    /// on the same backend solver.
    ///
    /// Tracking literals keep counting up, so literals named before the
    /// reset are never reused.
    pub fn reset(&mut self) -> Result<(), SolverError> {
        self.solver.reset()?;
        self.declared.clear();
        self.frames = vec![Frame::default()];
        self.invalidate();
        if self.instrumentation.logs() {
            debug!(prover = self.id, "reset");
        }
        Ok(())
    }

    pub(crate) fn solver_mut(&mut self) -> &mut DynSolver {
        &mut self.solver
    }

    pub(crate) fn shutdown(&self) -> &ShutdownNotifier {
        &self.shutdown
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn last_result(&self) -> Option<&SatResult> {
        self.last_result.as_ref()
    }

    fn active_tracked(&self) -> impl Iterator<Item = &(String, SmtTerm)> {
        self.frames.iter().flat_map(|f| f.tracked.iter())
    }

    fn first_violated(&self, model: &Model) -> Option<&SmtTerm> {
        let plain = self.frames.iter().flat_map(|f| f.assertions.iter());
        let tracked = self.active_tracked().map(|(_, term)| term);
        plain
            .chain(tracked)
            .find(|term| term.evaluate(model) == Some(ModelValue::Bool(false)))
    }

    fn declare_free_vars(&mut self, term: &SmtTerm) -> Result<(), SolverError> {
        for (name, sort) in infer_declarations(term) {
            if self.declared.get(&name) == Some(&sort) {
                continue;
            }
            self.solver.declare_var(&name, &sort)?;
            self.declared.insert(name, sort);
        }
        Ok(())
    }

    fn top_frame(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn invalidate(&mut self) {
        self.last_result = None;
        self.last_model = None;
    }
}

impl Drop for ProverEnvironment {
    fn drop(&mut self) {
        if self.instrumentation.logs() {
            debug!(prover = self.id, depth = self.depth(), "closed prover");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::z3_backend::Z3Solver;
    use crate::solver::Erased;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn z3_prover(options: ProverOptions, instrumentation: Instrumentation) -> ProverEnvironment {
        ProverEnvironment::new(
            0,
            Erased::boxed(Z3Solver::new()),
            "z3",
            options,
            instrumentation,
            ShutdownNotifier::new(),
        )
    }

    #[test]
    fn instrumentation_follows_options() {
        let mut options = SolverOptions::default();
        assert_eq!(Instrumentation::from_options(&options), Instrumentation::Plain);
        options.check_model_consistency = true;
        assert_eq!(Instrumentation::from_options(&options), Instrumentation::Checked);
        options.log_all_queries = true;
        let both = Instrumentation::from_options(&options);
        assert_eq!(both, Instrumentation::LoggedChecked);
        assert!(both.logs() && both.checks_models());
    }

    #[test]
    fn free_variables_are_declared_lazily() -> TestResult {
        let mut prover = z3_prover(ProverOptions::with_models(), Instrumentation::Checked);
        prover.assert_term(&SmtTerm::var("x@1").add(SmtTerm::var("y@1")).eq(SmtTerm::int(7)))?;
        prover.assert_term(&SmtTerm::var("x@1").eq(SmtTerm::int(3)))?;
        assert_eq!(prover.check_sat()?, SatResult::Sat);
        assert_eq!(prover.model()?.get_int("y@1"), Some(4));
        Ok(())
    }

    #[test]
    fn pop_restores_satisfiability() -> TestResult {
        let mut prover = z3_prover(ProverOptions::default(), Instrumentation::Logged);
        prover.assert_term(&SmtTerm::var("x").ge(SmtTerm::int(0)))?;
        prover.push()?;
        prover.assert_term(&SmtTerm::var("x").lt(SmtTerm::int(0)))?;
        assert!(prover.is_unsat()?);
        prover.pop()?;
        assert!(!prover.is_unsat()?);
        assert_eq!(prover.depth(), 0);
        assert!(matches!(prover.pop(), Err(SolverError::Internal(_))));
        Ok(())
    }

    #[test]
    fn unsat_core_names_the_conflicting_assertions() -> TestResult {
        let mut prover = z3_prover(ProverOptions::with_unsat_cores(), Instrumentation::Plain);
        let low = SmtTerm::var("x").ge(SmtTerm::int(10));
        let unrelated = SmtTerm::var("y").eq(SmtTerm::int(1));
        let high = SmtTerm::var("x").le(SmtTerm::int(5));
        for term in [&low, &unrelated, &high] {
            prover.assert_tracked(term)?;
        }
        assert!(prover.is_unsat()?);
        let core = prover.unsat_core()?;
        assert!(core.contains(&low));
        assert!(core.contains(&high));
        assert!(!core.contains(&unrelated));
        Ok(())
    }

    #[test]
    fn tracking_requires_unsat_core_option() {
        let mut prover = z3_prover(ProverOptions::default(), Instrumentation::Plain);
        let err = prover
            .assert_tracked(&SmtTerm::bool(true))
            .expect_err("unsat cores are disabled");
        assert!(matches!(err, SolverError::Internal(_)));
    }

    #[test]
    fn shutdown_interrupts_the_next_check() -> TestResult {
        let notifier = ShutdownNotifier::new();
        let mut prover = ProverEnvironment::new(
            1,
            Erased::boxed(Z3Solver::new()),
            "z3",
            ProverOptions::default(),
            Instrumentation::Plain,
            notifier.clone(),
        );
        prover.assert_term(&SmtTerm::var("p"))?;
        notifier.request_shutdown("deadline");
        let err = prover.check_sat().expect_err("shutdown requested");
        assert!(matches!(err, SolverError::Interrupted(ref r) if r == "deadline"));
        Ok(())
    }

    #[test]
    fn reset_discards_scopes_and_assertions() -> TestResult {
        let mut prover = z3_prover(ProverOptions::with_unsat_cores(), Instrumentation::Plain);
        let x = SmtTerm::var("x");
        prover.assert_term(&x.clone().gt(SmtTerm::int(0)))?;
        prover.push()?;
        prover.assert_tracked(&x.clone().lt(SmtTerm::int(0)))?;
        assert!(prover.is_unsat()?);

        prover.reset()?;
        assert_eq!(prover.depth(), 0);
        assert!(prover.pop().is_err());
        assert!(prover.unsat_core().is_err());
        prover.assert_tracked(&x.lt(SmtTerm::int(0)))?;
        assert!(!prover.is_unsat()?);
        Ok(())
    }

    #[test]
    fn shutdown_is_observed_between_checks_and_survives_reset() -> TestResult {
        let notifier = ShutdownNotifier::new();
        let mut prover = ProverEnvironment::new(
            2,
            Erased::boxed(Z3Solver::new()),
            "z3",
            ProverOptions::default(),
            Instrumentation::Plain,
            notifier.clone(),
        );
        prover.assert_term(&SmtTerm::var("p"))?;
        assert!(!prover.is_unsat()?);

        notifier.request_shutdown("deadline");
        assert!(matches!(prover.check_sat(), Err(SolverError::Interrupted(_))));
        prover.reset()?;
        assert!(matches!(prover.check_sat(), Err(SolverError::Interrupted(_))));
        assert!(notifier.should_shutdown());
        Ok(())
    }
}
