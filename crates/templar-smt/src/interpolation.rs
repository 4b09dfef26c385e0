//! Interpolating provers and the solver adapters they are assembled from.

use tracing::{debug, trace};

use crate::backends::smtlib_printer::to_smtlib;
use crate::error::SolverError;
use crate::prover::ProverEnvironment;
use crate::smtlib_parser::parse_term;
use crate::solver::{DynSolver, Model, SatResult, SmtSolver};
use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

/// Handle to a formula pushed onto an [`InterpolatingProverEnvironment`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InterpolationGroup(String);

/// A prover whose frames are formulas that can be split into the A and B
/// sides of an interpolation query.
pub struct InterpolatingProverEnvironment {
    prover: ProverEnvironment,
    groups: Vec<(InterpolationGroup, SmtTerm)>,
}

impl InterpolatingProverEnvironment {
    pub(crate) fn new(prover: ProverEnvironment) -> Self {
        Self {
            prover,
            groups: Vec::new(),
        }
    }

    /// Push a new scope holding `formula`.
    pub fn push(&mut self, formula: &SmtTerm) -> Result<InterpolationGroup, SolverError> {
        self.prover.push()?;
        let literal = self.prover.track(formula)?;
        let group = InterpolationGroup(literal);
        self.groups.push((group.clone(), formula.clone()));
        Ok(group)
    }

    /// Drop the most recently pushed formula.
    pub fn pop(&mut self) -> Result<(), SolverError> {
        self.prover.pop()?;
        self.groups.pop();
        Ok(())
    }

    pub fn is_unsat(&mut self) -> Result<bool, SolverError> {
        self.prover.is_unsat()
    }

    pub fn groups(&self) -> impl Iterator<Item = &InterpolationGroup> {
        self.groups.iter().map(|(g, _)| g)
    }

    /// Interpolant between the groups in `a_groups` and every other active
    /// group.
    ///
    /// Must follow an unsatisfiable [`is_unsat`](Self::is_unsat) check.
    pub fn interpolant(
        &mut self,
        a_groups: &[InterpolationGroup],
    ) -> Result<SmtTerm, SolverError> {
        self.prover.shutdown().check()?;
        if self.prover.last_result() != Some(&SatResult::Unsat) {
            return Err(SolverError::Internal(
                "interpolant requested without a preceding unsatisfiable check".into(),
            ));
        }
        for group in a_groups {
            if !self.groups.iter().any(|(g, _)| g == group) {
                return Err(SolverError::Internal(format!(
                    "interpolation group {} is not active",
                    group.0
                )));
            }
        }
        let a_literals: Vec<String> = a_groups.iter().map(|g| g.0.clone()).collect();
        let b = SmtTerm::conjunction(
            self.groups
                .iter()
                .filter(|(g, _)| !a_groups.contains(g))
                .map(|(_, f)| f.clone()),
        );
        let backend = self.prover.backend_name().to_string();
        let id = self.prover.id();
        let logs = self.prover.instrumentation().logs();
        let interpolant = self
            .prover
            .solver_mut()
            .get_interpolant(&a_literals, &b)?
            .ok_or(SolverError::Unsupported {
                operation: "interpolation",
                backend,
            })?;
        if logs {
            debug!(prover = id, %interpolant, "interpolant");
        }
        Ok(interpolant)
    }
}

/// Gives `check-sat-assuming` and assumption cores to a solver that lacks
/// them.
///
/// Assumptions are asserted in a temporary scope; the core is obtained by
/// dropping assumptions one at a time while the rest stay unsatisfiable.
pub struct AssumptionAdapter {
    inner: DynSolver,
    last_assumptions: Vec<String>,
    last_unsat: bool,
}

impl AssumptionAdapter {
    pub fn new(inner: DynSolver) -> Self {
        Self {
            inner,
            last_assumptions: Vec::new(),
            last_unsat: false,
        }
    }

    fn check_under(&mut self, assumptions: &[String]) -> Result<SatResult, SolverError> {
        self.inner.push()?;
        let result = self.assert_literals(assumptions).and_then(|()| self.inner.check_sat());
        self.inner.pop()?;
        result
    }

    fn assert_literals(&mut self, literals: &[String]) -> Result<(), SolverError> {
        for literal in literals {
            self.inner.assert(&SmtTerm::var(literal.clone()))?;
        }
        Ok(())
    }
}

impl SmtSolver for AssumptionAdapter {
    type Error = SolverError;

    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), SolverError> {
        self.inner.declare_var(name, sort)
    }

    fn assert(&mut self, term: &SmtTerm) -> Result<(), SolverError> {
        self.inner.assert(term)
    }

    fn push(&mut self) -> Result<(), SolverError> {
        self.inner.push()
    }

    fn pop(&mut self) -> Result<(), SolverError> {
        self.inner.pop()
    }

    fn check_sat(&mut self) -> Result<SatResult, SolverError> {
        self.inner.check_sat()
    }

    fn check_sat_with_model(
        &mut self,
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), SolverError> {
        self.inner.check_sat_with_model(var_names)
    }

    fn supports_assumption_unsat_core(&self) -> bool {
        true
    }

    fn check_sat_assuming(&mut self, assumptions: &[String]) -> Result<SatResult, SolverError> {
        let result = self.check_under(assumptions)?;
        self.last_assumptions = assumptions.to_vec();
        self.last_unsat = result == SatResult::Unsat;
        Ok(result)
    }

    fn check_sat_assuming_with_model(
        &mut self,
        assumptions: &[String],
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), SolverError> {
        self.inner.push()?;
        let outcome = self
            .assert_literals(assumptions)
            .and_then(|()| self.inner.check_sat_with_model(var_names));
        self.inner.pop()?;
        let (result, model) = outcome?;
        self.last_assumptions = assumptions.to_vec();
        self.last_unsat = result == SatResult::Unsat;
        Ok((result, model))
    }

    fn get_unsat_core_assumptions(&mut self) -> Result<Vec<String>, SolverError> {
        if !self.last_unsat {
            return Ok(Vec::new());
        }
        let mut core = self.last_assumptions.clone();
        let mut i = 0;
        while i < core.len() {
            let mut without = core.clone();
            without.remove(i);
            if self.check_under(&without)? == SatResult::Unsat {
                core = without;
            } else {
                i += 1;
            }
        }
        trace!(
            assumptions = self.last_assumptions.len(),
            core = core.len(),
            "minimized assumption core"
        );
        Ok(core)
    }

    fn supports_interpolation(&self) -> bool {
        self.inner.supports_interpolation()
    }

    fn get_interpolant(
        &mut self,
        a_assumptions: &[String],
        b: &SmtTerm,
    ) -> Result<Option<SmtTerm>, SolverError> {
        self.inner.get_interpolant(a_assumptions, b)
    }

    fn reset(&mut self) -> Result<(), SolverError> {
        self.last_assumptions.clear();
        self.last_unsat = false;
        self.inner.reset()
    }
}

/// Moves terms between two backend instances by printing them as SMT-LIB
/// and reading them back on the other side.
pub struct MarshallingBridge {
    inner: DynSolver,
}

impl MarshallingBridge {
    pub fn new(inner: DynSolver) -> Self {
        Self { inner }
    }

    fn marshal(term: &SmtTerm) -> Result<SmtTerm, SolverError> {
        let text = to_smtlib(term);
        trace!(bytes = text.len(), "marshalling term");
        Ok(parse_term(&text)?)
    }
}

impl SmtSolver for MarshallingBridge {
    type Error = SolverError;

    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), SolverError> {
        self.inner.declare_var(name, sort)
    }

    fn assert(&mut self, term: &SmtTerm) -> Result<(), SolverError> {
        let term = Self::marshal(term)?;
        self.inner.assert(&term)
    }

    fn push(&mut self) -> Result<(), SolverError> {
        self.inner.push()
    }

    fn pop(&mut self) -> Result<(), SolverError> {
        self.inner.pop()
    }

    fn check_sat(&mut self) -> Result<SatResult, SolverError> {
        self.inner.check_sat()
    }

    fn check_sat_with_model(
        &mut self,
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), SolverError> {
        self.inner.check_sat_with_model(var_names)
    }

    fn supports_assumption_unsat_core(&self) -> bool {
        self.inner.supports_assumption_unsat_core()
    }

    fn check_sat_assuming(&mut self, assumptions: &[String]) -> Result<SatResult, SolverError> {
        self.inner.check_sat_assuming(assumptions)
    }

    fn check_sat_assuming_with_model(
        &mut self,
        assumptions: &[String],
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), SolverError> {
        self.inner.check_sat_assuming_with_model(assumptions, var_names)
    }

    fn get_unsat_core_assumptions(&mut self) -> Result<Vec<String>, SolverError> {
        self.inner.get_unsat_core_assumptions()
    }

    fn supports_interpolation(&self) -> bool {
        self.inner.supports_interpolation()
    }

    fn get_interpolant(
        &mut self,
        a_assumptions: &[String],
        b: &SmtTerm,
    ) -> Result<Option<SmtTerm>, SolverError> {
        let b = Self::marshal(b)?;
        match self.inner.get_interpolant(a_assumptions, &b)? {
            Some(itp) => Ok(Some(Self::marshal(&itp)?)),
            None => Ok(None),
        }
    }

    fn reset(&mut self) -> Result<(), SolverError> {
        self.inner.reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::z3_backend::Z3Solver;
    use crate::prover::{Instrumentation, ProverOptions};
    use crate::shutdown::ShutdownNotifier;
    use crate::solver::Erased;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    /// Z3 with its native assumption support hidden.
    struct NoAssumptions(Z3Solver);

    impl SmtSolver for NoAssumptions {
        type Error = SolverError;

        fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), SolverError> {
            Ok(self.0.declare_var(name, sort)?)
        }

        fn assert(&mut self, term: &SmtTerm) -> Result<(), SolverError> {
            Ok(self.0.assert(term)?)
        }

        fn push(&mut self) -> Result<(), SolverError> {
            Ok(self.0.push()?)
        }

        fn pop(&mut self) -> Result<(), SolverError> {
            Ok(self.0.pop()?)
        }

        fn check_sat(&mut self) -> Result<SatResult, SolverError> {
            Ok(self.0.check_sat()?)
        }

        fn check_sat_with_model(
            &mut self,
            var_names: &[(&str, &SmtSort)],
        ) -> Result<(SatResult, Option<Model>), SolverError> {
            Ok(self.0.check_sat_with_model(var_names)?)
        }

        fn reset(&mut self) -> Result<(), SolverError> {
            Ok(self.0.reset()?)
        }
    }

    fn lit(name: &str) -> String {
        name.to_string()
    }

    #[test]
    fn adapter_emulates_assumptions_and_minimizes_cores() -> TestResult {
        let mut solver = AssumptionAdapter::new(Box::new(NoAssumptions(Z3Solver::new())));
        for name in ["a", "b", "c"] {
            solver.declare_var(name, &SmtSort::Bool)?;
        }
        solver.declare_var("x", &SmtSort::Int)?;
        solver.assert(&SmtTerm::var("a").implies(SmtTerm::var("x").gt(SmtTerm::int(3))))?;
        solver.assert(&SmtTerm::var("b").implies(SmtTerm::var("x").eq(SmtTerm::int(100))))?;
        solver.assert(&SmtTerm::var("c").implies(SmtTerm::var("x").lt(SmtTerm::int(2))))?;

        assert_eq!(solver.check_sat_assuming(&[lit("a"), lit("b")])?, SatResult::Sat);
        let all = [lit("a"), lit("b"), lit("c")];
        assert_eq!(solver.check_sat_assuming(&all)?, SatResult::Unsat);
        let mut core = solver.get_unsat_core_assumptions()?;
        core.sort();
        assert_eq!(core, vec![lit("b"), lit("c")]);

        // The temporary scope leaves no trace.
        assert_eq!(solver.check_sat()?, SatResult::Sat);
        Ok(())
    }

    #[test]
    fn bridge_forwards_marshalled_terms() -> TestResult {
        let mut solver = MarshallingBridge::new(Erased::boxed(Z3Solver::new()));
        solver.declare_var("x@2", &SmtSort::Int)?;
        solver.assert(&SmtTerm::var("x@2").congruent(1, 2))?;
        solver.assert(&SmtTerm::var("x@2").eq(SmtTerm::int(-3)))?;
        assert_eq!(solver.check_sat()?, SatResult::Sat);
        Ok(())
    }

    #[test]
    fn z3_groups_report_interpolation_as_unsupported() -> TestResult {
        let prover = ProverEnvironment::new(
            7,
            Erased::boxed(Z3Solver::new()),
            "z3",
            ProverOptions::default(),
            Instrumentation::Plain,
            ShutdownNotifier::new(),
        );
        let mut itp = InterpolatingProverEnvironment::new(prover);
        let a = itp.push(&SmtTerm::var("x").ge(SmtTerm::int(5)))?;
        let _b = itp.push(&SmtTerm::var("x").le(SmtTerm::int(0)))?;
        assert_eq!(itp.groups().count(), 2);
        assert!(itp.is_unsat()?);
        let err = itp.interpolant(&[a]).expect_err("z3 cannot interpolate");
        assert!(matches!(err, SolverError::Unsupported { .. }));

        itp.pop()?;
        assert!(!itp.is_unsat()?);
        Ok(())
    }

    #[test]
    fn interpolant_requires_an_unsat_check() -> TestResult {
        let prover = ProverEnvironment::new(
            8,
            Erased::boxed(Z3Solver::new()),
            "z3",
            ProverOptions::default(),
            Instrumentation::Plain,
            ShutdownNotifier::new(),
        );
        let mut itp = InterpolatingProverEnvironment::new(prover);
        let a = itp.push(&SmtTerm::var("y").ge(SmtTerm::int(0)))?;
        let err = itp.interpolant(&[a]).expect_err("no check yet");
        assert!(matches!(err, SolverError::Internal(_)));
        Ok(())
    }
}
