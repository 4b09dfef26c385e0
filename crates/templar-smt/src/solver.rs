use std::collections::HashMap;

use crate::error::SolverError;
use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

/// Result of a satisfiability check.
#[derive(Debug, Clone, PartialEq)]
pub enum SatResult {
    Sat,
    Unsat,
    Unknown(String),
}

/// A model (variable assignments) extracted from a SAT result.
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub values: HashMap<String, ModelValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelValue {
    Int(i64),
    Bool(bool),
}

impl Model {
    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(ModelValue::Int(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(ModelValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }
}

/// Abstract SMT solver interface.
pub trait SmtSolver {
    type Error: std::error::Error + 'static;

    /// Declare a new variable.
    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), Self::Error>;

    /// Assert a constraint.
    fn assert(&mut self, term: &SmtTerm) -> Result<(), Self::Error>;

    /// Push a new scope.
    fn push(&mut self) -> Result<(), Self::Error>;

    /// Pop a scope.
    fn pop(&mut self) -> Result<(), Self::Error>;

    /// Check satisfiability.
    fn check_sat(&mut self) -> Result<SatResult, Self::Error>;

    /// Check satisfiability and extract a model if SAT.
    fn check_sat_with_model(
        &mut self,
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), Self::Error>;

    /// Returns true when the backend supports `check-sat-assuming` with
    /// retrievable UNSAT cores over the provided assumptions.
    fn supports_assumption_unsat_core(&self) -> bool {
        false
    }

    /// Check satisfiability under a set of Boolean assumption variables.
    ///
    /// Assumptions are backend variable names that must be declared as `Bool`.
    fn check_sat_assuming(&mut self, _assumptions: &[String]) -> Result<SatResult, Self::Error> {
        self.check_sat()
    }

    /// Like [`SmtSolver::check_sat_assuming`], extracting a model if SAT.
    ///
    /// The default answers without a model.
    fn check_sat_assuming_with_model(
        &mut self,
        assumptions: &[String],
        _var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), Self::Error> {
        Ok((self.check_sat_assuming(assumptions)?, None))
    }

    /// Return UNSAT-core assumptions for the previous `check_sat_assuming`.
    fn get_unsat_core_assumptions(&mut self) -> Result<Vec<String>, Self::Error> {
        Ok(Vec::new())
    }

    /// Returns true when [`SmtSolver::get_interpolant`] can produce answers.
    fn supports_interpolation(&self) -> bool {
        false
    }

    /// Compute a Craig interpolant between the assertions guarded by
    /// `a_assumptions` and the formula `b`.
    ///
    /// The result `I` satisfies `A ⇒ I` and `I ∧ B` is unsatisfiable, and only
    /// mentions symbols shared by both sides. `Ok(None)` means the backend
    /// cannot interpolate.
    fn get_interpolant(
        &mut self,
        _a_assumptions: &[String],
        _b: &SmtTerm,
    ) -> Result<Option<SmtTerm>, Self::Error> {
        Ok(None)
    }

    /// Reset the solver state.
    fn reset(&mut self) -> Result<(), Self::Error>;
}

/// A type-erased solver whose errors are already [`SolverError`]s.
pub type DynSolver = Box<dyn SmtSolver<Error = SolverError>>;

/// Adapter lifting a concrete backend into a [`DynSolver`].
pub struct Erased<S>(pub S);

impl<S> Erased<S>
where
    S: SmtSolver + 'static,
    SolverError: From<S::Error>,
{
    pub fn boxed(solver: S) -> DynSolver {
        Box::new(Erased(solver))
    }
}

impl<S> SmtSolver for Erased<S>
where
    S: SmtSolver,
    SolverError: From<S::Error>,
{
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

    fn supports_assumption_unsat_core(&self) -> bool {
        self.0.supports_assumption_unsat_core()
    }

    fn check_sat_assuming(&mut self, assumptions: &[String]) -> Result<SatResult, SolverError> {
        Ok(self.0.check_sat_assuming(assumptions)?)
    }

    fn check_sat_assuming_with_model(
        &mut self,
        assumptions: &[String],
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), SolverError> {
        Ok(self.0.check_sat_assuming_with_model(assumptions, var_names)?)
    }

    fn get_unsat_core_assumptions(&mut self) -> Result<Vec<String>, SolverError> {
        Ok(self.0.get_unsat_core_assumptions()?)
    }

    fn supports_interpolation(&self) -> bool {
        self.0.supports_interpolation()
    }

    fn get_interpolant(
        &mut self,
        a_assumptions: &[String],
        b: &SmtTerm,
    ) -> Result<Option<SmtTerm>, SolverError> {
        Ok(self.0.get_interpolant(a_assumptions, b)?)
    }

    fn reset(&mut self) -> Result<(), SolverError> {
        Ok(self.0.reset()?)
    }
}
