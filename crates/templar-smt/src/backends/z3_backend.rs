//! In-process Z3 backend.
//!
//! Z3 contexts are thread-local, so a [`Z3Solver`] must stay on the thread
//! that created it; the prover environments built on top of it are `!Send`.

use std::collections::HashMap;

use thiserror::Error;
use z3::SatResult as Z3SatResult;

use crate::solver::{Model, ModelValue, SatResult, SmtSolver};
use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

#[derive(Debug, Error)]
pub enum Z3Error {
    #[error("Z3 error: {0}")]
    Internal(String),
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),
    #[error("Sort mismatch: {0}")]
    SortMismatch(String),
}

pub struct Z3Solver {
    solver: z3::Solver,
    vars: HashMap<String, Z3Term>,
    last_assumptions: Vec<(String, z3::ast::Bool)>,
    params: Option<z3::Params>,
}

impl Z3Solver {
    pub fn new() -> Self {
        Self::with_timeout_secs(0)
    }

    /// Build a solver whose individual checks give up after `timeout_secs`
    /// (`0` disables the limit).
    pub fn with_timeout_secs(timeout_secs: u64) -> Self {
        let solver = z3::Solver::new();
        let params = if timeout_secs == 0 {
            None
        } else {
            let mut params = z3::Params::new();
            let timeout_ms = timeout_secs.saturating_mul(1000).min(u32::MAX as u64) as u32;
            params.set_u32("timeout", timeout_ms);
            solver.set_params(&params);
            Some(params)
        };
        Self {
            solver,
            vars: HashMap::new(),
            last_assumptions: Vec::new(),
            params,
        }
    }

    fn translate_term(&self, term: &SmtTerm) -> Result<Z3Term, Z3Error> {
        match term {
            SmtTerm::Var(name) => self
                .vars
                .get(name)
                .cloned()
                .ok_or_else(|| Z3Error::UnknownVariable(name.clone())),
            SmtTerm::IntLit(n) => Ok(Z3Term::Int(z3::ast::Int::from_i64(*n))),
            SmtTerm::BoolLit(b) => Ok(Z3Term::Bool(z3::ast::Bool::from_bool(*b))),
            SmtTerm::Add(lhs, rhs) => {
                let (l, r) = self.int_operands(lhs, rhs)?;
                Ok(Z3Term::Int(&l + &r))
            }
            SmtTerm::Sub(lhs, rhs) => {
                let (l, r) = self.int_operands(lhs, rhs)?;
                Ok(Z3Term::Int(&l - &r))
            }
            SmtTerm::Mul(lhs, rhs) => {
                let (l, r) = self.int_operands(lhs, rhs)?;
                Ok(Z3Term::Int(&l * &r))
            }
            SmtTerm::Mod(lhs, rhs) => {
                let (l, r) = self.int_operands(lhs, rhs)?;
                Ok(Z3Term::Int(l.modulo(&r)))
            }
            SmtTerm::Eq(lhs, rhs) => match (self.translate_term(lhs)?, self.translate_term(rhs)?) {
                (Z3Term::Int(l), Z3Term::Int(r)) => Ok(Z3Term::Bool(l.eq(&r))),
                (Z3Term::Bool(l), Z3Term::Bool(r)) => Ok(Z3Term::Bool(l.eq(&r))),
                _ => Err(Z3Error::SortMismatch("operands of '='".into())),
            },
            SmtTerm::Lt(lhs, rhs) => {
                let (l, r) = self.int_operands(lhs, rhs)?;
                Ok(Z3Term::Bool(l.lt(&r)))
            }
            SmtTerm::Le(lhs, rhs) => {
                let (l, r) = self.int_operands(lhs, rhs)?;
                Ok(Z3Term::Bool(l.le(&r)))
            }
            SmtTerm::Gt(lhs, rhs) => {
                let (l, r) = self.int_operands(lhs, rhs)?;
                Ok(Z3Term::Bool(l.gt(&r)))
            }
            SmtTerm::Ge(lhs, rhs) => {
                let (l, r) = self.int_operands(lhs, rhs)?;
                Ok(Z3Term::Bool(l.ge(&r)))
            }
            SmtTerm::And(terms) => {
                let bools = self.bool_operands(terms)?;
                let refs: Vec<&z3::ast::Bool> = bools.iter().collect();
                Ok(Z3Term::Bool(z3::ast::Bool::and(&refs)))
            }
            SmtTerm::Or(terms) => {
                let bools = self.bool_operands(terms)?;
                let refs: Vec<&z3::ast::Bool> = bools.iter().collect();
                Ok(Z3Term::Bool(z3::ast::Bool::or(&refs)))
            }
            SmtTerm::Not(inner) => {
                let b = self.translate_term(inner)?.into_bool()?;
                Ok(Z3Term::Bool(b.not()))
            }
            SmtTerm::Implies(lhs, rhs) => {
                let l = self.translate_term(lhs)?.into_bool()?;
                let r = self.translate_term(rhs)?.into_bool()?;
                Ok(Z3Term::Bool(l.implies(&r)))
            }
            SmtTerm::Ite(cond, then, els) => {
                let c = self.translate_term(cond)?.into_bool()?;
                match (self.translate_term(then)?, self.translate_term(els)?) {
                    (Z3Term::Int(t), Z3Term::Int(e)) => Ok(Z3Term::Int(c.ite(&t, &e))),
                    (Z3Term::Bool(t), Z3Term::Bool(e)) => Ok(Z3Term::Bool(c.ite(&t, &e))),
                    _ => Err(Z3Error::SortMismatch("branches of 'ite'".into())),
                }
            }
            SmtTerm::ForAll(_, _) | SmtTerm::Exists(_, _) => Err(Z3Error::Internal(
                "Quantifiers are not supported in policy constraints".into(),
            )),
        }
    }

    fn int_operands(
        &self,
        lhs: &SmtTerm,
        rhs: &SmtTerm,
    ) -> Result<(z3::ast::Int, z3::ast::Int), Z3Error> {
        let l = self.translate_term(lhs)?.into_int()?;
        let r = self.translate_term(rhs)?.into_int()?;
        Ok((l, r))
    }

    fn bool_operands(&self, terms: &[SmtTerm]) -> Result<Vec<z3::ast::Bool>, Z3Error> {
        terms
            .iter()
            .map(|t| self.translate_term(t).and_then(Z3Term::into_bool))
            .collect()
    }

    fn convert(result: Z3SatResult, solver: &z3::Solver) -> SatResult {
        match result {
            Z3SatResult::Sat => SatResult::Sat,
            Z3SatResult::Unsat => SatResult::Unsat,
            Z3SatResult::Unknown => SatResult::Unknown(
                solver
                    .get_reason_unknown()
                    .unwrap_or_else(|| "Z3 returned unknown".into()),
            ),
        }
    }
}

#[derive(Clone)]
enum Z3Term {
    Int(z3::ast::Int),
    Bool(z3::ast::Bool),
}

impl Z3Term {
    fn into_int(self) -> Result<z3::ast::Int, Z3Error> {
        match self {
            Z3Term::Int(i) => Ok(i),
            Z3Term::Bool(_) => Err(Z3Error::SortMismatch("expected Int, got Bool".into())),
        }
    }

    fn into_bool(self) -> Result<z3::ast::Bool, Z3Error> {
        match self {
            Z3Term::Bool(b) => Ok(b),
            Z3Term::Int(_) => Err(Z3Error::SortMismatch("expected Bool, got Int".into())),
        }
    }
}

impl Z3Solver {
    fn assumption_literals(&mut self, assumptions: &[String]) -> Result<Vec<z3::ast::Bool>, Z3Error> {
        let mut tracked = Vec::with_capacity(assumptions.len());
        for name in assumptions {
            match self.vars.get(name) {
                Some(Z3Term::Bool(b)) => tracked.push((name.clone(), b.clone())),
                Some(Z3Term::Int(_)) => {
                    return Err(Z3Error::SortMismatch(format!(
                        "assumption `{name}` is not declared as Bool"
                    )))
                }
                None => return Err(Z3Error::UnknownVariable(name.clone())),
            }
        }
        let asts = tracked.iter().map(|(_, b)| b.clone()).collect();
        self.last_assumptions = tracked;
        Ok(asts)
    }

    fn finish_with_model(
        &self,
        result: Z3SatResult,
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), Z3Error> {
        if !matches!(result, Z3SatResult::Sat) {
            return Ok((Self::convert(result, &self.solver), None));
        }
        let z3_model = self
            .solver
            .get_model()
            .ok_or_else(|| Z3Error::Internal("SAT but no model available".into()))?;
        let mut values = HashMap::new();
        for &(name, _) in var_names {
            match self.vars.get(name) {
                Some(Z3Term::Int(v)) => {
                    if let Some(n) = z3_model.eval::<z3::ast::Int>(v, true).and_then(|x| x.as_i64()) {
                        values.insert(name.to_string(), ModelValue::Int(n));
                    }
                }
                Some(Z3Term::Bool(v)) => {
                    if let Some(b) = z3_model.eval::<z3::ast::Bool>(v, true).and_then(|x| x.as_bool()) {
                        values.insert(name.to_string(), ModelValue::Bool(b));
                    }
                }
                None => {}
            }
        }
        Ok((SatResult::Sat, Some(Model { values })))
    }
}

impl Default for Z3Solver {
    fn default() -> Self {
        Self::new()
    }
}

impl SmtSolver for Z3Solver {
    type Error = Z3Error;

    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), Z3Error> {
        let var = match sort {
            SmtSort::Int => Z3Term::Int(z3::ast::Int::new_const(name)),
            SmtSort::Bool => Z3Term::Bool(z3::ast::Bool::new_const(name)),
        };
        self.vars.insert(name.to_string(), var);
        Ok(())
    }

    fn assert(&mut self, term: &SmtTerm) -> Result<(), Z3Error> {
        let z3_term = self.translate_term(term)?.into_bool()?;
        self.solver.assert(&z3_term);
        Ok(())
    }

    fn push(&mut self) -> Result<(), Z3Error> {
        self.solver.push();
        Ok(())
    }

    fn pop(&mut self) -> Result<(), Z3Error> {
        self.solver.pop(1);
        Ok(())
    }

    fn check_sat(&mut self) -> Result<SatResult, Z3Error> {
        let result = self.solver.check();
        Ok(Self::convert(result, &self.solver))
    }

    fn check_sat_with_model(
        &mut self,
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), Z3Error> {
        let result = self.solver.check();
        self.finish_with_model(result, var_names)
    }

    fn supports_assumption_unsat_core(&self) -> bool {
        true
    }

    fn check_sat_assuming(&mut self, assumptions: &[String]) -> Result<SatResult, Z3Error> {
        let asts = self.assumption_literals(assumptions)?;
        let result = self.solver.check_assumptions(&asts);
        Ok(Self::convert(result, &self.solver))
    }

    fn check_sat_assuming_with_model(
        &mut self,
        assumptions: &[String],
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), Z3Error> {
        let asts = self.assumption_literals(assumptions)?;
        let result = self.solver.check_assumptions(&asts);
        self.finish_with_model(result, var_names)
    }

    fn get_unsat_core_assumptions(&mut self) -> Result<Vec<String>, Z3Error> {
        let core = self.solver.get_unsat_core();
        Ok(self
            .last_assumptions
            .iter()
            .filter(|(_, lit)| core.iter().any(|c| c == lit))
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn reset(&mut self) -> Result<(), Z3Error> {
        self.solver.reset();
        // Z3 may drop per-solver parameters on reset; reapply timeout if configured.
        if let Some(params) = &self.params {
            self.solver.set_params(params);
        }
        self.vars.clear();
        self.last_assumptions.clear();
        Ok(())
    }
}
