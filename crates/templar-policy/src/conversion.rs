//! Turning abstracted states into solver constraints and back into paths.

use std::sync::{Arc, OnceLock};

use num::rational::BigRational;
use num::ToPrimitive;
use tracing::{debug, warn};

use templar_smt::{ShutdownNotifier, SmtTerm};

use crate::cfa::CfaNode;
use crate::congruence::CongruenceManager;
use crate::error::InvariantError;
use crate::invariants::{InvariantGenerator, InvariantSupplier};
use crate::path_formula::{PathFormula, PathFormulaManager};
use crate::state::{PolicyAbstractedState, PolicyIntermediateState, StateArena, StateId};
use crate::template::Template;

pub struct StateFormulaConversionManager {
    fmgr: PathFormulaManager,
    congruence: Arc<CongruenceManager>,
    generator: Box<dyn InvariantGenerator>,
    shutdown: ShutdownNotifier,
    supplier: OnceLock<Arc<dyn InvariantSupplier>>,
}

impl StateFormulaConversionManager {
    pub fn new(
        fmgr: PathFormulaManager,
        congruence: Arc<CongruenceManager>,
        generator: Box<dyn InvariantGenerator>,
        shutdown: ShutdownNotifier,
    ) -> Self {
        Self {
            fmgr,
            congruence,
            generator,
            shutdown,
            supplier: OnceLock::new(),
        }
    }

    /// A length-one path at the state's SSA indices. Its payload is the
    /// instantiated extra invariant when `attach` is set, `true` otherwise.
    pub fn get_path_formula(&self, state: &PolicyAbstractedState, attach: bool) -> PathFormula {
        let formula = if attach {
            self.fmgr.instantiate(state.extra_invariant(), state.ssa())
        } else {
            SmtTerm::bool(true)
        };
        PathFormula::new(
            formula,
            state.ssa().clone(),
            state.pointer_target_set().clone(),
            1,
        )
    }

    /// Constraints describing `state`, instantiated at its SSA indices.
    ///
    /// The congruence formula comes first, then one `t <= bound` per
    /// tracked template. With `attach`, the extra invariant and the
    /// generated invariant for the node follow as a single last element
    /// unless they are trivially true.
    pub fn abstract_state_to_constraints(
        &self,
        state: &PolicyAbstractedState,
        attach: bool,
    ) -> Vec<SmtTerm> {
        let path = self.get_path_formula(state, false);
        let mut constraints = vec![self.congruence.to_formula(state.congruence(), &path)];
        for (template, bound) in state.abstraction() {
            let value = template.to_formula(&self.fmgr, state.ssa());
            if let Some(constraint) = bounded_by(value, template, bound.bound()) {
                constraints.push(constraint);
            }
        }
        if attach {
            let extra = self.fmgr.instantiate(state.extra_invariant(), state.ssa());
            let generated = self
                .fmgr
                .instantiate(&self.get_invariant_for(state.node()), state.ssa());
            let invariant = SmtTerm::conjunction([extra, generated]);
            if !invariant.is_true() {
                constraints.push(invariant);
            }
        }
        constraints
    }

    /// Constraints of the newest version of the state `intermediate`
    /// started from.
    pub fn get_start_constraints(
        &self,
        intermediate: &PolicyIntermediateState,
        arena: &mut StateArena,
        attach: bool,
    ) -> SmtTerm {
        let start = arena.latest(intermediate.generating_state());
        SmtTerm::conjunction(self.abstract_state_to_constraints(start, attach))
    }

    pub fn abstract_state_to_intermediate(
        &self,
        id: StateId,
        arena: &StateArena,
        attach: bool,
    ) -> PolicyIntermediateState {
        let state = arena.get(id);
        PolicyIntermediateState::new(state.node(), self.get_path_formula(state, attach), id)
    }

    /// Generated invariant at `node`, uninstantiated; `true` when the
    /// generator has nothing to offer.
    ///
    /// # Panics
    ///
    /// If the generator fails for a reason other than interruption.
    pub fn get_invariant_for(&self, node: CfaNode) -> SmtTerm {
        match self.supplier() {
            Some(supplier) => supplier.invariant_for(node),
            None => SmtTerm::bool(true),
        }
    }

    /// The state as a single formula over program variables, for reports.
    /// Invariants are left out.
    pub fn formula_approximation(&self, state: &PolicyAbstractedState) -> SmtTerm {
        let constraints = self.abstract_state_to_constraints(state, false);
        self.fmgr.uninstantiate(&SmtTerm::conjunction(constraints))
    }

    fn supplier(&self) -> Option<&Arc<dyn InvariantSupplier>> {
        if let Some(supplier) = self.supplier.get() {
            return Some(supplier);
        }
        match self.generator.supplier() {
            Ok(supplier) => Some(self.supplier.get_or_init(|| supplier)),
            Err(InvariantError::Interrupted(reason)) => {
                // The generator consumed the request; pass it on.
                warn!(%reason, "invariant generation interrupted, continuing without");
                self.shutdown.request_shutdown(reason);
                None
            }
            Err(InvariantError::Failed(message)) => {
                panic!("invariant generation failed unexpectedly: {message}")
            }
        }
    }
}

/// `q*value <= p` for `bound == p/q`, or `None` when `p` or `q` does not
/// fit a machine integer.
fn bounded_by(value: SmtTerm, template: &Template, bound: &BigRational) -> Option<SmtTerm> {
    let (Some(p), Some(q)) = (bound.numer().to_i64(), bound.denom().to_i64()) else {
        warn!(%template, %bound, "bound out of range, treating template as unbounded");
        return None;
    };
    let scaled = if q == 1 {
        value
    } else {
        SmtTerm::int(q).mul(value)
    };
    debug!(%template, %bound, "encoding bound");
    Some(scaled.le(SmtTerm::int(p)))
}
