//! Parity sub-domain: which templates are provably even or odd.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use templar_smt::{SmtTerm, SolverError, SolverService};

use crate::cfa::CfaNode;
use crate::config::PolicyOptions;
use crate::error::TransferError;
use crate::path_formula::{PathFormula, PathFormulaManager};
use crate::template::{Template, TemplateKind, TemplatePrecision};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Congruence {
    Even,
    Odd,
}

impl Congruence {
    /// Remainder modulo two.
    pub fn remainder(self) -> i64 {
        match self {
            Congruence::Even => 0,
            Congruence::Odd => 1,
        }
    }
}

impl fmt::Display for Congruence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Congruence::Even => write!(f, "EVEN"),
            Congruence::Odd => write!(f, "ODD"),
        }
    }
}

/// Known parities. A template without an entry may have either parity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CongruenceState {
    data: BTreeMap<Template, Congruence>,
}

impl CongruenceState {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn of(data: impl IntoIterator<Item = (Template, Congruence)>) -> Self {
        Self {
            data: data.into_iter().collect(),
        }
    }

    pub fn get(&self, template: &Template) -> Option<Congruence> {
        self.data.get(template).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Template, Congruence)> {
        self.data.iter().map(|(t, c)| (t, *c))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Facts recorded identically in both states.
    pub fn join(&self, other: &CongruenceState) -> CongruenceState {
        let data = self
            .data
            .iter()
            .filter(|(t, c)| other.data.get(*t) == Some(*c))
            .map(|(t, c)| (t.clone(), *c))
            .collect();
        CongruenceState { data }
    }

    /// Whether `self` records every fact `other` records.
    pub fn is_less_or_equal(&self, other: &CongruenceState) -> bool {
        other
            .data
            .iter()
            .all(|(t, c)| self.data.get(t) == Some(c))
    }
}

impl fmt::Display for CongruenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (template, class)) in self.data.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{template}: {class}")?;
        }
        write!(f, "}}")
    }
}

/// Computes parity facts with two solver probes per template.
pub struct CongruenceManager {
    solver: Arc<SolverService>,
    fmgr: PathFormulaManager,
    options: PolicyOptions,
}

impl CongruenceManager {
    pub fn new(
        solver: Arc<SolverService>,
        fmgr: PathFormulaManager,
        options: PolicyOptions,
    ) -> Self {
        Self {
            solver,
            fmgr,
            options,
        }
    }

    /// Integral upper-bound templates, plus sums when configured.
    pub fn should_use_template(&self, template: &Template) -> bool {
        template.is_integral()
            && match template.kind() {
                TemplateKind::UpperBound => true,
                TemplateKind::Sum => self.options.track_sum_congruences,
                _ => false,
            }
    }

    /// Parities of the tracked templates at the end of `path_formula`,
    /// starting from states satisfying `start_constraints`.
    pub fn perform_abstraction(
        &self,
        node: CfaNode,
        path_formula: &PathFormula,
        start_constraints: &SmtTerm,
        precision: &TemplatePrecision,
    ) -> Result<CongruenceState, TransferError> {
        let templates: Vec<&Template> = precision
            .templates_for(node)
            .into_iter()
            .filter(|t| self.should_use_template(t))
            .collect();
        if templates.is_empty() {
            return Ok(CongruenceState::empty());
        }

        let wrap = |e: SolverError| TransferError::from_solver("congruence abstraction", e);
        let mut prover = self.solver.new_prover_environment(Default::default()).map_err(wrap)?;
        prover.assert_term(&path_formula.formula).map_err(wrap)?;
        prover.assert_term(start_constraints).map_err(wrap)?;

        let mut data = BTreeMap::new();
        for template in templates {
            let value = template.to_formula(&self.fmgr, &path_formula.ssa);
            let mut excludes = |remainder: i64| -> Result<bool, SolverError> {
                prover.push()?;
                let probe = prover
                    .assert_term(&value.clone().congruent(remainder, 2))
                    .and_then(|()| prover.is_unsat());
                prover.pop()?;
                probe
            };
            if excludes(1).map_err(wrap)? {
                data.insert(template.clone(), Congruence::Even);
            } else if excludes(0).map_err(wrap)? {
                data.insert(template.clone(), Congruence::Odd);
            }
        }
        let state = CongruenceState { data };
        debug!(%node, congruence = %state, "congruence abstraction");
        Ok(state)
    }

    pub fn join(&self, a: &CongruenceState, b: &CongruenceState) -> CongruenceState {
        a.join(b)
    }

    pub fn is_less_or_equal(&self, a: &CongruenceState, b: &CongruenceState) -> bool {
        a.is_less_or_equal(b)
    }

    /// `t ≡ r (mod 2)` for every recorded fact, at the end of `path_formula`.
    pub fn to_formula(&self, state: &CongruenceState, path_formula: &PathFormula) -> SmtTerm {
        SmtTerm::conjunction(state.iter().map(|(template, class)| {
            template
                .to_formula(&self.fmgr, &path_formula.ssa)
                .congruent(class.remainder(), 2)
        }))
    }
}
