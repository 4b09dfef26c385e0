//! Policy bounds and the registry that numbers policies.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use num::rational::BigRational;
use tracing::trace;

use templar_smt::SmtTerm;

use crate::path_formula::PathFormula;
use crate::state::{StateArena, StateId};
use crate::template::Template;

/// A bound on one template together with the policy that justifies it.
///
/// `formula` is a single policy: a conjunctive path from `predecessor`
/// along which the bound is attained. The predecessor may have been
/// superseded since the bound was built, so it is only handed out through
/// the arena's latest-version lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PolicyBound {
    formula: PathFormula,
    bound: BigRational,
    predecessor: StateId,
    dependencies: BTreeSet<Template>,
}

impl PolicyBound {
    pub fn new(
        formula: PathFormula,
        bound: BigRational,
        predecessor: StateId,
        dependencies: BTreeSet<Template>,
    ) -> Self {
        Self {
            formula,
            bound,
            predecessor,
            dependencies,
        }
    }

    /// Same policy, new value.
    pub fn update_value(&self, bound: BigRational) -> Self {
        Self {
            bound,
            ..self.clone()
        }
    }

    pub fn bound(&self) -> &BigRational {
        &self.bound
    }

    pub fn formula(&self) -> &PathFormula {
        &self.formula
    }

    /// Templates of the predecessor whose bounds this one relies on.
    pub fn dependencies(&self) -> &BTreeSet<Template> {
        &self.dependencies
    }

    /// The newest version of the state the policy starts from.
    pub fn predecessor(&self, arena: &mut StateArena) -> StateId {
        arena.latest_version(self.predecessor)
    }

    /// Equality with both predecessors resolved to their newest versions.
    pub fn same_policy(&self, other: &PolicyBound, arena: &mut StateArena) -> bool {
        self.bound == other.bound
            && self.formula == other.formula
            && self.dependencies == other.dependencies
            && self.predecessor(arena) == other.predecessor(arena)
    }

    /// Stable id of the policy leading from the predecessor to `to_state`.
    pub fn serialize_policy(
        &self,
        to_state: StateId,
        arena: &mut StateArena,
        registry: &PolicyRegistry,
    ) -> u64 {
        let from = self.predecessor(arena);
        registry.id_for(from, &self.formula.formula, to_state)
    }
}

type PolicyKey = (StateId, SmtTerm, StateId);

/// Hands out one id per distinct `(from, formula, to)` triple.
///
/// Ids start at `0` and increase in order of first request. Share one
/// registry (behind an `Arc`) across everything that feeds the same
/// linear system.
#[derive(Debug, Default)]
pub struct PolicyRegistry {
    ids: RwLock<HashMap<PolicyKey, u64>>,
    next_id: AtomicU64,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id_for(&self, from: StateId, formula: &SmtTerm, to: StateId) -> u64 {
        let key = (from, formula.clone(), to);
        {
            let ids = match self.ids.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(id) = ids.get(&key) {
                return *id;
            }
        }
        let mut ids = match self.ids.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *ids.entry(key).or_insert_with(|| {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            trace!(id, %from, %to, "new policy id");
            id
        })
    }

    /// Number of distinct policies seen.
    pub fn len(&self) -> usize {
        match self.ids.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use num::BigInt;

    use crate::cfa::CfaNode;
    use crate::path_formula::{PathFormulaManager, PointerTargetSet, SsaMap};
    use crate::state::PolicyAbstractedState;

    fn rational(n: i64) -> BigRational {
        BigRational::from_integer(BigInt::from(n))
    }

    fn empty_state(node: u32) -> PolicyAbstractedState {
        PolicyAbstractedState::empty(
            CfaNode(node),
            SsaMap::empty(),
            PointerTargetSet::empty(),
            SmtTerm::bool(true),
        )
    }

    fn policy(arena: &mut StateArena, formula: SmtTerm) -> (PolicyBound, StateId) {
        let from = arena.insert(empty_state(0));
        let path = PathFormulaManager::new()
            .make_empty(SsaMap::empty(), PointerTargetSet::empty())
            .with_formula(formula);
        (PolicyBound::new(path, rational(3), from, BTreeSet::new()), from)
    }

    #[test]
    fn update_value_keeps_the_policy() {
        let mut arena = StateArena::new();
        let (bound, from) = policy(&mut arena, SmtTerm::var("x@1").le(SmtTerm::int(3)));
        let updated = bound.update_value(rational(4));
        assert_eq!(updated.bound(), &rational(4));
        assert_eq!(updated.formula(), bound.formula());
        assert_eq!(updated.predecessor(&mut arena), from);
        assert!(!updated.same_policy(&bound, &mut arena));
    }

    #[test]
    fn serialize_policy_is_deterministic() {
        let mut arena = StateArena::new();
        let registry = PolicyRegistry::new();
        let (a, _) = policy(&mut arena, SmtTerm::var("x@1").le(SmtTerm::int(3)));
        let to = arena.insert(empty_state(1));

        let first = a.serialize_policy(to, &mut arena, &registry);
        let again = a.serialize_policy(to, &mut arena, &registry);
        let elsewhere = arena.insert(empty_state(2));
        let other = a.serialize_policy(elsewhere, &mut arena, &registry);

        assert_eq!(first, 0);
        assert_eq!(first, again);
        assert_eq!(other, 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn different_formulas_get_different_ids() {
        let mut arena = StateArena::new();
        let registry = PolicyRegistry::new();
        let (at_most_three, from) = policy(&mut arena, SmtTerm::var("x@1").le(SmtTerm::int(3)));
        let path = at_most_three
            .formula()
            .with_formula(SmtTerm::var("x@1").le(SmtTerm::int(4)));
        let at_most_four = PolicyBound::new(path, rational(3), from, BTreeSet::new());
        let to = arena.insert(empty_state(1));

        let first = at_most_three.serialize_policy(to, &mut arena, &registry);
        let second = at_most_four.serialize_policy(to, &mut arena, &registry);
        assert_ne!(first, second);
        assert_eq!((first, second), (0, 1));
        assert!(!at_most_three.same_policy(&at_most_four, &mut arena));
    }

    #[test]
    fn superseded_predecessors_share_an_id() {
        let mut arena = StateArena::new();
        let registry = PolicyRegistry::new();
        let formula = SmtTerm::var("x@1").le(SmtTerm::int(3));
        let (stale, from) = policy(&mut arena, formula.clone());
        let newer = arena.insert(empty_state(0));
        arena.set_new_version(from, newer);
        let fresh = PolicyBound::new(stale.formula().clone(), rational(3), newer, BTreeSet::new());
        let to = arena.insert(empty_state(1));

        assert!(stale.same_policy(&fresh, &mut arena));
        assert_eq!(
            stale.serialize_policy(to, &mut arena, &registry),
            fresh.serialize_policy(to, &mut arena, &registry)
        );
    }
}
