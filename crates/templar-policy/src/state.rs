//! Abstracted and intermediate states, and the arena that versions them.

use std::collections::BTreeMap;
use std::fmt;

use num::rational::BigRational;

use templar_smt::SmtTerm;

use crate::bound::PolicyBound;
use crate::cfa::CfaNode;
use crate::congruence::CongruenceState;
use crate::path_formula::{PathFormula, PointerTargetSet, SsaMap};
use crate::template::Template;

/// Handle of a state stored in a [`StateArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateId(usize);

impl StateId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// Upper bounds for templates at one program location.
///
/// Immutable: [`update_abstraction`](Self::update_abstraction) returns a new
/// state. Equality ignores the extra invariant.
#[derive(Debug, Clone)]
pub struct PolicyAbstractedState {
    node: CfaNode,
    abstraction: BTreeMap<Template, PolicyBound>,
    congruence: CongruenceState,
    ssa: SsaMap,
    pts: PointerTargetSet,
    extra_invariant: SmtTerm,
    location_id: i64,
}

impl PolicyAbstractedState {
    pub fn of(
        node: CfaNode,
        abstraction: BTreeMap<Template, PolicyBound>,
        congruence: CongruenceState,
        location_id: i64,
        ssa: SsaMap,
        pts: PointerTargetSet,
        extra_invariant: SmtTerm,
    ) -> Self {
        Self {
            node,
            abstraction,
            congruence,
            ssa,
            pts,
            extra_invariant,
            location_id,
        }
    }

    /// The initial state at `node`: no bounds, no parities, location `-1`.
    pub fn empty(
        node: CfaNode,
        ssa: SsaMap,
        pts: PointerTargetSet,
        extra_invariant: SmtTerm,
    ) -> Self {
        Self::of(
            node,
            BTreeMap::new(),
            CongruenceState::empty(),
            -1,
            ssa,
            pts,
            extra_invariant,
        )
    }

    pub fn update_abstraction(&self, abstraction: BTreeMap<Template, PolicyBound>) -> Self {
        Self {
            abstraction,
            ..self.clone()
        }
    }

    /// Bound on `template`, `None` when unbounded.
    pub fn bound(&self, template: &Template) -> Option<&PolicyBound> {
        self.abstraction.get(template)
    }

    pub fn abstraction(&self) -> &BTreeMap<Template, PolicyBound> {
        &self.abstraction
    }

    pub fn templates(&self) -> impl Iterator<Item = &Template> {
        self.abstraction.keys()
    }

    pub fn size(&self) -> usize {
        self.abstraction.len()
    }

    pub fn node(&self) -> CfaNode {
        self.node
    }

    pub fn location_id(&self) -> i64 {
        self.location_id
    }

    pub fn ssa(&self) -> &SsaMap {
        &self.ssa
    }

    pub fn pointer_target_set(&self) -> &PointerTargetSet {
        &self.pts
    }

    pub fn extra_invariant(&self) -> &SmtTerm {
        &self.extra_invariant
    }

    pub fn congruence(&self) -> &CongruenceState {
        &self.congruence
    }

    pub fn is_initial(&self) -> bool {
        self.location_id == -1
    }
}

impl PartialEq for PolicyAbstractedState {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node
            && self.location_id == other.location_id
            && self.abstraction == other.abstraction
            && self.congruence == other.congruence
            && self.ssa == other.ssa
            && self.pts == other.pts
    }
}

impl Eq for PolicyAbstractedState {}

impl fmt::Display for PolicyAbstractedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(loc={}, node={})[", self.location_id, self.node)?;
        for (i, (template, bound)) in self.abstraction.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{template}<={}", bound.bound())?;
        }
        write!(f, "]")
    }
}

/// A state partway through a block: the path formula built since the last
/// abstraction, and the state it started from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyIntermediateState {
    node: CfaNode,
    path_formula: PathFormula,
    generating_state: StateId,
}

impl PolicyIntermediateState {
    pub fn new(node: CfaNode, path_formula: PathFormula, generating_state: StateId) -> Self {
        Self {
            node,
            path_formula,
            generating_state,
        }
    }

    pub fn node(&self) -> CfaNode {
        self.node
    }

    pub fn path_formula(&self) -> &PathFormula {
        &self.path_formula
    }

    /// The state this one was started from, possibly superseded since.
    pub fn generating_state(&self) -> StateId {
        self.generating_state
    }
}

impl fmt::Display for PolicyIntermediateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(node={}, from={}, length={})",
            self.node, self.generating_state, self.path_formula.length
        )
    }
}

#[derive(Debug, Clone)]
struct Slot {
    state: PolicyAbstractedState,
    superseded_by: Option<StateId>,
}

/// Owns every abstracted state. A state replaced by a merge keeps its slot
/// and gains a forward link to its successor.
#[derive(Debug, Clone, Default)]
pub struct StateArena {
    slots: Vec<Slot>,
}

impl StateArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, state: PolicyAbstractedState) -> StateId {
        let id = StateId(self.slots.len());
        self.slots.push(Slot {
            state,
            superseded_by: None,
        });
        id
    }

    /// The state stored under `id`.
    ///
    /// # Panics
    ///
    /// If `id` was issued by another arena.
    pub fn get(&self, id: StateId) -> &PolicyAbstractedState {
        &self.slots[id.0].state
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Record that `id` has been replaced by `next`.
    pub fn set_new_version(&mut self, id: StateId, next: StateId) {
        debug_assert_ne!(id, next, "a state cannot supersede itself");
        debug_assert!(
            !self.reaches(next, id),
            "superseding {id} with {next} would close a cycle"
        );
        self.slots[id.0].superseded_by = Some(next);
    }

    /// The raw forward link of `id`.
    pub fn new_version(&self, id: StateId) -> Option<StateId> {
        self.slots[id.0].superseded_by
    }

    /// Follow forward links to the newest version of `id`, pointing every
    /// visited slot straight at it.
    pub fn latest_version(&mut self, id: StateId) -> StateId {
        let mut visited = Vec::new();
        let mut current = id;
        while let Some(next) = self.slots[current.0].superseded_by {
            visited.push(current);
            current = next;
        }
        for stale in visited {
            self.slots[stale.0].superseded_by = Some(current);
        }
        current
    }

    pub fn latest(&mut self, id: StateId) -> &PolicyAbstractedState {
        let latest = self.latest_version(id);
        self.get(latest)
    }

    /// Current bound of `template` in the newest version of `id`.
    pub fn latest_bound(&mut self, id: StateId, template: &Template) -> Option<BigRational> {
        self.latest(id).bound(template).map(|b| b.bound().clone())
    }

    fn reaches(&self, from: StateId, target: StateId) -> bool {
        let mut current = from;
        loop {
            if current == target {
                return true;
            }
            match self.slots[current.0].superseded_by {
                Some(next) => current = next,
                None => return false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use num::BigInt;

    use crate::path_formula::PathFormulaManager;

    fn initial(node: u32) -> PolicyAbstractedState {
        PolicyAbstractedState::empty(
            CfaNode(node),
            SsaMap::empty(),
            PointerTargetSet::empty(),
            SmtTerm::bool(true),
        )
    }

    fn bounded(arena: &mut StateArena, bound: i64) -> (StateId, PolicyAbstractedState) {
        let start = arena.insert(initial(0));
        let policy = PolicyBound::new(
            PathFormulaManager::new().make_empty(SsaMap::empty(), PointerTargetSet::empty()),
            BigRational::from_integer(BigInt::from(bound)),
            start,
            BTreeSet::new(),
        );
        let mut abstraction = BTreeMap::new();
        abstraction.insert(Template::upper_bound("x"), policy);
        let state = PolicyAbstractedState::of(
            CfaNode(1),
            abstraction,
            CongruenceState::empty(),
            1,
            SsaMap::empty().with_index("x", 2),
            PointerTargetSet::empty(),
            SmtTerm::bool(true),
        );
        (start, state)
    }

    #[test]
    fn bound_is_absent_for_untracked_templates() {
        let mut arena = StateArena::new();
        let (_, state) = bounded(&mut arena, 5);
        assert!(state.bound(&Template::upper_bound("x")).is_some());
        assert!(state.bound(&Template::upper_bound("y")).is_none());
        assert_eq!(state.size(), 1);
        assert_eq!(state.to_string(), "(loc=1, node=N1)[x<=5]");
    }

    #[test]
    fn empty_state_is_initial() {
        let state = initial(3);
        assert_eq!(state.size(), 0);
        assert_eq!(state.location_id(), -1);
        assert!(state.is_initial());
        assert_eq!(state.to_string(), "(loc=-1, node=N3)[]");
    }

    #[test]
    fn update_abstraction_keeps_other_fields() {
        let mut arena = StateArena::new();
        let (_, state) = bounded(&mut arena, 5);
        let cleared = state.update_abstraction(BTreeMap::new());
        assert_eq!(cleared.size(), 0);
        assert_eq!(cleared.node(), state.node());
        assert_eq!(cleared.ssa(), state.ssa());
        assert_eq!(cleared.location_id(), 1);
        assert_eq!(state.size(), 1);
    }

    #[test]
    fn equality_ignores_extra_invariant() {
        let a = initial(2);
        let b = PolicyAbstractedState::empty(
            CfaNode(2),
            SsaMap::empty(),
            PointerTargetSet::empty(),
            SmtTerm::var("x").ge(SmtTerm::int(0)),
        );
        assert_eq!(a, b);
        assert_ne!(a, initial(4));
    }

    #[test]
    fn latest_version_compresses_the_chain() {
        let mut arena = StateArena::new();
        let s0 = arena.insert(initial(0));
        let s1 = arena.insert(initial(0));
        let s2 = arena.insert(initial(0));
        arena.set_new_version(s0, s1);
        arena.set_new_version(s1, s2);

        assert_eq!(arena.latest_version(s0), s2);
        assert_eq!(arena.new_version(s0), Some(s2));
        assert_eq!(arena.new_version(s1), Some(s2));
        assert_eq!(arena.new_version(s2), None);
        assert_eq!(arena.latest_version(s2), s2);
    }

    #[test]
    fn latest_bound_follows_versions() {
        let mut arena = StateArena::new();
        let (_, five) = bounded(&mut arena, 5);
        let (_, seven) = bounded(&mut arena, 7);
        let old = arena.insert(five);
        let new = arena.insert(seven);
        arena.set_new_version(old, new);
        let x = Template::upper_bound("x");
        assert_eq!(
            arena.latest_bound(old, &x),
            Some(BigRational::from_integer(BigInt::from(7)))
        );
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "would close a cycle")]
    fn cycles_are_rejected_in_debug_builds() {
        let mut arena = StateArena::new();
        let s0 = arena.insert(initial(0));
        let s1 = arena.insert(initial(0));
        arena.set_new_version(s0, s1);
        arena.set_new_version(s1, s0);
    }

    mod laws {
        use super::*;
        use crate::proptest_generators::arb_template;
        use proptest::prelude::*;

        fn chain(arena: &mut StateArena, len: usize) -> Vec<StateId> {
            let ids: Vec<StateId> = (0..len).map(|_| arena.insert(initial(0))).collect();
            for pair in ids.windows(2) {
                arena.set_new_version(pair[0], pair[1]);
            }
            ids
        }

        proptest! {
            #[test]
            fn latest_version_compresses_any_chain(len in 1usize..12, start in 0usize..12) {
                let mut arena = StateArena::new();
                let ids = chain(&mut arena, len);
                let start = ids[start % len];
                let last = ids[len - 1];

                prop_assert_eq!(arena.latest_version(start), last);
                for id in ids.iter().filter(|id| id.index() >= start.index()) {
                    if *id != last {
                        prop_assert_eq!(arena.new_version(*id), Some(last));
                    }
                }
                prop_assert_eq!(arena.new_version(last), None);
            }

            #[test]
            fn bound_lookup_matches_membership(
                tracked in proptest::collection::btree_set(arb_template(), 0..4),
                probe in arb_template(),
            ) {
                let mut arena = StateArena::new();
                let from = arena.insert(initial(0));
                let fmgr = PathFormulaManager::new();
                let path = fmgr.make_empty(SsaMap::empty(), PointerTargetSet::empty());
                let abstraction: BTreeMap<_, _> = tracked
                    .iter()
                    .map(|t| {
                        let bound = BigRational::from_integer(BigInt::from(1));
                        let policy = PolicyBound::new(path.clone(), bound, from, BTreeSet::new());
                        (t.clone(), policy)
                    })
                    .collect();
                let state = initial(1).update_abstraction(abstraction);

                prop_assert_eq!(state.bound(&probe).is_some(), tracked.contains(&probe));
                prop_assert_eq!(state.size(), tracked.len());
            }
        }
    }
}
