//! SSA-indexed path formulas.
//!
//! Program variables appear uninstantiated (`x`) in templates and invariants
//! and instantiated (`x@2`) in path formulas. A variable missing from an
//! [`SsaMap`] instantiates at [`DEFAULT_SSA_INDEX`].

use std::collections::{BTreeMap, BTreeSet};

use templar_smt::SmtTerm;

pub const DEFAULT_SSA_INDEX: u32 = 1;

const INDEX_SEPARATOR: char = '@';

/// Current SSA index of each program variable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SsaMap {
    indices: BTreeMap<String, u32>,
}

impl SsaMap {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Index of `var`, or [`DEFAULT_SSA_INDEX`] if it has none yet.
    pub fn index(&self, var: &str) -> u32 {
        self.indices.get(var).copied().unwrap_or(DEFAULT_SSA_INDEX)
    }

    pub fn contains(&self, var: &str) -> bool {
        self.indices.contains_key(var)
    }

    pub fn with_index(mut self, var: impl Into<String>, index: u32) -> Self {
        self.indices.insert(var.into(), index);
        self
    }

    pub fn set_index(&mut self, var: impl Into<String>, index: u32) {
        self.indices.insert(var.into(), index);
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.indices.iter().map(|(v, i)| (v.as_str(), *i))
    }
}

/// Names of memory regions pointers may target. Carried through the domain
/// unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PointerTargetSet {
    targets: BTreeSet<String>,
}

impl PointerTargetSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.targets.insert(target.into());
        self
    }

    pub fn contains(&self, target: &str) -> bool {
        self.targets.contains(target)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().map(String::as_str)
    }
}

/// An instantiated formula with the SSA map and pointer targets at its end.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathFormula {
    pub formula: SmtTerm,
    pub ssa: SsaMap,
    pub pts: PointerTargetSet,
    /// Number of blocks encoded so far.
    pub length: u32,
}

impl PathFormula {
    pub fn new(formula: SmtTerm, ssa: SsaMap, pts: PointerTargetSet, length: u32) -> Self {
        Self {
            formula,
            ssa,
            pts,
            length,
        }
    }

    pub fn with_formula(&self, formula: SmtTerm) -> Self {
        Self {
            formula,
            ..self.clone()
        }
    }
}

/// Builds path formulas and moves terms between their instantiated and
/// uninstantiated spellings.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathFormulaManager;

impl PathFormulaManager {
    pub fn new() -> Self {
        Self
    }

    /// Rename every free variable `x` of `term` to `x@i` with `i` taken from
    /// `ssa`.
    pub fn instantiate(&self, term: &SmtTerm, ssa: &SsaMap) -> SmtTerm {
        term.rename_vars(&|var| instantiated_name(var, ssa.index(var)))
    }

    /// Strip SSA indices from every free variable of `term`.
    pub fn uninstantiate(&self, term: &SmtTerm) -> SmtTerm {
        term.rename_vars(&|var| uninstantiated_name(var).to_string())
    }

    /// A path of length zero with payload `true`.
    pub fn make_empty(&self, ssa: SsaMap, pts: PointerTargetSet) -> PathFormula {
        PathFormula::new(SmtTerm::bool(true), ssa, pts, 0)
    }

    /// Extend `path` with the uninstantiated `constraint`.
    pub fn make_and(&self, path: &PathFormula, constraint: &SmtTerm) -> PathFormula {
        let instantiated = self.instantiate(constraint, &path.ssa);
        PathFormula {
            formula: SmtTerm::conjunction([path.formula.clone(), instantiated]),
            ssa: path.ssa.clone(),
            pts: path.pts.clone(),
            length: path.length + 1,
        }
    }

    /// Extend `path` with the assignment `var := value`.
    ///
    /// `value` is read at the current indices; `var` moves to a fresh index.
    pub fn make_assignment(&self, path: &PathFormula, var: &str, value: &SmtTerm) -> PathFormula {
        let rhs = self.instantiate(value, &path.ssa);
        let next = path.ssa.index(var) + 1;
        let lhs = SmtTerm::var(instantiated_name(var, next));
        PathFormula {
            formula: SmtTerm::conjunction([path.formula.clone(), lhs.eq(rhs)]),
            ssa: path.ssa.clone().with_index(var, next),
            pts: path.pts.clone(),
            length: path.length + 1,
        }
    }
}

pub fn instantiated_name(var: &str, index: u32) -> String {
    format!("{var}{INDEX_SEPARATOR}{index}")
}

/// `x@3` becomes `x`; names without a numeric suffix are returned as is.
pub fn uninstantiated_name(name: &str) -> &str {
    let Some((base, index)) = name.rsplit_once(INDEX_SEPARATOR) else {
        return name;
    };
    let numeric = !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit());
    if base.is_empty() || !numeric {
        return name;
    }
    base
}
