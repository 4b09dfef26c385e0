use std::collections::HashSet;

use crate::solver::{Model, ModelValue};
use crate::sorts::SmtSort;

/// Abstract SMT term representation, solver-agnostic.
///
/// Terms compare and hash structurally, which is what the solver service's
/// unsat cache and the policy-id registry key on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SmtTerm {
    /// Variable reference by name.
    Var(String),
    /// Integer literal.
    IntLit(i64),
    /// Boolean literal.
    BoolLit(bool),

    // Arithmetic
    Add(Box<SmtTerm>, Box<SmtTerm>),
    Sub(Box<SmtTerm>, Box<SmtTerm>),
    Mul(Box<SmtTerm>, Box<SmtTerm>),
    /// Euclidean remainder, always non-negative for a positive divisor.
    Mod(Box<SmtTerm>, Box<SmtTerm>),

    // Comparison
    Eq(Box<SmtTerm>, Box<SmtTerm>),
    Lt(Box<SmtTerm>, Box<SmtTerm>),
    Le(Box<SmtTerm>, Box<SmtTerm>),
    Gt(Box<SmtTerm>, Box<SmtTerm>),
    Ge(Box<SmtTerm>, Box<SmtTerm>),

    // Boolean logic
    And(Vec<SmtTerm>),
    Or(Vec<SmtTerm>),
    Not(Box<SmtTerm>),
    Implies(Box<SmtTerm>, Box<SmtTerm>),

    // Quantifiers (for completeness)
    ForAll(Vec<(String, SmtSort)>, Box<SmtTerm>),
    Exists(Vec<(String, SmtSort)>, Box<SmtTerm>),

    // If-then-else
    Ite(Box<SmtTerm>, Box<SmtTerm>, Box<SmtTerm>),
}

#[allow(clippy::should_implement_trait)]
impl SmtTerm {
    pub fn var(name: impl Into<String>) -> Self {
        SmtTerm::Var(name.into())
    }

    pub fn int(n: i64) -> Self {
        SmtTerm::IntLit(n)
    }

    pub fn bool(b: bool) -> Self {
        SmtTerm::BoolLit(b)
    }

    pub fn add(self, other: SmtTerm) -> Self {
        SmtTerm::Add(Box::new(self), Box::new(other))
    }

    pub fn sub(self, other: SmtTerm) -> Self {
        SmtTerm::Sub(Box::new(self), Box::new(other))
    }

    pub fn mul(self, other: SmtTerm) -> Self {
        SmtTerm::Mul(Box::new(self), Box::new(other))
    }

    pub fn modulo(self, other: SmtTerm) -> Self {
        SmtTerm::Mod(Box::new(self), Box::new(other))
    }

    pub fn eq(self, other: SmtTerm) -> Self {
        SmtTerm::Eq(Box::new(self), Box::new(other))
    }

    pub fn lt(self, other: SmtTerm) -> Self {
        SmtTerm::Lt(Box::new(self), Box::new(other))
    }

    pub fn le(self, other: SmtTerm) -> Self {
        SmtTerm::Le(Box::new(self), Box::new(other))
    }

    pub fn gt(self, other: SmtTerm) -> Self {
        SmtTerm::Gt(Box::new(self), Box::new(other))
    }

    pub fn ge(self, other: SmtTerm) -> Self {
        SmtTerm::Ge(Box::new(self), Box::new(other))
    }

    pub fn and(terms: Vec<SmtTerm>) -> Self {
        SmtTerm::And(terms)
    }

    pub fn or(terms: Vec<SmtTerm>) -> Self {
        SmtTerm::Or(terms)
    }

    pub fn not(self) -> Self {
        SmtTerm::Not(Box::new(self))
    }

    pub fn implies(self, other: SmtTerm) -> Self {
        SmtTerm::Implies(Box::new(self), Box::new(other))
    }

    /// `term ≡ remainder (mod modulus)`.
    pub fn congruent(self, remainder: i64, modulus: i64) -> Self {
        self.modulo(SmtTerm::int(modulus)).eq(SmtTerm::int(remainder))
    }

    /// Conjunction that drops literal `true` operands and collapses to a
    /// literal when nothing else is left.
    pub fn conjunction(terms: impl IntoIterator<Item = SmtTerm>) -> Self {
        let mut kept = Vec::new();
        for term in terms {
            if term.is_false() {
                return SmtTerm::bool(false);
            }
            if !term.is_true() {
                kept.push(term);
            }
        }
        match kept.len() {
            0 => SmtTerm::bool(true),
            1 => kept.pop().unwrap_or(SmtTerm::BoolLit(true)),
            _ => SmtTerm::And(kept),
        }
    }

    /// Literally `true` (or an empty conjunction).
    pub fn is_true(&self) -> bool {
        match self {
            SmtTerm::BoolLit(b) => *b,
            SmtTerm::And(terms) => terms.is_empty(),
            _ => false,
        }
    }

    /// Literally `false` (or an empty disjunction).
    pub fn is_false(&self) -> bool {
        match self {
            SmtTerm::BoolLit(b) => !*b,
            SmtTerm::Or(terms) => terms.is_empty(),
            _ => false,
        }
    }

    /// Whether the head symbol alone proves the term is Boolean.
    pub fn is_evidently_bool(&self) -> bool {
        !matches!(
            self,
            SmtTerm::Var(_)
                | SmtTerm::IntLit(_)
                | SmtTerm::Add(..)
                | SmtTerm::Sub(..)
                | SmtTerm::Mul(..)
                | SmtTerm::Mod(..)
                | SmtTerm::Ite(..)
        )
    }

    /// Flatten nested top-level conjunctions into their operands.
    ///
    /// A term that is not a conjunction yields itself; literal `true` operands
    /// are kept, so the result is a faithful split of the original.
    pub fn conjuncts(&self) -> Vec<SmtTerm> {
        let mut out = Vec::new();
        collect_conjuncts(self, &mut out);
        out
    }

    /// Names of free variables, in first-occurrence order.
    pub fn free_vars(&self) -> Vec<String> {
        crate::sorts::infer_declarations(self)
            .into_iter()
            .map(|(name, _)| name)
            .collect()
    }

    /// Rename every free variable through `rename`.
    ///
    /// Quantifier-bound names are left alone.
    pub fn rename_vars(&self, rename: &impl Fn(&str) -> String) -> SmtTerm {
        let mut bound = HashSet::new();
        rename_inner(self, rename, &mut bound)
    }

    /// Evaluate the term under `model`.
    ///
    /// Returns `None` if a variable has no value, a sort is mixed up, an
    /// operation overflows, or the term is quantified.
    pub fn evaluate(&self, model: &Model) -> Option<ModelValue> {
        let int = |t: &SmtTerm| match t.evaluate(model)? {
            ModelValue::Int(n) => Some(n),
            ModelValue::Bool(_) => None,
        };
        let boolean = |t: &SmtTerm| match t.evaluate(model)? {
            ModelValue::Bool(b) => Some(b),
            ModelValue::Int(_) => None,
        };
        let value = match self {
            SmtTerm::Var(name) => return model.values.get(name).cloned(),
            SmtTerm::IntLit(n) => ModelValue::Int(*n),
            SmtTerm::BoolLit(b) => ModelValue::Bool(*b),
            SmtTerm::Add(l, r) => ModelValue::Int(int(l)?.checked_add(int(r)?)?),
            SmtTerm::Sub(l, r) => ModelValue::Int(int(l)?.checked_sub(int(r)?)?),
            SmtTerm::Mul(l, r) => ModelValue::Int(int(l)?.checked_mul(int(r)?)?),
            SmtTerm::Mod(l, r) => ModelValue::Int(int(l)?.checked_rem_euclid(int(r)?)?),
            SmtTerm::Eq(l, r) => match (l.evaluate(model)?, r.evaluate(model)?) {
                (ModelValue::Int(a), ModelValue::Int(b)) => ModelValue::Bool(a == b),
                (ModelValue::Bool(a), ModelValue::Bool(b)) => ModelValue::Bool(a == b),
                _ => return None,
            },
            SmtTerm::Lt(l, r) => ModelValue::Bool(int(l)? < int(r)?),
            SmtTerm::Le(l, r) => ModelValue::Bool(int(l)? <= int(r)?),
            SmtTerm::Gt(l, r) => ModelValue::Bool(int(l)? > int(r)?),
            SmtTerm::Ge(l, r) => ModelValue::Bool(int(l)? >= int(r)?),
            SmtTerm::And(terms) => {
                let mut all = true;
                for t in terms {
                    all &= boolean(t)?;
                }
                ModelValue::Bool(all)
            }
            SmtTerm::Or(terms) => {
                let mut any = false;
                for t in terms {
                    any |= boolean(t)?;
                }
                ModelValue::Bool(any)
            }
            SmtTerm::Not(inner) => ModelValue::Bool(!boolean(inner)?),
            SmtTerm::Implies(l, r) => ModelValue::Bool(!boolean(l)? || boolean(r)?),
            SmtTerm::Ite(c, t, e) => {
                if boolean(c)? {
                    t.evaluate(model)?
                } else {
                    e.evaluate(model)?
                }
            }
            SmtTerm::ForAll(..) | SmtTerm::Exists(..) => return None,
        };
        Some(value)
    }
}

fn collect_conjuncts(term: &SmtTerm, out: &mut Vec<SmtTerm>) {
    match term {
        SmtTerm::And(terms) if !terms.is_empty() => {
            for t in terms {
                collect_conjuncts(t, out);
            }
        }
        other => out.push(other.clone()),
    }
}

fn rename_inner(
    term: &SmtTerm,
    rename: &impl Fn(&str) -> String,
    bound: &mut HashSet<String>,
) -> SmtTerm {
    let mut go = |t: &SmtTerm| Box::new(rename_inner(t, rename, bound));
    match term {
        SmtTerm::Var(name) => {
            if bound.contains(name) {
                SmtTerm::Var(name.clone())
            } else {
                SmtTerm::Var(rename(name))
            }
        }
        SmtTerm::IntLit(n) => SmtTerm::IntLit(*n),
        SmtTerm::BoolLit(b) => SmtTerm::BoolLit(*b),
        SmtTerm::Add(l, r) => SmtTerm::Add(go(l), go(r)),
        SmtTerm::Sub(l, r) => SmtTerm::Sub(go(l), go(r)),
        SmtTerm::Mul(l, r) => SmtTerm::Mul(go(l), go(r)),
        SmtTerm::Mod(l, r) => SmtTerm::Mod(go(l), go(r)),
        SmtTerm::Eq(l, r) => SmtTerm::Eq(go(l), go(r)),
        SmtTerm::Lt(l, r) => SmtTerm::Lt(go(l), go(r)),
        SmtTerm::Le(l, r) => SmtTerm::Le(go(l), go(r)),
        SmtTerm::Gt(l, r) => SmtTerm::Gt(go(l), go(r)),
        SmtTerm::Ge(l, r) => SmtTerm::Ge(go(l), go(r)),
        SmtTerm::And(terms) => SmtTerm::And(terms.iter().map(|t| *go(t)).collect()),
        SmtTerm::Or(terms) => SmtTerm::Or(terms.iter().map(|t| *go(t)).collect()),
        SmtTerm::Not(inner) => SmtTerm::Not(go(inner)),
        SmtTerm::Implies(l, r) => SmtTerm::Implies(go(l), go(r)),
        SmtTerm::Ite(c, t, e) => SmtTerm::Ite(go(c), go(t), go(e)),
        SmtTerm::ForAll(vars, body) | SmtTerm::Exists(vars, body) => {
            let newly_bound: Vec<String> = vars
                .iter()
                .filter(|(name, _)| bound.insert(name.clone()))
                .map(|(name, _)| name.clone())
                .collect();
            let body = Box::new(rename_inner(body, rename, bound));
            for name in &newly_bound {
                bound.remove(name);
            }
            if matches!(term, SmtTerm::ForAll(..)) {
                SmtTerm::ForAll(vars.clone(), body)
            } else {
                SmtTerm::Exists(vars.clone(), body)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn model(values: &[(&str, ModelValue)]) -> Model {
        Model {
            values: values
                .iter()
                .map(|(n, v)| (n.to_string(), v.clone()))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn literal_truth_tests() {
        assert!(SmtTerm::bool(true).is_true());
        assert!(SmtTerm::and(vec![]).is_true());
        assert!(SmtTerm::bool(false).is_false());
        assert!(SmtTerm::or(vec![]).is_false());
        assert!(!SmtTerm::var("p").is_true());
        assert!(!SmtTerm::var("p").is_false());
    }

    #[test]
    fn conjuncts_flatten_nested_conjunctions() {
        let a = SmtTerm::var("x").ge(SmtTerm::int(0));
        let b = SmtTerm::var("y").ge(SmtTerm::int(0));
        let c = SmtTerm::var("z").ge(SmtTerm::int(0));
        let nested = SmtTerm::and(vec![a.clone(), SmtTerm::and(vec![b.clone(), c.clone()])]);
        assert_eq!(nested.conjuncts(), vec![a.clone(), b, c]);
        assert_eq!(a.conjuncts(), vec![a]);
    }

    #[test]
    fn conjunction_simplifies_literals() {
        let a = SmtTerm::var("x").ge(SmtTerm::int(0));
        assert_eq!(SmtTerm::conjunction(vec![]), SmtTerm::bool(true));
        assert_eq!(
            SmtTerm::conjunction(vec![SmtTerm::bool(true), a.clone()]),
            a.clone()
        );
        assert_eq!(
            SmtTerm::conjunction(vec![a.clone(), SmtTerm::bool(false)]),
            SmtTerm::bool(false)
        );
        assert_eq!(
            SmtTerm::conjunction(vec![a.clone(), a.clone()]),
            SmtTerm::and(vec![a.clone(), a])
        );
    }

    #[test]
    fn rename_skips_quantifier_bound_names() {
        let term = SmtTerm::and(vec![
            SmtTerm::var("x").ge(SmtTerm::int(0)),
            SmtTerm::Exists(
                vec![("k".to_string(), SmtSort::Int)],
                Box::new(SmtTerm::var("x").eq(SmtTerm::var("k"))),
            ),
        ]);
        let renamed = term.rename_vars(&|name| format!("{name}@2"));
        let expected = SmtTerm::and(vec![
            SmtTerm::var("x@2").ge(SmtTerm::int(0)),
            SmtTerm::Exists(
                vec![("k".to_string(), SmtSort::Int)],
                Box::new(SmtTerm::var("x@2").eq(SmtTerm::var("k"))),
            ),
        ]);
        assert_eq!(renamed, expected);
    }

    #[test]
    fn evaluate_uses_euclidean_remainder() {
        let m = model(&[("x", ModelValue::Int(-3))]);
        let term = SmtTerm::var("x").congruent(1, 2);
        assert_eq!(term.evaluate(&m), Some(ModelValue::Bool(true)));
    }

    #[test]
    fn evaluate_missing_variable_is_none() {
        let m = model(&[]);
        assert_eq!(SmtTerm::var("x").ge(SmtTerm::int(0)).evaluate(&m), None);
    }

    #[test]
    fn evaluate_connectives() {
        let m = model(&[("p", ModelValue::Bool(false)), ("x", ModelValue::Int(4))]);
        let term = SmtTerm::var("p").implies(SmtTerm::var("x").lt(SmtTerm::int(0)));
        assert_eq!(term.evaluate(&m), Some(ModelValue::Bool(true)));
        let term = SmtTerm::or(vec![SmtTerm::var("p"), SmtTerm::var("x").eq(SmtTerm::int(4))]);
        assert_eq!(term.evaluate(&m), Some(ModelValue::Bool(true)));
    }
}
