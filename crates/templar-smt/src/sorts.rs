use std::collections::HashSet;

use crate::terms::SmtTerm;

/// SMT sorts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SmtSort {
    Bool,
    Int,
}

impl std::fmt::Display for SmtSort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SmtSort::Bool => write!(f, "Bool"),
            SmtSort::Int => write!(f, "Int"),
        }
    }
}

/// Infer a declaration for every free variable of `term`.
///
/// Terms carry no declarations of their own, so a variable's sort is read off
/// the position it occurs in: operands of Boolean connectives, `ite`
/// conditions and the top level are `Bool`, arithmetic operands are `Int`,
/// and an equality takes the sort of whichever side is evidently Boolean.
/// Declarations are returned in first-occurrence order.
pub fn infer_declarations(term: &SmtTerm) -> Vec<(String, SmtSort)> {
    let mut decls = Vec::new();
    let mut seen = HashSet::new();
    infer(term, SmtSort::Bool, &[], &mut seen, &mut decls);
    decls
}

fn infer(
    term: &SmtTerm,
    expected: SmtSort,
    bound: &[(String, SmtSort)],
    seen: &mut HashSet<String>,
    decls: &mut Vec<(String, SmtSort)>,
) {
    match term {
        SmtTerm::Var(name) => {
            if bound.iter().any(|(b, _)| b == name) || seen.contains(name) {
                return;
            }
            seen.insert(name.clone());
            decls.push((name.clone(), expected));
        }
        SmtTerm::IntLit(_) | SmtTerm::BoolLit(_) => {}
        SmtTerm::Add(l, r) | SmtTerm::Sub(l, r) | SmtTerm::Mul(l, r) | SmtTerm::Mod(l, r) => {
            infer(l, SmtSort::Int, bound, seen, decls);
            infer(r, SmtSort::Int, bound, seen, decls);
        }
        SmtTerm::Lt(l, r) | SmtTerm::Le(l, r) | SmtTerm::Gt(l, r) | SmtTerm::Ge(l, r) => {
            infer(l, SmtSort::Int, bound, seen, decls);
            infer(r, SmtSort::Int, bound, seen, decls);
        }
        SmtTerm::Eq(l, r) => {
            let sort = if l.is_evidently_bool() || r.is_evidently_bool() {
                SmtSort::Bool
            } else {
                SmtSort::Int
            };
            infer(l, sort, bound, seen, decls);
            infer(r, sort, bound, seen, decls);
        }
        SmtTerm::And(terms) | SmtTerm::Or(terms) => {
            for t in terms {
                infer(t, SmtSort::Bool, bound, seen, decls);
            }
        }
        SmtTerm::Not(inner) => infer(inner, SmtSort::Bool, bound, seen, decls),
        SmtTerm::Implies(l, r) => {
            infer(l, SmtSort::Bool, bound, seen, decls);
            infer(r, SmtSort::Bool, bound, seen, decls);
        }
        SmtTerm::ForAll(vars, body) | SmtTerm::Exists(vars, body) => {
            let mut inner_bound = bound.to_vec();
            inner_bound.extend(vars.iter().cloned());
            infer(body, SmtSort::Bool, &inner_bound, seen, decls);
        }
        SmtTerm::Ite(c, t, e) => {
            infer(c, SmtSort::Bool, bound, seen, decls);
            let sort = if t.is_evidently_bool() || e.is_evidently_bool() {
                SmtSort::Bool
            } else {
                expected
            };
            infer(t, sort, bound, seen, decls);
            infer(e, sort, bound, seen, decls);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_operands_are_int_and_connective_operands_are_bool() {
        let bound = SmtTerm::var("x").add(SmtTerm::int(1)).le(SmtTerm::var("y"));
        let term = SmtTerm::var("p").implies(bound);
        assert_eq!(
            infer_declarations(&term),
            vec![
                ("p".to_string(), SmtSort::Bool),
                ("x".to_string(), SmtSort::Int),
                ("y".to_string(), SmtSort::Int),
            ]
        );
    }

    #[test]
    fn equality_with_a_boolean_side_declares_bool() {
        let term = SmtTerm::var("a").eq(SmtTerm::bool(true));
        assert_eq!(infer_declarations(&term), vec![("a".to_string(), SmtSort::Bool)]);

        let term = SmtTerm::var("n").eq(SmtTerm::int(3));
        assert_eq!(infer_declarations(&term), vec![("n".to_string(), SmtSort::Int)]);
    }

    #[test]
    fn quantified_variables_are_not_declared() {
        let term = SmtTerm::ForAll(
            vec![("k".to_string(), SmtSort::Int)],
            Box::new(SmtTerm::var("x").gt(SmtTerm::var("k"))),
        );
        assert_eq!(infer_declarations(&term), vec![("x".to_string(), SmtSort::Int)]);
    }

    #[test]
    fn repeated_variables_are_declared_once() {
        let term = SmtTerm::and(vec![
            SmtTerm::var("x").ge(SmtTerm::int(0)),
            SmtTerm::var("x").modulo(SmtTerm::int(2)).eq(SmtTerm::int(1)),
        ]);
        assert_eq!(infer_declarations(&term), vec![("x".to_string(), SmtSort::Int)]);
    }
}
