use std::fmt::{self, Write};

use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

/// Print an SmtTerm as SMT-LIB2 format.
pub fn to_smtlib(term: &SmtTerm) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_term(&mut out, term);
    out
}

/// Print a sort as SMT-LIB2 format.
pub fn sort_to_smtlib(sort: &SmtSort) -> &'static str {
    match sort {
        SmtSort::Bool => "Bool",
        SmtSort::Int => "Int",
    }
}

/// Quote a symbol for SMT-LIB if it is not a simple symbol.
pub fn quote(name: &str) -> String {
    let simple = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "~!@$%^&*_-+=<>.?/".contains(c));
    if simple {
        name.to_string()
    } else {
        format!("|{name}|")
    }
}

fn write_term<W: Write>(out: &mut W, term: &SmtTerm) -> fmt::Result {
    match term {
        SmtTerm::Var(name) => out.write_str(&quote(name)),
        SmtTerm::IntLit(n) if *n < 0 => write!(out, "(- {})", n.unsigned_abs()),
        SmtTerm::IntLit(n) => write!(out, "{n}"),
        SmtTerm::BoolLit(b) => write!(out, "{b}"),
        SmtTerm::Add(l, r) => write_app(out, "+", [l.as_ref(), r.as_ref()]),
        SmtTerm::Sub(l, r) => write_app(out, "-", [l.as_ref(), r.as_ref()]),
        SmtTerm::Mul(l, r) => write_app(out, "*", [l.as_ref(), r.as_ref()]),
        SmtTerm::Mod(l, r) => write_app(out, "mod", [l.as_ref(), r.as_ref()]),
        SmtTerm::Eq(l, r) => write_app(out, "=", [l.as_ref(), r.as_ref()]),
        SmtTerm::Lt(l, r) => write_app(out, "<", [l.as_ref(), r.as_ref()]),
        SmtTerm::Le(l, r) => write_app(out, "<=", [l.as_ref(), r.as_ref()]),
        SmtTerm::Gt(l, r) => write_app(out, ">", [l.as_ref(), r.as_ref()]),
        SmtTerm::Ge(l, r) => write_app(out, ">=", [l.as_ref(), r.as_ref()]),
        SmtTerm::And(terms) => match terms.as_slice() {
            [] => out.write_str("true"),
            [single] => write_term(out, single),
            _ => write_app(out, "and", terms),
        },
        SmtTerm::Or(terms) => match terms.as_slice() {
            [] => out.write_str("false"),
            [single] => write_term(out, single),
            _ => write_app(out, "or", terms),
        },
        SmtTerm::Not(inner) => write_app(out, "not", [inner.as_ref()]),
        SmtTerm::Implies(l, r) => write_app(out, "=>", [l.as_ref(), r.as_ref()]),
        SmtTerm::ForAll(bindings, body) => write_quantifier(out, "forall", bindings, body),
        SmtTerm::Exists(bindings, body) => write_quantifier(out, "exists", bindings, body),
        SmtTerm::Ite(c, t, e) => write_app(out, "ite", [c.as_ref(), t.as_ref(), e.as_ref()]),
    }
}

fn write_app<'a, W: Write>(
    out: &mut W,
    head: &str,
    args: impl IntoIterator<Item = &'a SmtTerm>,
) -> fmt::Result {
    write!(out, "({head}")?;
    for arg in args {
        out.write_char(' ')?;
        write_term(out, arg)?;
    }
    out.write_char(')')
}

fn write_quantifier<W: Write>(
    out: &mut W,
    binder: &str,
    bindings: &[(String, SmtSort)],
    body: &SmtTerm,
) -> fmt::Result {
    write!(out, "({binder} (")?;
    for (i, (name, sort)) in bindings.iter().enumerate() {
        if i > 0 {
            out.write_char(' ')?;
        }
        write!(out, "({} {})", quote(name), sort_to_smtlib(sort))?;
    }
    out.write_str(") ")?;
    write_term(out, body)?;
    out.write_char(')')
}

impl fmt::Display for SmtTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_term(f, self)
    }
}
