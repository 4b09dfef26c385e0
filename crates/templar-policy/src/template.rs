//! Templates: the linear expressions whose upper bounds the domain tracks.

use std::fmt;

use indexmap::{IndexMap, IndexSet};

use templar_smt::SmtTerm;

use crate::cfa::CfaNode;
use crate::error::TemplateError;
use crate::path_formula::{PathFormulaManager, SsaMap};

/// `Σ cᵢ·xᵢ` over program variables, kept sorted by variable with no zero
/// coefficients, so equal expressions compare and hash equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinearExpression {
    terms: Vec<(String, i64)>,
}

impl LinearExpression {
    /// Sum the given terms, merging repeated variables.
    ///
    /// Fails when a merged coefficient leaves the `i64` range.
    pub fn new<S: Into<String>>(
        terms: impl IntoIterator<Item = (S, i64)>,
    ) -> Result<Self, TemplateError> {
        let mut merged: Vec<(String, i64)> = Vec::new();
        for (var, coeff) in terms {
            let var = var.into();
            match merged.iter_mut().find(|(v, _)| *v == var) {
                Some(existing) => {
                    existing.1 = existing
                        .1
                        .checked_add(coeff)
                        .ok_or_else(|| TemplateError::CoefficientOverflow(var.clone()))?;
                }
                None => merged.push((var, coeff)),
            }
        }
        merged.retain(|(_, c)| *c != 0);
        merged.sort();
        Ok(Self { terms: merged })
    }

    pub fn var(name: impl Into<String>) -> Self {
        Self {
            terms: vec![(name.into(), 1)],
        }
    }

    pub fn terms(&self) -> &[(String, i64)] {
        &self.terms
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(|(v, _)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// The expression over uninstantiated variables.
    pub fn to_term(&self) -> SmtTerm {
        let mut summands = self.terms.iter().map(|(var, coeff)| {
            let x = SmtTerm::var(var.clone());
            if *coeff == 1 {
                x
            } else {
                SmtTerm::int(*coeff).mul(x)
            }
        });
        match summands.next() {
            Some(first) => summands.fold(first, SmtTerm::add),
            None => SmtTerm::int(0),
        }
    }
}

impl fmt::Display for LinearExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.terms.is_empty() {
            return write!(f, "0");
        }
        for (i, (var, coeff)) in self.terms.iter().enumerate() {
            let magnitude = coeff.unsigned_abs();
            match (i, *coeff < 0) {
                (0, true) => write!(f, "-")?,
                (0, false) => {}
                (_, true) => write!(f, " - ")?,
                (_, false) => write!(f, " + ")?,
            }
            if magnitude == 1 {
                write!(f, "{var}")?;
            } else {
                write!(f, "{magnitude}*{var}")?;
            }
        }
        Ok(())
    }
}

/// Shape of a template, derived from its coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    /// `x`
    UpperBound,
    /// `-x`
    LowerBound,
    /// `x + y`
    Sum,
    /// `x - y`
    Difference,
    Complex,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Template {
    linear: LinearExpression,
    integral: bool,
}

impl Template {
    pub fn new(linear: LinearExpression, integral: bool) -> Self {
        Self { linear, integral }
    }

    /// An integral template.
    pub fn int(linear: LinearExpression) -> Self {
        Self::new(linear, true)
    }

    /// The integral upper-bound template `var`.
    pub fn upper_bound(var: impl Into<String>) -> Self {
        Self::int(LinearExpression::var(var))
    }

    pub fn linear(&self) -> &LinearExpression {
        &self.linear
    }

    pub fn is_integral(&self) -> bool {
        self.integral
    }

    pub fn kind(&self) -> TemplateKind {
        match self.linear.terms() {
            [(_, 1)] => TemplateKind::UpperBound,
            [(_, -1)] => TemplateKind::LowerBound,
            [(_, 1), (_, 1)] => TemplateKind::Sum,
            [(_, 1), (_, -1)] | [(_, -1), (_, 1)] => TemplateKind::Difference,
            _ => TemplateKind::Complex,
        }
    }

    /// The template's value at the end of a path with indices `ssa`.
    pub fn to_formula(&self, fmgr: &PathFormulaManager, ssa: &SsaMap) -> SmtTerm {
        fmgr.instantiate(&self.linear.to_term(), ssa)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.linear)
    }
}

/// Which templates are tracked where.
#[derive(Debug, Clone, Default)]
pub struct TemplatePrecision {
    generic: IndexSet<Template>,
    per_node: IndexMap<CfaNode, IndexSet<Template>>,
}

impl TemplatePrecision {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `template` at every node.
    pub fn with_generic(mut self, template: Template) -> Self {
        self.generic.insert(template);
        self
    }

    /// Track `template` at `node` only.
    pub fn with_node_template(mut self, node: CfaNode, template: Template) -> Self {
        self.per_node.entry(node).or_default().insert(template);
        self
    }

    /// Templates tracked at `node`, generic ones first, without duplicates.
    pub fn templates_for(&self, node: CfaNode) -> Vec<&Template> {
        let mut out: IndexSet<&Template> = self.generic.iter().collect();
        if let Some(local) = self.per_node.get(&node) {
            out.extend(local.iter());
        }
        out.into_iter().collect()
    }
}
