//! Seam for externally generated invariants.

use std::collections::HashMap;
use std::sync::Arc;

use templar_smt::SmtTerm;

use crate::cfa::CfaNode;
use crate::error::InvariantError;

/// Invariants per location, in uninstantiated variable names.
pub trait InvariantSupplier: Send + Sync {
    /// An over-approximation of the states reachable at `node`.
    fn invariant_for(&self, node: CfaNode) -> SmtTerm;
}

/// Something that can produce an [`InvariantSupplier`], possibly after a
/// long-running analysis of its own.
pub trait InvariantGenerator: Send + Sync {
    fn supplier(&self) -> Result<Arc<dyn InvariantSupplier>, InvariantError>;
}

/// Knows nothing: `true` everywhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrivialInvariantSupplier;

impl InvariantSupplier for TrivialInvariantSupplier {
    fn invariant_for(&self, _node: CfaNode) -> SmtTerm {
        SmtTerm::bool(true)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TrivialInvariantGenerator;

impl InvariantGenerator for TrivialInvariantGenerator {
    fn supplier(&self) -> Result<Arc<dyn InvariantSupplier>, InvariantError> {
        Ok(Arc::new(TrivialInvariantSupplier))
    }
}

/// A fixed table of invariants. Nodes without an entry get `true`.
#[derive(Debug, Clone, Default)]
pub struct NodeInvariantSupplier {
    invariants: HashMap<CfaNode, SmtTerm>,
}

impl NodeInvariantSupplier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_invariant(mut self, node: CfaNode, invariant: SmtTerm) -> Self {
        self.invariants.insert(node, invariant);
        self
    }
}

impl InvariantSupplier for NodeInvariantSupplier {
    fn invariant_for(&self, node: CfaNode) -> SmtTerm {
        self.invariants
            .get(&node)
            .cloned()
            .unwrap_or_else(|| SmtTerm::bool(true))
    }
}

/// Hands out an already computed supplier.
#[derive(Clone)]
pub struct FixedInvariantGenerator {
    supplier: Arc<dyn InvariantSupplier>,
}

impl FixedInvariantGenerator {
    pub fn new(supplier: impl InvariantSupplier + 'static) -> Self {
        Self {
            supplier: Arc::new(supplier),
        }
    }
}

impl InvariantGenerator for FixedInvariantGenerator {
    fn supplier(&self) -> Result<Arc<dyn InvariantSupplier>, InvariantError> {
        Ok(Arc::clone(&self.supplier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_table_defaults_to_true() -> Result<(), InvariantError> {
        let x_nonneg = SmtTerm::var("x").ge(SmtTerm::int(0));
        let generator = FixedInvariantGenerator::new(
            NodeInvariantSupplier::new().with_invariant(CfaNode(1), x_nonneg.clone()),
        );
        let supplier = generator.supplier()?;
        assert_eq!(supplier.invariant_for(CfaNode(1)), x_nonneg);
        assert!(supplier.invariant_for(CfaNode(2)).is_true());
        assert!(TrivialInvariantGenerator.supplier()?.invariant_for(CfaNode(1)).is_true());
        Ok(())
    }
}
