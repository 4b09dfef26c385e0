#![doc = include_str!("../README.md")]

//! Template policy-iteration abstract domain.
//!
//! This crate defines templates and their precision, SSA-indexed path
//! formulas, the parity sub-domain, policy bounds with their id registry,
//! abstracted states versioned in an arena, and the conversion from states
//! to solver constraints.

pub mod bound;
pub mod cfa;
pub mod config;
pub mod congruence;
pub mod conversion;
pub mod error;
pub mod invariants;
pub mod path_formula;
#[cfg(any(test, feature = "proptest"))]
pub mod proptest_generators;
pub mod state;
pub mod template;

pub use bound::{PolicyBound, PolicyRegistry};
pub use cfa::CfaNode;
pub use config::PolicyOptions;
pub use congruence::{Congruence, CongruenceManager, CongruenceState};
pub use conversion::StateFormulaConversionManager;
pub use error::{InvariantError, TemplateError, TransferError};
pub use invariants::{InvariantGenerator, InvariantSupplier};
pub use path_formula::{PathFormula, PathFormulaManager, PointerTargetSet, SsaMap};
pub use state::{PolicyAbstractedState, PolicyIntermediateState, StateArena, StateId};
pub use template::{LinearExpression, Template, TemplateKind, TemplatePrecision};
