use thiserror::Error;

use templar_smt::SolverError;

/// Failure of an abstraction step.
///
/// Solver failures are wrapped with the step that issued the query so the
/// analysis loop deals with one error family.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Solver failure during {context}: {source}")]
    Solver {
        context: String,
        #[source]
        source: SolverError,
    },
    #[error("Interrupted: {0}")]
    Interrupted(String),
}

impl TransferError {
    /// Wrap a solver error raised while performing `context`.
    ///
    /// Interruptions are kept distinct so callers can stop instead of
    /// reporting a failure.
    pub fn from_solver(context: impl Into<String>, source: SolverError) -> Self {
        match source.primary() {
            SolverError::Interrupted(reason) => TransferError::Interrupted(reason.clone()),
            _ => TransferError::Solver {
                context: context.into(),
                source,
            },
        }
    }
}

/// Failure reported by an [`InvariantGenerator`](crate::invariants::InvariantGenerator).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantError {
    #[error("Invariant generation interrupted: {0}")]
    Interrupted(String),
    #[error("Invariant generation failed: {0}")]
    Failed(String),
}

/// A template that cannot be represented.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("Coefficient of `{0}` overflows i64")]
    CoefficientOverflow(String),
}
