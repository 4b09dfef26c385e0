use thiserror::Error;

use crate::backends::cvc5_backend::Cvc5Error;
use crate::backends::z3_backend::Z3Error;
use crate::smtlib_parser::ParseError;

/// Errors surfaced by solver backends, prover environments and the
/// [`SolverService`](crate::service::SolverService).
#[derive(Debug, Error)]
pub enum SolverError {
    #[error(transparent)]
    Z3(#[from] Z3Error),
    #[error(transparent)]
    Cvc5(#[from] Cvc5Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Solver returned unknown: {0}")]
    Unknown(String),
    #[error("Interrupted: {0}")]
    Interrupted(String),
    #[error("{operation} is not supported by the {backend} backend")]
    Unsupported {
        operation: &'static str,
        backend: String,
    },
    #[error("Solver backend '{0}' is already closed")]
    Closed(String),
    #[error("Malformed SMT-LIB: {0}")]
    Parse(#[from] ParseError),
    #[error("Internal solver error: {0}")]
    Internal(String),
    #[error("Backend error: {0}")]
    Backend(String),
    /// Two teardown failures: the first is reported, the second is kept.
    #[error("{primary} (suppressed: {suppressed})")]
    Teardown {
        #[source]
        primary: Box<SolverError>,
        suppressed: Box<SolverError>,
    },
}

impl SolverError {
    /// Whether this error, or the primary error of a teardown pair, is an
    /// interruption.
    pub fn is_interrupted(&self) -> bool {
        match self {
            SolverError::Interrupted(_) => true,
            SolverError::Teardown { primary, .. } => primary.is_interrupted(),
            _ => false,
        }
    }

    /// The failure attached to this one during teardown, if any.
    pub fn suppressed(&self) -> Option<&SolverError> {
        match self {
            SolverError::Teardown { suppressed, .. } => Some(suppressed),
            _ => None,
        }
    }

    /// The failure that is reported for this error.
    pub fn primary(&self) -> &SolverError {
        match self {
            SolverError::Teardown { primary, .. } => primary,
            other => other,
        }
    }

    /// Combine the outcomes of two teardown steps that were both attempted.
    pub(crate) fn combine_teardown(
        first: Result<(), SolverError>,
        second: Result<(), SolverError>,
    ) -> Result<(), SolverError> {
        match (first, second) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
            (Err(primary), Err(suppressed)) => Err(SolverError::Teardown {
                primary: Box::new(primary),
                suppressed: Box::new(suppressed),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teardown_keeps_first_failure_as_primary() {
        let combined = SolverError::combine_teardown(
            Err(SolverError::Backend("first".into())),
            Err(SolverError::Backend("second".into())),
        );
        let err = combined.expect_err("both steps failed");
        assert!(matches!(err.primary(), SolverError::Backend(m) if m == "first"));
        assert!(matches!(err.suppressed(), Some(SolverError::Backend(m)) if m == "second"));
        assert_eq!(
            err.to_string(),
            "Backend error: first (suppressed: Backend error: second)"
        );
    }

    #[test]
    fn teardown_reports_a_lone_failure_unchanged() {
        let combined = SolverError::combine_teardown(Ok(()), Err(SolverError::Closed("z3".into())));
        let err = combined.expect_err("second step failed");
        assert!(err.suppressed().is_none());
        assert!(matches!(err, SolverError::Closed(_)));
        assert!(SolverError::combine_teardown(Ok(()), Ok(())).is_ok());
    }

    #[test]
    fn interruption_is_detected_through_teardown() {
        let err = SolverError::Teardown {
            primary: Box::new(SolverError::Interrupted("shutdown".into())),
            suppressed: Box::new(SolverError::Backend("x".into())),
        };
        assert!(err.is_interrupted());
        assert!(!SolverError::Unknown("timeout".into()).is_interrupted());
    }
}
