//! Solver backends: engine instances that hand out fresh solvers.

pub mod cvc5_backend;
pub mod smtlib_printer;
pub mod z3_backend;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::config::{SolverChoice, SolverOptions};
use crate::error::SolverError;
use crate::prover::ProverOptions;
use crate::solver::{DynSolver, Erased};

use cvc5_backend::{Cvc5Config, Cvc5Solver};
use z3_backend::Z3Solver;

/// An engine instance. Solvers created from one backend share its
/// configuration; closing the backend refuses further solvers.
pub trait SolverBackend: Send + Sync {
    fn name(&self) -> &str;

    fn create_solver(&self, options: ProverOptions) -> Result<DynSolver, SolverError>;

    /// Release the backend. Closing twice is a no-op.
    fn close(&self) -> Result<(), SolverError>;

    fn is_closed(&self) -> bool;
}

/// Build a fresh backend instance for `choice`.
pub fn backend_for(choice: SolverChoice, options: &SolverOptions) -> Arc<dyn SolverBackend> {
    match choice {
        SolverChoice::Z3 => Arc::new(Z3Backend::new(options.timeout_secs)),
        SolverChoice::Cvc5 => Arc::new(Cvc5Backend::new(
            options.cvc5_command.clone(),
            options.timeout_secs,
        )),
    }
}

#[derive(Debug, Default)]
pub struct Z3Backend {
    timeout_secs: Option<u64>,
    closed: AtomicBool,
}

impl Z3Backend {
    pub fn new(timeout_secs: Option<u64>) -> Self {
        Self {
            timeout_secs,
            closed: AtomicBool::new(false),
        }
    }
}

impl SolverBackend for Z3Backend {
    fn name(&self) -> &str {
        "z3"
    }

    fn create_solver(&self, options: ProverOptions) -> Result<DynSolver, SolverError> {
        if self.is_closed() {
            return Err(SolverError::Closed(self.name().into()));
        }
        debug!(?options, "creating z3 solver");
        // Z3 produces models and assumption cores without extra setup.
        Ok(Erased::boxed(Z3Solver::with_timeout_secs(
            self.timeout_secs.unwrap_or(0),
        )))
    }

    fn close(&self) -> Result<(), SolverError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct Cvc5Backend {
    command: String,
    timeout_secs: Option<u64>,
    closed: AtomicBool,
}

impl Cvc5Backend {
    pub fn new(command: impl Into<String>, timeout_secs: Option<u64>) -> Self {
        Self {
            command: command.into(),
            timeout_secs,
            closed: AtomicBool::new(false),
        }
    }

    fn config(&self, options: ProverOptions) -> Cvc5Config {
        Cvc5Config {
            command: self.command.clone(),
            timeout_ms: self.timeout_secs.map(|s| s.saturating_mul(1000)),
            produce_interpolants: options.generate_interpolants,
        }
    }
}

impl SolverBackend for Cvc5Backend {
    fn name(&self) -> &str {
        "cvc5"
    }

    fn create_solver(&self, options: ProverOptions) -> Result<DynSolver, SolverError> {
        if self.is_closed() {
            return Err(SolverError::Closed(self.name().into()));
        }
        let config = self.config(options);
        debug!(command = %config.command, ?options, "spawning cvc5");
        Ok(Erased::boxed(Cvc5Solver::with_config(&config)?))
    }

    fn close(&self) -> Result<(), SolverError> {
        // Each solver owns its process and reaps it on drop.
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
