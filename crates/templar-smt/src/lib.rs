#![doc = include_str!("../README.md")]

//! Solver integration for the policy-iteration abstract domain.
//!
//! This crate provides a solver-agnostic term AST, SMT-LIB printing and
//! parsing, in-process Z3 and subprocess cvc5 backends, scoped and
//! interpolating prover environments, and the caching [`SolverService`].

pub mod backends;
pub mod config;
pub mod error;
pub mod interpolation;
pub mod prover;
pub mod service;
pub mod shutdown;
pub mod smtlib_parser;
pub mod solver;
pub mod sorts;
pub mod terms;

pub use config::{parse_solver_choice, ConfigError, SolverChoice, SolverOptions};
pub use error::SolverError;
pub use prover::{Instrumentation, ProverEnvironment, ProverOptions};
pub use service::{SolverService, SolverStatistics};
pub use shutdown::ShutdownNotifier;
pub use terms::SmtTerm;
