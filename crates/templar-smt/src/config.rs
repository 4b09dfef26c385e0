//! Solver configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which SMT engine backs a solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverChoice {
    #[default]
    Z3,
    Cvc5,
}

impl SolverChoice {
    pub fn name(self) -> &'static str {
        match self {
            SolverChoice::Z3 => "z3",
            SolverChoice::Cvc5 => "cvc5",
        }
    }
}

impl fmt::Display for SolverChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SolverChoice {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        parse_solver_choice(raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Unknown solver '{0}'. Use 'z3' or 'cvc5'.")]
    UnknownSolver(String),
}

pub fn parse_solver_choice(raw: &str) -> Result<SolverChoice, ConfigError> {
    match raw {
        "z3" => Ok(SolverChoice::Z3),
        "cvc5" => Ok(SolverChoice::Cvc5),
        other => Err(ConfigError::UnknownSolver(other.to_string())),
    }
}

/// Options for a [`SolverService`](crate::service::SolverService).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Engine answering satisfiability queries.
    pub solver: SolverChoice,
    /// Engine answering interpolation queries. `None` reuses the solving
    /// backend instance.
    pub interpolation_solver: Option<SolverChoice>,
    /// Per-query timeout handed to the engine, if any.
    pub timeout_secs: Option<u64>,
    /// Log every prover operation at `debug` level.
    pub log_all_queries: bool,
    /// Re-evaluate assertions against every model the engine returns.
    pub check_model_consistency: bool,
    /// Executable used to launch cvc5.
    pub cvc5_command: String,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            solver: SolverChoice::Z3,
            interpolation_solver: None,
            timeout_secs: None,
            log_all_queries: false,
            check_model_consistency: false,
            cvc5_command: "cvc5".into(),
        }
    }
}
