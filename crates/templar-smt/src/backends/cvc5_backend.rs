//! cvc5 backend speaking SMT-LIB 2 to a child process.
//!
//! Unlike Z3, cvc5 can answer `get-interpolant`, so it is the usual choice
//! for the interpolation side of the solver service.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, Stdio};

use thiserror::Error;
use tracing::debug;

use crate::backends::smtlib_printer::{quote, sort_to_smtlib, to_smtlib};
use crate::smtlib_parser::{parse_define_fun_body, parse_value, SExpr};
use crate::solver::{Model, ModelValue, SatResult, SmtSolver};
use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

#[derive(Debug, Error)]
pub enum Cvc5Error {
    #[error("cvc5 I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cvc5 not found: {0}")]
    NotFound(String),
    #[error("cvc5 error: {0}")]
    SolverError(String),
    #[error("Failed to parse cvc5 output: {0}")]
    ParseError(String),
}

/// How to launch a cvc5 process.
#[derive(Debug, Clone)]
pub struct Cvc5Config {
    pub command: String,
    pub timeout_ms: Option<u64>,
    pub produce_interpolants: bool,
}

impl Default for Cvc5Config {
    fn default() -> Self {
        Self {
            command: "cvc5".into(),
            timeout_ms: None,
            produce_interpolants: false,
        }
    }
}

impl Cvc5Config {
    fn args(&self) -> Vec<String> {
        let mut args = vec![
            "--lang".to_string(),
            "smt2".to_string(),
            "--incremental".to_string(),
            "--produce-models".to_string(),
            "--produce-unsat-assumptions".to_string(),
            // Print terms without `let` sharing so the parser sees plain trees.
            "--dag-thresh=0".to_string(),
        ];
        if self.produce_interpolants {
            args.push("--produce-interpolants".to_string());
        }
        if let Some(ms) = self.timeout_ms {
            args.push(format!("--tlimit-per={ms}"));
        }
        args
    }
}

pub struct Cvc5Solver {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    stderr: BufReader<ChildStderr>,
    vars: HashMap<String, SmtSort>,
    last_assumptions: Vec<String>,
    interpolants: bool,
    interpolant_counter: usize,
}

impl Cvc5Solver {
    pub fn new() -> Result<Self, Cvc5Error> {
        Self::with_config(&Cvc5Config::default())
    }

    pub fn with_config(config: &Cvc5Config) -> Result<Self, Cvc5Error> {
        let mut child = Command::new(&config.command)
            .args(config.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Cvc5Error::NotFound(format!("{}: {e}", config.command)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Cvc5Error::SolverError("failed to capture cvc5 stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Cvc5Error::SolverError("failed to capture cvc5 stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Cvc5Error::SolverError("failed to capture cvc5 stderr".into()))?;

        let mut solver = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            stderr: BufReader::new(stderr),
            vars: HashMap::new(),
            last_assumptions: Vec::new(),
            interpolants: config.produce_interpolants,
            interpolant_counter: 0,
        };
        solver.initialize()?;
        Ok(solver)
    }

    fn initialize(&mut self) -> Result<(), Cvc5Error> {
        // Declarations made inside a push scope must survive the matching pop.
        self.send_command_no_response("(set-option :global-declarations true)")?;
        self.send_command_no_response("(set-logic QF_NIA)")
    }

    /// Send a command and read back one complete S-expression or atom.
    fn send_command(&mut self, cmd: &str) -> Result<String, Cvc5Error> {
        self.send_command_no_response(cmd)?;

        let mut response = String::new();
        let mut depth: i64 = 0;
        loop {
            let mut line = String::new();
            let read = self.stdout.read_line(&mut line)?;
            if read == 0 {
                let mut stderr = String::new();
                let _ = self.stderr.read_line(&mut stderr);
                return Err(Cvc5Error::SolverError(format!(
                    "No response from cvc5 for command `{cmd}`. stderr: {}",
                    stderr.trim()
                )));
            }
            depth += paren_balance(&line);
            response.push_str(&line);
            if depth <= 0 && !response.trim().is_empty() {
                break;
            }
        }
        let response = response.trim().to_string();
        if response.starts_with("(error") {
            return Err(Cvc5Error::SolverError(response));
        }
        Ok(response)
    }

    fn send_command_no_response(&mut self, cmd: &str) -> Result<(), Cvc5Error> {
        writeln!(self.stdin, "{cmd}")?;
        self.stdin.flush()?;
        Ok(())
    }

    fn parse_check_response(response: &str) -> Result<SatResult, Cvc5Error> {
        match response {
            "sat" => Ok(SatResult::Sat),
            "unsat" => Ok(SatResult::Unsat),
            "unknown" => Ok(SatResult::Unknown("cvc5 returned unknown".into())),
            other => Err(Cvc5Error::SolverError(other.to_string())),
        }
    }
}

impl Cvc5Solver {
    fn finish_with_model(
        &mut self,
        result: SatResult,
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), Cvc5Error> {
        if result != SatResult::Sat {
            return Ok((result, None));
        }
        let mut values = HashMap::new();
        for &(name, sort) in var_names {
            if !self.vars.contains_key(name) {
                continue;
            }
            let response = self.send_command(&format!("(get-value ({}))", quote(name)))?;
            if let Some(val) = parse_cvc5_value(&response, sort) {
                values.insert(name.to_string(), val);
            }
        }
        Ok((SatResult::Sat, Some(Model { values })))
    }
}

fn paren_balance(line: &str) -> i64 {
    let mut balance = 0;
    let mut quoted = false;
    for ch in line.chars() {
        match ch {
            '|' => quoted = !quoted,
            '(' if !quoted => balance += 1,
            ')' if !quoted => balance -= 1,
            _ => {}
        }
    }
    balance
}

impl Drop for Cvc5Solver {
    fn drop(&mut self) {
        let _ = writeln!(self.stdin, "(exit)");
        let _ = self.stdin.flush();
        let _ = self.child.wait();
    }
}

impl SmtSolver for Cvc5Solver {
    type Error = Cvc5Error;

    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), Cvc5Error> {
        if self.vars.get(name) == Some(sort) {
            return Ok(());
        }
        let sort_str = sort_to_smtlib(sort);
        self.send_command_no_response(&format!("(declare-const {} {sort_str})", quote(name)))?;
        self.vars.insert(name.to_string(), *sort);
        Ok(())
    }

    fn assert(&mut self, term: &SmtTerm) -> Result<(), Cvc5Error> {
        let smt_str = to_smtlib(term);
        self.send_command_no_response(&format!("(assert {smt_str})"))
    }

    fn push(&mut self) -> Result<(), Cvc5Error> {
        self.send_command_no_response("(push 1)")
    }

    fn pop(&mut self) -> Result<(), Cvc5Error> {
        self.send_command_no_response("(pop 1)")
    }

    fn check_sat(&mut self) -> Result<SatResult, Cvc5Error> {
        let response = self.send_command("(check-sat)")?;
        Self::parse_check_response(&response)
    }

    fn check_sat_with_model(
        &mut self,
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), Cvc5Error> {
        let result = self.check_sat()?;
        self.finish_with_model(result, var_names)
    }

    fn supports_assumption_unsat_core(&self) -> bool {
        true
    }

    fn check_sat_assuming(&mut self, assumptions: &[String]) -> Result<SatResult, Cvc5Error> {
        for name in assumptions {
            match self.vars.get(name) {
                Some(SmtSort::Bool) => {}
                Some(_) => {
                    return Err(Cvc5Error::SolverError(format!(
                        "assumption `{name}` is not declared as Bool"
                    )));
                }
                None => {
                    return Err(Cvc5Error::SolverError(format!(
                        "assumption `{name}` is not declared"
                    )));
                }
            }
        }
        self.last_assumptions = assumptions.to_vec();
        let payload: Vec<String> = assumptions.iter().map(|a| quote(a)).collect();
        let response =
            self.send_command(&format!("(check-sat-assuming ({}))", payload.join(" ")))?;
        Self::parse_check_response(&response)
    }

    fn check_sat_assuming_with_model(
        &mut self,
        assumptions: &[String],
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), Cvc5Error> {
        let result = self.check_sat_assuming(assumptions)?;
        self.finish_with_model(result, var_names)
    }

    fn get_unsat_core_assumptions(&mut self) -> Result<Vec<String>, Cvc5Error> {
        let response = self.send_command("(get-unsat-assumptions)")?;
        let listed = SExpr::parse(&response)
            .map_err(|e| Cvc5Error::ParseError(e.to_string()))?
            .symbols();
        Ok(listed
            .into_iter()
            .filter(|name| self.last_assumptions.iter().any(|a| a == name))
            .collect())
    }

    fn supports_interpolation(&self) -> bool {
        self.interpolants
    }

    fn get_interpolant(
        &mut self,
        a_assumptions: &[String],
        b: &SmtTerm,
    ) -> Result<Option<SmtTerm>, Cvc5Error> {
        if !self.interpolants {
            return Ok(None);
        }
        self.interpolant_counter += 1;
        let name = format!("__itp_{}", self.interpolant_counter);
        self.push()?;
        for lit in a_assumptions {
            self.send_command_no_response(&format!("(assert {})", quote(lit)))?;
        }
        let goal = to_smtlib(&b.clone().not());
        let response = self.send_command(&format!("(get-interpolant {name} {goal})"));
        self.pop()?;
        let response = response?;
        debug!(interpolant = %response, "cvc5 interpolant");
        let term =
            parse_define_fun_body(&response).map_err(|e| Cvc5Error::ParseError(e.to_string()))?;
        Ok(Some(term))
    }

    fn reset(&mut self) -> Result<(), Cvc5Error> {
        self.send_command_no_response("(reset)")?;
        self.initialize()?;
        self.vars.clear();
        self.last_assumptions.clear();
        Ok(())
    }
}

fn parse_cvc5_value(response: &str, sort: &SmtSort) -> Option<ModelValue> {
    // Response format: ((name value))
    let parsed = SExpr::parse(response).ok()?;
    let pair = parsed.as_list()?.first()?.as_list()?;
    let value = pair.get(1)?;
    let value = parse_value(value)?;
    match (sort, value) {
        (SmtSort::Int, v @ ModelValue::Int(_)) | (SmtSort::Bool, v @ ModelValue::Bool(_)) => {
            Some(v)
        }
        _ => None,
    }
}
