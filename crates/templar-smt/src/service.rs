//! The solver service: prover factories plus a memoized unsat oracle.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, trace};

use crate::backends::{backend_for, SolverBackend};
use crate::config::SolverOptions;
use crate::error::SolverError;
use crate::interpolation::{AssumptionAdapter, InterpolatingProverEnvironment, MarshallingBridge};
use crate::prover::{Instrumentation, ProverEnvironment, ProverOptions};
use crate::shutdown::ShutdownNotifier;
use crate::solver::DynSolver;
use crate::terms::SmtTerm;

/// Counters collected by a [`SolverService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SolverStatistics {
    /// Queries that reached a solver.
    pub sat_checks: u64,
    /// Queries answered from a literal `true`/`false` or a syntactic shortcut.
    pub trivial_sat_checks: u64,
    /// Queries answered from the unsat cache.
    pub cached_sat_checks: u64,
    /// Wall-clock time spent in solver queries, in microseconds.
    pub solver_time_micros: u64,
}

impl SolverStatistics {
    pub fn solver_time(&self) -> Duration {
        Duration::from_micros(self.solver_time_micros)
    }
}

impl fmt::Display for SolverStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Number of SAT checks:         {}", self.sat_checks)?;
        writeln!(f, "  trivial:                    {}", self.trivial_sat_checks)?;
        writeln!(f, "  cached:                     {}", self.cached_sat_checks)?;
        write!(
            f,
            "Time spent in SAT checks:     {:.3}s",
            self.solver_time().as_secs_f64()
        )
    }
}

/// Shared entry point for every solver query of an analysis.
///
/// Owns one solving backend and one interpolation backend (possibly the same
/// instance). The unsat cache only grows and is keyed by structural term
/// equality. Share the service through an `Arc`.
pub struct SolverService {
    options: SolverOptions,
    instrumentation: Instrumentation,
    solving: Arc<dyn SolverBackend>,
    interpolation: Arc<dyn SolverBackend>,
    shutdown: ShutdownNotifier,
    unsat_cache: RwLock<HashMap<SmtTerm, bool>>,
    sat_checks: AtomicU64,
    trivial_sat_checks: AtomicU64,
    cached_sat_checks: AtomicU64,
    solver_time_nanos: AtomicU64,
    next_prover_id: AtomicU64,
}

impl SolverService {
    /// Build a service with the backends named in `options`.
    ///
    /// A configured `interpolation_solver` always gets its own backend
    /// instance, even when it names the same engine.
    pub fn new(options: SolverOptions, shutdown: ShutdownNotifier) -> Self {
        let solving = backend_for(options.solver, &options);
        let interpolation = options
            .interpolation_solver
            .map(|choice| backend_for(choice, &options));
        Self::with_backends(options, solving, interpolation, shutdown)
    }

    /// Build a service over explicit backends. `interpolation: None` shares
    /// the solving backend.
    pub fn with_backends(
        options: SolverOptions,
        solving: Arc<dyn SolverBackend>,
        interpolation: Option<Arc<dyn SolverBackend>>,
        shutdown: ShutdownNotifier,
    ) -> Self {
        let interpolation = interpolation.unwrap_or_else(|| Arc::clone(&solving));
        let instrumentation = Instrumentation::from_options(&options);
        info!(
            solver = solving.name(),
            interpolation = interpolation.name(),
            ?instrumentation,
            "solver service created"
        );
        Self {
            options,
            instrumentation,
            solving,
            interpolation,
            shutdown,
            unsat_cache: RwLock::new(HashMap::new()),
            sat_checks: AtomicU64::new(0),
            trivial_sat_checks: AtomicU64::new(0),
            cached_sat_checks: AtomicU64::new(0),
            solver_time_nanos: AtomicU64::new(0),
            next_prover_id: AtomicU64::new(0),
        }
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    pub fn shutdown_notifier(&self) -> &ShutdownNotifier {
        &self.shutdown
    }

    pub fn new_prover_environment(
        &self,
        options: ProverOptions,
    ) -> Result<ProverEnvironment, SolverError> {
        let solver = self.solving.create_solver(options)?;
        let solver = if options.generate_unsat_cores {
            with_assumptions(solver)
        } else {
            solver
        };
        Ok(self.instrument(solver, self.solving.name(), options))
    }

    pub fn new_prover_environment_with_models(&self) -> Result<ProverEnvironment, SolverError> {
        self.new_prover_environment(ProverOptions::with_models())
    }

    pub fn new_prover_environment_with_unsat_cores(
        &self,
    ) -> Result<ProverEnvironment, SolverError> {
        self.new_prover_environment(ProverOptions::with_unsat_cores())
    }

    /// A prover for interpolation queries, built on the interpolation
    /// backend.
    pub fn new_prover_environment_with_interpolation(
        &self,
    ) -> Result<InterpolatingProverEnvironment, SolverError> {
        let options = ProverOptions {
            generate_interpolants: true,
            ..ProverOptions::default()
        };
        let mut solver = with_assumptions(self.interpolation.create_solver(options)?);
        if !self.shares_backend() {
            solver = Box::new(MarshallingBridge::new(solver));
        }
        let prover = self.instrument(solver, self.interpolation.name(), options);
        Ok(InterpolatingProverEnvironment::new(prover))
    }

    /// Whether `formula` is unsatisfiable, answered from the cache when
    /// possible.
    pub fn is_unsat(&self, formula: &SmtTerm) -> Result<bool, SolverError> {
        if formula.is_false() {
            self.trivial_sat_checks.fetch_add(1, Ordering::Relaxed);
            return Ok(true);
        }
        if formula.is_true() {
            self.trivial_sat_checks.fetch_add(1, Ordering::Relaxed);
            return Ok(false);
        }
        if let Some(unsat) = self.cached(formula) {
            self.cached_sat_checks.fetch_add(1, Ordering::Relaxed);
            trace!(%formula, unsat, "unsat cache hit");
            return Ok(unsat);
        }

        self.sat_checks.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();
        let result = self.check_uncached(formula);
        self.record_time(start.elapsed());
        let unsat = result?;

        let mut cache = match self.unsat_cache.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        cache.insert(formula.clone(), unsat);
        Ok(unsat)
    }

    /// Whether `a ⇒ b` is valid.
    pub fn implies(&self, a: &SmtTerm, b: &SmtTerm) -> Result<bool, SolverError> {
        if a.is_false() || b.is_true() || a == b {
            self.trivial_sat_checks.fetch_add(1, Ordering::Relaxed);
            return Ok(true);
        }
        self.is_unsat(&a.clone().implies(b.clone()).not())
    }

    /// An unsat core of `constraints`, at the granularity of their top-level
    /// conjuncts.
    ///
    /// # Panics
    ///
    /// Panics if the constraints are satisfiable; callers must only ask for
    /// cores of sets they know to be contradictory.
    pub fn unsat_core(&self, constraints: &[SmtTerm]) -> Result<Vec<SmtTerm>, SolverError> {
        let mut prover = self.new_prover_environment_with_unsat_cores()?;
        for constraint in constraints {
            for conjunct in constraint.conjuncts() {
                prover.assert_tracked(&conjunct)?;
            }
        }
        let unsat = prover.is_unsat()?;
        assert!(unsat, "unsat core requested for satisfiable constraints");
        prover.unsat_core()
    }

    /// Record `formula` as unsatisfiable without asking a solver.
    ///
    /// Debug builds re-check the claim and report a wrong one as
    /// [`SolverError::Internal`].
    pub fn add_unsatisfiable_formula_to_cache(&self, formula: &SmtTerm) -> Result<(), SolverError> {
        if cfg!(debug_assertions) && !self.check_uncached(formula)? {
            return Err(SolverError::Internal(format!(
                "formula added to the unsat cache is satisfiable: {formula}"
            )));
        }
        let mut cache = match self.unsat_cache.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        cache.insert(formula.clone(), true);
        Ok(())
    }

    pub fn statistics(&self) -> SolverStatistics {
        SolverStatistics {
            sat_checks: self.sat_checks.load(Ordering::Relaxed),
            trivial_sat_checks: self.trivial_sat_checks.load(Ordering::Relaxed),
            cached_sat_checks: self.cached_sat_checks.load(Ordering::Relaxed),
            solver_time_micros: self.solver_time_nanos.load(Ordering::Relaxed) / 1_000,
        }
    }

    /// Close the solving backend and, if distinct, the interpolation backend.
    ///
    /// Both closes always run. If both fail, the first failure is returned
    /// with the second attached as [`SolverError::suppressed`].
    pub fn close(&self) -> Result<(), SolverError> {
        info!(
            solver = self.solving.name(),
            shared = self.shares_backend(),
            "closing solver service"
        );
        let first = self.solving.close();
        let second = if self.shares_backend() {
            Ok(())
        } else {
            self.interpolation.close()
        };
        SolverError::combine_teardown(first, second)
    }

    fn shares_backend(&self) -> bool {
        same_instance(&self.solving, &self.interpolation)
    }

    fn instrument(
        &self,
        solver: DynSolver,
        backend: &str,
        options: ProverOptions,
    ) -> ProverEnvironment {
        let id = self.next_prover_id.fetch_add(1, Ordering::Relaxed);
        ProverEnvironment::new(
            id,
            solver,
            backend,
            options,
            self.instrumentation,
            self.shutdown.clone(),
        )
    }

    fn cached(&self, formula: &SmtTerm) -> Option<bool> {
        let cache = match self.unsat_cache.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        cache.get(formula).copied()
    }

    fn check_uncached(&self, formula: &SmtTerm) -> Result<bool, SolverError> {
        let mut prover = self.new_prover_environment(ProverOptions::default())?;
        prover.assert_term(formula)?;
        prover.is_unsat()
    }

    fn record_time(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.solver_time_nanos.fetch_add(nanos, Ordering::Relaxed);
    }
}

fn with_assumptions(solver: DynSolver) -> DynSolver {
    if solver.supports_assumption_unsat_core() {
        solver
    } else {
        Box::new(AssumptionAdapter::new(solver))
    }
}

fn same_instance(a: &Arc<dyn SolverBackend>, b: &Arc<dyn SolverBackend>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}
