use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::SolverError;

/// Cooperative cancellation signal shared between the analysis loop and the
/// provers it drives.
///
/// Clones share the same flag. Provers check it before every satisfiability
/// query; they never clear it. A query already running inside a backend is
/// not cut short: it ends on its own or at the solver timeout, and the next
/// query reports the interruption.
#[derive(Debug, Clone, Default)]
pub struct ShutdownNotifier {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    requested: AtomicBool,
    reason: Mutex<Option<String>>,
}

impl ShutdownNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. The first reason given is kept.
    pub fn request_shutdown(&self, reason: impl Into<String>) {
        let mut guard = match self.inner.reason.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.is_none() {
            *guard = Some(reason.into());
        }
        self.inner.requested.store(true, Ordering::SeqCst);
    }

    pub fn should_shutdown(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<String> {
        match self.inner.reason.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// `Err(SolverError::Interrupted)` once shutdown has been requested.
    pub fn check(&self) -> Result<(), SolverError> {
        if self.should_shutdown() {
            let reason = self.reason().unwrap_or_else(|| "shutdown requested".into());
            return Err(SolverError::Interrupted(reason));
        }
        Ok(())
    }
}
