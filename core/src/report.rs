//! Run bookkeeping: what started, what was rebuilt, what was already fresh and
//! what failed. Nothing here feeds back into graph decisions.

use crate::error::{BuildError, RunError};

/// Progress notifications sent to whoever renders the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    Started { target: String },
    Output { target: String, line: String },
    Rebuilt { target: String },
    Fresh { target: String },
    Failed {
        target: String,
        error: String,
        blocked: bool,
    },
}

impl BuildEvent {
    pub fn target(&self) -> &str {
        match self {
            BuildEvent::Started { target }
            | BuildEvent::Output { target, .. }
            | BuildEvent::Rebuilt { target }
            | BuildEvent::Fresh { target }
            | BuildEvent::Failed { target, .. } => target,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub target: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct RunReport {
    started: usize,
    in_flight: usize,
    rebuilt: Vec<String>,
    fresh: Vec<String>,
    failures: Vec<Failure>,
    blocked: Vec<Failure>,
    fatal: Option<Failure>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_started(&mut self) {
        self.started += 1;
        self.in_flight += 1;
    }

    /// Returns true when this was the last build in flight.
    pub fn record_finished(&mut self) -> bool {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.in_flight == 0
    }

    pub fn record_rebuilt(&mut self, target: &str) {
        self.rebuilt.push(target.to_string());
    }

    pub fn record_fresh(&mut self, target: &str) {
        self.fresh.push(target.to_string());
    }

    pub fn record_failure(&mut self, target: &str, error: &BuildError) {
        let failure = Failure {
            target: target.to_string(),
            message: error.to_string(),
        };
        if error.is_blocked() {
            self.blocked.push(failure);
        } else {
            self.failures.push(failure);
        }
    }

    pub fn record_fatal(&mut self, target: &str, message: impl Into<String>) {
        if self.fatal.is_none() {
            self.fatal = Some(Failure {
                target: target.to_string(),
                message: message.into(),
            });
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Nothing left to wait for: every started build finished, or the run is dead.
    pub fn is_settled(&self) -> bool {
        self.in_flight == 0 || self.fatal.is_some()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            started: self.started,
            in_flight: self.in_flight,
            rebuilt: self.rebuilt.clone(),
            fresh: self.fresh.clone(),
            failures: self.failures.clone(),
            blocked: self.blocked.clone(),
            fatal: self.fatal.clone(),
        }
    }
}

/// Snapshot of a [`RunReport`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub started: usize,
    pub in_flight: usize,
    pub rebuilt: Vec<String>,
    pub fresh: Vec<String>,
    pub failures: Vec<Failure>,
    pub blocked: Vec<Failure>,
    pub fatal: Option<Failure>,
}

impl RunSummary {
    pub fn completed(&self) -> usize {
        self.started - self.in_flight
    }

    /// Decides the exit status of the run.
    pub fn verdict(&self) -> Result<(), RunError> {
        if let Some(fatal) = &self.fatal {
            return Err(RunError::Fatal {
                target: fatal.target.clone(),
                message: fatal.message.clone(),
            });
        }

        let count = self.failures.len() + self.blocked.len();
        if count > 0 {
            return Err(RunError::Failed { count });
        }

        if self.in_flight > 0 {
            return Err(RunError::Incomplete {
                in_flight: self.in_flight,
            });
        }

        Ok(())
    }

    pub fn is_success(&self) -> bool {
        self.verdict().is_ok()
    }
}
