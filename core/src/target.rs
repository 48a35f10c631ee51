use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

use crate::barrier::JoinBarrier;
use crate::error::BuildError;
use crate::lock;
use crate::signal::CompletionSignal;
use crate::stamp::Stamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetStatus {
    Unstarted,
    Building,
    DoneFresh,
    DoneBuilt,
    Errored,
}

impl TargetStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TargetStatus::DoneFresh | TargetStatus::DoneBuilt | TargetStatus::Errored
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TargetStatus::DoneFresh | TargetStatus::DoneBuilt)
    }
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            TargetStatus::Unstarted => "unstarted",
            TargetStatus::Building => "building",
            TargetStatus::DoneFresh => "fresh",
            TargetStatus::DoneBuilt => "built",
            TargetStatus::Errored => "errored",
        };

        write!(f, "{value}")
    }
}

/// Per-name build state. Owned by the target cache; everything else holds
/// shared lookups.
pub struct Target {
    name: String,
    state: Mutex<TargetState>,
    completion: OnceLock<CompletionSignal>,
}

struct TargetState {
    status: TargetStatus,
    freshness: Option<Stamp>,
    dependency_tag: Option<Stamp>,
    forced: bool,
    barrier: Option<Arc<JoinBarrier>>,
    failed_dependency: Option<String>,
    error: Option<Arc<BuildError>>,
}

impl Target {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(TargetState {
                status: TargetStatus::Unstarted,
                freshness: None,
                dependency_tag: None,
                forced: false,
                barrier: None,
                failed_dependency: None,
                error: None,
            }),
            completion: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> TargetStatus {
        lock(&self.state).status
    }

    pub fn freshness(&self) -> Option<Stamp> {
        lock(&self.state).freshness
    }

    pub fn dependency_tag(&self) -> Option<Stamp> {
        lock(&self.state).dependency_tag
    }

    pub fn error(&self) -> Option<Arc<BuildError>> {
        lock(&self.state).error.clone()
    }

    pub fn failed_dependency(&self) -> Option<String> {
        lock(&self.state).failed_dependency.clone()
    }

    /// Present iff a build has been requested.
    pub fn completion(&self) -> Option<&CompletionSignal> {
        self.completion.get()
    }

    /// The target exists and is at least as new as every dependency seen so far.
    pub fn is_fresh(&self) -> bool {
        let state = lock(&self.state);
        if state.forced {
            return false;
        }
        match (state.freshness, state.dependency_tag) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(own), Some(deps)) => own >= deps,
        }
    }

    /// Unstarted -> Building. Returns false if a build was already requested.
    pub(crate) fn start(&self) -> bool {
        let mut state = lock(&self.state);
        if state.status != TargetStatus::Unstarted {
            return false;
        }
        state.status = TargetStatus::Building;
        self.signal();
        true
    }

    pub(crate) fn signal(&self) -> &CompletionSignal {
        self.completion.get_or_init(CompletionSignal::new)
    }

    pub(crate) fn set_freshness(&self, stamp: Option<Stamp>) {
        lock(&self.state).freshness = stamp;
    }

    /// Raises the dependency tag to `stamp` if it is newer. Absent stamps never lower it.
    pub(crate) fn relax(&self, stamp: Option<Stamp>) {
        let mut state = lock(&self.state);
        if stamp > state.dependency_tag {
            state.dependency_tag = stamp;
        }
    }

    /// A dependency was rebuilt without leaving a stamp to compare against.
    pub(crate) fn force_stale(&self) {
        lock(&self.state).forced = true;
    }

    pub(crate) fn dependency_barrier(&self) -> Arc<JoinBarrier> {
        let mut state = lock(&self.state);
        Arc::clone(state.barrier.get_or_insert_with(JoinBarrier::new))
    }

    pub(crate) fn current_barrier(&self) -> Option<Arc<JoinBarrier>> {
        lock(&self.state).barrier.clone()
    }

    /// Drops the barrier once it drained, unless a newer one replaced it.
    pub(crate) fn clear_barrier(&self, drained: &Arc<JoinBarrier>) {
        let mut state = lock(&self.state);
        if let Some(current) = &state.barrier {
            if Arc::ptr_eq(current, drained) && current.outstanding() == 0 {
                state.barrier = None;
            }
        }
    }

    pub(crate) fn note_failed_dependency(&self, dependency: &str) {
        let mut state = lock(&self.state);
        if state.failed_dependency.is_none() {
            state.failed_dependency = Some(dependency.to_string());
        }
    }

    /// Building -> DoneFresh/DoneBuilt. Returns false if already terminal.
    pub(crate) fn finish(&self, fresh: bool, stamp: Option<Stamp>) -> bool {
        let mut state = lock(&self.state);
        if state.status != TargetStatus::Building {
            return false;
        }
        state.freshness = stamp;
        state.status = if fresh {
            TargetStatus::DoneFresh
        } else {
            TargetStatus::DoneBuilt
        };
        true
    }

    /// Building -> Errored. Returns the stored error, or None if already terminal.
    pub(crate) fn fail(&self, error: BuildError) -> Option<Arc<BuildError>> {
        let mut state = lock(&self.state);
        if state.status != TargetStatus::Building {
            return None;
        }
        let error = Arc::new(error);
        state.error = Some(Arc::clone(&error));
        state.status = TargetStatus::Errored;
        Some(error)
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("Target")
            .field("name", &self.name)
            .field("status", &state.status)
            .field("freshness", &state.freshness)
            .field("dependency_tag", &state.dependency_tag)
            .finish()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.status())
    }
}
