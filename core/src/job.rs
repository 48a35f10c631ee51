use std::sync::Arc;

use crate::engine::Engine;
use crate::error::{BuildError, BuildResult};
use crate::report::BuildEvent;
use crate::rule::RuleMatch;
use crate::target::Target;

/// What a builder should do after waiting on its dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The target is stale (or more dependencies may follow): produce it.
    Build,
    /// The node is already closed; the builder must return.
    Done,
}

/// Handle a recipe receives for the one target it builds.
#[derive(Clone)]
pub struct Job {
    engine: Engine,
    target: Arc<Target>,
    matched: Arc<RuleMatch>,
}

impl Job {
    pub(crate) fn new(engine: Engine, target: Arc<Target>, matched: RuleMatch) -> Self {
        Self {
            engine,
            target,
            matched: Arc::new(matched),
        }
    }

    pub fn name(&self) -> &str {
        self.target.name()
    }

    pub fn target(&self) -> &Arc<Target> {
        &self.target
    }

    pub fn captures(&self) -> &RuleMatch {
        &self.matched
    }

    pub fn capture(&self, index: usize) -> Option<&str> {
        self.matched.get(index)
    }

    /// Forwards a line of builder output to the event sink.
    pub fn output(&self, line: impl Into<String>) {
        self.engine.emit(BuildEvent::Output {
            target: self.name().to_string(),
            line: line.into(),
        });
    }

    /// Starts building every name (in order) and ties each to this target's
    /// dependency barrier. Fails without starting the offending dependency if
    /// a declaration would close a cycle.
    pub fn declare_dependencies<I, S>(&self, names: I) -> BuildResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            self.engine.declare(&self.target, name.as_ref())?;
        }
        Ok(())
    }

    /// Waits for every dependency declared so far. With `more_coming` the
    /// builder always gets [`Step::Build`] back so it can declare more; without
    /// it the target is refreshed and may be closed as fresh. A failed
    /// dependency errors the target before the error is returned.
    pub async fn await_dependencies(&self, more_coming: bool) -> BuildResult<Step> {
        if let Some(barrier) = self.target.current_barrier() {
            barrier.drained().await;
            self.target.clear_barrier(&barrier);
        }

        if let Some(dependency) = self.target.failed_dependency() {
            let error = BuildError::DependencyFailed {
                target: self.name().to_string(),
                dependency: dependency.clone(),
            };
            // Closed here so a builder that drops the error cannot still succeed.
            self.engine.report_error(&self.target, error);
            return Err(BuildError::DependencyFailed {
                target: self.name().to_string(),
                dependency,
            });
        }

        if more_coming {
            return Ok(Step::Build);
        }
        Ok(self.refresh().await)
    }

    /// Declares `names` and waits for them with nothing more coming.
    pub async fn dep<I, S>(&self, names: I) -> BuildResult<Step>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.declare_dependencies(names)?;
        self.await_dependencies(false).await
    }

    /// Closes the target as fresh if it is, otherwise asks the builder to build.
    pub async fn refresh(&self) -> Step {
        if self.target.is_fresh() {
            self.engine.report_ok(&self.target, true).await;
            Step::Done
        } else {
            Step::Build
        }
    }

    pub async fn report_ok(&self, because_fresh: bool) {
        self.engine.report_ok(&self.target, because_fresh).await;
    }

    pub fn report_error(&self, error: BuildError) {
        self.engine.report_error(&self.target, error);
    }
}
