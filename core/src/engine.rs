use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, warn};

use crate::cache::TargetCache;
use crate::error::{BuildError, BuildResult};
use crate::job::Job;
use crate::lock;
use crate::report::{BuildEvent, RunReport, RunSummary};
use crate::rule::Rules;
use crate::stamp::{FreshnessSource, Stamp};
use crate::target::{Target, TargetStatus};

/// Everything an engine needs before the first build is requested.
pub struct BuildContext {
    rules: Rules,
    freshness: Arc<dyn FreshnessSource>,
    events: Option<mpsc::UnboundedSender<BuildEvent>>,
}

impl BuildContext {
    pub fn new(rules: Rules, freshness: Arc<dyn FreshnessSource>) -> Self {
        Self {
            rules,
            freshness,
            events: None,
        }
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<BuildEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }
}

/// The running build: target cache, rule dispatch and run bookkeeping.
/// Cloning is cheap and every clone drives the same graph.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<Shared>,
}

struct Shared {
    rules: Rules,
    freshness: Arc<dyn FreshnessSource>,
    events: Option<mpsc::UnboundedSender<BuildEvent>>,
    cache: TargetCache,
    report: Mutex<RunReport>,
    settled: Notify,
}

impl Engine {
    pub fn new(ctx: BuildContext) -> Self {
        Self {
            shared: Arc::new(Shared {
                rules: ctx.rules,
                freshness: ctx.freshness,
                events: ctx.events,
                cache: TargetCache::new(),
                report: Mutex::new(RunReport::new()),
                settled: Notify::new(),
            }),
        }
    }

    pub fn rules(&self) -> &Rules {
        &self.shared.rules
    }

    /// Starts building `name` without waiting for it. Must be called from
    /// within a tokio runtime.
    pub fn request_build(&self, name: &str) -> Arc<Target> {
        let target = self.shared.cache.get_or_create(name);
        self.begin_build(&target);
        target
    }

    /// Starts building `name` and waits until that target reaches a terminal state.
    pub async fn build(&self, name: &str) -> Arc<Target> {
        let target = self.request_build(name);
        target.signal().fired().await;
        target
    }

    pub fn target(&self, name: &str) -> Option<Arc<Target>> {
        self.shared.cache.get(name)
    }

    pub fn targets(&self) -> Vec<Arc<Target>> {
        self.shared.cache.targets()
    }

    pub fn target_count(&self) -> usize {
        self.shared.cache.len()
    }

    /// Waits until no build is in flight, or until a builder panicked.
    pub async fn settle(&self) -> RunSummary {
        loop {
            let notified = self.shared.settled.notified();
            if lock(&self.shared.report).is_settled() {
                break;
            }
            notified.await;
        }
        self.summary()
    }

    pub fn summary(&self) -> RunSummary {
        lock(&self.shared.report).summary()
    }

    pub(crate) fn emit(&self, event: BuildEvent) {
        if let Some(events) = &self.shared.events {
            let _ = events.send(event);
        }
    }

    fn begin_build(&self, target: &Arc<Target>) {
        if !target.start() {
            return;
        }

        debug!(name = %target.name(), "build started");
        lock(&self.shared.report).record_started();
        self.emit(BuildEvent::Started {
            target: target.name().to_string(),
        });

        let engine = self.clone();
        target.signal().on_complete(move || engine.finished_one());

        let engine = self.clone();
        let target = Arc::clone(target);
        tokio::spawn(async move { engine.run(target).await });
    }

    fn finished_one(&self) {
        if lock(&self.shared.report).record_finished() {
            self.shared.settled.notify_waiters();
        }
    }

    async fn run(self, target: Arc<Target>) {
        let outcome = AssertUnwindSafe(self.drive(Arc::clone(&target)))
            .catch_unwind()
            .await;

        if let Err(panic) = outcome {
            let message = panic_message(panic.as_ref());
            error!(name = %target.name(), %message, "builder panicked");
            lock(&self.shared.report).record_fatal(target.name(), message);
            self.shared.settled.notify_waiters();
        }
    }

    async fn drive(&self, target: Arc<Target>) {
        match self.stat(&target).await {
            Ok(stamp) => target.set_freshness(stamp),
            Err(e) => {
                self.report_error(&target, e);
                return;
            }
        }

        let Some((recipe, matched)) = self.shared.rules.dispatch(target.name()) else {
            // No rule: an existing leaf is fresh, anything else cannot be made.
            if target.is_fresh() {
                self.report_ok(&target, true).await;
            } else {
                self.report_error(
                    &target,
                    BuildError::NoRule {
                        target: target.name().to_string(),
                    },
                );
            }
            return;
        };

        debug!(name = %target.name(), recipe = %recipe.describe(), "dispatching");
        let job = Job::new(self.clone(), Arc::clone(&target), matched);
        let result = recipe.build(job).await;

        if target.status().is_terminal() {
            match result {
                Err(e) if !e.is_blocked() => {
                    warn!(name = %target.name(), error = %e, "ignoring error from a finished target")
                }
                _ => {}
            }
            return;
        }

        match result {
            Ok(()) => self.report_ok(&target, false).await,
            Err(e) => self.report_error(&target, e),
        }
    }

    async fn stat(&self, target: &Target) -> BuildResult<Option<Stamp>> {
        self.shared
            .freshness
            .stamp(target.name())
            .await
            .map_err(|source| BuildError::Stat {
                target: target.name().to_string(),
                source,
            })
    }

    pub(crate) fn declare(&self, from: &Arc<Target>, name: &str) -> BuildResult<()> {
        if let Err(path) = self.shared.cache.declare_edge(from.name(), name) {
            return Err(BuildError::Cycle { path });
        }

        let dependency = self.shared.cache.get_or_create(name);
        let release = from.dependency_barrier().add_unit();
        self.begin_build(&dependency);

        let waiter = Arc::clone(from);
        let finished = Arc::clone(&dependency);
        dependency.signal().on_complete(move || {
            let status = finished.status();
            if status == TargetStatus::DoneBuilt && finished.freshness().is_none() {
                waiter.force_stale();
            } else if status.is_success() {
                waiter.relax(finished.freshness());
            } else {
                waiter.note_failed_dependency(finished.name());
            }
            release.release();
        });

        Ok(())
    }

    pub(crate) async fn report_ok(&self, target: &Arc<Target>, because_fresh: bool) {
        if let Some(dependency) = target.failed_dependency() {
            self.report_error(
                target,
                BuildError::DependencyFailed {
                    target: target.name().to_string(),
                    dependency,
                },
            );
            return;
        }
        if let Some(barrier) = target.current_barrier() {
            let outstanding = barrier.outstanding();
            if outstanding > 0 {
                self.report_error(
                    target,
                    BuildError::PendingDependencies {
                        target: target.name().to_string(),
                        outstanding,
                    },
                );
                return;
            }
        }

        // The builder may have just rewritten the target.
        let stamp = match self.stat(target).await {
            Ok(stamp) => stamp,
            Err(e) => {
                self.report_error(target, e);
                return;
            }
        };

        if !target.finish(because_fresh, stamp) {
            warn!(name = %target.name(), "ignoring second completion report");
            return;
        }

        let name = target.name().to_string();
        {
            let mut report = lock(&self.shared.report);
            if because_fresh {
                report.record_fresh(&name);
            } else {
                report.record_rebuilt(&name);
            }
        }

        debug!(name = %name, fresh = because_fresh, "build finished");
        self.emit(if because_fresh {
            BuildEvent::Fresh { target: name }
        } else {
            BuildEvent::Rebuilt { target: name }
        });
        target.signal().fire();
    }

    pub(crate) fn report_error(&self, target: &Arc<Target>, error: BuildError) {
        let Some(error) = target.fail(error) else {
            warn!(name = %target.name(), "ignoring error report for a finished target");
            return;
        };

        lock(&self.shared.report).record_failure(target.name(), &error);

        debug!(name = %target.name(), error = %error, "build failed");
        self.emit(BuildEvent::Failed {
            target: target.name().to_string(),
            error: error.to_string(),
            blocked: error.is_blocked(),
        });
        target.signal().fire();
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
