pub mod barrier;
pub mod cache;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod job;
pub mod logger;
pub mod recipe;
pub mod report;
pub mod rule;
pub mod signal;
pub mod stamp;
pub mod target;

use std::sync::{Mutex, MutexGuard};

pub use barrier::{JoinBarrier, Release};
pub use cache::TargetCache;
pub use cli::Cli;
pub use config::Config;
pub use engine::{BuildContext, Engine};
pub use error::{BuildError, BuildResult, RuleError, RunError};
pub use job::{Job, Step};
pub use recipe::{copy_file, regex_escape, CommandRecipe, CopyRecipe};
pub use report::{BuildEvent, RunReport, RunSummary};
pub use rule::{recipe_fn, Recipe, RuleMatch, Rules};
pub use signal::CompletionSignal;
pub use stamp::{FreshnessSource, FsStat, MemoryStat, Stamp};
pub use target::{Target, TargetStatus};

/// Locks a mutex, ignoring poisoning: a panicking builder is reported on its
/// own and must not wedge the rest of the graph.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
