use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

use crate::lock;

type Continuation = Box<dyn FnOnce() + Send + 'static>;

/// Counts outstanding units of work and runs a single continuation once the
/// count returns to zero. Units may keep arriving until the continuation runs.
pub struct JoinBarrier {
    state: Mutex<BarrierState>,
}

struct BarrierState {
    outstanding: usize,
    continuation: Option<Continuation>,
    waiters: Vec<oneshot::Sender<()>>,
}

/// Handle for one unit added to a [`JoinBarrier`]. Releasing consumes it, so a
/// unit can be released at most once. Dropping it without releasing leaves the
/// unit outstanding.
#[must_use = "a unit that is never released keeps its barrier from draining"]
pub struct Release {
    barrier: Arc<JoinBarrier>,
}

impl JoinBarrier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(BarrierState {
                outstanding: 0,
                continuation: None,
                waiters: Vec::new(),
            }),
        })
    }

    pub fn add_unit(self: &Arc<Self>) -> Release {
        lock(&self.state).outstanding += 1;
        Release {
            barrier: Arc::clone(self),
        }
    }

    pub fn outstanding(&self) -> usize {
        lock(&self.state).outstanding
    }

    /// Attaches the drain continuation, replacing any previous one. Runs it
    /// immediately when nothing is outstanding.
    pub fn on_drained<F>(&self, continuation: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut state = lock(&self.state);
            if state.outstanding > 0 {
                state.continuation = Some(Box::new(continuation));
                return;
            }
        }
        continuation();
    }

    /// Resolves once every unit added so far (and any added before the count
    /// reaches zero) has been released.
    /// Async waiters are kept apart from the `on_drained` continuation, so any
    /// number of them can wait on the same barrier.
    pub async fn drained(&self) {
        loop {
            let rx = {
                let mut state = lock(&self.state);
                if state.outstanding == 0 {
                    return;
                }
                let (tx, rx) = oneshot::channel();
                state.waiters.push(tx);
                rx
            };

            if rx.await.is_ok() {
                return;
            }
        }
    }

    fn release_one(&self) {
        let (continuation, waiters) = {
            let mut state = lock(&self.state);
            debug_assert!(state.outstanding > 0, "join barrier released below zero");
            state.outstanding = state.outstanding.saturating_sub(1);
            if state.outstanding == 0 {
                (state.continuation.take(), std::mem::take(&mut state.waiters))
            } else {
                (None, Vec::new())
            }
        };

        if let Some(continuation) = continuation {
            continuation();
        }
        for waiter in waiters {
            let _ = waiter.send(());
        }
    }
}

impl Release {
    pub fn release(self) {
        self.barrier.release_one();
    }
}
