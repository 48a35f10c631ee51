use std::sync::Mutex;
use tokio::sync::oneshot;

use crate::lock;

type Continuation = Box<dyn FnOnce() + Send + 'static>;

/// One-shot broadcast: every continuation registered before or after `fire`
/// runs exactly once.
pub struct CompletionSignal {
    state: Mutex<SignalState>,
}

struct SignalState {
    fired: bool,
    continuations: Vec<Continuation>,
}

impl CompletionSignal {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SignalState {
                fired: false,
                continuations: Vec::new(),
            }),
        }
    }

    /// Runs `continuation` now if the signal already fired, otherwise queues it.
    pub fn on_complete<F>(&self, continuation: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut state = lock(&self.state);
            if !state.fired {
                state.continuations.push(Box::new(continuation));
                return;
            }
        }
        continuation();
    }

    /// Runs the queued continuations in registration order. Later calls are no-ops.
    pub fn fire(&self) {
        let continuations = {
            let mut state = lock(&self.state);
            if state.fired {
                return;
            }
            state.fired = true;
            std::mem::take(&mut state.continuations)
        };

        // Outside the lock: a continuation may register on this same signal.
        for continuation in continuations {
            continuation();
        }
    }

    pub fn is_fired(&self) -> bool {
        lock(&self.state).fired
    }

    /// Resolves once the signal has fired.
    pub async fn fired(&self) {
        let (tx, rx) = oneshot::channel();
        self.on_complete(move || {
            let _ = tx.send(());
        });
        let _ = rx.await;
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_fire_runs_queued_in_order() {
        let signal = CompletionSignal::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = Arc::clone(&order);
            signal.on_complete(move || order.lock().unwrap().push(i));
        }

        assert!(order.lock().unwrap().is_empty());
        signal.fire();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_fire_is_idempotent() {
        let signal = CompletionSignal::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&count);
        signal.on_complete(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        signal.fire();
        signal.fire();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(signal.is_fired());
    }

    #[test]
    fn test_late_registration_runs_immediately() {
        let signal = CompletionSignal::new();
        signal.fire();

        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        signal.on_complete(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(count.load(Ordering::SeqCst), 1);

        signal.fire();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reentrant_registration_during_fire() {
        let signal = Arc::new(CompletionSignal::new());
        let count = Arc::new(AtomicUsize::new(0));

        let inner_signal = Arc::clone(&signal);
        let c = Arc::clone(&count);
        signal.on_complete(move || {
            let c = Arc::clone(&c);
            inner_signal.on_complete(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        });

        signal.fire();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fired_waiter() {
        let signal = Arc::new(CompletionSignal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            tokio::spawn(async move { signal.fired().await })
        };

        tokio::task::yield_now().await;
        signal.fire();
        waiter.await.unwrap();

        // Already fired: resolves without waiting.
        signal.fired().await;
    }
}
