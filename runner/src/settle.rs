//! Single-assignment settlement cell shared by competing completion sources.
//!
//! Any number of producers (packet observers, timers) may race to settle the
//! cell; only the first value is delivered, every later attempt is a no-op that
//! reports `false`.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;

enum State<T> {
    Unsettled(oneshot::Sender<T>),
    Settled,
}

/// Producer side of a one-shot settlement.
pub struct Settlement<T> {
    state: Mutex<State<T>>,
}

/// Consumer side; resolves with the first settled value.
pub type Pending<T> = oneshot::Receiver<T>;

impl<T> Settlement<T> {
    pub fn new() -> (Arc<Self>, Pending<T>) {
        let (tx, rx) = oneshot::channel();
        let cell = Arc::new(Self {
            state: Mutex::new(State::Unsettled(tx)),
        });
        (cell, rx)
    }

    /// Settle with `value`. Returns `false` if the cell was already settled.
    pub fn settle(&self, value: T) -> bool {
        let mut state = self.lock();
        match std::mem::replace(&mut *state, State::Settled) {
            State::Unsettled(tx) => {
                // A dropped receiver still counts as settled.
                let _ = tx.send(value);
                true
            }
            State::Settled => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
