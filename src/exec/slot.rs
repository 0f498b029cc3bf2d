//! Single-assignment result slot for asynchronous execution.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::{Condvar, Mutex};
use tracing::warn;

use crate::codec::Record;
use crate::error::{Error, Result};

/// Outcome stored in an [`AsyncResult`].
pub type Outcome = Result<Vec<Record>>;

#[derive(Default)]
struct SlotState {
    outcome: Option<Outcome>,
    wakers: Vec<Waker>,
}

struct SlotInner {
    state: Mutex<SlotState>,
    ready: Condvar,
}

/// Write-once, read-many result of an asynchronous execution.
///
/// Clones share the same slot. Readers block in [`get`](AsyncResult::get), poll with
/// [`try_get`](AsyncResult::try_get), or `.await` the slot. Only the first
/// [`fulfill`](AsyncResult::fulfill) takes effect.
#[derive(Clone)]
pub struct AsyncResult {
    inner: Arc<SlotInner>,
}

impl Default for AsyncResult {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncResult {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SlotInner {
                state: Mutex::new(SlotState::default()),
                ready: Condvar::new(),
            }),
        }
    }

    /// Stores `outcome` and wakes every reader.
    ///
    /// Returns [`Error::AlreadyFulfilled`] and keeps the first outcome if the slot was
    /// already written.
    pub fn fulfill(&self, outcome: Outcome) -> Result<()> {
        let wakers = {
            let mut state = self.inner.state.lock();
            if state.outcome.is_some() {
                warn!("ignoring second fulfillment of an async result");
                return Err(Error::AlreadyFulfilled);
            }
            state.outcome = Some(outcome);
            std::mem::take(&mut state.wakers)
        };
        self.inner.ready.notify_all();
        for waker in wakers {
            waker.wake();
        }
        Ok(())
    }

    /// Whether an outcome has been stored.
    pub fn is_fulfilled(&self) -> bool {
        self.inner.state.lock().outcome.is_some()
    }

    /// Returns the outcome if present, without blocking.
    pub fn try_get(&self) -> Option<Outcome> {
        self.inner.state.lock().outcome.clone()
    }

    /// Blocks until the slot is fulfilled and returns the outcome.
    ///
    /// There is no timeout; a request that never completes blocks forever.
    pub fn get(&self) -> Outcome {
        let mut state = self.inner.state.lock();
        loop {
            if let Some(outcome) = state.outcome.as_ref() {
                return outcome.clone();
            }
            self.inner.ready.wait(&mut state);
        }
    }
}

impl Future for AsyncResult {
    type Output = Outcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.inner.state.lock();
        match state.outcome.as_ref() {
            Some(outcome) => Poll::Ready(outcome.clone()),
            None => {
                if !state.wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    state.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

impl fmt::Debug for AsyncResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        let status = match &state.outcome {
            None => "pending",
            Some(Ok(_)) => "success",
            Some(Err(_)) => "failure",
        };
        f.debug_struct("AsyncResult").field("status", &status).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Value;
    use std::time::Duration;

    fn one_record() -> Vec<Record> {
        let mut record = Record::new();
        record.push("id", Value::Int(1));
        vec![record]
    }

    #[test]
    fn first_fulfillment_wins() {
        let slot = AsyncResult::new();
        slot.fulfill(Ok(one_record())).unwrap();
        let second = slot.fulfill(Err(Error::NoSession));
        assert_eq!(second, Err(Error::AlreadyFulfilled));
        assert_eq!(slot.get(), Ok(one_record()));
    }

    #[test]
    fn get_blocks_until_another_thread_fulfills() {
        let slot = AsyncResult::new();
        let writer = slot.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            writer.fulfill(Err(Error::NoSession)).unwrap();
        });
        assert_eq!(slot.get(), Err(Error::NoSession));
        // read-many
        assert_eq!(slot.get(), Err(Error::NoSession));
        handle.join().unwrap();
    }

    #[test]
    fn try_get_reports_pending() {
        let slot = AsyncResult::new();
        assert!(slot.try_get().is_none());
        assert!(!slot.is_fulfilled());
        assert_eq!(format!("{slot:?}"), "AsyncResult { status: \"pending\" }");
    }

    #[test]
    fn awaiting_resolves_after_fulfillment() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let slot = AsyncResult::new();
        let writer = slot.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            writer.fulfill(Ok(one_record())).unwrap();
        });
        let outcome = runtime.block_on(slot.clone());
        assert_eq!(outcome, Ok(one_record()));
    }
}
