//! Completion bridge from a driver future into an [`AsyncResult`].

use std::sync::Arc;

use tracing::{debug, trace};

use crate::codec::{decode_result_set, Record};
use crate::error::{Error, Result};
use crate::exec::executor::Executor;
use crate::exec::slot::AsyncResult;
use crate::session::{DriverFuture, DriverOutcome};

/// Callback invoked with the decoded records.
pub type SuccessCallback = Box<dyn FnOnce(Vec<Record>) + Send + 'static>;

/// Callback invoked with the failure.
pub type ErrorCallback = Box<dyn FnOnce(Error) + Send + 'static>;

/// What the bridge needs once the request completes.
///
/// Values are captured at submission time; scoped overrides active on the submitting
/// thread are not consulted again.
pub(crate) struct Completion {
    pub(crate) slot: AsyncResult,
    pub(crate) keywordize: bool,
    pub(crate) on_success: Option<SuccessCallback>,
    pub(crate) on_error: Option<ErrorCallback>,
}

impl Completion {
    /// Registers the completion on `future`, to run on `executor`.
    pub(crate) fn attach(self, future: &DriverFuture, executor: Arc<dyn Executor>) {
        future.on_complete(executor, move |outcome| self.finish(outcome));
    }

    fn finish(self, outcome: DriverOutcome) {
        let decoded = decode_outcome(outcome, self.keywordize);
        // The slot is written before any callback runs, so a callback that reads it
        // sees the same outcome.
        if self.slot.fulfill(decoded.clone()).is_err() {
            return;
        }
        match decoded {
            Ok(records) => {
                trace!(rows = records.len(), "async request succeeded");
                if let Some(callback) = self.on_success {
                    callback(records);
                }
            }
            Err(err) => {
                debug!(error = %err, "async request failed");
                if let Some(callback) = self.on_error {
                    callback(err);
                }
            }
        }
    }
}

fn decode_outcome(outcome: DriverOutcome, keywordize: bool) -> Result<Vec<Record>> {
    let result_set = outcome?;
    decode_result_set(&result_set, keywordize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{ResultSet, Value, WireValue};
    use crate::error::{DriverError, DriverErrorKind};
    use crate::exec::executor::InlineExecutor;
    use parking_lot::Mutex;

    fn completion(slot: &AsyncResult, log: &Arc<Mutex<Vec<String>>>) -> Completion {
        let ok_log = log.clone();
        let err_log = log.clone();
        Completion {
            slot: slot.clone(),
            keywordize: true,
            on_success: Some(Box::new(move |records| {
                ok_log.lock().push(format!("ok:{}", records.len()));
            })),
            on_error: Some(Box::new(move |err| {
                err_log.lock().push(format!("err:{err}"));
            })),
        }
    }

    #[test]
    fn success_fulfills_then_calls_back() {
        let slot = AsyncResult::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let (future, promise) = DriverFuture::pending();
        completion(&slot, &log).attach(&future, Arc::new(InlineExecutor));

        let rows = ResultSet::new(
            vec!["UserId"],
            vec![vec![WireValue::Int(7)]],
        );
        promise.complete(Ok(rows));

        let records = slot.get().unwrap();
        assert_eq!(records[0].get("userid"), Some(&Value::Int(7)));
        assert_eq!(*log.lock(), vec!["ok:1".to_string()]);
    }

    #[test]
    fn driver_failure_reaches_the_error_callback() {
        let slot = AsyncResult::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let future = DriverFuture::ready(Err(DriverError::new(
            DriverErrorKind::Unavailable,
            "not enough replicas",
        )));
        completion(&slot, &log).attach(&future, Arc::new(InlineExecutor));

        let err = slot.get().unwrap_err();
        assert_eq!(
            err.as_driver().map(|d| d.kind.clone()),
            Some(DriverErrorKind::Unavailable)
        );
        assert_eq!(log.lock().len(), 1);
        assert!(log.lock()[0].starts_with("err:"));
    }

    #[test]
    fn undecodable_rows_become_decode_errors() {
        let slot = AsyncResult::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let rows = ResultSet::new(
            vec!["shape"],
            vec![vec![WireValue::Custom {
                type_name: "geo.point".into(),
                payload: bytes::Bytes::from_static(b"\x01"),
            }]],
        );
        completion(&slot, &log).attach(&DriverFuture::ready(Ok(rows)), Arc::new(InlineExecutor));

        assert!(matches!(slot.get(), Err(Error::Decode { .. })));
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn prefulfilled_slot_suppresses_callbacks() {
        let slot = AsyncResult::new();
        slot.fulfill(Ok(Vec::new())).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        completion(&slot, &log).attach(
            &DriverFuture::ready(Ok(ResultSet::empty())),
            Arc::new(InlineExecutor),
        );
        assert!(log.lock().is_empty());
    }
}
