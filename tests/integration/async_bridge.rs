use corvid::codec::{ResultSet, WireValue};
use corvid::context::{self, Context};
use corvid::exec::{self, ExecuteOptions, Executor, InlineExecutor, Task, TokioExecutor};
use corvid::session::memory::{AsyncMode, MemorySession};
use corvid::session::{DriverFuture, Session};
use corvid::{DriverErrorKind, Error, Record, Value};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

/// Records the name of every thread it runs a task on.
#[derive(Default)]
struct Recording {
    threads: Mutex<Vec<Option<String>>>,
}

impl Executor for Recording {
    fn execute(&self, task: Task) {
        self.threads
            .lock()
            .push(std::thread::current().name().map(str::to_owned));
        task();
    }
}

fn manual_session() -> Arc<MemorySession> {
    Arc::new(
        MemorySession::new()
            .with_async_mode(AsyncMode::Manual)
            .with_handler(|_| {
                Ok(ResultSet::new(
                    vec!["Event Id", "payload"],
                    vec![vec![WireValue::BigInt(1), WireValue::Ascii("a".into())]],
                ))
            }),
    )
}

#[test]
fn execute_async_returns_before_completion() {
    let session = manual_session();
    let slot = Context::new()
        .with_session(session.clone())
        .execute_async("SELECT * FROM events", ExecuteOptions::new())
        .unwrap();
    assert!(!slot.is_fulfilled());
    assert_eq!(session.submitted().len(), 1);
    assert_eq!(session.execute_count(), 0);

    session.release_pending();
    let records = slot.get().unwrap();
    assert_eq!(records[0].get("event_id"), Some(&Value::BigInt(1)));
    assert_eq!(records[0].get("payload"), Some(&Value::Text("a".into())));
}

#[test]
fn per_call_executor_beats_context_executor() {
    let session = manual_session();
    let context_executor = Arc::new(Recording::default());
    let call_executor = Arc::new(Recording::default());
    let ctx = Context::new()
        .with_session(session.clone())
        .with_executor(context_executor.clone());

    let slot = ctx
        .execute_async(
            "SELECT 1",
            ExecuteOptions::new().executor(call_executor.clone()),
        )
        .unwrap();
    session.release_pending();
    slot.get().unwrap();

    assert_eq!(call_executor.threads.lock().len(), 1);
    assert!(context_executor.threads.lock().is_empty());
}

#[test]
fn keywordize_is_captured_at_submission() {
    let session = manual_session();
    let slot = context::with_session(session.clone(), || {
        context::with_keywordize(false, || exec::execute_async("SELECT 1", ExecuteOptions::new()))
    })
    .unwrap();
    // the scoped binding is gone by the time the request completes
    session.release_pending();
    let records = slot.get().unwrap();
    assert_eq!(records[0].keys().collect::<Vec<_>>(), vec!["Event Id", "payload"]);
}

#[test]
fn undecodable_result_reaches_error_callback_as_decode_error() {
    let session = Arc::new(MemorySession::new().with_handler(|_| {
        Ok(ResultSet::new(
            vec!["location"],
            vec![vec![WireValue::Custom {
                type_name: "org.apache.cassandra.db.marshal.PointType".into(),
                payload: bytes::Bytes::from_static(&[0, 1, 2]),
            }]],
        ))
    }));
    let (tx, rx) = mpsc::channel();
    let successes = Arc::new(AtomicUsize::new(0));
    let seen = successes.clone();
    let slot = Context::new()
        .with_session(session)
        .execute_async(
            "SELECT location FROM places",
            ExecuteOptions::new()
                .on_success(move |_| {
                    seen.fetch_add(1, Ordering::SeqCst);
                })
                .on_error(move |err| tx.send(err).unwrap()),
        )
        .unwrap();

    let err = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    match &err {
        Error::Decode { column, .. } => assert_eq!(column, "location"),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(slot.get(), Err(err));
    assert_eq!(successes.load(Ordering::SeqCst), 0);
}

#[test]
fn abandoned_request_fulfills_slot_with_aborted_error() {
    let session = manual_session();
    let slot = Context::new()
        .with_session(session.clone())
        .execute_async(
            "SELECT 1",
            ExecuteOptions::new().executor(Arc::new(InlineExecutor)),
        )
        .unwrap();
    assert_eq!(session.abandon_pending(), 1);
    let err = slot.get().unwrap_err();
    assert_eq!(err.as_driver().map(|d| &d.kind), Some(&DriverErrorKind::Aborted));
}

#[test]
fn slot_can_be_awaited_on_a_tokio_runtime() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap();
    let session = Arc::new(MemorySession::new().with_handler(|_| {
        Ok(ResultSet::new(vec!["n"], vec![vec![WireValue::Int(5)]]))
    }));
    let executor = Arc::new(TokioExecutor::new(runtime.handle().clone()));
    let ctx = Context::new()
        .with_session(session)
        .with_executor(executor);

    let records: Vec<Record> = runtime.block_on(async {
        let slot = ctx.execute_async("SELECT n FROM t", ExecuteOptions::new())?;
        slot.await
    })
    .unwrap();
    assert_eq!(records[0].get("n"), Some(&Value::Int(5)));
}

#[test]
fn callbacks_registered_on_ready_futures_run_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let future = DriverFuture::ready(Ok(ResultSet::empty()));
    future.on_complete(Arc::new(InlineExecutor), move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let session = MemorySession::new();
    session.shutdown();
    let ctx = Context::new().with_session(Arc::new(session));
    let slot = ctx
        .execute_async("SELECT 1", ExecuteOptions::new().executor(Arc::new(InlineExecutor)))
        .unwrap();
    assert_eq!(
        slot.try_get()
            .and_then(|outcome| outcome.err())
            .and_then(|err| err.as_driver().map(|d| d.kind.clone())),
        Some(DriverErrorKind::Connection)
    );
}

#[test]
fn completion_survives_a_shut_down_runtime() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .build()
        .unwrap();
    let executor = Arc::new(TokioExecutor::new(runtime.handle().clone()));
    drop(runtime);

    let session = manual_session();
    let (tx, rx) = mpsc::channel();
    let slot = Context::new()
        .with_session(session.clone())
        .with_executor(executor)
        .execute_async(
            "SELECT * FROM events",
            ExecuteOptions::new().on_success(move |records| tx.send(records.len()).unwrap()),
        )
        .unwrap();
    session.release_pending();

    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);
    assert_eq!(slot.get().unwrap().len(), 1);
}
