use corvid::context::{self, Context};
use corvid::exec::{ExecuteOptions, InlineExecutor};
use corvid::query::{LruQueryCache, QueryCache};
use corvid::session::memory::MemorySession;
use corvid::session::Session;
use corvid::{Consistency, Error, Result};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Barrier};
use std::thread;

// Every test reads unscoped slots, so they all serialize on this lock.
static GLOBAL_SLOTS: Mutex<()> = Mutex::new(());

#[test]
fn scoped_binding_restores_after_error() {
    let _guard = GLOBAL_SLOTS.lock();
    let result: Result<()> = context::with_consistency(Consistency::All, || {
        assert_eq!(Context::current().consistency(), Some(Consistency::All));
        Err(Error::Invalid("boom".into()))
    });
    assert!(result.is_err());
    assert_eq!(Context::current().consistency(), None);
}

#[test]
fn scoped_binding_restores_after_panic() {
    let _guard = GLOBAL_SLOTS.lock();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        context::with_keywordize(false, || {
            context::with_consistency(Consistency::Three, || {
                panic!("handler blew up");
            })
        })
    }));
    assert!(outcome.is_err());
    let ctx = Context::current();
    assert_eq!(ctx.consistency(), None);
    assert!(ctx.keywordize());
}

#[test]
fn scoped_bindings_do_not_leak_across_threads() {
    let _guard = GLOBAL_SLOTS.lock();
    let barrier = Arc::new(Barrier::new(2));
    let inner = barrier.clone();
    let other = thread::spawn(move || {
        inner.wait();
        let seen = Context::current().consistency();
        inner.wait();
        seen
    });

    context::with_consistency(Consistency::EachQuorum, || {
        barrier.wait();
        barrier.wait();
    });
    assert_eq!(other.join().unwrap(), None);
}

#[test]
fn global_values_apply_until_reset() {
    let _guard = GLOBAL_SLOTS.lock();
    context::set_consistency(Consistency::LocalQuorum);
    context::set_keywordize(false);
    let from_thread = thread::spawn(|| {
        let ctx = Context::current();
        (ctx.consistency(), ctx.keywordize())
    })
    .join()
    .unwrap();
    assert_eq!(from_thread, (Some(Consistency::LocalQuorum), false));

    // scoped binds shadow globals
    context::with_consistency(Consistency::One, || {
        assert_eq!(Context::current().consistency(), Some(Consistency::One));
    });

    context::reset_consistency();
    context::reset_keywordize();
    let ctx = Context::current();
    assert_eq!(ctx.consistency(), None);
    assert!(ctx.keywordize());
}

#[test]
fn global_query_cache_and_executor_are_replaceable() {
    let _guard = GLOBAL_SLOTS.lock();
    let cache: Arc<dyn QueryCache> = Arc::new(LruQueryCache::with_capacity(4));
    context::set_query_cache(cache.clone());
    context::set_executor(Arc::new(InlineExecutor));
    let ctx = Context::current();
    assert!(Arc::ptr_eq(ctx.query_cache(), &cache));
    assert!(ctx.executor().is_some());

    context::reset_query_cache();
    context::reset_executor();
    let ctx = Context::current();
    assert!(!Arc::ptr_eq(ctx.query_cache(), &cache));
    assert!(ctx.executor().is_none());
}

#[test]
fn context_scope_carries_a_snapshot_to_another_thread() -> Result<()> {
    let _guard = GLOBAL_SLOTS.lock();
    let session = Arc::new(MemorySession::new());
    let snapshot = context::with_session(session.clone(), || {
        context::with_consistency(Consistency::Two, Context::current)
    });

    let seen = thread::spawn(move || {
        snapshot.scope(|| {
            let ctx = Context::current();
            assert!(ctx.session().is_some());
            ctx.execute("SELECT 1", ExecuteOptions::new())?;
            Ok::<_, Error>(ctx.consistency())
        })
    })
    .join()
    .unwrap()?;

    assert_eq!(seen, Some(Consistency::Two));
    assert_eq!(session.execute_count(), 1);
    Ok(())
}

#[test]
fn session_shutdown_is_visible_through_the_context() {
    let _guard = GLOBAL_SLOTS.lock();
    let session = Arc::new(MemorySession::new());
    let ctx = Context::new().with_session(session.clone());
    session.shutdown();
    let err = ctx
        .execute("SELECT 1", ExecuteOptions::new())
        .unwrap_err();
    assert!(matches!(err, Error::Driver(_)));
}
