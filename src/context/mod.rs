#![forbid(unsafe_code)]

//! Ambient execution context.
//!
//! Five slots feed every execution that does not override them per call: the session,
//! the consistency level, the completion executor, the keywordize flag, and the query
//! cache. Each slot resolves to the innermost scoped binding on the current thread,
//! else the process-wide value, else its default.
//!
//! Global values are set with `set_*` and cleared with `reset_*`. Writers race with
//! readers on a last-write-wins basis; a resolution that already read the old value
//! keeps it.
//!
//! Scoped bindings (`with_*`) apply only to the calling thread for the extent of the
//! closure, nest strictly, and are restored on return and on unwinding. They are not
//! visible to other threads or to async completions; carry a [`Context`] explicitly with
//! [`Context::scope`] when needed.

use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::codec::Codec;
use crate::exec::executor::Executor;
use crate::query::cache::{LruQueryCache, QueryCache};
use crate::query::consistency::Consistency;
use crate::session::Session;

/// Keywordize setting when nothing else is configured.
pub const DEFAULT_KEYWORDIZE: bool = true;

#[derive(Default)]
struct Globals {
    session: RwLock<Option<Arc<dyn Session>>>,
    consistency: RwLock<Option<Consistency>>,
    executor: RwLock<Option<Arc<dyn Executor>>>,
    keywordize: RwLock<Option<bool>>,
    query_cache: RwLock<Option<Arc<dyn QueryCache>>>,
}

static GLOBALS: OnceLock<Globals> = OnceLock::new();
static DEFAULT_QUERY_CACHE: OnceLock<Arc<LruQueryCache>> = OnceLock::new();

fn globals() -> &'static Globals {
    GLOBALS.get_or_init(Globals::default)
}

/// The process default query cache: an [`LruQueryCache`] over the CQL renderer.
pub fn default_query_cache() -> Arc<dyn QueryCache> {
    DEFAULT_QUERY_CACHE
        .get_or_init(|| Arc::new(LruQueryCache::default()))
        .clone()
}

/// Scoped bindings for one thread. `None` entries shadow the global value with "unset".
#[derive(Default)]
struct Scoped {
    session: Vec<Option<Arc<dyn Session>>>,
    consistency: Vec<Option<Consistency>>,
    executor: Vec<Option<Arc<dyn Executor>>>,
    keywordize: Vec<bool>,
    query_cache: Vec<Arc<dyn QueryCache>>,
}

thread_local! {
    static SCOPED: RefCell<Scoped> = RefCell::new(Scoped::default());
}

struct Restore {
    pop: fn(&mut Scoped),
}

impl Drop for Restore {
    fn drop(&mut self) {
        // Thread-local storage may already be gone during thread teardown.
        let _ = SCOPED.try_with(|scoped| (self.pop)(&mut scoped.borrow_mut()));
    }
}

fn bind<R>(push: impl FnOnce(&mut Scoped), pop: fn(&mut Scoped), f: impl FnOnce() -> R) -> R {
    SCOPED.with(|scoped| push(&mut scoped.borrow_mut()));
    let _restore = Restore { pop };
    f()
}

fn scoped<T>(read: impl FnOnce(&Scoped) -> Option<T>) -> Option<T> {
    SCOPED.try_with(|s| read(&s.borrow())).ok().flatten()
}

/// Sets the process-wide session.
pub fn set_session(session: Arc<dyn Session>) {
    *globals().session.write() = Some(session);
}

/// Clears the process-wide session.
pub fn reset_session() {
    *globals().session.write() = None;
}

/// Sets the process-wide consistency level.
pub fn set_consistency(consistency: Consistency) {
    *globals().consistency.write() = Some(consistency);
}

/// Clears the process-wide consistency level.
pub fn reset_consistency() {
    *globals().consistency.write() = None;
}

/// Sets the process-wide completion executor.
pub fn set_executor(executor: Arc<dyn Executor>) {
    *globals().executor.write() = Some(executor);
}

/// Clears the process-wide completion executor.
pub fn reset_executor() {
    *globals().executor.write() = None;
}

/// Sets the process-wide keywordize flag.
pub fn set_keywordize(keywordize: bool) {
    *globals().keywordize.write() = Some(keywordize);
}

/// Restores the default keywordize flag.
pub fn reset_keywordize() {
    *globals().keywordize.write() = None;
}

/// Replaces the process-wide query cache.
pub fn set_query_cache(cache: Arc<dyn QueryCache>) {
    *globals().query_cache.write() = Some(cache);
}

/// Restores the process default query cache.
pub fn reset_query_cache() {
    *globals().query_cache.write() = None;
}

/// Runs `f` with `session` bound on this thread.
pub fn with_session<R>(session: Arc<dyn Session>, f: impl FnOnce() -> R) -> R {
    bind(
        |s| s.session.push(Some(session)),
        |s| {
            s.session.pop();
        },
        f,
    )
}

/// Runs `f` with `consistency` bound on this thread.
pub fn with_consistency<R>(consistency: Consistency, f: impl FnOnce() -> R) -> R {
    bind(
        |s| s.consistency.push(Some(consistency)),
        |s| {
            s.consistency.pop();
        },
        f,
    )
}

/// Runs `f` with `executor` bound on this thread.
pub fn with_executor<R>(executor: Arc<dyn Executor>, f: impl FnOnce() -> R) -> R {
    bind(
        |s| s.executor.push(Some(executor)),
        |s| {
            s.executor.pop();
        },
        f,
    )
}

/// Runs `f` with the keywordize flag bound on this thread.
pub fn with_keywordize<R>(keywordize: bool, f: impl FnOnce() -> R) -> R {
    bind(
        |s| s.keywordize.push(keywordize),
        |s| {
            s.keywordize.pop();
        },
        f,
    )
}

/// Runs `f` with `cache` bound on this thread.
pub fn with_query_cache<R>(cache: Arc<dyn QueryCache>, f: impl FnOnce() -> R) -> R {
    bind(
        |s| s.query_cache.push(cache),
        |s| {
            s.query_cache.pop();
        },
        f,
    )
}

/// Resolved execution context.
///
/// [`Context::current`] snapshots the ambient slots; [`Context::new`] starts from the
/// defaults and ignores ambient state entirely.
#[derive(Clone)]
pub struct Context {
    session: Option<Arc<dyn Session>>,
    consistency: Option<Consistency>,
    executor: Option<Arc<dyn Executor>>,
    keywordize: bool,
    query_cache: Arc<dyn QueryCache>,
    codec: Codec,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// A context with default slots: no session, no consistency, no executor,
    /// keywordize on, and the process default query cache.
    pub fn new() -> Self {
        Self {
            session: None,
            consistency: None,
            executor: None,
            keywordize: DEFAULT_KEYWORDIZE,
            query_cache: default_query_cache(),
            codec: Codec::default(),
        }
    }

    /// Snapshot of the ambient slots as seen from this thread.
    pub fn current() -> Self {
        let globals = globals();
        let session = scoped(|s| s.session.last().cloned())
            .unwrap_or_else(|| globals.session.read().clone());
        let consistency = scoped(|s| s.consistency.last().copied())
            .unwrap_or_else(|| *globals.consistency.read());
        let executor = scoped(|s| s.executor.last().cloned())
            .unwrap_or_else(|| globals.executor.read().clone());
        let keywordize = scoped(|s| s.keywordize.last().copied())
            .or_else(|| *globals.keywordize.read())
            .unwrap_or(DEFAULT_KEYWORDIZE);
        let query_cache = scoped(|s| s.query_cache.last().cloned())
            .or_else(|| globals.query_cache.read().clone())
            .unwrap_or_else(default_query_cache);
        Self {
            session,
            consistency,
            executor,
            keywordize,
            query_cache,
            codec: Codec::default(),
        }
    }

    /// Uses `session`.
    pub fn with_session(mut self, session: Arc<dyn Session>) -> Self {
        self.session = Some(session);
        self
    }

    /// Uses `consistency` when a call does not set one.
    pub fn with_consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = Some(consistency);
        self
    }

    /// Runs completions on `executor`.
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Sets the keywordize flag.
    pub fn with_keywordize(mut self, keywordize: bool) -> Self {
        self.keywordize = keywordize;
        self
    }

    /// Compiles structured queries through `cache`.
    pub fn with_query_cache(mut self, cache: Arc<dyn QueryCache>) -> Self {
        self.query_cache = cache;
        self
    }

    /// Encodes bind values with `codec`.
    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// Session, if any.
    pub fn session(&self) -> Option<&Arc<dyn Session>> {
        self.session.as_ref()
    }

    /// Consistency level, if any.
    pub fn consistency(&self) -> Option<Consistency> {
        self.consistency
    }

    /// Completion executor, if any.
    pub fn executor(&self) -> Option<&Arc<dyn Executor>> {
        self.executor.as_ref()
    }

    /// Whether column names are converted to canonical keys.
    pub fn keywordize(&self) -> bool {
        self.keywordize
    }

    /// Active query cache.
    pub fn query_cache(&self) -> &Arc<dyn QueryCache> {
        &self.query_cache
    }

    /// Codec for bind values.
    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Binds every slot of this context on the current thread while `f` runs.
    ///
    /// Unset slots shadow the global values, so inside `f` [`Context::current`] sees
    /// exactly this context (apart from the codec, which is not ambient).
    pub fn scope<R>(&self, f: impl FnOnce() -> R) -> R {
        let this = self.clone();
        bind(
            move |s| {
                s.session.push(this.session);
                s.consistency.push(this.consistency);
                s.executor.push(this.executor);
                s.keywordize.push(this.keywordize);
                s.query_cache.push(this.query_cache);
            },
            |s| {
                s.session.pop();
                s.consistency.pop();
                s.executor.pop();
                s.keywordize.pop();
                s.query_cache.pop();
            },
            f,
        )
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("session", &self.session.is_some())
            .field("consistency", &self.consistency)
            .field("executor", &self.executor.is_some())
            .field("keywordize", &self.keywordize)
            .field("query_cache", &self.query_cache.stats())
            .finish()
    }
}
