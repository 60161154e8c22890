//! Disposal and lifecycle backbone
//!
//! Every disposal-capable object the container produces is paired with a
//! [`CancellationScope`] and entered into a [`DisposalSet`]. Teardown cancels
//! the scope first, then runs the object's own async disposal; sibling
//! branches are disposed concurrently and failures are aggregated, never
//! dropped. Disposal is idempotent per object.
//!
//! The container never forcibly terminates tasks: background work started by
//! an owned object is expected to poll its scope and exit promptly. No timeout
//! is imposed on teardown; a stalled disposal blocks shutdown.

use crate::error::{Error, Result, TeardownFailure};
use crate::key::ServiceKey;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Once-only cancellation signal tied to one object's disposal
///
/// Cancelled at the start of that object's teardown, before any of its own
/// awaited disposal runs. Background work started by the object polls this
/// cooperatively.
pub struct CancellationScope {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationScope {
    /// Create a fresh, uncancelled scope
    pub fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Fire the once-only cancellation transition
    ///
    /// Returns `true` on the transition, `false` if the scope was already
    /// cancelled.
    pub fn cancel(&self) -> bool {
        let transitioned = !self.cancelled.swap(true, Ordering::SeqCst);
        if transitioned {
            self.notify.notify_waiters();
        }
        transitioned
    }

    /// Fast check of the cancellation flag
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Wait asynchronously until the scope is cancelled
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        let notified = self.notify.notified();
        // Re-check after registering interest so a cancel between the first
        // check and registration is not missed.
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl Default for CancellationScope {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationScope")
            .field("is_cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Disposal capability exposed by owned objects
///
/// Synchronous call sites block on this explicitly; there is no separate
/// synchronous teardown path.
#[async_trait]
pub trait Dispose: Send + Sync {
    /// Release the object's resources
    ///
    /// May itself own and cascade to further objects. Called at most once by
    /// the container.
    async fn dispose(&self) -> Result<()>;
}

/// One owned, disposal-capable object
///
/// Holds the object's scope, its disposer, and the once-guard that makes a
/// second disposal a silent no-op even when two ownership branches end up
/// holding the same shared instance.
pub struct Owned {
    key: ServiceKey,
    scope: Arc<CancellationScope>,
    disposer: Arc<dyn Dispose>,
    disposed: AtomicBool,
}

impl Owned {
    /// Pair a disposer with its scope under the producing key
    pub fn new(key: ServiceKey, scope: Arc<CancellationScope>, disposer: Arc<dyn Dispose>) -> Self {
        Self {
            key,
            scope,
            disposer,
            disposed: AtomicBool::new(false),
        }
    }

    /// Key of the object this entry owns
    pub fn key(&self) -> ServiceKey {
        self.key
    }

    /// Whether this entry has already been disposed
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Cancel the scope, then run the object's own teardown
    ///
    /// Idempotent: only the first call does anything.
    pub async fn dispose(&self) -> Option<TeardownFailure> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return None;
        }
        self.scope.cancel();
        debug!(key = %self.key.short_name(), "disposing owned object");
        match self.disposer.dispose().await {
            Ok(()) => None,
            Err(e) => {
                warn!(key = %self.key.short_name(), error = %e, "disposal failed");
                Some(TeardownFailure {
                    key: self.key,
                    message: e.to_string(),
                })
            }
        }
    }
}

/// Ownership set of disposal-capable objects, torn down together
///
/// Owned by exactly one parent: the container root for objects it caused to
/// be constructed. Objects may keep child sets of their own and cascade from
/// their `dispose`.
pub struct DisposalSet {
    entries: Mutex<Vec<Arc<Owned>>>,
}

impl DisposalSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Take ownership of one object
    pub fn adopt(&self, owned: Arc<Owned>) {
        self.entries
            .lock()
            .expect("disposal set lock poisoned")
            .push(owned);
    }

    /// Number of currently owned objects
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .expect("disposal set lock poisoned")
            .len()
    }

    /// True if the set owns nothing
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Count of entries that have not been disposed yet
    pub fn live_count(&self) -> usize {
        self.entries
            .lock()
            .expect("disposal set lock poisoned")
            .iter()
            .filter(|o| !o.is_disposed())
            .count()
    }

    /// Dispose every owned object, siblings concurrently
    ///
    /// A failure in one branch does not prevent the others from being
    /// attempted; failures are aggregated into [`Error::Teardown`] once the
    /// sweep completes. The set is drained: a second sweep is a no-op.
    pub async fn dispose_all(&self) -> Result<()> {
        // Drain under the lock, then await outside it.
        let entries: Vec<Arc<Owned>> = {
            let mut guard = self.entries.lock().expect("disposal set lock poisoned");
            std::mem::take(&mut *guard)
        };
        if entries.is_empty() {
            return Ok(());
        }
        debug!(count = entries.len(), "tearing down ownership set");

        let results = join_all(entries.iter().map(|owned| owned.dispose())).await;
        let failures: Vec<TeardownFailure> = results.into_iter().flatten().collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Teardown { failures })
        }
    }
}

impl Default for DisposalSet {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DisposalSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisposalSet")
            .field("owned_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingDisposer {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl Dispose for CountingDisposer {
        async fn dispose(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(Error::lifecycle("deliberate failure"))
            } else {
                Ok(())
            }
        }
    }

    fn owned(calls: Arc<AtomicUsize>, fail: bool) -> Arc<Owned> {
        Arc::new(Owned::new(
            ServiceKey::of::<CountingDisposer>(),
            Arc::new(CancellationScope::new()),
            Arc::new(CountingDisposer { calls, fail }),
        ))
    }

    #[tokio::test]
    async fn scope_cancel_is_once_only() {
        let scope = CancellationScope::new();
        assert!(!scope.is_cancelled());
        assert!(scope.cancel());
        assert!(!scope.cancel());
        assert!(scope.is_cancelled());
        // Waiting on an already-cancelled scope returns immediately.
        scope.cancelled().await;
    }

    #[tokio::test]
    async fn scope_wakes_waiters() {
        let scope = Arc::new(CancellationScope::new());
        let waiter = {
            let scope = Arc::clone(&scope);
            tokio::spawn(async move { scope.cancelled().await })
        };
        tokio::task::yield_now().await;
        scope.cancel();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn owned_disposes_exactly_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let entry = owned(Arc::clone(&calls), false);
        assert!(entry.dispose().await.is_none());
        assert!(entry.dispose().await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(entry.is_disposed());
    }

    #[tokio::test]
    async fn dispose_cancels_scope_before_teardown() {
        struct ScopeChecker {
            scope: Arc<CancellationScope>,
            observed: Arc<AtomicBool>,
        }
        #[async_trait]
        impl Dispose for ScopeChecker {
            async fn dispose(&self) -> Result<()> {
                self.observed.store(self.scope.is_cancelled(), Ordering::SeqCst);
                Ok(())
            }
        }

        let scope = Arc::new(CancellationScope::new());
        let observed = Arc::new(AtomicBool::new(false));
        let entry = Owned::new(
            ServiceKey::of::<ScopeChecker>(),
            Arc::clone(&scope),
            Arc::new(ScopeChecker {
                scope: Arc::clone(&scope),
                observed: Arc::clone(&observed),
            }),
        );
        entry.dispose().await;
        assert!(observed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failed_branch_does_not_block_siblings() {
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        let set = DisposalSet::new();
        set.adopt(owned(Arc::clone(&a), true));
        set.adopt(owned(Arc::clone(&b), false));

        let err = set.dispose_all().await.unwrap_err();
        match err {
            Error::Teardown { failures } => assert_eq!(failures.len(), 1),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn second_sweep_is_a_no_op() {
        let calls = Arc::new(AtomicUsize::new(0));
        let set = DisposalSet::new();
        set.adopt(owned(Arc::clone(&calls), false));
        set.dispose_all().await.unwrap();
        set.dispose_all().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn double_ownership_of_one_entry_is_safe() {
        let calls = Arc::new(AtomicUsize::new(0));
        let entry = owned(Arc::clone(&calls), false);
        let set = DisposalSet::new();
        // Two branches holding the same shared instance.
        set.adopt(Arc::clone(&entry));
        set.adopt(entry);
        set.dispose_all().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
