use futures::FutureExt;
use futures::future::BoxFuture;
use futures::future::Shared;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

type SharedResult<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shares one in-flight request among every concurrent caller asking for the
/// same key.
///
/// The entry is dropped as soon as the request settles, whether it succeeded
/// or failed, so a later call for the same key starts a fresh request.
pub struct RequestCoalescer<K, V, E> {
    inflight: Arc<Mutex<HashMap<K, SharedResult<V, E>>>>,
}

impl<K, V, E> Clone for RequestCoalescer<K, V, E> {
    fn clone(&self) -> Self {
        Self {
            inflight: Arc::clone(&self.inflight),
        }
    }
}

impl<K, V, E> Default for RequestCoalescer<K, V, E> {
    fn default() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, V, E> fmt::Debug for RequestCoalescer<K, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = lock(&self.inflight).len();
        f.debug_struct("RequestCoalescer")
            .field("pending", &pending)
            .finish()
    }
}

impl<K, V, E> RequestCoalescer<K, V, E>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with a request still in flight.
    pub fn pending(&self) -> usize {
        lock(&self.inflight).len()
    }

    /// Runs `make()` for `key` unless a request for it is already in flight,
    /// in which case the caller awaits that request instead.
    pub async fn run<F, Fut>(&self, key: K, make: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let shared = {
            let mut inflight = lock(&self.inflight);
            match inflight.get(&key) {
                Some(existing) => existing.clone(),
                None => {
                    let shared = make().boxed().shared();
                    inflight.insert(key.clone(), shared.clone());
                    shared
                }
            }
        };

        let result = shared.clone().await;

        let mut inflight = lock(&self.inflight);
        if let Some(current) = inflight.get(&key)
            && current.ptr_eq(&shared)
        {
            inflight.remove(&key);
        }
        result
    }
}
