//! Batching and request-scoped caching for keyed bulk lookups.
//!
//! A [`DataLoader`] wraps a [`Loader`] for one lookup site. Keys submitted
//! while a batch is collecting are coalesced into a single `load` call, and
//! every resolved key stays cached for the lifetime of the `DataLoader`.
//! Construct one instance per site per request; dropping it discards the
//! cache, so nothing leaks across requests.

use std::{
    collections::HashMap,
    fmt::Display,
    hash::Hash,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::oneshot;

/// A bulk fetch over one class of keys.
#[async_trait]
pub trait Loader<K>: Send + Sync + 'static
where
    K: Send + Sync + Hash + Eq + Clone + 'static,
{
    type Value: Send + Sync + Clone + 'static;
    type Error: Send + Sync + Clone + Display + 'static;

    /// Fetches every key in `keys` in one round-trip.
    ///
    /// Keys absent from the returned map are not an error: the callers that
    /// requested them observe `None`.
    async fn load(&self, keys: &[K]) -> Result<HashMap<K, Self::Value>, Self::Error>;
}

/// Failure surfaced to a caller awaiting a batched lookup.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LoadError<E> {
    /// The bulk fetch behind the batch failed. Every caller of that batch
    /// receives the same error.
    #[error("{0}")]
    Fetch(E),
    /// The batch was dropped before producing a result, usually because the
    /// owning request was aborted.
    #[error("batch was cancelled before completion")]
    Cancelled,
}

/// Coalesces and caches lookups for one site within one request.
///
/// Submissions landing during the collection window share a single `load`
/// call; the window closes after `delay` (or earlier when `max_batch_size`
/// is reached) and later submissions open a fresh batch. The pending key
/// set is closed atomically before dispatch, so at most one fetch is in
/// flight per batch.
pub struct DataLoader<T, K>
where
    T: Loader<K>,
    K: Send + Sync + Hash + Eq + Clone + 'static,
{
    inner: Arc<Inner<T, K>>,
    delay: Duration,
    max_batch_size: usize,
}

struct Inner<T, K>
where
    T: Loader<K>,
    K: Send + Sync + Hash + Eq + Clone + 'static,
{
    loader: T,
    state: Mutex<State<K, T::Value, T::Error>>,
}

struct State<K, V, E> {
    cache: HashMap<K, Option<V>>,
    next_batch_id: u64,
    batch: Option<Batch<K, V, E>>,
}

struct Batch<K, V, E> {
    id: u64,
    keys: Vec<K>,
    waiters: HashMap<K, Vec<Waiter<V, E>>>,
}

type Waiter<V, E> = oneshot::Sender<Result<Option<V>, LoadError<E>>>;

impl<K, V, E> Batch<K, V, E> {
    fn new(id: u64) -> Self {
        Self {
            id,
            keys: Vec::new(),
            waiters: HashMap::new(),
        }
    }
}

impl<T, K> DataLoader<T, K>
where
    T: Loader<K>,
    K: Send + Sync + Hash + Eq + Clone + 'static,
{
    pub fn new(loader: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                loader,
                state: Mutex::new(State {
                    cache: HashMap::new(),
                    next_batch_id: 0,
                    batch: None,
                }),
            }),
            delay: Duration::from_millis(1),
            max_batch_size: 1000,
        }
    }

    /// How long a batch collects submissions before its fetch dispatches.
    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Dispatch as soon as a batch reaches this many distinct keys.
    #[must_use]
    pub fn max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size.max(1);
        self
    }

    /// Looks up a single key, coalescing with every other submission in the
    /// current collection window.
    ///
    /// Returns the cached value without a fetch when the key was already
    /// resolved during this loader's lifetime; `Ok(None)` when the backend
    /// holds no row for the key.
    pub async fn load_one(&self, key: K) -> Result<Option<T::Value>, LoadError<T::Error>> {
        let rx = {
            let mut state = self.lock_state();
            if let Some(cached) = state.cache.get(&key) {
                return Ok(cached.clone());
            }
            let (tx, rx) = oneshot::channel();
            self.enqueue(&mut state, key, tx);
            rx
        };
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(LoadError::Cancelled),
        }
    }

    /// Looks up a set of keys. Keys without a value are left out of the
    /// returned map.
    pub async fn load_many<I>(&self, keys: I) -> Result<HashMap<K, T::Value>, LoadError<T::Error>>
    where
        I: IntoIterator<Item = K>,
    {
        let mut resolved = HashMap::new();
        let mut pending = Vec::new();
        {
            let mut state = self.lock_state();
            for key in keys {
                if let Some(cached) = state.cache.get(&key) {
                    if let Some(value) = cached {
                        resolved.insert(key, value.clone());
                    }
                    continue;
                }
                let (tx, rx) = oneshot::channel();
                self.enqueue(&mut state, key.clone(), tx);
                pending.push((key, rx));
            }
        }
        for (key, rx) in pending {
            let result = match rx.await {
                Ok(result) => result,
                Err(_) => Err(LoadError::Cancelled),
            };
            if let Some(value) = result? {
                resolved.insert(key, value);
            }
        }
        Ok(resolved)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, State<K, T::Value, T::Error>> {
        self.inner.state.lock().expect("dataloader state poisoned")
    }

    /// Registers a waiter for `key` on the collecting batch, opening a new
    /// batch (and scheduling its dispatch) when none is collecting. Must be
    /// called with the state lock held.
    fn enqueue(&self, state: &mut State<K, T::Value, T::Error>, key: K, tx: Waiter<T::Value, T::Error>) {
        if state.batch.is_none() {
            let id = state.next_batch_id;
            state.next_batch_id += 1;
            state.batch = Some(Batch::new(id));
            self.schedule_dispatch(id);
        }
        let batch = state.batch.as_mut().expect("batch was just ensured");
        if !batch.waiters.contains_key(&key) {
            batch.keys.push(key.clone());
        }
        batch.waiters.entry(key).or_default().push(tx);

        if batch.keys.len() >= self.max_batch_size {
            let full = state.batch.take().expect("batch was just filled");
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                execute_batch(inner, full).await;
            });
        }
    }

    /// Closes batch `id` once the collection window elapses. A batch already
    /// dispatched through the size cap is left alone.
    fn schedule_dispatch(&self, id: u64) {
        let inner = Arc::clone(&self.inner);
        let delay = self.delay;
        tokio::spawn(async move {
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(delay).await;
            }
            let batch = {
                let mut state = inner.state.lock().expect("dataloader state poisoned");
                match &state.batch {
                    Some(batch) if batch.id == id => state.batch.take(),
                    _ => None,
                }
            };
            if let Some(batch) = batch {
                execute_batch(inner, batch).await;
            }
        });
    }
}

async fn execute_batch<T, K>(inner: Arc<Inner<T, K>>, batch: Batch<K, T::Value, T::Error>)
where
    T: Loader<K>,
    K: Send + Sync + Hash + Eq + Clone + 'static,
{
    let Batch { keys, waiters, .. } = batch;
    #[cfg(feature = "tracing")]
    tracing::debug!(
        loader = std::any::type_name::<T>(),
        keys = keys.len(),
        "dispatching batch fetch"
    );

    match inner.loader.load(&keys).await {
        Ok(mut fetched) => {
            let mut results = HashMap::with_capacity(keys.len());
            for key in keys {
                let value = fetched.remove(&key);
                results.insert(key, value);
            }
            {
                let mut state = inner.state.lock().expect("dataloader state poisoned");
                for (key, value) in &results {
                    state.cache.insert(key.clone(), value.clone());
                }
            }
            for (key, senders) in waiters {
                let value = results.get(&key).cloned().unwrap_or_default();
                for sender in senders {
                    sender.send(Ok(value.clone())).ok();
                }
            }
        }
        Err(error) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                loader = std::any::type_name::<T>(),
                error = %error,
                "batch fetch failed"
            );
            // Nothing is cached: a later window may retry the same keys.
            for senders in waiters.into_values() {
                for sender in senders {
                    sender.send(Err(LoadError::Fetch(error.clone()))).ok();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Returns `key * 10`, treating keys >= 100 as absent. Records the key
    /// set of every batch it receives.
    struct EchoLoader {
        batches: Arc<Mutex<Vec<Vec<u64>>>>,
        fail: bool,
    }

    #[derive(Debug, Clone, thiserror::Error)]
    #[error("backend unavailable")]
    struct BackendDown;

    #[async_trait]
    impl Loader<u64> for EchoLoader {
        type Value = u64;
        type Error = BackendDown;

        async fn load(&self, keys: &[u64]) -> Result<HashMap<u64, u64>, BackendDown> {
            self.batches.lock().unwrap().push(keys.to_vec());
            if self.fail {
                return Err(BackendDown);
            }
            Ok(keys.iter().filter(|key| **key < 100).map(|key| (*key, key * 10)).collect())
        }
    }

    fn echo_loader(fail: bool) -> (DataLoader<EchoLoader, u64>, Arc<Mutex<Vec<Vec<u64>>>>) {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let loader = DataLoader::new(EchoLoader {
            batches: Arc::clone(&batches),
            fail,
        });
        (loader, batches)
    }

    #[tokio::test]
    async fn coalesces_one_window_into_one_fetch() {
        let (loader, batches) = echo_loader(false);

        let (a, b, a_again) = tokio::join!(loader.load_one(1), loader.load_one(2), loader.load_one(1));

        assert_eq!(a.unwrap(), Some(10));
        assert_eq!(b.unwrap(), Some(20));
        assert_eq!(a_again.unwrap(), Some(10));
        // Duplicate submissions share one slot; one fetch for the window.
        assert_eq!(*batches.lock().unwrap(), vec![vec![1, 2]]);
    }

    #[tokio::test]
    async fn resolved_keys_are_served_from_cache() {
        let (loader, batches) = echo_loader(false);

        assert_eq!(loader.load_one(7).await.unwrap(), Some(70));
        assert_eq!(loader.load_one(7).await.unwrap(), Some(70));

        assert_eq!(batches.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_keys_resolve_to_none_and_are_cached() {
        let (loader, batches) = echo_loader(false);

        assert_eq!(loader.load_one(123).await.unwrap(), None);
        assert_eq!(loader.load_one(123).await.unwrap(), None);

        // The "no row" outcome is an answer, not an invitation to refetch.
        assert_eq!(batches.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failure_reaches_every_caller_of_the_batch() {
        let (loader, batches) = echo_loader(true);

        let (a, b) = tokio::join!(loader.load_one(1), loader.load_one(2));

        assert!(matches!(a, Err(LoadError::Fetch(BackendDown))));
        assert!(matches!(b, Err(LoadError::Fetch(BackendDown))));
        assert_eq!(batches.lock().unwrap().len(), 1);

        // Failures are not cached; the next window fetches again.
        let retry = loader.load_one(1).await;
        assert!(matches!(retry, Err(LoadError::Fetch(BackendDown))));
        assert_eq!(batches.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn size_cap_splits_batches() {
        let (loader, batches) = echo_loader(false);
        let loader = loader.max_batch_size(2);

        let resolved = loader.load_many(vec![1, 2, 3, 4, 5]).await.unwrap();

        assert_eq!(resolved.len(), 5);
        let batches = batches.lock().unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0], vec![1, 2]);
        assert_eq!(batches[1], vec![3, 4]);
        assert_eq!(batches[2], vec![5]);
    }

    #[tokio::test]
    async fn load_many_skips_missing_keys() {
        let (loader, _) = echo_loader(false);

        let resolved = loader.load_many(vec![1, 150, 2]).await.unwrap();

        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[&1], 10);
        assert_eq!(resolved[&2], 20);
        assert!(!resolved.contains_key(&150));
    }
}
