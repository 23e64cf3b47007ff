//! Request coalescing for generated clients.
//!
//! A [`BatchLoader`] lives in a [`DataLoaders`](crate::DataLoaders) context.
//! Every [`BatchLoader::load`] registers its key; the first registrant of a
//! scheduling turn yields once so that every other load issued in the same
//! turn can join, then runs the batch function once for all pending keys.
//! Results are cached per key for the lifetime of the loader, so identical
//! keys share one underlying call.
//!
//! If the opening load is dropped before its batch resolves, the batch's keys
//! are evicted and the loads waiting on them open a new batch.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;

use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use crate::error::RpcError;

/// Resolves to `None` when the batch holding the key was abandoned before it
/// produced a result.
type SharedResult<V> = Shared<BoxFuture<'static, Option<Result<V, RpcError>>>>;

struct LoaderState<K, V> {
    cache: HashMap<K, SharedResult<V>>,
    pending: Vec<(K, oneshot::Sender<Result<V, RpcError>>)>,
    /// A load has opened the current batch and will dispatch `pending`.
    batch_open: bool,
}

/// Coalesces individual loads into batch calls.
pub struct BatchLoader<K, V> {
    state: Mutex<LoaderState<K, V>>,
}

impl<K, V> Default for BatchLoader<K, V> {
    fn default() -> Self {
        Self {
            state: Mutex::new(LoaderState {
                cache: HashMap::new(),
                pending: Vec::new(),
                batch_open: false,
            }),
        }
    }
}

/// Held by the load that opened a batch until the batch resolves.
///
/// Dropping it early (the opening load was cancelled) evicts every key of the
/// batch, so their waiters retry instead of hanging or caching a failure.
struct BatchGuard<'a, K: Eq + Hash, V> {
    state: &'a Mutex<LoaderState<K, V>>,
    /// Keys taken for dispatch; `None` while the batch is still collecting.
    dispatched: Option<Vec<K>>,
    armed: bool,
}

impl<K: Eq + Hash, V> Drop for BatchGuard<'_, K, V> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.state.lock();
        let abandoned: Vec<K> = match self.dispatched.take() {
            Some(keys) => keys,
            None => {
                state.batch_open = false;
                std::mem::take(&mut state.pending)
                    .into_iter()
                    .map(|(key, _)| key)
                    .collect()
            }
        };
        for key in &abandoned {
            state.cache.remove(key);
        }
        tracing::debug!(keys = abandoned.len(), "batch abandoned by its opening load");
    }
}

impl<K, V> BatchLoader<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the value for `key`.
    ///
    /// `batch_fn` receives every key collected in this turn and must return
    /// one value per key, in order. It is only invoked by the load that opens
    /// the batch; other loads in the same turn keep theirs in case that load
    /// is cancelled and they have to open a new batch.
    pub async fn load<F, Fut>(&self, key: K, batch_fn: F) -> Result<V, RpcError>
    where
        F: FnOnce(Vec<K>) -> Fut,
        Fut: Future<Output = Result<Vec<V>, RpcError>>,
    {
        loop {
            let (result, opens_batch) = self.register(&key);
            if opens_batch {
                self.run_batch(batch_fn).await;
                return result.await.unwrap_or(Err(RpcError::Canceled));
            }
            if let Some(outcome) = result.clone().await {
                return outcome;
            }
            {
                let mut state = self.state.lock();
                if state.cache.get(&key).is_some_and(|cached| cached.ptr_eq(&result)) {
                    state.cache.remove(&key);
                }
            }
            tracing::debug!("joined batch was abandoned, retrying");
        }
    }

    fn register(&self, key: &K) -> (SharedResult<V>, bool) {
        let mut state = self.state.lock();
        if let Some(existing) = state.cache.get(key) {
            return (existing.clone(), false);
        }
        let (tx, rx) = oneshot::channel();
        let shared = rx.map(Result::ok).boxed().shared();
        let opens_batch = !state.batch_open;
        state.batch_open = true;
        state.pending.push((key.clone(), tx));
        state.cache.insert(key.clone(), shared.clone());
        (shared, opens_batch)
    }

    async fn run_batch<F, Fut>(&self, batch_fn: F)
    where
        F: FnOnce(Vec<K>) -> Fut,
        Fut: Future<Output = Result<Vec<V>, RpcError>>,
    {
        let mut guard = BatchGuard {
            state: &self.state,
            dispatched: None,
            armed: true,
        };
        tokio::task::yield_now().await;
        let pending = {
            let mut state = self.state.lock();
            state.batch_open = false;
            std::mem::take(&mut state.pending)
        };
        guard.dispatched = Some(pending.iter().map(|(key, _)| key.clone()).collect());
        self.dispatch(pending, batch_fn).await;
        guard.armed = false;
    }

    async fn dispatch<F, Fut>(
        &self,
        pending: Vec<(K, oneshot::Sender<Result<V, RpcError>>)>,
        batch_fn: F,
    ) where
        F: FnOnce(Vec<K>) -> Fut,
        Fut: Future<Output = Result<Vec<V>, RpcError>>,
    {
        let keys: Vec<K> = pending.iter().map(|(key, _)| key.clone()).collect();
        tracing::debug!(keys = keys.len(), "dispatching batch");
        let outcome = batch_fn(keys).await.and_then(|values| {
            if values.len() == pending.len() {
                Ok(values)
            } else {
                Err(RpcError::BatchMismatch {
                    expected: pending.len(),
                    actual: values.len(),
                })
            }
        });

        match outcome {
            Ok(values) => {
                for ((_, tx), value) in pending.into_iter().zip(values) {
                    let _ = tx.send(Ok(value));
                }
            }
            Err(err) => {
                let mut state = self.state.lock();
                for (key, tx) in pending {
                    state.cache.remove(&key);
                    let _ = tx.send(Err(err.clone()));
                }
            }
        }
    }

    /// Drop the cached result for `key`.
    pub fn clear(&self, key: &K) {
        self.state.lock().cache.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn loads_in_one_turn_share_a_batch() {
        let loader = BatchLoader::<u32, String>::new();
        let calls = AtomicUsize::new(0);
        let batch = |keys: Vec<u32>| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(keys.iter().map(|k| format!("v{k}")).collect()) }
        };

        let (a, b, c) = futures::join!(
            loader.load(1, batch),
            loader.load(2, batch),
            loader.load(3, batch),
        );
        assert_eq!(a.unwrap(), "v1");
        assert_eq!(b.unwrap(), "v2");
        assert_eq!(c.unwrap(), "v3");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn repeated_keys_hit_the_cache() {
        let loader = BatchLoader::<u32, u32>::new();
        let calls = AtomicUsize::new(0);
        let batch = |keys: Vec<u32>| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(keys) }
        };

        assert_eq!(loader.load(7, batch).await.unwrap(), 7);
        assert_eq!(loader.load(7, batch).await.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        loader.clear(&7);
        assert_eq!(loader.load(7, batch).await.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn length_mismatch_fails_every_key() {
        let loader = BatchLoader::<u32, u32>::new();
        let batch = |_keys: Vec<u32>| async move { Ok(vec![1]) };

        let (a, b) = futures::join!(loader.load(1, batch), loader.load(2, batch));
        assert!(matches!(
            a,
            Err(RpcError::BatchMismatch {
                expected: 2,
                actual: 1
            })
        ));
        assert!(b.is_err());
    }

    #[tokio::test]
    async fn cancelled_opener_does_not_block_later_loads() {
        let loader = BatchLoader::<u32, u32>::new();
        let batch = |keys: Vec<u32>| async move { Ok(keys) };

        // dropped while yielding to collect the batch
        assert!(loader.load(1, batch).now_or_never().is_none());

        let loaded = tokio::time::timeout(Duration::from_secs(2), loader.load(2, batch)).await;
        assert_eq!(loaded.expect("load after a cancelled opener hung").unwrap(), 2);
        assert_eq!(loader.load(1, batch).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn waiters_of_a_cancelled_batch_open_a_new_one() {
        let loader = BatchLoader::<u32, u32>::new();
        let calls = AtomicUsize::new(0);
        let batch = |keys: Vec<u32>| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(keys) }
        };

        let mut opener = Box::pin(loader.load(1, batch));
        assert!(opener.as_mut().now_or_never().is_none());
        let mut waiter = Box::pin(loader.load(2, batch));
        assert!(waiter.as_mut().now_or_never().is_none());
        drop(opener);

        let loaded = tokio::time::timeout(Duration::from_secs(2), waiter).await;
        assert_eq!(loaded.expect("waiter hung").unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_dispatch_is_evicted() {
        let loader = BatchLoader::<u32, u32>::new();
        let stuck = |_keys: Vec<u32>| futures::future::pending::<Result<Vec<u32>, RpcError>>();

        let mut first = Box::pin(loader.load(1, stuck));
        // first poll yields, second poll is inside the batch call
        assert!(first.as_mut().now_or_never().is_none());
        assert!(first.as_mut().now_or_never().is_none());
        drop(first);

        let working = |keys: Vec<u32>| async move { Ok(keys) };
        assert_eq!(loader.load(1, working).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_batches_are_not_cached() {
        let loader = BatchLoader::<u32, u32>::new();
        let failing = |_keys: Vec<u32>| async move { Err(RpcError::transport("down")) };
        assert!(loader.load(1, failing).await.is_err());

        let working = |keys: Vec<u32>| async move { Ok(keys) };
        assert_eq!(loader.load(1, working).await.unwrap(), 1);
    }
}
