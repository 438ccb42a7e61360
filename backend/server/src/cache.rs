use std::{future::Future, sync::Arc, time::Duration};

use moka::future::Cache;

/// A single cached value that goes stale after `ttl`.
#[derive(Clone)]
pub struct TtlSlot<T> {
    inner: Cache<(), T>,
}

impl<T: Clone + Send + Sync + 'static> TtlSlot<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Cache::builder().max_capacity(1).time_to_live(ttl).build(),
        }
    }

    pub async fn get(&self) -> Option<T> {
        self.inner.get(&()).await
    }

    /// Cached value, or the result of `load` which is then cached.
    ///
    /// Concurrent misses wait on a single load. Failures are not cached.
    pub async fn get_or_load<E, Fut>(&self, load: Fut) -> Result<T, Arc<E>>
    where
        Fut: Future<Output = Result<T, E>>,
        E: Send + Sync + 'static,
    {
        self.inner.try_get_with((), load).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn test_loads_once_within_ttl() {
        let slot = TtlSlot::new(Duration::from_secs(60));

        let first = slot.get_or_load(async { Ok::<_, ()>(vec![1, 2]) }).await;
        let second = slot.get_or_load(async { Ok::<_, ()>(vec![9]) }).await;

        assert_eq!(first, Ok(vec![1, 2]));
        assert_eq!(second, Ok(vec![1, 2]));
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_load() {
        let slot = TtlSlot::new(Duration::from_secs(60));
        let loads = Arc::new(AtomicUsize::new(0));

        let load = || {
            let loads = Arc::clone(&loads);
            async move {
                loads.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok::<_, ()>(7)
            }
        };
        let (a, b) = tokio::join!(slot.get_or_load(load()), slot.get_or_load(load()));

        assert_eq!((a, b), (Ok(7), Ok(7)));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_and_failed_loads() {
        let slot = TtlSlot::new(Duration::from_millis(10));
        slot.get_or_load(async { Ok::<_, ()>(1) }).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(slot.get().await, None);

        let slot: TtlSlot<i32> = TtlSlot::new(Duration::from_secs(60));
        let failed = slot.get_or_load(async { Err("down") }).await;
        assert_eq!(failed.unwrap_err().as_ref(), &"down");
        assert_eq!(slot.get().await, None);
    }
}
