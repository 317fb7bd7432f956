use tide_core::{CoreResult, Timestamp, TimestampAllocator};
use tidewater_retry::{RetryError, RetryPolicy, retry};

/// Timestamp allocator that retries transient failures of its inner
/// authority with backoff.
#[derive(Debug)]
pub struct RetryingAllocator<A> {
    inner: A,
    policy: RetryPolicy,
}

impl<A: TimestampAllocator> RetryingAllocator<A> {
    pub fn new(inner: A, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

impl<A: TimestampAllocator> TimestampAllocator for RetryingAllocator<A> {
    async fn alloc_one(&self) -> CoreResult<Timestamp> {
        let inner = &self.inner;
        retry(&self.policy, move || async move {
            inner.alloc_one().await.map_err(RetryError::from)
        })
        .await
    }
}
