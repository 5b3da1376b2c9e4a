//! Fetch sources.
//!
//! A fetch source runs one asynchronous operation that yields a single value
//! or fails. The orchestrator drives it on a spawned task; cancelling the task
//! drops the in-flight future, which is how sources observe cancellation.

use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use staleview_core::StaleviewResult;

/// Produces one fresh value per invocation.
#[async_trait]
pub trait FetchSource<T>: Send + Sync {
    /// Fetch a fresh value.
    async fn fetch(&self) -> StaleviewResult<T>;
}

/// Adapter turning a closure that returns a future into a [`FetchSource`].
///
/// Built with [`fetch_fn`].
pub struct FnSource<F, T> {
    f: F,
    _marker: PhantomData<fn() -> T>,
}

/// Wrap a closure returning a future as a fetch source.
///
/// ```ignore
/// let source = fetch_fn(move || {
///     let client = client.clone();
///     async move { client.load_profile().await.map_err(FetchError::failed).map_err(Into::into) }
/// });
/// ```
pub fn fetch_fn<F, Fut, T>(f: F) -> FnSource<F, T>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = StaleviewResult<T>> + Send,
{
    FnSource {
        f,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<F, Fut, T> FetchSource<T> for FnSource<F, T>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = StaleviewResult<T>> + Send,
    T: Send,
{
    async fn fetch(&self) -> StaleviewResult<T> {
        (self.f)().await
    }
}
