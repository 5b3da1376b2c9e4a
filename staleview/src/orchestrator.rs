//! Cache-then-refresh orchestration.
//!
//! [`CacheOrchestrator`] serves a cached value immediately when one exists,
//! decides whether it must be refreshed, drives the fetch source when needed,
//! and writes fresh results back into both cache tiers.
//!
//! # Handler contract for one `start()` call
//!
//! - `on_data` fires 0, 1 or 2 times. Twice only when a displayed cached value
//!   is refreshed: first with `from_cache = true`, then `false`.
//! - `on_error` fires at most once, only from the fetch.
//! - `on_not_cached` fires at most once, on a true miss or when the validator
//!   rejects the cached value, and always before any fetch outcome.
//! - `on_complete` fires exactly once, after every other handler, unless the
//!   fetch is disposed first.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use staleview_core::{CacheKey, CacheRecord, Cacheable, StaleviewResult};
use staleview_storage::{CacheStore, JsonCodec, MemoryCacheStore, StoreConfig};

use crate::handlers::{missing, DataHandler, ErrorHandler, Handlers, SignalHandler};
use crate::refresh::{InFlight, Refresh, Release, Settlement, Ticket};
use crate::source::FetchSource;

/// Result of looking a key up in the two tiers.
enum Lookup<T> {
    /// Neither tier holds a usable record.
    Miss,
    /// A record was found and decoded.
    Hit { value: T, stale: bool },
}

/// Cache-then-refresh orchestrator for one domain type and one key.
///
/// Holds its own fast tier, an optional shared durable tier, the codec, the
/// validity applied to fresh records, the fetch source and the handlers.
///
/// # Example
///
/// ```ignore
/// let orchestrator = CacheOrchestrator::<Profile>::with_durable(store)
///     .for_request(fetch_fn(move || api.clone().profile()))
///     .with_validity(Duration::from_secs(300))
///     .on_data(|profile, from_cache| render(profile, from_cache))
///     .on_error(|e| show_error(e))
///     .on_complete(|| hide_spinner());
///
/// orchestrator.start_with_cache().await?;
/// ```
pub struct CacheOrchestrator<T: Cacheable> {
    key: CacheKey,
    fast: Arc<MemoryCacheStore>,
    durable: Option<Arc<dyn CacheStore>>,
    codec: JsonCodec,
    validity: Option<Duration>,
    default_validity: Option<Duration>,
    source: Option<Arc<dyn FetchSource<T>>>,
    handlers: Handlers<T>,
    in_flight: Arc<InFlight>,
}

impl<T: Cacheable> CacheOrchestrator<T> {
    /// Create an orchestrator with only the fast tier and the type's default key.
    pub fn new() -> Self {
        Self {
            key: CacheKey::for_type::<T>(),
            fast: Arc::new(MemoryCacheStore::new()),
            durable: None,
            codec: JsonCodec::new(),
            validity: None,
            default_validity: None,
            source: None,
            handlers: Handlers::new(),
            in_flight: Arc::new(InFlight::default()),
        }
    }

    /// Create an orchestrator backed by a durable store.
    pub fn with_durable(store: Arc<dyn CacheStore>) -> Self {
        Self::new().with_store(store)
    }

    /// Attach a durable store.
    pub fn with_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.durable = Some(store);
        self
    }

    /// Override the type-derived cache key.
    pub fn with_key(mut self, key: impl Into<CacheKey>) -> Self {
        self.key = key.into();
        self
    }

    /// Use a codec with field exclusions.
    pub fn with_codec(mut self, codec: JsonCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Apply store-level defaults. An explicit `with_validity` still wins.
    pub fn with_store_config(mut self, config: &StoreConfig) -> Self {
        self.default_validity = config.default_validity;
        self
    }

    /// Set the fetch source. Required.
    pub fn for_request<S>(mut self, source: S) -> Self
    where
        S: FetchSource<T> + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    /// Set a shared fetch source. Required.
    pub fn for_shared_request(mut self, source: Arc<dyn FetchSource<T>>) -> Self {
        self.source = Some(source);
        self
    }

    /// Set how long freshly fetched records stay valid.
    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = Some(validity);
        self
    }

    /// Set a validator deciding whether a cached value may be shown.
    pub fn with_cache_validator<F>(mut self, f: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.handlers = self.handlers.validator(f);
        self
    }

    /// Set the data handler. Required.
    pub fn on_data<F>(mut self, f: F) -> Self
    where
        F: Fn(T, bool) + Send + Sync + 'static,
    {
        self.handlers = self.handlers.on_data(f);
        self
    }

    /// Set the fetch error handler. Required.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(staleview_core::StaleviewError) + Send + Sync + 'static,
    {
        self.handlers = self.handlers.on_error(f);
        self
    }

    /// Set the completion handler.
    pub fn on_complete<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.handlers = self.handlers.on_complete(f);
        self
    }

    /// Set the handler fired when there is no usable cached value.
    pub fn on_not_cached<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.handlers = self.handlers.on_not_cached(f);
        self
    }

    /// Replace all handlers at once.
    pub fn with_handlers(mut self, handlers: Handlers<T>) -> Self {
        self.handlers = handlers;
        self
    }

    /// The key this orchestrator reads and writes.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Validity applied to freshly fetched records.
    pub fn validity(&self) -> Option<Duration> {
        self.validity.or(self.default_validity)
    }

    /// Number of fetches started by this orchestrator that have not delivered.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Start with cache preloading.
    pub async fn start_with_cache(&self) -> StaleviewResult<Refresh> {
        self.start(true).await
    }

    /// Serve cached data if possible and refresh it when needed.
    ///
    /// With `preload` false the cache is not consulted at all and the fetch
    /// result is delivered with `from_cache = false`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error, before touching any store or handler,
    /// if the fetch source, `on_data` or `on_error` is missing. All other
    /// failures are delivered through the handlers.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime when a fetch is needed.
    pub async fn start(&self, preload: bool) -> StaleviewResult<Refresh> {
        let source = self.source.clone().ok_or_else(|| missing("fetch_source"))?;
        let (on_data, on_error) = self.handlers.required()?;

        let fetch = FetchJob {
            key: self.key.clone(),
            fast: Arc::clone(&self.fast),
            durable: self.durable.clone(),
            codec: self.codec.clone(),
            validity: self.validity(),
            source,
            on_data: Arc::clone(&on_data),
            on_error,
            on_complete: self.handlers.on_complete.clone(),
            in_flight: Arc::clone(&self.in_flight),
        };

        if !preload {
            tracing::debug!(key = %self.key, "Cache preload skipped");
            return Ok(fetch.spawn());
        }

        match self.lookup().await {
            Lookup::Hit { value, stale } if self.handlers.accepts(&value) => {
                on_data(value, true);
                if stale {
                    tracing::debug!(key = %self.key, "Cached value is stale, refreshing");
                    Ok(fetch.spawn())
                } else {
                    tracing::debug!(key = %self.key, "Cached value is fresh");
                    if let Some(complete) = &self.handlers.on_complete {
                        complete();
                    }
                    Ok(Refresh::Settled)
                }
            }
            Lookup::Hit { .. } => {
                tracing::debug!(key = %self.key, "Cached value rejected by validator");
                self.handlers.notify_not_cached();
                Ok(fetch.spawn())
            }
            Lookup::Miss => {
                tracing::debug!(key = %self.key, "Cache miss");
                self.handlers.notify_not_cached();
                Ok(fetch.spawn())
            }
        }
    }

    /// Find and decode the record for this orchestrator's key.
    ///
    /// The fast tier is consulted first; the durable tier only when the fast
    /// tier has nothing. A durable hit is not copied into the fast tier here.
    async fn lookup(&self) -> Lookup<T> {
        let record = match read_tier(self.fast.as_ref(), &self.key, "fast").await {
            Some(record) => Some(record),
            None => match &self.durable {
                Some(durable) => read_tier(durable.as_ref(), &self.key, "durable").await,
                None => None,
            },
        };

        let Some(record) = record else {
            return Lookup::Miss;
        };

        match self.codec.decode::<T>(record.payload()) {
            Ok(value) => Lookup::Hit {
                value,
                stale: record.is_stale_at(Utc::now()),
            },
            Err(error) => {
                tracing::warn!(key = %self.key, %error, "Cached payload is unreadable, treating as miss");
                Lookup::Miss
            }
        }
    }

    /// Remove `key` from both tiers.
    pub async fn clear_key(&self, key: impl Into<CacheKey>) -> StaleviewResult<()> {
        let key = key.into();
        self.fast.clear(&key).await?;
        if let Some(durable) = &self.durable {
            durable.clear(&key).await?;
        }
        tracing::debug!(key = %key, "Cleared cache key");
        Ok(())
    }

    /// Remove this orchestrator's own key from both tiers.
    pub async fn clear(&self) -> StaleviewResult<()> {
        self.clear_key(&self.key).await
    }

    /// Empty both tiers entirely, including keys owned by other orchestrators.
    pub async fn clear_all(&self) -> StaleviewResult<()> {
        self.fast.clear_all().await?;
        if let Some(durable) = &self.durable {
            durable.clear_all().await?;
        }
        tracing::debug!("Cleared all cache tiers");
        Ok(())
    }

    /// Cancel every in-flight fetch so its outcome never reaches the handlers.
    ///
    /// A cache write that already happened is not rolled back. The
    /// orchestrator stays usable afterwards.
    pub fn dispose(&self) {
        let cancelled = self.in_flight.dispose_all();
        if cancelled > 0 {
            tracing::debug!(key = %self.key, cancelled, "Disposed in-flight fetches");
        }
    }
}

impl<T: Cacheable> Default for CacheOrchestrator<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Read one tier, downgrading failures to a miss.
async fn read_tier(store: &dyn CacheStore, key: &CacheKey, tier: &'static str) -> Option<CacheRecord> {
    let found = match store.exists(key).await {
        Ok(found) => found,
        Err(error) => {
            tracing::warn!(key = %key, tier, %error, "Cache tier lookup failed");
            return None;
        }
    };
    if !found {
        return None;
    }
    match store.get(key).await {
        Ok(Some(record)) => {
            tracing::debug!(key = %key, tier, "Cache tier hit");
            Some(record)
        }
        Ok(None) => None,
        Err(error) => {
            tracing::warn!(key = %key, tier, %error, "Cache tier read failed");
            None
        }
    }
}

/// Everything the background fetch needs, detached from the orchestrator.
struct FetchJob<T: Cacheable> {
    key: CacheKey,
    fast: Arc<MemoryCacheStore>,
    durable: Option<Arc<dyn CacheStore>>,
    codec: JsonCodec,
    validity: Option<Duration>,
    source: Arc<dyn FetchSource<T>>,
    on_data: DataHandler<T>,
    on_error: ErrorHandler,
    on_complete: Option<SignalHandler>,
    in_flight: Arc<InFlight>,
}

impl<T: Cacheable> FetchJob<T> {
    /// Register and spawn the fetch.
    fn spawn(self) -> Refresh {
        let in_flight = Arc::clone(&self.in_flight);
        let ticket = in_flight.register();
        let handle = tokio::spawn(self.run(ticket.clone()));
        in_flight.attach(&ticket, handle.abort_handle());
        Refresh::Pending(handle)
    }

    async fn run(self, ticket: Ticket) -> Settlement {
        let _release = Release::new(Arc::clone(&self.in_flight), ticket.clone());
        tracing::debug!(key = %self.key, "Fetching fresh value");
        let outcome = self.source.fetch().await;

        if ticket.is_cancelled() {
            tracing::debug!(key = %self.key, "Fetch disposed, dropping outcome");
            return Settlement::Disposed;
        }

        match outcome {
            Ok(value) => {
                self.write_back(&value).await;
                if ticket.is_cancelled() {
                    return Settlement::Disposed;
                }
                (self.on_data)(value, false);
            }
            Err(error) => {
                tracing::debug!(key = %self.key, %error, "Fetch failed");
                (self.on_error)(error);
            }
        }

        if ticket.is_cancelled() {
            return Settlement::Disposed;
        }
        if let Some(complete) = &self.on_complete {
            complete();
        }
        Settlement::Completed
    }

    /// Store a fresh value in both tiers.
    ///
    /// Encoding or durable write failures are logged; the fast tier still
    /// receives the record whenever encoding succeeds.
    async fn write_back(&self, value: &T) {
        let payload = match self.codec.encode(value) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(key = %self.key, %error, "Failed to encode fetched value, cache untouched");
                return;
            }
        };
        let record = CacheRecord::expiring(self.key.clone(), payload, Utc::now(), self.validity);

        if let Err(error) = self.fast.set(record.clone()).await {
            tracing::warn!(key = %self.key, %error, "Fast tier write failed");
        }
        if let Some(durable) = &self.durable {
            if let Err(error) = durable.set(record).await {
                tracing::warn!(key = %self.key, %error, "Durable tier write failed");
            }
        }
    }
}
