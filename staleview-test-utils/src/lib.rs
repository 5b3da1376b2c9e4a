//! staleview Test Utilities
//!
//! Shared test infrastructure for the staleview workspace:
//! - Proptest generators for keys, sample values, and validity windows
//! - Fixtures with a field excluded from the cached form
//! - Recording handlers, scripted fetch sources, and a spying store
//! - Custom assertions for configuration errors

// Re-export the types every test needs
pub use staleview::{
    fetch_fn, CacheKey, CacheOrchestrator, CacheRecord, CacheStore, Cacheable, ConfigError,
    FetchError, FetchSource, Handlers, JsonCodec, MemoryCacheStore, Refresh, Settlement,
    StaleviewError, StaleviewResult, StorageError, Timestamp,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use tokio::sync::Notify;

// ============================================================================
// SAMPLE DOMAIN TYPE
// ============================================================================

/// Cacheable value used throughout the tests.
///
/// `session_token` and every device's `pairing_code` are never cached:
/// [`fixtures::sample_codec`] excludes them, so a value read back from the
/// cache always has them unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub id: u64,
    pub name: String,
    pub tags: Vec<String>,
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default)]
    pub devices: Vec<Device>,
}

/// List element carrying its own non-cached field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub label: String,
    #[serde(default)]
    pub pairing_code: Option<String>,
}

impl Device {
    pub fn paired(label: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            pairing_code: Some(code.into()),
        }
    }
}

impl Sample {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            tags: Vec::new(),
            session_token: None,
            devices: Vec::new(),
        }
    }

    /// Same value with the non-cached fields dropped.
    pub fn as_cached(&self) -> Self {
        Self {
            session_token: None,
            devices: self
                .devices
                .iter()
                .map(|device| Device {
                    pairing_code: None,
                    ..device.clone()
                })
                .collect(),
            ..self.clone()
        }
    }
}

impl Cacheable for Sample {
    fn type_tag() -> &'static str {
        "sample"
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for staleview types.

    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    /// Generate a cache key made of printable segments.
    pub fn arb_cache_key() -> impl Strategy<Value = CacheKey> {
        "[a-z][a-z0-9_]{0,15}(:[a-z0-9]{1,8}){0,3}".prop_map(CacheKey::new)
    }

    /// Generate a device, sometimes paired.
    pub fn arb_device() -> impl Strategy<Value = Device> {
        ("[a-z]{1,8}", prop::option::of("[0-9]{6}"))
            .prop_map(|(label, pairing_code)| Device { label, pairing_code })
    }

    /// Generate a Sample, sometimes carrying a session token.
    pub fn arb_sample() -> impl Strategy<Value = Sample> {
        (
            any::<u64>(),
            "[A-Za-z ]{0,24}",
            prop::collection::vec("[a-z]{1,8}", 0..4),
            prop::option::of("[a-f0-9]{16}"),
            prop::collection::vec(arb_device(), 0..3),
        )
            .prop_map(|(id, name, tags, session_token, devices)| Sample {
                id,
                name,
                tags,
                session_token,
                devices,
            })
    }

    /// Generate a validity window, or none at all.
    pub fn arb_validity() -> impl Strategy<Value = Option<Duration>> {
        prop_oneof![
            Just(None),
            (1u64..86_400_000).prop_map(|ms| Some(Duration::from_millis(ms))),
        ]
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built values for common scenarios.

    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};

    /// Codec that keeps `session_token` and device pairing codes out of the cache.
    pub fn sample_codec() -> JsonCodec {
        JsonCodec::new().exclude_all(["session_token", "devices.pairing_code"])
    }

    /// The value a typical fetch returns.
    pub fn fresh_sample() -> Sample {
        Sample {
            id: 1,
            name: "fresh".to_string(),
            tags: vec!["network".to_string()],
            session_token: Some("secret-token".to_string()),
            devices: vec![Device::paired("phone", "482913")],
        }
    }

    /// The value a typical cache holds.
    pub fn cached_sample() -> Sample {
        Sample {
            id: 1,
            name: "cached".to_string(),
            tags: vec!["disk".to_string()],
            session_token: None,
            devices: vec![Device {
                label: "laptop".to_string(),
                pairing_code: None,
            }],
        }
    }

    /// Record for `value` that stays valid for another hour.
    pub fn fresh_record(key: impl Into<CacheKey>, value: &Sample) -> CacheRecord {
        record_valid_until(key, value, Utc::now() + ChronoDuration::hours(1))
    }

    /// Record for `value` whose deadline passed a minute ago.
    pub fn stale_record(key: impl Into<CacheKey>, value: &Sample) -> CacheRecord {
        record_valid_until(key, value, Utc::now() - ChronoDuration::minutes(1))
    }

    /// Record for `value` with an explicit deadline.
    pub fn record_valid_until(
        key: impl Into<CacheKey>,
        value: &Sample,
        valid_until: Timestamp,
    ) -> CacheRecord {
        let payload = sample_codec()
            .encode(value)
            .expect("Sample always encodes");
        CacheRecord::new(key, payload, valid_until)
    }
}

// ============================================================================
// RECORDING HANDLERS
// ============================================================================

/// One handler invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Event<T> {
    Data { value: T, from_cache: bool },
    Error(StaleviewError),
    NotCached,
    Complete,
}

/// Records every handler invocation in order.
#[derive(Debug)]
pub struct RecordingHandlers<T> {
    events: Arc<Mutex<Vec<Event<T>>>>,
}

impl<T: Clone + Send + Sync + 'static> RecordingHandlers<T> {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Handler set that appends to this recording.
    pub fn handlers(&self) -> Handlers<T> {
        let data = Arc::clone(&self.events);
        let error = Arc::clone(&self.events);
        let not_cached = Arc::clone(&self.events);
        let complete = Arc::clone(&self.events);
        Handlers::new()
            .on_data(move |value, from_cache| push(&data, Event::Data { value, from_cache }))
            .on_error(move |e| push(&error, Event::Error(e)))
            .on_not_cached(move || push(&not_cached, Event::NotCached))
            .on_complete(move || push(&complete, Event::Complete))
    }

    /// Snapshot of all events so far.
    pub fn events(&self) -> Vec<Event<T>> {
        self.events.lock().expect("event log poisoned").clone()
    }

    /// Values delivered through `on_data`, with their cache flag.
    pub fn data(&self) -> Vec<(T, bool)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Data { value, from_cache } => Some((value, from_cache)),
                _ => None,
            })
            .collect()
    }

    /// Number of recorded events equal to `expected`.
    pub fn count(&self, expected: &Event<T>) -> usize
    where
        T: PartialEq,
    {
        self.events().iter().filter(|event| *event == expected).count()
    }
}

impl<T: Clone + Send + Sync + 'static> Default for RecordingHandlers<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn push<T>(events: &Mutex<Vec<Event<T>>>, event: Event<T>) {
    events.lock().expect("event log poisoned").push(event);
}

// ============================================================================
// SCRIPTED FETCH SOURCE
// ============================================================================

#[derive(Debug)]
struct ScriptState<T> {
    outcomes: Mutex<VecDeque<StaleviewResult<T>>>,
    fallback: Option<T>,
    calls: AtomicUsize,
    gate: Option<Notify>,
}

/// Fetch source that replays scripted outcomes and counts its invocations.
///
/// Clones share state, so a test can hand one clone to the orchestrator and
/// keep another to inspect calls or open the gate.
#[derive(Debug)]
pub struct ScriptedSource<T> {
    state: Arc<ScriptState<T>>,
}

impl<T> Clone for ScriptedSource<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ScriptedSource<T> {
    fn build(outcomes: Vec<StaleviewResult<T>>, fallback: Option<T>, gated: bool) -> Self {
        Self {
            state: Arc::new(ScriptState {
                outcomes: Mutex::new(outcomes.into()),
                fallback,
                calls: AtomicUsize::new(0),
                gate: gated.then(Notify::new),
            }),
        }
    }

    /// Returns `value` on every call.
    pub fn always(value: T) -> Self {
        Self::build(Vec::new(), Some(value), false)
    }

    /// Fails on every call.
    pub fn failing(reason: &str) -> Self {
        Self::build(vec![Err(FetchError::failed(reason).into())], None, false)
    }

    /// Replays `outcomes` in order, then fails.
    pub fn scripted(outcomes: Vec<StaleviewResult<T>>) -> Self {
        Self::build(outcomes, None, false)
    }

    /// Returns `value`, but only after [`ScriptedSource::release`] is called.
    pub fn gated(value: T) -> Self {
        Self::build(Vec::new(), Some(value), true)
    }

    /// Let one waiting (or the next) gated fetch proceed.
    pub fn release(&self) {
        if let Some(gate) = &self.state.gate {
            gate.notify_one();
        }
    }

    /// Number of fetches started so far.
    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> StaleviewResult<T> {
        let mut outcomes = self.state.outcomes.lock().expect("script poisoned");
        if let Some(outcome) = outcomes.pop_front() {
            // A lone failure keeps failing.
            if outcome.is_err() && outcomes.is_empty() && self.state.fallback.is_none() {
                outcomes.push_back(outcome.clone());
            }
            return outcome;
        }
        match &self.state.fallback {
            Some(value) => Ok(value.clone()),
            None => Err(FetchError::failed("script exhausted").into()),
        }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> FetchSource<T> for ScriptedSource<T> {
    async fn fetch(&self) -> StaleviewResult<T> {
        let call = self.state.calls.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(call, "Scripted fetch");
        if let Some(gate) = &self.state.gate {
            gate.notified().await;
        }
        self.next_outcome()
    }
}

// ============================================================================
// SPY STORE
// ============================================================================

/// Memory store that counts calls and can be told to fail.
#[derive(Debug, Default)]
pub struct SpyStore {
    inner: MemoryCacheStore,
    exists_calls: AtomicUsize,
    get_calls: AtomicUsize,
    set_calls: AtomicUsize,
    clear_calls: AtomicUsize,
    clear_all_calls: AtomicUsize,
    written: Mutex<Vec<CacheKey>>,
    failing: AtomicBool,
}

impl SpyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose every operation fails with a backend error.
    pub fn failing() -> Self {
        let store = Self::default();
        store.set_failing(true);
        store
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Insert a record without counting it as a call.
    pub async fn seed(&self, record: CacheRecord) {
        self.inner.set(record).await.expect("seed memory store");
    }

    /// Read a record without counting it as a call.
    pub async fn peek(&self, key: &CacheKey) -> Option<CacheRecord> {
        self.inner.get(key).await.expect("peek memory store")
    }

    pub fn exists_calls(&self) -> usize {
        self.exists_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }

    pub fn clear_calls(&self) -> usize {
        self.clear_calls.load(Ordering::SeqCst)
    }

    pub fn clear_all_calls(&self) -> usize {
        self.clear_all_calls.load(Ordering::SeqCst)
    }

    /// Keys passed to `set`, in order.
    pub fn written_keys(&self) -> Vec<CacheKey> {
        self.written.lock().expect("key log poisoned").clone()
    }

    fn check(&self) -> StaleviewResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Backend {
                reason: "spy store set to fail".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for SpyStore {
    async fn exists(&self, key: &CacheKey) -> StaleviewResult<bool> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.exists(key).await
    }

    async fn get(&self, key: &CacheKey) -> StaleviewResult<Option<CacheRecord>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, record: CacheRecord) -> StaleviewResult<()> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        self.written
            .lock()
            .expect("key log poisoned")
            .push(record.key().clone());
        self.check()?;
        self.inner.set(record).await
    }

    async fn clear(&self, key: &CacheKey) -> StaleviewResult<()> {
        self.clear_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.clear(key).await
    }

    async fn clear_all(&self) -> StaleviewResult<()> {
        self.clear_all_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.clear_all().await
    }
}

// ============================================================================
// TRACING
// ============================================================================

static TRACING: Once = Once::new();

/// Install a test-friendly subscriber once per process.
///
/// Honors `RUST_LOG`, falling back to `staleview=debug`.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("staleview=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for staleview-specific results.

    use super::*;

    /// Assert that a result is a configuration error naming `field`.
    #[track_caller]
    pub fn assert_missing<T: std::fmt::Debug>(result: &StaleviewResult<T>, field: &str) {
        match result {
            Err(StaleviewError::Config(ConfigError::MissingRequired { field: f })) => {
                assert_eq!(f, field, "Wrong field in MissingRequired error");
            }
            other => panic!("Expected MissingRequired({}), got: {:?}", field, other),
        }
    }

    /// Assert that a recorded sequence ends with exactly one completion.
    #[track_caller]
    pub fn assert_completed_once<T: std::fmt::Debug>(events: &[Event<T>]) {
        let completions = events
            .iter()
            .filter(|event| matches!(event, Event::Complete))
            .count();
        assert_eq!(completions, 1, "Expected one completion in {:?}", events);
        assert!(
            matches!(events.last(), Some(Event::Complete)),
            "Completion must be last in {:?}",
            events
        );
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sample_codec_drops_session_token() {
        let sample = fixtures::fresh_sample();
        let codec = fixtures::sample_codec();
        let payload = codec.encode(&sample).expect("encode");
        assert!(!payload.contains("secret-token"));
        assert!(!payload.contains("482913"));
        assert!(payload.contains("phone"));

        let decoded: Sample = codec.decode(&payload).expect("decode");
        assert_eq!(decoded, sample.as_cached());
        assert_eq!(decoded.devices[0].pairing_code, None);
    }

    #[test]
    fn test_record_fixtures() {
        assert!(fixtures::stale_record("sample", &fixtures::cached_sample()).is_stale());
        assert!(!fixtures::fresh_record("sample", &fixtures::cached_sample()).is_stale());
    }

    #[tokio::test]
    async fn test_recording_handlers_keep_order() {
        let recorder = RecordingHandlers::<Sample>::new();
        let orchestrator = CacheOrchestrator::<Sample>::new()
            .for_request(ScriptedSource::always(fixtures::fresh_sample()))
            .with_handlers(recorder.handlers());

        let refresh = orchestrator.start_with_cache().await.expect("start");
        assert_eq!(refresh.wait().await, Settlement::Completed);

        assert_eq!(
            recorder.events(),
            vec![
                Event::NotCached,
                Event::Data {
                    value: fixtures::fresh_sample(),
                    from_cache: false
                },
                Event::Complete,
            ]
        );
        assertions::assert_completed_once(&recorder.events());
    }

    #[tokio::test]
    async fn test_scripted_source_replays_then_falls_back() {
        let source = ScriptedSource::scripted(vec![Ok(1u32), Err(FetchError::failed("down").into())]);
        assert_eq!(source.fetch().await, Ok(1));
        assert!(source.fetch().await.is_err());
        assert!(source.fetch().await.is_err());
        assert_eq!(source.calls(), 3);

        let source = ScriptedSource::always(9u32);
        assert_eq!(source.fetch().await, Ok(9));
        assert_eq!(source.fetch().await, Ok(9));
    }

    #[tokio::test]
    async fn test_spy_store_counts_and_fails() {
        let store = SpyStore::new();
        let key = CacheKey::new("sample");
        store
            .set(fixtures::fresh_record("sample", &fixtures::cached_sample()))
            .await
            .expect("set");
        assert!(store.exists(&key).await.expect("exists"));
        assert_eq!(store.set_calls(), 1);
        assert_eq!(store.exists_calls(), 1);
        assert_eq!(store.written_keys(), vec![key.clone()]);

        store.set_failing(true);
        assert!(store.get(&key).await.is_err());
        assert!(store.peek(&key).await.is_some());
    }

    #[test]
    fn test_init_test_tracing_is_idempotent() {
        init_test_tracing();
        init_test_tracing();
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_generated_keys_are_non_empty(key in generators::arb_cache_key()) {
            prop_assert!(!key.as_str().is_empty());
        }

        #[test]
        fn prop_generated_samples_round_trip_without_token(sample in generators::arb_sample()) {
            let codec = fixtures::sample_codec();
            let decoded: Sample = codec.decode(&codec.encode(&sample).expect("encode")).expect("decode");
            prop_assert_eq!(decoded, sample.as_cached());
        }
    }
}
