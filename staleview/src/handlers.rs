//! Lifecycle handlers.
//!
//! A [`Handlers`] set holds the named callbacks an orchestrator invokes while
//! it serves cached data and refreshes it. `on_data` and `on_error` are
//! required; everything else is optional.

use std::fmt;
use std::sync::Arc;

use staleview_core::{ConfigError, StaleviewError, StaleviewResult};

/// Receives a value and whether it came from the cache.
pub type DataHandler<T> = Arc<dyn Fn(T, bool) + Send + Sync>;

/// Receives a fetch failure.
pub type ErrorHandler = Arc<dyn Fn(StaleviewError) + Send + Sync>;

/// Signals a lifecycle point with no payload.
pub type SignalHandler = Arc<dyn Fn() + Send + Sync>;

/// Decides whether a cached value may be shown at all.
pub type Validator<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Named callbacks for one orchestrator.
pub struct Handlers<T> {
    pub(crate) on_data: Option<DataHandler<T>>,
    pub(crate) on_error: Option<ErrorHandler>,
    pub(crate) on_complete: Option<SignalHandler>,
    pub(crate) on_not_cached: Option<SignalHandler>,
    pub(crate) validator: Option<Validator<T>>,
}

impl<T> Handlers<T> {
    /// Create an empty handler set.
    pub fn new() -> Self {
        Self {
            on_data: None,
            on_error: None,
            on_complete: None,
            on_not_cached: None,
            validator: None,
        }
    }

    /// Set the data handler. Required.
    pub fn on_data<F>(mut self, f: F) -> Self
    where
        F: Fn(T, bool) + Send + Sync + 'static,
    {
        self.on_data = Some(Arc::new(f));
        self
    }

    /// Set the error handler. Required.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(StaleviewError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Set the completion handler, fired once per start.
    pub fn on_complete<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_complete = Some(Arc::new(f));
        self
    }

    /// Set the handler fired when no usable cached value exists.
    pub fn on_not_cached<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_not_cached = Some(Arc::new(f));
        self
    }

    /// Set a validator that decides whether a cached value is shown.
    pub fn validator<F>(mut self, f: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(f));
        self
    }

    /// True unless a validator is present and rejects `value`.
    pub(crate) fn accepts(&self, value: &T) -> bool {
        self.validator.as_ref().map_or(true, |validate| validate(value))
    }

    /// Fire the not-cached handler if one is registered.
    pub(crate) fn notify_not_cached(&self) {
        if let Some(f) = &self.on_not_cached {
            f();
        }
    }

    /// Extract the required handlers, failing on the first one missing.
    pub(crate) fn required(&self) -> StaleviewResult<(DataHandler<T>, ErrorHandler)> {
        let on_data = self.on_data.clone().ok_or_else(|| missing("on_data"))?;
        let on_error = self.on_error.clone().ok_or_else(|| missing("on_error"))?;
        Ok((on_data, on_error))
    }
}

pub(crate) fn missing(field: &str) -> StaleviewError {
    ConfigError::MissingRequired {
        field: field.to_string(),
    }
    .into()
}

impl<T> Default for Handlers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Handlers<T> {
    fn clone(&self) -> Self {
        Self {
            on_data: self.on_data.clone(),
            on_error: self.on_error.clone(),
            on_complete: self.on_complete.clone(),
            on_not_cached: self.on_not_cached.clone(),
            validator: self.validator.clone(),
        }
    }
}

impl<T> fmt::Debug for Handlers<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("on_data", &self.on_data.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("on_not_cached", &self.on_not_cached.is_some())
            .field("validator", &self.validator.is_some())
            .finish()
    }
}
