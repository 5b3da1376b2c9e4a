//! Background refresh tracking.
//!
//! Every fetch an orchestrator starts is registered here with a cancellation
//! flag and the abort handle of its task. [`InFlight::dispose_all`] flips the
//! flags and aborts the tasks, so a disposed fetch can neither finish nor
//! deliver its outcome to the handlers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::{AbortHandle, JoinHandle};

/// How a `start()` call finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Every handler for the call ran, including completion.
    Completed,
    /// The fetch was disposed before its outcome was delivered.
    Disposed,
}

impl Settlement {
    /// True if the completion handler ran.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Handle returned by `start()`.
///
/// `Settled` means the cache alone satisfied the call and completion has
/// already fired. `Pending` means a fetch is running in the background.
#[derive(Debug)]
pub enum Refresh {
    /// No fetch was needed; all handlers already ran.
    Settled,
    /// A fetch task is running.
    Pending(JoinHandle<Settlement>),
}

impl Refresh {
    /// True while a background fetch may still deliver handlers.
    pub fn is_pending(&self) -> bool {
        match self {
            Self::Settled => false,
            Self::Pending(handle) => !handle.is_finished(),
        }
    }

    /// Wait until the call has fully settled.
    ///
    /// A panic raised by a handler on the fetch task is resumed here.
    pub async fn wait(self) -> Settlement {
        match self {
            Self::Settled => Settlement::Completed,
            Self::Pending(handle) => match handle.await {
                Ok(settlement) => settlement,
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(_) => Settlement::Disposed,
            },
        }
    }
}

/// Cancellation flag shared between a fetch task and its registry.
#[derive(Debug, Clone)]
pub(crate) struct Ticket {
    id: u64,
    cancelled: Arc<AtomicBool>,
}

impl Ticket {
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Releases a ticket from its registry when dropped.
///
/// Held by the fetch task, so the ticket is released on every exit path,
/// including a handler panic or an abort.
pub(crate) struct Release {
    in_flight: Arc<InFlight>,
    ticket: Ticket,
}

impl Release {
    pub(crate) fn new(in_flight: Arc<InFlight>, ticket: Ticket) -> Self {
        Self { in_flight, ticket }
    }
}

impl Drop for Release {
    fn drop(&mut self) {
        self.in_flight.finish(&self.ticket);
    }
}

#[derive(Debug)]
struct Entry {
    cancelled: Arc<AtomicBool>,
    abort: Option<AbortHandle>,
}

/// Registry of fetches started by one orchestrator.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    next_id: AtomicU64,
    entries: Mutex<HashMap<u64, Entry>>,
}

impl InFlight {
    /// Register a fetch before its task is spawned.
    pub(crate) fn register(&self) -> Ticket {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancelled = Arc::new(AtomicBool::new(false));
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                id,
                Entry {
                    cancelled: Arc::clone(&cancelled),
                    abort: None,
                },
            );
        }
        Ticket { id, cancelled }
    }

    /// Attach the task's abort handle.
    ///
    /// If the fetch was disposed in the meantime the task is aborted right away;
    /// if it already finished the handle is dropped.
    pub(crate) fn attach(&self, ticket: &Ticket, abort: AbortHandle) {
        if let Ok(mut entries) = self.entries.lock() {
            match entries.get_mut(&ticket.id) {
                Some(entry) => entry.abort = Some(abort),
                None if ticket.is_cancelled() => abort.abort(),
                None => {}
            }
        }
    }

    /// Forget a fetch that has delivered its outcome.
    pub(crate) fn finish(&self, ticket: &Ticket) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(&ticket.id);
        }
    }

    /// Cancel every registered fetch. Returns how many were cancelled.
    pub(crate) fn dispose_all(&self) -> usize {
        let Ok(mut entries) = self.entries.lock() else {
            return 0;
        };
        let count = entries.len();
        for (_, entry) in entries.drain() {
            entry.cancelled.store(true, Ordering::SeqCst);
            if let Some(abort) = entry.abort {
                abort.abort();
            }
        }
        count
    }

    /// Number of fetches that have not yet delivered.
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }
}
