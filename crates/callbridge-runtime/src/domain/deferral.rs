//! The user-gesture deferral queue.
//!
//! Browsers only allow some operations (reading the clipboard, opening a file
//! picker, entering fullscreen, starting playback with sound) while a
//! *trusted* input event is being handled.  Native code usually asks for them
//! at some arbitrary later point, so the bridge parks the request here and
//! runs it from inside the next qualifying event.
//!
//! ```text
//!  defer(a) ─┐
//!  defer(b) ─┼─► [a, b, c] ──(trusted click)──► flush: a(), b(), c()
//!  defer(c) ─┘
//! ```
//!
//! Rules:
//!
//! - Actions run in FIFO order, each exactly once.
//! - A failing action (an `Err` or a panic) is logged and skipped; the rest
//!   still run.
//! - Actions deferred while a flush is running wait for the next flush.
//! - Touch events do not flush inline.  They arm a short fallback timer
//!   instead, and at most one such timer is armed at a time.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use callbridge_core::TrustedEventKind;
use tracing::{debug, error, warn};

/// A parked operation.  `Err` carries a reason that is logged.
pub type DeferredAction = Box<dyn FnOnce() -> Result<(), String> + Send>;

/// Outcome counts of one flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushReport {
    /// Actions that were run (including the failed ones).
    pub ran: usize,
    pub failed: usize,
}

struct Entry {
    label: String,
    action: DeferredAction,
}

/// FIFO queue of actions waiting for a trusted user gesture.
///
/// Shared as `Arc<DeferralQueue>`: trusted events arrive on the main thread
/// while actions may be deferred from any worker.
pub struct DeferralQueue {
    queue: Mutex<VecDeque<Entry>>,
    fallback_scheduled: AtomicBool,
    fallback_delay: Duration,
}

impl DeferralQueue {
    pub fn new(fallback_delay: Duration) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback_scheduled: AtomicBool::new(false),
            fallback_delay,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Entry>> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends `action`.  It runs on the next trusted event, never earlier.
    pub fn defer(&self, label: impl Into<String>, action: DeferredAction) {
        let label = label.into();
        let mut queue = self.lock();
        queue.push_back(Entry { label, action });
        debug!("deferred action queued ({} waiting)", queue.len());
    }

    /// Number of actions waiting.
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    pub fn fallback_delay(&self) -> Duration {
        self.fallback_delay
    }

    /// Runs every queued action in FIFO order and empties the queue.
    pub fn flush(&self) -> FlushReport {
        self.fallback_scheduled.store(false, Ordering::SeqCst);
        let batch = std::mem::take(&mut *self.lock());

        let mut report = FlushReport::default();
        for entry in batch {
            report.ran += 1;
            match panic::catch_unwind(AssertUnwindSafe(entry.action)) {
                Ok(Ok(())) => {}
                Ok(Err(reason)) => {
                    report.failed += 1;
                    warn!("deferred action '{}' failed: {reason}", entry.label);
                }
                Err(_) => {
                    report.failed += 1;
                    error!("deferred action '{}' panicked", entry.label);
                }
            }
        }
        if report.ran > 0 {
            debug!("flushed {} deferred actions ({} failed)", report.ran, report.failed);
        }
        report
    }

    /// Handles a trusted input event.
    ///
    /// Returns the flush report when the event flushed inline, or `None` when
    /// the flush was handed to the fallback timer (or nothing was queued).
    pub fn on_trusted_event(self: &Arc<Self>, kind: TrustedEventKind) -> Option<FlushReport> {
        if kind.flushes_inline() {
            return Some(self.flush());
        }
        self.schedule_fallback();
        None
    }

    /// Arms the fallback timer unless one is already armed.
    ///
    /// Without a Tokio runtime on the current thread the flush runs inline.
    pub fn schedule_fallback(self: &Arc<Self>) {
        if self.pending() == 0 {
            return;
        }
        if self.fallback_scheduled.swap(true, Ordering::SeqCst) {
            debug!("fallback flush already scheduled");
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let queue = Arc::clone(self);
                let delay = self.fallback_delay;
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    queue.flush();
                });
            }
            Err(_) => {
                debug!("no async runtime; flushing inline");
                self.flush();
            }
        }
    }
}

impl Default for DeferralQueue {
    fn default() -> Self {
        Self::new(Duration::from_millis(30))
    }
}

impl std::fmt::Debug for DeferralQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferralQueue")
            .field("pending", &self.pending())
            .field("fallback_delay", &self.fallback_delay)
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
