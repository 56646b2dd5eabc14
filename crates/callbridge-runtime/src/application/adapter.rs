//! Native call adapter: turns a call that looks synchronous to native code
//! into a continuation registration plus a host operation.
//!
//! Every entry point goes through the same three steps:
//!
//! 1. **Validate** the native arguments, the configured strategy, and the
//!    host's capabilities.  Any problem yields the failure record at once.
//! 2. **Register** a continuation that marshals the outcome into the
//!    caller's result region and wakes the caller, then **launch** the host
//!    operation (directly, or from the deferral queue when the browser needs
//!    a user gesture for it).
//! 3. **Wait**: `.await` under stack-suspend, `blocking_recv` on a worker
//!    thread under blocking-proxy.
//!
//! Both waiting styles share one oneshot channel; only the receiving side
//! differs.  An async caller may stop waiting (its future is dropped by a
//! timeout, `select!` or task abort); the [`SuspendGuard`] then releases the
//! registration so the next call is not rejected.
//!
//! # The completion guarantee
//!
//! A host gets a [`Completer`], not the continuation.  Firing it twice is a
//! no-op, and dropping every clone of it unfired resumes the caller with "no
//! result".  So a host that loses track of an operation, a deferred action
//! that panics before launching, or a main-thread pump that shuts down all
//! end in a failure record instead of a caller that waits forever.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use callbridge_core::{
    record_or_failure, ArenaPtr, Capability, FromOutcome, HostOutcome, HostRequest, ResultRecord,
};
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::application::context::{lock, BridgeContext};
use crate::application::host::BrowserHost;
use crate::domain::config::ResumeStrategy;
use crate::domain::deferral::DeferralQueue;
use crate::domain::slot::{Continuation, ContinuationSlot, Ticket};

// ── Completer ─────────────────────────────────────────────────────────────────

struct CompleterInner {
    slot: Arc<ContinuationSlot>,
    ticket: Ticket,
    operation: &'static str,
    fired: AtomicBool,
}

impl Drop for CompleterInner {
    fn drop(&mut self) {
        if !*self.fired.get_mut() {
            debug!("{} completer dropped unfired; resuming with failure", self.operation);
            self.slot.resume_ticket(self.ticket, None);
        }
    }
}

/// Handle a host uses to report the outcome of one operation.
///
/// Clones share state: whichever clone fires first wins.
#[derive(Clone)]
pub struct Completer {
    inner: Arc<CompleterInner>,
}

impl Completer {
    /// Creates a completer that resumes `ticket` in `slot`.
    pub fn new(slot: Arc<ContinuationSlot>, ticket: Ticket, operation: &'static str) -> Self {
        Self {
            inner: Arc::new(CompleterInner {
                slot,
                ticket,
                operation,
                fired: AtomicBool::new(false),
            }),
        }
    }

    pub fn ticket(&self) -> Ticket {
        self.inner.ticket
    }

    pub fn operation(&self) -> &'static str {
        self.inner.operation
    }

    pub fn is_fired(&self) -> bool {
        self.inner.fired.load(Ordering::SeqCst)
    }

    /// Reports success.  Returns `true` if this resumed the waiting call.
    pub fn complete(&self, outcome: HostOutcome) -> bool {
        self.fire(Some(outcome))
    }

    /// Reports failure.  `reason` is only logged.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.fire(Some(HostOutcome::Failed(reason.into())))
    }

    fn fire(&self, outcome: Option<HostOutcome>) -> bool {
        if self.inner.fired.swap(true, Ordering::SeqCst) {
            debug!(
                "duplicate completion of {} ({}) dropped",
                self.inner.operation, self.inner.ticket
            );
            return false;
        }
        self.inner.slot.resume_ticket(self.inner.ticket, outcome)
    }
}

impl fmt::Debug for Completer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completer")
            .field("operation", &self.inner.operation)
            .field("ticket", &self.inner.ticket)
            .field("fired", &self.is_fired())
            .finish()
    }
}

// ── Launching ─────────────────────────────────────────────────────────────────

/// Starts `request` on the host, via the deferral queue if it needs a gesture.
fn launch(
    host: Arc<dyn BrowserHost>,
    deferral: &DeferralQueue,
    request: HostRequest,
    completer: Completer,
) {
    if request.needs_user_activation() {
        debug!("{} waits for a user gesture", request.name());
        deferral.defer(
            request.name(),
            Box::new(move || {
                host.begin(request, completer);
                Ok(())
            }),
        );
    } else {
        host.begin(request, completer);
    }
}

/// Releases a stack-suspended registration whose caller stopped waiting.
pub(crate) struct SuspendGuard<'a> {
    ctx: &'a BridgeContext,
    operation: &'static str,
    ticket: Option<Ticket>,
}

impl SuspendGuard<'_> {
    fn disarm(mut self) {
        self.ticket = None;
    }
}

impl Drop for SuspendGuard<'_> {
    fn drop(&mut self) {
        let Some(ticket) = self.ticket.take() else {
            return;
        };
        {
            let mut wake = lock(&self.ctx.wake_ticket);
            if *wake == Some(ticket) {
                *wake = None;
            }
        }
        if self.ctx.slot.resume_ticket(ticket, None) {
            debug!("{} abandoned by its caller; {ticket} released", self.operation);
        }
    }
}

/// A registered call: the receiver to wait on and the ticket it was given.
/// `ticket` is `None` when the slot rejected the registration; the receiver
/// then already holds the failure record.
pub(crate) struct Registration<R> {
    pub(crate) rx: oneshot::Receiver<R>,
    pub(crate) ticket: Option<Ticket>,
}

impl BridgeContext {
    /// Writes the failure record into `out` (when it is a usable region) and
    /// returns it.
    pub(crate) fn fail_early<R: ResultRecord>(&self, out: ArenaPtr) -> R {
        let record = R::failure();
        if !out.is_null() {
            if let Err(e) = record.write_to(&self.arena, out) {
                error!("failure record could not be written to {out:?}: {e}");
            }
        }
        record
    }

    /// Step 1: strategy, argument and capability checks.
    pub(crate) fn preflight<R: ResultRecord>(
        &self,
        operation: &'static str,
        capability: Option<Capability>,
        out: ArenaPtr,
        expected: ResumeStrategy,
    ) -> Result<(), R> {
        let strategy = self.strategy();
        if strategy == ResumeStrategy::Stub {
            debug!("{operation} fails immediately under the stub strategy");
            return Err(self.fail_early(out));
        }
        if strategy != expected {
            error!("{operation} called through the {expected} entry point, but the bridge runs {strategy}");
            return Err(self.fail_early(out));
        }
        if out.is_null() {
            error!("{operation} called with a null result region");
            return Err(R::failure());
        }
        if let Some(capability) = capability {
            if !self.capabilities.supports(capability) {
                warn!("{operation} unavailable: host lacks {capability}");
                return Err(self.fail_early(out));
            }
        }
        Ok(())
    }

    /// Builds the continuation that marshals, writes and wakes the caller.
    fn continuation_for<R: FromOutcome>(&self, out: ArenaPtr, tx: oneshot::Sender<R>) -> Continuation {
        let arena = self.arena.clone();
        Box::new(move |outcome| {
            let record: R = record_or_failure(&arena, outcome);
            if let Err(e) = record.write_to(&arena, out) {
                error!("result record could not be written to {out:?}: {e}");
            }
            if tx.send(record).is_err() {
                debug!("caller stopped waiting before its result arrived");
            }
        })
    }

    /// Step 2a: registers the continuation in the slot.
    ///
    /// A second call while one is in flight is rejected; its continuation is
    /// resumed with failure right away, so it never blocks.
    pub(crate) fn register<R: FromOutcome>(&self, operation: &'static str, out: ArenaPtr) -> Registration<R> {
        self.register_with(operation, out, |_| {})
    }

    /// [`register`](Self::register), running `on_registered` under the slot
    /// lock.  Not run when the registration is rejected.
    pub(crate) fn register_with<R: FromOutcome>(
        &self,
        operation: &'static str,
        out: ArenaPtr,
        on_registered: impl FnOnce(Ticket),
    ) -> Registration<R> {
        let (tx, rx) = oneshot::channel();
        let continuation = self.continuation_for::<R>(out, tx);
        match self.slot.register_with(continuation, on_registered) {
            Ok(ticket) => Registration {
                rx,
                ticket: Some(ticket),
            },
            Err(rejected) => {
                error!("{operation} started while {} is still in flight", rejected.pending);
                (rejected.continuation)(None);
                Registration { rx, ticket: None }
            }
        }
    }

    /// Step 3 under stack-suspend: waits for the record.  If this future is
    /// dropped first, the registration is resumed with "no result".
    pub(crate) async fn suspend<R: ResultRecord>(
        &self,
        operation: &'static str,
        registration: Registration<R>,
        out: ArenaPtr,
    ) -> R {
        let guard = SuspendGuard {
            ctx: self,
            operation,
            ticket: registration.ticket,
        };
        let received = registration.rx.await;
        guard.disarm();
        match received {
            Ok(record) => record,
            Err(_) => self.fail_early(out),
        }
    }

    /// Stack-suspend path shared by every async entry point.
    pub(crate) async fn call_async<R: FromOutcome>(&self, request: HostRequest, out: ArenaPtr) -> R {
        let operation = request.name();
        if let Err(record) =
            self.preflight::<R>(operation, Some(request.capability()), out, ResumeStrategy::StackSuspend)
        {
            return record;
        }

        let registration = self.register::<R>(operation, out);
        if let Some(ticket) = registration.ticket {
            let completer = Completer::new(Arc::clone(&self.slot), ticket, operation);
            launch(Arc::clone(&self.host), &self.deferral, request, completer);
        }

        self.suspend(operation, registration, out).await
    }

    /// Blocking-proxy path shared by every `_blocking` entry point.
    pub(crate) fn call_blocking<R: FromOutcome>(&self, request: HostRequest, out: ArenaPtr) -> R {
        let operation = request.name();
        if let Err(record) =
            self.preflight::<R>(operation, Some(request.capability()), out, ResumeStrategy::BlockingProxy)
        {
            return record;
        }
        if tokio::runtime::Handle::try_current().is_ok() {
            error!("{operation}_blocking called from inside an async runtime");
            return self.fail_early(out);
        }
        let Some(proxy) = self.proxy.clone() else {
            error!("{operation}_blocking called but no main-thread proxy is configured");
            return self.fail_early(out);
        };

        let registration = self.register::<R>(operation, out);
        if let Some(ticket) = registration.ticket {
            let completer = Completer::new(Arc::clone(&self.slot), ticket, operation);
            let host = Arc::clone(&self.host);
            let deferral = Arc::clone(&self.deferral);
            let posted = proxy.post(Box::new(move || launch(host, &deferral, request, completer)));
            if posted.is_err() {
                // The job, and the completer inside it, were dropped: the
                // receiver below already holds the failure record.
                warn!("{operation}: main-thread pump is gone");
            }
        }

        match registration.rx.blocking_recv() {
            Ok(record) => record,
            Err(_) => self.fail_early(out),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
