//! The pending continuation slot.
//!
//! A bridge context has at most one native call in flight.  The slot stores
//! the one deferred "resume the caller" action for that call until the
//! browser side completes, then hands it out exactly once.
//!
//! ```text
//!   register(k) ──► [ ticket 7 | k ]
//!   resume_ticket(7, r) ──► take (slot now empty) ──► k(r)
//!   resume_ticket(7, r) ──► nothing pending ──► no-op
//! ```
//!
//! The continuation is always taken out of the slot (clearing it) *before*
//! it runs, and it runs after the lock is released.  A continuation may
//! therefore register the next call without deadlocking, and a re-entrant or
//! duplicate resume finds the slot already empty.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use callbridge_core::{HostOutcome, SequenceCounter};
use tracing::{debug, warn};

/// The deferred resumption of a suspended native call.
///
/// `None` means the operation ended without a result (lost, cancelled, or
/// rejected); the continuation then produces the failure record.
pub type Continuation = Box<dyn FnOnce(Option<HostOutcome>) + Send>;

/// Identifies one registration.  Issued in increasing order per slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(pub u64);

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ticket {}", self.0)
    }
}

/// A registration refused because another continuation is already pending.
///
/// The continuation is handed back so the caller can resume it with a
/// failure instead of leaving it orphaned.
pub struct RejectedContinuation {
    pub continuation: Continuation,
    /// Ticket of the registration that is still pending.
    pub pending: Ticket,
}

impl fmt::Debug for RejectedContinuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RejectedContinuation")
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

struct Pending {
    ticket: Ticket,
    continuation: Continuation,
}

/// Single-valued store for the continuation of the in-flight native call.
#[derive(Default)]
pub struct ContinuationSlot {
    pending: Mutex<Option<Pending>>,
    tickets: SequenceCounter,
}

impl ContinuationSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Pending>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stores `continuation` as the pending one.
    ///
    /// # Errors
    ///
    /// If a continuation is already pending, it is kept and `continuation` is
    /// returned inside [`RejectedContinuation`].
    pub fn register(&self, continuation: Continuation) -> Result<Ticket, RejectedContinuation> {
        self.register_with(continuation, |_| {})
    }

    /// Like [`register`](Self::register), but runs `on_registered` with the
    /// new ticket before the slot is unlocked.  Anything that resumes by
    /// ticket therefore sees the ticket no later than the registration.
    pub fn register_with(
        &self,
        continuation: Continuation,
        on_registered: impl FnOnce(Ticket),
    ) -> Result<Ticket, RejectedContinuation> {
        let mut pending = self.lock();
        if let Some(current) = pending.as_ref().map(|p| p.ticket) {
            drop(pending);
            warn!("continuation rejected: {current} is still pending");
            return Err(RejectedContinuation {
                continuation,
                pending: current,
            });
        }
        let ticket = Ticket(self.tickets.next());
        *pending = Some(Pending {
            ticket,
            continuation,
        });
        on_registered(ticket);
        drop(pending);
        debug!("registered {ticket}");
        Ok(ticket)
    }

    /// Resumes whatever is pending.  Returns `false` (and does nothing) when
    /// the slot is empty.
    pub fn resume_if_pending(&self, outcome: Option<HostOutcome>) -> bool {
        let taken = self.lock().take();
        match taken {
            Some(pending) => {
                debug!("resuming {}", pending.ticket);
                (pending.continuation)(outcome);
                true
            }
            None => {
                debug!("resume with nothing pending ignored");
                false
            }
        }
    }

    /// Resumes the pending continuation only if it was registered under
    /// `ticket`.  A completion for an older call is dropped.
    pub fn resume_ticket(&self, ticket: Ticket, outcome: Option<HostOutcome>) -> bool {
        let taken = {
            let mut pending = self.lock();
            if pending.as_ref().map(|p| p.ticket) == Some(ticket) {
                pending.take()
            } else {
                None
            }
        };
        match taken {
            Some(pending) => {
                debug!("resuming {ticket}");
                (pending.continuation)(outcome);
                true
            }
            None => {
                debug!("late completion for {ticket} dropped");
                false
            }
        }
    }

    pub fn is_pending(&self) -> bool {
        self.lock().is_some()
    }

    pub fn pending_ticket(&self) -> Option<Ticket> {
        self.lock().as_ref().map(|p| p.ticket)
    }
}

impl fmt::Debug for ContinuationSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContinuationSlot")
            .field("pending", &self.pending_ticket())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(counter: &Arc<AtomicUsize>) -> Continuation {
        let c = Arc::clone(counter);
        Box::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_resume_invokes_continuation_once() {
        // Arrange
        let slot = ContinuationSlot::new();
        let calls = Arc::new(AtomicUsize::new(0));
        slot.register(counting(&calls)).unwrap();

        // Act: five completion events for one registration
        let resumed: Vec<bool> = (0..5).map(|_| slot.resume_if_pending(None)).collect();

        // Assert
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(resumed, vec![true, false, false, false, false]);
        assert!(!slot.is_pending());
    }

    #[test]
    fn test_resume_on_empty_slot_is_noop() {
        let slot = ContinuationSlot::new();
        assert!(!slot.resume_if_pending(Some(HostOutcome::Text("x".into()))));
    }

    #[test]
    fn test_second_registration_is_rejected_and_first_kept() {
        // Arrange
        let slot = ContinuationSlot::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let ticket = slot.register(counting(&first)).unwrap();

        // Act
        let rejected = slot.register(counting(&second)).unwrap_err();

        // Assert
        assert_eq!(rejected.pending, ticket);
        assert_eq!(slot.pending_ticket(), Some(ticket));
        (rejected.continuation)(None);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        slot.resume_if_pending(None);
        assert_eq!(first.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tickets_increase() {
        let slot = ContinuationSlot::new();
        let a = slot.register(Box::new(|_| {})).unwrap();
        slot.resume_if_pending(None);
        let b = slot.register(Box::new(|_| {})).unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_stale_ticket_does_not_resume_newer_call() {
        // Arrange: call 1 completes, call 2 is registered
        let slot = ContinuationSlot::new();
        let old = slot.register(Box::new(|_| {})).unwrap();
        assert!(slot.resume_ticket(old, None));
        let calls = Arc::new(AtomicUsize::new(0));
        let current = slot.register(counting(&calls)).unwrap();

        // Act: a late duplicate completion of call 1 arrives
        let resumed = slot.resume_ticket(old, None);

        // Assert
        assert!(!resumed);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(slot.pending_ticket(), Some(current));
    }

    #[test]
    fn test_continuation_can_register_next_call() {
        // Arrange: the continuation re-enters the slot
        let slot = Arc::new(ContinuationSlot::new());
        let inner = Arc::clone(&slot);
        slot.register(Box::new(move |_| {
            inner.register(Box::new(|_| {})).unwrap();
        }))
        .unwrap();

        // Act
        slot.resume_if_pending(None);

        // Assert: no deadlock, and the follow-up call is pending
        assert!(slot.is_pending());
    }

    #[test]
    fn test_register_with_publishes_ticket_before_unlock() {
        // Arrange
        let slot = Arc::new(ContinuationSlot::new());
        let seen = Arc::new(Mutex::new(None));
        let inner = Arc::clone(&slot);
        let sink = Arc::clone(&seen);

        // Act: the hook runs while the registration is already visible
        let ticket = slot
            .register_with(Box::new(|_| {}), move |t| {
                *sink.lock().unwrap() = Some(t);
                assert!(inner.pending.try_lock().is_err());
            })
            .unwrap();

        // Assert
        assert_eq!(*seen.lock().unwrap(), Some(ticket));
        assert_eq!(slot.pending_ticket(), Some(ticket));
    }

    #[test]
    fn test_rejected_registration_skips_hook() {
        let slot = ContinuationSlot::new();
        slot.register(Box::new(|_| {})).unwrap();
        let mut ran = false;

        let result = slot.register_with(Box::new(|_| {}), |_| ran = true);

        assert!(result.is_err());
        assert!(!ran);
    }

    #[test]
    fn test_continuation_receives_outcome() {
        let slot = ContinuationSlot::new();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let ticket = slot
            .register(Box::new(move |o| *sink.lock().unwrap() = o))
            .unwrap();

        slot.resume_ticket(ticket, Some(HostOutcome::Wake { code: 3 }));

        assert_eq!(*seen.lock().unwrap(), Some(HostOutcome::Wake { code: 3 }));
    }
}
