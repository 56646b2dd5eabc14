//! [`BrowserHost`] backed by a page on the other end of a WebSocket.
//!
//! Host calls never touch the socket directly.  They push [`BridgeToPage`]
//! messages into an unbounded channel that the session's writer task drains,
//! so `begin`/`perform` stay synchronous and never block the caller.
//!
//! Every `begin` gets a fresh request id.  The completer waits in `pending`
//! under that id until the page answers; an answer for an id that is not
//! pending (late, duplicate, or invented) is logged and dropped.
//!
//! A resource sink lives from `open_resource` until the handle stops taking
//! events: a terminal page event, a sink that reports it is done, or an
//! action that releases the handle.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use callbridge_core::{
    ActionError, HandleId, HostAction, HostCapabilities, HostRequest, ResourceKind, ResourceOpen,
    SequenceCounter, TrustedEventKind,
};
use callbridge_runtime::{BrowserHost, Completer, ResourceEvents};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::application::{event_from_page, op_for, open_for, outcome_from_page};
use crate::domain::messages::{BridgeToPage, PageResourceEvent, PageToBridge};

/// Page messages the host cannot handle by itself; the session forwards them
/// to the bridge context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEvent {
    Trusted(TrustedEventKind),
    Wake(i32),
}

pub struct PageHost {
    capabilities: HostCapabilities,
    outbound: mpsc::UnboundedSender<BridgeToPage>,
    request_ids: SequenceCounter,
    pending: Mutex<HashMap<u64, Completer>>,
    sinks: Mutex<HashMap<(ResourceKind, u32), ResourceEvents>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl PageHost {
    /// A host for a page that reported `capabilities` in its `Hello`.
    pub fn new(capabilities: HostCapabilities, outbound: mpsc::UnboundedSender<BridgeToPage>) -> Self {
        Self {
            capabilities,
            outbound,
            request_ids: SequenceCounter::new(),
            pending: Mutex::new(HashMap::new()),
            sinks: Mutex::new(HashMap::new()),
        }
    }

    /// Operations begun but not yet answered.
    pub fn pending_requests(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Resources that may still report events.
    pub fn live_resources(&self) -> usize {
        lock(&self.sinks).len()
    }

    /// Applies one message from the page.
    ///
    /// Completions and resource events are delivered here.  Trusted events
    /// and wake signals concern the bridge context and are handed back.
    pub fn handle_page_message(&self, msg: PageToBridge) -> Option<PageEvent> {
        match msg {
            PageToBridge::Hello { .. } => {
                warn!("page sent a second Hello; ignored");
                None
            }
            PageToBridge::Complete {
                request_id,
                outcome,
            } => {
                let Some(completer) = self.take_pending(request_id) else {
                    return None;
                };
                match outcome_from_page(outcome) {
                    Ok(outcome) => {
                        completer.complete(outcome);
                    }
                    Err(e) => {
                        warn!("request {request_id}: unusable page result: {e}");
                        completer.fail(e.to_string());
                    }
                }
                None
            }
            PageToBridge::Fail { request_id, reason } => {
                if let Some(completer) = self.take_pending(request_id) {
                    completer.fail(reason);
                }
                None
            }
            PageToBridge::TrustedEvent { event } => Some(PageEvent::Trusted(event)),
            PageToBridge::Wake { code } => Some(PageEvent::Wake(code)),
            PageToBridge::ResourceEvent {
                kind,
                handle,
                event,
            } => {
                self.route_resource_event(kind, handle, event);
                None
            }
        }
    }

    /// Fails every unanswered operation and forgets every resource.  Called
    /// once the page is gone.
    pub fn disconnect(&self) {
        let pending: Vec<Completer> = lock(&self.pending).drain().map(|(_, c)| c).collect();
        if !pending.is_empty() {
            warn!("page disconnected with {} operation(s) in flight", pending.len());
        }
        for completer in pending {
            completer.fail("page disconnected");
        }
        lock(&self.sinks).clear();
    }

    fn take_pending(&self, request_id: u64) -> Option<Completer> {
        let completer = lock(&self.pending).remove(&request_id);
        if completer.is_none() {
            debug!("answer for unknown request {request_id} dropped");
        }
        completer
    }

    fn route_resource_event(
        &self,
        kind: ResourceKind,
        handle: u32,
        event: PageResourceEvent,
    ) {
        let terminal = event.is_terminal();
        let sink = lock(&self.sinks).get(&(kind, handle)).cloned();
        let Some(sink) = sink else {
            debug!("{kind:?} event for unknown handle {handle} dropped");
            return;
        };
        let delivered = match event_from_page(event) {
            Ok(event) => sink.emit(event),
            Err(e) => {
                warn!("{kind:?} {handle}: unusable page event: {e}");
                true
            }
        };
        if terminal || !delivered {
            lock(&self.sinks).remove(&(kind, handle));
        }
    }

    fn send(&self, msg: BridgeToPage) -> Result<(), ActionError> {
        let name = msg.type_name();
        self.outbound.send(msg).map_err(|_| {
            debug!("{name} not sent: page disconnected");
            ActionError::Failed("page disconnected".to_string())
        })
    }
}

impl BrowserHost for PageHost {
    fn capabilities(&self) -> HostCapabilities {
        self.capabilities.clone()
    }

    fn begin(&self, request: HostRequest, completer: Completer) {
        let request_id = self.request_ids.next();
        let op = op_for(&request);
        lock(&self.pending).insert(request_id, completer);
        debug!("request {request_id}: begin {}", request.name());

        if self.send(BridgeToPage::Begin { request_id, op }).is_err() {
            let completer = lock(&self.pending).remove(&request_id);
            if let Some(completer) = completer {
                completer.fail("page disconnected");
            }
        }
    }

    fn perform(&self, action: HostAction) -> Result<(), ActionError> {
        if let Some(key) = action.released_resource() {
            if lock(&self.sinks).remove(&key).is_some() {
                debug!("{:?} {} released", key.0, key.1);
            }
        }
        self.send(BridgeToPage::Perform { action })
    }

    fn open_resource(
        &self,
        handle: HandleId,
        open: ResourceOpen,
        events: ResourceEvents,
    ) -> Result<(), ActionError> {
        let kind = open.kind();
        lock(&self.sinks).insert((kind, handle.0), events);
        let sent = self.send(BridgeToPage::OpenResource {
            kind,
            handle: handle.0,
            open: open_for(open),
        });
        if sent.is_err() {
            lock(&self.sinks).remove(&(kind, handle.0));
        }
        sent
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
