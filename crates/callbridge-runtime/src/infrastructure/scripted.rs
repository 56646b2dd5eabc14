//! Scripted in-process host for tests and headless runs.
//!
//! Allows tests to decide, per request, what the "browser" answers, and to
//! hold completions back so that late, duplicate or aborted completions can
//! be replayed at will.  No page, no network, no timers.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use callbridge_core::{
    ActionError, HandleId, HostAction, HostCapabilities, HostOutcome, HostRequest, ResourceKind,
    ResourceOpen,
};
use tracing::debug;

use crate::application::adapter::Completer;
use crate::application::context::lock;
use crate::application::host::BrowserHost;
use crate::application::resources::ResourceEvents;

#[derive(Default)]
struct Script {
    responses: HashMap<&'static str, VecDeque<HostOutcome>>,
    hold: bool,
    held: VecDeque<(HostRequest, Completer)>,
    begun: Vec<&'static str>,
    actions: Vec<HostAction>,
    refuse_activation: bool,
    opened: Vec<(HandleId, ResourceOpen)>,
    sinks: HashMap<(ResourceKind, HandleId), ResourceEvents>,
}

/// A [`BrowserHost`] whose answers are queued up front by the test.
///
/// Requests with no queued answer fail.  In hold mode every request is kept
/// (with its completer) until the test releases it.
pub struct ScriptedHost {
    capabilities: HostCapabilities,
    script: Mutex<Script>,
}

impl ScriptedHost {
    /// A host that supports every capability.
    pub fn new() -> Self {
        Self::with_capabilities(HostCapabilities::all())
    }

    pub fn with_capabilities(capabilities: HostCapabilities) -> Self {
        Self {
            capabilities,
            script: Mutex::new(Script::default()),
        }
    }

    /// Queues `outcome` as the answer to the next request named `operation`
    /// (see [`HostRequest::name`]).
    pub fn respond(&self, operation: &'static str, outcome: HostOutcome) {
        lock(&self.script)
            .responses
            .entry(operation)
            .or_default()
            .push_back(outcome);
    }

    /// In hold mode requests are kept instead of answered.
    pub fn hold(&self, on: bool) {
        lock(&self.script).hold = on;
    }

    pub fn held_count(&self) -> usize {
        lock(&self.script).held.len()
    }

    /// Removes the oldest held request, handing its completer to the caller.
    pub fn take_held(&self) -> Option<(HostRequest, Completer)> {
        lock(&self.script).held.pop_front()
    }

    /// Completes the oldest held request with `outcome`.
    pub fn complete_held(&self, outcome: HostOutcome) -> bool {
        match self.take_held() {
            Some((_, completer)) => completer.complete(outcome),
            None => false,
        }
    }

    /// Names of every request begun so far, in order.
    pub fn begun(&self) -> Vec<&'static str> {
        lock(&self.script).begun.clone()
    }

    /// Every action performed so far, in order.
    pub fn actions(&self) -> Vec<HostAction> {
        lock(&self.script).actions.clone()
    }

    /// While set, playback is refused with [`ActionError::NeedsActivation`].
    pub fn refuse_without_activation(&self, refuse: bool) {
        lock(&self.script).refuse_activation = refuse;
    }

    /// Every resource opened so far.
    pub fn opened(&self) -> Vec<(HandleId, ResourceOpen)> {
        lock(&self.script).opened.clone()
    }

    /// The event sink the bridge handed over for `handle`.
    pub fn events_for(&self, kind: ResourceKind, handle: HandleId) -> Option<ResourceEvents> {
        lock(&self.script).sinks.get(&(kind, handle)).cloned()
    }
}

impl Default for ScriptedHost {
    fn default() -> Self {
        Self::new()
    }
}

impl BrowserHost for ScriptedHost {
    fn capabilities(&self) -> HostCapabilities {
        self.capabilities.clone()
    }

    fn begin(&self, request: HostRequest, completer: Completer) {
        let name = request.name();
        let answer = {
            let mut script = lock(&self.script);
            script.begun.push(name);
            if script.hold {
                script.held.push_back((request, completer));
                debug!("scripted host holds {name}");
                return;
            }
            script.responses.get_mut(name).and_then(VecDeque::pop_front)
        };
        match answer {
            Some(outcome) => {
                completer.complete(outcome);
            }
            None => {
                completer.fail(format!("no scripted response for {name}"));
            }
        }
    }

    fn perform(&self, action: HostAction) -> Result<(), ActionError> {
        let mut script = lock(&self.script);
        if script.refuse_activation && matches!(action, HostAction::PlayVideo { .. }) {
            return Err(ActionError::NeedsActivation);
        }
        script.actions.push(action);
        Ok(())
    }

    fn open_resource(
        &self,
        handle: HandleId,
        open: ResourceOpen,
        events: ResourceEvents,
    ) -> Result<(), ActionError> {
        let mut script = lock(&self.script);
        script.sinks.insert((open.kind(), handle), events);
        script.opened.push((handle, open));
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
