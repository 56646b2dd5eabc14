//! The browser seen from the bridge.
//!
//! [`BrowserHost`] is the one seam between the bridge's bookkeeping and
//! whatever actually performs browser work: a scripted in-process fake in
//! tests, or a real page driven over a WebSocket.
//!
//! The trait is callback-based rather than `async`.  A host starts the
//! operation and returns at once; when the browser finishes, possibly much
//! later and on another task, it fires the [`Completer`] it was handed.

use callbridge_core::{
    ActionError, HandleId, HostAction, HostCapabilities, HostRequest, ResourceOpen,
};

use crate::application::adapter::Completer;
use crate::application::resources::ResourceEvents;

/// Something that can carry out browser operations on the bridge's behalf.
#[cfg_attr(test, mockall::automock)]
pub trait BrowserHost: Send + Sync {
    /// Features this host can provide.  Read once when a context is built.
    fn capabilities(&self) -> HostCapabilities;

    /// Starts a one-shot operation.
    ///
    /// The host must eventually call [`Completer::complete`] or
    /// [`Completer::fail`], or drop the completer; dropping it resumes the
    /// native caller with a failure record.
    fn begin(&self, request: HostRequest, completer: Completer);

    /// Performs a fire-and-forget action.
    ///
    /// # Errors
    ///
    /// [`ActionError::NeedsActivation`] when the browser refused the action
    /// outside a trusted user gesture.
    fn perform(&self, action: HostAction) -> Result<(), ActionError>;

    /// Creates the browser object behind a handle-table entry.  Later events
    /// for it are reported through `events`.
    fn open_resource(
        &self,
        handle: HandleId,
        open: ResourceOpen,
        events: ResourceEvents,
    ) -> Result<(), ActionError>;
}
