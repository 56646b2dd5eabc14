//! Handle-table resources: HTTP requests, videos (files and cameras) and
//! notifications.
//!
//! Unlike the one-shot entry points, these objects live across many native
//! calls and report events in any order.  Native code holds an integer
//! [`HandleId`]; events reach it through a typed callback with the
//! `(handle, event_code, user_data) -> void` signature.
//!
//! ```text
//!  host ──ResourceEvents::emit──► ResourceRouter::route ──► table entry updated
//!                                                     └──► native callback
//! ```
//!
//! [`ResourceEvents`] holds only a `Weak` reference to the router, so a host
//! that outlives its context never keeps the tables alive.
//!
//! Handle ids come from one process-wide source.  A host serving several
//! contexts can therefore key its browser objects by `(kind, id)` alone.
//!
//! Request lifecycle:
//!
//! ```text
//!  open_request ─► Opened ─send_request─► InFlight ─┬─► Completed
//!                                                  ├─► Failed
//!                                                  └─► Aborted   (later events dropped)
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, Weak};

use callbridge_core::{
    marshal_response, ActionError, ArenaPtr, CallbackIndex, Capability, DispatchTable,
    HandleError, HandleId, HandleIds, HandleTable, HostAction, MarshalError, RecordError, ResourceEvent,
    ResourceEventCode, ResourceKind, ResourceOpen, ResponseRecord, ResultRecord, Signature, Value,
};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::application::context::{lock, BridgeContext};

/// Errors from handle-table operations.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error(transparent)]
    Handle(#[from] HandleError),

    #[error("request {0} has no response yet")]
    NotComplete(HandleId),

    #[error("request {id} cannot be sent: it is {state}")]
    InvalidState { id: HandleId, state: &'static str },

    #[error("callback {0:?} is not a (handle, event, user_data) callback")]
    Callback(CallbackIndex),

    #[error("video {0} is not a camera")]
    NotCamera(HandleId),

    #[error("camera resolution {width}x{height} is invalid")]
    InvalidResolution { width: u32, height: u32 },

    #[error("host does not support {0}")]
    Unsupported(Capability),

    #[error("host refused: {0}")]
    Host(#[from] ActionError),

    #[error(transparent)]
    Marshal(#[from] MarshalError),

    #[error(transparent)]
    Record(#[from] RecordError),
}

// ── Table entries ─────────────────────────────────────────────────────────────

/// Where a native callback receives events for one handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Listener {
    callback: CallbackIndex,
    user_data: i32,
}

impl Listener {
    const NONE: Listener = Listener {
        callback: CallbackIndex::NULL,
        user_data: 0,
    };
}

/// State of an HTTP request handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestState {
    Opened,
    InFlight,
    Completed { status: u32, body: Vec<u8> },
    Failed,
    Aborted,
}

impl RequestState {
    fn name(&self) -> &'static str {
        match self {
            RequestState::Opened => "opened",
            RequestState::InFlight => "in flight",
            RequestState::Completed { .. } => "completed",
            RequestState::Failed => "failed",
            RequestState::Aborted => "aborted",
        }
    }
}

#[derive(Debug)]
struct RequestEntry {
    method: String,
    url: String,
    state: RequestState,
    listener: Listener,
}

/// What native code can ask about a video or camera.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub duration_secs: f64,
    pub current_time_secs: f64,
    pub ready: bool,
    pub playing: bool,
    /// Live camera stream rather than a video file.
    pub camera: bool,
}

#[derive(Debug)]
struct VideoEntry {
    info: VideoInfo,
    listener: Listener,
}

#[derive(Debug)]
struct NotificationEntry {
    listener: Listener,
}

// ── Router ────────────────────────────────────────────────────────────────────

fn process_handle_ids() -> Arc<HandleIds> {
    static IDS: OnceLock<Arc<HandleIds>> = OnceLock::new();
    Arc::clone(IDS.get_or_init(|| Arc::new(HandleIds::new())))
}

/// Result of applying one event to a table entry.
struct Routed {
    /// Native callback to run, with the handle it reports.
    notify: Option<(HandleId, Listener, ResourceEventCode)>,
    /// Whether the handle can still take events.
    live: bool,
}

impl Routed {
    const GONE: Routed = Routed {
        notify: None,
        live: false,
    };

    fn live(handle: HandleId, listener: Listener, code: ResourceEventCode) -> Self {
        Self {
            notify: Some((handle, listener, code)),
            live: true,
        }
    }

    fn last(handle: HandleId, listener: Listener, code: ResourceEventCode) -> Self {
        Self {
            notify: Some((handle, listener, code)),
            live: false,
        }
    }

    fn ignored() -> Self {
        Self {
            notify: None,
            live: true,
        }
    }
}

/// The three handle tables plus event routing to native callbacks.
pub struct ResourceRouter {
    requests: Mutex<HandleTable<RequestEntry>>,
    videos: Mutex<HandleTable<VideoEntry>>,
    notifications: Mutex<HandleTable<NotificationEntry>>,
    callbacks: Arc<Mutex<DispatchTable>>,
}

impl ResourceRouter {
    pub fn new(callbacks: Arc<Mutex<DispatchTable>>) -> Self {
        let ids = process_handle_ids();
        Self {
            requests: Mutex::new(HandleTable::with_ids("request", Arc::clone(&ids))),
            videos: Mutex::new(HandleTable::with_ids("video", Arc::clone(&ids))),
            notifications: Mutex::new(HandleTable::with_ids("notification", ids)),
            callbacks,
        }
    }

    /// Builds the event sink a host uses for `handle`.
    pub fn events(self: &Arc<Self>, kind: ResourceKind, handle: HandleId) -> ResourceEvents {
        ResourceEvents {
            router: Arc::downgrade(self),
            kind,
            handle,
        }
    }

    /// Applies `event` to the entry and notifies its callback.
    ///
    /// Returns `false` once the handle takes no further events: it is closed,
    /// finished, or was never opened.
    pub fn route(&self, kind: ResourceKind, handle: HandleId, event: ResourceEvent) -> bool {
        let routed = match kind {
            ResourceKind::Request => self.route_request(handle, event),
            ResourceKind::Video => self.route_video(handle, event),
            ResourceKind::Notification => self.route_notification(handle, event),
        };
        if let Some((reported, listener, code)) = routed.notify {
            self.notify(reported, listener, code);
        }
        routed.live
    }

    fn route_request(&self, handle: HandleId, event: ResourceEvent) -> Routed {
        let mut table = lock(&self.requests);
        let entry = match table.get_mut(handle) {
            Ok(entry) => entry,
            Err(e) => {
                debug!("event for closed request dropped: {e}");
                return Routed::GONE;
            }
        };
        if entry.state != RequestState::InFlight {
            debug!("event for {} request {handle} dropped", entry.state.name());
            return Routed::GONE;
        }
        match event {
            ResourceEvent::RequestCompleted { status, body } => {
                debug!("{} {} completed with {status}", entry.method, entry.url);
                entry.state = RequestState::Completed { status, body };
                Routed::last(handle, entry.listener, ResourceEventCode::Completed)
            }
            ResourceEvent::RequestFailed { reason } => {
                warn!("{} {} failed: {reason}", entry.method, entry.url);
                entry.state = RequestState::Failed;
                Routed::last(handle, entry.listener, ResourceEventCode::Failed)
            }
            _ => {
                warn!("non-request event for request {handle} ignored");
                Routed::ignored()
            }
        }
    }

    fn route_video(&self, handle: HandleId, event: ResourceEvent) -> Routed {
        let mut table = lock(&self.videos);
        let entry = match table.get_mut(handle) {
            Ok(entry) => entry,
            Err(e) => {
                debug!("event for destroyed video dropped: {e}");
                return Routed::GONE;
            }
        };
        if entry.info.camera && !entry.info.ready {
            if let ResourceEvent::VideoFailed { reason } = &event {
                // A camera that never started was refused: the handle is
                // withdrawn and native code hears about id 0.
                warn!("camera {handle} refused: {reason}");
                let listener = entry.listener;
                let _ = table.remove(handle);
                return Routed::last(HandleId::INVALID, listener, ResourceEventCode::Failed);
            }
        }
        let code = match event {
            ResourceEvent::VideoReady {
                width,
                height,
                duration_secs,
            } => {
                entry.info.width = width;
                entry.info.height = height;
                entry.info.duration_secs = duration_secs;
                entry.info.ready = true;
                ResourceEventCode::Ready
            }
            ResourceEvent::VideoFailed { reason } => {
                warn!("video {handle} failed: {reason}");
                entry.info.ready = false;
                entry.info.playing = false;
                ResourceEventCode::Failed
            }
            ResourceEvent::VideoTimeUpdate { time_secs } => {
                entry.info.current_time_secs = time_secs;
                ResourceEventCode::TimeUpdate
            }
            ResourceEvent::CameraResized { width, height } if entry.info.camera => {
                entry.info.width = width;
                entry.info.height = height;
                ResourceEventCode::Resized
            }
            _ => {
                warn!("unexpected event for video {handle} ignored");
                return Routed::ignored();
            }
        };
        Routed::live(handle, entry.listener, code)
    }

    fn route_notification(&self, handle: HandleId, event: ResourceEvent) -> Routed {
        let table = lock(&self.notifications);
        let entry = match table.get(handle) {
            Ok(entry) => entry,
            Err(e) => {
                debug!("event for closed notification dropped: {e}");
                return Routed::GONE;
            }
        };
        match event {
            ResourceEvent::NotificationClicked => {
                Routed::live(handle, entry.listener, ResourceEventCode::Clicked)
            }
            ResourceEvent::NotificationClosed => {
                Routed::last(handle, entry.listener, ResourceEventCode::Closed)
            }
            _ => {
                warn!("non-notification event for notification {handle} ignored");
                Routed::ignored()
            }
        }
    }

    /// Calls the native listener.  No table lock is held here.
    fn notify(&self, handle: HandleId, listener: Listener, code: ResourceEventCode) {
        if listener.callback.is_null() {
            return;
        }
        let callback = match lock(&self.callbacks).get(listener.callback) {
            Ok(callback) => callback,
            Err(e) => {
                error!("listener for {handle} is gone: {e}");
                return;
            }
        };
        let args = [
            Value::I32(handle.0 as i32),
            Value::I32(code.code()),
            Value::I32(listener.user_data),
        ];
        if let Err(e) = callback.call(&args) {
            error!("listener for {handle} rejected {code:?}: {e}");
        }
    }

    fn set_playing(&self, handle: HandleId, playing: bool) {
        if let Ok(entry) = lock(&self.videos).get_mut(handle) {
            entry.info.playing = playing;
        }
    }
}

impl fmt::Debug for ResourceRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRouter")
            .field("requests", &lock(&self.requests).len())
            .field("videos", &lock(&self.videos).len())
            .field("notifications", &lock(&self.notifications).len())
            .finish()
    }
}

/// Event sink for one resource, handed to the host in
/// [`BrowserHost::open_resource`](crate::application::host::BrowserHost::open_resource).
#[derive(Clone)]
pub struct ResourceEvents {
    router: Weak<ResourceRouter>,
    kind: ResourceKind,
    handle: HandleId,
}

impl ResourceEvents {
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn handle(&self) -> HandleId {
        self.handle
    }

    /// Reports `event`.  Returns `false` once this sink is useless: the
    /// handle takes no further events or the context no longer exists.
    pub fn emit(&self, event: ResourceEvent) -> bool {
        match self.router.upgrade() {
            Some(router) => router.route(self.kind, self.handle, event),
            None => {
                debug!("{:?} {} event after context shutdown dropped", self.kind, self.handle);
                false
            }
        }
    }
}

impl fmt::Debug for ResourceEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceEvents")
            .field("kind", &self.kind)
            .field("handle", &self.handle)
            .finish()
    }
}

// ── Native operations ─────────────────────────────────────────────────────────

impl BridgeContext {
    fn check_listener(&self, callback: CallbackIndex) -> Result<(), ResourceError> {
        if callback.is_null() || lock(&self.callbacks).matches(callback, &Signature::resource_event()) {
            Ok(())
        } else {
            Err(ResourceError::Callback(callback))
        }
    }

    fn require(&self, capability: Capability) -> Result<(), ResourceError> {
        if self.capabilities.supports(capability) {
            Ok(())
        } else {
            Err(ResourceError::Unsupported(capability))
        }
    }

    /// Performs a host action whose failure is only worth a warning.
    fn perform_quietly(&self, action: HostAction) {
        if let Err(e) = self.host.perform(action.clone()) {
            warn!("{action:?} failed: {e}");
        }
    }

    // ── Requests ──────────────────────────────────────────────────────────

    /// Creates a request handle.  Returns [`HandleId::INVALID`] on failure.
    pub fn open_request(&self, method: &str, url: &str) -> HandleId {
        if let Err(e) = self.require(Capability::Http) {
            warn!("open_request: {e}");
            return HandleId::INVALID;
        }
        let entry = RequestEntry {
            method: method.to_string(),
            url: url.to_string(),
            state: RequestState::Opened,
            listener: Listener::NONE,
        };
        match lock(&self.resources.requests).insert(entry) {
            Ok(id) => {
                debug!("request {id} opened: {method} {url}");
                id
            }
            Err(e) => {
                error!("open_request: {e}");
                HandleId::INVALID
            }
        }
    }

    /// Sends an opened request.  `callback` (or [`CallbackIndex::NULL`]) gets
    /// `Completed` or `Failed`.
    pub fn send_request(
        &self,
        id: HandleId,
        body: &[u8],
        callback: CallbackIndex,
        user_data: i32,
    ) -> Result<(), ResourceError> {
        self.check_listener(callback)?;
        let (method, url) = {
            let mut table = lock(&self.resources.requests);
            let entry = table.get_mut(id)?;
            if entry.state != RequestState::Opened {
                return Err(ResourceError::InvalidState {
                    id,
                    state: entry.state.name(),
                });
            }
            entry.state = RequestState::InFlight;
            entry.listener = Listener { callback, user_data };
            (entry.method.clone(), entry.url.clone())
        };

        let open = ResourceOpen::Request {
            method,
            url,
            body: body.to_vec(),
        };
        let events = self.resources.events(ResourceKind::Request, id);
        if let Err(e) = self.host.open_resource(id, open, events) {
            if let Ok(entry) = lock(&self.resources.requests).get_mut(id) {
                entry.state = RequestState::Failed;
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Aborts an in-flight request.  Aborting twice, or aborting a finished
    /// request, does nothing.
    pub fn abort_request(&self, id: HandleId) -> Result<(), ResourceError> {
        let was_in_flight = {
            let mut table = lock(&self.resources.requests);
            let entry = table.get_mut(id)?;
            if entry.state == RequestState::InFlight {
                entry.state = RequestState::Aborted;
                true
            } else {
                false
            }
        };
        if was_in_flight {
            debug!("request {id} aborted");
            self.perform_quietly(HostAction::AbortRequest { handle: id.0 });
        }
        Ok(())
    }

    pub fn request_state(&self, id: HandleId) -> Result<RequestState, ResourceError> {
        Ok(lock(&self.resources.requests).get(id)?.state.clone())
    }

    /// Writes the response of a completed request into `out`.
    ///
    /// `out` is left untouched unless the request completed.
    pub fn request_response(&self, id: HandleId, out: ArenaPtr) -> Result<ResponseRecord, ResourceError> {
        let (status, body) = match &lock(&self.resources.requests).get(id)?.state {
            RequestState::Completed { status, body } => (*status, body.clone()),
            _ => return Err(ResourceError::NotComplete(id)),
        };
        let record = marshal_response(&self.arena, status, &body)?;
        if let Err(e) = record.write_to(&self.arena, out) {
            record.release(&self.arena);
            return Err(e.into());
        }
        Ok(record)
    }

    /// Releases a request handle, aborting it first if still in flight.
    pub fn close_request(&self, id: HandleId) -> Result<(), ResourceError> {
        let entry = lock(&self.resources.requests).remove(id)?;
        if entry.state == RequestState::InFlight {
            self.perform_quietly(HostAction::AbortRequest { handle: id.0 });
        }
        debug!("request {id} closed");
        Ok(())
    }

    // ── Videos ────────────────────────────────────────────────────────────

    /// Loads a video from `len` bytes at `src`.  Returns
    /// [`HandleId::INVALID`] on failure.
    pub fn open_video(&self, src: ArenaPtr, len: u32, callback: CallbackIndex, user_data: i32) -> HandleId {
        let prepared = self
            .require(Capability::Video)
            .and_then(|()| self.check_listener(callback))
            .and_then(|()| self.arena.read(src, len).map_err(|e| ResourceError::Marshal(e.into())));
        let data = match prepared {
            Ok(data) => data,
            Err(e) => {
                error!("open_video: {e}");
                return HandleId::INVALID;
            }
        };
        let entry = VideoEntry {
            info: VideoInfo::default(),
            listener: Listener { callback, user_data },
        };
        let id = match lock(&self.resources.videos).insert(entry) {
            Ok(id) => id,
            Err(e) => {
                error!("open_video: {e}");
                return HandleId::INVALID;
            }
        };
        let events = self.resources.events(ResourceKind::Video, id);
        if let Err(e) = self.host.open_resource(id, ResourceOpen::Video { data }, events) {
            error!("open_video: host refused: {e}");
            let _ = lock(&self.resources.videos).remove(id);
            return HandleId::INVALID;
        }
        id
    }

    /// Starts playback.  When the browser wants a user gesture first, the
    /// play is retried from the deferral queue and this still returns `Ok`.
    pub fn play_video(&self, id: HandleId) -> Result<(), ResourceError> {
        lock(&self.resources.videos).get(id)?;
        match self.host.perform(HostAction::PlayVideo { handle: id.0 }) {
            Ok(()) => {
                self.resources.set_playing(id, true);
                Ok(())
            }
            Err(ActionError::NeedsActivation) => {
                debug!("video {id} play waits for a user gesture");
                let host = Arc::clone(&self.host);
                let router = Arc::downgrade(&self.resources);
                self.deferral.defer(
                    "play_video",
                    Box::new(move || {
                        host.perform(HostAction::PlayVideo { handle: id.0 })
                            .map_err(|e| e.to_string())?;
                        if let Some(router) = router.upgrade() {
                            router.set_playing(id, true);
                        }
                        Ok(())
                    }),
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn pause_video(&self, id: HandleId) -> Result<(), ResourceError> {
        lock(&self.resources.videos).get(id)?;
        self.host.perform(HostAction::PauseVideo { handle: id.0 })?;
        self.resources.set_playing(id, false);
        Ok(())
    }

    pub fn video_info(&self, id: HandleId) -> Result<VideoInfo, ResourceError> {
        Ok(lock(&self.resources.videos).get(id)?.info)
    }

    pub fn destroy_video(&self, id: HandleId) -> Result<(), ResourceError> {
        lock(&self.resources.videos).remove(id)?;
        self.perform_quietly(HostAction::ReleaseVideo { handle: id.0 });
        Ok(())
    }

    // ── Cameras ───────────────────────────────────────────────────────────

    /// Whether the host can open cameras at all.
    pub fn camera_available(&self) -> bool {
        self.capabilities.supports(Capability::Camera)
    }

    /// Opens the user's camera at `width`x`height`; `0` leaves a dimension up
    /// to the browser.  The handle lives in the video table.
    ///
    /// Returns [`HandleId::INVALID`] when the camera cannot be requested.  If
    /// the user later refuses permission, `callback` gets `Failed` for handle
    /// 0 and the returned id goes stale.
    pub fn open_camera(&self, width: u32, height: u32, callback: CallbackIndex, user_data: i32) -> HandleId {
        if let Err(e) = self
            .require(Capability::Camera)
            .and_then(|()| self.check_listener(callback))
        {
            error!("open_camera: {e}");
            return HandleId::INVALID;
        }
        let entry = VideoEntry {
            info: VideoInfo {
                camera: true,
                ..VideoInfo::default()
            },
            listener: Listener { callback, user_data },
        };
        let id = match lock(&self.resources.videos).insert(entry) {
            Ok(id) => id,
            Err(e) => {
                error!("open_camera: {e}");
                return HandleId::INVALID;
            }
        };
        let events = self.resources.events(ResourceKind::Video, id);
        if let Err(e) = self.host.open_resource(id, ResourceOpen::Camera { width, height }, events) {
            warn!("open_camera: host refused: {e}");
            let _ = lock(&self.resources.videos).remove(id);
            return HandleId::INVALID;
        }
        debug!("camera {id} requested at {width}x{height}");
        id
    }

    /// Asks a camera for a new capture size.  The callback gets `Resized`
    /// once the browser applied it.
    pub fn set_camera_resolution(&self, id: HandleId, width: u32, height: u32) -> Result<(), ResourceError> {
        if !lock(&self.resources.videos).get(id)?.info.camera {
            return Err(ResourceError::NotCamera(id));
        }
        if width == 0 || height == 0 {
            return Err(ResourceError::InvalidResolution { width, height });
        }
        self.host.perform(HostAction::SetCameraResolution {
            handle: id.0,
            width,
            height,
        })?;
        Ok(())
    }

    // ── Notifications ─────────────────────────────────────────────────────

    /// Shows a notification.  Returns [`HandleId::INVALID`] on failure.
    pub fn show_notification(&self, title: &str, body: &str, callback: CallbackIndex, user_data: i32) -> HandleId {
        if let Err(e) = self
            .require(Capability::Notifications)
            .and_then(|()| self.check_listener(callback))
        {
            error!("show_notification: {e}");
            return HandleId::INVALID;
        }
        let entry = NotificationEntry {
            listener: Listener { callback, user_data },
        };
        let id = match lock(&self.resources.notifications).insert(entry) {
            Ok(id) => id,
            Err(e) => {
                error!("show_notification: {e}");
                return HandleId::INVALID;
            }
        };
        let open = ResourceOpen::Notification {
            title: title.to_string(),
            body: body.to_string(),
        };
        let events = self.resources.events(ResourceKind::Notification, id);
        if let Err(e) = self.host.open_resource(id, open, events) {
            warn!("show_notification: host refused: {e}");
            let _ = lock(&self.resources.notifications).remove(id);
            return HandleId::INVALID;
        }
        id
    }

    pub fn close_notification(&self, id: HandleId) -> Result<(), ResourceError> {
        lock(&self.resources.notifications).remove(id)?;
        self.perform_quietly(HostAction::CloseNotification { handle: id.0 });
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
