//! Native-facing entry points.
//!
//! Each operation comes in two shapes with the same arguments:
//!
//! - `name(...)`: an `async fn` for the stack-suspend strategy,
//! - `name_blocking(...)`: a plain function for the blocking-proxy strategy,
//!   to be called from a worker thread.
//!
//! Arguments mirror what native code can pass: arena pointers and lengths,
//! integer codes, and borrowed strings.  Every entry point writes its result
//! record into `out` and also returns it; on any failure the record is the
//! all-zero one.

use callbridge_core::{
    ArenaPtr, AudioRecord, Capability, FileFilter, FileRecord, FrameRecord, HostAction,
    HostRequest, ImageRecord, MessageBoxStyle, StatusRecord, TextRecord,
};
use tracing::{debug, error, warn};

use crate::application::adapter::Registration;
use crate::application::context::{lock, BridgeContext};
use crate::domain::config::ResumeStrategy;

impl BridgeContext {
    /// Copies `len` bytes of native input out of the arena.
    fn source_bytes(&self, operation: &str, src: ArenaPtr, len: u32) -> Option<Vec<u8>> {
        if src.is_null() {
            error!("{operation} called with a null source pointer");
            return None;
        }
        match self.arena.read(src, len) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                error!("{operation} source is not readable: {e}");
                None
            }
        }
    }

    fn file_dialog_request(filter: &str, title: &str) -> Option<HostRequest> {
        match FileFilter::parse_list(filter) {
            Ok(filters) => Some(HostRequest::OpenFileDialog {
                title: title.to_string(),
                filters,
            }),
            Err(e) => {
                error!("open_file_dialog filter {filter:?} rejected: {e}");
                None
            }
        }
    }

    fn message_box_request(title: &str, text: &str, style: i32) -> Option<HostRequest> {
        match MessageBoxStyle::try_from(style) {
            Ok(style) => Some(HostRequest::ShowMessageBox {
                title: title.to_string(),
                text: text.to_string(),
                style,
            }),
            Err(e) => {
                error!("show_message_box: {e}");
                None
            }
        }
    }

    // ── Decoding ──────────────────────────────────────────────────────────

    /// Decodes an encoded audio file (`len` bytes at `src`) into two f32
    /// channels.
    pub async fn decode_audio(&self, src: ArenaPtr, len: u32, out: ArenaPtr) -> AudioRecord {
        match self.source_bytes("decode_audio", src, len) {
            Some(data) => self.call_async(HostRequest::DecodeAudio { data }, out).await,
            None => self.fail_early(out),
        }
    }

    pub fn decode_audio_blocking(&self, src: ArenaPtr, len: u32, out: ArenaPtr) -> AudioRecord {
        match self.source_bytes("decode_audio", src, len) {
            Some(data) => self.call_blocking(HostRequest::DecodeAudio { data }, out),
            None => self.fail_early(out),
        }
    }

    /// Decodes an encoded image into RGBA8 pixels.
    pub async fn decode_image(&self, src: ArenaPtr, len: u32, out: ArenaPtr) -> ImageRecord {
        match self.source_bytes("decode_image", src, len) {
            Some(data) => self.call_async(HostRequest::DecodeImage { data }, out).await,
            None => self.fail_early(out),
        }
    }

    pub fn decode_image_blocking(&self, src: ArenaPtr, len: u32, out: ArenaPtr) -> ImageRecord {
        match self.source_bytes("decode_image", src, len) {
            Some(data) => self.call_blocking(HostRequest::DecodeImage { data }, out),
            None => self.fail_early(out),
        }
    }

    // ── Gesture-gated requests ────────────────────────────────────────────

    /// Reads the clipboard.  Runs on the next trusted user gesture.
    pub async fn read_clipboard_text(&self, out: ArenaPtr) -> TextRecord {
        self.call_async(HostRequest::ReadClipboardText, out).await
    }

    pub fn read_clipboard_text_blocking(&self, out: ArenaPtr) -> TextRecord {
        self.call_blocking(HostRequest::ReadClipboardText, out)
    }

    /// Opens a file picker.  `filter` uses `Description|*.a;*.b` lines; an
    /// empty filter accepts any file.
    pub async fn open_file_dialog(&self, filter: &str, title: &str, out: ArenaPtr) -> FileRecord {
        match Self::file_dialog_request(filter, title) {
            Some(request) => self.call_async(request, out).await,
            None => self.fail_early(out),
        }
    }

    pub fn open_file_dialog_blocking(&self, filter: &str, title: &str, out: ArenaPtr) -> FileRecord {
        match Self::file_dialog_request(filter, title) {
            Some(request) => self.call_blocking(request, out),
            None => self.fail_early(out),
        }
    }

    /// Asks for notification permission.  The record's `code` is a
    /// [`PermissionStatus`](callbridge_core::PermissionStatus).
    pub async fn request_notification_permission(&self, out: ArenaPtr) -> StatusRecord {
        self.call_async(HostRequest::RequestNotificationPermission, out).await
    }

    pub fn request_notification_permission_blocking(&self, out: ArenaPtr) -> StatusRecord {
        self.call_blocking(HostRequest::RequestNotificationPermission, out)
    }

    // ── Timing and dialogs ────────────────────────────────────────────────

    /// Suspends until the next animation frame.
    pub async fn wait_animation_frame(&self, out: ArenaPtr) -> FrameRecord {
        self.call_async(HostRequest::AnimationFrame, out).await
    }

    pub fn wait_animation_frame_blocking(&self, out: ArenaPtr) -> FrameRecord {
        self.call_blocking(HostRequest::AnimationFrame, out)
    }

    /// Shows a modal message box.  `style` is a
    /// [`MessageBoxStyle`] code; the record's `code` is the button chosen.
    pub async fn show_message_box(&self, title: &str, text: &str, style: i32, out: ArenaPtr) -> StatusRecord {
        match Self::message_box_request(title, text, style) {
            Some(request) => self.call_async(request, out).await,
            None => self.fail_early(out),
        }
    }

    pub fn show_message_box_blocking(&self, title: &str, text: &str, style: i32, out: ArenaPtr) -> StatusRecord {
        match Self::message_box_request(title, text, style) {
            Some(request) => self.call_blocking(request, out),
            None => self.fail_early(out),
        }
    }

    // ── Wake ──────────────────────────────────────────────────────────────

    /// Registers a wake wait.  The wake ticket is published before the slot
    /// unlocks, so a `wake` racing the registration always finds it.
    fn register_wake(&self, out: ArenaPtr) -> Registration<StatusRecord> {
        self.register_with("wait_for_wake", out, |ticket| {
            *lock(&self.wake_ticket) = Some(ticket);
        })
    }

    /// Suspends until [`BridgeContext::wake`] is called.  The record's `code`
    /// is the wake code, which is never 0.
    pub async fn wait_for_wake(&self, out: ArenaPtr) -> StatusRecord {
        if let Err(record) = self.preflight::<StatusRecord>("wait_for_wake", None, out, ResumeStrategy::StackSuspend) {
            return record;
        }
        let registration = self.register_wake(out);
        self.suspend("wait_for_wake", registration, out).await
    }

    pub fn wait_for_wake_blocking(&self, out: ArenaPtr) -> StatusRecord {
        if let Err(record) =
            self.preflight::<StatusRecord>("wait_for_wake", None, out, ResumeStrategy::BlockingProxy)
        {
            return record;
        }
        if tokio::runtime::Handle::try_current().is_ok() {
            error!("wait_for_wake_blocking called from inside an async runtime");
            return self.fail_early(out);
        }
        let registration = self.register_wake(out);
        match registration.rx.blocking_recv() {
            Ok(record) => record,
            Err(_) => self.fail_early(out),
        }
    }

    // ── Fire-and-forget gated actions ─────────────────────────────────────

    /// Queues `action` for the next trusted gesture.  Returns `false` if the
    /// host cannot perform it at all.
    fn defer_action(&self, capability: Capability, action: HostAction) -> bool {
        if !self.capabilities.supports(capability) {
            warn!("{action:?} dropped: host lacks {capability}");
            return false;
        }
        let host = std::sync::Arc::clone(&self.host);
        let label = match &action {
            HostAction::WriteClipboardText { .. } => "write_clipboard_text",
            HostAction::SetFullscreen { .. } => "request_fullscreen",
            _ => "host_action",
        };
        debug!("{label} waits for a user gesture");
        self.deferral.defer(
            label,
            Box::new(move || host.perform(action).map_err(|e| e.to_string())),
        );
        true
    }

    /// Writes `text` to the clipboard on the next trusted gesture.
    pub fn write_clipboard_text(&self, text: &str) -> bool {
        self.defer_action(
            Capability::Clipboard,
            HostAction::WriteClipboardText {
                text: text.to_string(),
            },
        )
    }

    /// Enters or leaves fullscreen on the next trusted gesture.
    pub fn request_fullscreen(&self, enabled: bool) -> bool {
        self.defer_action(Capability::Fullscreen, HostAction::SetFullscreen { enabled })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
