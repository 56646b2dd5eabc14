//! JSON message types for the page protocol.
//!
//! The bridge and the page exchange WebSocket text frames, one JSON object per
//! frame.  Every object carries a `"type"` field naming the variant; all other
//! fields sit next to it:
//!
//! ```json
//! {"type":"Begin","request_id":3,"op":{"op":"decode_image","data":"iVBORw0K..."}}
//! {"type":"Complete","request_id":3,"outcome":{"kind":"image","width":2,"height":2,"format":"rgba8","pixels":"AAEC..."}}
//! ```
//!
//! # Message flow
//!
//! ```text
//! Bridge → Page:  Begin · Perform · OpenResource · Alert
//! Page → Bridge:  Hello · Complete · Fail · TrustedEvent · Wake · ResourceEvent
//! ```
//!
//! The first frame a page sends must be `Hello`.  Byte payloads are standard
//! base64 strings; audio samples are plain float arrays.
//!
//! Two enums, one per direction, so that a page-only message can never be
//! sent to the page by mistake.

use callbridge_core::{
    Capability, HostAction, MessageBoxResult, MessageBoxStyle, PermissionStatus, PixelFormat,
    ResourceKind, TrustedEventKind,
};
use serde::{Deserialize, Serialize};

// ── Bridge → Page ─────────────────────────────────────────────────────────────

/// Everything the bridge sends to the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeToPage {
    /// Start a one-shot operation.  The page answers with `Complete` or `Fail`
    /// carrying the same `request_id`.
    Begin { request_id: u64, op: PageOp },

    /// Fire-and-forget action.  No answer is expected.
    Perform { action: HostAction },

    /// Create the browser object behind a handle.  Later events for it come
    /// back as `ResourceEvent` with the same `kind` and `handle`.
    OpenResource {
        kind: ResourceKind,
        handle: u32,
        open: PageOpen,
    },

    /// Show a diagnostic to the user.
    Alert { message: String },
}

impl BridgeToPage {
    /// Short variant name for log lines.  Never includes payload contents.
    pub fn type_name(&self) -> &'static str {
        match self {
            BridgeToPage::Begin { .. } => "Begin",
            BridgeToPage::Perform { .. } => "Perform",
            BridgeToPage::OpenResource { .. } => "OpenResource",
            BridgeToPage::Alert { .. } => "Alert",
        }
    }
}

/// A one-shot operation as the page sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PageOp {
    /// `data` is the encoded audio file, base64.
    DecodeAudio { data: String },
    /// `data` is the encoded image file, base64.
    DecodeImage { data: String },
    ReadClipboardText,
    /// `accept` is the value for the file input's `accept` attribute; empty
    /// means any file.
    OpenFileDialog { title: String, accept: String },
    AnimationFrame,
    RequestNotificationPermission,
    ShowMessageBox {
        title: String,
        text: String,
        style: MessageBoxStyle,
    },
}

/// Parameters of a handle-table resource as the page sees them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resource", rename_all = "snake_case")]
pub enum PageOpen {
    Request {
        method: String,
        url: String,
        /// Request body, base64.
        body: String,
    },
    Video {
        /// Encoded video file, base64.
        data: String,
    },
    /// `getUserMedia` stream; `0` leaves a dimension to the browser.
    Camera { width: u32, height: u32 },
    Notification { title: String, body: String },
}

// ── Page → Bridge ─────────────────────────────────────────────────────────────

/// Everything the page sends to the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PageToBridge {
    /// First frame of every session: the browser features this page offers.
    Hello { capabilities: Vec<Capability> },

    /// A `Begin` finished successfully.
    Complete { request_id: u64, outcome: PageOutcome },

    /// A `Begin` failed.  `reason` is only logged.
    Fail { request_id: u64, reason: String },

    /// The page is inside the handler of a trusted user gesture.
    TrustedEvent { event: TrustedEventKind },

    /// Wake signal for a native caller waiting in `wait_for_wake`.
    Wake { code: i32 },

    /// Something happened to a handle-table resource.
    ResourceEvent {
        kind: ResourceKind,
        handle: u32,
        event: PageResourceEvent,
    },
}

impl PageToBridge {
    /// Short variant name for log lines.  Never includes payload contents
    /// (clipboard text in particular).
    pub fn type_name(&self) -> &'static str {
        match self {
            PageToBridge::Hello { .. } => "Hello",
            PageToBridge::Complete { .. } => "Complete",
            PageToBridge::Fail { .. } => "Fail",
            PageToBridge::TrustedEvent { .. } => "TrustedEvent",
            PageToBridge::Wake { .. } => "Wake",
            PageToBridge::ResourceEvent { .. } => "ResourceEvent",
        }
    }
}

/// Successful result of a `Begin`, tagged by `"kind"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageOutcome {
    /// Planar samples, one array per channel.
    Audio {
        sample_rate: u32,
        channels: Vec<Vec<f32>>,
    },
    Image {
        width: u32,
        height: u32,
        format: PixelFormat,
        /// Raw pixel rows, base64.
        pixels: String,
    },
    Text { text: String },
    File {
        path: String,
        /// File contents, base64.
        data: String,
    },
    Frame { timestamp_ms: f64 },
    Permission { status: PermissionStatus },
    MessageBox { result: MessageBoxResult },
}

/// Resource event as reported by the page, tagged by `"event"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PageResourceEvent {
    RequestCompleted {
        status: u32,
        /// Response body, base64.
        body: String,
    },
    RequestFailed { reason: String },
    VideoReady {
        width: u32,
        height: u32,
        duration_secs: f64,
    },
    VideoFailed { reason: String },
    VideoTimeUpdate { time_secs: f64 },
    CameraResized { width: u32, height: u32 },
    NotificationClicked,
    NotificationClosed,
}

impl PageResourceEvent {
    /// Whether no further events can follow for the same handle.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PageResourceEvent::RequestCompleted { .. }
                | PageResourceEvent::RequestFailed { .. }
                | PageResourceEvent::NotificationClosed
        )
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
