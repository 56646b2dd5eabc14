//! Vocabulary of browser-side operations the bridge can ask a host to perform.
//!
//! These types describe *what* is requested and *what* came back, independent
//! of how a particular host (in-process script, remote page) carries them out.
//!
//! ```text
//! native call ──► HostRequest ──► host ──► HostOutcome ──► marshal ──► record
//! ```

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::{MessageBoxResult, MessageBoxStyle, PermissionStatus};

// ── Capabilities ──────────────────────────────────────────────────────────────

/// A browser feature the host may or may not provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    AudioDecode,
    ImageDecode,
    Clipboard,
    FileDialog,
    AnimationFrame,
    Notifications,
    MessageBox,
    Fullscreen,
    Video,
    Http,
    Camera,
}

impl Capability {
    /// Every capability, in declaration order.
    pub const ALL: [Capability; 11] = [
        Capability::AudioDecode,
        Capability::ImageDecode,
        Capability::Clipboard,
        Capability::FileDialog,
        Capability::AnimationFrame,
        Capability::Notifications,
        Capability::MessageBox,
        Capability::Fullscreen,
        Capability::Video,
        Capability::Http,
        Capability::Camera,
    ];
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::AudioDecode => "audio-decode",
            Capability::ImageDecode => "image-decode",
            Capability::Clipboard => "clipboard",
            Capability::FileDialog => "file-dialog",
            Capability::AnimationFrame => "animation-frame",
            Capability::Notifications => "notifications",
            Capability::MessageBox => "message-box",
            Capability::Fullscreen => "fullscreen",
            Capability::Video => "video",
            Capability::Http => "http",
            Capability::Camera => "camera",
        };
        f.write_str(name)
    }
}

/// The set of capabilities a host reports.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HostCapabilities(pub BTreeSet<Capability>);

impl HostCapabilities {
    /// A host that supports everything.
    pub fn all() -> Self {
        Self(Capability::ALL.into_iter().collect())
    }

    /// A host that supports nothing.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    /// Capabilities in `required` that this host lacks.
    pub fn missing<'a>(&self, required: impl IntoIterator<Item = &'a Capability>) -> Vec<Capability> {
        required
            .into_iter()
            .copied()
            .filter(|c| !self.supports(*c))
            .collect()
    }
}

impl FromIterator<Capability> for HostCapabilities {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ── Trusted events ────────────────────────────────────────────────────────────

/// Kind of browser input event that carries user activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustedEventKind {
    Click,
    KeyDown,
    KeyUp,
    MouseDown,
    MouseUp,
    TouchStart,
    TouchEnd,
}

impl TrustedEventKind {
    /// Whether deferred actions can run synchronously inside this event.
    ///
    /// Touch events do not reliably grant activation to work done inline in
    /// every browser, so they flush through the short fallback timer instead.
    pub fn flushes_inline(self) -> bool {
        !matches!(self, TrustedEventKind::TouchStart | TrustedEventKind::TouchEnd)
    }
}

// ── Decoded payloads ──────────────────────────────────────────────────────────

/// Audio as decoded by the browser: planar `f32` channels.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

/// Pixel layout of a decoded image before conversion to RGBA8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Rgba8,
    Bgra8,
    Rgb8,
    Gray8,
    GrayAlpha8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
            PixelFormat::Rgb8 => 3,
            PixelFormat::GrayAlpha8 => 2,
            PixelFormat::Gray8 => 1,
        }
    }
}

/// An image as decoded by the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub pixels: Vec<u8>,
}

// ── File dialog filters ───────────────────────────────────────────────────────

/// Errors raised while parsing a native file-filter string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("filter entry {0:?} is missing the '|' separator")]
    MissingSeparator(String),
    #[error("filter entry {0:?} has no extensions")]
    NoExtensions(String),
    #[error("extension pattern {0:?} must look like '*.ext' or '*'")]
    BadPattern(String),
}

/// One entry of a file dialog filter list, e.g. `Images|*.png;*.jpg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFilter {
    pub description: String,
    /// Lower-case extensions without the dot.  Empty means "any file".
    pub extensions: Vec<String>,
}

impl FileFilter {
    /// Parses a newline-separated list of `Description|*.a;*.b` entries.
    ///
    /// An empty (or all-whitespace) string yields no filters, meaning any file
    /// may be picked.
    ///
    /// # Example
    ///
    /// ```rust
    /// use callbridge_core::operation::FileFilter;
    ///
    /// let filters = FileFilter::parse_list("Images|*.png;*.JPG").unwrap();
    /// assert_eq!(filters[0].extensions, vec!["png", "jpg"]);
    /// ```
    pub fn parse_list(list: &str) -> Result<Vec<FileFilter>, FilterError> {
        list.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(FileFilter::parse_entry)
            .collect()
    }

    fn parse_entry(entry: &str) -> Result<FileFilter, FilterError> {
        let (description, patterns) = entry
            .split_once('|')
            .ok_or_else(|| FilterError::MissingSeparator(entry.to_string()))?;

        let mut extensions = Vec::new();
        for pattern in patterns.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            if pattern == "*" || pattern == "*.*" {
                continue;
            }
            match pattern.strip_prefix("*.") {
                Some(ext) if !ext.is_empty() && !ext.contains(['*', '.', '/']) => {
                    extensions.push(ext.to_ascii_lowercase());
                }
                _ => return Err(FilterError::BadPattern(pattern.to_string())),
            }
        }

        if extensions.is_empty() && !patterns.contains('*') {
            return Err(FilterError::NoExtensions(entry.to_string()));
        }

        Ok(FileFilter {
            description: description.trim().to_string(),
            extensions,
        })
    }

    /// The browser `accept` attribute value for a list of filters.
    pub fn accept_attribute(filters: &[FileFilter]) -> String {
        filters
            .iter()
            .flat_map(|f| f.extensions.iter().map(|e| format!(".{e}")))
            .collect::<Vec<_>>()
            .join(",")
    }
}

// ── Requests and outcomes ─────────────────────────────────────────────────────

/// A one-shot operation whose completion resumes a pending native call.
#[derive(Debug, Clone, PartialEq)]
pub enum HostRequest {
    DecodeAudio { data: Vec<u8> },
    DecodeImage { data: Vec<u8> },
    ReadClipboardText,
    OpenFileDialog { title: String, filters: Vec<FileFilter> },
    AnimationFrame,
    RequestNotificationPermission,
    ShowMessageBox { title: String, text: String, style: MessageBoxStyle },
}

impl HostRequest {
    /// The capability the host must report for this request to be attempted.
    pub fn capability(&self) -> Capability {
        match self {
            HostRequest::DecodeAudio { .. } => Capability::AudioDecode,
            HostRequest::DecodeImage { .. } => Capability::ImageDecode,
            HostRequest::ReadClipboardText => Capability::Clipboard,
            HostRequest::OpenFileDialog { .. } => Capability::FileDialog,
            HostRequest::AnimationFrame => Capability::AnimationFrame,
            HostRequest::RequestNotificationPermission => Capability::Notifications,
            HostRequest::ShowMessageBox { .. } => Capability::MessageBox,
        }
    }

    /// Whether the browser gates this request behind user activation.
    pub fn needs_user_activation(&self) -> bool {
        matches!(
            self,
            HostRequest::ReadClipboardText
                | HostRequest::OpenFileDialog { .. }
                | HostRequest::RequestNotificationPermission
        )
    }

    /// Short name for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            HostRequest::DecodeAudio { .. } => "decode_audio",
            HostRequest::DecodeImage { .. } => "decode_image",
            HostRequest::ReadClipboardText => "read_clipboard_text",
            HostRequest::OpenFileDialog { .. } => "open_file_dialog",
            HostRequest::AnimationFrame => "animation_frame",
            HostRequest::RequestNotificationPermission => "request_notification_permission",
            HostRequest::ShowMessageBox { .. } => "show_message_box",
        }
    }
}

/// What a host reports when a [`HostRequest`] finishes.
#[derive(Debug, Clone, PartialEq)]
pub enum HostOutcome {
    Audio(DecodedAudio),
    Image(DecodedImage),
    Text(String),
    File { path: String, data: Vec<u8> },
    Frame { timestamp_ms: f64 },
    Permission(PermissionStatus),
    MessageBox(MessageBoxResult),
    /// Wake signal delivered to `wait_for_wake`.
    Wake { code: i32 },
    /// The operation failed; the reason is only logged.
    Failed(String),
}

impl HostOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            HostOutcome::Audio(_) => "audio",
            HostOutcome::Image(_) => "image",
            HostOutcome::Text(_) => "text",
            HostOutcome::File { .. } => "file",
            HostOutcome::Frame { .. } => "frame",
            HostOutcome::Permission(_) => "permission",
            HostOutcome::MessageBox(_) => "message_box",
            HostOutcome::Wake { .. } => "wake",
            HostOutcome::Failed(_) => "failed",
        }
    }
}

/// A fire-and-forget browser action with no continuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HostAction {
    WriteClipboardText { text: String },
    SetFullscreen { enabled: bool },
    Alert { message: String },
    AbortRequest { handle: u32 },
    PlayVideo { handle: u32 },
    PauseVideo { handle: u32 },
    ReleaseVideo { handle: u32 },
    CloseNotification { handle: u32 },
    /// Asks a camera for a new capture size; answered with
    /// [`ResourceEvent::CameraResized`].
    SetCameraResolution { handle: u32, width: u32, height: u32 },
}

impl HostAction {
    /// The resource this action ends, if any.  No events follow it.
    pub fn released_resource(&self) -> Option<(ResourceKind, u32)> {
        match self {
            HostAction::AbortRequest { handle } => Some((ResourceKind::Request, *handle)),
            HostAction::ReleaseVideo { handle } => Some((ResourceKind::Video, *handle)),
            HostAction::CloseNotification { handle } => Some((ResourceKind::Notification, *handle)),
            _ => None,
        }
    }
}

/// Error a host returns when it refuses a fire-and-forget action.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionError {
    /// The browser requires a trusted user gesture for this action.
    #[error("action requires user activation")]
    NeedsActivation,
    #[error("host does not support this action")]
    Unsupported,
    #[error("action failed: {0}")]
    Failed(String),
}

// ── Handle-table resources ────────────────────────────────────────────────────

/// Category of long-lived browser object referenced by handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Request,
    Video,
    Notification,
}

/// Parameters for creating a handle-table resource on the host.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceOpen {
    Request {
        method: String,
        url: String,
        body: Vec<u8>,
    },
    Video {
        data: Vec<u8>,
    },
    /// A live camera stream.  `0` leaves a dimension up to the browser.
    Camera {
        width: u32,
        height: u32,
    },
    Notification {
        title: String,
        body: String,
    },
}

impl ResourceOpen {
    /// Cameras live in the video table.
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceOpen::Request { .. } => ResourceKind::Request,
            ResourceOpen::Video { .. } | ResourceOpen::Camera { .. } => ResourceKind::Video,
            ResourceOpen::Notification { .. } => ResourceKind::Notification,
        }
    }
}

/// Events a host reports for a live resource, routed by handle.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceEvent {
    RequestCompleted { status: u32, body: Vec<u8> },
    RequestFailed { reason: String },
    VideoReady { width: u32, height: u32, duration_secs: f64 },
    VideoFailed { reason: String },
    VideoTimeUpdate { time_secs: f64 },
    /// A camera applied a resolution change.
    CameraResized { width: u32, height: u32 },
    NotificationClicked,
    NotificationClosed,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
