//! Translation between the bridge's host vocabulary and page messages.
//!
//! Outbound (bridge → page) translation cannot fail: every [`HostRequest`]
//! has a page form.  Inbound translation can, because the page may send
//! malformed base64; the caller then fails the pending operation instead of
//! resuming it with garbage.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use callbridge_core::{
    DecodedAudio, DecodedImage, FileFilter, HostOutcome, HostRequest, ResourceEvent, ResourceOpen,
};
use thiserror::Error;

use crate::domain::messages::{PageOp, PageOpen, PageOutcome, PageResourceEvent};

/// Errors in the page protocol layer.
#[derive(Debug, Error)]
pub enum PageError {
    /// A payload field was not valid standard base64.
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// A frame was not a valid protocol message.
    #[error("invalid JSON frame: {0}")]
    Json(#[from] serde_json::Error),

    /// The page went away before the session finished.
    #[error("page disconnected")]
    Disconnected,

    /// The page did not send `Hello` in time.
    #[error("page did not send Hello in time")]
    HelloTimeout,

    /// The first frame of a session was something other than `Hello`.
    #[error("expected Hello as the first page message, got {0}")]
    UnexpectedFirstMessage(&'static str),
}

/// Encodes a binary payload for a JSON frame.
pub fn encode_bytes(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decodes a binary payload from a JSON frame.
pub fn decode_bytes(text: &str) -> Result<Vec<u8>, PageError> {
    Ok(STANDARD.decode(text)?)
}

// ── Bridge → Page ─────────────────────────────────────────────────────────────

/// The page form of a one-shot request.
pub fn op_for(request: &HostRequest) -> PageOp {
    match request {
        HostRequest::DecodeAudio { data } => PageOp::DecodeAudio {
            data: encode_bytes(data),
        },
        HostRequest::DecodeImage { data } => PageOp::DecodeImage {
            data: encode_bytes(data),
        },
        HostRequest::ReadClipboardText => PageOp::ReadClipboardText,
        HostRequest::OpenFileDialog { title, filters } => PageOp::OpenFileDialog {
            title: title.clone(),
            accept: FileFilter::accept_attribute(filters),
        },
        HostRequest::AnimationFrame => PageOp::AnimationFrame,
        HostRequest::RequestNotificationPermission => PageOp::RequestNotificationPermission,
        HostRequest::ShowMessageBox { title, text, style } => PageOp::ShowMessageBox {
            title: title.clone(),
            text: text.clone(),
            style: *style,
        },
    }
}

/// The page form of a resource to open.
pub fn open_for(open: ResourceOpen) -> PageOpen {
    match open {
        ResourceOpen::Request { method, url, body } => PageOpen::Request {
            method,
            url,
            body: encode_bytes(&body),
        },
        ResourceOpen::Video { data } => PageOpen::Video {
            data: encode_bytes(&data),
        },
        ResourceOpen::Camera { width, height } => PageOpen::Camera { width, height },
        ResourceOpen::Notification { title, body } => PageOpen::Notification { title, body },
    }
}

// ── Page → Bridge ─────────────────────────────────────────────────────────────

/// The host outcome behind a page `Complete`.
///
/// # Errors
///
/// [`PageError::Base64`] when an image or file payload does not decode.
pub fn outcome_from_page(outcome: PageOutcome) -> Result<HostOutcome, PageError> {
    let outcome = match outcome {
        PageOutcome::Audio {
            sample_rate,
            channels,
        } => HostOutcome::Audio(DecodedAudio {
            sample_rate,
            channels,
        }),
        PageOutcome::Image {
            width,
            height,
            format,
            pixels,
        } => HostOutcome::Image(DecodedImage {
            width,
            height,
            format,
            pixels: decode_bytes(&pixels)?,
        }),
        PageOutcome::Text { text } => HostOutcome::Text(text),
        PageOutcome::File { path, data } => HostOutcome::File {
            path,
            data: decode_bytes(&data)?,
        },
        PageOutcome::Frame { timestamp_ms } => HostOutcome::Frame { timestamp_ms },
        PageOutcome::Permission { status } => HostOutcome::Permission(status),
        PageOutcome::MessageBox { result } => HostOutcome::MessageBox(result),
    };
    Ok(outcome)
}

/// The resource event behind a page `ResourceEvent`.
pub fn event_from_page(event: PageResourceEvent) -> Result<ResourceEvent, PageError> {
    let event = match event {
        PageResourceEvent::RequestCompleted { status, body } => ResourceEvent::RequestCompleted {
            status,
            body: decode_bytes(&body)?,
        },
        PageResourceEvent::RequestFailed { reason } => ResourceEvent::RequestFailed { reason },
        PageResourceEvent::VideoReady {
            width,
            height,
            duration_secs,
        } => ResourceEvent::VideoReady {
            width,
            height,
            duration_secs,
        },
        PageResourceEvent::VideoFailed { reason } => ResourceEvent::VideoFailed { reason },
        PageResourceEvent::VideoTimeUpdate { time_secs } => {
            ResourceEvent::VideoTimeUpdate { time_secs }
        }
        PageResourceEvent::CameraResized { width, height } => {
            ResourceEvent::CameraResized { width, height }
        }
        PageResourceEvent::NotificationClicked => ResourceEvent::NotificationClicked,
        PageResourceEvent::NotificationClosed => ResourceEvent::NotificationClosed,
    };
    Ok(event)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use callbridge_core::{MessageBoxStyle, PermissionStatus, PixelFormat};

    use super::*;

    #[test]
    fn test_encode_bytes_uses_standard_alphabet_with_padding() {
        assert_eq!(encode_bytes(b"hello"), "aGVsbG8=");
        assert_eq!(encode_bytes(&[0xfb, 0xff]), "+/8=");
        assert_eq!(encode_bytes(&[]), "");
    }

    #[test]
    fn test_decode_bytes_rejects_invalid_input() {
        assert!(matches!(decode_bytes("not base64!"), Err(PageError::Base64(_))));
    }

    #[test]
    fn test_decode_audio_request_carries_base64_data() {
        // Arrange
        let request = HostRequest::DecodeAudio {
            data: b"OggS".to_vec(),
        };

        // Act
        let op = op_for(&request);

        // Assert
        assert_eq!(
            op,
            PageOp::DecodeAudio {
                data: "T2dnUw==".to_string()
            }
        );
    }

    #[test]
    fn test_file_dialog_filters_become_accept_attribute() {
        let request = HostRequest::OpenFileDialog {
            title: "Load".to_string(),
            filters: FileFilter::parse_list("Images|*.png;*.jpg\nAll files|*.*").unwrap(),
        };

        let op = op_for(&request);

        assert_eq!(
            op,
            PageOp::OpenFileDialog {
                title: "Load".to_string(),
                accept: ".png,.jpg".to_string()
            }
        );
    }

    #[test]
    fn test_message_box_keeps_style() {
        let request = HostRequest::ShowMessageBox {
            title: "Quit".to_string(),
            text: "Sure?".to_string(),
            style: MessageBoxStyle::Question,
        };

        assert!(matches!(
            op_for(&request),
            PageOp::ShowMessageBox {
                style: MessageBoxStyle::Question,
                ..
            }
        ));
    }

    #[test]
    fn test_request_open_encodes_body() {
        let open = ResourceOpen::Request {
            method: "POST".to_string(),
            url: "/save".to_string(),
            body: b"hello".to_vec(),
        };

        assert_eq!(
            open_for(open),
            PageOpen::Request {
                method: "POST".to_string(),
                url: "/save".to_string(),
                body: "aGVsbG8=".to_string()
            }
        );
    }

    #[test]
    fn test_image_outcome_decodes_pixels() {
        // Arrange
        let outcome = PageOutcome::Image {
            width: 1,
            height: 1,
            format: PixelFormat::Rgb8,
            pixels: encode_bytes(&[1, 2, 3]),
        };

        // Act
        let host = outcome_from_page(outcome).unwrap();

        // Assert
        assert_eq!(
            host,
            HostOutcome::Image(DecodedImage {
                width: 1,
                height: 1,
                format: PixelFormat::Rgb8,
                pixels: vec![1, 2, 3],
            })
        );
    }

    #[test]
    fn test_file_outcome_with_bad_base64_is_an_error() {
        let outcome = PageOutcome::File {
            path: "a.txt".to_string(),
            data: "%%%".to_string(),
        };

        assert!(outcome_from_page(outcome).is_err());
    }

    #[test]
    fn test_permission_outcome_maps_directly() {
        let host = outcome_from_page(PageOutcome::Permission {
            status: PermissionStatus::Denied,
        })
        .unwrap();

        assert_eq!(host, HostOutcome::Permission(PermissionStatus::Denied));
    }

    #[test]
    fn test_request_completed_event_decodes_body() {
        let event = event_from_page(PageResourceEvent::RequestCompleted {
            status: 404,
            body: encode_bytes(b"missing"),
        })
        .unwrap();

        assert_eq!(
            event,
            ResourceEvent::RequestCompleted {
                status: 404,
                body: b"missing".to_vec()
            }
        );
    }

    #[test]
    fn test_notification_events_map_one_to_one() {
        assert_eq!(
            event_from_page(PageResourceEvent::NotificationClosed).unwrap(),
            ResourceEvent::NotificationClosed
        );
    }

    #[test]
    fn test_camera_open_and_resize_map_across() {
        assert_eq!(
            open_for(ResourceOpen::Camera {
                width: 640,
                height: 0
            }),
            PageOpen::Camera {
                width: 640,
                height: 0
            }
        );
        assert_eq!(
            event_from_page(PageResourceEvent::CameraResized {
                width: 1280,
                height: 720
            })
            .unwrap(),
            ResourceEvent::CameraResized {
                width: 1280,
                height: 720
            }
        );
    }
}
