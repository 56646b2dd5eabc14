//! Copies completed browser results into the shared arena.
//!
//! Each function here takes an owned [`HostOutcome`] (or the pieces of one),
//! allocates payload memory in the [`SharedArena`], and returns the header
//! that the adapter writes into the native caller's result region.
//!
//! Marshaling is all-or-nothing: if any step fails, every allocation made for
//! that record is freed and the caller gets the all-zero failure record.

use thiserror::Error;
use tracing::{debug, warn};

use crate::arena::{ArenaError, ArenaPtr, SharedArena};
use crate::operation::{DecodedAudio, DecodedImage, HostOutcome, PixelFormat};
use crate::record::{
    AudioRecord, FileRecord, FrameRecord, ImageRecord, ResponseRecord, ResultRecord, StatusRecord,
    TextRecord,
};

/// Reasons a completed outcome could not be turned into a record.
#[derive(Debug, Error, PartialEq)]
pub enum MarshalError {
    /// The continuation was resumed with no result at all.
    #[error("operation produced no result")]
    NoResult,

    /// The host reported failure.
    #[error("host reported failure: {0}")]
    HostFailed(String),

    /// The outcome does not belong to this record type.
    #[error("expected a {expected} outcome, got {actual}")]
    WrongKind {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("decoded audio has no channels")]
    NoChannels,

    #[error("decoded audio has a zero sample rate")]
    ZeroSampleRate,

    #[error("decoded audio channels differ in length")]
    UnequalChannels,

    #[error("image has zero width or height")]
    ZeroDimension,

    #[error("pixel buffer is {actual} bytes, expected {expected}")]
    PixelLength { expected: usize, actual: usize },

    /// The payload does not fit the 32-bit record fields.
    #[error("payload too large for a record")]
    TooLarge,

    #[error(transparent)]
    Arena(#[from] ArenaError),
}

// ── Staged allocations ────────────────────────────────────────────────────────

/// Allocations made for one record.  Freed on drop unless committed.
struct Staged<'a> {
    arena: &'a SharedArena,
    ptrs: Vec<ArenaPtr>,
}

impl<'a> Staged<'a> {
    fn new(arena: &'a SharedArena) -> Self {
        Self {
            arena,
            ptrs: Vec::new(),
        }
    }

    fn bytes(&mut self, bytes: &[u8]) -> Result<ArenaPtr, ArenaError> {
        let ptr = self.arena.alloc_bytes(bytes)?;
        self.ptrs.push(ptr);
        Ok(ptr)
    }

    /// Allocates `bytes` plus a trailing NUL.
    fn c_string(&mut self, bytes: &[u8]) -> Result<ArenaPtr, MarshalError> {
        let len = u32::try_from(bytes.len())
            .ok()
            .and_then(|n| n.checked_add(1))
            .ok_or(MarshalError::TooLarge)?;
        let ptr = self.arena.alloc(len)?;
        self.ptrs.push(ptr);
        self.arena.write(ptr, bytes)?;
        Ok(ptr)
    }

    fn samples(&mut self, samples: &[f32]) -> Result<ArenaPtr, MarshalError> {
        let len = samples
            .len()
            .checked_mul(4)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or(MarshalError::TooLarge)?;
        let ptr = self.arena.alloc(len)?;
        self.ptrs.push(ptr);
        self.arena.write_f32s(ptr, samples)?;
        Ok(ptr)
    }

    fn commit(mut self) {
        self.ptrs.clear();
    }
}

impl Drop for Staged<'_> {
    fn drop(&mut self) {
        for ptr in self.ptrs.drain(..) {
            if let Err(e) = self.arena.free(ptr) {
                warn!("cleanup of staged allocation {ptr:?} failed: {e}");
            }
        }
    }
}

fn len_u32(len: usize) -> Result<u32, MarshalError> {
    u32::try_from(len).map_err(|_| MarshalError::TooLarge)
}

// ── Per-payload marshaling ────────────────────────────────────────────────────

/// Stores decoded audio as two `f32` channels.
///
/// A mono source is duplicated into both channel slots; sources with more than
/// two channels keep the first two.
pub fn marshal_audio(arena: &SharedArena, audio: &DecodedAudio) -> Result<AudioRecord, MarshalError> {
    let first = audio.channels.first().ok_or(MarshalError::NoChannels)?;
    if audio.sample_rate == 0 {
        return Err(MarshalError::ZeroSampleRate);
    }
    if audio.channels.iter().any(|c| c.len() != first.len()) {
        return Err(MarshalError::UnequalChannels);
    }
    let second = audio.channels.get(1).unwrap_or(first);

    let mut staged = Staged::new(arena);
    let left = staged.samples(first)?;
    let right = staged.samples(second)?;
    let record = AudioRecord {
        left,
        right,
        frames: len_u32(first.len())?,
        sample_rate: audio.sample_rate,
        source_channels: len_u32(audio.channels.len())?,
    };
    staged.commit();
    Ok(record)
}

/// Converts `image` to RGBA8 and stores the pixels.
pub fn marshal_image(arena: &SharedArena, image: &DecodedImage) -> Result<ImageRecord, MarshalError> {
    let rgba = to_rgba8(image)?;
    let mut staged = Staged::new(arena);
    let pixels = staged.bytes(&rgba)?;
    let record = ImageRecord {
        pixels,
        byte_len: len_u32(rgba.len())?,
        width: image.width,
        height: image.height,
    };
    staged.commit();
    Ok(record)
}

/// Stores UTF-8 text with a trailing NUL.
pub fn marshal_text(arena: &SharedArena, text: &str) -> Result<TextRecord, MarshalError> {
    let mut staged = Staged::new(arena);
    let ptr = staged.c_string(text.as_bytes())?;
    let record = TextRecord {
        text: ptr,
        byte_len: len_u32(text.len())?,
    };
    staged.commit();
    Ok(record)
}

/// Stores a picked file's path (NUL terminated) and its bytes.
pub fn marshal_file(arena: &SharedArena, path: &str, data: &[u8]) -> Result<FileRecord, MarshalError> {
    let mut staged = Staged::new(arena);
    let path_ptr = staged.c_string(path.as_bytes())?;
    let data_ptr = staged.bytes(data)?;
    let record = FileRecord {
        path: path_ptr,
        path_len: len_u32(path.len())?,
        data: data_ptr,
        data_len: len_u32(data.len())?,
    };
    staged.commit();
    Ok(record)
}

/// Stores a completed HTTP response body.
pub fn marshal_response(arena: &SharedArena, status: u32, body: &[u8]) -> Result<ResponseRecord, MarshalError> {
    let mut staged = Staged::new(arena);
    let ptr = staged.bytes(body)?;
    let record = ResponseRecord {
        status,
        body: ptr,
        body_len: len_u32(body.len())?,
    };
    staged.commit();
    Ok(record)
}

/// Converts any supported pixel layout to tightly packed RGBA8.
pub fn to_rgba8(image: &DecodedImage) -> Result<Vec<u8>, MarshalError> {
    if image.width == 0 || image.height == 0 {
        return Err(MarshalError::ZeroDimension);
    }
    let pixel_count = (image.width as usize)
        .checked_mul(image.height as usize)
        .ok_or(MarshalError::TooLarge)?;
    let bpp = image.format.bytes_per_pixel();
    let expected = pixel_count.checked_mul(bpp).ok_or(MarshalError::TooLarge)?;
    if image.pixels.len() != expected {
        return Err(MarshalError::PixelLength {
            expected,
            actual: image.pixels.len(),
        });
    }

    let src = image.pixels.chunks_exact(bpp);
    let rgba = match image.format {
        PixelFormat::Rgba8 => image.pixels.clone(),
        PixelFormat::Bgra8 => src.flat_map(|p| [p[2], p[1], p[0], p[3]]).collect(),
        PixelFormat::Rgb8 => src.flat_map(|p| [p[0], p[1], p[2], 0xFF]).collect(),
        PixelFormat::Gray8 => src.flat_map(|p| [p[0], p[0], p[0], 0xFF]).collect(),
        PixelFormat::GrayAlpha8 => src.flat_map(|p| [p[0], p[0], p[0], p[1]]).collect(),
    };
    Ok(rgba)
}

// ── Outcome → record ──────────────────────────────────────────────────────────

/// Records that can be produced from a [`HostOutcome`].
pub trait FromOutcome: ResultRecord {
    /// Outcome kind this record accepts, for diagnostics.
    const EXPECTS: &'static str;

    fn from_outcome(arena: &SharedArena, outcome: HostOutcome) -> Result<Self, MarshalError>;
}

fn wrong_kind(expected: &'static str, outcome: &HostOutcome) -> MarshalError {
    match outcome {
        HostOutcome::Failed(reason) => MarshalError::HostFailed(reason.clone()),
        other => MarshalError::WrongKind {
            expected,
            actual: other.kind(),
        },
    }
}

impl FromOutcome for AudioRecord {
    const EXPECTS: &'static str = "audio";

    fn from_outcome(arena: &SharedArena, outcome: HostOutcome) -> Result<Self, MarshalError> {
        match outcome {
            HostOutcome::Audio(audio) => marshal_audio(arena, &audio),
            other => Err(wrong_kind(Self::EXPECTS, &other)),
        }
    }
}

impl FromOutcome for ImageRecord {
    const EXPECTS: &'static str = "image";

    fn from_outcome(arena: &SharedArena, outcome: HostOutcome) -> Result<Self, MarshalError> {
        match outcome {
            HostOutcome::Image(image) => marshal_image(arena, &image),
            other => Err(wrong_kind(Self::EXPECTS, &other)),
        }
    }
}

impl FromOutcome for TextRecord {
    const EXPECTS: &'static str = "text";

    fn from_outcome(arena: &SharedArena, outcome: HostOutcome) -> Result<Self, MarshalError> {
        match outcome {
            HostOutcome::Text(text) => marshal_text(arena, &text),
            other => Err(wrong_kind(Self::EXPECTS, &other)),
        }
    }
}

impl FromOutcome for FileRecord {
    const EXPECTS: &'static str = "file";

    fn from_outcome(arena: &SharedArena, outcome: HostOutcome) -> Result<Self, MarshalError> {
        match outcome {
            HostOutcome::File { path, data } => marshal_file(arena, &path, &data),
            other => Err(wrong_kind(Self::EXPECTS, &other)),
        }
    }
}

impl FromOutcome for FrameRecord {
    const EXPECTS: &'static str = "frame";

    fn from_outcome(_arena: &SharedArena, outcome: HostOutcome) -> Result<Self, MarshalError> {
        match outcome {
            HostOutcome::Frame { timestamp_ms } => Ok(FrameRecord { timestamp_ms }),
            other => Err(wrong_kind(Self::EXPECTS, &other)),
        }
    }
}

impl FromOutcome for StatusRecord {
    const EXPECTS: &'static str = "status";

    fn from_outcome(_arena: &SharedArena, outcome: HostOutcome) -> Result<Self, MarshalError> {
        match outcome {
            HostOutcome::Permission(status) => Ok(StatusRecord { code: status.code() }),
            HostOutcome::MessageBox(result) => Ok(StatusRecord { code: result.code() }),
            HostOutcome::Wake { code } => Ok(StatusRecord { code }),
            other => Err(wrong_kind(Self::EXPECTS, &other)),
        }
    }
}

/// Builds a record from an optional outcome, falling back to the failure
/// record.  `None` means the continuation was resumed without a result.
pub fn record_or_failure<R: FromOutcome>(arena: &SharedArena, outcome: Option<HostOutcome>) -> R {
    let result = match outcome {
        Some(outcome) => R::from_outcome(arena, outcome),
        None => Err(MarshalError::NoResult),
    };
    match result {
        Ok(record) => record,
        Err(MarshalError::Arena(e)) => {
            warn!("{} record could not be allocated: {e}", R::EXPECTS);
            R::failure()
        }
        Err(e) => {
            debug!("{} record failed: {e}", R::EXPECTS);
            R::failure()
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
