//! Fixed-layout result records written into the shared arena.
//!
//! Every asynchronous bridge operation reports its outcome through one of the
//! records in this module.  A record is a small header of little-endian
//! fields; payload bytes (samples, pixels, text) live in separate arena
//! allocations that the header points at.
//!
//! # Failure convention
//!
//! A failed operation produces a record whose fields are **all zero**.  Native
//! code therefore checks a single field (the primary pointer, or the status
//! code) instead of branching per operation type.
//!
//! # Layouts
//!
//! ```text
//! AudioRecord    (20 bytes)  [left:4][right:4][frames:4][sample_rate:4][source_channels:4]
//! ImageRecord    (16 bytes)  [pixels:4][byte_len:4][width:4][height:4]
//! TextRecord     ( 8 bytes)  [text:4][byte_len:4]
//! FileRecord     (16 bytes)  [path:4][path_len:4][data:4][data_len:4]
//! FrameRecord    ( 8 bytes)  [timestamp_ms:f64]
//! StatusRecord   ( 4 bytes)  [code:i32]
//! ResponseRecord (12 bytes)  [status:4][body:4][body_len:4]
//! ```

use thiserror::Error;
use tracing::warn;

use crate::arena::{ArenaError, ArenaPtr, SharedArena};

/// Errors raised when decoding a record header from raw bytes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    /// Fewer bytes than the record's fixed size were supplied.
    #[error("record needs {needed} bytes, got {available}")]
    Truncated { needed: usize, available: usize },

    /// The arena rejected the header read or write.
    #[error(transparent)]
    Arena(#[from] ArenaError),
}

/// Common behaviour of all fixed-layout result records.
pub trait ResultRecord: Copy + PartialEq + std::fmt::Debug + Send + 'static {
    /// Size of the header in bytes.
    const SIZE: usize;

    /// The all-zero failure record.
    fn failure() -> Self;

    /// Serializes the header into exactly [`Self::SIZE`] bytes.
    fn to_bytes(&self) -> Vec<u8>;

    /// Parses a header from the first [`Self::SIZE`] bytes of `bytes`.
    fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError>;

    /// Payload allocations owned by this record.
    fn payload_ptrs(&self) -> Vec<ArenaPtr> {
        Vec::new()
    }

    /// Returns `true` when this is the failure record.
    fn is_failure(&self) -> bool {
        *self == Self::failure()
    }

    /// Writes the header into the caller-supplied region at `out`.
    fn write_to(&self, arena: &SharedArena, out: ArenaPtr) -> Result<(), RecordError> {
        arena.write(out, &self.to_bytes())?;
        Ok(())
    }

    /// Reads a header back from the arena.
    fn read_from(arena: &SharedArena, at: ArenaPtr) -> Result<Self, RecordError> {
        let bytes = arena.read(at, Self::SIZE as u32)?;
        Self::from_bytes(&bytes)
    }

    /// Frees the payload allocations.  This is the native caller's release step;
    /// the header region itself belongs to the caller.
    fn release(&self, arena: &SharedArena) {
        for ptr in self.payload_ptrs() {
            if let Err(e) = arena.free(ptr) {
                warn!("release of record payload failed: {e}");
            }
        }
    }
}

// ── Byte helpers ──────────────────────────────────────────────────────────────

fn check_len(bytes: &[u8], needed: usize) -> Result<(), RecordError> {
    if bytes.len() < needed {
        Err(RecordError::Truncated {
            needed,
            available: bytes.len(),
        })
    } else {
        Ok(())
    }
}

fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn ptr_at(bytes: &[u8], offset: usize) -> ArenaPtr {
    ArenaPtr(u32_at(bytes, offset))
}

fn non_null(ptrs: &[ArenaPtr]) -> Vec<ArenaPtr> {
    ptrs.iter().copied().filter(|p| !p.is_null()).collect()
}

// ── AudioRecord ───────────────────────────────────────────────────────────────

/// Decoded audio: two channel pointers of `frames` little-endian `f32` each.
///
/// Mono sources are duplicated so `left` and `right` are both populated;
/// `source_channels` keeps the original channel count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioRecord {
    pub left: ArenaPtr,
    pub right: ArenaPtr,
    pub frames: u32,
    pub sample_rate: u32,
    pub source_channels: u32,
}

impl ResultRecord for AudioRecord {
    const SIZE: usize = 20;

    fn failure() -> Self {
        Self::default()
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&self.left.0.to_le_bytes());
        buf.extend_from_slice(&self.right.0.to_le_bytes());
        buf.extend_from_slice(&self.frames.to_le_bytes());
        buf.extend_from_slice(&self.sample_rate.to_le_bytes());
        buf.extend_from_slice(&self.source_channels.to_le_bytes());
        buf
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        check_len(bytes, Self::SIZE)?;
        Ok(Self {
            left: ptr_at(bytes, 0),
            right: ptr_at(bytes, 4),
            frames: u32_at(bytes, 8),
            sample_rate: u32_at(bytes, 12),
            source_channels: u32_at(bytes, 16),
        })
    }

    fn payload_ptrs(&self) -> Vec<ArenaPtr> {
        non_null(&[self.left, self.right])
    }
}

// ── ImageRecord ───────────────────────────────────────────────────────────────

/// Decoded image: `width * height` RGBA8 pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageRecord {
    pub pixels: ArenaPtr,
    pub byte_len: u32,
    pub width: u32,
    pub height: u32,
}

impl ResultRecord for ImageRecord {
    const SIZE: usize = 16;

    fn failure() -> Self {
        Self::default()
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&self.pixels.0.to_le_bytes());
        buf.extend_from_slice(&self.byte_len.to_le_bytes());
        buf.extend_from_slice(&self.width.to_le_bytes());
        buf.extend_from_slice(&self.height.to_le_bytes());
        buf
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        check_len(bytes, Self::SIZE)?;
        Ok(Self {
            pixels: ptr_at(bytes, 0),
            byte_len: u32_at(bytes, 4),
            width: u32_at(bytes, 8),
            height: u32_at(bytes, 12),
        })
    }

    fn payload_ptrs(&self) -> Vec<ArenaPtr> {
        non_null(&[self.pixels])
    }
}

// ── TextRecord ────────────────────────────────────────────────────────────────

/// UTF-8 text.  The allocation holds `byte_len + 1` bytes (NUL terminated).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextRecord {
    pub text: ArenaPtr,
    pub byte_len: u32,
}

impl TextRecord {
    /// Reads the text back out of the arena.  Invalid UTF-8 is replaced.
    pub fn read_text(&self, arena: &SharedArena) -> Result<String, ArenaError> {
        let bytes = arena.read(self.text, self.byte_len)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl ResultRecord for TextRecord {
    const SIZE: usize = 8;

    fn failure() -> Self {
        Self::default()
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&self.text.0.to_le_bytes());
        buf.extend_from_slice(&self.byte_len.to_le_bytes());
        buf
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        check_len(bytes, Self::SIZE)?;
        Ok(Self {
            text: ptr_at(bytes, 0),
            byte_len: u32_at(bytes, 4),
        })
    }

    fn payload_ptrs(&self) -> Vec<ArenaPtr> {
        non_null(&[self.text])
    }
}

// ── FileRecord ────────────────────────────────────────────────────────────────

/// A file picked through a dialog: its virtual path and its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileRecord {
    pub path: ArenaPtr,
    pub path_len: u32,
    pub data: ArenaPtr,
    pub data_len: u32,
}

impl FileRecord {
    /// Reads the path string back out of the arena.
    pub fn read_path(&self, arena: &SharedArena) -> Result<String, ArenaError> {
        let bytes = arena.read(self.path, self.path_len)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl ResultRecord for FileRecord {
    const SIZE: usize = 16;

    fn failure() -> Self {
        Self::default()
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&self.path.0.to_le_bytes());
        buf.extend_from_slice(&self.path_len.to_le_bytes());
        buf.extend_from_slice(&self.data.0.to_le_bytes());
        buf.extend_from_slice(&self.data_len.to_le_bytes());
        buf
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        check_len(bytes, Self::SIZE)?;
        Ok(Self {
            path: ptr_at(bytes, 0),
            path_len: u32_at(bytes, 4),
            data: ptr_at(bytes, 8),
            data_len: u32_at(bytes, 12),
        })
    }

    fn payload_ptrs(&self) -> Vec<ArenaPtr> {
        non_null(&[self.path, self.data])
    }
}

// ── FrameRecord ───────────────────────────────────────────────────────────────

/// Animation-frame timestamp in milliseconds.  Zero means "no frame".
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameRecord {
    pub timestamp_ms: f64,
}

impl ResultRecord for FrameRecord {
    const SIZE: usize = 8;

    fn failure() -> Self {
        Self::default()
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.timestamp_ms.to_le_bytes().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        check_len(bytes, Self::SIZE)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[..8]);
        Ok(Self {
            timestamp_ms: f64::from_le_bytes(raw),
        })
    }
}

// ── StatusRecord ──────────────────────────────────────────────────────────────

/// A single signal code (permission status, message-box result, wake code).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusRecord {
    pub code: i32,
}

impl ResultRecord for StatusRecord {
    const SIZE: usize = 4;

    fn failure() -> Self {
        Self::default()
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.code.to_le_bytes().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        check_len(bytes, Self::SIZE)?;
        Ok(Self {
            code: i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        })
    }
}

// ── ResponseRecord ────────────────────────────────────────────────────────────

/// Completed HTTP request: status code and response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResponseRecord {
    pub status: u32,
    pub body: ArenaPtr,
    pub body_len: u32,
}

impl ResultRecord for ResponseRecord {
    const SIZE: usize = 12;

    fn failure() -> Self {
        Self::default()
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&self.status.to_le_bytes());
        buf.extend_from_slice(&self.body.0.to_le_bytes());
        buf.extend_from_slice(&self.body_len.to_le_bytes());
        buf
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        check_len(bytes, Self::SIZE)?;
        Ok(Self {
            status: u32_at(bytes, 0),
            body: ptr_at(bytes, 4),
            body_len: u32_at(bytes, 8),
        })
    }

    fn payload_ptrs(&self) -> Vec<ArenaPtr> {
        non_null(&[self.body])
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_record_field_offsets() {
        // Arrange
        let rec = AudioRecord {
            left: ArenaPtr(0x10),
            right: ArenaPtr(0x20),
            frames: 100,
            sample_rate: 44_100,
            source_channels: 1,
        };

        // Act
        let bytes = rec.to_bytes();

        // Assert: each field sits at its documented offset
        assert_eq!(bytes.len(), AudioRecord::SIZE);
        assert_eq!(&bytes[0..4], &0x10u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &0x20u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &100u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &44_100u32.to_le_bytes());
        assert_eq!(&bytes[16..20], &1u32.to_le_bytes());
    }

    #[test]
    fn test_failure_records_serialize_to_all_zero_bytes() {
        assert!(AudioRecord::failure().to_bytes().iter().all(|&b| b == 0));
        assert!(ImageRecord::failure().to_bytes().iter().all(|&b| b == 0));
        assert!(TextRecord::failure().to_bytes().iter().all(|&b| b == 0));
        assert!(FileRecord::failure().to_bytes().iter().all(|&b| b == 0));
        assert!(FrameRecord::failure().to_bytes().iter().all(|&b| b == 0));
        assert!(StatusRecord::failure().to_bytes().iter().all(|&b| b == 0));
        assert!(ResponseRecord::failure().to_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_truncated_header_is_rejected() {
        let result = ImageRecord::from_bytes(&[0u8; 15]);
        assert_eq!(
            result,
            Err(RecordError::Truncated {
                needed: 16,
                available: 15
            })
        );
    }

    #[test]
    fn test_frame_record_preserves_fractional_timestamp() {
        let rec = FrameRecord {
            timestamp_ms: 16.6667,
        };
        let back = FrameRecord::from_bytes(&rec.to_bytes()).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn test_status_record_negative_code() {
        let back = StatusRecord::from_bytes(&StatusRecord { code: -1 }.to_bytes()).unwrap();
        assert_eq!(back.code, -1);
    }

    #[test]
    fn test_write_to_and_read_from_arena() {
        // Arrange: the caller owns a header-sized region
        let arena = SharedArena::new(256);
        let out = arena.alloc(ImageRecord::SIZE as u32).unwrap();
        let rec = ImageRecord {
            pixels: ArenaPtr(64),
            byte_len: 16,
            width: 2,
            height: 2,
        };

        // Act
        rec.write_to(&arena, out).unwrap();

        // Assert
        assert_eq!(ImageRecord::read_from(&arena, out).unwrap(), rec);
    }

    #[test]
    fn test_write_to_undersized_region_fails() {
        let arena = SharedArena::new(256);
        let out = arena.alloc(4).unwrap();
        let result = AudioRecord::failure().write_to(&arena, out);
        assert!(matches!(result, Err(RecordError::Arena(ArenaError::OutOfBounds { .. }))));
    }

    #[test]
    fn test_release_frees_payload_but_not_header() {
        // Arrange
        let arena = SharedArena::new(256);
        let header = arena.alloc(TextRecord::SIZE as u32).unwrap();
        let text = arena.alloc_bytes(b"hello\0").unwrap();
        let rec = TextRecord { text, byte_len: 5 };

        // Act
        rec.release(&arena);

        // Assert
        assert_eq!(arena.allocation_len(text), None);
        assert!(arena.allocation_len(header).is_some());
    }

    #[test]
    fn test_release_of_failure_record_is_noop() {
        let arena = SharedArena::new(64);
        let before = arena.live_allocations();
        AudioRecord::failure().release(&arena);
        assert_eq!(arena.live_allocations(), before);
    }

    #[test]
    fn test_is_failure() {
        assert!(StatusRecord::default().is_failure());
        assert!(!StatusRecord { code: 2 }.is_failure());
    }
}
