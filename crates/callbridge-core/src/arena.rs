//! Shared memory arena that stands in for the native side's linear memory.
//!
//! Native code only ever sees [`ArenaPtr`] offsets into this arena.  The bridge
//! allocates result payloads here (the `malloc` half of the contract) and the
//! native caller later releases them with [`SharedArena::free`] (the `free`
//! half).
//!
//! # Layout rules
//!
//! - Offset `0` is the null pointer and is never handed out.
//! - Every allocation starts on an 8-byte boundary so `f32`/`f64` payloads can
//!   be read back without unaligned access.
//! - A zero-length request still returns a 1-byte allocation.  Callers test
//!   success with a single "pointer is null" check, so an empty-but-successful
//!   payload must never come back as null.
//!
//! # Thread safety
//!
//! `SharedArena` is a cheap `Clone` handle around `Arc<Mutex<..>>`.  The lock is
//! held only for the duration of one copy, never across a host call.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tracing::warn;

/// Alignment applied to every allocation.
pub const ARENA_ALIGN: u32 = 8;

/// First offset the allocator may return.  Everything below is reserved so
/// that offset 0 stays the null pointer.
const FIRST_OFFSET: u32 = ARENA_ALIGN;

/// An offset into a [`SharedArena`].  `ArenaPtr::NULL` signals failure.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ArenaPtr(pub u32);

impl ArenaPtr {
    /// The null pointer.
    pub const NULL: ArenaPtr = ArenaPtr(0);

    /// Returns `true` for the null pointer.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Returns a pointer `bytes` past `self`, or `None` on overflow.
    pub fn offset(self, bytes: u32) -> Option<ArenaPtr> {
        self.0.checked_add(bytes).map(ArenaPtr)
    }

    /// The raw offset value.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ArenaPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArenaPtr(0x{:08X})", self.0)
    }
}

/// Errors raised by arena operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArenaError {
    /// Not enough contiguous free space for the requested allocation.
    #[error("arena out of memory: requested {requested} bytes, capacity {capacity}")]
    OutOfMemory { requested: u32, capacity: u32 },

    /// A null pointer was passed where a live allocation was required.
    #[error("null arena pointer")]
    NullPointer,

    /// `free` was called with a pointer that is not the start of a live allocation.
    #[error("invalid free of {0:?}: not the start of a live allocation")]
    InvalidFree(ArenaPtr),

    /// A read or write touched bytes outside any live allocation.
    #[error("access of {len} bytes at {ptr:?} is outside a live allocation")]
    OutOfBounds { ptr: ArenaPtr, len: u32 },
}

/// Mutable state guarded by the arena lock.
struct ArenaInner {
    memory: Vec<u8>,
    /// Live allocations keyed by start offset; value is the allocated length.
    allocations: BTreeMap<u32, u32>,
}

impl ArenaInner {
    /// First-fit search for a gap of `len` bytes.
    fn find_gap(&self, len: u32) -> Option<u32> {
        let capacity = self.memory.len() as u64;
        let mut cursor = FIRST_OFFSET as u64;
        for (&start, &alen) in &self.allocations {
            if cursor + len as u64 <= start as u64 {
                return Some(cursor as u32);
            }
            cursor = align_up(start as u64 + alen as u64);
        }
        if cursor + len as u64 <= capacity {
            Some(cursor as u32)
        } else {
            None
        }
    }

    /// Checks that `[ptr, ptr + len)` lies within one live allocation and
    /// returns the byte range into `memory`.
    fn checked_range(&self, ptr: ArenaPtr, len: u32) -> Result<std::ops::Range<usize>, ArenaError> {
        if ptr.is_null() {
            return Err(ArenaError::NullPointer);
        }
        let (&start, &alen) = self
            .allocations
            .range(..=ptr.0)
            .next_back()
            .ok_or(ArenaError::OutOfBounds { ptr, len })?;
        let end = ptr.0 as u64 + len as u64;
        if end > start as u64 + alen as u64 {
            return Err(ArenaError::OutOfBounds { ptr, len });
        }
        Ok(ptr.0 as usize..end as usize)
    }
}

fn align_up(value: u64) -> u64 {
    let align = ARENA_ALIGN as u64;
    (value + align - 1) / align * align
}

/// A fixed-capacity, first-fit byte arena shared between the bridge and the
/// native caller.
///
/// # Example
///
/// ```rust
/// use callbridge_core::arena::SharedArena;
///
/// let arena = SharedArena::new(1024);
/// let ptr = arena.alloc(4).unwrap();
/// arena.write(ptr, &[1, 2, 3, 4]).unwrap();
/// assert_eq!(arena.read(ptr, 4).unwrap(), vec![1, 2, 3, 4]);
/// arena.free(ptr).unwrap();
/// ```
#[derive(Clone)]
pub struct SharedArena {
    inner: Arc<Mutex<ArenaInner>>,
    capacity: u32,
}

impl SharedArena {
    /// Creates an arena with `capacity` bytes of zeroed memory.
    pub fn new(capacity: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ArenaInner {
                memory: vec![0u8; capacity as usize],
                allocations: BTreeMap::new(),
            })),
            capacity,
        }
    }

    /// Total capacity in bytes, including the reserved null page.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, ArenaInner> {
        // A panic while the lock was held cannot leave the byte buffer in a
        // torn state that matters more than losing the whole arena would.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Allocates `len` bytes (at least one) and zero-fills them.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::OutOfMemory`] when no gap is large enough.
    pub fn alloc(&self, len: u32) -> Result<ArenaPtr, ArenaError> {
        let len = len.max(1);
        let mut inner = self.lock();
        let start = inner.find_gap(len).ok_or(ArenaError::OutOfMemory {
            requested: len,
            capacity: self.capacity,
        })?;
        inner.memory[start as usize..(start + len) as usize].fill(0);
        inner.allocations.insert(start, len);
        Ok(ArenaPtr(start))
    }

    /// Allocates space for `bytes` and copies them in.
    pub fn alloc_bytes(&self, bytes: &[u8]) -> Result<ArenaPtr, ArenaError> {
        let len = u32::try_from(bytes.len()).map_err(|_| ArenaError::OutOfMemory {
            requested: u32::MAX,
            capacity: self.capacity,
        })?;
        let ptr = self.alloc(len)?;
        self.write(ptr, bytes)?;
        Ok(ptr)
    }

    /// Releases an allocation previously returned by [`alloc`](Self::alloc).
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::InvalidFree`] for double frees and interior
    /// pointers.  Freeing null is a no-op, as with C `free`.
    pub fn free(&self, ptr: ArenaPtr) -> Result<(), ArenaError> {
        if ptr.is_null() {
            return Ok(());
        }
        let mut inner = self.lock();
        match inner.allocations.remove(&ptr.0) {
            Some(_) => Ok(()),
            None => {
                warn!("invalid arena free of {ptr:?}");
                Err(ArenaError::InvalidFree(ptr))
            }
        }
    }

    /// Copies `bytes` into the arena at `ptr`.
    pub fn write(&self, ptr: ArenaPtr, bytes: &[u8]) -> Result<(), ArenaError> {
        let mut inner = self.lock();
        let range = inner.checked_range(ptr, bytes.len() as u32)?;
        inner.memory[range].copy_from_slice(bytes);
        Ok(())
    }

    /// Copies `len` bytes out of the arena starting at `ptr`.
    pub fn read(&self, ptr: ArenaPtr, len: u32) -> Result<Vec<u8>, ArenaError> {
        let inner = self.lock();
        let range = inner.checked_range(ptr, len)?;
        Ok(inner.memory[range].to_vec())
    }

    /// Writes `samples` as little-endian `f32` values starting at `ptr`.
    pub fn write_f32s(&self, ptr: ArenaPtr, samples: &[f32]) -> Result<(), ArenaError> {
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        self.write(ptr, &bytes)
    }

    /// Reads `count` little-endian `f32` values starting at `ptr`.
    pub fn read_f32s(&self, ptr: ArenaPtr, count: u32) -> Result<Vec<f32>, ArenaError> {
        let bytes = self.read(ptr, count.saturating_mul(4))?;
        Ok(bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// Length of the live allocation starting at `ptr`, if any.
    pub fn allocation_len(&self, ptr: ArenaPtr) -> Option<u32> {
        self.lock().allocations.get(&ptr.0).copied()
    }

    /// Number of live allocations.
    pub fn live_allocations(&self) -> usize {
        self.lock().allocations.len()
    }

    /// Sum of the lengths of all live allocations.
    pub fn bytes_in_use(&self) -> u64 {
        self.lock().allocations.values().map(|&l| l as u64).sum()
    }
}

impl fmt::Debug for SharedArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedArena")
            .field("capacity", &self.capacity)
            .field("live_allocations", &self.live_allocations())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_never_returns_null() {
        // Arrange
        let arena = SharedArena::new(256);

        // Act
        let ptr = arena.alloc(16).unwrap();

        // Assert
        assert!(!ptr.is_null());
        assert_eq!(ptr.get() % ARENA_ALIGN, 0, "allocations must be 8-byte aligned");
    }

    #[test]
    fn test_zero_length_alloc_returns_one_byte() {
        let arena = SharedArena::new(64);
        let ptr = arena.alloc(0).unwrap();
        assert!(!ptr.is_null());
        assert_eq!(arena.allocation_len(ptr), Some(1));
    }

    #[test]
    fn test_alloc_is_zero_filled_after_reuse() {
        // Arrange: dirty a block, free it, allocate the same size again
        let arena = SharedArena::new(64);
        let first = arena.alloc(8).unwrap();
        arena.write(first, &[0xFF; 8]).unwrap();
        arena.free(first).unwrap();

        // Act
        let second = arena.alloc(8).unwrap();

        // Assert: first-fit hands back the same block, cleared
        assert_eq!(first, second);
        assert_eq!(arena.read(second, 8).unwrap(), vec![0u8; 8]);
    }

    #[test]
    fn test_allocations_do_not_overlap() {
        let arena = SharedArena::new(256);
        let a = arena.alloc(10).unwrap();
        let b = arena.alloc(10).unwrap();
        assert!(b.get() >= a.get() + 10);
        arena.write(a, &[1; 10]).unwrap();
        arena.write(b, &[2; 10]).unwrap();
        assert_eq!(arena.read(a, 10).unwrap(), vec![1; 10]);
    }

    #[test]
    fn test_first_fit_reuses_gap_between_allocations() {
        let arena = SharedArena::new(256);
        let a = arena.alloc(16).unwrap();
        let b = arena.alloc(16).unwrap();
        let _c = arena.alloc(16).unwrap();
        arena.free(b).unwrap();

        let d = arena.alloc(8).unwrap();

        assert_eq!(d, b, "the freed middle block must be reused first");
        assert!(d.get() > a.get());
    }

    #[test]
    fn test_out_of_memory_is_reported() {
        let arena = SharedArena::new(32);
        let result = arena.alloc(64);
        assert!(matches!(result, Err(ArenaError::OutOfMemory { requested: 64, .. })));
    }

    #[test]
    fn test_double_free_is_rejected() {
        let arena = SharedArena::new(64);
        let ptr = arena.alloc(4).unwrap();
        arena.free(ptr).unwrap();
        assert_eq!(arena.free(ptr), Err(ArenaError::InvalidFree(ptr)));
    }

    #[test]
    fn test_free_null_is_noop() {
        let arena = SharedArena::new(64);
        assert_eq!(arena.free(ArenaPtr::NULL), Ok(()));
    }

    #[test]
    fn test_write_past_allocation_end_is_out_of_bounds() {
        let arena = SharedArena::new(64);
        let ptr = arena.alloc(4).unwrap();
        let result = arena.write(ptr, &[0; 12]);
        assert!(matches!(result, Err(ArenaError::OutOfBounds { .. })));
    }

    #[test]
    fn test_read_from_freed_block_is_out_of_bounds() {
        let arena = SharedArena::new(64);
        let ptr = arena.alloc(4).unwrap();
        arena.free(ptr).unwrap();
        assert!(matches!(arena.read(ptr, 4), Err(ArenaError::OutOfBounds { .. })));
    }

    #[test]
    fn test_interior_pointer_access_is_allowed() {
        let arena = SharedArena::new(64);
        let ptr = arena.alloc(8).unwrap();
        arena.write(ptr.offset(4).unwrap(), &[9, 9, 9, 9]).unwrap();
        assert_eq!(arena.read(ptr, 8).unwrap(), vec![0, 0, 0, 0, 9, 9, 9, 9]);
    }

    #[test]
    fn test_f32_helpers_preserve_values() {
        let arena = SharedArena::new(128);
        let ptr = arena.alloc(12).unwrap();
        arena.write_f32s(ptr, &[0.5, -1.0, 0.25]).unwrap();
        assert_eq!(arena.read_f32s(ptr, 3).unwrap(), vec![0.5, -1.0, 0.25]);
    }

    #[test]
    fn test_bytes_in_use_tracks_live_allocations() {
        let arena = SharedArena::new(128);
        let a = arena.alloc(10).unwrap();
        let _b = arena.alloc(6).unwrap();
        assert_eq!(arena.bytes_in_use(), 16);
        arena.free(a).unwrap();
        assert_eq!(arena.bytes_in_use(), 6);
        assert_eq!(arena.live_allocations(), 1);
    }

    #[test]
    fn test_clones_share_memory() {
        let arena = SharedArena::new(64);
        let other = arena.clone();
        let ptr = arena.alloc_bytes(b"hi").unwrap();
        assert_eq!(other.read(ptr, 2).unwrap(), b"hi".to_vec());
    }
}
