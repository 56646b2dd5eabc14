//! Integer-handle tables for long-lived browser objects.
//!
//! Native code never holds a reference to a browser object (an in-flight
//! HTTP request, a video element, a notification).  It holds a small
//! [`HandleId`] and the bridge looks the object up on every call.
//!
//! ```text
//!  open  ──► insert(obj) ──► HandleId(n)      n >= 1, never reused
//!  op(n) ──► get(n) / get_mut(n)              stale n → HandleError::Stale
//!  close ──► remove(n)
//! ```
//!
//! Tables that feed one id space to the browser (several contexts driving the
//! same page) draw from a shared [`HandleIds`] so their ids never collide.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Integer id of a handle-table entry.  `0` is never issued.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandleId(pub u32);

impl HandleId {
    /// The id reported to native code when an open fails.
    pub const INVALID: HandleId = HandleId(0);

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Debug for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandleError {
    /// The id was never issued by this table, or its entry was removed.
    #[error("{table} handle {id} is stale or was never opened")]
    Stale { table: &'static str, id: HandleId },

    /// All `u32` ids have been issued.
    #[error("{table} handle table exhausted")]
    Exhausted { table: &'static str },
}

/// Source of fresh handle ids.  `0` means every id has been issued.
#[derive(Debug)]
pub struct HandleIds {
    next: AtomicU32,
}

impl HandleIds {
    pub const fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }

    /// Issues the next id, or `None` once `u32::MAX` has been issued.
    pub fn issue(&self) -> Option<u32> {
        // Wraps to 0 after u32::MAX, which marks the source exhausted.
        self.next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                (n != 0).then(|| n.wrapping_add(1))
            })
            .ok()
    }
}

impl Default for HandleIds {
    fn default() -> Self {
        Self::new()
    }
}

/// A table mapping [`HandleId`]s to live objects of type `T`.
///
/// # Examples
///
/// ```rust
/// use callbridge_core::handle::HandleTable;
///
/// let mut table = HandleTable::new("video");
/// let id = table.insert("clip").unwrap();
/// assert_eq!(table.get(id), Ok(&"clip"));
/// table.remove(id).unwrap();
/// assert!(table.get(id).is_err());
/// ```
#[derive(Debug)]
pub struct HandleTable<T> {
    name: &'static str,
    entries: BTreeMap<u32, T>,
    ids: Arc<HandleIds>,
}

impl<T> HandleTable<T> {
    /// Creates an empty table with its own id space.  `name` only appears in
    /// errors and logs.
    pub fn new(name: &'static str) -> Self {
        Self::with_ids(name, Arc::new(HandleIds::new()))
    }

    /// Creates an empty table drawing ids from `ids`.
    pub fn with_ids(name: &'static str, ids: Arc<HandleIds>) -> Self {
        Self {
            name,
            entries: BTreeMap::new(),
            ids,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stores `value` under a fresh id.
    pub fn insert(&mut self, value: T) -> Result<HandleId, HandleError> {
        let id = self
            .ids
            .issue()
            .ok_or(HandleError::Exhausted { table: self.name })?;
        self.entries.insert(id, value);
        Ok(HandleId(id))
    }

    fn stale(&self, id: HandleId) -> HandleError {
        HandleError::Stale {
            table: self.name,
            id,
        }
    }

    pub fn get(&self, id: HandleId) -> Result<&T, HandleError> {
        self.entries.get(&id.0).ok_or_else(|| self.stale(id))
    }

    pub fn get_mut(&mut self, id: HandleId) -> Result<&mut T, HandleError> {
        let name = self.name;
        self.entries
            .get_mut(&id.0)
            .ok_or(HandleError::Stale { table: name, id })
    }

    pub fn remove(&mut self, id: HandleId) -> Result<T, HandleError> {
        self.entries.remove(&id.0).ok_or_else(|| self.stale(id))
    }

    pub fn contains(&self, id: HandleId) -> bool {
        self.entries.contains_key(&id.0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids of all live entries in ascending order.
    pub fn ids(&self) -> Vec<HandleId> {
        self.entries.keys().map(|&k| HandleId(k)).collect()
    }
}
