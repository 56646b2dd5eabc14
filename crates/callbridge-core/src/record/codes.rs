//! Small-integer signal codes shared with native code.
//!
//! Permission and status outcomes are not failures of the bridge itself, so
//! they travel as codes inside a [`StatusRecord`](super::StatusRecord) rather
//! than as zeroed records.  Zero is reserved for the failure record: every
//! code a successful call can produce is non-zero.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when an integer does not map to a known code.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown {kind} code: {value}")]
pub struct SignalError {
    pub kind: &'static str,
    pub value: i32,
}

/// Browser notification permission state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    Granted = 1,
    Denied = 2,
    /// The prompt was dismissed without a decision.
    Default = 3,
}

impl PermissionStatus {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for PermissionStatus {
    type Error = SignalError;

    fn try_from(value: i32) -> Result<Self, SignalError> {
        match value {
            1 => Ok(Self::Granted),
            2 => Ok(Self::Denied),
            3 => Ok(Self::Default),
            _ => Err(SignalError {
                kind: "permission",
                value,
            }),
        }
    }
}

/// Button the user chose in a message box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageBoxResult {
    Ok = 1,
    Cancel = 2,
    Yes = 3,
    No = 4,
    /// Closed without pressing a button.
    Dismissed = 5,
}

impl MessageBoxResult {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for MessageBoxResult {
    type Error = SignalError;

    fn try_from(value: i32) -> Result<Self, SignalError> {
        match value {
            1 => Ok(Self::Ok),
            2 => Ok(Self::Cancel),
            3 => Ok(Self::Yes),
            4 => Ok(Self::No),
            5 => Ok(Self::Dismissed),
            _ => Err(SignalError {
                kind: "message box result",
                value,
            }),
        }
    }
}

/// Icon/button set requested for a message box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageBoxStyle {
    #[default]
    Info = 0,
    Warning = 1,
    Error = 2,
    /// Yes/No question.
    Question = 3,
}

impl TryFrom<i32> for MessageBoxStyle {
    type Error = SignalError;

    fn try_from(value: i32) -> Result<Self, SignalError> {
        match value {
            0 => Ok(Self::Info),
            1 => Ok(Self::Warning),
            2 => Ok(MessageBoxStyle::Error),
            3 => Ok(Self::Question),
            _ => Err(SignalError {
                kind: "message box style",
                value,
            }),
        }
    }
}

/// Event codes passed to native handle-table callbacks as the second argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceEventCode {
    Ready = 1,
    Completed = 2,
    Failed = 3,
    Clicked = 4,
    Closed = 5,
    TimeUpdate = 6,
    /// A camera switched to a new resolution.
    Resized = 7,
}

impl ResourceEventCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
