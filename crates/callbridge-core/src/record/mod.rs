//! Result records and signal codes exchanged with native code.

pub mod codes;
pub mod layout;

pub use codes::{MessageBoxResult, MessageBoxStyle, PermissionStatus, ResourceEventCode, SignalError};
pub use layout::{
    AudioRecord, FileRecord, FrameRecord, ImageRecord, RecordError, ResponseRecord, ResultRecord,
    StatusRecord, TextRecord,
};
