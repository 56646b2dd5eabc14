//! # callbridge-core
//!
//! Pure data types for bridging blocking native calls to an asynchronous,
//! single-threaded browser environment.
//!
//! Nothing in this crate performs I/O, spawns tasks, or knows which browser
//! host is on the other side.  The runtime crate wires these types into a
//! `BridgeContext`; this crate only describes the data that flows through it.
//!
//! # What lives here (for beginners)
//!
//! - **`arena`** – A fixed-capacity byte arena standing in for the memory the
//!   native side shares with the bridge.  Pointers are plain `u32` offsets.
//!
//! - **`record`** – Fixed-layout result records.  An async call's outcome is
//!   written into a small header in native memory; a zeroed header means the
//!   call failed.
//!
//! - **`marshal`** – Copies decoded audio, images, text and files into the
//!   arena and builds the matching record.
//!
//! - **`operation`** – The vocabulary of requests a host can be asked to
//!   perform and the outcomes it reports.
//!
//! - **`handle`** / **`dispatch`** – Integer-id tables for long-lived browser
//!   objects and for typed native callbacks.

pub mod arena;
pub mod dispatch;
pub mod handle;
pub mod marshal;
pub mod operation;
pub mod record;
pub mod sequence;

pub use arena::{ArenaError, ArenaPtr, SharedArena};
pub use dispatch::{CallbackIndex, DispatchError, DispatchTable, Signature, Value, ValueType};
pub use handle::{HandleError, HandleId, HandleIds, HandleTable};
pub use marshal::{
    marshal_audio, marshal_file, marshal_image, marshal_response, marshal_text, record_or_failure,
    FromOutcome, MarshalError,
};
pub use operation::{
    ActionError, Capability, DecodedAudio, DecodedImage, FileFilter, FilterError, HostAction,
    HostCapabilities, HostOutcome, HostRequest, PixelFormat, ResourceEvent, ResourceKind,
    ResourceOpen, TrustedEventKind,
};
pub use record::{
    AudioRecord, FileRecord, FrameRecord, ImageRecord, MessageBoxResult, MessageBoxStyle,
    PermissionStatus, RecordError, ResourceEventCode, ResponseRecord, ResultRecord, SignalError,
    StatusRecord, TextRecord,
};
pub use sequence::SequenceCounter;
