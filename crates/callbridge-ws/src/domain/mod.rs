//! Domain layer for callbridge-ws.
//!
//! Pure types only: the JSON messages exchanged with the page and the
//! settings for serving it.  Nothing here opens a socket or spawns a task.

pub mod config;
pub mod messages;

pub use config::ServeConfig;
pub use messages::{BridgeToPage, PageOp, PageOpen, PageOutcome, PageResourceEvent, PageToBridge};
