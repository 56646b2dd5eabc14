//! Application layer for callbridge-ws.
//!
//! Knows how host requests, outcomes and resource events look on the wire.
//! Does not know about sockets or tasks.

pub mod translate;

pub use translate::{
    decode_bytes, encode_bytes, event_from_page, op_for, open_for, outcome_from_page, PageError,
};
