//! Domain layer: state the bridge keeps between a native call and its
//! browser-side completion.
//!
//! - **`slot`**     – The single pending continuation of the in-flight call.
//! - **`deferral`** – Actions parked until the next trusted user gesture.
//! - **`config`**   – Configuration schema and the resume strategy.
//!
//! Nothing here talks to a host or spawns a thread of its own; the one
//! exception is the deferral queue's fallback timer, which borrows whatever
//! Tokio runtime the caller is already running on.

pub mod config;
pub mod deferral;
pub mod slot;
