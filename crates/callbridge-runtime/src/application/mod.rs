//! Application layer: the bridge's use cases.
//!
//! # What lives here? (for beginners)
//!
//! The domain layer knows how to park a continuation or a deferred action,
//! but not *when* to do it.  This layer strings those pieces together for
//! each native entry point: validate the call, register the continuation,
//! ask the host to do the browser work, and marshal the answer back.
//!
//! It depends on the [`host::BrowserHost`] trait, never on a concrete host,
//! so the same code runs against the scripted test host and a real page.
//!
//! # Sub-modules
//!
//! - **`host`**         – The `BrowserHost` trait (the seam to the browser).
//! - **`context`**      – `BridgeContext`: all per-instance state plus its builder.
//! - **`adapter`**      – `Completer` and the shared suspend/resume path.
//! - **`entry_points`** – The native-facing operations (`decode_audio`, ...).
//! - **`resources`**    – Handle tables for requests, videos and notifications.
//! - **`proxy`**        – Main-thread job queue for the blocking strategy.

pub mod adapter;
pub mod context;
pub mod entry_points;
pub mod host;
pub mod proxy;
pub mod resources;
