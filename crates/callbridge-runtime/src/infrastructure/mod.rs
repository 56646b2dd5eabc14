//! Infrastructure layer: configuration files and the in-process host.
//!
//! **Dependency rule**: this layer may depend on `application`, `domain` and
//! `callbridge_core`, but MUST NOT be imported by the `application` or
//! `domain` layers.

pub mod scripted;
pub mod storage;
