//! callbridge-runtime: suspends native calls while the browser works and
//! resumes them with a marshaled result.
//!
//! ```text
//!  native code ──decode_audio(src, len, out)──► BridgeContext
//!                                                  │ register continuation
//!                                                  │ host.begin(request, completer)
//!                                                  ▼
//!                                            BrowserHost (page, scripted, ...)
//!                                                  │ completer.complete(outcome)
//!                                                  ▼
//!  native code ◄──── AudioRecord in `out` ──── continuation marshals + wakes
//! ```
//!
//! The crate is split the same way as the rest of the workspace:
//!
//! - [`domain`]: the continuation slot, the deferral queue, configuration.
//! - [`application`]: the context, entry points, handle tables, host trait.
//! - [`infrastructure`]: TOML persistence and the scripted host.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::adapter::Completer;
pub use application::context::{AlertHook, BridgeContext, BridgeContextBuilder};
pub use application::host::BrowserHost;
pub use application::proxy::{
    main_thread_channel, MainThreadJob, MainThreadProxy, MainThreadPump, ProxyError,
};
pub use application::resources::{
    RequestState, ResourceError, ResourceEvents, ResourceRouter, VideoInfo,
};
pub use domain::config::{BridgeConfig, ResumeStrategy};
pub use domain::deferral::{DeferralQueue, DeferredAction, FlushReport};
pub use domain::slot::{Continuation, ContinuationSlot, RejectedContinuation, Ticket};
pub use infrastructure::scripted::ScriptedHost;
pub use infrastructure::storage::{load_config, save_config, ConfigError};
