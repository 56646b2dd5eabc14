//! Infrastructure layer for callbridge-ws.
//!
//! - [`page_host`]: a `BrowserHost` that turns host calls into outbound page
//!   messages and routes page answers back to completers and event sinks.
//! - [`ws_server`]: accepts one page over WebSocket and runs its reader and
//!   writer tasks.

pub mod page_host;
pub mod ws_server;

pub use page_host::{PageEvent, PageHost};
pub use ws_server::{accept_page, PageSession};
