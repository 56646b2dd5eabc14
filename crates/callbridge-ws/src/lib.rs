//! callbridge-ws: a real browser page as the host of a bridge context.
//!
//! The page connects over WebSocket, says which browser features it has, and
//! from then on performs every host operation the bridge asks for.
//!
//! ```text
//! BridgeContext ──BrowserHost──► PageHost ──JSON──► WebSocket ──► page
//!       ▲                           │                               │
//!       └──── completer fires ◄─────┴──── Complete / Fail ◄─────────┘
//! ```
//!
//! # Architecture
//!
//! ```text
//! [callbridge-ws]
//!   ├── domain/           Page protocol messages, ServeConfig
//!   ├── application/      Translation: host vocabulary ↔ page JSON (base64)
//!   └── infrastructure/
//!         ├── page_host/  BrowserHost implementation over an outbound channel
//!         └── ws_server/  Accepts one page, runs the reader/writer tasks
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `callbridge-core` only.
//! - `infrastructure` depends on all other layers plus `tokio` and `tungstenite`.

/// Domain layer: protocol message types and serving configuration.
pub mod domain;

/// Application layer: translation between host types and page messages.
pub mod application;

/// Infrastructure layer: the page host and the WebSocket session.
pub mod infrastructure;
