//! Settings for serving a page.

use std::net::SocketAddr;
use std::time::Duration;

/// Default port the smoke binary listens on for the page's WebSocket.
pub const DEFAULT_WS_PORT: u16 = 24810;

/// Where to listen for the page and how long to wait for it to introduce
/// itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeConfig {
    /// Address the WebSocket listener binds to.
    pub ws_bind_addr: SocketAddr,

    /// How long an accepted page may take to send its `Hello`.
    pub hello_timeout: Duration,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            // Local only: the page runs on the same machine as the smoke binary.
            ws_bind_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_WS_PORT)),
            hello_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_binds_loopback_on_default_port() {
        // Arrange / Act
        let config = ServeConfig::default();

        // Assert
        assert_eq!(config.ws_bind_addr.port(), DEFAULT_WS_PORT);
        assert!(config.ws_bind_addr.ip().is_loopback());
    }

    #[test]
    fn test_default_hello_timeout_is_thirty_seconds() {
        assert_eq!(ServeConfig::default().hello_timeout, Duration::from_secs(30));
    }
}
