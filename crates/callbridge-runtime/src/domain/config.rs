//! Configuration schema for a bridge context.
//!
//! ```toml
//! [bridge]
//! strategy = "stack-suspend"   # or "blocking-proxy", "stub"
//! log_level = "info"
//!
//! [deferral]
//! fallback_delay_ms = 30
//!
//! [arena]
//! capacity_bytes = 16777216
//!
//! [capabilities]
//! required = ["audio-decode", "clipboard"]
//! ```
//!
//! Every section and every field is optional.  Missing values fall back to
//! the defaults below, so an empty file (or no file at all) is a valid
//! configuration.
//!
//! # Why is the strategy in the config file? (for beginners)
//!
//! How a native call waits for the browser is a property of how the whole
//! program was built: either the calling code can be suspended and resumed
//! (stack-suspend), or it runs on a worker thread that may block while the
//! main thread does the work (blocking-proxy).  Mixing the two inside one
//! process is not supported, so the choice is read once at startup and never
//! changes afterwards.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use callbridge_core::Capability;
use serde::{Deserialize, Serialize};

// ── Resume strategy ───────────────────────────────────────────────────────────

/// How a native call waits for its browser-side completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResumeStrategy {
    /// The call is an `async fn`; the executor runs other work meanwhile.
    #[default]
    StackSuspend,
    /// The call blocks a worker thread while the main thread performs the
    /// browser operation.
    BlockingProxy,
    /// No real suspension is available; every call fails immediately.
    Stub,
}

impl fmt::Display for ResumeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResumeStrategy::StackSuspend => "stack-suspend",
            ResumeStrategy::BlockingProxy => "blocking-proxy",
            ResumeStrategy::Stub => "stub",
        })
    }
}

impl FromStr for ResumeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stack-suspend" => Ok(ResumeStrategy::StackSuspend),
            "blocking-proxy" => Ok(ResumeStrategy::BlockingProxy),
            "stub" => Ok(ResumeStrategy::Stub),
            other => Err(format!(
                "unknown strategy '{other}' (expected stack-suspend, blocking-proxy or stub)"
            )),
        }
    }
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration of one bridge context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BridgeConfig {
    #[serde(default)]
    pub bridge: BridgeSection,
    #[serde(default)]
    pub deferral: DeferralSection,
    #[serde(default)]
    pub arena: ArenaSection,
    #[serde(default)]
    pub capabilities: CapabilitiesSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeSection {
    #[serde(default)]
    pub strategy: ResumeStrategy,
    /// `tracing` level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeferralSection {
    /// Delay before a touch-triggered flush runs.
    #[serde(default = "default_fallback_delay_ms")]
    pub fallback_delay_ms: u64,
}

impl DeferralSection {
    pub fn fallback_delay(&self) -> Duration {
        Duration::from_millis(self.fallback_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArenaSection {
    #[serde(default = "default_arena_capacity")]
    pub capacity_bytes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CapabilitiesSection {
    /// Features whose absence is reported once through the alert hook.
    #[serde(default)]
    pub required: Vec<Capability>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_fallback_delay_ms() -> u64 {
    30
}
fn default_arena_capacity() -> u32 {
    16 * 1024 * 1024
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            strategy: ResumeStrategy::default(),
            log_level: default_log_level(),
        }
    }
}

impl Default for DeferralSection {
    fn default() -> Self {
        Self {
            fallback_delay_ms: default_fallback_delay_ms(),
        }
    }
}

impl Default for ArenaSection {
    fn default() -> Self {
        Self {
            capacity_bytes: default_arena_capacity(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        // Arrange / Act
        let cfg = BridgeConfig::default();

        // Assert
        assert_eq!(cfg.bridge.strategy, ResumeStrategy::StackSuspend);
        assert_eq!(cfg.bridge.log_level, "info");
        assert_eq!(cfg.deferral.fallback_delay_ms, 30);
        assert_eq!(cfg.arena.capacity_bytes, 16 * 1024 * 1024);
        assert!(cfg.capabilities.required.is_empty());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let cfg: BridgeConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, BridgeConfig::default());
    }

    #[test]
    fn test_partial_section_overrides_only_given_fields() {
        // Arrange
        let toml_str = r#"
[bridge]
strategy = "blocking-proxy"

[deferral]
fallback_delay_ms = 50
"#;

        // Act
        let cfg: BridgeConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.bridge.strategy, ResumeStrategy::BlockingProxy);
        assert_eq!(cfg.bridge.log_level, "info");
        assert_eq!(cfg.deferral.fallback_delay(), Duration::from_millis(50));
        assert_eq!(cfg.arena.capacity_bytes, 16 * 1024 * 1024);
    }

    #[test]
    fn test_required_capabilities_use_kebab_case() {
        let toml_str = r#"
[capabilities]
required = ["audio-decode", "file-dialog"]
"#;
        let cfg: BridgeConfig = toml::from_str(toml_str).expect("deserialize");
        assert_eq!(
            cfg.capabilities.required,
            vec![Capability::AudioDecode, Capability::FileDialog]
        );
    }

    #[test]
    fn test_unknown_strategy_is_a_parse_error() {
        let result: Result<BridgeConfig, _> = toml::from_str("[bridge]\nstrategy = \"fibers\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_strategy_from_str_and_display_agree() {
        for strategy in [
            ResumeStrategy::StackSuspend,
            ResumeStrategy::BlockingProxy,
            ResumeStrategy::Stub,
        ] {
            assert_eq!(strategy.to_string().parse::<ResumeStrategy>(), Ok(strategy));
        }
        assert!("asyncify".parse::<ResumeStrategy>().is_err());
    }
}
