//! callbridge-smoke: serve one page and run bridge entry points against it.
//!
//! Useful to check a browser page implementation end to end: the binary waits
//! for the page's WebSocket, then runs a short sequence of calls through a
//! real `BridgeContext` and logs the records they produce.
//!
//! # Usage
//!
//! ```text
//! callbridge-smoke [OPTIONS]
//!
//! Options:
//!   --ws-bind <IP>           Address to listen on [default: 127.0.0.1]
//!   --ws-port <PORT>         WebSocket port [default: 24810]
//!   --config <FILE>          Bridge configuration (TOML)
//!   --strategy <STRATEGY>    stack-suspend | blocking-proxy | stub
//!   --decode-audio <FILE>    Decode this audio file in the page
//!   --decode-image <FILE>    Decode this image file in the page
//!   --read-clipboard         Read the clipboard (needs a click in the page)
//!   --hello-timeout <SECS>   How long to wait for the page's Hello [default: 30]
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable                  | Default     |
//! |---------------------------|-------------|
//! | `CALLBRIDGE_WS_BIND`      | `127.0.0.1` |
//! | `CALLBRIDGE_WS_PORT`      | `24810`     |
//! | `CALLBRIDGE_CONFIG`       | none        |
//! | `CALLBRIDGE_STRATEGY`     | from config |
//! | `CALLBRIDGE_HELLO_TIMEOUT`| `30`        |
//!
//! `RUST_LOG` overrides the configured `bridge.log_level`.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use callbridge_core::{AudioRecord, FrameRecord, ImageRecord, ResultRecord, TextRecord};
use callbridge_runtime::{
    load_config, main_thread_channel, BridgeConfig, BridgeContext, ResumeStrategy,
};
use callbridge_ws::domain::config::DEFAULT_WS_PORT;
use callbridge_ws::domain::ServeConfig;
use callbridge_ws::infrastructure::accept_page;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Serves one browser page and exercises the call bridge against it.
#[derive(Debug, Parser)]
#[command(
    name = "callbridge-smoke",
    about = "Runs async call bridge entry points against a live browser page",
    version
)]
struct Cli {
    /// IP address to bind the WebSocket listener to.
    #[arg(long, default_value = "127.0.0.1", env = "CALLBRIDGE_WS_BIND")]
    ws_bind: String,

    /// TCP port for the page's WebSocket connection.
    #[arg(long, default_value_t = DEFAULT_WS_PORT, env = "CALLBRIDGE_WS_PORT")]
    ws_port: u16,

    /// Bridge configuration file.  Defaults apply when absent.
    #[arg(long, env = "CALLBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides `bridge.strategy` from the configuration.
    #[arg(long, env = "CALLBRIDGE_STRATEGY")]
    strategy: Option<ResumeStrategy>,

    /// Audio file to decode in the page.
    #[arg(long)]
    decode_audio: Option<PathBuf>,

    /// Image file to decode in the page.
    #[arg(long)]
    decode_image: Option<PathBuf>,

    /// Also read the clipboard.  Runs once the page reports a click.
    #[arg(long)]
    read_clipboard: bool,

    /// Seconds to wait for the page's Hello after it connects.
    #[arg(long, default_value_t = 30, env = "CALLBRIDGE_HELLO_TIMEOUT")]
    hello_timeout: u64,
}

impl Cli {
    /// Builds the serving settings from the parsed arguments.
    ///
    /// # Errors
    ///
    /// Returns an error if `--ws-bind` is not a valid IP address.
    fn to_serve_config(&self) -> anyhow::Result<ServeConfig> {
        let ws_bind_addr: SocketAddr = format!("{}:{}", self.ws_bind, self.ws_port)
            .parse()
            .with_context(|| {
                format!(
                    "invalid WebSocket bind address: '{}:{}'",
                    self.ws_bind, self.ws_port
                )
            })?;

        Ok(ServeConfig {
            ws_bind_addr,
            hello_timeout: Duration::from_secs(self.hello_timeout),
        })
    }

    /// Loads the bridge configuration and applies command-line overrides.
    fn to_bridge_config(&self) -> anyhow::Result<BridgeConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => BridgeConfig::default(),
        };
        if let Some(strategy) = self.strategy {
            config.bridge.strategy = strategy;
        }
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.to_bridge_config()?;
    let serve = cli.to_serve_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.bridge.log_level)),
        )
        .init();

    info!(
        "callbridge-smoke starting: ws={}, strategy={}",
        serve.ws_bind_addr, config.bridge.strategy
    );

    tokio::select! {
        result = run_smoke(&cli, config, serve) => result?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl+C")?;
            info!("received Ctrl+C; stopping");
        }
    }

    info!("callbridge-smoke stopped");
    Ok(())
}

async fn run_smoke(cli: &Cli, config: BridgeConfig, serve: ServeConfig) -> anyhow::Result<()> {
    let listener = TcpListener::bind(serve.ws_bind_addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {}", serve.ws_bind_addr))?;
    info!("waiting for a page on ws://{}", serve.ws_bind_addr);

    // Under blocking-proxy the entry points run on a worker thread; this
    // runtime plays the main thread and runs the jobs they post.
    let proxy = if config.bridge.strategy == ResumeStrategy::BlockingProxy {
        let (proxy, pump) = main_thread_channel();
        tokio::spawn(pump.run());
        Some(proxy)
    } else {
        None
    };

    let session = accept_page(&listener, &serve, config, proxy).await?;
    let ctx = Arc::clone(&session.context);

    if let Some(path) = &cli.decode_audio {
        check_audio(&ctx, path).await?;
    }
    if let Some(path) = &cli.decode_image {
        check_image(&ctx, path).await?;
    }
    check_frame(&ctx).await?;
    if cli.read_clipboard {
        info!("click inside the page to allow the clipboard read");
        check_clipboard(&ctx).await?;
    }

    session.shutdown();
    Ok(())
}

// ── Smoke checks ──────────────────────────────────────────────────────────────

/// Runs a blocking entry point on a fresh worker thread and awaits its record.
async fn on_worker<R>(
    ctx: &Arc<BridgeContext>,
    call: impl FnOnce(&BridgeContext) -> R + Send + 'static,
) -> anyhow::Result<R>
where
    R: Send + 'static,
{
    let ctx = Arc::clone(ctx);
    let (tx, rx) = oneshot::channel();
    std::thread::Builder::new()
        .name("callbridge-worker".to_string())
        .spawn(move || {
            let _ = tx.send(call(&ctx));
        })
        .context("failed to spawn worker thread")?;
    rx.await.context("worker thread ended without a result")
}

fn blocking(ctx: &BridgeContext) -> bool {
    ctx.strategy() == ResumeStrategy::BlockingProxy
}

async fn read_input(path: &Path) -> anyhow::Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))
}

async fn check_audio(ctx: &Arc<BridgeContext>, path: &Path) -> anyhow::Result<()> {
    let bytes = read_input(path).await?;
    let arena = ctx.arena();
    let len = u32::try_from(bytes.len()).context("input file too large")?;
    let src = arena
        .alloc_bytes(&bytes)
        .context("arena too small for the input file")?;
    let out = arena.alloc(AudioRecord::SIZE as u32)?;

    let rec = if blocking(ctx) {
        on_worker(ctx, move |ctx| ctx.decode_audio_blocking(src, len, out)).await?
    } else {
        ctx.decode_audio(src, len, out).await
    };

    if rec.is_failure() {
        warn!("decode_audio({}) failed", path.display());
    } else {
        info!(
            frames = rec.frames,
            sample_rate = rec.sample_rate,
            source_channels = rec.source_channels,
            "decoded audio {}",
            path.display()
        );
    }
    rec.release(arena);
    arena.free(out)?;
    arena.free(src)?;
    Ok(())
}

async fn check_image(ctx: &Arc<BridgeContext>, path: &Path) -> anyhow::Result<()> {
    let bytes = read_input(path).await?;
    let arena = ctx.arena();
    let len = u32::try_from(bytes.len()).context("input file too large")?;
    let src = arena
        .alloc_bytes(&bytes)
        .context("arena too small for the input file")?;
    let out = arena.alloc(ImageRecord::SIZE as u32)?;

    let rec = if blocking(ctx) {
        on_worker(ctx, move |ctx| ctx.decode_image_blocking(src, len, out)).await?
    } else {
        ctx.decode_image(src, len, out).await
    };

    if rec.is_failure() {
        warn!("decode_image({}) failed", path.display());
    } else {
        info!(
            width = rec.width,
            height = rec.height,
            bytes = rec.byte_len,
            "decoded image {}",
            path.display()
        );
    }
    rec.release(arena);
    arena.free(out)?;
    arena.free(src)?;
    Ok(())
}

async fn check_frame(ctx: &Arc<BridgeContext>) -> anyhow::Result<()> {
    let arena = ctx.arena();
    let out = arena.alloc(FrameRecord::SIZE as u32)?;

    let rec = if blocking(ctx) {
        on_worker(ctx, move |ctx| ctx.wait_animation_frame_blocking(out)).await?
    } else {
        ctx.wait_animation_frame(out).await
    };

    if rec.is_failure() {
        warn!("wait_animation_frame failed");
    } else {
        info!(timestamp_ms = rec.timestamp_ms, "animation frame");
    }
    arena.free(out)?;
    Ok(())
}

async fn check_clipboard(ctx: &Arc<BridgeContext>) -> anyhow::Result<()> {
    let arena = ctx.arena();
    let out = arena.alloc(TextRecord::SIZE as u32)?;

    let rec = if blocking(ctx) {
        on_worker(ctx, move |ctx| ctx.read_clipboard_text_blocking(out)).await?
    } else {
        ctx.read_clipboard_text(out).await
    };

    if rec.is_failure() {
        warn!("read_clipboard_text failed");
    } else {
        let text = rec.read_text(arena)?;
        info!(chars = text.chars().count(), "clipboard read");
    }
    rec.release(arena);
    arena.free(out)?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        // Arrange / Act
        let cli = Cli::parse_from(["callbridge-smoke"]);

        // Assert
        assert_eq!(cli.ws_bind, "127.0.0.1");
        assert_eq!(cli.ws_port, 24810);
        assert_eq!(cli.hello_timeout, 30);
        assert!(cli.config.is_none());
        assert!(cli.strategy.is_none());
        assert!(!cli.read_clipboard);
    }

    #[test]
    fn test_cli_ws_port_override() {
        let cli = Cli::parse_from(["callbridge-smoke", "--ws-port", "9999"]);
        assert_eq!(cli.ws_port, 9999);
    }

    #[test]
    fn test_cli_strategy_parses_kebab_case() {
        let cli = Cli::parse_from(["callbridge-smoke", "--strategy", "blocking-proxy"]);
        assert_eq!(cli.strategy, Some(ResumeStrategy::BlockingProxy));
    }

    #[test]
    fn test_cli_unknown_strategy_is_rejected() {
        let result = Cli::try_parse_from(["callbridge-smoke", "--strategy", "fibers"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_decode_paths() {
        let cli = Cli::parse_from([
            "callbridge-smoke",
            "--decode-audio",
            "jump.ogg",
            "--decode-image",
            "tiles.png",
            "--read-clipboard",
        ]);

        assert_eq!(cli.decode_audio, Some(PathBuf::from("jump.ogg")));
        assert_eq!(cli.decode_image, Some(PathBuf::from("tiles.png")));
        assert!(cli.read_clipboard);
    }

    #[test]
    fn test_serve_config_from_defaults() {
        // Arrange
        let cli = Cli::parse_from(["callbridge-smoke"]);

        // Act
        let serve = cli.to_serve_config().unwrap();

        // Assert
        assert_eq!(serve, ServeConfig::default());
    }

    #[test]
    fn test_serve_config_custom_bind_and_timeout() {
        let cli = Cli::parse_from([
            "callbridge-smoke",
            "--ws-bind",
            "0.0.0.0",
            "--ws-port",
            "8080",
            "--hello-timeout",
            "5",
        ]);

        let serve = cli.to_serve_config().unwrap();

        assert_eq!(serve.ws_bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(serve.hello_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_serve_config_invalid_bind_returns_error() {
        // Arrange: not an IP address
        let cli = Cli::parse_from(["callbridge-smoke", "--ws-bind", "not.an.ip"]);

        // Act
        let result = cli.to_serve_config();

        // Assert: must return an error, not panic
        assert!(result.is_err());
    }

    #[test]
    fn test_strategy_flag_overrides_default_config() {
        let cli = Cli::parse_from(["callbridge-smoke", "--strategy", "stub"]);

        let config = cli.to_bridge_config().unwrap();

        assert_eq!(config.bridge.strategy, ResumeStrategy::Stub);
    }

    #[test]
    fn test_missing_config_file_falls_back_to_defaults() {
        let cli = Cli::parse_from([
            "callbridge-smoke",
            "--config",
            "/nonexistent/callbridge-smoke-test.toml",
        ]);

        let config = cli.to_bridge_config().unwrap();

        assert_eq!(config, BridgeConfig::default());
    }
}
