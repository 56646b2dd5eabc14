//! The bridge context: every piece of state one native module instance owns.
//!
//! A native program gets one [`BridgeContext`] per thread that calls into the
//! bridge.  The context owns the arena view, the pending-continuation slot,
//! the typed callback table, and the handle tables; it shares the deferral
//! queue (trusted events arrive on the main thread for every worker).
//!
//! ```text
//!  BridgeContext
//!  ├── config           strategy, delays, required capabilities
//!  ├── arena            native linear memory (SharedArena)
//!  ├── host             Arc<dyn BrowserHost>
//!  ├── slot             Arc<ContinuationSlot>   (one call in flight)
//!  ├── deferral         Arc<DeferralQueue>      (gesture-gated work)
//!  ├── proxy            Option<MainThreadProxy> (blocking strategy only)
//!  ├── callbacks        Arc<Mutex<DispatchTable>>
//!  └── resources        Arc<ResourceRouter>     (requests, videos, notifications)
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use callbridge_core::{
    CallbackIndex, Capability, DispatchError, DispatchTable, HostAction, HostCapabilities,
    SharedArena, Signature, TrustedEventKind, Value,
};
use tracing::{debug, info, warn};

use crate::application::host::BrowserHost;
use crate::application::proxy::MainThreadProxy;
use crate::application::resources::ResourceRouter;
use crate::domain::config::{BridgeConfig, ResumeStrategy};
use crate::domain::deferral::{DeferralQueue, FlushReport};
use crate::domain::slot::{ContinuationSlot, Ticket};

/// Receives user-visible alerts in place of the host's alert action.
pub type AlertHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Locks `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// State of one bridge instance.  See the module documentation.
pub struct BridgeContext {
    pub(crate) config: BridgeConfig,
    pub(crate) arena: SharedArena,
    pub(crate) host: Arc<dyn BrowserHost>,
    pub(crate) capabilities: HostCapabilities,
    pub(crate) slot: Arc<ContinuationSlot>,
    pub(crate) deferral: Arc<DeferralQueue>,
    pub(crate) proxy: Option<MainThreadProxy>,
    pub(crate) callbacks: Arc<Mutex<DispatchTable>>,
    pub(crate) resources: Arc<ResourceRouter>,
    pub(crate) wake_ticket: Mutex<Option<Ticket>>,
    alert_hook: Option<AlertHook>,
}

/// Builder returned by [`BridgeContext::builder`].
pub struct BridgeContextBuilder {
    host: Arc<dyn BrowserHost>,
    config: BridgeConfig,
    arena: Option<SharedArena>,
    deferral: Option<Arc<DeferralQueue>>,
    proxy: Option<MainThreadProxy>,
    alert_hook: Option<AlertHook>,
}

impl BridgeContextBuilder {
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses an existing arena instead of allocating `arena.capacity_bytes`.
    pub fn arena(mut self, arena: SharedArena) -> Self {
        self.arena = Some(arena);
        self
    }

    /// Shares a deferral queue with other contexts.
    pub fn deferral(mut self, deferral: Arc<DeferralQueue>) -> Self {
        self.deferral = Some(deferral);
        self
    }

    /// Main-thread proxy for the blocking strategy.
    pub fn proxy(mut self, proxy: MainThreadProxy) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn alert_hook(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.alert_hook = Some(Arc::new(hook));
        self
    }

    /// Builds the context and reports missing required capabilities once.
    pub fn build(self) -> BridgeContext {
        let arena = self
            .arena
            .unwrap_or_else(|| SharedArena::new(self.config.arena.capacity_bytes));
        let deferral = self
            .deferral
            .unwrap_or_else(|| Arc::new(DeferralQueue::new(self.config.deferral.fallback_delay())));
        let callbacks = Arc::new(Mutex::new(DispatchTable::new()));
        let resources = Arc::new(ResourceRouter::new(Arc::clone(&callbacks)));
        let capabilities = self.host.capabilities();

        let ctx = BridgeContext {
            config: self.config,
            arena,
            host: self.host,
            capabilities,
            slot: Arc::new(ContinuationSlot::new()),
            deferral,
            proxy: self.proxy,
            callbacks,
            resources,
            wake_ticket: Mutex::new(None),
            alert_hook: self.alert_hook,
        };
        info!(
            "bridge context ready (strategy: {}, {} host capabilities)",
            ctx.strategy(),
            ctx.capabilities.0.len()
        );
        ctx.report_missing_capabilities();
        ctx
    }
}

impl BridgeContext {
    pub fn builder(host: Arc<dyn BrowserHost>) -> BridgeContextBuilder {
        BridgeContextBuilder {
            host,
            config: BridgeConfig::default(),
            arena: None,
            deferral: None,
            proxy: None,
            alert_hook: None,
        }
    }

    /// Context with the default configuration.
    pub fn new(host: Arc<dyn BrowserHost>) -> Self {
        Self::builder(host).build()
    }

    fn report_missing_capabilities(&self) {
        let missing = self.capabilities.missing(&self.config.capabilities.required);
        if missing.is_empty() {
            return;
        }
        let names: Vec<String> = missing.iter().map(Capability::to_string).collect();
        self.alert(&format!(
            "This browser does not support: {}. Some features will not work.",
            names.join(", ")
        ));
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn strategy(&self) -> ResumeStrategy {
        self.config.bridge.strategy
    }

    pub fn arena(&self) -> &SharedArena {
        &self.arena
    }

    pub fn capabilities(&self) -> &HostCapabilities {
        &self.capabilities
    }

    pub fn deferral(&self) -> &Arc<DeferralQueue> {
        &self.deferral
    }

    /// Whether a native call is suspended waiting for the host.
    pub fn is_call_pending(&self) -> bool {
        self.slot.is_pending()
    }

    // ── Alerts and events ─────────────────────────────────────────────────

    /// Shows `message` to the user: through the alert hook when one is set,
    /// otherwise through the host.
    pub fn alert(&self, message: &str) {
        warn!("alert: {message}");
        match &self.alert_hook {
            Some(hook) => hook(message),
            None => {
                if let Err(e) = self.host.perform(HostAction::Alert {
                    message: message.to_string(),
                }) {
                    warn!("host could not show alert: {e}");
                }
            }
        }
    }

    /// Entry point for trusted input events from the page.
    pub fn on_trusted_event(&self, kind: TrustedEventKind) -> Option<FlushReport> {
        debug!("trusted {kind:?} event");
        self.deferral.on_trusted_event(kind)
    }

    /// Resumes a pending `wait_for_wake` with `code`.  Returns `false` when no
    /// wake wait is pending, or for code 0, which would read back as the
    /// failure record.
    pub fn wake(&self, code: i32) -> bool {
        if code == 0 {
            warn!("wake(0) ignored: 0 is the failure code");
            return false;
        }
        let ticket = lock(&self.wake_ticket).take();
        match ticket {
            Some(ticket) => self
                .slot
                .resume_ticket(ticket, Some(callbridge_core::HostOutcome::Wake { code })),
            None => {
                debug!("wake({code}) with no waiter ignored");
                false
            }
        }
    }

    // ── Callbacks ─────────────────────────────────────────────────────────

    /// Registers a native callback with an explicit signature.
    pub fn register_callback(
        &self,
        signature: Signature,
        f: impl Fn(&[Value]) -> Value + Send + Sync + 'static,
    ) -> Result<CallbackIndex, DispatchError> {
        lock(&self.callbacks).register(signature, f)
    }

    /// Registers a `(handle, event_code, user_data) -> void` callback.
    pub fn register_resource_callback(
        &self,
        f: impl Fn(i32, i32, i32) + Send + Sync + 'static,
    ) -> CallbackIndex {
        lock(&self.callbacks).register_resource_callback(f)
    }

    /// Calls a registered callback through the typed table.
    pub fn invoke_callback(&self, index: CallbackIndex, args: &[Value]) -> Result<Value, DispatchError> {
        let callback = lock(&self.callbacks).get(index)?;
        callback.call(args)
    }
}

impl fmt::Debug for BridgeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeContext")
            .field("strategy", &self.strategy())
            .field("slot", &self.slot)
            .field("deferral", &self.deferral)
            .field("has_proxy", &self.proxy.is_some())
            .finish_non_exhaustive()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::host::MockBrowserHost;
    use callbridge_core::ValueType;

    fn host_with(capabilities: HostCapabilities) -> MockBrowserHost {
        let mut host = MockBrowserHost::new();
        host.expect_capabilities().return_const(capabilities);
        host
    }

    #[test]
    fn test_missing_required_capability_alerts_once_at_build() {
        // Arrange
        let mut config = BridgeConfig::default();
        config.capabilities.required = vec![Capability::AudioDecode, Capability::Clipboard];
        let host = host_with([Capability::AudioDecode].into_iter().collect());
        let alerts = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = Arc::clone(&alerts);

        // Act
        let _ctx = BridgeContext::builder(Arc::new(host))
            .config(config)
            .arena(SharedArena::new(1024))
            .alert_hook(move |m| sink.lock().unwrap().push(m.to_string()))
            .build();

        // Assert
        let alerts = alerts.lock().unwrap();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].contains("clipboard"));
        assert!(!alerts[0].contains("audio-decode"));
    }

    #[test]
    fn test_no_alert_when_everything_required_is_present() {
        let mut config = BridgeConfig::default();
        config.capabilities.required = vec![Capability::Video];
        let mut host = host_with(HostCapabilities::all());
        host.expect_perform().times(0);

        let _ctx = BridgeContext::builder(Arc::new(host))
            .config(config)
            .arena(SharedArena::new(1024))
            .build();
    }

    #[test]
    fn test_alert_without_hook_goes_to_host() {
        let mut host = host_with(HostCapabilities::all());
        host.expect_perform()
            .withf(|a| matches!(a, HostAction::Alert { message } if message == "hello"))
            .times(1)
            .returning(|_| Ok(()));
        let ctx = BridgeContext::builder(Arc::new(host))
            .arena(SharedArena::new(1024))
            .build();

        ctx.alert("hello");
    }

    #[test]
    fn test_wake_without_waiter_returns_false() {
        let ctx = BridgeContext::builder(Arc::new(host_with(HostCapabilities::all())))
            .arena(SharedArena::new(1024))
            .build();

        assert!(!ctx.wake(3));
    }

    #[test]
    fn test_invoke_registered_callback() {
        // Arrange
        let ctx = BridgeContext::builder(Arc::new(host_with(HostCapabilities::all())))
            .arena(SharedArena::new(1024))
            .build();
        let index = ctx
            .register_callback(Signature::new(&[ValueType::I32], ValueType::I32), |args| {
                Value::I32(args[0].as_i32().unwrap_or(0) * 2)
            })
            .unwrap();

        // Act
        let result = ctx.invoke_callback(index, &[Value::I32(21)]);

        // Assert
        assert_eq!(result, Ok(Value::I32(42)));
        assert_eq!(ctx.invoke_callback(CallbackIndex::NULL, &[]), Err(DispatchError::NullCallback));
    }

    #[test]
    fn test_default_arena_uses_configured_capacity() {
        let mut config = BridgeConfig::default();
        config.arena.capacity_bytes = 4096;

        let ctx = BridgeContext::builder(Arc::new(host_with(HostCapabilities::all())))
            .config(config)
            .build();

        assert_eq!(ctx.arena().capacity(), 4096);
    }
}
