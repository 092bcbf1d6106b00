//! Common fixtures.

use std::sync::{Arc, Once};
use waygate_core::auth::AuthContext;
use waygate_core::id::PrincipalId;
use waygate_core::principal::PrincipalKind;
use waygate_gateway::GatewayConfig;
use waygate_storage::{ChannelBinding, MemoryStore, Store};

static TRACING: Once = Once::new();

/// Install a test tracing subscriber once per process.
///
/// Honours `RUST_LOG`; silent by default. Called implicitly by
/// [`fast_config`] and [`memory_store`] so most tests get logging for
/// free.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A config with production structure but test-friendly timing.
#[must_use]
pub fn fast_config() -> GatewayConfig {
    init_tracing();
    GatewayConfig::default()
        .with_heartbeat_timeout_secs(2)
        .with_reconnect_grace_secs(2)
        .with_reaper_sweep_secs(1)
        .with_dedupe_ttl_secs(5)
}

/// A fresh in-memory store, widened to the trait object the gateway
/// consumes.
#[must_use]
pub fn memory_store() -> Arc<dyn Store> {
    init_tracing();
    Arc::new(MemoryStore::new())
}

/// An auth context for a plain client principal.
#[must_use]
pub fn client_auth() -> AuthContext {
    AuthContext::new(PrincipalId::new(), PrincipalKind::Client)
}

/// An auth context holding the admin role.
#[must_use]
pub fn admin_auth() -> AuthContext {
    AuthContext::new(PrincipalId::new(), PrincipalKind::Client).with_role("admin")
}

/// Bind `(frontend, channel)` to an agent identity in the store.
///
/// # Panics
///
/// Panics if the store rejects the upsert.
pub async fn bind_channel(
    store: &Arc<dyn Store>,
    frontend: &str,
    channel: &str,
    principal: PrincipalId,
    working_dir: &str,
) {
    store
        .upsert_binding(&ChannelBinding::new(
            frontend,
            channel,
            principal,
            working_dir,
        ))
        .await
        .expect("binding upsert accepted");
}
