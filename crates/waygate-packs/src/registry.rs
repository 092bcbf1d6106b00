//! Unified registry for builtin and external tool packs.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};
use waygate_core::capability::CapabilitySet;
use waygate_core::id::PackId;

use crate::builtin::BuiltinTool;
use crate::error::{PackError, PackResult};
use crate::pack::Pack;
use crate::types::{ExecuteToolRequest, PackManifest, ToolDefinition};

/// Default capacity of a pack's request queue.
pub const DEFAULT_PACK_QUEUE_CAPACITY: usize = 16;

/// A set of builtin tools registered under one pack name.
pub struct BuiltinPack {
    /// Pack name, used in logs and collision reports.
    pub name: String,
    /// The tools.
    pub tools: Vec<Arc<dyn BuiltinTool>>,
}

impl BuiltinPack {
    /// Create an empty builtin pack.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tools: Vec::new(),
        }
    }

    /// Add a tool.
    #[must_use]
    pub fn with_tool(mut self, tool: Arc<dyn BuiltinTool>) -> Self {
        self.tools.push(tool);
        self
    }
}

/// Introspection snapshot of one live pack.
#[derive(Debug, Clone)]
pub struct PackInfo {
    /// Pack id.
    pub pack_id: PackId,
    /// Pack version.
    pub version: String,
    /// How many tools the pack published.
    pub tool_count: usize,
}

struct ExternalEntry {
    def: ToolDefinition,
    pack_id: PackId,
}

struct BuiltinEntry {
    def: ToolDefinition,
    handler: Arc<dyn BuiltinTool>,
}

#[derive(Default)]
struct RegistryInner {
    packs: HashMap<PackId, Arc<Pack>>,
    external: HashMap<String, ExternalEntry>,
    builtins: HashMap<String, BuiltinEntry>,
}

/// Thread-safe map of live packs and the global tool namespace.
///
/// A tool name exists in at most one of the builtin and external sets;
/// registrations that would violate this are rejected with nothing
/// inserted. The registry owns every pack exclusively — the router and
/// attachment service borrow packs through lookups.
pub struct PackRegistry {
    inner: RwLock<RegistryInner>,
    queue_capacity: usize,
}

impl PackRegistry {
    /// Create a registry with the default pack queue capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_queue_capacity(DEFAULT_PACK_QUEUE_CAPACITY)
    }

    /// Create a registry with a specific pack queue capacity.
    #[must_use]
    pub fn with_queue_capacity(queue_capacity: usize) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            queue_capacity,
        }
    }

    /// Register an external pack from its manifest.
    ///
    /// Returns the receiving half of the pack's request queue; the
    /// attachment service drains it onto the pack's stream.
    ///
    /// # Errors
    ///
    /// [`PackError::PackAlreadyRegistered`] if the pack id is live;
    /// [`PackError::ToolCollision`] if any manifest tool collides with an
    /// existing tool (builtin or external) or another manifest entry — in
    /// which case no tools from this manifest are added.
    pub async fn register_pack(
        &self,
        manifest: PackManifest,
    ) -> PackResult<mpsc::Receiver<ExecuteToolRequest>> {
        let mut inner = self.inner.write().await;

        if inner.packs.contains_key(&manifest.pack_id) {
            return Err(PackError::PackAlreadyRegistered(manifest.pack_id));
        }

        // Two-phase: check every tool before inserting any.
        let mut seen: Vec<&str> = Vec::new();
        for tool in &manifest.tools {
            if inner.external.contains_key(&tool.name)
                || inner.builtins.contains_key(&tool.name)
                || seen.contains(&tool.name.as_str())
            {
                warn!(
                    pack = %manifest.pack_id,
                    tool = %tool.name,
                    "Rejecting pack manifest: tool name collision"
                );
                return Err(PackError::ToolCollision(tool.name.clone()));
            }
            seen.push(&tool.name);
        }

        let tool_names: Vec<String> = manifest.tools.iter().map(|t| t.name.clone()).collect();
        let (pack, rx) = Pack::new(
            manifest.pack_id.clone(),
            manifest.version.clone(),
            tool_names,
            self.queue_capacity,
        );

        let tool_count = manifest.tools.len();
        for tool in manifest.tools {
            inner.external.insert(
                tool.name.clone(),
                ExternalEntry {
                    def: tool,
                    pack_id: manifest.pack_id.clone(),
                },
            );
        }
        info!(
            pack = %manifest.pack_id,
            version = %manifest.version,
            tools = tool_count,
            "Pack registered"
        );
        inner.packs.insert(manifest.pack_id, Arc::new(pack));
        Ok(rx)
    }

    /// Unregister a pack, closing its queue exactly once and removing its
    /// tools. Idempotent: unknown ids are a no-op.
    pub async fn unregister_pack(&self, pack_id: &PackId) {
        let mut inner = self.inner.write().await;
        let Some(pack) = inner.packs.remove(pack_id) else {
            debug!(pack = %pack_id, "Unregister for unknown pack ignored");
            return;
        };
        for name in pack.tool_names() {
            inner.external.remove(name);
        }
        pack.close().await;
        info!(pack = %pack_id, "Pack unregistered");
    }

    /// Register a set of builtin tools.
    ///
    /// # Errors
    ///
    /// [`PackError::ToolCollision`] under the same all-or-nothing rules as
    /// [`register_pack`](Self::register_pack).
    pub async fn register_builtin_pack(&self, pack: BuiltinPack) -> PackResult<()> {
        let mut inner = self.inner.write().await;

        let mut seen: Vec<String> = Vec::new();
        for tool in &pack.tools {
            let name = tool.name();
            if inner.external.contains_key(name)
                || inner.builtins.contains_key(name)
                || seen.iter().any(|s| s == name)
            {
                warn!(
                    pack = %pack.name,
                    tool = %name,
                    "Rejecting builtin pack: tool name collision"
                );
                return Err(PackError::ToolCollision(name.to_string()));
            }
            seen.push(name.to_string());
        }

        let count = pack.tools.len();
        for tool in pack.tools {
            inner.builtins.insert(
                tool.name().to_string(),
                BuiltinEntry {
                    def: tool.definition(),
                    handler: tool,
                },
            );
        }
        info!(pack = %pack.name, tools = count, "Builtin pack registered");
        Ok(())
    }

    /// Look up an external tool and the pack that owns it.
    pub async fn tool_by_name(&self, name: &str) -> Option<(ToolDefinition, Arc<Pack>)> {
        let inner = self.inner.read().await;
        let entry = inner.external.get(name)?;
        let pack = inner.packs.get(&entry.pack_id)?;
        Some((entry.def.clone(), Arc::clone(pack)))
    }

    /// Look up a builtin tool's handler and definition.
    pub async fn builtin_tool(&self, name: &str) -> Option<(ToolDefinition, Arc<dyn BuiltinTool>)> {
        let inner = self.inner.read().await;
        let entry = inner.builtins.get(name)?;
        Some((entry.def.clone(), Arc::clone(&entry.handler)))
    }

    /// Whether a tool name belongs to the builtin set.
    pub async fn is_builtin(&self, name: &str) -> bool {
        self.inner.read().await.builtins.contains_key(name)
    }

    /// A live pack by id.
    pub async fn pack(&self, pack_id: &PackId) -> Option<Arc<Pack>> {
        self.inner.read().await.packs.get(pack_id).cloned()
    }

    /// Every tool (builtin and external) whose required capabilities are
    /// a subset of `caps`. Tools with no requirements are always visible.
    pub async fn tools_for_capabilities(&self, caps: &CapabilitySet) -> Vec<ToolDefinition> {
        let inner = self.inner.read().await;
        let mut tools: Vec<ToolDefinition> = inner
            .builtins
            .values()
            .map(|e| &e.def)
            .chain(inner.external.values().map(|e| &e.def))
            .filter(|def| def.required_capabilities.satisfied_by(caps))
            .cloned()
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Snapshot of every live external pack.
    pub async fn list_packs(&self) -> Vec<PackInfo> {
        let inner = self.inner.read().await;
        inner
            .packs
            .values()
            .map(|p| PackInfo {
                pack_id: p.id().clone(),
                version: p.version().to_string(),
                tool_count: p.tool_names().len(),
            })
            .collect()
    }

    /// Total number of registered tools, builtin plus external.
    pub async fn tool_count(&self) -> usize {
        let inner = self.inner.read().await;
        inner.builtins.len().saturating_add(inner.external.len())
    }

    /// Close every pack queue exactly once and clear the registry.
    pub async fn close(&self) {
        let mut inner = self.inner.write().await;
        for pack in inner.packs.values() {
            pack.close().await;
        }
        inner.packs.clear();
        inner.external.clear();
        inner.builtins.clear();
    }
}

impl Default for PackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackRegistry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolResult;
    use async_trait::async_trait;
    use serde_json::Value;
    use waygate_core::id::PrincipalId;

    struct StaticTool(&'static str);

    #[async_trait]
    impl BuiltinTool for StaticTool {
        fn name(&self) -> &'static str {
            self.0
        }
        fn description(&self) -> &'static str {
            "static test tool"
        }
        fn input_schema(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, _agent_id: PrincipalId, _input: Value) -> ToolResult<Value> {
            Ok(serde_json::json!({"ok": true}))
        }
    }

    fn manifest(pack: &str, tools: &[&str]) -> PackManifest {
        let mut m = PackManifest::new(pack, "1.0.0");
        for name in tools {
            m = m.with_tool(ToolDefinition::new(*name, "test tool"));
        }
        m
    }

    #[tokio::test]
    async fn duplicate_pack_id_is_rejected() {
        let registry = PackRegistry::new();
        let _rx = registry.register_pack(manifest("a", &["t1"])).await.unwrap();
        let err = registry
            .register_pack(manifest("a", &["t2"]))
            .await
            .unwrap_err();
        assert!(matches!(err, PackError::PackAlreadyRegistered(_)));
    }

    #[tokio::test]
    async fn collision_leaves_registry_unchanged() {
        let registry = PackRegistry::new();
        let _rx = registry
            .register_pack(manifest("a", &["search"]))
            .await
            .unwrap();

        let err = registry
            .register_pack(manifest("b", &["search", "summarize"]))
            .await
            .unwrap_err();
        assert!(matches!(err, PackError::ToolCollision(_)));

        // No partial insert: summarize must not exist, search still owned by a.
        assert!(registry.tool_by_name("summarize").await.is_none());
        assert!(!registry.is_builtin("summarize").await);
        let (_, pack) = registry.tool_by_name("search").await.unwrap();
        assert_eq!(pack.id(), &PackId::from("a"));
        assert!(registry.pack(&PackId::from("b")).await.is_none());
    }

    #[tokio::test]
    async fn collision_spans_builtin_and_external_namespaces() {
        let registry = PackRegistry::new();
        registry
            .register_builtin_pack(
                BuiltinPack::new("builtin:base").with_tool(Arc::new(StaticTool("todo_add"))),
            )
            .await
            .unwrap();

        let err = registry
            .register_pack(manifest("p", &["todo_add"]))
            .await
            .unwrap_err();
        assert!(matches!(err, PackError::ToolCollision(_)));

        // And the other direction.
        let _rx = registry.register_pack(manifest("p", &["search"])).await.unwrap();
        let err = registry
            .register_builtin_pack(
                BuiltinPack::new("builtin:extra").with_tool(Arc::new(StaticTool("search"))),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PackError::ToolCollision(_)));
    }

    #[tokio::test]
    async fn unregister_is_idempotent_and_frees_names() {
        let registry = PackRegistry::new();
        let _rx = registry
            .register_pack(manifest("a", &["search"]))
            .await
            .unwrap();

        registry.unregister_pack(&PackId::from("a")).await;
        registry.unregister_pack(&PackId::from("a")).await;

        assert!(registry.tool_by_name("search").await.is_none());
        // The name is reusable now.
        let _rx = registry.register_pack(manifest("b", &["search"])).await.unwrap();
    }

    #[tokio::test]
    async fn capability_filter_returns_exactly_the_satisfied_subset() {
        let registry = PackRegistry::new();
        let m = PackManifest::new("p", "1.0.0")
            .with_tool(ToolDefinition::new("open", "no gating"))
            .with_tool(ToolDefinition::new("search", "net only").with_capability("net"))
            .with_tool(
                ToolDefinition::new("deploy", "net and admin")
                    .with_capability("net")
                    .with_capability("admin"),
            );
        let _rx = registry.register_pack(m).await.unwrap();
        registry
            .register_builtin_pack(
                BuiltinPack::new("builtin:base").with_tool(Arc::new(StaticTool("todo_add"))),
            )
            .await
            .unwrap();

        let caps = CapabilitySet::from_names(["net"]);
        let names: Vec<String> = registry
            .tools_for_capabilities(&caps)
            .await
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["open", "search", "todo_add"]);

        let none = registry.tools_for_capabilities(&CapabilitySet::new()).await;
        let names: Vec<String> = none.into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["open", "todo_add"]);
    }

    #[tokio::test]
    async fn close_closes_every_pack_queue() {
        let registry = PackRegistry::new();
        let _rx_a = registry.register_pack(manifest("a", &["t1"])).await.unwrap();
        let _rx_b = registry.register_pack(manifest("b", &["t2"])).await.unwrap();
        let pack_a = registry.pack(&PackId::from("a")).await.unwrap();

        registry.close().await;
        registry.close().await; // idempotent

        assert!(pack_a.is_closed().await);
        assert!(registry.list_packs().await.is_empty());
        assert_eq!(registry.tool_count().await, 0);
    }
}
