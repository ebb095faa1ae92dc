//! Tool registry and per-turn dispatch table.
//!
//! Server-side handlers are registered once at startup into a
//! [`ToolCatalog`], which also fixes the destructive-tool set. Each turn then
//! merges the remote client's declared manifest into a [`DispatchTable`].
//! Both steps validate names up front so a typo fails loudly when the table
//! is built rather than turning into "not available" mid-conversation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::gate::ToolClass;
use crate::tools::tool::{Tool, ToolSchema};

/// Name of the plan-update tool intercepted by the router.
pub const UPDATE_PLAN_TOOL: &str = "update_plan";

/// Registry of server-side tools keyed by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Names must be unique and may not shadow `update_plan`.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), CatalogError> {
        let name = tool.name().to_string();
        if name == UPDATE_PLAN_TOOL {
            return Err(CatalogError::ReservedName(name));
        }
        if self.tools.contains_key(&name) {
            return Err(CatalogError::DuplicateTool(name));
        }
        tracing::debug!(tool = %name, mutation = tool.is_mutation(), "Registered tool");
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Sorted tool names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values().map(|t| t.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Server-side tools plus the fixed destructive set, validated together.
pub struct ToolCatalog {
    registry: ToolRegistry,
    destructive: HashSet<String>,
}

impl ToolCatalog {
    /// Build a catalog. Every destructive name must be a registered
    /// mutation tool.
    pub fn new<I, S>(registry: ToolRegistry, destructive: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = HashSet::new();
        for name in destructive {
            let name = name.into();
            let tool = registry
                .get(&name)
                .ok_or_else(|| CatalogError::UnknownTool(name.clone()))?;
            if !tool.is_mutation() {
                return Err(CatalogError::NotMutation(name));
            }
            set.insert(name);
        }
        Ok(Self {
            registry,
            destructive: set,
        })
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.registry.get(name)
    }

    /// Classify a server-side tool. Unknown names are read-only: nothing
    /// runs for them on the server.
    pub fn classify(&self, name: &str) -> ToolClass {
        match self.registry.get(name) {
            Some(tool) if tool.is_mutation() => {
                if self.destructive.contains(name) {
                    ToolClass::Destructive
                } else {
                    ToolClass::Mutation
                }
            }
            _ => ToolClass::ReadOnly,
        }
    }

    /// Merge a remote client's manifest into a dispatch table for one turn.
    pub fn dispatch_table(
        self: &Arc<Self>,
        manifest: &[RemoteToolSpec],
    ) -> Result<DispatchTable, CatalogError> {
        let mut remote = HashSet::new();
        for spec in manifest {
            if spec.name == UPDATE_PLAN_TOOL {
                return Err(CatalogError::ReservedName(spec.name.clone()));
            }
            if self.registry.contains(&spec.name) || !remote.insert(spec.name.clone()) {
                return Err(CatalogError::DuplicateTool(spec.name.clone()));
            }
        }
        Ok(DispatchTable {
            catalog: Arc::clone(self),
            remote,
            remote_specs: manifest.to_vec(),
        })
    }
}

/// One entry of a remote client's declared tool manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteToolSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

impl RemoteToolSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            parameters: None,
        }
    }

    /// Schema shown to the agent. Missing fields get permissive defaults.
    pub fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name.clone(),
            description: self.description.clone().unwrap_or_default(),
            parameters: self
                .parameters
                .clone()
                .unwrap_or_else(|| serde_json::json!({"type": "object"})),
        }
    }
}

/// Where a tool call goes.
pub enum ToolRoute {
    Server(Arc<dyn Tool>),
    Remote,
    Unavailable,
}

/// Closed name-to-executor table for one turn.
pub struct DispatchTable {
    catalog: Arc<ToolCatalog>,
    remote: HashSet<String>,
    remote_specs: Vec<RemoteToolSpec>,
}

impl DispatchTable {
    pub fn route(&self, name: &str) -> ToolRoute {
        if let Some(tool) = self.catalog.get(name) {
            ToolRoute::Server(tool)
        } else if self.remote.contains(name) {
            ToolRoute::Remote
        } else {
            ToolRoute::Unavailable
        }
    }

    /// Remote tools are the client's business and never gated.
    pub fn classify(&self, name: &str) -> ToolClass {
        self.catalog.classify(name)
    }

    pub fn catalog(&self) -> &Arc<ToolCatalog> {
        &self.catalog
    }

    /// Server tools followed by the remote manifest, in declaration order.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas = self.catalog.registry().schemas();
        schemas.extend(self.remote_specs.iter().map(RemoteToolSpec::schema));
        schemas
    }
}
