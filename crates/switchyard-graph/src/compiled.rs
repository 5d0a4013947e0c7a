use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use switchyard_core::config::ExecutorConfig;
use switchyard_core::EventBus;

use crate::channel::ChannelSpec;
use crate::error::RunError;
use crate::node::Node;
use crate::router::{NodeId, Route, Router};
use crate::state::State;

/// A validated, immutable graph ready to run.
///
/// Nodes live in an arena addressed by [`NodeId`]; routing rules are already
/// resolved to ids. Share it across concurrent runs behind an `Arc`.
pub struct CompiledGraph {
    pub(crate) name: String,
    pub(crate) channels: Vec<ChannelSpec>,
    pub(crate) nodes: Vec<Arc<dyn Node>>,
    pub(crate) names: Vec<String>,
    pub(crate) index: HashMap<String, NodeId>,
    pub(crate) router: Router,
    pub(crate) entry: NodeId,
    pub(crate) config: ExecutorConfig,
    pub(crate) event_bus: Option<Arc<EventBus>>,
}

impl CompiledGraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Node names in declaration order.
    pub fn node_names(&self) -> Vec<&str> {
        self.names.iter().map(String::as_str).collect()
    }

    pub fn entry_point(&self) -> &str {
        self.node_name(self.entry)
    }

    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.index.get(name).copied()
    }

    pub fn node_name(&self, id: NodeId) -> &str {
        self.router.name(id)
    }

    pub fn channels(&self) -> &[ChannelSpec] {
        &self.channels
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Routing table, one line per node.
    pub fn describe(&self) -> Vec<String> {
        self.router.describe()
    }

    /// Ask the router where `from` leads given `state`. Side-effect free.
    pub fn route(&self, from: &str, state: &State) -> Result<Route, RunError> {
        let id = self
            .node_id(from)
            .ok_or_else(|| RunError::UnknownNode(from.to_string()))?;
        self.router.route(id, state)
    }

    /// Same graph, different executor limits.
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }
}

impl fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("name", &self.name)
            .field("entry", &self.entry_point())
            .field("channels", &self.channels.len())
            .field("routes", &self.router)
            .finish()
    }
}
