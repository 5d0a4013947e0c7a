use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use switchyard_core::config::ExecutorConfig;
use switchyard_core::error::Result;
use switchyard_core::EventBus;

use crate::channel::ChannelSpec;
use crate::compiled::CompiledGraph;
use crate::edge::{RouteLabel, RouteSpec, Target, END};
use crate::error::CompileError;
use crate::node::{node_fn, Node, NodeContext};
use crate::router::{NodeId, Resolved, Router, Rule};
use crate::state::{State, StateUpdate};

/// Graph definition under construction.
///
/// Nothing is validated until [`compile`](StateGraph::compile); the builder
/// just records declarations in order.
pub struct StateGraph {
    name: String,
    channels: Vec<ChannelSpec>,
    nodes: Vec<(String, Arc<dyn Node>)>,
    routes: Vec<(String, RouteSpec)>,
    entry: Option<String>,
    config: ExecutorConfig,
    event_bus: Option<Arc<EventBus>>,
}

impl StateGraph {
    pub fn new(name: impl Into<String>, channels: impl IntoIterator<Item = ChannelSpec>) -> Self {
        Self {
            name: name.into(),
            channels: channels.into_iter().collect(),
            nodes: Vec::new(),
            routes: Vec::new(),
            entry: None,
            config: ExecutorConfig::default(),
            event_bus: None,
        }
    }

    pub fn add_channel(&mut self, spec: ChannelSpec) -> &mut Self {
        self.channels.push(spec);
        self
    }

    pub fn add_node(&mut self, name: impl Into<String>, node: impl Node) -> &mut Self {
        self.nodes.push((name.into(), Arc::new(node)));
        self
    }

    /// Register an async closure as a node.
    pub fn add_node_fn<F, Fut>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(State, NodeContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<StateUpdate>> + Send + 'static,
    {
        self.add_node(name, node_fn(f))
    }

    /// Static routing rule. `to` may be [`END`].
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<Target>) -> &mut Self {
        self.routes.push((from.into(), RouteSpec::Static(to.into())));
        self
    }

    /// Conditional routing rule: `decide` maps the post-merge snapshot to a
    /// label, `table` maps labels to targets.
    pub fn add_conditional_edges<L, F, K, T>(
        &mut self,
        from: impl Into<String>,
        decide: F,
        table: impl IntoIterator<Item = (K, T)>,
    ) -> &mut Self
    where
        L: RouteLabel,
        F: Fn(&State) -> L + Send + Sync + 'static,
        K: Into<String>,
        T: Into<Target>,
    {
        let table = table
            .into_iter()
            .map(|(label, target)| (label.into(), target.into()))
            .collect();
        self.routes
            .push((from.into(), RouteSpec::conditional(decide, table)));
        self
    }

    pub fn set_entry_point(&mut self, name: impl Into<String>) -> &mut Self {
        self.entry = Some(name.into());
        self
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Validate the definition and produce an executable graph.
    ///
    /// Pure: the builder is left as it was and compiling it again yields an
    /// equivalent graph.
    pub fn compile(&self) -> std::result::Result<CompiledGraph, CompileError> {
        let mut seen = HashSet::new();
        for spec in &self.channels {
            if !seen.insert(spec.name.as_str()) {
                return Err(CompileError::DuplicateChannel(spec.name.clone()));
            }
        }

        let mut index: HashMap<String, NodeId> = HashMap::with_capacity(self.nodes.len());
        for (i, (name, _)) in self.nodes.iter().enumerate() {
            if name.is_empty() || name == END {
                return Err(CompileError::InvalidNodeName(name.clone()));
            }
            if index.insert(name.clone(), NodeId(i)).is_some() {
                return Err(CompileError::DuplicateNode(name.clone()));
            }
        }

        let entry = match &self.entry {
            None => return Err(CompileError::MissingEntryPoint),
            Some(name) => *index
                .get(name)
                .ok_or_else(|| CompileError::UnknownEntryPoint(name.clone()))?,
        };

        let mut rules: Vec<Option<Rule>> = vec![None; self.nodes.len()];
        for (from, spec) in &self.routes {
            let id = *index
                .get(from)
                .ok_or_else(|| CompileError::UnknownSource(from.clone()))?;
            if rules[id.0].is_some() {
                return Err(CompileError::DuplicateRoute(from.clone()));
            }
            rules[id.0] = Some(resolve_rule(from, spec, &index)?);
        }

        let rules = rules
            .into_iter()
            .enumerate()
            .map(|(i, rule)| {
                rule.ok_or_else(|| CompileError::MissingRoute(self.nodes[i].0.clone()))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let names: Vec<String> = self.nodes.iter().map(|(name, _)| name.clone()).collect();

        Ok(CompiledGraph {
            name: self.name.clone(),
            channels: self.channels.clone(),
            nodes: self.nodes.iter().map(|(_, n)| n.clone()).collect(),
            router: Router::new(rules, names.clone()),
            names,
            index,
            entry,
            config: self.config.clone(),
            event_bus: self.event_bus.clone(),
        })
    }
}

fn resolve_target(
    from: &str,
    target: &Target,
    index: &HashMap<String, NodeId>,
) -> std::result::Result<Resolved, CompileError> {
    match target {
        Target::End => Ok(Resolved::End),
        Target::Node(name) => index
            .get(name)
            .map(|id| Resolved::Node(*id))
            .ok_or_else(|| CompileError::DanglingEdge {
                from: from.to_string(),
                to: name.clone(),
            }),
    }
}

fn resolve_rule(
    from: &str,
    spec: &RouteSpec,
    index: &HashMap<String, NodeId>,
) -> std::result::Result<Rule, CompileError> {
    match spec {
        RouteSpec::Static(target) => Ok(Rule::Static(resolve_target(from, target, index)?)),
        RouteSpec::Conditional {
            decide,
            table,
            declared,
        } => {
            let mut resolved = BTreeMap::new();
            for (label, target) in table {
                let target = resolve_target(from, target, index)?;
                if resolved.insert(label.clone(), target).is_some() {
                    return Err(CompileError::DuplicateLabel {
                        node: from.to_string(),
                        label: label.clone(),
                    });
                }
            }
            if let Some(declared) = declared {
                if let Some(missing) = declared.iter().find(|l| !resolved.contains_key(**l)) {
                    return Err(CompileError::UnmappedLabel {
                        node: from.to_string(),
                        label: missing.to_string(),
                    });
                }
                if let Some(extra) = resolved
                    .keys()
                    .find(|l| !declared.iter().any(|d| *d == l.as_str()))
                {
                    return Err(CompileError::UnknownLabel {
                        node: from.to_string(),
                        label: extra.clone(),
                    });
                }
            }
            Ok(Rule::Conditional {
                decide: decide.clone(),
                table: resolved,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelSpec;

    fn noop(graph: &mut StateGraph, name: &str) {
        graph.add_node_fn(name, |_s: State, _c: NodeContext| async {
            Ok(StateUpdate::new())
        });
    }

    fn base() -> StateGraph {
        let mut g = StateGraph::new("test", [ChannelSpec::replace("x", 0)]);
        noop(&mut g, "a");
        noop(&mut g, "b");
        g.set_entry_point("a");
        g
    }

    #[test]
    fn valid_graph_compiles() {
        let mut g = base();
        g.add_edge("a", "b").add_edge("b", END);
        let compiled = g.compile().unwrap();
        assert_eq!(compiled.node_names(), vec!["a", "b"]);
        assert_eq!(compiled.entry_point(), "a");
    }

    #[test]
    fn dangling_static_edge_rejected() {
        let mut g = base();
        g.add_edge("a", "ghost").add_edge("b", END);
        assert_eq!(
            g.compile().unwrap_err(),
            CompileError::DanglingEdge {
                from: "a".into(),
                to: "ghost".into(),
            }
        );
    }

    #[test]
    fn dangling_conditional_target_rejected() {
        let mut g = base();
        g.add_conditional_edges(
            "a",
            |_s: &State| "go",
            [("go", "b"), ("stop", "nowhere")],
        )
        .add_edge("b", END);
        assert!(matches!(
            g.compile().unwrap_err(),
            CompileError::DanglingEdge { to, .. } if to == "nowhere"
        ));
    }

    #[test]
    fn entry_point_checks() {
        let mut g = StateGraph::new("t", Vec::<ChannelSpec>::new());
        noop(&mut g, "a");
        g.add_edge("a", END);
        assert_eq!(g.compile().unwrap_err(), CompileError::MissingEntryPoint);
        g.set_entry_point("nope");
        assert_eq!(
            g.compile().unwrap_err(),
            CompileError::UnknownEntryPoint("nope".into())
        );
    }

    #[test]
    fn duplicate_node_rejected() {
        let mut g = base();
        noop(&mut g, "a");
        g.add_edge("a", END).add_edge("b", END);
        assert_eq!(
            g.compile().unwrap_err(),
            CompileError::DuplicateNode("a".into())
        );
    }

    #[test]
    fn end_is_not_a_node_name() {
        let mut g = base();
        noop(&mut g, END);
        assert_eq!(
            g.compile().unwrap_err(),
            CompileError::InvalidNodeName(END.into())
        );
    }

    #[test]
    fn duplicate_channel_rejected() {
        let mut g = base();
        g.add_channel(ChannelSpec::replace("x", 1));
        assert_eq!(
            g.compile().unwrap_err(),
            CompileError::DuplicateChannel("x".into())
        );
    }

    #[test]
    fn routing_rule_count_enforced() {
        let mut g = base();
        g.add_edge("a", "b");
        assert_eq!(
            g.compile().unwrap_err(),
            CompileError::MissingRoute("b".into())
        );

        g.add_edge("b", END)
            .add_conditional_edges("a", |_s: &State| "x", [("x", END)]);
        assert_eq!(
            g.compile().unwrap_err(),
            CompileError::DuplicateRoute("a".into())
        );
    }

    #[test]
    fn edge_from_unknown_node_rejected() {
        let mut g = base();
        g.add_edge("a", "b")
            .add_edge("b", END)
            .add_edge("ghost", "a");
        assert_eq!(
            g.compile().unwrap_err(),
            CompileError::UnknownSource("ghost".into())
        );
    }

    #[test]
    fn duplicate_label_rejected() {
        let mut g = base();
        g.add_conditional_edges("a", |_s: &State| "x", [("x", "b"), ("x", END)])
            .add_edge("b", END);
        assert!(matches!(
            g.compile().unwrap_err(),
            CompileError::DuplicateLabel { label, .. } if label == "x"
        ));
    }

    #[derive(Clone, Copy)]
    enum Gate {
        Open,
        Shut,
    }

    impl RouteLabel for Gate {
        fn label(&self) -> &str {
            match self {
                Gate::Open => "open",
                Gate::Shut => "shut",
            }
        }

        fn declared() -> Option<Vec<&'static str>> {
            Some(vec!["open", "shut"])
        }
    }

    #[test]
    fn declared_labels_must_all_be_mapped() {
        let mut g = base();
        g.add_conditional_edges("a", |_s: &State| Gate::Open, [("open", "b")])
            .add_edge("b", END);
        assert_eq!(
            g.compile().unwrap_err(),
            CompileError::UnmappedLabel {
                node: "a".into(),
                label: "shut".into(),
            }
        );
    }

    #[test]
    fn table_may_not_name_impossible_labels() {
        let mut g = base();
        g.add_conditional_edges(
            "a",
            |_s: &State| Gate::Shut,
            [("open", "b"), ("shut", END), ("ajar", "b")],
        )
        .add_edge("b", END);
        assert_eq!(
            g.compile().unwrap_err(),
            CompileError::UnknownLabel {
                node: "a".into(),
                label: "ajar".into(),
            }
        );
    }

    #[test]
    fn compile_is_repeatable() {
        let mut g = base();
        g.add_conditional_edges("a", |_s: &State| Gate::Open, [("open", "b"), ("shut", END)])
            .add_edge("b", END);
        let first = g.compile().unwrap();
        let second = g.compile().unwrap();
        assert_eq!(first.describe(), second.describe());
        assert_eq!(first.node_names(), second.node_names());
        assert_eq!(first.entry_point(), second.entry_point());
    }
}
