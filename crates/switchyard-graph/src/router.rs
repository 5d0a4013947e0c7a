//! Resolves a node's routing rule against a merged snapshot.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::edge::DecideFn;
use crate::error::RunError;
use crate::state::State;

/// Stable identifier of a node inside a compiled graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resolved {
    Node(NodeId),
    End,
}

#[derive(Clone)]
pub(crate) enum Rule {
    Static(Resolved),
    Conditional {
        decide: Arc<DecideFn>,
        table: BTreeMap<String, Resolved>,
    },
}

/// Result of routing out of a node.
///
/// Every graph shape supported today yields at most one next node; the
/// sequence form leaves room for fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Next(Vec<NodeId>),
    End,
}

impl From<Resolved> for Route {
    fn from(resolved: Resolved) -> Self {
        match resolved {
            Resolved::Node(id) => Self::Next(vec![id]),
            Resolved::End => Self::End,
        }
    }
}

/// Adjacency table of a compiled graph: one rule per node, indexed by [`NodeId`].
#[derive(Clone)]
pub(crate) struct Router {
    rules: Vec<Rule>,
    names: Vec<String>,
}

impl Router {
    pub(crate) fn new(rules: Vec<Rule>, names: Vec<String>) -> Self {
        Self { rules, names }
    }

    /// Pick the successor(s) of `from`. Never mutates state.
    pub(crate) fn route(&self, from: NodeId, state: &State) -> Result<Route, RunError> {
        let name = self.name(from);
        match self.rules.get(from.0) {
            None => Err(RunError::UnknownNode(name.to_string())),
            Some(Rule::Static(target)) => Ok((*target).into()),
            Some(Rule::Conditional { decide, table }) => {
                let label = decide(state);
                match table.get(&label) {
                    Some(target) => Ok((*target).into()),
                    None => Err(RunError::Routing {
                        node: name.to_string(),
                        label,
                    }),
                }
            }
        }
    }

    pub(crate) fn name(&self, id: NodeId) -> &str {
        self.names.get(id.0).map(String::as_str).unwrap_or("?")
    }

    /// One human-readable line per routing rule, in declaration order.
    pub(crate) fn describe(&self) -> Vec<String> {
        self.rules
            .iter()
            .enumerate()
            .map(|(i, rule)| {
                let from = self.name(NodeId(i));
                match rule {
                    Rule::Static(target) => format!("{from} -> {}", self.target_name(*target)),
                    Rule::Conditional { table, .. } => {
                        let arms: Vec<String> = table
                            .iter()
                            .map(|(label, target)| {
                                format!("{label} => {}", self.target_name(*target))
                            })
                            .collect();
                        format!("{from} -?-> [{}]", arms.join(" | "))
                    }
                }
            })
            .collect()
    }

    fn target_name(&self, target: Resolved) -> &str {
        match target {
            Resolved::Node(id) => self.name(id),
            Resolved::End => "END",
        }
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.describe()).finish()
    }
}
