use thiserror::Error;

use switchyard_core::SwitchyardError;

/// A graph definition that cannot be executed.
///
/// Returned by [`StateGraph::compile`](crate::StateGraph::compile) before any node runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("no entry point set")]
    MissingEntryPoint,

    #[error("entry point '{0}' is not a declared node")]
    UnknownEntryPoint(String),

    #[error("node '{0}' is declared more than once")]
    DuplicateNode(String),

    #[error("invalid node name '{0}'")]
    InvalidNodeName(String),

    #[error("channel '{0}' is declared more than once")]
    DuplicateChannel(String),

    #[error("edge from '{0}', which is not a declared node")]
    UnknownSource(String),

    #[error("edge '{from}' -> '{to}' targets an undeclared node")]
    DanglingEdge { from: String, to: String },

    #[error("node '{0}' has more than one routing rule")]
    DuplicateRoute(String),

    #[error("node '{0}' has no routing rule")]
    MissingRoute(String),

    #[error("conditional edge on '{node}' maps label '{label}' twice")]
    DuplicateLabel { node: String, label: String },

    #[error("conditional edge on '{node}' has no target for label '{label}'")]
    UnmappedLabel { node: String, label: String },

    #[error("conditional edge on '{node}' maps label '{label}' its decision never returns")]
    UnknownLabel { node: String, label: String },
}

/// Why a run ended in `FAILED`.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("routing error at '{node}': label '{label}' has no target")]
    Routing { node: String, label: String },

    #[error("node '{node}' failed: {source}")]
    Node {
        node: String,
        #[source]
        source: SwitchyardError,
    },

    #[error("node '{node}' timed out after {timeout_ms}ms")]
    NodeTimeout { node: String, timeout_ms: u64 },

    #[error("step budget of {budget} exceeded after node '{node}'")]
    StepBudgetExceeded { budget: usize, node: String },

    #[error("node '{node}' wrote undeclared channel '{channel}'")]
    UnknownChannel { node: String, channel: String },

    #[error("initial state names undeclared channel '{0}'")]
    InvalidInput(String),

    #[error("node '{node}' routed to {count} targets; only one next node is supported")]
    FanOut { node: String, count: usize },

    #[error("unknown node: {0}")]
    UnknownNode(String),
}

impl RunError {
    /// Name of the node the failure is attributed to, if any.
    pub fn node(&self) -> Option<&str> {
        match self {
            Self::Routing { node, .. }
            | Self::Node { node, .. }
            | Self::NodeTimeout { node, .. }
            | Self::StepBudgetExceeded { node, .. }
            | Self::UnknownChannel { node, .. }
            | Self::FanOut { node, .. } => Some(node),
            Self::InvalidInput(_) | Self::UnknownNode(_) => None,
        }
    }
}

/// An update named a channel the graph never declared.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown channel: {0}")]
pub struct UnknownChannel(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_error_names_offender() {
        let err = CompileError::DanglingEdge {
            from: "a".into(),
            to: "ghost".into(),
        };
        assert_eq!(
            err.to_string(),
            "edge 'a' -> 'ghost' targets an undeclared node"
        );
    }

    #[test]
    fn node_error_keeps_source() {
        use std::error::Error as _;

        let err = RunError::Node {
            node: "review".into(),
            source: SwitchyardError::ModelRequest("503".into()),
        };
        assert_eq!(err.node(), Some("review"));
        assert!(err.source().is_some());
        assert!(err.to_string().contains("review"));
    }

    #[test]
    fn input_error_has_no_node() {
        assert_eq!(RunError::InvalidInput("x".into()).node(), None);
    }
}
