use std::fmt;
use std::sync::Arc;

use crate::state::State;

/// Terminal marker. Routing to it ends the run.
pub const END: &str = "__end__";

/// Where a routing rule leads.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Node(String),
    End,
}

impl Target {
    pub fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }
}

impl From<&str> for Target {
    fn from(name: &str) -> Self {
        if name == END {
            Self::End
        } else {
            Self::Node(name.to_string())
        }
    }
}

impl From<String> for Target {
    fn from(name: String) -> Self {
        if name == END {
            Self::End
        } else {
            Self::Node(name)
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(name) => f.write_str(name),
            Self::End => f.write_str("END"),
        }
    }
}

/// Outcome of a conditional edge's decision function.
///
/// Plain strings work, but a closed enum that reports its
/// [`declared`](RouteLabel::declared) labels lets the compiler check the
/// label table against every outcome the decision can produce.
pub trait RouteLabel: Send + Sync + 'static {
    fn label(&self) -> &str;

    /// Every label this type can produce, if the set is closed.
    fn declared() -> Option<Vec<&'static str>>
    where
        Self: Sized,
    {
        None
    }
}

impl RouteLabel for String {
    fn label(&self) -> &str {
        self
    }
}

impl RouteLabel for &'static str {
    fn label(&self) -> &str {
        self
    }
}

/// Decision function with its label type erased.
pub(crate) type DecideFn = dyn Fn(&State) -> String + Send + Sync;

/// Routing rule as declared on the builder, before name resolution.
#[derive(Clone)]
pub(crate) enum RouteSpec {
    Static(Target),
    Conditional {
        decide: Arc<DecideFn>,
        table: Vec<(String, Target)>,
        declared: Option<Vec<&'static str>>,
    },
}

impl RouteSpec {
    pub(crate) fn conditional<L, F>(decide: F, table: Vec<(String, Target)>) -> Self
    where
        L: RouteLabel,
        F: Fn(&State) -> L + Send + Sync + 'static,
    {
        Self::Conditional {
            decide: Arc::new(move |state: &State| {
                decide(state).label().to_string()
            }),
            table,
            declared: L::declared(),
        }
    }
}
