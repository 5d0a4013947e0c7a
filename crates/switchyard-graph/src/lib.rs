//! Graph execution engine for stateful, cyclic workflow graphs.
//!
//! A graph is a set of named [`Node`]s that share typed state through
//! [`channels`](channel) with per-channel reducers. Every node has exactly one
//! routing rule: a static edge or a conditional edge that maps a label,
//! computed from the merged state, to the next node or [`END`].
//!
//! [`StateGraph`] collects the definition, [`StateGraph::compile`] validates it
//! into a [`CompiledGraph`], and [`CompiledGraph::invoke`] runs it one step at
//! a time until it completes, is cancelled through an [`Interrupt`], or fails.

pub mod builder;
pub mod channel;
pub mod compiled;
pub mod edge;
pub mod error;
pub mod executor;
pub mod interrupt;
pub mod node;
pub mod router;
pub mod state;

pub use builder::StateGraph;
pub use channel::{ChannelSpec, ChannelStore, Reducer};
pub use compiled::CompiledGraph;
pub use edge::{RouteLabel, Target, END};
pub use error::{CompileError, RunError};
pub use executor::{RunOutcome, StepRecord};
pub use interrupt::{Interrupt, SleepOutcome};
pub use node::{node_fn, FnNode, Node, NodeContext};
pub use router::{NodeId, Route};
pub use state::{State, StateUpdate};
