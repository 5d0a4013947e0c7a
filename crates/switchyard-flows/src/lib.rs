//! Graphs built on the switchyard executor, with the mock collaborators
//! they run against by default.
//!
//! Each flow module exposes channel and node name constants, a `Deps`
//! struct holding its injected collaborators, `graph()` returning the
//! uncompiled [`StateGraph`](switchyard_graph::StateGraph), `build()`
//! returning a compiled graph, and `input()` for the initial state.

pub mod approval;
pub mod expense;
pub mod json;
pub mod monitor;
pub mod sales;
pub mod support;

pub use approval::{ApprovalBroker, AutoApprover};
