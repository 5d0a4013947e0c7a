use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;

use switchyard_core::error::Result;
use switchyard_core::types::RunId;

use crate::interrupt::{Interrupt, SleepOutcome};
use crate::state::{State, StateUpdate};

/// A unit of work in the graph.
///
/// A node reads the snapshot it was invoked with and returns a partial update.
/// It may suspend (model call, timer, external signal) and it may fail; a
/// failure stops the run unless the node converts it into an update itself.
pub trait Node: Send + Sync + 'static {
    fn run(&self, state: State, ctx: NodeContext) -> BoxFuture<'_, Result<StateUpdate>>;
}

/// Per-invocation context handed to a node alongside its state snapshot.
#[derive(Debug, Clone)]
pub struct NodeContext {
    run_id: RunId,
    node: String,
    step: usize,
    interrupt: Interrupt,
}

impl NodeContext {
    pub fn new(run_id: RunId, node: impl Into<String>, step: usize, interrupt: Interrupt) -> Self {
        Self {
            run_id,
            node: node.into(),
            step,
            interrupt,
        }
    }

    /// Context for calling a node outside of a run (tests, tools).
    pub fn detached(node: impl Into<String>) -> Self {
        Self::new(RunId::new(), node, 0, Interrupt::new())
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    /// Zero-based index of the step this invocation belongs to.
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.interrupt.is_cancel_requested()
    }

    /// Cancellable sleep; see [`Interrupt::sleep`].
    pub async fn sleep(&self, duration: Duration) -> SleepOutcome {
        self.interrupt.sleep(duration).await
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        self.interrupt.cancelled().await
    }
}

/// Adapts an async closure into a [`Node`].
pub struct FnNode<F> {
    f: F,
}

impl<F, Fut> Node for FnNode<F>
where
    F: Fn(State, NodeContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StateUpdate>> + Send + 'static,
{
    fn run(&self, state: State, ctx: NodeContext) -> BoxFuture<'_, Result<StateUpdate>> {
        Box::pin((self.f)(state, ctx))
    }
}

/// Wrap `f` as a node.
pub fn node_fn<F, Fut>(f: F) -> FnNode<F>
where
    F: Fn(State, NodeContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StateUpdate>> + Send + 'static,
{
    FnNode { f }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::SwitchyardError;

    #[tokio::test]
    async fn closure_node_runs() {
        let node = node_fn(|state: State, ctx: NodeContext| async move {
            let n = state.get_u64("n").unwrap_or(0);
            Ok(StateUpdate::new()
                .set("n", n + 1)
                .set("by", ctx.node().to_string()))
        });

        let state: State = [("n", 41)].into_iter().collect();
        let update = node.run(state, NodeContext::detached("inc")).await.unwrap();
        assert_eq!(update.get("n"), Some(&serde_json::json!(42)));
        assert_eq!(update.get("by"), Some(&serde_json::json!("inc")));
    }

    #[tokio::test]
    async fn closure_node_fails() {
        let node = node_fn(|_state: State, _ctx: NodeContext| async move {
            Err::<StateUpdate, _>(SwitchyardError::node("boom"))
        });
        let err = node
            .run(State::default(), NodeContext::detached("bad"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn context_accessors() {
        let interrupt = Interrupt::new();
        let ctx = NodeContext::new(RunId::from_string("r"), "n", 3, interrupt.clone());
        assert_eq!(ctx.step(), 3);
        assert_eq!(ctx.run_id().0, "r");
        assert!(!ctx.is_cancel_requested());
        interrupt.request_cancel();
        assert!(ctx.is_cancel_requested());
    }
}
