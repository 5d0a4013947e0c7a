use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::*;

/// Language model: an opaque, fallible `messages -> text` call.
///
/// Implementations must not retry; a failure is returned to the calling node,
/// which decides whether to degrade or to fail the run.
pub trait ModelClient: Send + Sync + 'static {
    /// Send the prompt and return the model's text reply.
    fn invoke(&self, messages: Vec<ChatMessage>) -> BoxFuture<'_, Result<String>>;
}

/// A named function a node may call with JSON arguments.
pub trait Tool: Send + Sync + 'static {
    /// Tool name (used for lookup in a [`ToolRegistry`](crate::registry::ToolRegistry)).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Run the tool.
    fn call(&self, args: serde_json::Value) -> BoxFuture<'_, Result<serde_json::Value>>;

    /// Timeout in seconds for one call.
    fn timeout_secs(&self) -> u64 {
        30
    }
}

/// External event source polled by monitoring nodes.
///
/// A feed is a single-writer resource: polling advances its cursor, so one
/// feed instance should back at most one run at a time.
pub trait FeedSource: Send + Sync + 'static {
    /// Read the next event, if any.
    fn poll(&self) -> BoxFuture<'_, Result<FeedPoll>>;
}

/// External approver a node can pause on (e.g. a human manager).
pub trait Approver: Send + Sync + 'static {
    /// Ask for a decision. The future resolves once somebody has answered.
    fn request(&self, request: ApprovalRequest) -> BoxFuture<'_, Result<ApprovalDecision>>;
}
