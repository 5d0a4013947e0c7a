use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of one graph run.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a run. `Running` is the only state in which steps occur.
///
/// `Ready` names a compiled graph that has not been invoked; no event or
/// outcome carries it. `Running` is announced by [`RunEvent::RunStarted`],
/// and every [`RunEvent::RunFinished`] carries one of the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Ready,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Ready => "READY",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Role in a model conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single prompt message handed to a [`ModelClient`](crate::traits::ModelClient).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
        }
    }
}

/// One item read from an external feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedItem {
    pub id: u64,
    pub content: String,
    #[serde(default)]
    pub urgent: bool,
}

/// Result of polling a feed once.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedPoll {
    /// A new item is available.
    Item(FeedItem),
    /// Nothing new this tick.
    Empty,
    /// The feed will never produce another item.
    Exhausted,
}

/// A request for an external party to approve something a node is about to do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: String,
    pub subject: String,
    pub summary: String,
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
}

impl ApprovalRequest {
    pub fn new(subject: impl Into<String>, summary: impl Into<String>, run_id: &RunId) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            subject: subject.into(),
            summary: summary.into(),
            run_id: run_id.0.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// The answer to an [`ApprovalRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Denied { reason: String },
}

/// Events published while a graph runs.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// A run started at its entry point.
    RunStarted {
        run_id: RunId,
        graph: String,
        entry: String,
        status: RunStatus,
    },
    /// A node was invoked.
    NodeStarted {
        run_id: RunId,
        node: String,
        step: usize,
    },
    /// A node returned and its update was merged.
    NodeCompleted {
        run_id: RunId,
        node: String,
        step: usize,
        elapsed_ms: u64,
    },
    /// A node failed; the run stops.
    NodeFailed {
        run_id: RunId,
        node: String,
        error: String,
    },
    /// A run reached a terminal status.
    RunFinished {
        run_id: RunId,
        status: RunStatus,
        steps: usize,
    },
    /// An approval was requested from an external party.
    ApprovalRequested { request: ApprovalRequest },
    /// An approval was resolved.
    ApprovalResolved { request_id: String, approved: bool },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_terminal() {
        assert!(!RunStatus::Ready.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }

    #[test]
    fn run_status_serializes_uppercase() {
        let json = serde_json::to_string(&RunStatus::Cancelled).unwrap();
        assert_eq!(json, "\"CANCELLED\"");
        assert_eq!(RunStatus::Failed.to_string(), "FAILED");
    }

    #[test]
    fn approval_decision_tagged() {
        let json = serde_json::to_value(ApprovalDecision::Denied {
            reason: "over budget".into(),
        })
        .unwrap();
        assert_eq!(json["decision"], "denied");
        assert_eq!(json["reason"], "over budget");
    }

    #[test]
    fn run_ids_are_unique() {
        assert_ne!(RunId::new(), RunId::new());
        assert_eq!(RunId::from_string("abc").to_string(), "abc");
    }
}
