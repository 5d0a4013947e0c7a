//! Support bot: keyword retrieval over a small knowledge base, then an answer
//! grounded in whatever was retrieved.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use switchyard_core::config::ExecutorConfig;
use switchyard_core::error::Result;
use switchyard_core::traits::ModelClient;
use switchyard_core::types::ChatMessage;
use switchyard_graph::{
    ChannelSpec, CompileError, CompiledGraph, Node, NodeContext, State, StateGraph, StateUpdate,
    END,
};

pub const QUESTION: &str = "question";
pub const RETRIEVED_DOCS: &str = "retrieved_docs";
pub const ANSWER: &str = "answer";

pub const RETRIEVE: &str = "retrieve";
pub const GENERATE: &str = "generate";

const NO_DOCS: &str = "No relevant documentation found.";
const ANSWER_PROMPT: &str =
    "You are a helpful support agent. Answer the user using ONLY the context provided below. If unsure, say 'I don't know'.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Doc {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    pub text: String,
}

impl Doc {
    fn new(id: u32, text: &str) -> Self {
        Self {
            id: Some(id),
            text: text.to_string(),
        }
    }
}

/// The product docs the bot can answer from.
pub fn knowledge_base() -> Vec<Doc> {
    vec![
        Doc::new(
            1,
            "The API rate limit is 1000 requests per minute for Pro users.",
        ),
        Doc::new(
            2,
            "To reset your API key, go to Settings > Security > Rotate Keys.",
        ),
        Doc::new(
            3,
            "Error 500 means the server is down. Check status.supercloud.com.",
        ),
        Doc::new(4, "The SDK supports Python 3.8+ and Node.js 14+."),
    ]
}

/// Docs sharing at least one word longer than three characters with the
/// question. Never empty: falls back to a single "nothing found" doc.
pub fn retrieve(question: &str, docs: &[Doc]) -> Vec<Doc> {
    let query = question.to_lowercase();
    let words: Vec<&str> = query
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| w.chars().count() > 3)
        .collect();

    let hits: Vec<Doc> = docs
        .iter()
        .filter(|doc| {
            let text = doc.text.to_lowercase();
            words.iter().any(|w| text.contains(w))
        })
        .cloned()
        .collect();

    if hits.is_empty() {
        vec![Doc {
            id: None,
            text: NO_DOCS.to_string(),
        }]
    } else {
        hits
    }
}

pub struct SupportDeps {
    pub model: Arc<dyn ModelClient>,
    pub docs: Vec<Doc>,
}

impl SupportDeps {
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self {
            model,
            docs: knowledge_base(),
        }
    }
}

pub fn channels() -> Vec<ChannelSpec> {
    vec![
        ChannelSpec::replace(QUESTION, Value::Null),
        ChannelSpec::replace(RETRIEVED_DOCS, json!([])),
        ChannelSpec::replace(ANSWER, Value::Null),
    ]
}

pub fn input(question: impl Into<String>) -> StateUpdate {
    StateUpdate::new().set(QUESTION, question.into())
}

pub fn graph(deps: SupportDeps) -> StateGraph {
    let mut g = StateGraph::new("support_bot", channels());
    g.add_node(RETRIEVE, Retrieve { docs: deps.docs });
    g.add_node(GENERATE, Generate { model: deps.model });
    g.set_entry_point(RETRIEVE)
        .add_edge(RETRIEVE, GENERATE)
        .add_edge(GENERATE, END);
    g
}

pub fn build(
    deps: SupportDeps,
    executor: &ExecutorConfig,
) -> std::result::Result<CompiledGraph, CompileError> {
    graph(deps).with_config(executor.clone()).compile()
}

struct Retrieve {
    docs: Vec<Doc>,
}

impl Node for Retrieve {
    fn run(&self, state: State, _ctx: NodeContext) -> BoxFuture<'_, Result<StateUpdate>> {
        Box::pin(async move {
            let question = state.get_str(QUESTION).unwrap_or_default();
            let found = retrieve(question, &self.docs);
            info!(question, found = found.len(), "Searched docs");
            let found = serde_json::to_value(found)?;
            Ok(StateUpdate::new().set(RETRIEVED_DOCS, found))
        })
    }
}

struct Generate {
    model: Arc<dyn ModelClient>,
}

impl Node for Generate {
    fn run(&self, state: State, _ctx: NodeContext) -> BoxFuture<'_, Result<StateUpdate>> {
        Box::pin(async move {
            let question = state.get_str(QUESTION).unwrap_or_default();
            let docs: Vec<Doc> = state.get_as(RETRIEVED_DOCS).unwrap_or_default();
            let context = docs
                .iter()
                .map(|d| format!("- {}", d.text))
                .collect::<Vec<_>>()
                .join("\n");

            let answer = self
                .model
                .invoke(vec![
                    ChatMessage::system(ANSWER_PROMPT),
                    ChatMessage::user(format!("Context:\n{context}\n\nQuestion: {question}")),
                ])
                .await?;
            info!(chars = answer.len(), "Generated answer");
            Ok(StateUpdate::new().set(ANSWER, answer))
        })
    }
}
