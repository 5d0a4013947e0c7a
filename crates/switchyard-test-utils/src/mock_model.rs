use std::collections::VecDeque;

use futures::future::BoxFuture;
use tokio::sync::Mutex;

use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::ModelClient;
use switchyard_core::types::{ChatMessage, Role};

/// Model that answers from a script and records every prompt it receives.
///
/// Matchers are tried first (substring of the last user message), then the
/// reply queue, then the fallback. With none of those left, the call fails.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    matchers: Vec<(String, String)>,
    fallback: Option<String>,
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedModel {
    /// Replies are returned in order, one per call.
    pub fn new(replies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    /// Always the same reply.
    pub fn always(reply: impl Into<String>) -> Self {
        Self::default().with_fallback(reply)
    }

    /// Reply with `reply` whenever the last user message contains `needle`.
    pub fn when(mut self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        self.matchers.push((needle.into(), reply.into()));
        self
    }

    pub fn with_fallback(mut self, reply: impl Into<String>) -> Self {
        self.fallback = Some(reply.into());
        self
    }

    /// Every prompt received so far, oldest first.
    pub async fn prompts(&self) -> Vec<Vec<ChatMessage>> {
        self.prompts.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.prompts.lock().await.len()
    }
}

impl ModelClient for ScriptedModel {
    fn invoke(&self, messages: Vec<ChatMessage>) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let last_user = messages
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.clone())
                .unwrap_or_default();
            self.prompts.lock().await.push(messages);

            if let Some((_, reply)) = self
                .matchers
                .iter()
                .find(|(needle, _)| last_user.contains(needle.as_str()))
            {
                return Ok(reply.clone());
            }
            if let Some(reply) = self.replies.lock().await.pop_front() {
                return Ok(reply);
            }
            self.fallback
                .clone()
                .ok_or_else(|| SwitchyardError::ModelRequest("script exhausted".into()))
        })
    }
}

/// Model whose every call fails with a request error.
pub struct FailingModel {
    message: String,
}

impl FailingModel {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Default for FailingModel {
    fn default() -> Self {
        Self::new("503 Service Unavailable")
    }
}

impl ModelClient for FailingModel {
    fn invoke(&self, _messages: Vec<ChatMessage>) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            Err(SwitchyardError::ModelRequest(self.message.clone()))
        })
    }
}
