use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use switchyard_core::config::ModelConfig;
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::ModelClient;
use switchyard_core::types::{ChatMessage, Role};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI-compatible chat completions client. Works with OpenAI, Ollama, vLLM, Groq, OpenRouter.
pub struct OpenAiClient {
    http: Client,
    config: ModelConfig,
}

impl OpenAiClient {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<OaiMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct OaiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn parse_response(body: &str) -> Result<String> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| SwitchyardError::ModelParse(e.to_string()))?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|text| !text.is_empty())
        .ok_or_else(|| {
            SwitchyardError::ModelParse("response contained no message content".into())
        })
}

impl ModelClient for OpenAiClient {
    fn invoke(&self, messages: Vec<ChatMessage>) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let url = self.config.base_url.as_deref().unwrap_or(OPENAI_API_URL);
            let body = ChatRequest {
                model: &self.config.model_id,
                messages: messages
                    .iter()
                    .map(|m| OaiMessage {
                        role: role_name(m.role),
                        content: &m.content,
                    })
                    .collect(),
                max_tokens: self.config.max_tokens,
                temperature: (self.config.temperature > 0.0).then_some(self.config.temperature),
            };

            debug!(model = %self.config.model_id, url, "Sending model request");

            let mut request = self.http.post(url).json(&body);
            // Local servers (Ollama, vLLM) run without a key.
            if let Some(key) = self.config.api_key.as_deref() {
                request = request.bearer_auth(key);
            }

            let response = request
                .send()
                .await
                .map_err(|e| SwitchyardError::ModelRequest(e.to_string()))?;
            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| SwitchyardError::ModelRequest(e.to_string()))?;
            if !status.is_success() {
                return Err(SwitchyardError::ModelRequest(format!(
                    "HTTP {}: {}",
                    status, text
                )));
            }
            parse_response(&text)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_choice_is_the_reply() {
        let body = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"IGNORE"}}]}"#;
        assert_eq!(parse_response(body).unwrap(), "IGNORE");
    }

    #[test]
    fn no_choices_is_a_parse_error() {
        assert!(matches!(
            parse_response(r#"{"choices":[]}"#),
            Err(SwitchyardError::ModelParse(_))
        ));
    }

    #[test]
    fn roles_map_to_wire_names() {
        assert_eq!(role_name(Role::System), "system");
        assert_eq!(role_name(Role::Assistant), "assistant");
    }
}
