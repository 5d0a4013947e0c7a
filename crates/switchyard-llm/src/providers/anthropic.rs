use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use switchyard_core::config::ModelConfig;
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::ModelClient;
use switchyard_core::types::{ChatMessage, Role};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API client. One request per call, no streaming.
pub struct AnthropicClient {
    http: Client,
    config: ModelConfig,
}

impl AnthropicClient {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }
}

// Anthropic API request types
#[derive(Serialize, Debug)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Serialize, Debug, PartialEq)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

// Anthropic API response types
#[derive(Deserialize, Debug)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug)]
struct UsageInfo {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

/// System messages are lifted into the top-level `system` field; several are
/// joined with blank lines.
fn convert_messages(messages: Vec<ChatMessage>) -> (Option<String>, Vec<ApiMessage>) {
    let mut system: Vec<String> = Vec::new();
    let mut api_msgs = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => system.push(msg.content),
            Role::User => api_msgs.push(ApiMessage {
                role: "user",
                content: msg.content,
            }),
            Role::Assistant => api_msgs.push(ApiMessage {
                role: "assistant",
                content: msg.content,
            }),
        }
    }

    let system = (!system.is_empty()).then(|| system.join("\n\n"));
    (system, api_msgs)
}

fn build_request(config: &ModelConfig, messages: Vec<ChatMessage>) -> AnthropicRequest {
    let (system, messages) = convert_messages(messages);
    AnthropicRequest {
        model: config.model_id.clone(),
        max_tokens: config.max_tokens,
        temperature: (config.temperature > 0.0).then_some(config.temperature),
        messages,
        system,
    }
}

fn parse_response(body: &str) -> Result<String> {
    let response: AnthropicResponse = serde_json::from_str(body)
        .map_err(|e| SwitchyardError::ModelParse(e.to_string()))?;

    if let Some(usage) = &response.usage {
        debug!(
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            stop_reason = ?response.stop_reason,
            "Token usage"
        );
    }

    let text: String = response
        .content
        .into_iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text),
            ContentBlock::Other => None,
        })
        .collect();

    if text.is_empty() {
        return Err(SwitchyardError::ModelParse(
            "response contained no text content".into(),
        ));
    }
    Ok(text)
}

impl ModelClient for AnthropicClient {
    fn invoke(&self, messages: Vec<ChatMessage>) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let api_key = self
                .config
                .api_key
                .as_deref()
                .ok_or_else(|| SwitchyardError::Config("Anthropic API key not set".into()))?;

            let base_url = self.config.base_url.as_deref().unwrap_or(ANTHROPIC_API_URL);
            let body = build_request(&self.config, messages);

            debug!(model = %body.model, messages = body.messages.len(), "Sending model request");

            let response = self
                .http
                .post(base_url)
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&body)
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
    use serde_json::json;

    #[test]
    fn system_prompt_is_lifted_out() {
        let (system, msgs) = convert_messages(vec![
            ChatMessage::system("You are an auditor."),
            ChatMessage::user("Lunch, $4.50"),
            ChatMessage::assistant("ok"),
        ]);
        assert_eq!(system.as_deref(), Some("You are an auditor."));
        assert_eq!(
            msgs,
            vec![
                ApiMessage {
                    role: "user",
                    content: "Lunch, $4.50".into()
                },
                ApiMessage {
                    role: "assistant",
                    content: "ok".into()
                },
            ]
        );
    }

    #[test]
    fn request_omits_zero_temperature() {
        let config = ModelConfig::default();
        let req = build_request(&config, vec![ChatMessage::user("hi")]);
        let body = serde_json::to_value(&req).unwrap();
        assert_eq!(body["model"], json!(config.model_id));
        assert_eq!(body["max_tokens"], json!(1024));
        assert!(body.get("temperature").is_none());
        assert!(body.get("system").is_none());
        assert_eq!(
            body["messages"][0],
            json!({"role": "user", "content": "hi"})
        );
    }

    #[test]
    fn text_blocks_are_concatenated() {
        let body = json!({
            "id": "msg_1",
            "type": "message",
            "content": [
                {"type": "text", "text": "URG"},
                {"type": "tool_use", "id": "t", "name": "x", "input": {}},
                {"type": "text", "text": "ENT"}
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 12, "output_tokens": 2}
        });
        assert_eq!(parse_response(&body.to_string()).unwrap(), "URGENT");
    }

    #[test]
    fn empty_or_garbled_response_is_a_parse_error() {
        assert!(matches!(
            parse_response(r#"{"content": []}"#),
            Err(SwitchyardError::ModelParse(_))
        ));
        assert!(matches!(
            parse_response("<html>bad gateway</html>"),
            Err(SwitchyardError::ModelParse(_))
        ));
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_any_request() {
        let client = AnthropicClient::new(ModelConfig::default());
        let err = client
            .invoke(vec![ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchyardError::Config(_)));
    }
}
