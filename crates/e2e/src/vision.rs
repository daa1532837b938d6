//! Vision completion client
//!
//! Sends a system + user (text and image) prompt to a chat-completion model
//! and returns the first choice's text. Cancellation is cooperative: callers
//! pass a [`CancellationToken`] and the in-flight HTTP request is dropped as
//! soon as it fires.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use sightline_common::{ModelConfig, ModelFlavor};

use crate::error::{E2eError, E2eResult};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// All text carried by this content, parts joined by newlines.
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn has_image(&self) -> bool {
        matches!(self, MessageContent::Parts(parts)
            if parts.iter().any(|p| matches!(p, ContentPart::ImageUrl { .. })))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }

    /// User message carrying text followed by a base64 PNG.
    pub fn user_with_image(text: impl Into<String>, png_base64: &str) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:image/png;base64,{}", png_base64),
                    },
                },
            ]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[async_trait]
pub trait VisionClient: Send + Sync {
    /// Return the first choice's message content. Must stop work promptly
    /// once `cancel` fires.
    async fn complete(
        &self,
        request: CompletionRequest,
        cancel: CancellationToken,
    ) -> E2eResult<String>;
}

/// Chat-completions client for Azure OpenAI deployments and the OpenAI API.
pub struct OpenAiVisionClient {
    client: Client,
    flavor: ModelFlavor,
    endpoint: String,
    api_key: String,
    api_version: String,
}

impl OpenAiVisionClient {
    pub fn from_config(config: &ModelConfig) -> E2eResult<Self> {
        let endpoint = match (config.flavor, config.endpoint.as_deref()) {
            (_, Some(endpoint)) => endpoint.trim_end_matches('/').to_string(),
            (ModelFlavor::Openai, None) => OPENAI_API_BASE.to_string(),
            (ModelFlavor::Azure, None) => {
                return Err(E2eError::Common(sightline_common::Error::InvalidConfig(
                    "an Azure endpoint is required".to_string(),
                )))
            }
        };

        // The engine enforces its own per-request deadline; this only guards
        // against a connection that never completes.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            flavor: config.flavor,
            endpoint,
            api_key: config.api_key.clone().unwrap_or_default(),
            api_version: config.api_version.clone(),
        })
    }

    fn completions_url(&self, model: &str) -> String {
        match self.flavor {
            ModelFlavor::Azure => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                self.endpoint, model, self.api_version
            ),
            ModelFlavor::Openai => format!("{}/chat/completions", self.endpoint),
        }
    }

    async fn send(&self, request: &CompletionRequest) -> E2eResult<String> {
        let url = self.completions_url(&request.model);
        debug!(model = %request.model, "Sending vision completion request");

        let builder = self.client.post(&url).json(request);
        let builder = match self.flavor {
            ModelFlavor::Azure => builder.header("api-key", &self.api_key),
            ModelFlavor::Openai => builder.bearer_auth(&self.api_key),
        };

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        parse_completion(status, &body)
    }
}

#[async_trait]
impl VisionClient for OpenAiVisionClient {
    async fn complete(
        &self,
        request: CompletionRequest,
        cancel: CancellationToken,
    ) -> E2eResult<String> {
        tokio::select! {
            _ = cancel.cancelled() => Err(E2eError::Completion("request cancelled".to_string())),
            result = self.send(&request) => result,
        }
    }
}

/// Map a raw HTTP reply to the first choice's text. The status is checked
/// before the body is decoded, so error pages that are not JSON keep it.
fn parse_completion(status: StatusCode, body: &str) -> E2eResult<String> {
    if !status.is_success() {
        let message = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
            .unwrap_or_else(|| body.trim().to_string());
        warn!(%status, "Completion request rejected");
        return Err(E2eError::Completion(format!("{}: {}", status, message)));
    }

    let value: Value = serde_json::from_str(body)?;
    first_choice_text(&value)
}

fn first_choice_text(body: &Value) -> E2eResult<String> {
    body["choices"][0]["message"]["content"]
        .as_str()
        .map(|content| content.trim().to_string())
        .ok_or_else(|| E2eError::Completion("response carried no message content".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client(flavor: ModelFlavor, endpoint: Option<&str>) -> OpenAiVisionClient {
        OpenAiVisionClient::from_config(&ModelConfig {
            flavor,
            endpoint: endpoint.map(String::from),
            api_key: Some("key".into()),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_azure_url() {
        let c = client(ModelFlavor::Azure, Some("https://res.openai.azure.com/"));
        assert_eq!(
            c.completions_url("gpt-4.1"),
            "https://res.openai.azure.com/openai/deployments/gpt-4.1/chat/completions?api-version=2024-02-15-preview"
        );
    }

    #[test]
    fn test_openai_default_base() {
        let c = client(ModelFlavor::Openai, None);
        assert_eq!(c.completions_url("gpt-4o"), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn test_azure_requires_endpoint() {
        let result = OpenAiVisionClient::from_config(&ModelConfig::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_request_shape() {
        let request = CompletionRequest {
            model: "gpt-4.1".into(),
            messages: vec![
                ChatMessage::system("be precise"),
                ChatMessage::user_with_image("Condition: logged in", "QUJD"),
            ],
            temperature: None,
        };
        let value = serde_json::to_value(&request).unwrap();

        assert!(value.get("temperature").is_none());
        assert_eq!(value["messages"][0], json!({"role": "system", "content": "be precise"}));
        assert_eq!(value["messages"][1]["content"][0]["type"], "text");
        assert_eq!(value["messages"][1]["content"][1]["type"], "image_url");
        assert_eq!(
            value["messages"][1]["content"][1]["image_url"]["url"],
            "data:image/png;base64,QUJD"
        );
        assert!(request.messages[1].content.has_image());
        assert_eq!(request.messages[1].content.text(), "Condition: logged in");
    }

    #[test]
    fn test_first_choice_text() {
        let body = json!({"choices": [{"message": {"content": "  <decision>pass</decision>\n"}}]});
        assert_eq!(first_choice_text(&body).unwrap(), "<decision>pass</decision>");
    }

    #[test]
    fn test_missing_content_is_an_error() {
        let err = first_choice_text(&json!({"choices": []})).unwrap_err();
        assert!(matches!(err, E2eError::Completion(ref m) if m.contains("no message content")));

        let null_content = json!({"choices": [{"message": {"content": null}}]});
        assert!(matches!(first_choice_text(&null_content), Err(E2eError::Completion(_))));
    }

    #[test]
    fn test_non_json_error_body_keeps_status() {
        let err = parse_completion(StatusCode::BAD_GATEWAY, "<html>Bad Gateway</html>").unwrap_err();
        match err {
            E2eError::Completion(message) => {
                assert!(message.starts_with("502 Bad Gateway"));
                assert!(message.contains("<html>Bad Gateway</html>"));
            }
            other => panic!("expected Completion, got {:?}", other),
        }

        let err = parse_completion(StatusCode::SERVICE_UNAVAILABLE, "").unwrap_err();
        assert!(matches!(err, E2eError::Completion(ref m) if m.starts_with("503")));
    }

    #[test]
    fn test_api_error_message_is_surfaced() {
        let body = r#"{"error": {"message": "Rate limit reached"}}"#;
        let err = parse_completion(StatusCode::TOO_MANY_REQUESTS, body).unwrap_err();
        assert!(matches!(err, E2eError::Completion(ref m) if m == "429 Too Many Requests: Rate limit reached"));
    }

    #[test]
    fn test_success_body_yields_text() {
        let body = r#"{"choices": [{"message": {"content": "<decision>wait</decision>"}}]}"#;
        assert_eq!(parse_completion(StatusCode::OK, body).unwrap(), "<decision>wait</decision>");
    }
}
