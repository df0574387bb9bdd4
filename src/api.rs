//! # API Module
//!
//! Talks to the hosted generative model.
//!
//! Both pipelines only need "send these messages, get the reply text back", so they depend on
//! the small [`ChatModel`] trait rather than on async-openai directly. [`OpenAiChat`] is the
//! production implementation; tests substitute a scripted model.
//!
//! # Example
//!
//! ```no_run
//! use groundwork::api::{ChatMessage, ChatModel, OpenAiChat};
//! use groundwork::config::GroundworkConfig;
//!
//! # async fn demo() -> groundwork::error::Result<()> {
//! let chat = OpenAiChat::new(&GroundworkConfig::default())?;
//! let reply = chat
//!     .complete(&[ChatMessage::user("What is the meaning of life?")])
//!     .await?;
//! println!("{reply}");
//! # Ok(()) }
//! ```

use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use tracing::debug;

use crate::config::GroundworkConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a chat prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A generative model that completes a chat prompt.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Return the model's reply text for `messages`.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Creates a new OpenAI API client from configuration.
///
/// The underlying HTTP client carries `request_timeout_secs` so a stalled endpoint fails the
/// call instead of hanging the pipeline.
pub fn create_client(config: &GroundworkConfig) -> Result<Client<OpenAIConfig>> {
    let openai_config = OpenAIConfig::new()
        .with_api_key(config.api_key.clone())
        .with_api_base(config.api_base.clone());
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()?;
    debug!("Client created for {}", config.api_base);
    Ok(Client::with_config(openai_config).with_http_client(http_client))
}

/// [`ChatModel`] backed by an OpenAI compatible `/chat/completions` endpoint.
pub struct OpenAiChat {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    stop: Vec<String>,
}

impl OpenAiChat {
    pub fn new(config: &GroundworkConfig) -> Result<Self> {
        Ok(Self {
            client: create_client(config)?,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            stop: config.stop_words.clone(),
        })
    }
}

fn to_request_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage> {
    let content = message.content.clone();
    let converted: ChatCompletionRequestMessage = match message.role {
        Role::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        Role::User => ChatCompletionRequestUserMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(content)
            .build()?
            .into(),
    };
    Ok(converted)
}

#[async_trait]
impl ChatModel for OpenAiChat {
    #[allow(deprecated)]
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let messages = messages
            .iter()
            .map(to_request_message)
            .collect::<Result<Vec<_>>>()?;

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .messages(messages);
        if !self.stop.is_empty() {
            args.stop(self.stop.clone());
        }
        let request = args.build()?;

        debug!("Sending request: {:?}", request);
        let response = self.client.chat().create(request).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Error::Model("the model returned no content".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn mock_config(base: String) -> GroundworkConfig {
        GroundworkConfig {
            api_key: "mock_api_key".to_string(),
            api_base: base,
            model: "mock_model".to_string(),
            stop_words: vec!["\nObservation:".to_string()],
            ..GroundworkConfig::default()
        }
    }

    fn completion(content: serde_json::Value) -> serde_json::Value {
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1700000000,
            "model": "mock_model",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content, "refusal": null},
                "finish_reason": "stop",
                "logprobs": null
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13}
        })
    }

    #[test]
    fn test_create_client() {
        let client = create_client(&GroundworkConfig::default());
        assert!(client.is_ok(), "Failed to create client");
    }

    #[tokio::test]
    async fn test_complete_returns_reply_text() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .header("authorization", "Bearer mock_api_key");
                then.status(200).json_body(completion(json!("Forty-two.")));
            })
            .await;

        let chat = OpenAiChat::new(&mock_config(server.base_url())).unwrap();
        let reply = chat
            .complete(&[
                ChatMessage::system("Be brief."),
                ChatMessage::user("What is the answer?"),
                ChatMessage::assistant("Let me think."),
            ])
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(reply, "Forty-two.");
    }

    #[tokio::test]
    async fn test_missing_content_is_a_model_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(completion(json!(null)));
            })
            .await;

        let chat = OpenAiChat::new(&mock_config(server.base_url())).unwrap();
        let result = chat.complete(&[ChatMessage::user("hi")]).await;
        assert!(matches!(result, Err(Error::Model(_))));
    }

    #[tokio::test]
    async fn test_api_error_is_a_model_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(401).json_body(json!({
                    "error": {"message": "bad key", "type": "invalid_request_error", "param": null, "code": "invalid_api_key"}
                }));
            })
            .await;

        let chat = OpenAiChat::new(&mock_config(server.base_url())).unwrap();
        let result = chat.complete(&[ChatMessage::user("hi")]).await;
        assert!(matches!(result, Err(Error::Model(_))));
    }
}
