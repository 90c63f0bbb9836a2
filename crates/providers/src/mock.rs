//! Scripted model clients for tests and offline runs.

use async_trait::async_trait;
use kindred_core::error::ModelError;
use kindred_core::model::{
    AgentReply, ChatMessage, EmbeddingRequest, EmbeddingResponse, MessageToolCall, ModelClient,
    ModelRequest, ModelResponse, Role,
};
use std::collections::VecDeque;
use std::sync::Mutex;

fn assistant_response(content: String, tool_calls: Vec<MessageToolCall>) -> ModelResponse {
    ModelResponse {
        message: ChatMessage {
            role: Role::Assistant,
            content,
            tool_calls,
            tool_call_id: None,
        },
        usage: None,
        model: "mock".into(),
    }
}

/// Always returns the same structured reply.
pub struct CannedClient {
    content: String,
}

impl CannedClient {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    /// A canned client whose content is a well-formed [`AgentReply`].
    pub fn replying(text: &str) -> Self {
        let reply = AgentReply::plain(text);
        Self::new(serde_json::to_string(&reply).unwrap_or_else(|_| text.to_string()))
    }
}

#[async_trait]
impl ModelClient for CannedClient {
    fn name(&self) -> &str {
        "canned"
    }

    async fn complete(&self, _request: ModelRequest) -> Result<ModelResponse, ModelError> {
        Ok(assistant_response(self.content.clone(), Vec::new()))
    }
}

/// Pops one scripted response per call, in order. Calls past the script
/// fail, which makes a loop that over-calls the model visible in tests.
pub struct SequentialClient {
    responses: Mutex<VecDeque<ModelResponse>>,
}

impl SequentialClient {
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }

    /// Script entry: a plain structured reply.
    pub fn reply(text: &str) -> ModelResponse {
        let reply = AgentReply::plain(text);
        assistant_response(
            serde_json::to_string(&reply).unwrap_or_else(|_| text.to_string()),
            Vec::new(),
        )
    }

    /// Script entry: raw content, exactly as given.
    pub fn raw(content: &str) -> ModelResponse {
        assistant_response(content.to_string(), Vec::new())
    }

    /// Script entry: a tool call.
    pub fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> ModelResponse {
        assistant_response(
            String::new(),
            vec![MessageToolCall {
                id: id.into(),
                name: name.into(),
                arguments: arguments.to_string(),
            }],
        )
    }
}

#[async_trait]
impl ModelClient for SequentialClient {
    fn name(&self) -> &str {
        "sequential"
    }

    async fn complete(&self, _request: ModelRequest) -> Result<ModelResponse, ModelError> {
        let mut responses = self
            .responses
            .lock()
            .map_err(|_| ModelError::NotConfigured("poisoned mock".into()))?;
        responses
            .pop_front()
            .ok_or_else(|| ModelError::NotConfigured("mock script exhausted".into()))
    }
}

/// A client whose completion endpoint always fails. For failure-path tests.
pub struct FailingClient;

#[async_trait]
impl ModelClient for FailingClient {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _request: ModelRequest) -> Result<ModelResponse, ModelError> {
        Err(ModelError::Network("connection refused".into()))
    }

    async fn embed(&self, _request: EmbeddingRequest) -> Result<EmbeddingResponse, ModelError> {
        Err(ModelError::Network("connection refused".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_request() -> ModelRequest {
        ModelRequest {
            model: "mock".into(),
            messages: vec![],
            temperature: 0.7,
            max_tokens: None,
            tools: vec![],
        }
    }

    #[tokio::test]
    async fn sequential_plays_script_in_order() {
        let client = SequentialClient::new(vec![
            SequentialClient::tool_call("c1", "web_search", serde_json::json!({"query": "x"})),
            SequentialClient::reply("done"),
        ]);

        let first = client.complete(empty_request()).await.unwrap();
        assert_eq!(first.tool_call().unwrap().name, "web_search");
        let second = client.complete(empty_request()).await.unwrap();
        assert!(second.message.content.contains("done"));
        assert!(client.complete(empty_request()).await.is_err());
    }

    #[tokio::test]
    async fn canned_reply_parses_back() {
        let client = CannedClient::replying("hello!");
        let response = client.complete(empty_request()).await.unwrap();
        let reply = AgentReply::parse(&response.message.content).unwrap();
        assert_eq!(reply.reply, "hello!");
    }
}
