//! Model invocation — the abstraction over the LLM backend.
//!
//! A [`ModelClient`] turns an assembled prompt plus chat history into either
//! a tool-call directive or a final structured reply. The engine never talks
//! HTTP itself; implementations live in the providers crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::persona::Emotion;

/// The role of a chat message sent to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool call emitted by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageToolCall {
    pub id: String,
    pub name: String,
    /// Arguments as a JSON string, exactly as the model produced them.
    pub arguments: String,
}

/// One message in the wire-level chat transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the arguments.
    pub parameters: serde_json::Value,
}

/// A request to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

fn default_temperature() -> f32 {
    0.7
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A complete response from the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    pub message: ChatMessage,
    pub usage: Option<Usage>,
    pub model: String,
}

impl ModelResponse {
    /// The first tool call in the response, if the model asked for one.
    pub fn tool_call(&self) -> Option<&MessageToolCall> {
        self.message.tool_calls.first()
    }
}

/// An embedding request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub inputs: Vec<String>,
}

/// An embedding response, one vector per input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    pub embeddings: Vec<Vec<f32>>,
    pub model: String,
}

/// The core model-invocation trait.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// A human-readable name for this client (e.g., "openai-compat").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ModelRequest)
    -> std::result::Result<ModelResponse, ModelError>;

    /// Generate embeddings for the given texts.
    ///
    /// Default implementation reports embeddings as unsupported.
    async fn embed(
        &self,
        _request: EmbeddingRequest,
    ) -> std::result::Result<EmbeddingResponse, ModelError> {
        Err(ModelError::NotConfigured(format!(
            "client '{}' does not support embeddings",
            self.name()
        )))
    }
}

/// The structured final reply the model must emit as a JSON object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReply {
    pub reply: String,

    #[serde(default)]
    pub emotion: Emotion,

    /// Informational only; the engine's own classifier owns the actual
    /// score mutation.
    #[serde(default)]
    pub affinity_shift: i8,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
}

impl AgentReply {
    /// A degraded reply carrying raw text and the neutral emotion.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            reply: text.into(),
            emotion: Emotion::Basic,
            affinity_shift: 0,
            nickname: None,
            relation: None,
        }
    }

    /// Lenient extraction: take the outermost JSON object embedded in the
    /// content (models often wrap it in prose or code fences) and parse it.
    /// Returns None when no parseable object is present.
    pub fn parse(content: &str) -> Option<Self> {
        let start = content.find('{')?;
        let end = content.rfind('}')?;
        if end <= start {
            return None;
        }
        let mut reply: AgentReply = serde_json::from_str(&content[start..=end]).ok()?;
        reply.affinity_shift = reply.affinity_shift.clamp(-5, 5);
        if reply.reply.trim().is_empty() {
            return None;
        }
        Some(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_extracts_object_from_fenced_output() {
        let content = "Sure!\n```json\n{\"reply\": \"hey!\", \"emotion\": \"happy\", \"affinity_shift\": 2}\n```";
        let reply = AgentReply::parse(content).unwrap();
        assert_eq!(reply.reply, "hey!");
        assert_eq!(reply.emotion, Emotion::Happy);
        assert_eq!(reply.affinity_shift, 2);
    }

    #[test]
    fn parse_clamps_shift_and_defaults_emotion() {
        let content = r#"{"reply": "ok", "affinity_shift": 99}"#;
        let reply = AgentReply::parse(content).unwrap();
        assert_eq!(reply.affinity_shift, 5);
        assert_eq!(reply.emotion, Emotion::Basic);
    }

    #[test]
    fn parse_rejects_plain_text() {
        assert!(AgentReply::parse("no json here").is_none());
        assert!(AgentReply::parse("{\"reply\": \"  \"}").is_none());
    }

    #[test]
    fn tool_call_accessor_returns_first() {
        let response = ModelResponse {
            message: ChatMessage {
                role: Role::Assistant,
                content: String::new(),
                tool_calls: vec![MessageToolCall {
                    id: "call_1".into(),
                    name: "web_search".into(),
                    arguments: "{}".into(),
                }],
                tool_call_id: None,
            },
            usage: None,
            model: "test".into(),
        };
        assert_eq!(response.tool_call().unwrap().name, "web_search");
    }
}
