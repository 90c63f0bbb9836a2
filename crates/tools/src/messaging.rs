//! Messaging tools — a read side and a send side with different tiers.
//!
//! `read_messages` only looks at an inbox, so it is Safe. `send_message`
//! publishes text to another person and is Sensitive: the loop must get
//! explicit user confirmation before it runs. The outbox here is an
//! in-process stand-in for a real messaging adapter; tests inspect it to
//! prove that refused sends left no trace.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kindred_core::error::ToolError;
use kindred_core::tool::{RiskTier, Tool, ToolResult};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct OutboundMessage {
    pub recipient: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

/// Shared outbox, so tests and the CLI can observe what was actually sent.
pub type Outbox = Arc<Mutex<Vec<OutboundMessage>>>;

pub struct SendMessageTool {
    outbox: Outbox,
}

impl SendMessageTool {
    pub fn new(outbox: Outbox) -> Self {
        Self { outbox }
    }
}

#[async_trait]
impl Tool for SendMessageTool {
    fn name(&self) -> &str {
        "send_message"
    }

    fn description(&self) -> &str {
        "Send a message to a contact on the user's behalf. Visible to the recipient immediately."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "recipient": {
                    "type": "string",
                    "description": "Who to send the message to"
                },
                "body": {
                    "type": "string",
                    "description": "The message text"
                }
            },
            "required": ["recipient", "body"]
        })
    }

    fn risk(&self) -> RiskTier {
        RiskTier::Sensitive
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let recipient = arguments["recipient"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("missing 'recipient' argument".into()))?
            .to_string();
        let body = arguments["body"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("missing 'body' argument".into()))?
            .to_string();

        let mut outbox = self.outbox.lock().await;
        // Repeating the exact same send within a turn is a model retry
        // artifact, not an intent to double-send.
        if outbox
            .iter()
            .any(|m| m.recipient == recipient && m.body == body)
        {
            return Ok(ToolResult {
                call_id: String::new(),
                success: true,
                output: format!("message to {recipient} already sent, skipping duplicate"),
                data: None,
            });
        }

        info!(recipient = %recipient, chars = body.len(), "message sent");
        outbox.push(OutboundMessage {
            recipient: recipient.clone(),
            body,
            sent_at: Utc::now(),
        });

        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output: format!("message delivered to {recipient}"),
            data: None,
        })
    }
}

pub struct ReadMessagesTool {
    inbox: Vec<(String, String)>,
}

impl ReadMessagesTool {
    /// The stub inbox ships a couple of fixed entries so reads have
    /// something realistic to return.
    pub fn new() -> Self {
        Self {
            inbox: vec![
                ("maya".into(), "are we still on for tomorrow?".into()),
                ("diego".into(), "sent you the photos from the trip".into()),
            ],
        }
    }
}

impl Default for ReadMessagesTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ReadMessagesTool {
    fn name(&self) -> &str {
        "read_messages"
    }

    fn description(&self) -> &str {
        "Read the user's recent incoming messages. Read-only."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "limit": {
                    "type": "integer",
                    "description": "Maximum messages to return (default 5)",
                    "default": 5
                }
            }
        })
    }

    fn risk(&self) -> RiskTier {
        RiskTier::Safe
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let limit = arguments["limit"].as_u64().unwrap_or(5) as usize;
        let listing: Vec<String> = self
            .inbox
            .iter()
            .take(limit)
            .map(|(from, body)| format!("{from}: {body}"))
            .collect();

        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output: listing.join("\n"),
            data: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_records_to_outbox() {
        let outbox: Outbox = Arc::new(Mutex::new(Vec::new()));
        let tool = SendMessageTool::new(outbox.clone());
        let result = tool
            .execute(serde_json::json!({"recipient": "maya", "body": "running late"}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(outbox.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_send_is_dropped() {
        let outbox: Outbox = Arc::new(Mutex::new(Vec::new()));
        let tool = SendMessageTool::new(outbox.clone());
        let args = serde_json::json!({"recipient": "maya", "body": "running late"});
        tool.execute(args.clone()).await.unwrap();
        let second = tool.execute(args).await.unwrap();
        assert!(second.output.contains("duplicate"));
        assert_eq!(outbox.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn read_respects_limit() {
        let tool = ReadMessagesTool::new();
        let result = tool.execute(serde_json::json!({"limit": 1})).await.unwrap();
        assert_eq!(result.output.lines().count(), 1);
    }

    #[test]
    fn tiers_are_asymmetric() {
        let outbox: Outbox = Arc::new(Mutex::new(Vec::new()));
        assert_eq!(SendMessageTool::new(outbox).risk(), RiskTier::Sensitive);
        assert_eq!(ReadMessagesTool::new().risk(), RiskTier::Safe);
    }
}
