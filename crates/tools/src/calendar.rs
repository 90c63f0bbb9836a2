//! Calendar tool — creates events on the user's calendar.
//!
//! Creating an event is visible to anyone the calendar is shared with, so
//! this is Sensitive tier. The store is an in-process stand-in for a real
//! calendar adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kindred_core::error::ToolError;
use kindred_core::tool::{RiskTier, Tool, ToolResult};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub starts_at: String,
    pub created_at: DateTime<Utc>,
}

pub type CalendarStore = Arc<Mutex<Vec<CalendarEvent>>>;

pub struct CreateEventTool {
    store: CalendarStore,
}

impl CreateEventTool {
    pub fn new(store: CalendarStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for CreateEventTool {
    fn name(&self) -> &str {
        "calendar_create_event"
    }

    fn description(&self) -> &str {
        "Create an event on the user's calendar with a title and start time."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": {
                    "type": "string",
                    "description": "Event title"
                },
                "starts_at": {
                    "type": "string",
                    "description": "Start time, ISO 8601 (e.g. 2026-09-01T14:00:00Z)"
                }
            },
            "required": ["title", "starts_at"]
        })
    }

    fn risk(&self) -> RiskTier {
        RiskTier::Sensitive
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let title = arguments["title"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("missing 'title' argument".into()))?;
        let starts_at = arguments["starts_at"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("missing 'starts_at' argument".into()))?;

        if DateTime::parse_from_rfc3339(starts_at).is_err() {
            return Err(ToolError::InvalidArguments(format!(
                "'starts_at' is not a valid ISO 8601 timestamp: {starts_at}"
            )));
        }

        let event = CalendarEvent {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            starts_at: starts_at.to_string(),
            created_at: Utc::now(),
        };
        let id = event.id.clone();
        self.store.lock().await.push(event);

        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output: format!("event '{title}' created for {starts_at} (id {id})"),
            data: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_event_with_valid_time() {
        let store: CalendarStore = Arc::new(Mutex::new(Vec::new()));
        let tool = CreateEventTool::new(store.clone());
        let result = tool
            .execute(serde_json::json!({
                "title": "dentist",
                "starts_at": "2026-09-01T14:00:00Z"
            }))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(store.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn rejects_bad_timestamp() {
        let store: CalendarStore = Arc::new(Mutex::new(Vec::new()));
        let tool = CreateEventTool::new(store.clone());
        let err = tool
            .execute(serde_json::json!({"title": "x", "starts_at": "next tuesday"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        assert!(store.lock().await.is_empty());
    }
}
