//! Built-in tool adapters for Kindred.
//!
//! Each tool declares its own risk tier: reads are Safe and execute
//! immediately, anything that publishes to the outside world is Sensitive
//! and waits behind the confirmation gate. The adapters here are
//! deterministic stand-ins for real per-service integrations.

pub mod calendar;
pub mod messaging;
pub mod web_search;

use kindred_core::tool::ToolRegistry;
use std::sync::Arc;
use tokio::sync::Mutex;

pub use calendar::{CalendarEvent, CalendarStore, CreateEventTool};
pub use messaging::{Outbox, OutboundMessage, ReadMessagesTool, SendMessageTool};
pub use web_search::WebSearchTool;

/// Side-effect sinks shared between the registry and its owner, so the CLI
/// and tests can observe what sensitive tools actually did.
pub struct ToolSinks {
    pub outbox: Outbox,
    pub calendar: CalendarStore,
}

impl ToolSinks {
    pub fn new() -> Self {
        Self {
            outbox: Arc::new(Mutex::new(Vec::new())),
            calendar: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Default for ToolSinks {
    fn default() -> Self {
        Self::new()
    }
}

/// Create the default tool registry with all built-in tools.
pub fn default_registry(sinks: &ToolSinks) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(WebSearchTool));
    registry.register(Box::new(ReadMessagesTool::new()));
    registry.register(Box::new(SendMessageTool::new(sinks.outbox.clone())));
    registry.register(Box::new(CreateEventTool::new(sinks.calendar.clone())));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindred_core::tool::RiskTier;

    #[test]
    fn default_registry_has_expected_tools_and_tiers() {
        let sinks = ToolSinks::new();
        let registry = default_registry(&sinks);
        assert_eq!(
            registry.names(),
            vec![
                "calendar_create_event",
                "read_messages",
                "send_message",
                "web_search"
            ]
        );
        assert_eq!(registry.risk_of("web_search"), RiskTier::Safe);
        assert_eq!(registry.risk_of("read_messages"), RiskTier::Safe);
        assert_eq!(registry.risk_of("send_message"), RiskTier::Sensitive);
        assert_eq!(registry.risk_of("calendar_create_event"), RiskTier::Sensitive);
    }
}
