use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A system-level notice from the worker (model selection, session
/// start, etc.).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemEvent {
    pub subtype: Option<String>,
    pub content: Value,
}

/// A chunk of assistant output (text or tool-use request).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssistantEvent {
    pub content: Value,
}

/// A tool invocation the worker requested.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolUseEvent {
    pub content: Value,
}

/// The result of a tool invocation, fed back to the worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResultEvent {
    pub content: Value,
}

/// One classified stream event, ready to be persisted at
/// `agents/events/{sid}/{seq}` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum StreamEvent {
    System(SystemEvent),
    Assistant(AssistantEvent),
    ToolUse(ToolUseEvent),
    ToolResult(ToolResultEvent),
    /// A well-formed JSON line whose `type` field didn't match any of
    /// the four known shapes. Preserved, not discarded — the
    /// Orchestrator's Integrate stage may still need it.
    Other(Value),
}

impl StreamEvent {
    /// Classify a decoded JSON line by its `type` field.
    pub fn classify(payload: Value) -> Self {
        match payload.get("type").and_then(Value::as_str) {
            Some("system") => StreamEvent::System(SystemEvent {
                subtype: payload
                    .get("subtype")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                content: payload,
            }),
            Some("assistant") => StreamEvent::Assistant(AssistantEvent { content: payload }),
            Some("tool_use") => StreamEvent::ToolUse(ToolUseEvent { content: payload }),
            Some("tool_result") => StreamEvent::ToolResult(ToolResultEvent { content: payload }),
            _ => StreamEvent::Other(payload),
        }
    }

    /// True if this event's text content contains the `TASK COMPLETE`
    /// sentinel (spec §4.C, §6).
    pub fn mentions_task_complete(&self) -> bool {
        let content = match self {
            StreamEvent::Assistant(e) => &e.content,
            StreamEvent::System(e) => &e.content,
            StreamEvent::ToolUse(e) => &e.content,
            StreamEvent::ToolResult(e) => &e.content,
            StreamEvent::Other(v) => v,
        };
        content_contains_sentinel(content, crate::TASK_COMPLETE_SENTINEL)
    }
}

fn content_contains_sentinel(value: &Value, sentinel: &str) -> bool {
    match value {
        Value::String(s) => s.contains(sentinel),
        Value::Array(items) => items.iter().any(|v| content_contains_sentinel(v, sentinel)),
        Value::Object(map) => map.values().any(|v| content_contains_sentinel(v, sentinel)),
        _ => false,
    }
}
