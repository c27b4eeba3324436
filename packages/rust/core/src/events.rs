//! Wire format of the investigation event stream.
//!
//! One JSON object per message, tagged by `type`, carrying the investigation
//! (`project_id`), an optional `agent_id` and a type-specific `payload`.
//! Messages may arrive as bare NDJSON lines or as SSE `data:` lines.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use casegraph_shared::{CaseGraphError, RawFinding, ResultKind, Result};

/// A single stream message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    ProjectStart {
        project_id: String,
        payload: ProjectStart,
    },
    AgentStart {
        project_id: String,
        agent_id: String,
        #[serde(default)]
        payload: AgentStart,
    },
    AgentProgress {
        project_id: String,
        agent_id: String,
        #[serde(default)]
        payload: AgentProgress,
    },
    AgentComplete {
        project_id: String,
        agent_id: String,
        #[serde(default)]
        payload: AgentComplete,
    },
    AgentError {
        project_id: String,
        agent_id: String,
        #[serde(default)]
        payload: AgentError,
    },
    ProjectComplete {
        project_id: String,
        #[serde(default)]
        payload: ProjectComplete,
    },
    Trace {
        project_id: String,
        payload: Trace,
    },
    Error {
        #[serde(default)]
        project_id: Option<String>,
        #[serde(default)]
        payload: StreamError,
    },
    /// Any other `type`; ignored by the engine.
    #[serde(other)]
    Unknown,
}

impl StreamEvent {
    /// Wire name of the variant, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProjectStart { .. } => "project_start",
            Self::AgentStart { .. } => "agent_start",
            Self::AgentProgress { .. } => "agent_progress",
            Self::AgentComplete { .. } => "agent_complete",
            Self::AgentError { .. } => "agent_error",
            Self::ProjectComplete { .. } => "project_complete",
            Self::Trace { .. } => "trace",
            Self::Error { .. } => "error",
            Self::Unknown => "unknown",
        }
    }

    pub fn project_id(&self) -> Option<&str> {
        match self {
            Self::ProjectStart { project_id, .. }
            | Self::AgentStart { project_id, .. }
            | Self::AgentProgress { project_id, .. }
            | Self::AgentComplete { project_id, .. }
            | Self::AgentError { project_id, .. }
            | Self::ProjectComplete { project_id, .. }
            | Self::Trace { project_id, .. } => Some(project_id.as_str()),
            Self::Error { project_id, .. } => project_id.as_deref(),
            Self::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectStart {
    pub entity_name: String,
    #[serde(default)]
    pub entity_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentStart {
    #[serde(default)]
    pub task: Option<String>,
    /// Explicit tool identity; when present no pattern matching is done.
    #[serde(default)]
    pub tool: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentProgress {
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub task: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentComplete {
    /// Tool-reported status word (`match`, `clear`, ...).
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, rename = "resultType")]
    pub result_type: Option<String>,
    #[serde(default)]
    pub findings: Vec<Value>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub tool: Option<String>,
}

impl AgentComplete {
    pub fn result_kind(&self) -> ResultKind {
        match self.result_type.as_deref() {
            Some("warning") => ResultKind::Warning,
            Some("error") => ResultKind::Error,
            Some("info") => ResultKind::Info,
            _ => ResultKind::Success,
        }
    }

    /// Findings that are JSON objects; anything else is skipped.
    pub fn object_findings(&self) -> Vec<RawFinding> {
        self.findings
            .iter()
            .filter_map(|f| f.as_object().cloned())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentError {
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectComplete {
    #[serde(default)]
    pub risk_level: String,
    #[serde(default)]
    pub total_findings: u32,
    #[serde(default)]
    pub tools_completed: u32,
    #[serde(default)]
    pub results: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamError {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub message: TraceMessage,
}

/// One message of the agent transcript.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceMessage {
    #[serde(default)]
    pub subtype: Option<String>,
    /// Final result text, present on the terminal `success` message.
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub content: Option<Value>,
}

impl TraceMessage {
    /// Final result text when this is the terminal success message.
    pub fn final_result(&self) -> Option<&str> {
        match (self.subtype.as_deref(), self.result.as_deref()) {
            (Some("success"), Some(result)) if !result.is_empty() => Some(result),
            _ => None,
        }
    }

    /// Content items in order. Non-list content and malformed items are skipped.
    pub fn items(&self) -> Vec<TraceItem> {
        match &self.content {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// A transcript content block: narration text, a tool call, or a tool result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceItem {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub input: Option<ToolInput>,
    #[serde(default)]
    pub tool_use_id: Option<String>,
    #[serde(default)]
    pub content: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolInput {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl TraceItem {
    /// `(tool_use_id, command, description)` for a shell tool call.
    pub fn shell_command(&self) -> Option<(&str, &str, Option<&str>)> {
        if self.name.as_deref() != Some("Bash") {
            return None;
        }
        let id = self.id.as_deref()?;
        let input = self.input.as_ref()?;
        let command = input.command.as_deref().filter(|c| !c.is_empty())?;
        Some((id, command, input.description.as_deref()))
    }

    /// `(tool_use_id, output)` for a tool result block.
    pub fn tool_result(&self) -> Option<(&str, String)> {
        let id = self.tool_use_id.as_deref()?;
        let text = match self.content.as_ref()? {
            Value::String(s) => s.clone(),
            Value::Array(parts) => parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n"),
            _ => return None,
        };
        (!text.is_empty()).then_some((id, text))
    }
}

/// Parse one stream line. Accepts bare JSON or an SSE `data:` line.
pub fn parse_event(line: &str) -> Result<StreamEvent> {
    let line = line.trim();
    let json = line.strip_prefix("data:").map(str::trim_start).unwrap_or(line);
    serde_json::from_str(json).map_err(|e| CaseGraphError::parse(e.to_string()))
}

/// Whether a stream line carries no message (blank, SSE comment or keep-alive).
pub fn is_blank_line(line: &str) -> bool {
    let line = line.trim();
    line.is_empty() || line.starts_with(':') || line.starts_with("event:")
}
