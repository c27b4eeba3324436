//! Core domain types for CaseGraph investigation graphs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A weakly typed finding record as emitted by a screening tool.
///
/// Recognized keys drive classification; everything else passes through.
pub type RawFinding = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// InvestigationId
// ---------------------------------------------------------------------------

/// Identifier of one end-to-end screening run.
///
/// Ids are opaque strings (the upstream service issues them); locally
/// generated ids are time-sortable UUID v7.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvestigationId(pub String);

impl InvestigationId {
    /// Generate a new time-sortable investigation identifier.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Id of the root entity node. A pure function of the investigation id.
    pub fn root_node_id(&self) -> String {
        format!("entity-{}", self.0)
    }

    /// Id of the single summary node of this investigation.
    pub fn summary_node_id(&self) -> String {
        format!("summary-{}", self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InvestigationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InvestigationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for InvestigationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// A point on the unbounded canvas.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Rendered size of a node, reported back by the visualization surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Lifecycle state shown on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    #[default]
    Idle,
    Pending,
    Running,
    Streaming,
    Completed,
    Failed,
    Warning,
    Flagged,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Warning => "warning",
            Self::Flagged => "flagged",
        }
    }

    /// Parse a persisted status column; unknown values read as `Idle`.
    pub fn parse_lossy(s: &str) -> Self {
        match s {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "streaming" => Self::Streaming,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "warning" => Self::Warning,
            "flagged" => Self::Flagged,
            _ => Self::Idle,
        }
    }
}

/// Coarse node category. Derived from the payload, never from the id text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Entity,
    Agent,
    Finding,
    Summary,
    Auxiliary,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entity => "entity",
            Self::Agent => "agent",
            Self::Finding => "finding",
            Self::Summary => "summary",
            Self::Auxiliary => "auxiliary",
        }
    }
}

/// What kind of subject is being investigated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Company,
    #[default]
    Individual,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Company => "company",
            Self::Individual => "individual",
        }
    }

    /// Parse the upstream `entity_type` string. Anything that is not a
    /// company reads as an individual.
    pub fn parse_lossy(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "company" | "organization" | "organisation" => Self::Company,
            _ => Self::Individual,
        }
    }
}

/// Outcome class reported by a tool on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    #[default]
    Success,
    Warning,
    Error,
    Info,
}

/// Classification of a single finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingType {
    Sanction,
    Pep,
    AdverseMedia,
    IpAddress,
    Crypto,
    Company,
    Person,
    Generic,
}

impl FindingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sanction => "sanction",
            Self::Pep => "pep",
            Self::AdverseMedia => "adverse_media",
            Self::IpAddress => "ip_address",
            Self::Crypto => "crypto",
            Self::Company => "company",
            Self::Person => "person",
            Self::Generic => "generic",
        }
    }

    /// Human-readable name, used as a fallback node label.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Sanction => "Sanctions Hit",
            Self::Pep => "PEP Match",
            Self::AdverseMedia => "Adverse Media",
            Self::IpAddress => "IP Address",
            Self::Crypto => "Crypto Wallet",
            Self::Company => "Company",
            Self::Person => "Person",
            Self::Generic => "Finding",
        }
    }
}

/// Severity badge attached to finding nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Sub-type of the compact contact node used by digital-footprint tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactKind {
    Phone,
    Email,
    Social,
}

/// Three-step risk badge on contact nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactRisk {
    #[default]
    Low,
    Medium,
    High,
}

// ---------------------------------------------------------------------------
// Node payloads
// ---------------------------------------------------------------------------

/// Root subject under investigation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityData {
    pub entity_kind: EntityKind,
    pub risk_score: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_findings: Option<u32>,
}

/// One tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentData {
    /// Registry key of the tool, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_kind: Option<ResultKind>,
    /// Raw findings as reported on completion (untruncated).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub findings: Vec<RawFinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Latest tool output excerpt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streaming_text: Option<String>,
}

/// A discrete result item from a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingData {
    pub finding_type: FindingType,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// The original record, kept for display.
    #[serde(default)]
    pub raw: RawFinding,
}

/// Compact finding shape for phone, email and social-profile tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactData {
    pub contact_kind: ContactKind,
    pub value: String,
    #[serde(default)]
    pub risk: ContactRisk,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breaches: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default)]
    pub raw: RawFinding,
}

/// Terminal summary of an investigation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryData {
    pub summary: String,
    pub risk_level: String,
    pub total_findings: u32,
    pub tools_completed: u32,
}

/// An entity name mentioned in a media finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentionData {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_title: Option<String>,
}

/// Kind-specific node payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum NodePayload {
    Entity(EntityData),
    Agent(AgentData),
    Finding(FindingData),
    Contact(ContactData),
    Summary(SummaryData),
    Mention(MentionData),
}

impl NodePayload {
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Entity(_) => NodeKind::Entity,
            Self::Agent(_) => NodeKind::Agent,
            Self::Finding(_) | Self::Contact(_) => NodeKind::Finding,
            Self::Summary(_) => NodeKind::Summary,
            Self::Mention(_) => NodeKind::Auxiliary,
        }
    }
}

// ---------------------------------------------------------------------------
// Node / Edge
// ---------------------------------------------------------------------------

/// A node on the investigation canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub label: String,
    pub position: Position,
    /// Measured size, if the view has reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measured: Option<Size>,
    #[serde(default)]
    pub status: NodeStatus,
    pub payload: NodePayload,
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        self.payload.kind()
    }

    pub fn as_agent(&self) -> Option<&AgentData> {
        match &self.payload {
            NodePayload::Agent(data) => Some(data),
            _ => None,
        }
    }
}

/// A directed edge between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub animated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Edge {
    /// Build an animated edge whose id is derived from its endpoints.
    pub fn new(source: &str, target: &str, label: Option<&str>) -> Self {
        Self {
            id: Self::id_for(source, target),
            source: source.to_string(),
            target: target.to_string(),
            animated: true,
            label: label.map(String::from),
        }
    }

    pub fn id_for(source: &str, target: &str) -> String {
        format!("edge:{source}->{target}")
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.source == node_id || self.target == node_id
    }
}

// ---------------------------------------------------------------------------
// Status banner
// ---------------------------------------------------------------------------

/// Category of the transient status banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Idle,
    Thinking,
    ToolCall,
    ToolResult,
    Complete,
}

/// Transient one-line status shown while a stream is running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusInfo {
    pub kind: StatusKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl StatusInfo {
    pub fn new(kind: StatusKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            tool: None,
            description: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Persisted investigation header
// ---------------------------------------------------------------------------

/// Investigation row as kept by the persistence adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationRecord {
    pub id: InvestigationId,
    pub entity_name: String,
    pub entity_kind: EntityKind,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<String>,
    pub total_findings: u32,
    pub tools_completed: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
