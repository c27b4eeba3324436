//! Event dispatcher: routes stream messages into the graph.
//!
//! An [`Engine`] owns the graph of exactly one investigation. Messages are
//! applied one at a time with [`Engine::apply`], which returns the resulting
//! [`GraphDiff`] and also publishes it to every subscriber. When a
//! [`SyncHandle`] is attached, the same diff is forwarded to persistence.

use std::collections::HashMap;

use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use casegraph_shared::{
    CaseGraphError, Edge, EngineConfig, EntityKind, InvestigationId, Node, NodeStatus, Position,
    Result, ResultKind, Size, StatusInfo, StatusKind,
};

use crate::classifier::{self, ToolRegistry};
use crate::events::{
    AgentComplete, AgentProgress, AgentStart, ProjectComplete, ProjectStart, StreamEvent, Trace,
};
use crate::graph::{AgentOutcome, GraphBuilder, GraphDiff};
use crate::sync::{SyncHandle, SyncOp};

/// Capacity of the diff broadcast channel. Slow subscribers lag, they do not
/// block the engine.
const DIFF_CHANNEL_CAPACITY: usize = 256;

/// Characters of narration shown in the status banner.
const BANNER_CHARS: usize = 100;

/// Narration longer than this is treated as the final write-up.
const SUMMARY_TEXT_THRESHOLD: usize = 200;

/// State of the transport feeding the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Error,
}

/// Incremental graph engine for one investigation.
pub struct Engine {
    registry: ToolRegistry,
    config: EngineConfig,
    graph: GraphBuilder,
    status: Option<StatusInfo>,
    connection: ConnectionState,
    /// Set when the stream failed; later events are dropped while present.
    failure: Option<CaseGraphError>,
    /// Tool key -> agent node created from a detected shell command.
    tool_agents: HashMap<String, String>,
    /// Upstream agent id -> node id it was folded into.
    agent_aliases: HashMap<String, String>,
    /// Tool call id -> agent node id, for attaching tool output.
    tool_uses: HashMap<String, String>,
    diffs: broadcast::Sender<GraphDiff>,
    sync: Option<SyncHandle>,
}

impl Engine {
    /// Create an engine with the registry built from `config.tools`.
    pub fn new(investigation: InvestigationId, config: EngineConfig) -> Result<Self> {
        let registry = ToolRegistry::from_config(&config.tools)?;
        Ok(Self::with_registry(investigation, config, registry))
    }

    pub fn with_registry(
        investigation: InvestigationId,
        config: EngineConfig,
        registry: ToolRegistry,
    ) -> Self {
        let graph = GraphBuilder::new(
            investigation,
            config.layout.clone(),
            config.findings.clone(),
        );
        Self::from_graph(graph, config, registry)
    }

    /// Resume a persisted graph.
    pub fn resume(
        investigation: InvestigationId,
        config: EngineConfig,
        nodes: Vec<Node>,
        edges: Vec<Edge>,
    ) -> Result<Self> {
        let registry = ToolRegistry::from_config(&config.tools)?;
        let graph = GraphBuilder::from_parts(
            investigation,
            config.layout.clone(),
            config.findings.clone(),
            nodes,
            edges,
        );
        info!(
            investigation = %graph.investigation(),
            nodes = graph.nodes().len(),
            edges = graph.edges().len(),
            "graph resumed"
        );
        Ok(Self::from_graph(graph, config, registry))
    }

    fn from_graph(graph: GraphBuilder, config: EngineConfig, registry: ToolRegistry) -> Self {
        let (diffs, _) = broadcast::channel(DIFF_CHANNEL_CAPACITY);
        Self {
            registry,
            config,
            graph,
            status: None,
            connection: ConnectionState::Connected,
            failure: None,
            tool_agents: HashMap::new(),
            agent_aliases: HashMap::new(),
            tool_uses: HashMap::new(),
            diffs,
            sync: None,
        }
    }

    /// Forward every future diff to a persistence worker.
    pub fn attach_sync(&mut self, handle: SyncHandle) {
        self.sync = Some(handle);
    }

    /// Detach the persistence worker, flushing its pending writes.
    pub async fn close(&mut self) {
        if let Some(handle) = self.sync.take() {
            handle.close().await;
        }
    }

    /// Receive every non-empty diff produced from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<GraphDiff> {
        self.diffs.subscribe()
    }

    pub fn graph(&self) -> &GraphBuilder {
        &self.graph
    }

    pub fn investigation(&self) -> &InvestigationId {
        self.graph.investigation()
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn status(&self) -> Option<&StatusInfo> {
        self.status.as_ref()
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn is_interrupted(&self) -> bool {
        self.failure.is_some()
    }

    /// Why the stream was interrupted, if it was.
    pub fn stream_error(&self) -> Option<&CaseGraphError> {
        self.failure.as_ref()
    }

    // -----------------------------------------------------------------------
    // Transport
    // -----------------------------------------------------------------------

    /// The transport failed. Every later event is dropped until
    /// [`Engine::reset_stream`].
    pub fn fail_stream(&mut self, reason: &str) {
        let error = CaseGraphError::stream(reason);
        warn!(investigation = %self.investigation(), error = %error, "investigation interrupted");
        self.connection = ConnectionState::Error;
        self.failure = Some(error);
        self.tool_uses.clear();
    }

    /// A new stream is starting from the beginning.
    pub fn reset_stream(&mut self) {
        debug!(investigation = %self.investigation(), "stream reset");
        self.connection = ConnectionState::Connected;
        self.failure = None;
        self.tool_uses.clear();
        self.status = None;
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Apply one stream message and return what changed.
    #[instrument(skip_all, fields(investigation = %self.graph.investigation(), event = event.kind()))]
    pub fn apply(&mut self, event: &StreamEvent) -> GraphDiff {
        if self.failure.is_some() {
            debug!("stream interrupted, event dropped");
            return GraphDiff::default();
        }
        if let Some(project_id) = event.project_id() {
            if project_id != self.investigation().as_str() {
                debug!(project_id, "event for another investigation ignored");
                return GraphDiff::default();
            }
        }

        match event {
            StreamEvent::ProjectStart { payload, .. } => self.on_project_start(payload),
            StreamEvent::AgentStart {
                agent_id, payload, ..
            } => self.on_agent_start(agent_id, payload),
            StreamEvent::AgentProgress {
                agent_id, payload, ..
            } => self.on_agent_progress(agent_id, payload),
            StreamEvent::AgentComplete {
                agent_id, payload, ..
            } => self.on_agent_complete(agent_id, payload),
            StreamEvent::AgentError {
                agent_id, payload, ..
            } => {
                let node_id = self.node_for(agent_id);
                let error = payload.error.clone();
                self.graph.update_agent(&node_id, |status, data| {
                    *status = NodeStatus::Failed;
                    data.error = error;
                });
            }
            StreamEvent::ProjectComplete { payload, .. } => self.on_project_complete(payload),
            StreamEvent::Trace { payload, .. } => self.on_trace(payload),
            StreamEvent::Error { payload, .. } => {
                let reason = payload.message.as_deref().unwrap_or("stream error");
                self.fail_stream(reason);
            }
            StreamEvent::Unknown => debug!("unrecognized event ignored"),
        }

        self.publish()
    }

    fn on_project_start(&mut self, payload: &ProjectStart) {
        let entity_kind = payload
            .entity_type
            .as_deref()
            .map(EntityKind::parse_lossy)
            .unwrap_or_else(|| classifier::guess_entity_kind(&payload.entity_name));

        self.send_sync(SyncOp::CreateInvestigation {
            entity_name: payload.entity_name.clone(),
            entity_kind,
        });
        self.graph
            .ensure_root_entity(&payload.entity_name, entity_kind);
        self.status = None;
        info!(entity = %payload.entity_name, kind = entity_kind.as_str(), "investigation started");
    }

    /// Map an upstream agent id onto the node that represents it. A tool
    /// already running under a node created from a shell command reuses it.
    fn resolve_agent(&mut self, agent_id: &str, tool: Option<&str>) -> String {
        if self.graph.has_node(agent_id) {
            return agent_id.to_string();
        }
        if let Some(node_id) = self.agent_aliases.get(agent_id) {
            return node_id.clone();
        }
        if let Some(node_id) = tool.and_then(|t| self.tool_agents.get(t)).cloned() {
            if self.graph.has_node(&node_id) {
                debug!(agent = agent_id, node = %node_id, "agent folded into detected tool node");
                self.agent_aliases.insert(agent_id.to_string(), node_id.clone());
                return node_id;
            }
        }
        agent_id.to_string()
    }

    /// [`Engine::resolve_agent`] with the tool inferred from the agent id.
    fn node_for(&mut self, agent_id: &str) -> String {
        let tool = self.registry.identify(None, agent_id, None);
        self.resolve_agent(agent_id, tool.as_deref())
    }

    fn agent_label(&self, task: Option<&str>, tool: Option<&str>) -> String {
        let label = classifier::extract_tool_label(task);
        match tool {
            Some(tool) if task.is_none() => self.registry.display_name(tool),
            _ => label,
        }
    }

    fn on_agent_start(&mut self, agent_id: &str, payload: &AgentStart) {
        let task = payload.task.as_deref();
        let tool = self
            .registry
            .identify(payload.tool.as_deref(), agent_id, task);
        let node_id = self.resolve_agent(agent_id, tool.as_deref());
        let label = self.agent_label(task, tool.as_deref());

        let outcome =
            self.graph
                .ensure_agent_node(&node_id, &label, NodeStatus::Running, task, tool.as_deref());
        let message = match outcome {
            AgentOutcome::Created => format!("Starting {label}"),
            AgentOutcome::Updated => task.unwrap_or("Running...").to_string(),
            AgentOutcome::NoRoot => return,
        };
        self.status = Some(StatusInfo {
            kind: StatusKind::ToolCall,
            message,
            tool: Some(tool.unwrap_or_else(|| agent_id.to_string())),
            description: payload.task.clone(),
        });
    }

    fn on_agent_progress(&mut self, agent_id: &str, payload: &AgentProgress) {
        let node_id = self.node_for(agent_id);
        let progress = payload.progress;
        let task = payload.task.clone();
        self.graph.update_agent(&node_id, |status, data| {
            *status = NodeStatus::Streaming;
            if progress.is_some() {
                data.progress = progress;
            }
            if task.is_some() {
                data.task = task;
            }
        });
    }

    fn on_agent_complete(&mut self, agent_id: &str, payload: &AgentComplete) {
        let tool = self
            .registry
            .identify(payload.tool.as_deref(), agent_id, None);
        let node_id = self.resolve_agent(agent_id, tool.as_deref());
        let tool = tool.or_else(|| {
            self.graph
                .node(&node_id)
                .and_then(|n| n.as_agent())
                .and_then(|a| a.tool.clone())
        });
        let findings = payload.object_findings();
        let result_kind = payload.result_kind();

        if !findings.is_empty() {
            if !self.graph.has_node(&node_id) {
                let label = self.agent_label(None, tool.as_deref());
                self.graph.ensure_agent_node(
                    &node_id,
                    &label,
                    NodeStatus::Running,
                    None,
                    tool.as_deref(),
                );
            }
            self.graph
                .attach_findings(&node_id, &findings, tool.as_deref());
        }

        let confidence = payload.confidence;
        self.graph.update_agent(&node_id, |status, data| {
            *status = if result_kind == ResultKind::Warning {
                NodeStatus::Warning
            } else {
                NodeStatus::Completed
            };
            data.result_kind = Some(result_kind);
            data.confidence = confidence;
            if !findings.is_empty() {
                data.findings = findings;
            }
        });

        let name = tool
            .as_deref()
            .map(|t| self.registry.display_name(t))
            .unwrap_or_else(|| agent_id.to_string());
        let description = if result_kind == ResultKind::Warning {
            format!("{name} - Match found")
        } else {
            format!("{name} - Clear")
        };
        self.status = Some(StatusInfo {
            kind: StatusKind::ToolResult,
            message: format!("{name}: {}", payload.status.as_deref().unwrap_or("done")),
            tool: Some(tool.unwrap_or_else(|| agent_id.to_string())),
            description: Some(description),
        });
    }

    fn on_project_complete(&mut self, payload: &ProjectComplete) {
        let risk_level = payload.risk_level.clone();
        let total_findings = payload.total_findings;
        let tools_completed = payload.tools_completed;

        self.graph.update_root(|status, data| {
            *status = NodeStatus::Completed;
            data.risk_score = classifier::risk_level_to_score(&risk_level);
            data.risk_level = Some(risk_level.clone());
            data.total_findings = Some(total_findings);
        });
        self.graph.update_summary(|data| {
            data.risk_level = risk_level.clone();
            data.total_findings = total_findings;
            data.tools_completed = tools_completed;
        });
        self.graph.request_fit_view();

        self.send_sync(SyncOp::CompleteInvestigation {
            risk_level: (!risk_level.is_empty()).then(|| risk_level.clone()),
            total_findings,
            tools_completed,
        });
        self.status = Some(StatusInfo::new(StatusKind::Complete, "Analysis complete"));
        self.tool_uses.clear();
        info!(risk_level = %risk_level, total_findings, tools_completed, "investigation complete");
    }

    fn on_trace(&mut self, payload: &Trace) {
        if let Some(result) = payload.message.final_result() {
            self.graph.attach_summary(result);
        }

        for item in payload.message.items() {
            if let Some(text) = item.text.as_deref() {
                self.status = Some(StatusInfo::new(StatusKind::Thinking, narration_banner(text)));
            }

            if let Some((tool_use_id, command, description)) = item.shell_command() {
                self.on_shell_command(tool_use_id, command, description);
            }

            if let Some((tool_use_id, output)) = item.tool_result() {
                if let Some(node_id) = self.tool_uses.get(tool_use_id).cloned() {
                    let excerpt: String = output.chars().take(self.config.findings.excerpt_chars).collect();
                    self.graph.update_agent(&node_id, |_, data| {
                        data.streaming_text = Some(excerpt);
                    });
                }
            }
        }
    }

    fn on_shell_command(&mut self, tool_use_id: &str, command: &str, description: Option<&str>) {
        let Some(tool) = self.registry.detect(command).map(|t| t.key.clone()) else {
            return;
        };

        let existing = self
            .tool_agents
            .get(&tool)
            .filter(|id| self.graph.has_node(id))
            .cloned()
            .or_else(|| self.graph.agent_for_tool(&tool).map(|n| n.id.clone()));

        let node_id = match existing {
            Some(node_id) => Some(node_id),
            None => {
                let node_id = format!("{tool}-{tool_use_id}");
                let name = self.registry.display_name(&tool);
                let task = format!("Running {name}...");
                match self.graph.ensure_agent_node(
                    &node_id,
                    &name,
                    NodeStatus::Running,
                    Some(&task),
                    Some(&tool),
                ) {
                    AgentOutcome::NoRoot => None,
                    _ => {
                        self.tool_agents.insert(tool.clone(), node_id.clone());
                        Some(node_id)
                    }
                }
            }
        };
        if let Some(node_id) = node_id {
            self.tool_uses.insert(tool_use_id.to_string(), node_id);
        }

        let description = description
            .map(String::from)
            .unwrap_or_else(|| format!("Running {}...", tool.replace('_', " ")));
        self.status = Some(StatusInfo {
            kind: StatusKind::ToolCall,
            message: command.to_string(),
            tool: Some(tool),
            description: Some(description),
        });
    }

    // -----------------------------------------------------------------------
    // User operations
    // -----------------------------------------------------------------------

    /// Hierarchical reflow of the whole canvas.
    #[instrument(skip_all, fields(investigation = %self.graph.investigation()))]
    pub fn organize(&mut self) -> GraphDiff {
        self.graph.organize();
        self.publish()
    }

    /// User drag. The position write is debounced by the sync worker.
    pub fn move_node(&mut self, id: &str, position: Position) -> GraphDiff {
        self.graph.move_node(id, position);
        self.publish()
    }

    pub fn delete_node(&mut self, id: &str) -> GraphDiff {
        self.graph.delete_node(id);
        self.publish()
    }

    /// Record the rendered size of a node. Not persisted.
    pub fn set_measured_size(&mut self, id: &str, width: f64, height: f64) -> bool {
        self.graph.set_measured_size(id, Size { width, height })
    }

    // -----------------------------------------------------------------------
    // Publication
    // -----------------------------------------------------------------------

    fn publish(&mut self) -> GraphDiff {
        let diff = self.graph.take_diff();
        if diff.is_empty() {
            return diff;
        }
        self.sync_diff(&diff);
        // No subscribers is fine.
        let _ = self.diffs.send(diff.clone());
        diff
    }

    fn send_sync(&self, op: SyncOp) {
        if let Some(sync) = &self.sync {
            sync.send(op);
        }
    }

    /// Translate a diff into ordered persistence writes.
    fn sync_diff(&self, diff: &GraphDiff) {
        let Some(sync) = &self.sync else {
            return;
        };

        for edge_id in &diff.edges_deleted {
            sync.send(SyncOp::DeleteEdge(edge_id.clone()));
        }
        for node_id in &diff.deleted {
            sync.send(SyncOp::DeleteNode(node_id.clone()));
        }
        for node in diff.created.iter().filter_map(|id| self.graph.node(id)) {
            sync.send(SyncOp::CreateNode(node.clone()));
        }
        for edge in diff.edges_created.iter().filter_map(|id| self.graph.edge(id)) {
            sync.send(SyncOp::CreateEdge(edge.clone()));
        }
        for node in diff.updated.iter().filter_map(|id| self.graph.node(id)) {
            sync.send(SyncOp::UpdateNode(node.clone()));
        }
        for node in diff.moved.iter().filter_map(|id| self.graph.node(id)) {
            sync.send(SyncOp::MoveNode {
                node_id: node.id.clone(),
                position: node.position,
            });
        }
    }
}

/// Banner text for a narration block.
fn narration_banner(text: &str) -> String {
    let is_summary = text.contains("## ")
        || text.contains("Risk Summary")
        || text.contains("CRITICAL")
        || text.chars().count() > SUMMARY_TEXT_THRESHOLD;
    if is_summary {
        "Generating analysis summary...".to_string()
    } else {
        text.chars().take(BANNER_CHARS).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use casegraph_shared::{NodeKind, NodePayload};

    use crate::events::parse_event;
    use crate::sync::tests::RecordingStore;

    const INV: &str = "p1";

    fn engine() -> Engine {
        Engine::new(InvestigationId::from(INV), EngineConfig::default()).expect("engine")
    }

    fn apply(engine: &mut Engine, json: &str) -> GraphDiff {
        engine.apply(&parse_event(json).expect("valid event"))
    }

    fn start(engine: &mut Engine) {
        apply(
            engine,
            r#"{"type":"project_start","project_id":"p1","payload":{"entity_name":"Acme Holdings Ltd","entity_type":"company"}}"#,
        );
    }

    fn agent_start(engine: &mut Engine, agent_id: &str, task: &str) -> GraphDiff {
        apply(
            engine,
            &format!(
                r#"{{"type":"agent_start","project_id":"p1","agent_id":"{agent_id}","payload":{{"task":"{task}"}}}}"#
            ),
        )
    }

    #[test]
    fn duplicate_start_creates_one_root() {
        let mut e = engine();
        start(&mut e);
        start(&mut e);
        let roots = e.graph().nodes().iter().filter(|n| n.kind() == NodeKind::Entity).count();
        assert_eq!(roots, 1);
        assert_eq!(e.graph().nodes()[0].id, "entity-p1");
        match &e.graph().nodes()[0].payload {
            NodePayload::Entity(data) => assert_eq!(data.entity_kind, EntityKind::Company),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn agent_start_creates_agent_and_banner() {
        let mut e = engine();
        start(&mut e);
        let diff = agent_start(&mut e, "sanctions-ab12", "Running Sanctions Check...");
        assert_eq!(diff.created, vec!["sanctions-ab12"]);
        assert_eq!(diff.edges_created, vec!["edge:entity-p1->sanctions-ab12"]);
        assert!(diff.fit_view);

        let node = e.graph().node("sanctions-ab12").unwrap();
        assert_eq!(node.label, "Sanctions Check");
        assert_eq!(node.as_agent().unwrap().tool.as_deref(), Some("sanctions"));

        let status = e.status().unwrap();
        assert_eq!(status.kind, StatusKind::ToolCall);
        assert_eq!(status.message, "Starting Sanctions Check");
        assert_eq!(status.tool.as_deref(), Some("sanctions"));
    }

    #[test]
    fn agent_before_start_is_ignored() {
        let mut e = engine();
        let diff = agent_start(&mut e, "sanctions-ab12", "Running Sanctions Check...");
        assert!(diff.is_empty());
        assert!(e.graph().nodes().is_empty());
    }

    #[test]
    fn empty_completion_creates_nothing() {
        let mut e = engine();
        start(&mut e);
        let diff = apply(
            &mut e,
            r#"{"type":"agent_complete","project_id":"p1","agent_id":"geo_risk-z9","payload":{"status":"clear","resultType":"success","findings":[],"confidence":80}}"#,
        );
        assert!(diff.is_empty());
        assert_eq!(e.graph().nodes().len(), 1);
        assert!(e.graph().edges().is_empty());

        let status = e.status().unwrap();
        assert_eq!(status.kind, StatusKind::ToolResult);
        assert_eq!(status.message, "Geographic Risk: clear");
    }

    #[test]
    fn completion_attaches_findings_once() {
        let mut e = engine();
        start(&mut e);
        agent_start(&mut e, "sanctions-ab12", "Running Sanctions Check...");
        let complete = r#"{"type":"agent_complete","project_id":"p1","agent_id":"sanctions-ab12","payload":{"status":"match","resultType":"warning","findings":[{"name":"Acme Holdings","score":100,"datasets":["us_ofac_sdn"]},{"name":"Acme Trading","score":72}],"confidence":92}}"#;

        let diff = apply(&mut e, complete);
        assert_eq!(diff.created.len(), 2);
        assert_eq!(diff.updated, vec!["sanctions-ab12"]);

        apply(&mut e, complete);
        let findings = e.graph().nodes().iter().filter(|n| n.kind() == NodeKind::Finding).count();
        assert_eq!(findings, 2);

        let agent = e.graph().node("sanctions-ab12").unwrap();
        assert_eq!(agent.status, NodeStatus::Warning);
        assert_eq!(agent.as_agent().unwrap().findings.len(), 2);
        assert_eq!(agent.as_agent().unwrap().confidence, Some(92.0));
        assert_eq!(e.status().unwrap().description.as_deref(), Some("Sanctions Check - Match found"));
    }

    #[test]
    fn completion_without_start_creates_agent() {
        let mut e = engine();
        start(&mut e);
        apply(
            &mut e,
            r#"{"type":"agent_complete","project_id":"p1","agent_id":"pep_check-q1","payload":{"status":"clear","findings":[{"name":"Acme Holdings","pep_level":"none"}]}}"#,
        );
        let agent = e.graph().node("pep_check-q1").expect("agent created");
        assert_eq!(agent.label, "PEP Screening");
        assert_eq!(agent.status, NodeStatus::Completed);
        assert_eq!(e.graph().edges().len(), 2);
    }

    #[test]
    fn progress_and_error_update_existing_agents_only() {
        let mut e = engine();
        start(&mut e);
        agent_start(&mut e, "sanctions-ab12", "Running Sanctions Check...");

        apply(
            &mut e,
            r#"{"type":"agent_progress","project_id":"p1","agent_id":"sanctions-ab12","payload":{"progress":0.5,"task":"Querying OFAC"}}"#,
        );
        let agent = e.graph().node("sanctions-ab12").unwrap();
        assert_eq!(agent.status, NodeStatus::Streaming);
        assert_eq!(agent.as_agent().unwrap().progress, Some(0.5));

        apply(
            &mut e,
            r#"{"type":"agent_error","project_id":"p1","agent_id":"sanctions-ab12","payload":{"error":"timeout"}}"#,
        );
        let agent = e.graph().node("sanctions-ab12").unwrap();
        assert_eq!(agent.status, NodeStatus::Failed);
        assert_eq!(agent.as_agent().unwrap().error.as_deref(), Some("timeout"));

        let diff = apply(
            &mut e,
            r#"{"type":"agent_error","project_id":"p1","agent_id":"ghost-1","payload":{"error":"x"}}"#,
        );
        assert!(diff.is_empty());
    }

    #[test]
    fn project_complete_updates_root_and_summary() {
        let mut e = engine();
        start(&mut e);
        agent_start(&mut e, "sanctions-ab12", "Running Sanctions Check...");
        apply(
            &mut e,
            r###"{"type":"trace","project_id":"p1","payload":{"message":{"subtype":"success","result":"## Risk Summary\nHigh risk."}}}"###,
        );
        apply(
            &mut e,
            r#"{"type":"project_complete","project_id":"p1","payload":{"risk_level":"high","total_findings":4,"tools_completed":3}}"#,
        );

        let root = e.graph().node("entity-p1").unwrap();
        assert_eq!(root.status, NodeStatus::Completed);
        match &root.payload {
            NodePayload::Entity(data) => {
                assert_eq!(data.risk_score, 85);
                assert_eq!(data.total_findings, Some(4));
            }
            other => panic!("unexpected {other:?}"),
        }
        match &e.graph().node("summary-p1").unwrap().payload {
            NodePayload::Summary(data) => {
                assert_eq!(data.risk_level, "high");
                assert_eq!(data.tools_completed, 3);
                assert_eq!(data.summary, "## Risk Summary\nHigh risk.");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(e.status().unwrap().kind, StatusKind::Complete);
    }

    #[test]
    fn shell_command_creates_and_aliases_tool_agent() {
        let mut e = engine();
        start(&mut e);
        apply(
            &mut e,
            r#"{"type":"trace","project_id":"p1","payload":{"message":{"content":[
                {"type":"tool_use","name":"Bash","id":"toolu_1","input":{"command":"python -m src.tools.adverse_media 'Acme Holdings Ltd'"}}
            ]}}}"#,
        );
        let agent = e.graph().agent_for_tool("adverse_media").expect("detected agent").id.clone();
        assert_eq!(agent, "adverse_media-toolu_1");
        let status = e.status().unwrap();
        assert_eq!(status.kind, StatusKind::ToolCall);
        assert_eq!(status.description.as_deref(), Some("Running adverse media..."));

        // The backend's own start event for the same tool reuses the node.
        agent_start(&mut e, "adverse_media-k3", "Running Adverse Media...");
        let agents = e.graph().nodes().iter().filter(|n| n.kind() == NodeKind::Agent).count();
        assert_eq!(agents, 1);

        apply(
            &mut e,
            r#"{"type":"trace","project_id":"p1","payload":{"message":{"content":[
                {"type":"tool_result","tool_use_id":"toolu_1","content":"{\"status\":\"clear\",\"findings\":[]}"}
            ]}}}"#,
        );
        let node = e.graph().node(&agent).unwrap();
        assert_eq!(
            node.as_agent().unwrap().streaming_text.as_deref(),
            Some(r#"{"status":"clear","findings":[]}"#)
        );

        apply(
            &mut e,
            r#"{"type":"agent_complete","project_id":"p1","agent_id":"adverse_media-k3","payload":{"status":"alert","resultType":"warning","findings":[{"title":"Acme Holdings director John Smith charged"}]}}"#,
        );
        assert!(e.graph().has_node("adverse_media-toolu_1/finding/0"));
        assert!(e.graph().has_node("adverse_media-toolu_1/mention/john-smith"));
    }

    #[test]
    fn unmatched_command_creates_nothing() {
        let mut e = engine();
        start(&mut e);
        let diff = apply(
            &mut e,
            r#"{"type":"trace","project_id":"p1","payload":{"message":{"content":[
                {"type":"tool_use","name":"Bash","id":"toolu_9","input":{"command":"ls -la"}}
            ]}}}"#,
        );
        assert!(diff.is_empty());
        assert_eq!(e.graph().nodes().len(), 1);
    }

    #[test]
    fn narration_banner_rules() {
        assert_eq!(narration_banner("Checking sanctions lists"), "Checking sanctions lists");
        assert_eq!(narration_banner("## Findings"), "Generating analysis summary...");
        assert_eq!(narration_banner(&"x".repeat(201)), "Generating analysis summary...");
        assert_eq!(narration_banner(&"y".repeat(150)).len(), 100);
    }

    #[test]
    fn stream_failure_drops_later_events() {
        let mut e = engine();
        start(&mut e);
        e.fail_stream("connection reset");
        assert_eq!(e.connection(), ConnectionState::Error);
        assert!(e.is_interrupted());
        assert_eq!(
            e.stream_error().map(ToString::to_string).as_deref(),
            Some("stream error: connection reset")
        );

        let diff = agent_start(&mut e, "sanctions-ab12", "Running Sanctions Check...");
        assert!(diff.is_empty());
        assert!(!e.graph().has_node("sanctions-ab12"));

        e.reset_stream();
        assert!(e.stream_error().is_none());
        agent_start(&mut e, "sanctions-ab12", "Running Sanctions Check...");
        assert!(e.graph().has_node("sanctions-ab12"));
    }

    #[test]
    fn error_event_interrupts() {
        let mut e = engine();
        start(&mut e);
        apply(&mut e, r#"{"type":"error","project_id":"p1","payload":{"message":"ANTHROPIC_API_KEY not configured"}}"#);
        assert!(e.is_interrupted());
        match e.stream_error() {
            Some(CaseGraphError::Stream(message)) => {
                assert_eq!(message, "ANTHROPIC_API_KEY not configured")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn foreign_and_unknown_events_are_ignored() {
        let mut e = engine();
        start(&mut e);
        let diff = apply(
            &mut e,
            r#"{"type":"agent_start","project_id":"other","agent_id":"sanctions-1","payload":{}}"#,
        );
        assert!(diff.is_empty());
        let diff = apply(&mut e, r#"{"type":"heartbeat"}"#);
        assert!(diff.is_empty());
        assert_eq!(e.graph().nodes().len(), 1);
    }

    #[test]
    fn user_operations() {
        let mut e = engine();
        start(&mut e);
        agent_start(&mut e, "sanctions-ab12", "Running Sanctions Check...");

        let diff = e.move_node("sanctions-ab12", Position::new(900.0, 900.0));
        assert_eq!(diff.moved, vec!["sanctions-ab12"]);

        assert!(e.set_measured_size("sanctions-ab12", 300.0, 140.0));
        assert!(!e.set_measured_size("missing", 1.0, 1.0));

        let diff = e.organize();
        assert!(diff.fit_view);
        assert_eq!(e.graph().node("sanctions-ab12").unwrap().position, Position::new(500.0, 320.0));

        let diff = e.delete_node("sanctions-ab12");
        assert_eq!(diff.deleted, vec!["sanctions-ab12"]);
        assert_eq!(diff.edges_deleted.len(), 1);
        assert!(e.delete_node("sanctions-ab12").is_empty());
    }

    #[tokio::test]
    async fn subscribers_receive_diffs() {
        let mut e = engine();
        let mut rx = e.subscribe();
        start(&mut e);
        let diff = rx.recv().await.expect("diff");
        assert_eq!(diff.created, vec!["entity-p1"]);
    }

    #[tokio::test]
    async fn diffs_are_persisted_through_sync() {
        let store = Arc::new(RecordingStore::default());
        let mut e = engine();
        e.attach_sync(SyncHandle::spawn(
            store.clone(),
            InvestigationId::from(INV),
            Duration::from_millis(10),
        ));

        start(&mut e);
        agent_start(&mut e, "sanctions-ab12", "Running Sanctions Check...");
        e.move_node("sanctions-ab12", Position::new(600.0, 600.0));
        e.delete_node("sanctions-ab12");
        e.close().await;

        assert_eq!(
            store.entries(),
            vec![
                "investigation p1 Acme Holdings Ltd",
                "create entity-p1",
                "create sanctions-ab12",
                "edge edge:entity-p1->sanctions-ab12",
                "unedge edge:entity-p1->sanctions-ab12",
                "delete sanctions-ab12",
            ]
        );
    }
}
