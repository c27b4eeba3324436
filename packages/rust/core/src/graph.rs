//! In-memory investigation graph.
//!
//! [`GraphBuilder`] owns the node and edge collections of one investigation.
//! Every mutation is recorded into a pending [`GraphDiff`] which the caller
//! drains with [`GraphBuilder::take_diff`] once an event has been handled.

use serde::Serialize;
use tracing::debug;

use casegraph_shared::{
    AgentData, ContactKind, Edge, EntityData, EntityKind, FindingsConfig, InvestigationId,
    LayoutConfig, MentionData, Node, NodeKind, NodePayload, NodeStatus, Position, RawFinding, Size,
    SummaryData,
};

use crate::classifier;
use crate::placement;

/// Label of the summary node.
const SUMMARY_LABEL: &str = "Analysis Summary";

/// Edge label from an adverse-media agent to a mentioned entity.
const MENTION_EDGE_LABEL: &str = "mentions";

/// Ids touched by one handled event or user operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphDiff {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub deleted: Vec<String>,
    pub edges_created: Vec<String>,
    pub edges_deleted: Vec<String>,
    pub moved: Vec<String>,
    /// The view should re-fit to the whole graph.
    pub fit_view: bool,
}

impl GraphDiff {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
            && self.updated.is_empty()
            && self.deleted.is_empty()
            && self.edges_created.is_empty()
            && self.edges_deleted.is_empty()
            && self.moved.is_empty()
            && !self.fit_view
    }

    fn push_unique(list: &mut Vec<String>, id: &str) {
        if !list.iter().any(|existing| existing == id) {
            list.push(id.to_string());
        }
    }

    fn created(&mut self, id: &str) {
        Self::push_unique(&mut self.created, id);
    }

    /// Updates to a node created in the same diff are folded into the create.
    fn updated(&mut self, id: &str) {
        if !self.created.iter().any(|c| c == id) {
            Self::push_unique(&mut self.updated, id);
        }
    }

    fn moved(&mut self, id: &str) {
        if !self.created.iter().any(|c| c == id) {
            Self::push_unique(&mut self.moved, id);
        }
    }

    fn deleted(&mut self, id: &str) {
        self.created.retain(|c| c != id);
        self.updated.retain(|c| c != id);
        self.moved.retain(|c| c != id);
        Self::push_unique(&mut self.deleted, id);
    }
}

/// Outcome of [`GraphBuilder::ensure_agent_node`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentOutcome {
    Created,
    Updated,
    /// No root entity yet; nothing was done.
    NoRoot,
}

/// Owner of one investigation's nodes and edges.
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    investigation: InvestigationId,
    layout: LayoutConfig,
    limits: FindingsConfig,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    diff: GraphDiff,
}

impl GraphBuilder {
    pub fn new(investigation: InvestigationId, layout: LayoutConfig, limits: FindingsConfig) -> Self {
        Self {
            investigation,
            layout,
            limits,
            nodes: Vec::new(),
            edges: Vec::new(),
            diff: GraphDiff::default(),
        }
    }

    /// Rebuild from persisted rows. Duplicate node ids keep their first row;
    /// edges with a missing endpoint or a duplicate id are dropped.
    pub fn from_parts(
        investigation: InvestigationId,
        layout: LayoutConfig,
        limits: FindingsConfig,
        nodes: Vec<Node>,
        edges: Vec<Edge>,
    ) -> Self {
        let mut graph = Self::new(investigation, layout, limits);
        for node in nodes {
            if !graph.has_node(&node.id) {
                graph.nodes.push(node);
            }
        }
        for edge in edges {
            if graph.has_node(&edge.source)
                && graph.has_node(&edge.target)
                && !graph.edges.iter().any(|e| e.id == edge.id)
            {
                graph.edges.push(edge);
            } else {
                debug!(edge = %edge.id, "dropping dangling or duplicate edge");
            }
        }
        graph
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn investigation(&self) -> &InvestigationId {
        &self.investigation
    }

    pub fn layout(&self) -> &LayoutConfig {
        &self.layout
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.node(id).is_some()
    }

    pub fn root_id(&self) -> String {
        self.investigation.root_node_id()
    }

    pub fn summary_id(&self) -> String {
        self.investigation.summary_node_id()
    }

    pub fn agent_ids(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| n.kind() == NodeKind::Agent)
            .map(|n| n.id.clone())
            .collect()
    }

    /// First agent node run by the given tool.
    pub fn agent_for_tool(&self, tool: &str) -> Option<&Node> {
        self.nodes
            .iter()
            .find(|n| n.as_agent().and_then(|a| a.tool.as_deref()) == Some(tool))
    }

    /// Drain the changes recorded since the last call.
    pub fn take_diff(&mut self) -> GraphDiff {
        std::mem::take(&mut self.diff)
    }

    pub fn request_fit_view(&mut self) {
        self.diff.fit_view = true;
    }

    fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    // -----------------------------------------------------------------------
    // Primitive mutations
    // -----------------------------------------------------------------------

    /// Insert a new node at the nearest free position to `target`.
    fn insert_node(
        &mut self,
        id: String,
        label: String,
        target: Position,
        status: NodeStatus,
        payload: NodePayload,
    ) {
        let position = placement::find_non_colliding_position(&self.nodes, target, None, &self.layout);
        debug!(node = %id, kind = payload.kind().as_str(), x = position.x, y = position.y, "node created");
        self.diff.created(&id);
        self.nodes.push(Node {
            id,
            label,
            position,
            measured: None,
            status,
            payload,
        });
    }

    /// Add an edge between two existing nodes. Returns false when an endpoint
    /// is missing or the edge already exists.
    fn add_edge(&mut self, source: &str, target: &str, label: Option<&str>) -> bool {
        if !self.has_node(source) || !self.has_node(target) {
            debug!(source, target, "edge endpoint missing, skipped");
            return false;
        }
        let edge = Edge::new(source, target, label);
        if self.edges.iter().any(|e| e.id == edge.id) {
            return false;
        }
        self.diff.edges_created.push(edge.id.clone());
        self.edges.push(edge);
        true
    }

    // -----------------------------------------------------------------------
    // Graph operations
    // -----------------------------------------------------------------------

    /// Create the root entity node, or refresh its label and kind.
    /// Returns the root id.
    pub fn ensure_root_entity(&mut self, label: &str, entity_kind: EntityKind) -> String {
        let root_id = self.root_id();
        if let Some(node) = self.node_mut(&root_id) {
            let mut changed = node.label != label;
            node.label = label.to_string();
            if let NodePayload::Entity(data) = &mut node.payload {
                changed |= data.entity_kind != entity_kind;
                data.entity_kind = entity_kind;
            }
            if changed {
                self.diff.updated(&root_id);
            }
            return root_id;
        }

        let target = Position::new(self.layout.center_x, self.layout.entity_y);
        self.insert_node(
            root_id.clone(),
            label.to_string(),
            target,
            NodeStatus::Running,
            NodePayload::Entity(EntityData {
                entity_kind,
                ..Default::default()
            }),
        );
        self.diff.fit_view = true;
        root_id
    }

    /// Create an agent node linked from the root, or update the status and
    /// task of an existing one.
    pub fn ensure_agent_node(
        &mut self,
        agent_id: &str,
        label: &str,
        status: NodeStatus,
        task: Option<&str>,
        tool: Option<&str>,
    ) -> AgentOutcome {
        if let Some(node) = self.node_mut(agent_id) {
            node.status = status;
            if let NodePayload::Agent(data) = &mut node.payload {
                if let Some(task) = task {
                    data.task = Some(task.to_string());
                }
                if data.tool.is_none() {
                    data.tool = tool.map(String::from);
                }
            }
            self.diff.updated(agent_id);
            return AgentOutcome::Updated;
        }

        let root_id = self.root_id();
        if !self.has_node(&root_id) {
            debug!(agent = agent_id, "no root entity yet, agent not created");
            return AgentOutcome::NoRoot;
        }

        let count = self.agent_ids().len() as f64;
        let target = Position::new(
            self.layout.center_x - self.layout.agent_spacing + count * self.layout.agent_spacing,
            self.layout.agent_y,
        );
        self.insert_node(
            agent_id.to_string(),
            label.to_string(),
            target,
            status,
            NodePayload::Agent(AgentData {
                tool: tool.map(String::from),
                task: task.map(String::from),
                ..Default::default()
            }),
        );
        self.add_edge(&root_id, agent_id, None);
        self.diff.fit_view = true;
        AgentOutcome::Created
    }

    /// Mutate an agent's payload in place. Returns false for unknown or
    /// non-agent ids.
    pub fn update_agent(
        &mut self,
        agent_id: &str,
        update: impl FnOnce(&mut NodeStatus, &mut AgentData),
    ) -> bool {
        let Some(node) = self.node_mut(agent_id) else {
            return false;
        };
        let NodePayload::Agent(data) = &mut node.payload else {
            return false;
        };
        update(&mut node.status, data);
        self.diff.updated(agent_id);
        true
    }

    /// Mutate the root entity in place.
    pub fn update_root(&mut self, update: impl FnOnce(&mut NodeStatus, &mut EntityData)) -> bool {
        let root_id = self.root_id();
        let Some(node) = self.node_mut(&root_id) else {
            return false;
        };
        let NodePayload::Entity(data) = &mut node.payload else {
            return false;
        };
        update(&mut node.status, data);
        self.diff.updated(&root_id);
        true
    }

    /// Mutate the summary in place.
    pub fn update_summary(&mut self, update: impl FnOnce(&mut SummaryData)) -> bool {
        let summary_id = self.summary_id();
        let Some(node) = self.node_mut(&summary_id) else {
            return false;
        };
        let NodePayload::Summary(data) = &mut node.payload else {
            return false;
        };
        update(data);
        self.diff.updated(&summary_id);
        true
    }

    /// Attach the first findings of a completion as children of an agent.
    ///
    /// Findings beyond the per-call limit are dropped. Finding ids are derived
    /// from the agent id and index, so a repeated completion refreshes the
    /// existing nodes instead of adding more. Returns the number attached.
    pub fn attach_findings(&mut self, agent_id: &str, findings: &[RawFinding], tool: Option<&str>) -> usize {
        let Some(parent) = self.node(agent_id).map(|n| n.position) else {
            debug!(agent = agent_id, "unknown agent, findings dropped");
            return 0;
        };

        let taken = &findings[..findings.len().min(self.limits.max_per_call)];
        if taken.len() < findings.len() {
            debug!(
                agent = agent_id,
                dropped = findings.len() - taken.len(),
                "finding overflow dropped"
            );
        }

        let contact_kind = tool.and_then(classifier::contact_kind_for_tool);
        let center = (taken.len() as f64 - 1.0) / 2.0;

        for (i, raw) in taken.iter().enumerate() {
            let id = format!("{agent_id}/finding/{i}");
            let (label, payload, edge_label) = match contact_kind {
                Some(kind) => {
                    let data = classifier::build_contact(raw, kind);
                    let label = data.value.clone();
                    (label, NodePayload::Contact(data), kind_label(kind))
                }
                None => {
                    let data = classifier::build_finding(raw, tool);
                    let label = classifier::finding_label(raw, data.finding_type);
                    let edge_label = data.finding_type.as_str();
                    (label, NodePayload::Finding(data), edge_label)
                }
            };

            if let Some(node) = self.node_mut(&id) {
                node.label = label;
                node.payload = payload;
                self.diff.updated(&id);
            } else {
                let target = Position::new(
                    parent.x + (i as f64 - center) * self.layout.finding_spacing,
                    parent.y + self.layout.finding_offset_y,
                );
                self.insert_node(id.clone(), label, target, NodeStatus::Completed, payload);
            }
            self.add_edge(agent_id, &id, Some(edge_label));
        }

        if tool == Some("adverse_media") {
            self.attach_mentions(agent_id, parent, taken);
        }

        taken.len()
    }

    /// Add "mentioned entity" nodes for names found in media titles.
    fn attach_mentions(&mut self, agent_id: &str, parent: Position, findings: &[RawFinding]) {
        let subject = self
            .node(&self.root_id())
            .map(|n| n.label.clone())
            .unwrap_or_default();

        let mut mentions: Vec<(String, String)> = Vec::new();
        for raw in findings {
            let Some(title) = raw.get("title").and_then(|v| v.as_str()) else {
                continue;
            };
            let remaining = self.limits.max_mentions.saturating_sub(mentions.len());
            if remaining == 0 {
                break;
            }
            for name in classifier::extract_mentions(title, &subject, self.limits.max_mentions) {
                if mentions.len() >= self.limits.max_mentions {
                    break;
                }
                if !mentions.iter().any(|(n, _)| n == &name) {
                    mentions.push((name, title.to_string()));
                }
            }
        }

        let center = (mentions.len() as f64 - 1.0) / 2.0;
        for (i, (name, title)) in mentions.into_iter().enumerate() {
            let id = format!("{agent_id}/mention/{}", classifier::slugify(&name));
            if !self.has_node(&id) {
                let target = Position::new(
                    parent.x + (i as f64 - center) * self.layout.finding_spacing,
                    parent.y + 2.0 * self.layout.finding_offset_y,
                );
                self.insert_node(
                    id.clone(),
                    name.clone(),
                    target,
                    NodeStatus::Idle,
                    NodePayload::Mention(MentionData {
                        name,
                        source_title: Some(title),
                    }),
                );
            }
            self.add_edge(agent_id, &id, Some(MENTION_EDGE_LABEL));
        }
    }

    /// Create the summary node linked from every current agent, or replace the
    /// text of the existing one. Returns true when created.
    pub fn attach_summary(&mut self, result: &str) -> bool {
        if self.update_summary(|data| data.summary = result.to_string()) {
            return false;
        }

        let summary_id = self.summary_id();
        let agents = self.agent_ids();
        let target = Position::new(self.layout.center_x, self.layout.summary_y);
        self.insert_node(
            summary_id.clone(),
            SUMMARY_LABEL.to_string(),
            target,
            NodeStatus::Completed,
            NodePayload::Summary(SummaryData {
                summary: result.to_string(),
                risk_level: "medium".to_string(),
                total_findings: 0,
                tools_completed: agents.len() as u32,
            }),
        );
        for agent in &agents {
            self.add_edge(agent, &summary_id, None);
        }
        self.diff.fit_view = true;
        true
    }

    /// Remove a node and every edge touching it. Absent ids are a no-op.
    pub fn delete_node(&mut self, id: &str) -> bool {
        let Some(index) = self.nodes.iter().position(|n| n.id == id) else {
            return false;
        };
        self.nodes.remove(index);

        let (removed, kept): (Vec<Edge>, Vec<Edge>) =
            std::mem::take(&mut self.edges).into_iter().partition(|e| e.touches(id));
        self.edges = kept;
        for edge in removed {
            self.diff.edges_deleted.push(edge.id);
        }
        self.diff.deleted(id);
        debug!(node = id, "node deleted");
        true
    }

    /// Move a node to an explicit position (user drag).
    pub fn move_node(&mut self, id: &str, position: Position) -> bool {
        let Some(node) = self.node_mut(id) else {
            return false;
        };
        if node.position != position {
            node.position = position;
            self.diff.moved(id);
        }
        true
    }

    /// Record the rendered size of a node for later collision tests.
    pub fn set_measured_size(&mut self, id: &str, size: Size) -> bool {
        match self.node_mut(id) {
            Some(node) => {
                node.measured = Some(size);
                true
            }
            None => false,
        }
    }

    /// Copy positions from a relaid-out node list, matching by id.
    pub fn apply_positions(&mut self, positioned: &[Node]) {
        for placed in positioned {
            self.move_node(&placed.id, placed.position);
        }
    }

    /// Hierarchical reflow of the whole graph.
    pub fn organize(&mut self) {
        let organized = placement::organize_hierarchical(&self.nodes, &self.layout);
        self.apply_positions(&organized);
        self.diff.fit_view = true;
    }
}

fn kind_label(kind: ContactKind) -> &'static str {
    match kind {
        ContactKind::Phone => "phone",
        ContactKind::Email => "email",
        ContactKind::Social => "social",
    }
}
