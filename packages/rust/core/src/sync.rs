//! Best-effort persistence of graph mutations.
//!
//! Each investigation gets one background task fed through an unbounded
//! channel. Creates, updates and deletes are written in arrival order; node
//! positions are debounced per node so a burst of moves becomes one write.
//! Store failures are logged and dropped, never retried.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};

use casegraph_shared::{Edge, EntityKind, InvestigationId, Node, Position, Result};
use casegraph_storage::Storage;

/// Persistence collaborator for investigation graphs.
pub trait GraphStore: Send + Sync + 'static {
    fn create_investigation(
        &self,
        investigation: &InvestigationId,
        entity_name: &str,
        entity_kind: EntityKind,
    ) -> impl Future<Output = Result<()>> + Send;

    fn complete_investigation(
        &self,
        investigation: &InvestigationId,
        risk_level: Option<&str>,
        total_findings: u32,
        tools_completed: u32,
    ) -> impl Future<Output = Result<()>> + Send;

    fn create_node(
        &self,
        investigation: &InvestigationId,
        node: &Node,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Update label, status and payload. Position is left alone.
    fn update_node(
        &self,
        investigation: &InvestigationId,
        node: &Node,
    ) -> impl Future<Output = Result<()>> + Send;

    fn update_position(
        &self,
        investigation: &InvestigationId,
        node_id: &str,
        position: Position,
    ) -> impl Future<Output = Result<()>> + Send;

    fn delete_node(
        &self,
        investigation: &InvestigationId,
        node_id: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    fn create_edge(
        &self,
        investigation: &InvestigationId,
        edge: &Edge,
    ) -> impl Future<Output = Result<()>> + Send;

    fn delete_edge(
        &self,
        investigation: &InvestigationId,
        edge_id: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Bulk loader used when resuming a view.
    fn load_graph(
        &self,
        investigation: &InvestigationId,
    ) -> impl Future<Output = Result<(Vec<Node>, Vec<Edge>)>> + Send;
}

impl GraphStore for Storage {
    async fn create_investigation(
        &self,
        investigation: &InvestigationId,
        entity_name: &str,
        entity_kind: EntityKind,
    ) -> Result<()> {
        self.upsert_investigation(investigation, entity_name, entity_kind)
            .await
    }

    async fn complete_investigation(
        &self,
        investigation: &InvestigationId,
        risk_level: Option<&str>,
        total_findings: u32,
        tools_completed: u32,
    ) -> Result<()> {
        self.update_investigation_status(
            investigation,
            "completed",
            risk_level,
            total_findings,
            tools_completed,
        )
        .await
    }

    async fn create_node(&self, investigation: &InvestigationId, node: &Node) -> Result<()> {
        self.upsert_node(investigation, node).await
    }

    async fn update_node(&self, investigation: &InvestigationId, node: &Node) -> Result<()> {
        self.update_node_data(investigation, node).await
    }

    async fn update_position(
        &self,
        investigation: &InvestigationId,
        node_id: &str,
        position: Position,
    ) -> Result<()> {
        self.update_node_position(investigation, node_id, position)
            .await
    }

    async fn delete_node(&self, investigation: &InvestigationId, node_id: &str) -> Result<()> {
        Storage::delete_node(self, investigation, node_id).await
    }

    async fn create_edge(&self, investigation: &InvestigationId, edge: &Edge) -> Result<()> {
        self.insert_edge(investigation, edge).await
    }

    async fn delete_edge(&self, investigation: &InvestigationId, edge_id: &str) -> Result<()> {
        Storage::delete_edge(self, investigation, edge_id).await
    }

    async fn load_graph(&self, investigation: &InvestigationId) -> Result<(Vec<Node>, Vec<Edge>)> {
        Storage::load_graph(self, investigation).await
    }
}

// ---------------------------------------------------------------------------
// Sync worker
// ---------------------------------------------------------------------------

/// One persistence write.
#[derive(Debug, Clone)]
pub enum SyncOp {
    CreateInvestigation {
        entity_name: String,
        entity_kind: EntityKind,
    },
    CompleteInvestigation {
        risk_level: Option<String>,
        total_findings: u32,
        tools_completed: u32,
    },
    CreateNode(Node),
    UpdateNode(Node),
    /// Debounced per node.
    MoveNode {
        node_id: String,
        position: Position,
    },
    DeleteNode(String),
    CreateEdge(Edge),
    DeleteEdge(String),
}

enum Command {
    Op(SyncOp),
    Flush(oneshot::Sender<()>),
}

/// Sending half of an investigation's sync worker.
pub struct SyncHandle {
    tx: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn<S: GraphStore>(
        store: Arc<S>,
        investigation: InvestigationId,
        debounce: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_worker(store, investigation, debounce, rx));
        Self { tx, task }
    }

    /// Queue a write. Never blocks; a stopped worker drops the op.
    pub fn send(&self, op: SyncOp) {
        if self.tx.send(Command::Op(op)).is_err() {
            warn!("sync worker stopped, write dropped");
        }
    }

    /// Write every pending position now and wait until the queue ahead of
    /// this call has drained.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Flush pending positions and stop the worker.
    pub async fn close(self) {
        drop(self.tx);
        if let Err(e) = self.task.await {
            warn!(error = %e, "sync worker ended abnormally");
        }
    }
}

async fn run_worker<S: GraphStore>(
    store: Arc<S>,
    investigation: InvestigationId,
    debounce: Duration,
    mut rx: mpsc::UnboundedReceiver<Command>,
) {
    let mut pending: HashMap<String, (Position, Instant)> = HashMap::new();

    loop {
        let next_due = pending.values().map(|(_, due)| *due).min();

        tokio::select! {
            command = rx.recv() => match command {
                Some(Command::Op(SyncOp::MoveNode { node_id, position })) => {
                    pending.insert(node_id, (position, Instant::now() + debounce));
                }
                Some(Command::Op(op)) => {
                    if let SyncOp::DeleteNode(id) = &op {
                        pending.remove(id);
                    }
                    write(store.as_ref(), &investigation, op).await;
                }
                Some(Command::Flush(done)) => {
                    flush_positions(store.as_ref(), &investigation, &mut pending, None).await;
                    let _ = done.send(());
                }
                None => {
                    flush_positions(store.as_ref(), &investigation, &mut pending, None).await;
                    break;
                }
            },
            _ = sleep_until(next_due.unwrap_or_else(Instant::now)), if next_due.is_some() => {
                flush_positions(store.as_ref(), &investigation, &mut pending, Some(Instant::now())).await;
            }
        }
    }
    debug!(%investigation, "sync worker stopped");
}

/// Write pending positions that are due (all of them when `now` is `None`).
async fn flush_positions<S: GraphStore>(
    store: &S,
    investigation: &InvestigationId,
    pending: &mut HashMap<String, (Position, Instant)>,
    now: Option<Instant>,
) {
    let due: Vec<String> = pending
        .iter()
        .filter(|(_, (_, at))| now.is_none_or(|now| *at <= now))
        .map(|(id, _)| id.clone())
        .collect();

    for node_id in due {
        if let Some((position, _)) = pending.remove(&node_id) {
            if let Err(e) = store.update_position(investigation, &node_id, position).await {
                warn!(%investigation, node = %node_id, error = %e, "position sync failed");
            }
        }
    }
}

async fn write<S: GraphStore>(store: &S, investigation: &InvestigationId, op: SyncOp) {
    let result = match &op {
        SyncOp::CreateInvestigation {
            entity_name,
            entity_kind,
        } => {
            store
                .create_investigation(investigation, entity_name, *entity_kind)
                .await
        }
        SyncOp::CompleteInvestigation {
            risk_level,
            total_findings,
            tools_completed,
        } => {
            store
                .complete_investigation(
                    investigation,
                    risk_level.as_deref(),
                    *total_findings,
                    *tools_completed,
                )
                .await
        }
        SyncOp::CreateNode(node) => store.create_node(investigation, node).await,
        SyncOp::UpdateNode(node) => store.update_node(investigation, node).await,
        SyncOp::MoveNode { node_id, position } => {
            store.update_position(investigation, node_id, *position).await
        }
        SyncOp::DeleteNode(id) => store.delete_node(investigation, id).await,
        SyncOp::CreateEdge(edge) => store.create_edge(investigation, edge).await,
        SyncOp::DeleteEdge(id) => store.delete_edge(investigation, id).await,
    };

    if let Err(e) = result {
        warn!(%investigation, op = op_name(&op), error = %e, "graph sync failed");
    }
}

fn op_name(op: &SyncOp) -> &'static str {
    match op {
        SyncOp::CreateInvestigation { .. } => "create_investigation",
        SyncOp::CompleteInvestigation { .. } => "complete_investigation",
        SyncOp::CreateNode(_) => "create_node",
        SyncOp::UpdateNode(_) => "update_node",
        SyncOp::MoveNode { .. } => "move_node",
        SyncOp::DeleteNode(_) => "delete_node",
        SyncOp::CreateEdge(_) => "create_edge",
        SyncOp::DeleteEdge(_) => "delete_edge",
    }
}
