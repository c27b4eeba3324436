//! Turso Embedded / libSQL storage layer for investigation graphs.
//!
//! The [`Storage`] struct wraps a libSQL database holding investigation
//! headers plus the node and edge rows of each canvas. Rows are keyed by
//! investigation id; the bulk loader ([`Storage::load_graph`]) rebuilds the
//! in-memory collections when a view is resumed.
//!
//! **Access rules:**
//! - replay/organize: read-write via [`Storage::open`]
//! - show/list: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use casegraph_shared::{
    CaseGraphError, Edge, EntityKind, InvestigationId, InvestigationRecord, Node, NodePayload,
    NodeStatus, Position, Result,
};
use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CaseGraphError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| CaseGraphError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| CaseGraphError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| CaseGraphError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| CaseGraphError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        CaseGraphError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(CaseGraphError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Investigation operations
    // -----------------------------------------------------------------------

    /// Insert an investigation header, or refresh its subject on conflict.
    pub async fn upsert_investigation(
        &self,
        id: &InvestigationId,
        entity_name: &str,
        entity_kind: EntityKind,
    ) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO investigations (id, entity_name, entity_kind, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 'running', ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                   entity_name = excluded.entity_name,
                   entity_kind = excluded.entity_kind,
                   updated_at = excluded.updated_at",
                params![
                    id.as_str(),
                    entity_name,
                    entity_kind.as_str(),
                    now.as_str(),
                    now.as_str()
                ],
            )
            .await
            .map_err(|e| CaseGraphError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Record the outcome of an investigation.
    pub async fn update_investigation_status(
        &self,
        id: &InvestigationId,
        status: &str,
        risk_level: Option<&str>,
        total_findings: u32,
        tools_completed: u32,
    ) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE investigations
                 SET status = ?1, risk_level = ?2, total_findings = ?3, tools_completed = ?4, updated_at = ?5
                 WHERE id = ?6",
                params![
                    status,
                    risk_level,
                    total_findings,
                    tools_completed,
                    now.as_str(),
                    id.as_str()
                ],
            )
            .await
            .map_err(|e| CaseGraphError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Get an investigation header by id.
    pub async fn get_investigation(
        &self,
        id: &InvestigationId,
    ) -> Result<Option<InvestigationRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, entity_name, entity_kind, status, risk_level, total_findings,
                        tools_completed, created_at, updated_at
                 FROM investigations WHERE id = ?1",
                params![id.as_str()],
            )
            .await
            .map_err(|e| CaseGraphError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_investigation(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(CaseGraphError::Storage(e.to_string())),
        }
    }

    /// List all investigations, most recently updated first.
    pub async fn list_investigations(&self) -> Result<Vec<InvestigationRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, entity_name, entity_kind, status, risk_level, total_findings,
                        tools_completed, created_at, updated_at
                 FROM investigations ORDER BY updated_at DESC",
                params![],
            )
            .await
            .map_err(|e| CaseGraphError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_investigation(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Node operations
    // -----------------------------------------------------------------------

    /// Insert a node (or overwrite the row with the same id).
    pub async fn upsert_node(&self, investigation: &InvestigationId, node: &Node) -> Result<()> {
        self.check_writable()?;
        let payload_json = serde_json::to_string(&node.payload)
            .map_err(|e| CaseGraphError::Storage(format!("encode payload: {e}")))?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO nodes (id, investigation_id, kind, label, position_x, position_y, status, payload_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(investigation_id, id) DO UPDATE SET
                   kind = excluded.kind,
                   label = excluded.label,
                   position_x = excluded.position_x,
                   position_y = excluded.position_y,
                   status = excluded.status,
                   payload_json = excluded.payload_json",
                params![
                    node.id.as_str(),
                    investigation.as_str(),
                    node.kind().as_str(),
                    node.label.as_str(),
                    node.position.x,
                    node.position.y,
                    node.status.as_str(),
                    payload_json,
                    now.as_str()
                ],
            )
            .await
            .map_err(|e| CaseGraphError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Update a node's label, status and payload, leaving its position alone.
    pub async fn update_node_data(
        &self,
        investigation: &InvestigationId,
        node: &Node,
    ) -> Result<()> {
        self.check_writable()?;
        let payload_json = serde_json::to_string(&node.payload)
            .map_err(|e| CaseGraphError::Storage(format!("encode payload: {e}")))?;
        self.conn
            .execute(
                "UPDATE nodes SET label = ?1, status = ?2, payload_json = ?3
                 WHERE investigation_id = ?4 AND id = ?5",
                params![
                    node.label.as_str(),
                    node.status.as_str(),
                    payload_json,
                    investigation.as_str(),
                    node.id.as_str()
                ],
            )
            .await
            .map_err(|e| CaseGraphError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Move a node.
    pub async fn update_node_position(
        &self,
        investigation: &InvestigationId,
        node_id: &str,
        position: Position,
    ) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "UPDATE nodes SET position_x = ?1, position_y = ?2
                 WHERE investigation_id = ?3 AND id = ?4",
                params![position.x, position.y, investigation.as_str(), node_id],
            )
            .await
            .map_err(|e| CaseGraphError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Delete a node row. Missing rows are not an error.
    pub async fn delete_node(&self, investigation: &InvestigationId, node_id: &str) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "DELETE FROM nodes WHERE investigation_id = ?1 AND id = ?2",
                params![investigation.as_str(), node_id],
            )
            .await
            .map_err(|e| CaseGraphError::Storage(e.to_string()))?;
        Ok(())
    }

    /// List the nodes of an investigation in insertion order.
    pub async fn list_nodes(&self, investigation: &InvestigationId) -> Result<Vec<Node>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, label, position_x, position_y, status, payload_json
                 FROM nodes WHERE investigation_id = ?1 ORDER BY rowid",
                params![investigation.as_str()],
            )
            .await
            .map_err(|e| CaseGraphError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_node(&row) {
                Ok(node) => results.push(node),
                // A row written by a newer payload schema should not block the load.
                Err(e) => tracing::warn!(%investigation, error = %e, "skipping unreadable node row"),
            }
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Edge operations
    // -----------------------------------------------------------------------

    /// Insert an edge. Re-inserting the same id is a no-op.
    pub async fn insert_edge(&self, investigation: &InvestigationId, edge: &Edge) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO edges (id, investigation_id, source, target, animated, label, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(investigation_id, id) DO NOTHING",
                params![
                    edge.id.as_str(),
                    investigation.as_str(),
                    edge.source.as_str(),
                    edge.target.as_str(),
                    i64::from(edge.animated),
                    edge.label.as_deref(),
                    now.as_str()
                ],
            )
            .await
            .map_err(|e| CaseGraphError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Delete an edge row. Missing rows are not an error.
    pub async fn delete_edge(&self, investigation: &InvestigationId, edge_id: &str) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "DELETE FROM edges WHERE investigation_id = ?1 AND id = ?2",
                params![investigation.as_str(), edge_id],
            )
            .await
            .map_err(|e| CaseGraphError::Storage(e.to_string()))?;
        Ok(())
    }

    /// List the edges of an investigation in insertion order.
    pub async fn list_edges(&self, investigation: &InvestigationId) -> Result<Vec<Edge>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, source, target, animated, label
                 FROM edges WHERE investigation_id = ?1 ORDER BY rowid",
                params![investigation.as_str()],
            )
            .await
            .map_err(|e| CaseGraphError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(Edge {
                id: row
                    .get::<String>(0)
                    .map_err(|e| CaseGraphError::Storage(e.to_string()))?,
                source: row
                    .get::<String>(1)
                    .map_err(|e| CaseGraphError::Storage(e.to_string()))?,
                target: row
                    .get::<String>(2)
                    .map_err(|e| CaseGraphError::Storage(e.to_string()))?,
                animated: row.get::<i64>(3).map(|v| v != 0).unwrap_or(true),
                label: row.get::<String>(4).ok(),
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Bulk loader
    // -----------------------------------------------------------------------

    /// Load every persisted node and edge of an investigation.
    pub async fn load_graph(&self, investigation: &InvestigationId) -> Result<(Vec<Node>, Vec<Edge>)> {
        let nodes = self.list_nodes(investigation).await?;
        let edges = self.list_edges(investigation).await?;
        tracing::debug!(
            %investigation,
            nodes = nodes.len(),
            edges = edges.len(),
            "loaded persisted graph"
        );
        Ok((nodes, edges))
    }
}

/// Convert a database row to a [`Node`].
fn row_to_node(row: &libsql::Row) -> Result<Node> {
    let payload_json: String = row
        .get(5)
        .map_err(|e| CaseGraphError::Storage(e.to_string()))?;
    let payload: NodePayload = serde_json::from_str(&payload_json)
        .map_err(|e| CaseGraphError::Storage(format!("invalid payload: {e}")))?;

    Ok(Node {
        id: row
            .get::<String>(0)
            .map_err(|e| CaseGraphError::Storage(e.to_string()))?,
        label: row
            .get::<String>(1)
            .map_err(|e| CaseGraphError::Storage(e.to_string()))?,
        position: Position::new(
            row.get::<f64>(2).unwrap_or(0.0),
            row.get::<f64>(3).unwrap_or(0.0),
        ),
        measured: None,
        status: row
            .get::<String>(4)
            .map(|s| NodeStatus::parse_lossy(&s))
            .unwrap_or_default(),
        payload,
    })
}

/// Convert a database row to an [`InvestigationRecord`].
fn row_to_investigation(row: &libsql::Row) -> Result<InvestigationRecord> {
    Ok(InvestigationRecord {
        id: InvestigationId(
            row.get::<String>(0)
                .map_err(|e| CaseGraphError::Storage(e.to_string()))?,
        ),
        entity_name: row
            .get::<String>(1)
            .map_err(|e| CaseGraphError::Storage(e.to_string()))?,
        entity_kind: row
            .get::<String>(2)
            .map(|s| EntityKind::parse_lossy(&s))
            .unwrap_or_default(),
        status: row
            .get::<String>(3)
            .map_err(|e| CaseGraphError::Storage(e.to_string()))?,
        risk_level: row.get::<String>(4).ok(),
        total_findings: row.get::<u32>(5).unwrap_or(0),
        tools_completed: row.get::<u32>(6).unwrap_or(0),
        created_at: parse_timestamp(row, 7)?,
        updated_at: parse_timestamp(row, 8)?,
    })
}

fn parse_timestamp(row: &libsql::Row, idx: i32) -> Result<DateTime<Utc>> {
    let s: String = row
        .get(idx)
        .map_err(|e| CaseGraphError::Storage(e.to_string()))?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CaseGraphError::Storage(format!("invalid date: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use casegraph_shared::{AgentData, EntityData, SummaryData};
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("cg_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn entity_node(inv: &InvestigationId) -> Node {
        Node {
            id: inv.root_node_id(),
            label: "Acme Holdings Ltd".into(),
            position: Position::new(500.0, 80.0),
            measured: None,
            status: NodeStatus::Running,
            payload: NodePayload::Entity(EntityData {
                entity_kind: EntityKind::Company,
                ..Default::default()
            }),
        }
    }

    fn agent_node(id: &str) -> Node {
        Node {
            id: id.into(),
            label: "Sanctions Check".into(),
            position: Position::new(220.0, 260.0),
            measured: None,
            status: NodeStatus::Running,
            payload: NodePayload::Agent(AgentData {
                tool: Some("sanctions".into()),
                task: Some("Running Sanctions Check...".into()),
                ..Default::default()
            }),
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        let version = storage.get_schema_version().await;
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("cg_test_{}.db", Uuid::now_v7()));
        let _s1 = Storage::open(&tmp).await.expect("first open");
        drop(_s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn investigation_lifecycle() {
        let storage = test_storage().await;
        let inv = InvestigationId::generate();

        storage
            .upsert_investigation(&inv, "Acme Holdings Ltd", EntityKind::Company)
            .await
            .expect("insert investigation");
        // A duplicate start refreshes rather than failing.
        storage
            .upsert_investigation(&inv, "Acme Holdings Ltd", EntityKind::Company)
            .await
            .expect("upsert investigation");

        storage
            .update_investigation_status(&inv, "completed", Some("high"), 4, 3)
            .await
            .expect("update status");

        let record = storage
            .get_investigation(&inv)
            .await
            .expect("get investigation")
            .expect("present");
        assert_eq!(record.entity_name, "Acme Holdings Ltd");
        assert_eq!(record.entity_kind, EntityKind::Company);
        assert_eq!(record.status, "completed");
        assert_eq!(record.risk_level.as_deref(), Some("high"));
        assert_eq!(record.total_findings, 4);
        assert_eq!(record.tools_completed, 3);

        let all = storage.list_investigations().await.expect("list");
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn node_and_edge_roundtrip() {
        let storage = test_storage().await;
        let inv = InvestigationId::generate();
        storage
            .upsert_investigation(&inv, "Acme Holdings Ltd", EntityKind::Company)
            .await
            .unwrap();

        let root = entity_node(&inv);
        let agent = agent_node("sanctions-1");
        storage.upsert_node(&inv, &root).await.expect("insert root");
        storage.upsert_node(&inv, &agent).await.expect("insert agent");

        let edge = Edge::new(&root.id, &agent.id, None);
        storage.insert_edge(&inv, &edge).await.expect("insert edge");
        storage.insert_edge(&inv, &edge).await.expect("duplicate edge is a no-op");

        let mut updated = agent.clone();
        updated.status = NodeStatus::Completed;
        updated.position = Position::new(9999.0, 9999.0);
        storage
            .update_node_data(&inv, &updated)
            .await
            .expect("update data");
        storage
            .update_node_position(&inv, &agent.id, Position::new(240.0, 280.0))
            .await
            .expect("update position");

        let (nodes, edges) = storage.load_graph(&inv).await.expect("load");
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].id, root.id, "insertion order preserved");
        assert_eq!(nodes[1].status, NodeStatus::Completed);
        // update_node_data must not move the node
        assert_eq!(nodes[1].position, Position::new(240.0, 280.0));
        assert_eq!(nodes[1].payload, agent.payload);
        assert_eq!(edges, vec![edge.clone()]);

        storage.delete_edge(&inv, &edge.id).await.expect("delete edge");
        storage.delete_node(&inv, &agent.id).await.expect("delete node");
        storage
            .delete_node(&inv, &agent.id)
            .await
            .expect("second delete is a no-op");

        let (nodes, edges) = storage.load_graph(&inv).await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert!(edges.is_empty());
    }

    #[tokio::test]
    async fn investigations_are_isolated() {
        let storage = test_storage().await;
        let a = InvestigationId::from("inv-a");
        let b = InvestigationId::from("inv-b");
        storage
            .upsert_investigation(&a, "Acme Holdings Ltd", EntityKind::Company)
            .await
            .unwrap();
        storage
            .upsert_investigation(&b, "Jane Doe", EntityKind::Individual)
            .await
            .unwrap();

        // Same node id in two investigations must not collide.
        let summary = |inv: &InvestigationId| Node {
            id: "shared-id".into(),
            label: "Analysis Summary".into(),
            position: Position::default(),
            measured: None,
            status: NodeStatus::Completed,
            payload: NodePayload::Summary(SummaryData {
                summary: format!("summary for {inv}"),
                ..Default::default()
            }),
        };
        storage.upsert_node(&a, &summary(&a)).await.unwrap();
        storage.upsert_node(&b, &summary(&b)).await.unwrap();

        let nodes_a = storage.list_nodes(&a).await.unwrap();
        let nodes_b = storage.list_nodes(&b).await.unwrap();
        assert_eq!(nodes_a.len(), 1);
        assert_eq!(nodes_b.len(), 1);
        match (&nodes_a[0].payload, &nodes_b[0].payload) {
            (NodePayload::Summary(sa), NodePayload::Summary(sb)) => {
                assert_eq!(sa.summary, "summary for inv-a");
                assert_eq!(sb.summary, "summary for inv-b");
            }
            other => panic!("unexpected payloads {other:?}"),
        }

        // Deleting in one investigation leaves the other untouched.
        storage.delete_node(&a, "shared-id").await.unwrap();
        assert!(storage.list_nodes(&a).await.unwrap().is_empty());
        assert_eq!(storage.list_nodes(&b).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("cg_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        let inv = InvestigationId::from("inv-1");
        rw.upsert_investigation(&inv, "Jane Doe", EntityKind::Individual)
            .await
            .unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        let result = ro.upsert_node(&inv, &agent_node("pep_check-1")).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }
}
