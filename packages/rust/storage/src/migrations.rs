//! SQL migration definitions for the CaseGraph database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: investigations, nodes, edges",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per screening run
CREATE TABLE IF NOT EXISTS investigations (
    id              TEXT PRIMARY KEY,
    entity_name     TEXT NOT NULL,
    entity_kind     TEXT NOT NULL DEFAULT 'individual',
    status          TEXT NOT NULL DEFAULT 'pending',
    risk_level      TEXT,
    total_findings  INTEGER NOT NULL DEFAULT 0,
    tools_completed INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

-- Canvas nodes; ids are unique within an investigation
CREATE TABLE IF NOT EXISTS nodes (
    id               TEXT NOT NULL,
    investigation_id TEXT NOT NULL REFERENCES investigations(id) ON DELETE CASCADE,
    kind             TEXT NOT NULL,
    label            TEXT NOT NULL,
    position_x       REAL NOT NULL DEFAULT 0,
    position_y       REAL NOT NULL DEFAULT 0,
    status           TEXT NOT NULL DEFAULT 'idle',
    payload_json     TEXT NOT NULL,
    created_at       TEXT NOT NULL,
    PRIMARY KEY (investigation_id, id)
);

CREATE INDEX IF NOT EXISTS idx_nodes_investigation ON nodes(investigation_id);

-- Directed edges between nodes
CREATE TABLE IF NOT EXISTS edges (
    id               TEXT NOT NULL,
    investigation_id TEXT NOT NULL REFERENCES investigations(id) ON DELETE CASCADE,
    source           TEXT NOT NULL,
    target           TEXT NOT NULL,
    animated         INTEGER NOT NULL DEFAULT 1,
    label            TEXT,
    created_at       TEXT NOT NULL,
    PRIMARY KEY (investigation_id, id)
);

CREATE INDEX IF NOT EXISTS idx_edges_investigation ON edges(investigation_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
