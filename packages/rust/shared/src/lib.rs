//! Shared types, error model, and configuration for CaseGraph.
//!
//! This crate is the foundation depended on by all other CaseGraph crates.
//! It provides:
//! - [`CaseGraphError`], the unified error type
//! - Domain types ([`Node`], [`Edge`], [`NodePayload`], [`InvestigationId`])
//! - Configuration ([`AppConfig`], [`EngineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, EngineConfig, FindingsConfig, LayoutConfig, SyncConfig,
    ToolConfigEntry, config_dir, config_file_path, expand_home, init_config, load_config,
    load_config_from, validate_config,
};
pub use error::{CaseGraphError, Result};
pub use types::{
    AgentData, ContactData, ContactKind, ContactRisk, Edge, EntityData, EntityKind, FindingData,
    FindingType, InvestigationId, InvestigationRecord, MentionData, Node, NodeKind, NodePayload,
    NodeStatus, Position, RawFinding, ResultKind, Severity, Size, StatusInfo, StatusKind,
    SummaryData,
};
