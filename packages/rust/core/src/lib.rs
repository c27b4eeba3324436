//! Graph engine and domain logic for CaseGraph.
//!
//! This crate turns an investigation's event stream into a positioned node
//! graph: classification of tools and findings, collision-free placement,
//! the incremental [`Engine`], and persistence sync through [`GraphStore`].

pub mod classifier;
pub mod engine;
pub mod events;
pub mod graph;
pub mod pipeline;
pub mod placement;
pub mod sync;

pub use classifier::{Preset, ToolRegistry, ToolSpec};
pub use engine::{ConnectionState, Engine};
pub use events::{StreamEvent, parse_event};
pub use graph::{AgentOutcome, GraphBuilder, GraphDiff};
pub use pipeline::{
    ProgressReporter, ReplayConfig, ReplayResult, SilentProgress, organize_persisted,
    replay_stream,
};
pub use sync::{GraphStore, SyncHandle, SyncOp};
