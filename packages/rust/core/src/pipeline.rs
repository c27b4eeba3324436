//! End-to-end workflows: replay a recorded stream, reflow a persisted graph.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use casegraph_shared::{
    CaseGraphError, Edge, EngineConfig, InvestigationId, Node, Result, StatusInfo,
};
use casegraph_storage::Storage;

use crate::engine::Engine;
use crate::events::{self, StreamEvent};
use crate::sync::SyncHandle;

/// Configuration for [`replay_stream`].
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// NDJSON (or SSE `data:`) file of stream events.
    pub input: PathBuf,
    /// Investigation to replay. Defaults to the first `project_id` in the file.
    pub investigation: Option<InvestigationId>,
    /// Graph database. `None` replays in memory only.
    pub db_path: Option<PathBuf>,
    /// Run a hierarchical reflow after the last event.
    pub organize: bool,
    pub engine: EngineConfig,
}

/// Result of a replay.
#[derive(Debug)]
pub struct ReplayResult {
    pub investigation: InvestigationId,
    /// Lines parsed into events.
    pub events: usize,
    /// Events that changed the graph.
    pub applied: usize,
    /// Lines that failed to parse.
    pub skipped: usize,
    pub interrupted: bool,
    /// Reason the stream was interrupted.
    pub stream_error: Option<String>,
    pub status: Option<StatusInfo>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub elapsed: Duration,
}

/// Progress callback for reporting replay status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each event is applied.
    fn event_applied(&self, kind: &str, current: usize, total: usize);
    /// Called when the replay completes.
    fn done(&self, result: &ReplayResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn event_applied(&self, _kind: &str, _current: usize, _total: usize) {}
    fn done(&self, _result: &ReplayResult) {}
}

/// Parse a stream transcript. Blank and comment lines are skipped; malformed
/// lines are logged and counted.
pub fn parse_stream(content: &str) -> (Vec<StreamEvent>, usize) {
    let mut parsed = Vec::new();
    let mut skipped = 0;
    for (lineno, line) in content.lines().enumerate() {
        if events::is_blank_line(line) {
            continue;
        }
        match events::parse_event(line) {
            Ok(event) => parsed.push(event),
            Err(e) => {
                warn!(line = lineno + 1, error = %e, "malformed event skipped");
                skipped += 1;
            }
        }
    }
    (parsed, skipped)
}

/// Open the graph database and build an engine for `investigation`, resuming
/// any persisted graph and wiring writes back through a sync worker.
async fn open_engine(
    db_path: Option<&Path>,
    investigation: &InvestigationId,
    config: &EngineConfig,
) -> Result<Engine> {
    let Some(db_path) = db_path else {
        return Engine::new(investigation.clone(), config.clone());
    };

    let storage = Arc::new(Storage::open(db_path).await?);
    let (nodes, edges) = storage.load_graph(investigation).await?;
    let mut engine = if nodes.is_empty() {
        Engine::new(investigation.clone(), config.clone())?
    } else {
        Engine::resume(investigation.clone(), config.clone(), nodes, edges)?
    };

    if config.sync.enabled {
        engine.attach_sync(SyncHandle::spawn(
            storage,
            investigation.clone(),
            Duration::from_millis(config.sync.debounce_ms),
        ));
    } else {
        debug!("sync disabled, graph kept in memory");
    }
    Ok(engine)
}

/// Feed a recorded event stream through the engine.
///
/// 1. Read and parse the transcript
/// 2. Resolve the investigation and open (or resume) its graph
/// 3. Apply events in order
/// 4. Optionally reflow, then flush persistence
#[instrument(skip_all, fields(input = %config.input.display()))]
pub async fn replay_stream(
    config: &ReplayConfig,
    progress: &dyn ProgressReporter,
) -> Result<ReplayResult> {
    let start = Instant::now();

    progress.phase("Reading stream");
    let content = tokio::fs::read_to_string(&config.input)
        .await
        .map_err(|e| CaseGraphError::io(&config.input, e))?;
    let (stream, skipped) = parse_stream(&content);

    let investigation = match &config.investigation {
        Some(id) => id.clone(),
        None => stream
            .iter()
            .find_map(|e| e.project_id())
            .map(InvestigationId::from)
            .ok_or_else(|| {
                CaseGraphError::validation("stream has no project_id; pass --investigation")
            })?,
    };
    info!(%investigation, events = stream.len(), skipped, "replaying stream");

    progress.phase("Opening graph");
    let mut engine = open_engine(config.db_path.as_deref(), &investigation, &config.engine).await?;

    progress.phase("Applying events");
    let total = stream.len();
    let mut applied = 0;
    for (i, event) in stream.iter().enumerate() {
        let diff = engine.apply(event);
        if !diff.is_empty() {
            applied += 1;
        }
        progress.event_applied(event.kind(), i + 1, total);
    }

    if config.organize {
        progress.phase("Organizing layout");
        engine.organize();
    }

    progress.phase("Flushing");
    engine.close().await;

    let result = ReplayResult {
        investigation,
        events: total,
        applied,
        skipped,
        interrupted: engine.is_interrupted(),
        stream_error: engine.stream_error().map(ToString::to_string),
        status: engine.status().cloned(),
        nodes: engine.graph().nodes().to_vec(),
        edges: engine.graph().edges().to_vec(),
        elapsed: start.elapsed(),
    };

    info!(
        investigation = %result.investigation,
        nodes = result.nodes.len(),
        edges = result.edges.len(),
        applied,
        elapsed_ms = result.elapsed.as_millis() as u64,
        "replay complete"
    );
    progress.done(&result);
    Ok(result)
}

/// Reflow a persisted graph and write the new positions back. Returns the
/// number of nodes that moved.
#[instrument(skip_all, fields(investigation = %investigation))]
pub async fn organize_persisted(
    db_path: &Path,
    investigation: &InvestigationId,
    config: &EngineConfig,
) -> Result<usize> {
    let mut engine = open_engine(Some(db_path), investigation, config).await?;
    if engine.graph().nodes().is_empty() {
        return Err(CaseGraphError::validation(format!(
            "investigation {investigation} has no persisted nodes"
        )));
    }
    let diff = engine.organize();
    engine.close().await;
    info!(moved = diff.moved.len(), "layout reflowed");
    Ok(diff.moved.len())
}
