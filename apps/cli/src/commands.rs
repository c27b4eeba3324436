//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use casegraph_core::pipeline::{ProgressReporter, ReplayConfig, ReplayResult};
use casegraph_core::{Preset, ToolRegistry};
use casegraph_shared::{
    AppConfig, EngineConfig, Edge, InvestigationId, Node, expand_home, init_config, load_config,
    validate_config,
};
use casegraph_storage::Storage;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// CaseGraph: live investigation graphs from agent event streams.
#[derive(Parser)]
#[command(
    name = "casegraph",
    version,
    about = "Build and inspect investigation graphs from agent event streams.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Replay a recorded NDJSON event stream through the graph engine.
    Replay {
        /// Stream file (one event per line; SSE `data:` lines accepted).
        file: PathBuf,

        /// Investigation to replay (defaults to the first project_id in the file).
        #[arg(short, long)]
        investigation: Option<String>,

        /// Graph database path (defaults to the configured db_path).
        #[arg(long)]
        db: Option<String>,

        /// Keep the graph in memory; write nothing to the database.
        #[arg(long)]
        no_persist: bool,

        /// Run a hierarchical reflow after the last event.
        #[arg(long)]
        organize: bool,

        /// Print the resulting graph as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print a persisted investigation graph.
    Show {
        /// Investigation id.
        #[arg(short, long)]
        investigation: String,

        /// Graph database path.
        #[arg(long)]
        db: Option<String>,

        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Reflow a persisted graph and write the new positions back.
    Organize {
        /// Investigation id.
        #[arg(short, long)]
        investigation: String,

        /// Graph database path.
        #[arg(long)]
        db: Option<String>,
    },

    /// List persisted investigations.
    List {
        /// Graph database path.
        #[arg(long)]
        db: Option<String>,
    },

    /// Print the tool registry.
    Tools {
        /// Only list the tools run by this preset.
        #[arg(long)]
        preset: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "casegraph=info",
        1 => "casegraph=debug",
        _ => "casegraph=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Replay {
            file,
            investigation,
            db,
            no_persist,
            organize,
            json,
        } => {
            cmd_replay(
                file,
                investigation.as_deref(),
                db.as_deref(),
                no_persist,
                organize,
                json,
            )
            .await
        }
        Command::Show {
            investigation,
            db,
            json,
        } => cmd_show(&investigation, db.as_deref(), json).await,
        Command::Organize { investigation, db } => {
            cmd_organize(&investigation, db.as_deref()).await
        }
        Command::List { db } => cmd_list(db.as_deref()).await,
        Command::Tools { preset } => cmd_tools(preset.as_deref()),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

/// Load and validate the config file.
fn resolved_config() -> Result<AppConfig> {
    let config = load_config()?;
    validate_config(&config)?;
    Ok(config)
}

/// `--db` wins over the configured path.
fn resolve_db_path(config: &AppConfig, db: Option<&str>) -> PathBuf {
    expand_home(db.unwrap_or(&config.defaults.db_path))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_replay(
    file: PathBuf,
    investigation: Option<&str>,
    db: Option<&str>,
    no_persist: bool,
    organize: bool,
    json: bool,
) -> Result<()> {
    let config = resolved_config()?;
    if !file.exists() {
        return Err(eyre!("stream file '{}' does not exist", file.display()));
    }

    let db_path = (!no_persist).then(|| resolve_db_path(&config, db));
    let replay_config = ReplayConfig {
        input: file,
        investigation: investigation.map(InvestigationId::from),
        db_path,
        organize,
        engine: EngineConfig::from(&config),
    };

    info!(
        input = %replay_config.input.display(),
        persist = !no_persist,
        organize,
        "replaying stream"
    );

    let reporter = CliProgress::new(!json);
    let result = casegraph_core::pipeline::replay_stream(&replay_config, &reporter).await?;

    if json {
        print_graph_json(&result.investigation, &result.nodes, &result.edges)?;
        return Ok(());
    }

    println!();
    println!("  Replay complete");
    println!("  Investigation: {}", result.investigation);
    println!("  Events:        {} ({} changed the graph)", result.events, result.applied);
    if result.skipped > 0 {
        println!("  Skipped:       {} malformed line(s)", result.skipped);
    }
    println!("  Nodes:         {}", result.nodes.len());
    println!("  Edges:         {}", result.edges.len());
    if let Some(status) = &result.status {
        println!("  Last status:   {}", status.message);
    }
    if let Some(error) = &result.stream_error {
        println!("  Interrupted:   {error}; later events were dropped.");
    }
    if let Some(db) = &replay_config.db_path {
        println!("  Database:      {}", db.display());
    }
    println!("  Time:          {:.1}s", result.elapsed.as_secs_f64());
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new(visible: bool) -> Self {
        if !visible {
            return Self {
                spinner: ProgressBar::hidden(),
            };
        }
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn event_applied(&self, kind: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Applying [{current}/{total}] {kind}"));
    }

    fn done(&self, _result: &ReplayResult) {
        self.spinner.finish_and_clear();
    }
}

async fn cmd_show(investigation: &str, db: Option<&str>, json: bool) -> Result<()> {
    let config = resolved_config()?;
    let db_path = resolve_db_path(&config, db);
    if !db_path.exists() {
        return Err(eyre!("no graph database at '{}'", db_path.display()));
    }

    let storage = Storage::open_readonly(&db_path).await?;
    let id = InvestigationId::from(investigation);
    let record = storage
        .get_investigation(&id)
        .await?
        .ok_or_else(|| eyre!("investigation '{investigation}' not found"))?;
    let (nodes, edges) = storage.load_graph(&id).await?;

    if json {
        return print_graph_json(&id, &nodes, &edges);
    }

    println!();
    println!("  {} ({})", record.entity_name, record.entity_kind.as_str());
    println!("  Status:   {}", record.status);
    if let Some(risk) = &record.risk_level {
        println!(
            "  Risk:     {risk} ({} findings, {} tools)",
            record.total_findings, record.tools_completed
        );
    }
    println!();
    for node in &nodes {
        println!(
            "  {:<10} {:<11} {:>7.0},{:<7.0} {}",
            node.kind().as_str(),
            node.status.as_str(),
            node.position.x,
            node.position.y,
            node.label
        );
    }
    println!();
    for edge in &edges {
        match &edge.label {
            Some(label) => println!("  {} -[{label}]-> {}", edge.source, edge.target),
            None => println!("  {} -> {}", edge.source, edge.target),
        }
    }
    println!();

    Ok(())
}

fn print_graph_json(investigation: &InvestigationId, nodes: &[Node], edges: &[Edge]) -> Result<()> {
    let graph = serde_json::json!({
        "investigation": investigation,
        "nodes": nodes,
        "edges": edges,
    });
    println!("{}", serde_json::to_string_pretty(&graph)?);
    Ok(())
}

async fn cmd_organize(investigation: &str, db: Option<&str>) -> Result<()> {
    let config = resolved_config()?;
    let db_path = resolve_db_path(&config, db);
    if !db_path.exists() {
        return Err(eyre!("no graph database at '{}'", db_path.display()));
    }

    let id = InvestigationId::from(investigation);
    let moved =
        casegraph_core::pipeline::organize_persisted(&db_path, &id, &EngineConfig::from(&config))
            .await?;
    println!("Organized {investigation}: {moved} node(s) moved");
    Ok(())
}

async fn cmd_list(db: Option<&str>) -> Result<()> {
    let config = resolved_config()?;
    let db_path = resolve_db_path(&config, db);
    if !db_path.exists() {
        println!("No investigations yet.");
        return Ok(());
    }

    let storage = Storage::open_readonly(&db_path).await?;
    let records = storage.list_investigations().await?;
    info!(count = records.len(), "listing investigations");

    if records.is_empty() {
        println!("No investigations yet.");
        return Ok(());
    }
    for record in records {
        println!(
            "  {:<38} {:<10} {:<8} {}  {}",
            record.id.as_str(),
            record.status,
            record.risk_level.as_deref().unwrap_or("-"),
            record.updated_at.format("%Y-%m-%d %H:%M"),
            record.entity_name
        );
    }
    Ok(())
}

fn cmd_tools(preset: Option<&str>) -> Result<()> {
    let config = resolved_config()?;
    let registry = ToolRegistry::from_config(&config.tools)?;

    let selected: Option<Preset> = preset.map(str::parse::<Preset>).transpose()?;
    if let Some(preset) = selected {
        println!("{}: {}", preset.label(), preset.description());
        println!();
    }

    for tool in registry.tools() {
        if let Some(preset) = selected {
            if !preset.tools().contains(&tool.key.as_str()) {
                continue;
            }
        }
        println!(
            "  {:<20} {:<26} {:<11} {}",
            tool.key,
            tool.name,
            tool.category,
            tool.pattern_sources().join(" | ")
        );
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
