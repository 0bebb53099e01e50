use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use steinline::batch::ProcMeminfo;
use steinline::checkpoint::CheckpointManager;
use steinline::config::{self, ProjectConfig};
use steinline::db::Database;
use steinline::events::{CancelToken, EventSink, PipelineEvent};
use steinline::extract::PlainTextDeconstructor;
use steinline::inference::{InferenceClient, OllamaClient};
use steinline::intelligence::IntelligenceStore;
use steinline::registry::store::{processed_count, total_count};
use steinline::registry::RegistryScanner;
use steinline::timeline::{CategoryLanes, CoordinateEngine};
use steinline::AnalysisRunner;

#[derive(Parser)]
#[command(name = "steinline", version, about = "Resilient evidence analysis pipeline")]
struct Cli {
    /// Project config file; defaults to ~/SteinLine/config.json.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a config file for a new project.
    Init {
        /// Root of the evidence tree.
        #[arg(long)]
        source: PathBuf,
    },
    /// Discover evidence files into the registry without analyzing.
    Scan,
    /// Discover, then analyze everything still pending.
    Analyze {
        /// Skip the discovery pass and analyze only known pending files.
        #[arg(long)]
        no_scan: bool,
    },
    /// Show registry, fact, and checkpoint state.
    Status,
    /// Dump all facts with board coordinates as JSON.
    Timeline,
    /// Delete the resume checkpoint (registry state is untouched).
    ResetCheckpoint,
}

/// Forwards pipeline events into the structured log.
struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: PipelineEvent) {
        match &event {
            PipelineEvent::BatchError { .. }
            | PipelineEvent::ParseError { .. }
            | PipelineEvent::FileSkipped { .. }
            | PipelineEvent::MemoryThrottled { .. } => tracing::warn!(?event, "pipeline"),
            PipelineEvent::FatalError { .. } => tracing::error!(?event, "pipeline"),
            _ => tracing::info!(?event, "pipeline"),
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        tracing::error!(error = %e, "Run failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = cli
        .config
        .unwrap_or_else(|| config::app_data_dir().join("config.json"));

    match cli.command {
        Command::Init { source } => init(&config_path, source),
        Command::Scan => scan(&load_config(&config_path)?),
        Command::Analyze { no_scan } => analyze(&load_config(&config_path)?, no_scan),
        Command::Status => status(&load_config(&config_path)?),
        Command::Timeline => timeline(&load_config(&config_path)?),
        Command::ResetCheckpoint => reset_checkpoint(&load_config(&config_path)?),
    }
}

fn load_config(path: &PathBuf) -> Result<ProjectConfig, Box<dyn std::error::Error>> {
    if path.exists() {
        Ok(ProjectConfig::load(path)?)
    } else {
        tracing::warn!(path = %path.display(), "No config file, using defaults");
        Ok(ProjectConfig::default())
    }
}

fn init(config_path: &PathBuf, source: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ProjectConfig {
        source_root: source,
        ..ProjectConfig::default()
    };
    config.auto_tune();
    config.validate()?;
    config.save(config_path)?;
    println!("Wrote {}", config_path.display());
    Ok(())
}

fn open_database(config: &ProjectConfig) -> Result<Database, Box<dyn std::error::Error>> {
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Database::new(&config.database_path))
}

fn scan(config: &ProjectConfig) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_database(config)?;
    let conn = db.connect()?;
    let scanner = RegistryScanner::new(&conn, config.cpu_workers, &LogSink, CancelToken::new());
    let report = scanner.discover(&config.source_root)?;
    println!(
        "Scanned {} files: {} new, {} unchanged, {} unreadable",
        report.scanned, report.new_records, report.unchanged, report.unreadable
    );
    Ok(())
}

fn analyze(config: &ProjectConfig, no_scan: bool) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    let db = open_database(config)?;

    if !no_scan {
        let conn = db.connect()?;
        let scanner = RegistryScanner::new(&conn, config.cpu_workers, &LogSink, CancelToken::new());
        scanner.discover(&config.source_root)?;
    }

    let client = OllamaClient::new(
        &config.ollama_url,
        &config.model_name,
        config.context_length,
        config.inference_timeout_secs,
    )?;
    match client.is_model_available(&config.model_name) {
        Ok(true) => {}
        Ok(false) => tracing::warn!(model = %config.model_name, "Model not listed by the server"),
        Err(e) => tracing::warn!(error = %e, "Cannot query server model list"),
    }

    let deconstructor = PlainTextDeconstructor::new(config.max_file_bytes, config.skip_policy);
    let runner = AnalysisRunner::new(
        config,
        &deconstructor,
        &client,
        &ProcMeminfo,
        &LogSink,
        CancelToken::new(),
    );
    let report = runner.run(&db)?;
    println!(
        "Committed {} fingerprints in {} batches; {} facts total, {} parse errors, {} files skipped",
        report.processed, report.batches, report.total_facts, report.parse_errors, report.skipped_files
    );
    Ok(())
}

fn status(config: &ProjectConfig) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_database(config)?;
    let conn = db.connect()?;
    let store = IntelligenceStore::new(db.connect()?);

    let total = total_count(&conn)?;
    let processed = processed_count(&conn)?;
    println!("Registry:  {processed}/{total} fingerprints processed");
    println!("Facts:     {}", store.fact_count()?);
    match CheckpointManager::beside_database(db.path()).load() {
        Some(cursor) => println!(
            "Checkpoint: {} processed, last {}, saved at unix {}",
            cursor.processed, cursor.last_fp, cursor.timestamp
        ),
        None => println!("Checkpoint: none"),
    }
    Ok(())
}

#[derive(Serialize)]
struct PlacedFact {
    #[serde(flatten)]
    fact: steinline::Fact,
    x: f64,
    y: f64,
}

fn timeline(config: &ProjectConfig) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_database(config)?;
    let store = IntelligenceStore::new(db.connect()?);
    let engine = CoordinateEngine::new();
    let mut lanes = CategoryLanes::new();
    let mut stacks: std::collections::HashMap<(String, usize), usize> =
        std::collections::HashMap::new();

    let mut placed = Vec::new();
    for fact in store.all_facts()? {
        let lane = lanes.lane_for(&fact.category);
        let stack = stacks.entry((fact.date.clone(), lane)).or_insert(0);
        let (x, y) = engine.position(&fact.date, lane, *stack);
        *stack += 1;
        placed.push(PlacedFact { fact, x, y });
    }
    println!("{}", serde_json::to_string_pretty(&placed)?);
    Ok(())
}

fn reset_checkpoint(config: &ProjectConfig) -> Result<(), Box<dyn std::error::Error>> {
    CheckpointManager::beside_database(&config.database_path).clear()?;
    println!("Checkpoint cleared");
    Ok(())
}
