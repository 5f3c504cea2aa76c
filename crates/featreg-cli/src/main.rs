mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::{resolve_config_path, resolve_db_path, resolve_log_level, RegistryConfig};
use featreg_core::{EntitySpec, FeatureGroupSpec, FeatureSpec, ImportSpec, JobStatus, StorageSpec};
use featreg_registry::{CoreService, ErrorClass, JobError, RegistryError, RetrievalError};
use featreg_storage::SpecStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "featreg")]
#[command(about = "Feature registry control plane", long_about = None)]
struct Cli {
    /// SQLite database holding the registry
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true, default_value_t = false)]
    debug: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage entity specs
    Entity {
        #[command(subcommand)]
        action: SpecCommands,
    },
    /// Manage feature specs
    Feature {
        #[command(subcommand)]
        action: SpecCommands,
    },
    /// Manage feature group specs
    FeatureGroup {
        #[command(subcommand)]
        action: SpecCommands,
    },
    /// Manage storage specs
    Storage {
        #[command(subcommand)]
        action: SpecCommands,
    },
    /// Track ingestion jobs
    Job {
        #[command(subcommand)]
        action: JobCommands,
    },
}

#[derive(Subcommand)]
enum SpecCommands {
    /// Register a JSON spec read from a file, or stdin with `-`
    Register { file: PathBuf },
    /// Fetch specs by id; fails if any id is unknown
    Get { ids: Vec<String> },
    List,
}

#[derive(Subcommand)]
enum JobCommands {
    /// Record a new job from a JSON import spec
    Create {
        file: PathBuf,
        #[arg(long)]
        runner: String,
        #[arg(long, default_value = "")]
        ext_id: String,
        #[arg(long, default_value = "PENDING")]
        status: JobStatus,
    },
    Show {
        id: String,
    },
    List {
        #[arg(long, conflicts_with = "feature")]
        entity: Option<String>,
        #[arg(long)]
        feature: Option<String>,
    },
    /// Overwrite the status of a job
    Status {
        id: String,
        status: JobStatus,
    },
    /// Append `name=value` metric samples
    Metric {
        id: String,
        #[arg(required = true, value_parser = parse_metric)]
        samples: Vec<(String, f64)>,
    },
    Metrics {
        id: String,
    },
    Delete {
        id: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            match error_class(&err) {
                Some(ErrorClass::BadRequest) => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_path = resolve_config_path(cli.config.as_deref());
    let config = RegistryConfig::load(&config_path)?;
    init_logging(&resolve_log_level(cli.debug, &config));

    let db_path = resolve_db_path(cli.db.as_deref(), &config);
    if let Some(parent) = db_path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let store = SpecStore::open(&db_path)
        .with_context(|| format!("Failed to open registry at {}", db_path.display()))?;
    info!(db = %db_path.display(), "registry opened");
    let service = CoreService::new(Arc::new(store), config.job_tracker());

    match cli.command {
        Commands::Entity { action } => match action {
            SpecCommands::Register { file } => {
                let spec: EntitySpec = read_json(&file)?;
                print_json(&service.register_entity(spec)?)
            }
            SpecCommands::Get { ids } => print_json(&service.get_entities(&ids)?),
            SpecCommands::List => print_json(&service.list_entities()?),
        },
        Commands::Feature { action } => match action {
            SpecCommands::Register { file } => {
                let spec: FeatureSpec = read_json(&file)?;
                print_json(&service.register_feature(spec)?)
            }
            SpecCommands::Get { ids } => print_json(&service.get_features(&ids)?),
            SpecCommands::List => print_json(&service.list_features()?),
        },
        Commands::FeatureGroup { action } => match action {
            SpecCommands::Register { file } => {
                let spec: FeatureGroupSpec = read_json(&file)?;
                print_json(&service.register_feature_group(spec)?)
            }
            SpecCommands::Get { ids } => print_json(&service.get_feature_groups(&ids)?),
            SpecCommands::List => print_json(&service.list_feature_groups()?),
        },
        Commands::Storage { action } => match action {
            SpecCommands::Register { file } => {
                let spec: StorageSpec = read_json(&file)?;
                print_json(&service.register_storage(spec)?)
            }
            SpecCommands::Get { ids } => print_json(&service.get_storage(&ids)?),
            SpecCommands::List => print_json(&service.list_storage()?),
        },
        Commands::Job { action } => match action {
            JobCommands::Create {
                file,
                runner,
                ext_id,
                status,
            } => {
                let import_spec: ImportSpec = read_json(&file)?;
                print_json(&service.create_job(&ext_id, &runner, &import_spec, status)?)
            }
            JobCommands::Show { id } => print_json(&service.get_job(&id)?),
            JobCommands::List { entity, feature } => {
                let jobs = match (entity, feature) {
                    (Some(entity), _) => service.jobs_for_entity(&entity)?,
                    (None, Some(feature)) => service.jobs_for_feature(&feature)?,
                    (None, None) => service.list_jobs()?,
                };
                print_json(&jobs)
            }
            JobCommands::Status { id, status } => {
                print_json(&service.update_job_status(&id, status)?)
            }
            JobCommands::Metric { id, samples } => {
                print_json(&service.record_job_metrics(&id, &samples)?)
            }
            JobCommands::Metrics { id } => print_json(&service.job_metrics(&id)?),
            JobCommands::Delete { id } => {
                service.delete_job(&id)?;
                print_json(&id)
            }
        },
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = if path == Path::new("-") {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read spec from stdin")?;
        buffer
    } else {
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?
    };
    serde_json::from_str(&content).with_context(|| MalformedInput(path.display().to_string()))
}

/// Context marking a parse failure of caller-supplied JSON.
#[derive(Debug)]
struct MalformedInput(String);

impl fmt::Display for MalformedInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to parse {}", self.0)
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_metric(input: &str) -> Result<(String, f64), String> {
    let (name, value) = input
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got {input:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("metric name missing in {input:?}"));
    }
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|err| format!("invalid metric value in {input:?}: {err}"))?;
    if !value.is_finite() {
        return Err(format!("metric value in {input:?} must be finite"));
    }
    Ok((name.to_string(), value))
}

fn error_class(err: &anyhow::Error) -> Option<ErrorClass> {
    if err.downcast_ref::<MalformedInput>().is_some() {
        return Some(ErrorClass::BadRequest);
    }
    if let Some(err) = err.downcast_ref::<RegistryError>() {
        return Some(err.class());
    }
    if let Some(err) = err.downcast_ref::<RetrievalError>() {
        return Some(err.class());
    }
    if let Some(err) = err.downcast_ref::<JobError>() {
        return Some(err.class());
    }
    None
}
