use clap::{Parser, Subcommand};
use lineage_core::{to_json_pretty, Author, EntityKey, Payload, PayloadItem};
use lineage_engine::MergeStatus;
use lineage_service::{StaticAuth, VersionControl};
use lineage_storage::{KVStore, RedbBackend};
use miette::IntoDiagnostic;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "lineage",
    about = "Fork/merge version control for structured entities"
)]
struct Cli {
    /// Path to the redb database file
    #[arg(long, global = true, default_value = "./lineage.redb")]
    data_dir: PathBuf,

    /// Acting user recorded on snapshots
    #[arg(long, global = true, default_value = "cli")]
    author: String,

    /// Record the author as an AI agent instead of a human
    #[arg(long, global = true)]
    ai: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize an entity with its root snapshot
    Init {
        entity_type: String,
        entity_id: String,
        /// JSON file with the payload items: [{"id": ..., "value": ...}, ...]
        payload: PathBuf,
    },
    /// Commit a new snapshot on the entity's main line
    Commit {
        entity_type: String,
        entity_id: String,
        payload: PathBuf,
        /// The head snapshot this payload was based on
        #[arg(long)]
        parent: String,
    },
    /// Show the entity's history, most recent first
    Log { entity_type: String, entity_id: String },
    /// Show a single snapshot
    Show { snapshot_id: String },
    /// Show the change-set between two snapshots
    Diff { from: String, to: String },
    /// Fork the entity at a snapshot (defaults to the current head)
    Fork {
        entity_type: String,
        entity_id: String,
        #[arg(long)]
        at: Option<String>,
    },
    /// List the entity's forks
    Forks { entity_type: String, entity_id: String },
    /// Commit a new snapshot on a fork
    ForkCommit {
        fork_id: String,
        payload: PathBuf,
        /// The fork head this payload was based on
        #[arg(long)]
        parent: String,
    },
    /// Merge a fork back into its origin entity
    Merge { fork_id: String },
    /// Abandon a fork
    Abandon { fork_id: String },
    /// Revert the entity to a prior main-line snapshot
    Revert {
        entity_type: String,
        entity_id: String,
        #[arg(long)]
        to: String,
    },
}

fn main() -> miette::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let author = if cli.ai {
        Author::ai(&cli.author)
    } else {
        Author::human(&cli.author)
    };
    let storage: Arc<dyn KVStore> = Arc::new(RedbBackend::new(&cli.data_dir)?);
    let service = VersionControl::new(storage, Arc::new(StaticAuth::new(author)));

    match cli.command {
        Commands::Init {
            entity_type,
            entity_id,
            payload,
        } => {
            let entity = EntityKey::new(entity_type, entity_id);
            let payload = load_payload(&payload, &entity.entity_type)?;
            let snapshot = service.create_entity(&entity, payload)?;
            info!("Initialized {} at {}", entity, snapshot.id);
            println!("{}", to_json_pretty(&snapshot)?);
        }
        Commands::Commit {
            entity_type,
            entity_id,
            payload,
            parent,
        } => {
            let entity = EntityKey::new(entity_type, entity_id);
            let payload = load_payload(&payload, &entity.entity_type)?;
            let snapshot = service.commit(&entity, payload, &parent)?;
            println!("{}", to_json_pretty(&snapshot)?);
        }
        Commands::Log {
            entity_type,
            entity_id,
        } => {
            let entity = EntityKey::new(entity_type, entity_id);
            let history = service.history(&entity)?;
            println!("{}", to_json_pretty(&history)?);
        }
        Commands::Show { snapshot_id } => {
            let snapshot = service.snapshot(&snapshot_id)?;
            println!("{}", to_json_pretty(&snapshot)?);
        }
        Commands::Diff { from, to } => {
            let changes = service.diff(&from, &to)?;
            println!("{}", to_json_pretty(&changes)?);
        }
        Commands::Fork {
            entity_type,
            entity_id,
            at,
        } => {
            let entity = EntityKey::new(entity_type, entity_id);
            let at = match at {
                Some(snapshot_id) => snapshot_id,
                None => service.head(&entity)?.id,
            };
            let fork = service.create_fork(&entity, &at)?;
            println!("{}", to_json_pretty(&fork)?);
        }
        Commands::Forks {
            entity_type,
            entity_id,
        } => {
            let entity = EntityKey::new(entity_type, entity_id);
            let forks = service.list_forks(&entity)?;
            println!("{}", to_json_pretty(&forks)?);
        }
        Commands::ForkCommit {
            fork_id,
            payload,
            parent,
        } => {
            let entity_type = service.fork(&fork_id)?.origin.entity_type;
            let payload = load_payload(&payload, &entity_type)?;
            let snapshot = service.commit_to_fork(&fork_id, payload, &parent)?;
            println!("{}", to_json_pretty(&snapshot)?);
        }
        Commands::Merge { fork_id } => {
            let outcome = service.merge_fork(&fork_id)?;
            if outcome.status == MergeStatus::Conflict {
                eprintln!("Merge conflicted; no state was changed");
            }
            println!("{}", to_json_pretty(&outcome)?);
        }
        Commands::Abandon { fork_id } => {
            let fork = service.abandon_fork(&fork_id)?;
            println!("{}", to_json_pretty(&fork)?);
        }
        Commands::Revert {
            entity_type,
            entity_id,
            to,
        } => {
            let entity = EntityKey::new(entity_type, entity_id);
            let snapshot = service.revert(&entity, &to)?;
            println!("{}", to_json_pretty(&snapshot)?);
        }
    }

    Ok(())
}

/// Read a payload items file: a JSON array of {"id": ..., "value": ...}
fn load_payload(path: &Path, entity_type: &str) -> miette::Result<Payload> {
    let data = std::fs::read_to_string(path).into_diagnostic()?;
    let items: Vec<PayloadItem> = serde_json::from_str(&data).into_diagnostic()?;
    Ok(Payload::with_items(entity_type, items))
}
