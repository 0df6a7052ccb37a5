use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use scriptorium_compiler::{derive_execution_plan, BacklogItem, CompileError, Hierarchy, PlanRefs};
use scriptorium_core::config::{dirs_home, AppConfig};
use scriptorium_engine::{validate_plan, ExecutionStore, WorkflowPlan};
use scriptorium_ledger::SqliteLedger;

#[derive(Parser)]
#[command(name = "scriptorium", version, about = "Document-production orchestration engine")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "scriptorium.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a backlog JSON file into a deterministic execution plan
    Compile {
        /// JSON array of backlog items
        backlog: PathBuf,
        /// Document the plan belongs to
        #[arg(long)]
        document: Option<String>,
        /// Backlog revision the plan was compiled from
        #[arg(long)]
        revision: Option<String>,
    },
    /// Check a workflow plan file and list every violation
    Validate {
        /// Workflow plan JSON file
        plan: PathBuf,
    },
    /// Sweep stale claimed/running work items
    Recover,
    /// List active LLM threads for a scope (usually an execution id)
    Threads { scope: String },
    /// Print the state of an execution
    Show { execution_id: String },
    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("scriptorium=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Compile {
            backlog,
            document,
            revision,
        } => {
            let items: Vec<BacklogItem> = serde_json::from_str(&std::fs::read_to_string(&backlog)?)?;
            let hierarchy = Hierarchy::new(config.compiler.levels.iter().cloned());
            let refs = PlanRefs {
                document_id: document,
                backlog_revision: revision,
            };
            match derive_execution_plan(&items, &hierarchy, refs) {
                Ok(plan) => {
                    info!(items = items.len(), waves = plan.waves.len(), "Backlog compiled");
                    println!("{}", serde_json::to_string_pretty(&plan)?);
                }
                Err(CompileError::Invalid(violations)) => {
                    eprintln!("Backlog has {} violation(s):", violations.len());
                    for violation in &violations {
                        eprintln!("  - {}", violation);
                    }
                    return Ok(ExitCode::FAILURE);
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Commands::Validate { plan } => {
            let plan: WorkflowPlan = serde_json::from_str(&std::fs::read_to_string(&plan)?)?;
            let violations = validate_plan(&plan);
            if violations.is_empty() {
                println!(
                    "Plan '{}' is valid ({} nodes, {} edges)",
                    plan.id,
                    plan.nodes.len(),
                    plan.edges.len()
                );
            } else {
                eprintln!("Plan '{}' has {} violation(s):", plan.id, violations.len());
                for violation in &violations {
                    eprintln!("  - {}", violation);
                }
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Recover => {
            let ledger = SqliteLedger::open(&config.store_path())?;
            let threshold = chrono::Duration::seconds(config.ledger.stale_after_secs as i64);
            let report =
                ledger.recover_stale(chrono::Utc::now(), threshold, config.ledger.max_attempts)?;
            if report.is_empty() {
                println!("No stale work items.");
            } else {
                println!("Recovered {} work item(s):", report.total());
                print_ids("applied", &report.applied);
                print_ids("requeued", &report.requeued);
                print_ids("dead_letter", &report.dead_lettered);
                print_ids("cancelled", &report.cancelled);
            }
        }
        Commands::Threads { scope } => {
            let ledger = SqliteLedger::open(&config.store_path())?;
            let threads = ledger.list_active_threads(&scope)?;
            if threads.is_empty() {
                println!("No active threads for {}.", scope);
            }
            for thread in threads {
                println!(
                    "{}  {:<8} {:<16} {}{}",
                    thread.id,
                    thread.status,
                    thread.kind,
                    thread.target,
                    if thread.cancel_requested { " [cancel requested]" } else { "" }
                );
            }
        }
        Commands::Show { execution_id } => {
            let store = ExecutionStore::open(&config.store_path())?;
            let state = store.load_state(&execution_id)?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }
    let home_config = dirs_home().map(|h| h.join(".scriptorium").join("config.toml"));
    match home_config {
        Some(ref home) if home.exists() => {
            info!(path = %home.display(), "Loading config from home directory");
            Ok(AppConfig::load(home)?)
        }
        _ => {
            warn!(path = %path.display(), "No config file found, using defaults");
            Ok(AppConfig::default())
        }
    }
}

fn print_ids(label: &str, ids: &[String]) {
    for id in ids {
        println!("  {:<12} {}", label, id);
    }
}
