//! DySART command-line tools.
//!
//! Provides the `dysart` binary for validating project files, printing
//! feature graphs, refreshing features against the simulated lab, and
//! inspecting the call-record audit trail of a database.

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dysart_core::{CallRecord, FeatureId};
use dysart_engine::{EngineError, Laboratory, ProjectConfig};
use dysart_storage::{FeatureStore, SqliteStore};

/// DySART lab orchestration tools.
#[derive(Parser)]
#[command(name = "dysart", about = "DySART lab orchestration tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a project file without touching any database.
    Check {
        project: PathBuf,
    },

    /// Print the name -> id mapping and dependency tree of a project.
    Graph {
        project: PathBuf,
    },

    /// Refresh one feature (and its stale ancestors) on the simulated lab.
    Refresh {
        /// Path to the lab database file.
        #[arg(short, long)]
        db: String,

        project: PathBuf,

        /// Feature name or id.
        feature: String,
    },

    /// Show the call record matching an id prefix.
    Record {
        #[arg(short, long)]
        db: String,

        prefix: String,
    },

    /// List the call records of one feature id, oldest first.
    History {
        #[arg(short, long)]
        db: String,

        feature: String,
    },

    /// List call records left unconcluded by an interrupted refresh.
    Anomalies {
        #[arg(short, long)]
        db: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let exit_code = match cli.command {
        Commands::Check { project } => run_check(&project),
        Commands::Graph { project } => run_graph(&project),
        Commands::Refresh {
            db,
            project,
            feature,
        } => run_refresh(&db, &project, &feature),
        Commands::Record { db, prefix } => run_record(&db, &prefix),
        Commands::History { db, feature } => run_history(&db, &feature),
        Commands::Anomalies { db } => run_anomalies(&db),
    };
    process::exit(exit_code);
}

/// Loads a project into a throwaway in-memory laboratory.
fn load_in_memory(path: &Path) -> Result<Laboratory, EngineError> {
    let config = ProjectConfig::from_path(path)?;
    let mut lab = Laboratory::in_memory();
    lab.load_project(&config)?;
    Ok(lab)
}

fn open_store(db_path: &str) -> Result<SqliteStore, i32> {
    SqliteStore::new(db_path).map_err(|e| {
        eprintln!("Error: failed to open database '{}': {}", db_path, e);
        3
    })
}

/// Exit code: 0 = valid, 1 = invalid project.
fn run_check(path: &Path) -> i32 {
    match load_in_memory(path) {
        Ok(lab) => {
            println!(
                "{}: ok ({} features, {} edges)",
                lab.project_name().unwrap_or("project"),
                lab.feature_ids().len(),
                lab.feature_graph().len()
            );
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn run_graph(path: &Path) -> i32 {
    let lab = match load_in_memory(path) {
        Ok(lab) => lab,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    match render_graph(&lab) {
        Ok(out) => {
            print!("{}", out);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

/// Names, then the tree of every feature no other feature depends on.
fn render_graph(lab: &Laboratory) -> Result<String, EngineError> {
    let mut out = String::new();
    for (name, id) in lab.feature_ids() {
        out.push_str(&format!("{} -> {}\n", name, id));
    }
    let edges = lab.feature_graph();
    for id in lab.feature_ids().values() {
        if edges.iter().all(|e| &e.parent != id) {
            out.push('\n');
            out.push_str(&lab.tree(id)?);
        }
    }
    Ok(out)
}

/// Exit code: 0 = refreshed, 1 = configuration error, 2 = update failed,
/// 3 = database error.
fn run_refresh(db_path: &str, project: &Path, feature: &str) -> i32 {
    let store = match open_store(db_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let mut lab = Laboratory::with_store(Box::new(store));
    if let Err(e) = lab.load_project_file(project) {
        eprintln!("Error: {}", e);
        return 1;
    }
    let id = match lab.resolve(feature) {
        Ok(id) => id,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            return 3;
        }
    };
    match runtime.block_on(lab.refresh(&id, None)) {
        Ok(report) => {
            if report.executed.is_empty() {
                println!("{} is fresh", id);
            }
            for record in &report.executed {
                println!("{}", format_record(record));
            }
            for failure in &report.hook_failures {
                eprintln!(
                    "Warning: post-hook '{}' of {} failed: {}",
                    failure.hook, failure.feature, failure.message
                );
            }
            0
        }
        Err(e @ (EngineError::Update { .. } | EngineError::PreHook { .. })) => {
            eprintln!("Error: {}", e);
            2
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

/// Exit code: 0 = found, 1 = no match or ambiguous, 3 = database error.
fn run_record(db_path: &str, prefix: &str) -> i32 {
    let store = match open_store(db_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    match store.find_record_by_prefix(prefix) {
        Ok(record) => match serde_json::to_string_pretty(&record) {
            Ok(json) => {
                println!("{}", json);
                0
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                3
            }
        },
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn run_history(db_path: &str, feature: &str) -> i32 {
    let store = match open_store(db_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    match store.call_records_for(&FeatureId::new(feature)) {
        Ok(records) => {
            for record in &records {
                println!("{}", format_record(record));
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            3
        }
    }
}

/// Exit code: 0 = none found, 4 = unconcluded records present.
fn run_anomalies(db_path: &str) -> i32 {
    let store = match open_store(db_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    match store.incomplete_records() {
        Ok(records) if records.is_empty() => {
            println!("no incomplete call records");
            0
        }
        Ok(records) => {
            for record in &records {
                println!("{}", format_record(record));
            }
            4
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            3
        }
    }
}

/// One line per record: short id, status, feature, start time, info.
fn format_record(record: &CallRecord) -> String {
    let mut line = format!(
        "{}  {:<8} {}  {}",
        record.id.short(),
        record.status,
        record.feature,
        record.start_time.to_rfc3339()
    );
    if let Some(info) = &record.info {
        line.push_str("  ");
        line.push_str(info);
    }
    line
}
