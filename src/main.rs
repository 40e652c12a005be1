use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tasksync::{HttpRemoteClient, NewTask, Store, SyncConfig, SyncEngine, TaskRepository};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "tasksyncd", about = "Offline-first task synchronization engine", version)]
struct Cli {
    #[command(flatten)]
    config: SyncConfig,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single sync cycle and exit.
    ///
    /// Examples:
    ///   tasksyncd run-once
    RunOnce,
    /// Run sync cycles forever on a fixed interval (default when no
    /// subcommand is given).
    ///
    /// Examples:
    ///   tasksyncd serve
    ///   tasksyncd serve --interval-secs 10
    Serve {
        #[arg(long, default_value_t = 30)]
        interval_secs: u64,
    },
    /// Show pending-queue depth, dead-letter contents, and connectivity.
    ///
    /// Examples:
    ///   tasksyncd status
    Status,
    /// Add a new task.
    ///
    /// Examples:
    ///   tasksyncd add "Buy milk"
    ///   tasksyncd add "Write report" --description "Q3 numbers"
    Add {
        title: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// List live (non-deleted) tasks.
    ///
    /// Examples:
    ///   tasksyncd list
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(cli.config.log.clone())
        .compact()
        .init();

    let store = Store::new(&cli.config.data_dir)
        .await
        .context("opening local store")?;
    let pool = store.pool();
    let repository = TaskRepository::new(pool.clone());
    let remote = Arc::new(HttpRemoteClient::new(cli.config.api_base_url.clone()));
    let engine = SyncEngine::new(
        pool,
        remote,
        cli.config.batch_size,
        cli.config.max_retries,
    );

    match cli.command.unwrap_or(Command::Serve { interval_secs: 30 }) {
        Command::RunOnce => run_and_report(&engine).await?,
        Command::Serve { interval_secs } => {
            info!(interval_secs, "tasksyncd starting in serve mode");
            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                interval.tick().await;
                run_and_report(&engine).await?;
            }
        }
        Command::Status => print_status(&engine).await?,
        Command::Add { title, description } => {
            let task = repository.create(NewTask { title, description }).await?;
            println!("Added: {} — {}", task.id, task.title);
        }
        Command::List => {
            let tasks = repository.list_all().await?;
            if tasks.is_empty() {
                println!("No tasks.");
            } else {
                println!("{:<36} {:<10} {:<12} TITLE", "ID", "DONE", "STATUS");
                for t in &tasks {
                    println!(
                        "{:<36} {:<10} {:<12} {}",
                        t.id,
                        t.completed,
                        t.sync_status.as_str(),
                        t.title
                    );
                }
            }
        }
    }

    Ok(())
}

async fn run_and_report(engine: &SyncEngine) -> Result<()> {
    let result = engine.run_cycle().await;
    if result.success {
        info!(
            synced = result.synced_items,
            "sync cycle completed cleanly"
        );
    } else {
        warn!(
            synced = result.synced_items,
            failed = result.failed_items,
            errors = ?result.errors,
            "sync cycle completed with errors"
        );
    }
    Ok(())
}

async fn print_status(engine: &SyncEngine) -> Result<()> {
    let pending = engine.count_pending().await?;
    let dead_letters = engine.dead_letter_contents().await?;
    let connected = engine.check_connectivity().await;

    println!("Connectivity:   {}", if connected { "online" } else { "offline" });
    println!("Pending items:  {pending}");
    println!("Dead-lettered:  {}", dead_letters.len());
    for record in &dead_letters {
        println!(
            "  task {} ({}) — {}",
            record.task_id,
            record.operation.as_str(),
            record.final_error_message
        );
    }
    Ok(())
}
