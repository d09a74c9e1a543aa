use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::sync::Arc;

use todo_sync::{logging, ClientConfig, RemoteStore, RestStore, SyncCache, Todo};

#[derive(Parser)]
#[command(name = "todo-sync")]
#[command(about = "Task list backed by a hosted table, with live updates", version)]
#[command(after_help = "Configuration:
  SUPABASE_URL and SUPABASE_KEY are read from the environment or a .env file,
  unless --config points at a TOML file with `url` and `api_key`.")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Also write logs to a daily-rolling file in this directory
    #[arg(long, global = true, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show all tasks, newest first
    List,

    /// Add a task
    Add { text: String },

    /// Mark a task as completed
    Done { id: i64 },

    /// Mark a task as not completed
    Undone { id: i64 },

    /// Flip the completion flag of a task
    Toggle { id: i64 },

    /// Change the text of a task
    Edit { id: i64, text: String },

    /// Delete a task
    Rm { id: i64 },

    /// Print the list every time it changes, until Ctrl-C
    Watch,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let _log_guard = match logging::init(cli.verbose, cli.log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{} {:#}", "✗".red(), e);
            std::process::exit(2);
        }
    };

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "✗".red(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::from_env()?,
    };
    tracing::info!(url = %config.url, table = %config.table, "using remote table");

    let cache = Arc::new(SyncCache::new(RestStore::new(config)?));
    execute(cache, cli.command.unwrap_or(Commands::List)).await
}

async fn execute<S: RemoteStore>(cache: Arc<SyncCache<S>>, command: Commands) -> Result<()> {
    if !cache.refresh().await {
        bail!("could not fetch tasks");
    }

    match command {
        Commands::List => {}

        Commands::Add { text } => {
            let Some(todo) = cache.create(&text).await else {
                bail!("could not add task");
            };
            println!("{} Added #{}", "✓".green(), id_label(&todo));
        }

        Commands::Done { id } => {
            expect_updated(cache.set_completed(Some(id), true).await, id)?;
        }

        Commands::Undone { id } => {
            expect_updated(cache.set_completed(Some(id), false).await, id)?;
        }

        Commands::Toggle { id } => {
            expect_updated(cache.toggle(Some(id)).await, id)?;
        }

        Commands::Edit { id, text } => {
            expect_updated(cache.set_text(Some(id), &text).await, id)?;
        }

        Commands::Rm { id } => {
            if !cache.remove(Some(id)).await {
                bail!("could not delete task #{id}");
            }
            println!("{} Deleted #{}", "✓".green(), id);
        }

        Commands::Watch => {
            let _feed = cache.listen().await?;
            println!("{}", "👁  Watching for changes (Ctrl-C to stop)".cyan().bold());
            cache.subscribe(|items| {
                println!("{}", "─".repeat(60).bright_black());
                render(items);
            });
            tokio::signal::ctrl_c().await?;
            return Ok(());
        }
    }

    render(&cache.snapshot());
    Ok(())
}

fn expect_updated(result: Option<Todo>, id: i64) -> Result<()> {
    match result {
        Some(todo) => {
            println!("{} Updated #{}", "✓".green(), id_label(&todo));
            Ok(())
        }
        None => bail!("could not update task #{id}"),
    }
}

fn id_label(todo: &Todo) -> String {
    todo.id.map(|id| id.to_string()).unwrap_or_else(|| "?".into())
}

fn render(items: &[Todo]) {
    if items.is_empty() {
        println!("{}", "No tasks yet.".bright_black());
        return;
    }

    for todo in items {
        let mark = if todo.completed {
            "[x]".green()
        } else {
            "[ ]".normal()
        };
        let text = if todo.completed {
            todo.text.strikethrough().bright_black()
        } else {
            todo.text.bright_white()
        };
        let created = todo
            .created_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();

        println!(
            "{} {} {} {}",
            format!("{:>4}", id_label(todo)).bright_black(),
            mark,
            text,
            created.bright_black()
        );
    }
}
