use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use thiserror::Error;

use taskboard_core::app::{BoardBuilder, BoardEvent, BoardSession, BuildError};
use taskboard_core::config::{BoardConfig, ConfigError};
use taskboard_core::domain::{
    Column, ListFilter, Priority, StoreError, Task, TaskDraft, TaskId, TaskPage, TaskPatch,
};
use taskboard_core::impls::{EmptySeed, JsonFilePersistence, JsonFileSeed};
use taskboard_core::ports::SeedSource;
use taskboard_core::{Notice, QueryKey};

#[derive(Parser, Debug)]
#[command(name = "taskboard", version)]
#[command(about = "Local four-column task board")]
struct Cli {
    /// Board file (task array + seeded flag)
    #[arg(long, global = true, default_value = "taskboard.json")]
    data: PathBuf,
    /// JSON array of tasks used once to seed an empty board
    #[arg(long, global = true)]
    seed: Option<PathBuf>,
    /// Board config (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List tasks, optionally one column and one page
    List {
        #[arg(long)]
        column: Option<Column>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        page: Option<u32>,
    },
    /// Show the first page of every column
    Board {
        #[arg(long)]
        search: Option<String>,
    },
    /// Show one task
    Show { id: TaskId },
    /// Create a task
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        #[arg(long, default_value = "backlog")]
        column: Column,
        #[arg(long)]
        priority: Option<Priority>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Edit fields of a task
    Edit(EditArgs),
    /// Move a task to another column (drag and drop)
    Move { id: TaskId, column: Column },
    /// Delete a task
    Delete { id: TaskId },
}

#[derive(Args, Debug)]
struct EditArgs {
    id: TaskId,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    priority: Option<Priority>,
    /// Replaces all tags
    #[arg(long = "tag")]
    tags: Vec<String>,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("nothing to edit: pass at least one of --title, --description, --priority, --tag")]
    EmptyEdit,

    #[error("{0}")]
    Rejected(String),

    #[error("failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ColumnOutput<'a> {
    column: Column,
    label: &'a str,
    page: u32,
    total_pages: u32,
    total: usize,
    items: Vec<Task>,
}

fn init_tracing(json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

fn open_session(cli: &Cli) -> Result<BoardSession, CliError> {
    let config = match &cli.config {
        Some(path) => BoardConfig::from_json_file(path)?,
        None => BoardConfig::default(),
    };
    let seed: Arc<dyn SeedSource> = match &cli.seed {
        Some(path) => Arc::new(JsonFileSeed::new(path)),
        None => Arc::new(EmptySeed),
    };
    let session = BoardBuilder::new(config)
        .local(Arc::new(JsonFilePersistence::new(&cli.data)), seed)
        .build()?;
    Ok(session)
}

fn print_json(value: &impl Serialize) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_task_line(task: &Task) {
    let priority = task
        .priority
        .map(|p| format!(" ({})", p.as_str()))
        .unwrap_or_default();
    let tags = if task.tags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", task.tags.join(", "))
    };
    println!("  {} {}{priority}{tags}", task.id, task.title);
}

fn print_page(page: &TaskPage) {
    for task in &page.items {
        print_task_line(task);
    }
    println!(
        "  -- page {}/{} ({} tasks)",
        page.page,
        page.total_pages.max(1),
        page.total
    );
}

/// Notices go to stdout; an error notice fails the command.
fn report(notice: Option<Notice>) -> Result<(), CliError> {
    match notice {
        Some(notice) if notice.is_error() => Err(CliError::Rejected(notice.message)),
        Some(notice) => {
            println!("{notice}");
            Ok(())
        }
        None => Ok(()),
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut session = open_session(&cli)?;
    let json_out = cli.json;

    match cli.command {
        Commands::List { column, search, page } => {
            let mut filter = match column {
                Some(column) => ListFilter::column(column),
                None => ListFilter::all(),
            };
            if let Some(search) = search {
                filter = filter.with_search(search);
            }
            if let Some(page) = page {
                filter = filter.with_page(page, session.pager().page_size());
            }
            let listing = session
                .cache()
                .read(QueryKey::Tasks(filter))
                .await?
                .into_page()
                .unwrap_or_else(|| TaskPage {
                    items: Vec::new(),
                    total: 0,
                    page: 1,
                    total_pages: 0,
                });
            if json_out {
                print_json(&listing)?;
            } else {
                print_page(&listing);
            }
        }
        Commands::Board { search } => {
            if let Some(search) = search {
                session.handle(BoardEvent::SearchInput(search)).await;
                session.flush_search();
            }
            session.refresh().await?;
            let columns: Vec<ColumnOutput<'_>> = Column::ALL
                .into_iter()
                .map(|column| {
                    let state = session.pager().state(column);
                    ColumnOutput {
                        column,
                        label: column.label(),
                        page: state.current_page,
                        total_pages: state.total_pages,
                        total: state.total,
                        items: session.column_view(column),
                    }
                })
                .collect();
            if json_out {
                print_json(&columns)?;
            } else {
                for column in &columns {
                    println!("{} ({})", column.label, column.total);
                    for task in &column.items {
                        print_task_line(task);
                    }
                }
            }
        }
        Commands::Show { id } => {
            let task = session.cache().read_task(id).await?;
            if json_out {
                print_json(&task)?;
            } else {
                print_task_line(&task);
                println!("  column:  {}", task.column.label());
                println!("  created: {}", task.created_at);
                println!("  updated: {}", task.updated_at);
                println!();
                println!("{}", task.description);
            }
        }
        Commands::Add {
            title,
            description,
            column,
            priority,
            tags,
        } => {
            let mut draft = TaskDraft::new(title, description, column).with_tags(tags);
            draft.priority = priority;
            report(session.handle(BoardEvent::Create(draft)).await)?;
        }
        Commands::Edit(args) => {
            let patch = TaskPatch {
                title: args.title,
                description: args.description,
                priority: args.priority,
                tags: (!args.tags.is_empty()).then_some(args.tags),
                ..TaskPatch::default()
            };
            if patch.is_empty() {
                return Err(CliError::EmptyEdit);
            }
            report(session.handle(BoardEvent::Update { id: args.id, patch }).await)?;
        }
        Commands::Move { id, column } => {
            report(session.handle(BoardEvent::DragStart(id)).await)?;
            session.handle(BoardEvent::DragHover(Some(column))).await;
            report(session.handle(BoardEvent::DragEnd(Some(column))).await)?;
        }
        Commands::Delete { id } => {
            report(session.handle(BoardEvent::Delete(id)).await)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.json);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "Command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
