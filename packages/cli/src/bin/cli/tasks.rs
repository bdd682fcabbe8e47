// ABOUTME: CLI commands for the signed-in user's tasks
// ABOUTME: List with status filters, add, update, toggle completion, and delete

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use inquire::Confirm;
use taskmaster_cli::display::{parse_due, print_task, short_id, status_breakdown, task_table};
use taskmaster_cli::App;
use taskmaster_core::{TaskCreateInput, TaskPriority, TaskStatus, TaskUpdateInput};

#[derive(Subcommand)]
pub enum TasksCommands {
    /// List your tasks, newest first
    List {
        /// Only tasks with this status (todo, in-progress, completed, cancelled)
        #[arg(short, long, conflicts_with_all = ["active", "completed"])]
        status: Option<TaskStatus>,
        /// Only tasks that are neither completed nor cancelled
        #[arg(long, conflicts_with = "completed")]
        active: bool,
        /// Only completed tasks
        #[arg(long)]
        completed: bool,
    },
    /// Add a task
    Add {
        title: String,
        #[arg(short, long)]
        description: Option<String>,
        /// low, medium, high, or urgent
        #[arg(short, long)]
        priority: Option<TaskPriority>,
        #[arg(short, long)]
        status: Option<TaskStatus>,
        /// Due date as YYYY-MM-DD
        #[arg(long)]
        due: Option<String>,
        /// Tag the task; repeat for several tags
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },
    /// Change fields of a task
    Update {
        /// Task id or a unique prefix of it
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(short, long, conflicts_with = "clear_description")]
        description: Option<String>,
        #[arg(long)]
        clear_description: bool,
        #[arg(short, long)]
        priority: Option<TaskPriority>,
        #[arg(short, long)]
        status: Option<TaskStatus>,
        #[arg(long, conflicts_with = "clear_due")]
        due: Option<String>,
        #[arg(long)]
        clear_due: bool,
        /// Replace the tags; repeat for several tags
        #[arg(short, long = "tag")]
        tags: Option<Vec<String>>,
    },
    /// Mark a task completed, or back to todo if it already is
    Done {
        /// Task id or a unique prefix of it
        id: String,
    },
    /// Delete a task
    Delete {
        /// Task id or a unique prefix of it
        id: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

impl TasksCommands {
    pub async fn execute(&self, app: &App) -> Result<()> {
        app.load_tasks().await?;

        match self {
            TasksCommands::List {
                status,
                active,
                completed,
            } => list_command(app, *status, *active, *completed),
            TasksCommands::Add {
                title,
                description,
                priority,
                status,
                due,
                tags,
            } => {
                let input = TaskCreateInput {
                    title: title.clone(),
                    description: description.clone(),
                    status: *status,
                    priority: *priority,
                    due_date: due.as_deref().map(parse_due).transpose()?,
                    tags: (!tags.is_empty()).then(|| tags.clone()),
                };
                add_command(app, input).await
            }
            TasksCommands::Update {
                id,
                title,
                description,
                clear_description,
                priority,
                status,
                due,
                clear_due,
                tags,
            } => {
                let description = match (description, clear_description) {
                    (_, true) => Some(None),
                    (Some(description), false) => Some(Some(description.clone())),
                    (None, false) => None,
                };
                let due_date = match (due, clear_due) {
                    (_, true) => Some(None),
                    (Some(due), false) => Some(Some(parse_due(due)?)),
                    (None, false) => None,
                };
                let input = TaskUpdateInput {
                    title: title.clone(),
                    description,
                    status: *status,
                    priority: *priority,
                    due_date,
                    tags: tags.clone(),
                };
                update_command(app, id, input).await
            }
            TasksCommands::Done { id } => done_command(app, id).await,
            TasksCommands::Delete { id, yes } => delete_command(app, id, *yes).await,
        }
    }
}

fn list_command(
    app: &App,
    status: Option<TaskStatus>,
    active: bool,
    completed: bool,
) -> Result<()> {
    let (tasks, heading) = match (status, active, completed) {
        (Some(status), _, _) => (app.tasks.tasks_by_status(status), format!("{} tasks", status)),
        (None, true, _) => (app.tasks.active_tasks(), "Active tasks".to_string()),
        (None, false, true) => (app.tasks.completed_tasks(), "Completed tasks".to_string()),
        (None, false, false) => (app.tasks.tasks(), "All tasks".to_string()),
    };

    if tasks.is_empty() {
        println!("{}", "No tasks found".yellow());
        println!(
            "{}",
            "Use 'taskmaster tasks add <title>' to create one".dimmed()
        );
        return Ok(());
    }

    println!("{}", heading.blue().bold());
    println!("{}", task_table(&tasks));
    println!(
        "Total: {} ({})",
        tasks.len().to_string().cyan(),
        status_breakdown(&app.tasks.tasks())
    );
    Ok(())
}

async fn add_command(app: &App, input: TaskCreateInput) -> Result<()> {
    let task = app.tasks.create(input).await?;
    println!("{} Created task {}", "✓".green().bold(), short_id(&task).cyan());
    print_task(&task);
    Ok(())
}

async fn update_command(app: &App, id: &str, input: TaskUpdateInput) -> Result<()> {
    let id = app.resolve_id(id)?;
    let task = app.tasks.update(&id, input).await?;
    println!("{} Updated task {}", "✓".green().bold(), short_id(&task).cyan());
    print_task(&task);
    Ok(())
}

async fn done_command(app: &App, id: &str) -> Result<()> {
    let id = app.resolve_id(id)?;
    let task = app.tasks.toggle_complete(&id).await?;
    let verb = if task.status == TaskStatus::Completed {
        "Completed"
    } else {
        "Reopened"
    };
    println!("{} {} {}", "✓".green().bold(), verb, task.title.bold());
    Ok(())
}

async fn delete_command(app: &App, id: &str, yes: bool) -> Result<()> {
    let id = app.resolve_id(id)?;
    let title = app
        .tasks
        .find(&id)
        .map(|task| task.title)
        .unwrap_or_else(|| id.to_string());

    if !yes {
        let confirmed = Confirm::new(&format!("Delete '{}'?", title))
            .with_default(false)
            .prompt()?;
        if !confirmed {
            println!("{}", "Cancelled".yellow());
            return Ok(());
        }
    }

    app.tasks.delete(&id).await?;
    println!("{} Deleted {}", "✓".green().bold(), title.bold());
    Ok(())
}
