use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::process;

mod cli;

use cli::auth::AuthCommands;
use cli::tasks::TasksCommands;
use taskmaster_cli::{init_tracing, App};
use taskmaster_config::BackendConfig;

#[derive(Parser)]
#[command(name = "taskmaster")]
#[command(about = "Task Master - personal task tracking synced to your account")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in, sign up, and manage your account
    #[command(subcommand)]
    Auth(AuthCommands),
    /// List and change your tasks
    #[command(subcommand)]
    Tasks(TasksCommands),
    /// Manage the backend configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write the backend URL and key to the config file
    Init {
        /// Supabase project URL
        #[arg(long)]
        url: String,
        /// Supabase anonymous (public) key
        #[arg(long)]
        anon_key: String,
    },
    /// Show the effective configuration
    Show,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    if let Err(e) = handle_command(cli.command).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

async fn handle_command(command: Commands) -> Result<()> {
    match command {
        Commands::Config(command) => handle_config_command(command),
        Commands::Auth(command) => {
            let app = connect().await?;
            command.execute(&app).await
        }
        Commands::Tasks(command) => {
            let app = connect().await?;
            command.execute(&app).await
        }
    }
}

async fn connect() -> Result<App> {
    let config = BackendConfig::load().context(
        "Backend not configured. Run `taskmaster config init` or set TASKMASTER_SUPABASE_URL",
    )?;
    App::connect(&config).await
}

fn handle_config_command(command: ConfigCommands) -> Result<()> {
    let path = BackendConfig::config_path();
    match command {
        ConfigCommands::Init { url, anon_key } => {
            let mut config = BackendConfig::from_file(&path)?;
            config.project_url = url;
            config.anon_key = anon_key;
            config.validate()?;
            config.save(&path)?;
            println!(
                "{} Saved configuration to {}",
                "✓".green().bold(),
                path.display()
            );
        }
        ConfigCommands::Show => {
            let config = BackendConfig::load()?;
            println!("{} {}", "Config file:".dimmed(), path.display());
            println!("{} {}", "Project URL:".dimmed(), config.project_url);
            println!("{} {}", "Tasks table:".dimmed(), config.tasks_table);
            if let Some(session_file) = &config.session_file {
                println!("{} {}", "Session file:".dimmed(), session_file.display());
            }
            println!(
                "{} {}",
                "OAuth callback port:".dimmed(),
                config.oauth_callback_port
            );
            println!(
                "{} {}s",
                "Request timeout:".dimmed(),
                config.request_timeout_secs
            );
        }
    }
    Ok(())
}
