// ABOUTME: CLI commands for signing in and managing the account
// ABOUTME: Email/password and Google sign-in, sign-up, sign-out, password reset, and profile

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::*;
use inquire::{Password, PasswordDisplayMode, Text};
use taskmaster_auth::{OAuthProvider, SignUpOutcome};
use taskmaster_cli::display::print_identity;
use taskmaster_cli::App;
use taskmaster_core::ProfileFields;

/// How long to wait for the browser to come back from the provider
const REDIRECT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Sign in with email and password
    Login {
        #[arg(short, long)]
        email: Option<String>,
    },
    /// Create an account
    Signup {
        #[arg(short, long)]
        email: Option<String>,
        /// Display name
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Sign in with Google in the browser
    Google,
    /// Sign out on this machine
    Logout,
    /// Email a password reset link
    ResetPassword {
        #[arg(short, long)]
        email: Option<String>,
    },
    /// Show who is signed in
    Whoami,
    /// Change your display name
    Profile {
        #[arg(short, long)]
        name: String,
    },
}

impl AuthCommands {
    pub async fn execute(&self, app: &App) -> Result<()> {
        match self {
            AuthCommands::Login { email } => login_command(app, email.as_deref()).await,
            AuthCommands::Signup { email, name } => {
                signup_command(app, email.as_deref(), name.as_deref()).await
            }
            AuthCommands::Google => google_command(app).await,
            AuthCommands::Logout => logout_command(app).await,
            AuthCommands::ResetPassword { email } => {
                reset_password_command(app, email.as_deref()).await
            }
            AuthCommands::Whoami => whoami_command(app),
            AuthCommands::Profile { name } => profile_command(app, name).await,
        }
    }
}

fn prompt_email(email: Option<&str>) -> Result<String> {
    match email {
        Some(email) => Ok(email.to_string()),
        None => Text::new("Email:").prompt().context("No email entered"),
    }
}

fn prompt_password(confirm: bool) -> Result<String> {
    let prompt = Password::new("Password:").with_display_mode(PasswordDisplayMode::Masked);
    let prompt = if confirm {
        prompt.with_custom_confirmation_message("Repeat password:")
    } else {
        prompt.without_confirmation()
    };
    prompt.prompt().context("No password entered")
}

async fn login_command(app: &App, email: Option<&str>) -> Result<()> {
    let email = prompt_email(email)?;
    let password = prompt_password(false)?;

    let session = app.sessions.sign_in(&email, &password).await?;
    print_identity(session.identity());
    Ok(())
}

async fn signup_command(app: &App, email: Option<&str>, name: Option<&str>) -> Result<()> {
    let email = prompt_email(email)?;
    let name = match name {
        Some(name) => name.to_string(),
        None => Text::new("Name:").prompt().context("No name entered")?,
    };
    let password = prompt_password(true)?;

    match app.sessions.sign_up(&email, &password, &name).await? {
        SignUpOutcome::SignedIn(session) => {
            println!("{} Account created", "✓".green().bold());
            print_identity(session.identity());
        }
        SignUpOutcome::PendingVerification { email } => {
            println!("{} Account created", "✓".green().bold());
            println!(
                "Check {} for a confirmation link, then run {}",
                email.bold(),
                "taskmaster auth login".cyan()
            );
        }
    }
    Ok(())
}

async fn google_command(app: &App) -> Result<()> {
    app.sessions
        .sign_in_with_provider(OAuthProvider::Google)
        .await?;
    println!("{}", "Complete the sign-in in your browser…".dimmed());

    let mut state = app.sessions.subscribe();
    let signed_in = tokio::time::timeout(
        REDIRECT_TIMEOUT,
        state.wait_for(|state| state.is_authenticated()),
    )
    .await;
    match signed_in {
        Ok(Ok(state)) => {
            if let Some(identity) = state.identity() {
                print_identity(identity);
            }
            Ok(())
        }
        Ok(Err(_)) => bail!("Sign-in was interrupted"),
        Err(_) => bail!("Timed out waiting for the browser sign-in"),
    }
}

async fn logout_command(app: &App) -> Result<()> {
    if !app.sessions.is_authenticated() {
        println!("{}", "Not signed in".yellow());
        return Ok(());
    }

    let result = app.sessions.sign_out().await;
    println!("{} Signed out", "✓".green().bold());
    if let Err(e) = result {
        eprintln!(
            "{} The server could not be told ({}); the session was removed from this machine anyway",
            "!".yellow().bold(),
            e
        );
    }
    Ok(())
}

async fn reset_password_command(app: &App, email: Option<&str>) -> Result<()> {
    let email = prompt_email(email)?;
    app.sessions.reset_password(&email).await?;
    println!(
        "{} If an account exists for {}, a reset link is on its way",
        "✓".green().bold(),
        email.bold()
    );
    Ok(())
}

fn whoami_command(app: &App) -> Result<()> {
    match app.sessions.identity() {
        Some(identity) => print_identity(&identity),
        None => println!("{}", "Not signed in".yellow()),
    }
    Ok(())
}

async fn profile_command(app: &App, name: &str) -> Result<()> {
    app.require_identity()?;
    let identity = app
        .sessions
        .update_profile(ProfileFields::with_name(name))
        .await?;
    println!("{} Profile updated", "✓".green().bold());
    print_identity(&identity);
    Ok(())
}
