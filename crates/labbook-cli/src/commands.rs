//! Command execution.

use std::io::{self, Write};
use std::path::Path;

use anyhow::{anyhow, bail, Context as _, Result};
use chrono::Utc;
use labbook_core::api::ProfilePicture;
use labbook_core::models::{Experiment, ProfileUpdate, RegisterRequest};
use labbook_core::utils::{format_date, format_optional};
use labbook_core::{ApiClient, ClaimSet, Config, EventBus, Session};
use tracing::{info, warn};

use crate::cli::{Command, ExperimentCommand, ExperimentFields, ProfileCommand, USAGE};
use crate::dashboard;

/// Environment variables consulted before prompting
const USERNAME_ENV: &str = "LABBOOK_USERNAME";
const PASSWORD_ENV: &str = "LABBOOK_PASSWORD";

pub struct Context {
    pub config: Config,
    pub session: Session,
    pub events: EventBus,
}

impl Context {
    /// Claims of the logged-in user, or an error telling them to log in.
    pub fn require_login(&self) -> Result<ClaimSet> {
        self.session
            .claims()
            .filter(|_| self.session.is_authenticated())
            .ok_or_else(|| anyhow!("Not logged in. Run `labbook login` first."))
    }

    pub fn client(&self) -> ApiClient {
        self.session.client()
    }
}

pub async fn run(command: Command, ctx: &mut Context) -> Result<()> {
    match command {
        Command::Help => println!("{}", USAGE),
        Command::Login { username } => login(ctx, username).await?,
        Command::Logout => {
            ctx.session.logout();
            println!("Logged out.");
        }
        Command::Whoami => whoami(ctx)?,
        Command::Register => register(ctx).await?,
        Command::Experiments(command) => experiments(ctx, command).await?,
        Command::Profile(command) => profile(ctx, command).await?,
        Command::Watch => dashboard::watch(ctx).await?,
    }
    Ok(())
}

// ============================================================================
// Prompts
// ============================================================================

fn prompt(label: &str, default: Option<&str>) -> Result<String> {
    match default {
        Some(d) => print!("{} [{}]: ", label, d),
        None => print!("{}: ", label),
    }
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();
    Ok(match (input.is_empty(), default) {
        (true, Some(d)) => d.to_string(),
        _ => input.to_string(),
    })
}

fn prompt_password(label: &str) -> Result<String> {
    Ok(rpassword::prompt_password(format!("{}: ", label))?)
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

// ============================================================================
// Auth
// ============================================================================

async fn login(ctx: &mut Context, username: Option<String>) -> Result<()> {
    let username = match username.or_else(|| env_value(USERNAME_ENV)) {
        Some(u) => u,
        None => prompt("Username", ctx.config.last_username.as_deref())?,
    };
    let password = match env_value(PASSWORD_ENV) {
        Some(p) => p,
        None => prompt_password("Password")?,
    };

    if username.is_empty() || password.is_empty() {
        bail!("Username and password required");
    }

    let claims = match ctx.session.login(&username, &password).await {
        Ok(claims) => claims,
        Err(e) => bail!(e.user_message()),
    };

    ctx.config.last_username = Some(username);
    if let Err(e) = ctx.config.save() {
        warn!(error = %e, "Failed to save config");
    }

    println!("Logged in as {}.", claims.display_name());
    Ok(())
}

fn whoami(ctx: &Context) -> Result<()> {
    let claims = ctx.require_login()?;
    println!("{} ({})", claims.display_name(), claims.subject);
    println!("Email: {}", format_optional(&claims.email, "N/A"));
    println!("Role:  {}", format_optional(&claims.role, "N/A"));
    match claims.time_until_expiry(Utc::now()) {
        Some(left) => println!("Session expires in {} minutes", left.num_minutes()),
        None => println!("Session does not expire"),
    }
    Ok(())
}

async fn register(ctx: &Context) -> Result<()> {
    let username = prompt("Username", None)?;
    let email = prompt("Email", None)?;
    let first_name = prompt("First name", None)?;
    let last_name = prompt("Last name", None)?;
    let password = prompt_password("Password")?;

    if [&username, &email, &first_name, &last_name, &password]
        .iter()
        .any(|v| v.is_empty())
    {
        bail!("All fields are required");
    }

    let request = RegisterRequest::new(username, email, password, first_name, last_name);
    if let Err(e) = ctx.client().register(&request).await {
        bail!("Registration failed: {}", e.user_message());
    }

    info!(user = %request.username, "Registered new account");
    println!("Registration successful. Run `labbook login` to sign in.");
    Ok(())
}

// ============================================================================
// Experiments
// ============================================================================

async fn experiments(ctx: &Context, command: ExperimentCommand) -> Result<()> {
    ctx.require_login()?;
    let client = ctx.client();

    match command {
        ExperimentCommand::List { search } => {
            if let Some(term) = search {
                ctx.events.set_search_term(term);
            }
            let experiments = client.list_experiments().await?;
            dashboard::render(&experiments, &ctx.events.search_term());
        }
        ExperimentCommand::Search { keyword, page, size } => {
            let result = client.search_experiments(&keyword, page, size).await?;
            for experiment in &result.content {
                println!("{}", dashboard::summary_line(experiment));
            }
            println!(
                "Page {} of {} ({} total)",
                result.number + 1,
                result.total_pages.max(1),
                result.total_elements
            );
        }
        ExperimentCommand::Show { id } => {
            let experiment = client.get_experiment(id).await?;
            print_experiment(&experiment);
        }
        ExperimentCommand::Create { fields } => {
            let mut experiment = Experiment::new(String::new());
            fields.apply(&mut experiment);
            let created = client.create_experiment(&experiment).await?;
            ctx.events.trigger_refresh();
            println!("Created experiment {}.", created.id.unwrap_or_default());
        }
        ExperimentCommand::Update { id, fields } => update(ctx, &client, id, fields).await?,
        ExperimentCommand::Status { id, status } => {
            let updated = client.update_experiment_status(id, status).await?;
            ctx.events.trigger_refresh();
            println!("{} is now {}.", updated.title_or_default(), updated.status);
        }
        ExperimentCommand::Delete { id } => {
            client.delete_experiment(id).await?;
            ctx.events.trigger_refresh();
            println!("Deleted experiment {}.", id);
        }
    }
    Ok(())
}

async fn update(ctx: &Context, client: &ApiClient, id: i64, fields: ExperimentFields) -> Result<()> {
    let mut experiment = client
        .get_experiment(id)
        .await
        .context("Failed to load experiment data")?;
    fields.apply(&mut experiment);
    if experiment.title.as_deref().map_or(true, |t| t.trim().is_empty()) {
        bail!("An experiment needs a title");
    }

    let updated = client.update_experiment(id, &experiment).await?;
    ctx.events.trigger_refresh();
    println!("Updated {}.", updated.title_or_default());
    Ok(())
}

fn print_experiment(experiment: &Experiment) {
    println!("{}", experiment.title_or_default());
    println!("Status: {}   Date: {}", experiment.status, experiment.formatted_date());
    if let Some(ref author) = experiment.user_full_name {
        println!("By: {}", author);
    }
    let sections = [
        ("Objective", &experiment.objective),
        ("Hypothesis", &experiment.hypothesis),
        ("Materials", &experiment.materials),
        ("Procedure", &experiment.procedure_steps),
        ("Observations", &experiment.observations),
        ("Results", &experiment.results),
        ("Conclusion", &experiment.conclusion),
    ];
    for (label, value) in sections {
        println!("\n{}:\n{}", label, format_optional(value, "N/A"));
    }
    if let Some(ref created) = experiment.created_at {
        println!("\nCreated: {}", format_date(created));
    }
    if let Some(ref updated) = experiment.updated_at {
        println!("Updated: {}", format_date(updated));
    }
}

// ============================================================================
// Profile
// ============================================================================

async fn profile(ctx: &Context, command: ProfileCommand) -> Result<()> {
    let claims = ctx.require_login()?;
    let client = ctx.client();

    match command {
        ProfileCommand::View => {
            println!("{}", claims.display_name());
            println!("Username: {}", claims.subject);
            println!("Email:    {}", format_optional(&claims.email, "N/A"));
            println!("Role:     {}", format_optional(&claims.role, "N/A"));
            println!("Picture:  {}", client.profile_picture_url(&claims.subject)?);
        }
        ProfileCommand::Edit {
            first_name,
            last_name,
            email,
        } => {
            let mut update = ProfileUpdate::from_claims(&claims);
            if first_name.is_none() && last_name.is_none() && email.is_none() {
                update.first_name = prompt("First name", Some(&update.first_name))?;
                update.last_name = prompt("Last name", Some(&update.last_name))?;
                update.email = prompt("Email", Some(&update.email))?;
            } else {
                update.first_name = first_name.unwrap_or(update.first_name);
                update.last_name = last_name.unwrap_or(update.last_name);
                update.email = email.unwrap_or(update.email);
            }

            if let Err(e) = client.update_user(&claims.subject, &update).await {
                warn!(error = %e, "Profile update failed");
                bail!("Failed to update profile. Please try again.");
            }
            ctx.session.refresh();
            println!("Profile updated.");
        }
        ProfileCommand::Picture { path } => {
            let picture = read_picture(&path)?;
            if let Err(e) = client.upload_profile_picture(&claims.subject, picture).await {
                bail!("Failed to upload profile picture: {}", e);
            }
            println!("Profile picture uploaded: {}", client.profile_picture_url(&claims.subject)?);
        }
    }
    Ok(())
}

fn read_picture(path: &Path) -> Result<ProfilePicture> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    if bytes.is_empty() {
        bail!("Please select a file to upload.");
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "picture".to_string());

    Ok(ProfilePicture {
        content_type: content_type_for(path).to_string(),
        file_name,
        bytes,
    })
}

fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}
