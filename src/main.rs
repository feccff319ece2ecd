// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! imagesaid: name images with a local vision model
//!
//! Command line front end over the workflow engine.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use imagesaid::config::{ConfigPatch, ConnectionState, EngineOptions};
use imagesaid::history::History;
use imagesaid::images::{format_duration, ImageEntry, ImageStatus};
use imagesaid::intake::collect_images;
use imagesaid::ollama::OllamaClient;
use imagesaid::renamer::FsRenamer;
use imagesaid::settings::JsonFileStore;
use imagesaid::templates::TemplatePatch;
use imagesaid::{ImagesaidError, Result, Workflow};

/// imagesaid CLI - AI image renamer
#[derive(Parser, Debug)]
#[command(name = "imagesaid")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Rename images with names suggested by a local vision model", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Settings file (JSON)
    #[arg(short, long, default_value = "imagesaid-settings.json", global = true)]
    settings: PathBuf,

    /// Rename history log (JSON lines)
    #[arg(long, default_value = "imagesaid_history.jsonl", global = true)]
    history: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Output format for results
    #[arg(long, global = true, default_value = "text", value_parser = ["text", "json", "jsonl"])]
    format: String,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Test the connection and refresh the model list
    Status,

    /// Vision model registry
    Models {
        #[command(subcommand)]
        action: ModelCommands,
    },

    /// Prompt templates
    Templates {
        #[command(subcommand)]
        action: TemplateCommands,
    },

    /// The active prompt
    Prompt {
        #[command(subcommand)]
        action: PromptCommands,
    },

    /// Name images and rename them
    Run {
        /// Image files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,

        /// Show suggestions without renaming
        #[arg(long)]
        dry_run: bool,
    },

    /// History and undo operations
    History {
        #[command(subcommand)]
        action: HistoryCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ModelCommands {
    /// List known models
    List,

    /// Fetch the model list from the backend
    Refresh,

    /// Allow a model to be selected
    Enable { name: String },

    /// Hide a model from selection
    Disable { name: String },

    /// Set the context length used with a model
    Context {
        name: String,

        #[arg(allow_hyphen_values = true)]
        length: i64,
    },

    /// Use a model for processing
    Default { name: String },
}

#[derive(Subcommand, Debug)]
enum TemplateCommands {
    /// List templates
    List,

    /// Create a template
    Add { name: String, content: String },

    /// Edit a template
    Update {
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        content: Option<String>,
    },

    /// Delete a template
    Delete { id: String },

    /// Make a template current; without an id, clear the selection
    Use { id: Option<String> },

    /// Save the active prompt into the current template, or as a new one
    Save {
        #[arg(long = "as")]
        name: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum PromptCommands {
    /// Print the active prompt
    Show,

    /// Replace the active prompt
    Set { text: String },
}

#[derive(Subcommand, Debug)]
enum HistoryCommands {
    /// List recent history entries
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "10")]
        count: usize,
    },

    /// Undo recent renames
    Undo {
        /// Number of renames to undo
        #[arg(short, long, default_value = "1")]
        count: usize,

        /// Dry run (show what would be undone)
        #[arg(long)]
        dry_run: bool,
    },

    /// Clear all history
    Clear {
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Change the endpoint or active model
    Set {
        #[arg(long)]
        endpoint: Option<String>,

        #[arg(long)]
        model: Option<String>,
    },

    /// Restore default settings
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let options = EngineOptions::default();
    let history = History::new(cli.history.clone());
    let workflow = Workflow::new(
        Arc::new(OllamaClient::new(&options)?),
        Arc::new(FsRenamer::with_history(history.clone())),
        Arc::new(JsonFileStore::new(&cli.settings)),
        &options,
    );

    let result = match cli.command {
        Commands::Status => run_status(&workflow).await,
        Commands::Models { action } => run_models_command(&workflow, action, &cli.format).await,
        Commands::Templates { action } => run_templates_command(&workflow, action, &cli.format),
        Commands::Prompt { action } => run_prompt_command(&workflow, action),
        Commands::Run { paths, recursive, dry_run } => {
            run_batch(&workflow, &paths, recursive, dry_run, &cli.format).await
        }
        Commands::History { action } => run_history_command(&history, action),
        Commands::Config { action } => run_config_command(&workflow, action),
    };

    workflow.flush_settings()?;
    result
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Show connection state and models
async fn run_status(workflow: &Workflow) -> Result<()> {
    let check = workflow.connect_and_discover().await;
    let config = workflow.config();

    println!("imagesaid v{} Status", env!("CARGO_PKG_VERSION"));
    println!("======================");
    println!("Endpoint: {}", config.api_endpoint);
    match check.state {
        ConnectionState::Success => println!("Ollama: Running"),
        state => println!(
            "Ollama: {} - {}",
            state,
            check.message.as_deref().unwrap_or("no response")
        ),
    }
    if let Some(e) = &check.discovery_error {
        println!("  Error listing models: {}", e);
    }

    println!("\nModels:");
    print_models(workflow);

    println!("\nActive model: {}", config.active_model_name);
    println!(
        "Context length: {}",
        config.available_models.active_context_length()
    );
    Ok(())
}

fn print_models(workflow: &Workflow) {
    let registry = workflow.config().available_models;
    if registry.is_empty() {
        println!("  (none - run `imagesaid models refresh`)");
        return;
    }
    for model in registry.iter() {
        let marker = if model.is_default { "→" } else { " " };
        let enabled = if model.enabled { "" } else { " [disabled]" };
        println!(
            "  {} {} (ctx {}) {}{}",
            marker,
            model.name,
            model.custom_context_length,
            model.summary(),
            enabled
        );
    }
}

async fn run_models_command(workflow: &Workflow, action: ModelCommands, format: &str) -> Result<()> {
    match action {
        ModelCommands::List => {
            if format == "text" {
                print_models(workflow);
            } else {
                print_json(&workflow.config().available_models)?;
            }
        }
        ModelCommands::Refresh => {
            let count = workflow.discover_models().await?;
            println!("Found {} models", count);
        }
        ModelCommands::Enable { name } => {
            workflow.set_model_enabled(&name, true)?;
            println!("Enabled {}", name);
        }
        ModelCommands::Disable { name } => {
            workflow.set_model_enabled(&name, false)?;
            println!("Disabled {}", name);
        }
        ModelCommands::Context { name, length } => {
            workflow.set_model_context_length(&name, length)?;
            println!("{}: context length {}", name, length);
        }
        ModelCommands::Default { name } => {
            let registry = workflow.config().available_models;
            if registry.get(&name).is_some() && !registry.is_enabled(&name) {
                return Err(ImagesaidError::Validation(format!(
                    "{} is disabled; enable it first",
                    name
                )));
            }
            workflow.set_default_model(&name)?;
            println!("Default model: {}", name);
        }
    }
    Ok(())
}

fn run_templates_command(workflow: &Workflow, action: TemplateCommands, format: &str) -> Result<()> {
    match action {
        TemplateCommands::List => {
            let templates = workflow.templates();
            if format != "text" {
                return print_json(&templates);
            }
            let current = workflow.current_template_id();
            for template in templates {
                let marker = if current.as_deref() == Some(template.id.as_str()) { "→" } else { " " };
                println!("  {} {} [{}]", marker, template.name, template.id);
            }
        }
        TemplateCommands::Add { name, content } => {
            let template = workflow.add_template(&name, &content)?;
            println!("Created template {} ({})", template.name, template.id);
        }
        TemplateCommands::Update { id, name, content } => {
            let template = workflow.update_template(&id, TemplatePatch { name, content })?;
            println!("Updated template {}", template.name);
        }
        TemplateCommands::Delete { id } => {
            let removed = workflow.delete_template(&id)?;
            println!("Deleted template {}", removed.name);
        }
        TemplateCommands::Use { id } => {
            workflow.set_current_template(id.as_deref())?;
            match id {
                Some(id) => println!("Using template {}", id),
                None => println!("No template selected"),
            }
        }
        TemplateCommands::Save { name } => {
            let template = match name {
                Some(name) => workflow.save_prompt_as(&name)?,
                None => workflow.save_prompt_to_current()?,
            };
            println!("Saved prompt to template {} ({})", template.name, template.id);
        }
    }
    Ok(())
}

fn run_prompt_command(workflow: &Workflow, action: PromptCommands) -> Result<()> {
    match action {
        PromptCommands::Show => println!("{}", workflow.prompt()),
        PromptCommands::Set { text } => {
            workflow.set_prompt(&text);
            println!("Prompt updated");
        }
    }
    Ok(())
}

/// Collect images, name them, and rename unless this is a dry run
async fn run_batch(
    workflow: &Workflow,
    paths: &[PathBuf],
    recursive: bool,
    dry_run: bool,
    format: &str,
) -> Result<()> {
    let images = collect_images(paths, recursive);
    if images.is_empty() {
        println!("No images found");
        return Ok(());
    }

    let check = workflow.connect_and_discover().await;
    if check.state != ConnectionState::Success {
        return Err(ImagesaidError::Connectivity(
            check.message.unwrap_or_else(|| "backend unreachable".to_string()),
        ));
    }
    if let Some(e) = check.discovery_error {
        warn!("Continuing with the saved model list: {}", e);
    }

    workflow.add_images(images);
    let report = match workflow.start_processing().await {
        Some(report) => report,
        None => return Ok(()),
    };

    let entries = workflow.images();
    match format {
        "json" => print_json(&entries)?,
        "jsonl" => {
            for entry in &entries {
                println!("{}", serde_json::to_string(entry)?);
            }
        }
        _ => {
            for entry in &entries {
                print_entry(entry);
            }
            println!(
                "\n{} named, {} failed in {}",
                report.completed,
                report.failed,
                format_duration(report.total_elapsed_millis)
            );
        }
    }

    if dry_run {
        warn!("DRY RUN MODE - files were not renamed");
        return Ok(());
    }

    let renamed = workflow.apply_renames().await?;
    info!("Renamed {} files", renamed);
    Ok(())
}

fn print_entry(entry: &ImageEntry) {
    match entry.status {
        ImageStatus::Completed => println!(
            "{}: {} ({})",
            entry.source_path.display(),
            entry.suggested_name,
            format_duration(entry.elapsed_millis.unwrap_or(0))
        ),
        _ => eprintln!(
            "Error naming {}: {}",
            entry.source_path.display(),
            entry.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

fn run_history_command(history: &History, action: HistoryCommands) -> Result<()> {
    match action {
        HistoryCommands::List { count } => {
            let entries = history.get_recent(count)?;
            println!("Recent history ({} entries):", entries.len());
            for entry in entries {
                let status = if entry.undone { "[UNDONE]" } else { "" };
                println!(
                    "  {} {} -> {} {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M"),
                    entry.original_path.display(),
                    entry.new_path.display(),
                    status
                );
            }
        }
        HistoryCommands::Undo { count, dry_run } => {
            let undone = history.undo_recent(count, dry_run)?;
            if undone.is_empty() {
                println!("No renames to undo");
            }
            let verb = if dry_run { "Would undo" } else { "Undone" };
            for entry in undone {
                println!(
                    "{}: {} -> {}",
                    verb,
                    entry.new_path.display(),
                    entry.original_path.display()
                );
            }
        }
        HistoryCommands::Clear { force } => {
            if !force {
                eprintln!("Use --force to confirm clearing history");
                return Ok(());
            }
            history.clear()?;
            println!("History cleared");
        }
    }
    Ok(())
}

fn run_config_command(workflow: &Workflow, action: ConfigCommands) -> Result<()> {
    match action {
        ConfigCommands::Show => print_json(&workflow.config())?,
        ConfigCommands::Set { endpoint, model } => {
            let config = workflow.update_config(ConfigPatch {
                api_endpoint: endpoint,
                active_model_name: model,
            });
            println!("Endpoint: {}", config.api_endpoint);
            println!("Active model: {}", config.active_model_name);
        }
        ConfigCommands::Reset => {
            workflow.reset_all_settings();
            println!("Settings reset to defaults");
        }
    }
    Ok(())
}
