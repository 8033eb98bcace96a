//! CLI for Maestro
//!
//! Command groups:
//! - `task`: create, list, get, watch, cancel, retry
//! - `mode`: list, current, switch, info, compare
//! - `project`: create, list, get, delete, init
//! - `status`: overview, stats, costs, health
//! - `config`: show, set, get, reset, path
//!
//! Exit codes: 0 success, 1 runtime failure, 2 misuse/validation.

use clap::{Parser, Subcommand};
use maestro_core::{App, AppConfig, Mode, OutputFormat, Result};
use std::sync::Arc;
use uuid::Uuid;

pub mod config;
pub mod mode;
pub mod project;
pub mod status;
pub mod task;

/// Maestro orchestrator CLI
#[derive(Parser, Debug)]
#[command(name = "maestro")]
#[command(about = "Mode-driven multi-agent development orchestrator")]
#[command(version)]
pub struct Cli {
    /// Emit JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage tasks
    #[command(subcommand)]
    Task(TaskCommands),
    /// Manage execution modes
    #[command(subcommand)]
    Mode(ModeCommands),
    /// Manage projects
    #[command(subcommand)]
    Project(ProjectCommands),
    /// Inspect orchestrator status
    #[command(subcommand)]
    Status(StatusCommands),
    /// Manage CLI configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Task subcommands
#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Submit a task and wait for it to finish
    Create {
        /// Natural-language task description
        description: String,
        /// Execution mode (SPEED, QUALITY, AUTONOMY, COST)
        #[arg(short, long)]
        mode: Option<Mode>,
        /// Priority 0-100, higher runs first
        #[arg(short, long)]
        priority: Option<u8>,
        /// Project name to attach the task to
        #[arg(long)]
        project: Option<String>,
        /// Stream events while the task runs
        #[arg(short, long)]
        watch: bool,
    },
    /// List known tasks
    List,
    /// Show one task with phases and results
    Get {
        /// Task id
        id: Uuid,
    },
    /// Stream events for a task until it finishes
    Watch {
        /// Task id
        id: Uuid,
    },
    /// Cancel a task
    Cancel {
        /// Task id
        id: Uuid,
    },
    /// Retry a failed task as a new submission
    Retry {
        /// Task id
        id: Uuid,
    },
}

/// Mode subcommands
#[derive(Subcommand, Debug)]
pub enum ModeCommands {
    /// List all modes with their headline settings
    List,
    /// Show the active mode
    Current,
    /// Switch the active mode
    Switch {
        /// Target mode
        mode: Mode,
    },
    /// Show one mode's full configuration
    Info {
        /// Mode to show
        mode: Mode,
    },
    /// Compare two modes side by side
    Compare {
        /// First mode
        a: Mode,
        /// Second mode
        b: Mode,
    },
}

/// Project subcommands
#[derive(Subcommand, Debug)]
pub enum ProjectCommands {
    /// Create a project
    Create {
        /// Project name
        name: String,
        /// Filesystem path
        #[arg(long)]
        path: Option<String>,
        /// Description
        #[arg(short, long)]
        description: Option<String>,
    },
    /// List projects
    List,
    /// Show one project
    Get {
        /// Project id
        id: Uuid,
    },
    /// Delete a project
    Delete {
        /// Project id
        id: Uuid,
    },
    /// Create a project for the configured project path
    Init,
}

/// Status subcommands
#[derive(Subcommand, Debug)]
pub enum StatusCommands {
    /// One-line overview
    Overview,
    /// Orchestrator statistics
    Stats,
    /// Cost report
    Costs {
        /// How many days to include
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
    /// Provider and store health
    Health,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Set a configuration key
    Set {
        /// Key (api_url, api_key, default_mode, output_format,
        /// project_path, max_workers, agent_cap)
        key: String,
        /// New value
        value: String,
    },
    /// Show one configuration value
    Get {
        /// Key to read
        key: String,
    },
    /// Reset the stored configuration to defaults
    Reset,
    /// Print the configuration file path
    Path,
}

/// Effective configuration: stored file, then environment overrides,
/// then the --json flag
fn effective_config(json: bool) -> AppConfig {
    let mut config = config::load().overlay_env();
    if json {
        config.output_format = OutputFormat::Json;
    }
    config
}

async fn build_app(config: AppConfig) -> Result<Arc<App>> {
    App::new(config, App::providers_from_env()).await
}

/// Run a parsed CLI invocation
pub async fn run(cli: Cli) -> Result<()> {
    let config = effective_config(cli.json);

    match cli.command {
        Commands::Config(cmd) => config::run(cmd, &config),
        Commands::Task(cmd) => {
            let app = build_app(config).await?;
            let result = task::run(cmd, &app).await;
            app.shutdown().await;
            result
        }
        Commands::Mode(cmd) => {
            let app = build_app(config).await?;
            let result = mode::run(cmd, &app).await;
            app.shutdown().await;
            result
        }
        Commands::Project(cmd) => {
            let app = build_app(config).await?;
            let result = project::run(cmd, &app).await;
            app.shutdown().await;
            result
        }
        Commands::Status(cmd) => {
            let app = build_app(config).await?;
            let result = status::run(cmd, &app).await;
            app.shutdown().await;
            result
        }
    }
}
