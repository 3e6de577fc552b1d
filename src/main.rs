use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use webpilot::cli::{self, OutputMode, PermissionsAction, RunOptions};
use webpilot::config::AgentConfig;
use webpilot::logging;
use webpilot::workflow::RunMode;

#[derive(Parser)]
#[command(name = "webpilot")]
#[command(about = "Run web-agent workflows under human supervision")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project directory holding .webpilot/config.toml (defaults to current)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Suppress normal output
    #[arg(long, global = true)]
    quiet: bool,

    /// Also write JSON logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow
    Run {
        /// Workflow file (.toml or .json)
        workflow: PathBuf,

        /// manual, interactive or autonomous
        #[arg(long, default_value = "manual")]
        mode: RunMode,

        /// Recorded page snapshot to run against
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Variable override, repeatable
        #[arg(long = "var", value_name = "KEY=VALUE", value_parser = cli::parse_var)]
        vars: Vec<(String, Value)>,

        /// Allow every permission prompt
        #[arg(long, short = 'y')]
        yes: bool,

        /// Emit events as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Validate a workflow without running
    Validate {
        /// Workflow file
        workflow: PathBuf,
    },

    /// Show what a workflow would do
    Describe {
        /// Workflow file
        workflow: PathBuf,
    },

    /// Manage stored workflow grants
    Permissions {
        #[command(subcommand)]
        action: PermissionsCommand,
    },
}

#[derive(Subcommand)]
enum PermissionsCommand {
    /// List stored grants
    List,
    /// Revoke the grant for a workflow
    Revoke { workflow_id: String },
    /// Remove every stored grant
    Clear,
}

impl From<PermissionsCommand> for PermissionsAction {
    fn from(command: PermissionsCommand) -> Self {
        match command {
            PermissionsCommand::List => PermissionsAction::List,
            PermissionsCommand::Revoke { workflow_id } => PermissionsAction::Revoke { workflow_id },
            PermissionsCommand::Clear => PermissionsAction::Clear,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_guard = logging::init_logging(cli.debug, cli.quiet, cli.log_file.as_deref())?;

    let project_dir = cli.dir.as_deref();
    let config = AgentConfig::load(project_dir)?;

    let code = match cli.command {
        Commands::Run {
            workflow,
            mode,
            snapshot,
            vars,
            yes,
            json,
        } => {
            let handler = cli::create_handler(OutputMode::from_flags(json, cli.quiet), cli.debug);
            let options = RunOptions {
                mode,
                snapshot,
                vars,
                assume_yes: yes,
            };
            cli::run_workflow(&workflow, options, &config, Arc::from(handler)).await?
        }

        Commands::Validate { workflow } => {
            let handler = cli::create_handler(OutputMode::Console, cli.debug);
            cli::validate_workflow(&workflow, &*handler)
        }

        Commands::Describe { workflow } => {
            let handler = cli::create_handler(OutputMode::Console, cli.debug);
            cli::describe_workflow(&workflow, &*handler)?
        }

        Commands::Permissions { action } => {
            let handler = cli::create_handler(OutputMode::Console, cli.debug);
            cli::permissions(action.into(), &config, &*handler)?
        }
    };

    if code != 0 {
        // exit skips destructors; flush the file log first
        drop(log_guard);
        std::process::exit(code);
    }
    Ok(())
}
