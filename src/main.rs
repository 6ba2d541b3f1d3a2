mod add;
mod check;
mod config;
mod error;
mod git;
mod linear;
mod list;
mod manifest;
mod sync;
mod team;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use crate::add::NewTicket;
use crate::check::gh::GhRunner;
use crate::config::Config;
use crate::error::Result;
use crate::linear::client::LinearClient;
use crate::list::ListOptions;
use crate::sync::push::PushOptions;

#[derive(Parser)]
#[command(
  name = "linear-manager",
  about = "Sync YAML-defined issues with Linear"
)]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Create or update Linear issues from YAML manifests
  #[command(visible_alias = "sync")]
  Push {
    /// Manifest file or directory (defaults to the tasks directory)
    path: Option<PathBuf>,
    /// Validate and resolve without writing to Linear
    #[arg(long)]
    dry_run: bool,
    /// Move issues marked `complete: true` to the team's completed state
    #[arg(long)]
    mark_done: bool,
  },
  /// Save a team's Linear issues as local YAML manifests
  Pull {
    /// Team keys to pull (e.g. ENG PROD)
    #[arg(long, required = true, num_args = 1..)]
    team_keys: Vec<String>,
    /// Output directory (defaults to the tasks directory)
    #[arg(long)]
    output: Option<PathBuf>,
    /// Maximum issues per team
    #[arg(long)]
    limit: Option<usize>,
  },
  /// Display a summary table of issues defined in manifests
  List {
    /// Manifest file or directory (defaults to the tasks directory)
    path: Option<PathBuf>,
    /// Include the first line of each description
    #[arg(short, long)]
    verbose: bool,
    /// One table per project
    #[arg(long)]
    by_project: bool,
    /// Order by blockers and show a Blocked By column
    #[arg(long)]
    by_block: bool,
    /// Show done, cancelled and completed issues
    #[arg(long)]
    include_done: bool,
  },
  /// Run local validations against manifests
  Check {
    #[command(subcommand)]
    command: CheckCommands,
  },
  /// Add a new ticket with its own branch and worktree
  Add {
    /// Ticket title
    title: String,
    /// Ticket description
    #[arg(short, long)]
    description: Option<String>,
    /// Team key (e.g. ENG, PROD)
    #[arg(short, long, required = true)]
    team_key: String,
    /// Priority (0=None, 1=Urgent, 2=High, 3=Medium, 4=Low)
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=4))]
    priority: Option<u8>,
    /// Assignee email address
    #[arg(short, long)]
    assignee: Option<String>,
    /// Labels for the ticket
    #[arg(short, long, num_args = 1..)]
    labels: Vec<String>,
  },
}

#[derive(Subcommand)]
enum CheckCommands {
  /// Record GitHub check status for each issue branch
  Tests {
    /// Manifest file or directory (defaults to the tasks directory)
    path: Option<PathBuf>,
    /// Concurrent manifests to check
    #[arg(long)]
    workers: Option<usize>,
  },
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    )
    .init();

  let cli = Cli::parse();

  match run(cli).await {
    Ok(true) => {}
    Ok(false) => std::process::exit(1),
    Err(e) => {
      error!("{e}");
      std::process::exit(1);
    }
  }
}

/// Returns `Ok(false)` when the command ran but some of its items failed.
async fn run(cli: Cli) -> Result<bool> {
  let config = Config::load()?;

  match cli.command {
    Commands::Push {
      path,
      dry_run,
      mark_done,
    } => {
      cmd_push(
        &config,
        path,
        PushOptions {
          dry_run,
          mark_done,
        },
      )
      .await
    }
    Commands::Pull {
      team_keys,
      output,
      limit,
    } => cmd_pull(&config, &team_keys, output, limit).await,
    Commands::List {
      path,
      verbose,
      by_project,
      by_block,
      include_done,
    } => cmd_list(
      &config,
      path,
      ListOptions {
        verbose,
        by_project,
        by_block,
        include_done,
      },
    ),
    Commands::Check {
      command: CheckCommands::Tests { path, workers },
    } => cmd_check_tests(&config, path, workers).await,
    Commands::Add {
      title,
      description,
      team_key,
      priority,
      assignee,
      labels,
    } => cmd_add(
      &config,
      NewTicket {
        title,
        description,
        team_key,
        priority,
        assignee_email: assignee,
        labels,
      },
    ),
  }
}

async fn cmd_push(config: &Config, path: Option<PathBuf>, opts: PushOptions) -> Result<bool> {
  let path = config.manifest_path_or_default(path.as_deref());
  let client = LinearClient::new(config)?;

  if opts.dry_run {
    info!("dry run: no changes will be written to Linear");
  }
  let report = sync::push::run_push(&client, &path, &opts).await?;

  for (file, reason) in &report.failed {
    println!("✗ {}: {reason}", file.display());
  }
  println!("push complete: {report}");
  Ok(report.is_success())
}

async fn cmd_pull(
  config: &Config,
  team_keys: &[String],
  output: Option<PathBuf>,
  limit: Option<usize>,
) -> Result<bool> {
  let output = output.unwrap_or_else(|| config.tasks_dir());
  let limit = limit.unwrap_or(config.settings.pull_limit);
  let client = LinearClient::new(config)?;

  let report = sync::pull::run_pull(&client, team_keys, &output, limit).await?;
  println!(
    "pulled {} issue(s) into {} ({} updated in place)",
    report.written.len(),
    output.display(),
    report.overwritten
  );
  Ok(true)
}

fn cmd_list(config: &Config, path: Option<PathBuf>, options: ListOptions) -> Result<bool> {
  let path = config.manifest_path_or_default(path.as_deref());
  println!("{}", list::run_list(&path, options)?);
  Ok(true)
}

async fn cmd_check_tests(config: &Config, path: Option<PathBuf>, workers: Option<usize>) -> Result<bool> {
  let path = config.manifest_path_or_default(path.as_deref());
  let workers = workers.unwrap_or(config.settings.check_workers);

  let report = check::run_check_tests(&path, workers, Arc::new(GhRunner)).await?;
  if report.manifests.is_empty() && report.join_errors == 0 {
    println!("No YAML files found in {}", path.display());
    return Ok(true);
  }
  check::print_report(&report);
  Ok(report.error_count() == 0)
}

fn cmd_add(config: &Config, ticket: NewTicket) -> Result<bool> {
  let cwd = std::env::current_dir()?;
  let added = add::run_add(config, &ticket, &cwd)?;

  println!("✓ Ticket created successfully:");
  println!("  File: {}", added.path.display());
  println!("  Title: {}", ticket.title);
  println!("  Team: {}", ticket.team_key);
  println!("  Branch: {}", added.branch);
  println!("  Worktree: {}", added.worktree.display());
  Ok(true)
}
