use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;
use tracing::info;

use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::git::worktree;
use crate::manifest::{dedupe_case_insensitive, store, MAX_PRIORITY};

#[derive(Debug, Clone, Default)]
pub struct NewTicket {
  pub title: String,
  pub description: Option<String>,
  pub team_key: String,
  pub priority: Option<u8>,
  pub assignee_email: Option<String>,
  pub labels: Vec<String>,
}

#[derive(Debug, Serialize)]
struct TicketFile<'a> {
  title: &'a str,
  description: &'a str,
  team_key: &'a str,
  branch: &'a str,
  worktree: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  priority: Option<u8>,
  #[serde(skip_serializing_if = "Option::is_none")]
  assignee_email: Option<&'a str>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddedTicket {
  pub path: PathBuf,
  pub branch: String,
  pub worktree: PathBuf,
}

impl NewTicket {
  fn validate(&self) -> Result<()> {
    if self.title.trim().is_empty() {
      return Err(SyncError::Validation("title must be a non-empty string".into()));
    }
    if self.team_key.trim().is_empty() {
      return Err(SyncError::Validation("team_key must be a non-empty string".into()));
    }
    if let Some(p) = self.priority.filter(|p| *p > MAX_PRIORITY) {
      return Err(SyncError::Validation(format!(
        "priority must be between 0 and {MAX_PRIORITY}, got {p}"
      )));
    }
    Ok(())
  }
}

/// Writes the flat manifest for a ticket whose branch and worktree already exist.
pub fn write_ticket(
  tasks_dir: &Path,
  ticket: &NewTicket,
  branch: &str,
  worktree: &Path,
) -> Result<PathBuf> {
  std::fs::create_dir_all(tasks_dir)?;
  let timestamp = Local::now().format("%Y%m%d_%H%M%S");
  let path = tasks_dir.join(format!(
    "{timestamp}_{}.yaml",
    store::title_slug(&ticket.title)
  ));

  let file = TicketFile {
    title: ticket.title.trim(),
    description: ticket.description.as_deref().unwrap_or(""),
    team_key: ticket.team_key.trim(),
    branch,
    worktree: worktree.display().to_string(),
    priority: ticket.priority,
    assignee_email: ticket.assignee_email.as_deref().filter(|a| !a.trim().is_empty()),
    labels: dedupe_case_insensitive(&ticket.labels),
  };
  store::write_document(&path, &serde_yaml::to_value(&file)?)?;
  Ok(path)
}

/// `add`: branch + worktree for the ticket, then its manifest in the tasks dir.
pub fn run_add(config: &Config, ticket: &NewTicket, start: &Path) -> Result<AddedTicket> {
  ticket.validate()?;
  std::fs::create_dir_all(config.tasks_dir())?;

  let (branch, worktree) = worktree::create_branch_and_worktree(
    &ticket.title,
    start,
    &config.worktrees_dir(),
    config.base_branch(),
  )?;
  let path = write_ticket(&config.tasks_dir(), ticket, &branch, &worktree)?;
  info!("ticket written to {}", path.display());

  Ok(AddedTicket {
    path,
    branch,
    worktree,
  })
}
