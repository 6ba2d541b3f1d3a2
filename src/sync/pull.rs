use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::linear::{IssueTracker, TeamIssue};
use crate::manifest::store;

/// Largest page the team issues query asks for.
pub const PAGE_SIZE: usize = 50;

/// Flat manifest written for every pulled issue. Key order is the file's key order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PulledIssue {
  pub team_key: String,
  pub identifier: String,
  pub title: String,
  pub description: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub state: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub priority: Option<u8>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub assignee_email: Option<String>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub labels: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub branch: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub project_name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub project_id: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
  value.filter(|v| !v.trim().is_empty())
}

impl PulledIssue {
  pub fn from_remote(team_key: &str, issue: TeamIssue) -> Self {
    let priority = issue
      .priority
      .filter(|p| (0.0..=4.0).contains(p))
      .map(|p| p.round() as u8);
    let (project_name, project_id) = match issue.project {
      Some(project) => (non_empty(Some(project.name)), non_empty(Some(project.id))),
      None => (None, None),
    };

    Self {
      team_key: team_key.to_string(),
      identifier: issue.identifier,
      title: issue.title,
      description: issue.description.unwrap_or_default(),
      state: issue.state.and_then(|s| non_empty(Some(s.name))),
      priority,
      assignee_email: issue.assignee.and_then(|a| non_empty(a.email)),
      labels: issue.labels.nodes.into_iter().map(|l| l.name).collect(),
      branch: non_empty(issue.branch_name),
      project_name,
      project_id,
    }
  }

  fn file_name(&self) -> String {
    let mut timestamp = Local::now().format("%Y%m%d_%H%M%S%f").to_string();
    timestamp.truncate(17);
    format!(
      "{timestamp}_{}_{}.yaml",
      self.identifier.to_lowercase(),
      store::title_slug(&self.title)
    )
  }
}

/// Pages through a team's issues until `limit` is reached or the cursor runs out.
pub async fn fetch_team_issues(
  tracker: &dyn IssueTracker,
  team_key: &str,
  limit: usize,
) -> Result<Vec<TeamIssue>> {
  let mut issues = Vec::new();
  let mut cursor: Option<String> = None;

  while issues.len() < limit {
    let first = PAGE_SIZE.min(limit - issues.len());
    let Some(page) = tracker
      .fetch_team_issues_page(team_key, first, cursor.as_deref())
      .await?
    else {
      warn!("team {team_key} not found");
      break;
    };
    issues.extend(page.issues);

    if !page.page_info.has_next_page {
      break;
    }
    match page.page_info.end_cursor {
      Some(next) => cursor = Some(next),
      None => break,
    }
  }

  issues.truncate(limit);
  Ok(issues)
}

#[derive(Debug, Default, PartialEq)]
pub struct PullReport {
  pub written: Vec<PathBuf>,
  pub overwritten: usize,
}

/// `pull`: one flat manifest per remote issue under `output_dir`.
///
/// A manifest already carrying the pulled identifier is rewritten in place.
pub async fn run_pull(
  tracker: &dyn IssueTracker,
  team_keys: &[String],
  output_dir: &Path,
  limit: usize,
) -> Result<PullReport> {
  std::fs::create_dir_all(output_dir)?;
  let existing = store::index_by_identifier(output_dir)?;
  let mut report = PullReport::default();

  for team_key in team_keys {
    info!("fetching issues for team {team_key}");
    let issues = fetch_team_issues(tracker, team_key, limit).await?;
    if issues.is_empty() {
      info!("no issues found for team {team_key}");
      continue;
    }

    let count = issues.len();
    for issue in issues {
      let pulled = PulledIssue::from_remote(team_key, issue);
      let path = match existing.get(&pulled.identifier.to_uppercase()) {
        Some(path) => {
          report.overwritten += 1;
          path.clone()
        }
        None => output_dir.join(pulled.file_name()),
      };
      store::write_document(&path, &serde_yaml::to_value(&pulled)?)?;
      report.written.push(path);
    }
    info!("saved {count} issue(s) for team {team_key} to {}", output_dir.display());
  }

  Ok(report)
}
