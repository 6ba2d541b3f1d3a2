//! Table rendering for `list`.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};

use crate::error::{Result, SyncError};
use crate::manifest::{self, normalize_key, store, IssueSpec};

const NO_PROJECT: &str = "No project";

/// Workflow state names grouped by how they are displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFamily {
  Done,
  Cancelled,
  InProgress,
  Review,
  Todo,
  NoState,
  Other,
}

impl StateFamily {
  pub fn of(state: Option<&str>) -> Self {
    let key = state.map(normalize_key).unwrap_or_default();
    match key.as_str() {
      "done" | "completed" | "complete" | "closed" | "resolved" => Self::Done,
      "canceled" | "cancelled" | "abandoned" | "declined" => Self::Cancelled,
      "in progress" | "wip" | "doing" | "progress" | "started" | "working" => Self::InProgress,
      "review" | "in review" | "feedback" | "blocked" | "qa" | "testing" => Self::Review,
      "" => Self::NoState,
      "todo" | "to do" | "backlog" | "triage" | "planned" | "ready" => Self::Todo,
      _ => Self::Other,
    }
  }

  pub fn symbol(self) -> &'static str {
    match self {
      Self::Done => "[x]",
      Self::Cancelled => "✖",
      Self::InProgress => "→",
      Self::Review => "⧖",
      Self::Todo | Self::NoState => "[ ]",
      Self::Other => "○",
    }
  }

  pub fn color(self) -> Color {
    match self {
      Self::Done => Color::Green,
      Self::Cancelled => Color::Red,
      Self::InProgress => Color::Cyan,
      Self::Review => Color::Magenta,
      Self::Todo | Self::NoState => Color::Yellow,
      Self::Other => Color::Blue,
    }
  }
}

/// Text of the Status column, e.g. `→ In Progress` or `[x] Done ☑`.
pub fn status_text(issue: &IssueSpec) -> String {
  let state = issue.state.as_deref().map(str::trim).filter(|s| !s.is_empty());
  let family = StateFamily::of(state);
  let label = match state {
    Some(state) => state,
    None => "No state",
  };
  let mut text = format!("{} {label}", family.symbol());
  if issue.complete {
    text.push_str(" ☑");
  }
  text
}

/// Done, cancelled or flagged complete.
pub fn is_finished(issue: &IssueSpec) -> bool {
  issue.complete
    || matches!(
      StateFamily::of(issue.state.as_deref()),
      StateFamily::Done | StateFamily::Cancelled
    )
}

fn first_line(text: &str) -> &str {
  text.trim().lines().next().unwrap_or("")
}

/// Issues whose blockers are absent or already placed come first, keeping input order.
/// Whatever remains (cycles) is appended as-is.
pub fn dependency_order<'a>(issues: &[&'a IssueSpec]) -> Vec<&'a IssueSpec> {
  let present: HashSet<String> = issues.iter().map(|i| normalize_key(&i.title)).collect();
  let mut placed: HashSet<String> = HashSet::new();
  let mut remaining: Vec<&IssueSpec> = issues.to_vec();
  let mut ordered = Vec::with_capacity(issues.len());

  loop {
    let ready = remaining.iter().position(|issue| {
      issue.blocked_by.iter().all(|blocker| {
        let key = normalize_key(blocker);
        !present.contains(&key) || placed.contains(&key)
      })
    });
    let Some(index) = ready else { break };
    let issue = remaining.remove(index);
    placed.insert(normalize_key(&issue.title));
    ordered.push(issue);
  }

  ordered.extend(remaining);
  ordered
}

/// Groups by `project_name`, alphabetically, with issues lacking one last.
pub fn group_by_project<'a>(issues: &[&'a IssueSpec]) -> Vec<(String, Vec<&'a IssueSpec>)> {
  let mut named: BTreeMap<String, Vec<&IssueSpec>> = BTreeMap::new();
  let mut unassigned = Vec::new();
  for issue in issues {
    match issue.project_name.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
      Some(project) => named.entry(project.to_string()).or_default().push(*issue),
      None => unassigned.push(*issue),
    }
  }
  let mut groups: Vec<_> = named.into_iter().collect();
  if !unassigned.is_empty() {
    groups.push((NO_PROJECT.to_string(), unassigned));
  }
  groups
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ListOptions {
  pub verbose: bool,
  pub by_project: bool,
  pub by_block: bool,
  pub include_done: bool,
}

pub struct IssueTable {
  use_colors: bool,
  options: ListOptions,
}

impl IssueTable {
  pub fn new(options: ListOptions) -> Self {
    Self {
      use_colors: supports_color(),
      options,
    }
  }

  pub fn with_colors(options: ListOptions, use_colors: bool) -> Self {
    Self { use_colors, options }
  }

  fn headers(&self) -> Vec<&'static str> {
    let mut headers = vec!["Title", "Branch", "Worktree"];
    if self.options.verbose {
      headers.push("Description");
    }
    if self.options.by_block {
      headers.push("Blocked By");
    }
    headers.push("Status");
    headers
  }

  pub fn render(&self, issues: &[&IssueSpec]) -> String {
    let mut table = Table::new();
    table
      .load_preset(presets::UTF8_FULL)
      .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(
      self
        .headers()
        .into_iter()
        .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
    );

    let rows = if self.options.by_block {
      dependency_order(issues)
    } else {
      issues.to_vec()
    };

    for issue in rows {
      let mut row = vec![
        Cell::new(&issue.title),
        Cell::new(issue.branch.as_deref().unwrap_or("")),
        Cell::new(issue.worktree.as_deref().unwrap_or("")),
      ];
      if self.options.verbose {
        row.push(Cell::new(first_line(&issue.description)));
      }
      if self.options.by_block {
        row.push(Cell::new(issue.blocked_by.join(", ")));
      }
      let status = Cell::new(status_text(issue));
      row.push(if self.use_colors {
        status.fg(StateFamily::of(issue.state.as_deref()).color())
      } else {
        status
      });
      table.add_row(row);
    }

    table.to_string()
  }

  /// Filters finished issues unless asked not to, then renders one or more tables.
  pub fn render_all(&self, issues: &[IssueSpec]) -> String {
    let visible: Vec<&IssueSpec> = issues
      .iter()
      .filter(|i| self.options.include_done || !is_finished(i))
      .collect();
    if visible.is_empty() {
      return "No issues found.".to_string();
    }

    if !self.options.by_project {
      return self.render(&visible);
    }

    group_by_project(&visible)
      .into_iter()
      .map(|(project, group)| format!("{project} ({})\n{}", group.len(), self.render(&group)))
      .collect::<Vec<_>>()
      .join("\n\n")
  }
}

/// Colour is off under `NO_COLOR` or a dumb terminal.
pub(crate) fn supports_color() -> bool {
  if std::env::var_os("NO_COLOR").is_some() {
    return false;
  }
  !matches!(std::env::var("TERM").as_deref(), Ok("dumb"))
}

/// Loads every manifest under `path` and renders the issue listing.
pub fn run_list(path: &Path, options: ListOptions) -> Result<String> {
  let files = store::discover_manifest_files(path)?;
  if files.is_empty() {
    return Err(SyncError::Validation(format!(
      "No YAML files found in {}",
      path.display()
    )));
  }
  let mut issues = Vec::new();
  for file in files {
    issues.extend(manifest::load_manifest(&file)?.issues);
  }
  Ok(IssueTable::new(options).render_all(&issues))
}
