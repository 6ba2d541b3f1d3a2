use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::error::Result;
use crate::linear::{IssueInput, IssueRef, IssueTracker};
use crate::manifest::{self, store, IssueSpec, Manifest};
use crate::team::TeamContext;

#[derive(Debug, Clone, Copy, Default)]
pub struct PushOptions {
  pub dry_run: bool,
  /// Move issues flagged `complete: true` to the team's completed state.
  pub mark_done: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IssueOutcome {
  Created(IssueRef),
  Updated(IssueRef),
  WouldCreate,
  WouldUpdate(IssueRef),
}

/// Markdown appended to descriptions of issues with blockers.
///
/// Each blocker is looked up by title within the team; dry runs skip the lookups.
pub async fn blocked_by_section(
  blocked_by: &[String],
  tracker: &dyn IssueTracker,
  team_id: &str,
  dry_run: bool,
) -> Result<String> {
  if blocked_by.is_empty() {
    return Ok(String::new());
  }

  let mut items = Vec::with_capacity(blocked_by.len());
  for title in blocked_by {
    if dry_run {
      items.push(format!("- {title}"));
      continue;
    }
    match tracker.search_issue_by_title(team_id, title).await? {
      Some(issue) => {
        let name = issue.title.as_deref().unwrap_or(title);
        items.push(format!("- [{}]({}) - {name}", issue.identifier, issue.url));
      }
      None => items.push(format!("- {title} *(not found in Linear)*")),
    }
  }

  Ok(format!("\n\n## Blocked By\n{}", items.join("\n")))
}

/// Builds the create (`team_id` set) or partial update payload for one issue.
///
/// Pure lookups run before label resolution so a bad state or assignee
/// never leaves freshly created labels behind.
async fn build_input(
  tracker: &dyn IssueTracker,
  ctx: &mut TeamContext,
  spec: &IssueSpec,
  opts: &PushOptions,
  team_id: Option<String>,
) -> Result<IssueInput> {
  let mut state_id = spec
    .state
    .as_deref()
    .map(|s| ctx.resolve_state_id(s))
    .transpose()?;
  if spec.complete && opts.mark_done {
    state_id = Some(ctx.done_state_id.clone());
  }

  let assignee_id = spec
    .assignee_email
    .as_deref()
    .map(|e| ctx.resolve_member_id(e))
    .transpose()?;

  let label_ids = if spec.labels.is_empty() {
    None
  } else {
    Some(ctx.resolve_label_ids(&spec.labels, tracker, opts.dry_run).await?)
  };

  let section = blocked_by_section(&spec.blocked_by, tracker, &ctx.id, opts.dry_run).await?;

  Ok(IssueInput {
    team_id,
    title: spec.title.clone(),
    description: format!("{}{section}", spec.description),
    priority: spec.priority,
    label_ids,
    assignee_id,
    state_id,
  })
}

/// Reconciles one manifest issue with Linear.
///
/// An identifier that resolves remotely leads to an update; no identifier, or a
/// stale one, leads to a create. Dry runs never call create or update.
pub async fn process_issue(
  tracker: &dyn IssueTracker,
  ctx: &mut TeamContext,
  spec: &IssueSpec,
  opts: &PushOptions,
) -> Result<IssueOutcome> {
  let descriptor = spec.descriptor();

  let mut notes = Vec::new();
  if let Some(branch) = &spec.branch {
    notes.push(format!("branch={branch}"));
  }
  if let Some(worktree) = &spec.worktree {
    notes.push(format!("worktree={worktree}"));
  }
  if !spec.blocked_by.is_empty() {
    notes.push(format!("blocked_by={}", spec.blocked_by.join(", ")));
  }
  if !notes.is_empty() {
    info!("{descriptor}: context -> {}", notes.join(", "));
  }

  let existing = match &spec.identifier {
    Some(identifier) => {
      let found = tracker.fetch_issue_by_identifier(identifier).await?;
      if found.is_none() {
        warn!("{descriptor}: identifier {identifier} not found; will create new issue");
      }
      found
    }
    None => None,
  };

  if let Some(existing) = existing {
    let input = build_input(tracker, ctx, spec, opts, None).await?;
    if spec.complete && !opts.mark_done {
      info!("{descriptor}: complete=true but --mark-done not set; leaving issue open");
    }
    if opts.dry_run {
      info!(
        "{descriptor}: DRY RUN would update issue {} ({})",
        existing.identifier, existing.url
      );
      return Ok(IssueOutcome::WouldUpdate(existing));
    }
    let updated = tracker.update_issue(&existing.id, &input).await?;
    info!("{descriptor}: updated {} ({})", updated.identifier, updated.url);
    return Ok(IssueOutcome::Updated(updated));
  }

  let team_id = ctx.id.clone();
  let input = build_input(tracker, ctx, spec, opts, Some(team_id)).await?;
  if opts.dry_run {
    info!("{descriptor}: DRY RUN would create new issue");
    return Ok(IssueOutcome::WouldCreate);
  }
  let created = tracker.create_issue(&input).await?;
  info!("{descriptor}: created {} ({})", created.identifier, created.url);
  Ok(IssueOutcome::Created(created))
}

#[derive(Debug, Default)]
pub struct PushReport {
  pub manifests: usize,
  pub created: usize,
  pub updated: usize,
  pub planned: usize,
  pub failed: Vec<(PathBuf, String)>,
}

impl PushReport {
  pub fn is_success(&self) -> bool {
    self.failed.is_empty()
  }
}

impl std::fmt::Display for PushReport {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "manifests={}, created={}, updated={}, dry_run_planned={}, failed={}",
      self.manifests,
      self.created,
      self.updated,
      self.planned,
      self.failed.len()
    )
  }
}

/// Resolves every team once, in key order, before any issue is processed.
async fn resolve_teams(
  tracker: &dyn IssueTracker,
  manifests: &[Manifest],
) -> HashMap<String, std::result::Result<TeamContext, String>> {
  let keys: BTreeSet<&str> = manifests
    .iter()
    .flat_map(|m| m.issues.iter().map(|i| i.team_key.as_str()))
    .collect();

  let mut contexts = HashMap::new();
  for key in keys {
    let resolved = TeamContext::resolve(tracker, key).await.map_err(|e| {
      error!("team {key}: {e}");
      e.to_string()
    });
    contexts.insert(key.to_string(), resolved);
  }
  contexts
}

/// Pushes every manifest, isolating failures per issue and per file.
pub async fn push_manifests(
  tracker: &dyn IssueTracker,
  files: &[PathBuf],
  opts: &PushOptions,
) -> PushReport {
  let mut report = PushReport {
    manifests: files.len(),
    ..Default::default()
  };

  let mut manifests = Vec::new();
  for path in files {
    match manifest::load_manifest(path) {
      Ok(m) => manifests.push(m),
      Err(e) => {
        error!("{}: {e}", path.display());
        report.failed.push((path.clone(), e.to_string()));
      }
    }
  }

  let mut contexts = resolve_teams(tracker, &manifests).await;

  for manifest in &manifests {
    info!(
      "loaded {} issue(s) from {}",
      manifest.issues.len(),
      manifest.path.display()
    );
    let mut errors = Vec::new();

    for (index, spec) in manifest.issues.iter().enumerate() {
      let ctx = match contexts.get_mut(&spec.team_key) {
        Some(Ok(ctx)) => ctx,
        Some(Err(e)) => {
          errors.push(format!("{}: {e}", spec.descriptor()));
          continue;
        }
        None => {
          errors.push(format!("{}: team was not resolved", spec.descriptor()));
          continue;
        }
      };

      match process_issue(tracker, ctx, spec, opts).await {
        Ok(IssueOutcome::Created(created)) => {
          report.created += 1;
          if let Err(e) =
            store::record_identifier(&manifest.path, manifest.kind, index, &created.identifier)
          {
            warn!("{}: could not record identifier: {e}", spec.descriptor());
          }
        }
        Ok(IssueOutcome::Updated(_)) => report.updated += 1,
        Ok(IssueOutcome::WouldCreate | IssueOutcome::WouldUpdate(_)) => report.planned += 1,
        Err(e) => {
          error!("{}: {e}", spec.descriptor());
          errors.push(format!("{}: {e}", spec.descriptor()));
        }
      }
    }

    if !errors.is_empty() {
      report.failed.push((manifest.path.clone(), errors.join("; ")));
    }
  }

  report
}

/// `push [path]`: a single manifest or every manifest under a directory.
pub async fn run_push(tracker: &dyn IssueTracker, path: &Path, opts: &PushOptions) -> Result<PushReport> {
  let files = store::discover_manifest_files(path)?;
  if files.is_empty() {
    info!("no YAML files found in {}", path.display());
    return Ok(PushReport::default());
  }
  if files.len() > 1 {
    info!("found {} YAML file(s) to push", files.len());
  }
  Ok(push_manifests(tracker, &files, opts).await)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::linear::fake::{issue_ref, team_node, Call, FakeTracker};
  use tempfile::TempDir;

  fn ctx() -> TeamContext {
    TeamContext::from_team(team_node("ENG", "team-eng")).unwrap()
  }

  fn spec(title: &str) -> IssueSpec {
    IssueSpec {
      title: title.into(),
      team_key: "ENG".into(),
      ..Default::default()
    }
  }

  fn live() -> PushOptions {
    PushOptions::default()
  }

  fn dry() -> PushOptions {
    PushOptions {
      dry_run: true,
      mark_done: false,
    }
  }

  #[tokio::test]
  async fn test_no_identifier_creates_with_team_id() {
    let tracker = FakeTracker::new();
    let mut ctx = ctx();
    let outcome = process_issue(&tracker, &mut ctx, &spec("X"), &live()).await.unwrap();

    assert!(matches!(outcome, IssueOutcome::Created(_)));
    let creates = tracker.creates();
    assert_eq!(creates.len(), 1);
    assert_eq!(creates[0].team_id.as_deref(), Some("team-eng"));
    assert_eq!(creates[0].title, "X");
    assert!(tracker.updates().is_empty());
  }

  #[tokio::test]
  async fn test_matching_identifier_updates_never_creates() {
    let tracker = FakeTracker::new().with_issue(issue_ref("issue-123", "ENG-123"));
    let mut ctx = ctx();
    let mut s = spec("X");
    s.identifier = Some("ENG-123".into());
    s.priority = Some(2);
    s.state = Some("todo".into());

    let outcome = process_issue(&tracker, &mut ctx, &s, &live()).await.unwrap();

    assert!(matches!(outcome, IssueOutcome::Updated(ref i) if i.identifier == "ENG-123"));
    let updates = tracker.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].0, "issue-123");
    assert_eq!(updates[0].1.team_id, None);
    assert_eq!(updates[0].1.priority, Some(2));
    assert_eq!(updates[0].1.state_id.as_deref(), Some("state-2"));
    assert_eq!(updates[0].1.label_ids, None);
    assert!(tracker.creates().is_empty());
  }

  #[tokio::test]
  async fn test_stale_identifier_falls_through_to_create() {
    let tracker = FakeTracker::new();
    let mut ctx = ctx();
    let mut s = spec("X");
    s.identifier = Some("ENG-404".into());

    let outcome = process_issue(&tracker, &mut ctx, &s, &live()).await.unwrap();

    assert!(matches!(outcome, IssueOutcome::Created(_)));
    assert_eq!(tracker.calls()[0], Call::FetchIssue("ENG-404".into()));
    assert_eq!(tracker.creates().len(), 1);
  }

  #[tokio::test]
  async fn test_dry_run_never_writes() {
    let tracker = FakeTracker::new().with_issue(issue_ref("issue-1", "ENG-1"));
    let mut ctx = ctx();

    let mut s = spec("X");
    s.labels = vec!["Brand New".into()];
    s.blocked_by = vec!["Other".into()];
    let created = process_issue(&tracker, &mut ctx, &s, &dry()).await.unwrap();
    assert_eq!(created, IssueOutcome::WouldCreate);

    s.identifier = Some("ENG-1".into());
    let updated = process_issue(&tracker, &mut ctx, &s, &dry()).await.unwrap();
    assert!(matches!(updated, IssueOutcome::WouldUpdate(_)));

    assert!(tracker.calls().iter().all(|c| matches!(c, Call::FetchIssue(_))));
  }

  #[tokio::test]
  async fn test_unknown_state_aborts_before_label_creation() {
    let tracker = FakeTracker::new();
    let mut ctx = ctx();
    let mut s = spec("X");
    s.state = Some("Nope".into());
    s.labels = vec!["Fresh".into()];

    assert!(process_issue(&tracker, &mut ctx, &s, &live()).await.is_err());
    assert!(tracker.calls().is_empty());
  }

  #[tokio::test]
  async fn test_mark_done_overrides_state() {
    let tracker = FakeTracker::new();
    let mut ctx = ctx();
    let mut s = spec("X");
    s.state = Some("Todo".into());
    s.complete = true;

    let opts = PushOptions {
      dry_run: false,
      mark_done: true,
    };
    process_issue(&tracker, &mut ctx, &s, &opts).await.unwrap();
    assert_eq!(tracker.creates()[0].state_id.as_deref(), Some("state-3"));

    process_issue(&tracker, &mut ctx, &s, &live()).await.unwrap();
    assert_eq!(tracker.creates()[1].state_id.as_deref(), Some("state-2"));
  }

  #[tokio::test]
  async fn test_blocked_by_section_links_found_issues() {
    let mut found = issue_ref("issue-9", "ENG-9");
    found.title = Some("Upgrade SDK".into());
    let tracker = FakeTracker::new().with_titled_issue("upgrade sdk", found);

    let section = blocked_by_section(
      &["Upgrade SDK".to_string(), "Missing".to_string()],
      &tracker,
      "team-eng",
      false,
    )
    .await
    .unwrap();

    assert_eq!(
      section,
      "\n\n## Blocked By\n- [ENG-9](https://linear.app/acme/issue/ENG-9) - Upgrade SDK\n- Missing *(not found in Linear)*"
    );
  }

  #[tokio::test]
  async fn test_blocked_by_section_dry_run_lists_titles() {
    let tracker = FakeTracker::new();
    let section = blocked_by_section(&["A".to_string()], &tracker, "team-eng", true)
      .await
      .unwrap();
    assert_eq!(section, "\n\n## Blocked By\n- A");
    assert!(tracker.calls().is_empty());
    assert_eq!(
      blocked_by_section(&[], &tracker, "team-eng", false).await.unwrap(),
      ""
    );
  }

  #[tokio::test]
  async fn test_push_directory_isolates_failures_and_records_identifier() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.yaml"), "title: Good\nteam_key: ENG\n").unwrap();
    std::fs::write(dir.path().join("b.yaml"), "title: Bad\nteam_key: OPS\n").unwrap();
    std::fs::write(dir.path().join("c.yaml"), "team_key: ENG\n").unwrap();

    let tracker = FakeTracker::new().with_team(team_node("ENG", "team-eng"));
    let report = run_push(&tracker, dir.path(), &live()).await.unwrap();

    assert_eq!(report.manifests, 3);
    assert_eq!(report.created, 1);
    assert_eq!(report.failed.len(), 2);
    assert!(!report.is_success());

    let doc = store::read_document(&dir.path().join("a.yaml")).unwrap();
    assert_eq!(doc["identifier"].as_str(), Some("NEW-1"));
  }

  #[tokio::test]
  async fn test_teams_fetched_once_in_sorted_order() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
      dir.path().join("batch.yaml"),
      "issues:\n  - title: A\n    team_key: OPS\n  - title: B\n    team_key: ENG\n  - title: C\n    team_key: OPS\n",
    )
    .unwrap();

    let tracker = FakeTracker::new()
      .with_team(team_node("ENG", "team-eng"))
      .with_team(team_node("OPS", "team-ops"));
    let report = run_push(&tracker, dir.path(), &dry()).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.planned, 3);
    let fetched: Vec<Call> = tracker
      .calls()
      .into_iter()
      .filter(|c| matches!(c, Call::FetchTeam(_)))
      .collect();
    assert_eq!(
      fetched,
      vec![Call::FetchTeam("ENG".into()), Call::FetchTeam("OPS".into())]
    );
  }
}
