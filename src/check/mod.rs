//! `check tests`: records GitHub check status for each issue branch in its manifest.

pub mod gh;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::error::{Result, SyncError};
use crate::list::supports_color;
use crate::manifest::store;
use gh::{CheckRunner, GhOutcome, PENDING_EXIT_CODE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
  Pass,
  Fail,
  Pending,
  Cancelled,
  Skipped,
  NoChecks,
  Unknown,
  Error,
  GhMissing,
  ParseError,
  MissingBranch,
  MissingWorktree,
  WorktreeNotFound,
}

impl TestStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pass => "pass",
      Self::Fail => "fail",
      Self::Pending => "pending",
      Self::Cancelled => "cancelled",
      Self::Skipped => "skipped",
      Self::NoChecks => "no_checks",
      Self::Unknown => "unknown",
      Self::Error => "error",
      Self::GhMissing => "gh_missing",
      Self::ParseError => "parse_error",
      Self::MissingBranch => "missing_branch",
      Self::MissingWorktree => "missing_worktree",
      Self::WorktreeNotFound => "worktree_not_found",
    }
  }
}

impl std::fmt::Display for TestStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// One check as reported by `gh pr checks`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckDetail {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub state: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub bucket: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub workflow: Option<String>,
}

/// The `tests:` block written into each issue mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestsEntry {
  pub checked_at: String,
  pub pass_or_fail: TestStatus,
  pub failure_reason: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub branch: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub worktree: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub details: Option<Vec<CheckDetail>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub exit_code: Option<i32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub raw: Option<String>,
}

impl TestsEntry {
  fn new(checked_at: &str, status: TestStatus, reason: impl Into<String>) -> Self {
    Self {
      checked_at: checked_at.to_string(),
      pass_or_fail: status,
      failure_reason: Some(reason.into()),
      branch: None,
      worktree: None,
      details: None,
      exit_code: None,
      message: None,
      raw: None,
    }
  }
}

/// Overall status from check buckets: fail > pending > cancel > skipping > pass.
pub fn summarize_buckets(details: &[CheckDetail], exit_code: i32) -> TestStatus {
  let buckets: HashSet<String> = details
    .iter()
    .filter_map(|d| d.bucket.as_deref())
    .map(str::to_lowercase)
    .collect();

  let ordered = [
    ("fail", TestStatus::Fail),
    ("pending", TestStatus::Pending),
    ("cancel", TestStatus::Cancelled),
    ("skipping", TestStatus::Skipped),
    ("pass", TestStatus::Pass),
  ];
  if let Some((_, status)) = ordered.iter().find(|(b, _)| buckets.contains(*b)) {
    return *status;
  }

  if !details.is_empty() {
    TestStatus::Unknown
  } else if exit_code == PENDING_EXIT_CODE {
    TestStatus::Pending
  } else if exit_code == 0 {
    TestStatus::NoChecks
  } else {
    TestStatus::Error
  }
}

fn or_stderr(stderr: &str, fallback: impl FnOnce() -> String) -> String {
  if stderr.is_empty() {
    fallback()
  } else {
    stderr.to_string()
  }
}

fn failure_reason(
  status: TestStatus,
  details: &[CheckDetail],
  stderr: &str,
  exit_code: i32,
) -> Option<String> {
  let reason = match status {
    TestStatus::Pass => return None,
    TestStatus::Fail => {
      let failed = details
        .iter()
        .find(|d| d.bucket.as_deref().is_some_and(|b| b.eq_ignore_ascii_case("fail")));
      let label = failed.and_then(|d| d.workflow.as_deref().or(d.name.as_deref()));
      match label {
        Some(label) => match failed.and_then(|d| d.state.as_deref()) {
          Some(state) => format!("{label} failed ({state})"),
          None => format!("{label} failed"),
        },
        None => or_stderr(stderr, || "One or more checks reported failures.".into()),
      }
    }
    TestStatus::Pending => or_stderr(stderr, || "Checks are still running.".into()),
    TestStatus::Cancelled | TestStatus::Skipped => {
      or_stderr(stderr, || format!("Checks {status}."))
    }
    TestStatus::NoChecks => or_stderr(stderr, || "No checks available for this branch.".into()),
    TestStatus::Error => or_stderr(stderr, || format!("`gh pr checks` exited with {exit_code}")),
    _ => or_stderr(stderr, || "Unknown test state.".into()),
  };
  Some(reason)
}

fn parse_details(stdout: &str) -> std::result::Result<Vec<CheckDetail>, serde_json::Error> {
  if stdout.is_empty() {
    return Ok(Vec::new());
  }
  let parsed: serde_json::Value = serde_json::from_str(stdout)?;
  let Some(items) = parsed.as_array() else {
    return Ok(Vec::new());
  };
  let field = |item: &serde_json::Value, key: &str| {
    item.get(key).and_then(|v| match v {
      serde_json::Value::Null => None,
      serde_json::Value::String(s) => Some(s.clone()),
      other => Some(other.to_string()),
    })
  };
  Ok(
    items
      .iter()
      .map(|item| CheckDetail {
        name: field(item, "name"),
        state: field(item, "state"),
        bucket: field(item, "bucket"),
        workflow: field(item, "workflow"),
      })
      .collect(),
  )
}

/// Folds the result of a `gh pr checks` run into `entry`.
pub fn apply_gh_outcome(entry: &mut TestsEntry, outcome: GhOutcome) {
  let (exit_code, stdout, stderr) = match outcome {
    GhOutcome::Missing => {
      entry.pass_or_fail = TestStatus::GhMissing;
      entry.failure_reason = Some("GitHub CLI (gh) not found on PATH.".into());
      entry.details = Some(Vec::new());
      return;
    }
    GhOutcome::Finished {
      exit_code,
      stdout,
      stderr,
    } => (exit_code, stdout, stderr),
  };

  let details = match parse_details(&stdout) {
    Ok(details) => details,
    Err(e) => {
      debug!("unparseable gh output: {e}");
      entry.pass_or_fail = TestStatus::ParseError;
      entry.failure_reason = Some("Unable to parse JSON output from gh.".into());
      entry.details = Some(Vec::new());
      entry.raw = Some(stdout);
      return;
    }
  };

  let status = summarize_buckets(&details, exit_code);
  entry.pass_or_fail = status;
  entry.failure_reason = failure_reason(status, &details, &stderr, exit_code);
  entry.exit_code = Some(exit_code);
  entry.message = if !stderr.is_empty() {
    Some(stderr)
  } else if details.is_empty() && status == TestStatus::Error {
    Some(format!("`gh pr checks` exited with {exit_code}"))
  } else {
    None
  };
  entry.details = Some(details);
}

fn scalar(value: Option<&Value>) -> Option<String> {
  let text = match value? {
    Value::String(s) => s.trim().to_string(),
    Value::Number(n) => n.to_string(),
    Value::Bool(b) => b.to_string(),
    _ => return None,
  };
  (!text.is_empty()).then_some(text)
}

/// Worktree paths are relative to the manifest's directory; `~` expands to home.
pub fn resolve_worktree_path(manifest_path: &Path, raw: &str) -> PathBuf {
  let expanded = match raw.strip_prefix("~/") {
    Some(rest) => dirs::home_dir().map(|h| h.join(rest)),
    None if raw == "~" => dirs::home_dir(),
    None => None,
  }
  .unwrap_or_else(|| PathBuf::from(raw));

  if expanded.is_absolute() {
    return expanded;
  }
  let joined = manifest_path
    .parent()
    .unwrap_or_else(|| Path::new("."))
    .join(expanded);
  joined.canonicalize().unwrap_or(joined)
}

/// Computes the tests entry for one issue mapping.
pub fn evaluate_issue(
  issue: &Mapping,
  manifest_path: &Path,
  runner: &dyn CheckRunner,
  checked_at: &str,
) -> TestsEntry {
  let Some(branch) = scalar(issue.get("branch")) else {
    return TestsEntry::new(
      checked_at,
      TestStatus::MissingBranch,
      "Branch not specified in manifest.",
    );
  };

  let Some(raw_worktree) = scalar(issue.get("worktree")) else {
    let mut entry = TestsEntry::new(
      checked_at,
      TestStatus::MissingWorktree,
      format!("No worktree path configured for branch '{branch}'."),
    );
    entry.branch = Some(branch);
    return entry;
  };

  let worktree = resolve_worktree_path(manifest_path, &raw_worktree);
  let mut entry = TestsEntry::new(
    checked_at,
    TestStatus::WorktreeNotFound,
    format!("Worktree path '{}' not found.", worktree.display()),
  );
  entry.branch = Some(branch.clone());
  entry.worktree = Some(worktree.display().to_string());
  if !worktree.exists() {
    return entry;
  }

  match runner.pr_checks(&branch, &worktree) {
    Ok(outcome) => apply_gh_outcome(&mut entry, outcome),
    Err(e) => {
      entry.pass_or_fail = TestStatus::Error;
      entry.failure_reason = Some(e.to_string());
    }
  }
  entry
}

/// Stored and fresh entries are equal when everything but `checked_at` matches.
fn same_result(previous: Option<&Value>, next: &Value) -> bool {
  let strip = |value: &Value| {
    let mut value = value.clone();
    if let Value::Mapping(map) = &mut value {
      map.remove("checked_at");
    }
    value
  };
  previous.is_some_and(|prev| strip(prev) == strip(next))
}

pub type IssueResult = (String, TestsEntry);

/// Evaluates every issue of one manifest, rewriting the file only when a result changed.
pub fn process_manifest(path: &Path, runner: &dyn CheckRunner) -> Result<Vec<IssueResult>> {
  let mut doc = store::read_document(path)?;
  let checked_at = Utc::now().to_rfc3339();
  let mut results = Vec::new();
  let mut changed = false;

  for (index, issue) in store::issue_mappings_mut(&mut doc).into_iter().enumerate() {
    let entry = evaluate_issue(issue, path, runner, &checked_at);
    let value = serde_yaml::to_value(&entry)?;
    if !same_result(issue.get("tests"), &value) {
      issue.insert(Value::from("tests"), value);
      changed = true;
    }
    let title = scalar(issue.get("title")).unwrap_or_else(|| format!("Issue {}", index + 1));
    results.push((title, entry));
  }

  if changed {
    store::write_document(path, &doc)?;
  }
  Ok(results)
}

#[derive(Debug)]
pub struct ManifestCheck {
  pub path: PathBuf,
  pub outcome: std::result::Result<Vec<IssueResult>, String>,
}

#[derive(Debug, Default)]
pub struct CheckReport {
  pub manifests: Vec<ManifestCheck>,
  pub join_errors: usize,
}

impl CheckReport {
  pub fn error_count(&self) -> usize {
    self.join_errors + self.manifests.iter().filter(|m| m.outcome.is_err()).count()
  }
}

async fn check_manifest(
  path: PathBuf,
  semaphore: Arc<Semaphore>,
  runner: Arc<dyn CheckRunner>,
) -> Result<Vec<IssueResult>> {
  let _permit = semaphore
    .acquire_owned()
    .await
    .map_err(|e| SyncError::Checks(format!("worker pool closed: {e}")))?;
  tokio::task::spawn_blocking(move || process_manifest(&path, runner.as_ref()))
    .await
    .map_err(|e| SyncError::Checks(format!("spawn_blocking: {e}")))?
}

/// Checks every manifest under `path` with at most `workers` manifests in flight.
pub async fn run_check_tests(
  path: &Path,
  workers: usize,
  runner: Arc<dyn CheckRunner>,
) -> Result<CheckReport> {
  let files = store::discover_manifest_files(path)?;
  if files.is_empty() {
    info!("no YAML files found in {}", path.display());
    return Ok(CheckReport::default());
  }

  let workers = workers.max(1).min(files.len());
  info!(
    "running test checks for {} manifest file(s) with {workers} worker(s)",
    files.len()
  );

  let semaphore = Arc::new(Semaphore::new(workers));
  let mut task_set = JoinSet::new();
  for file in files {
    let sem = semaphore.clone();
    let runner = runner.clone();
    task_set.spawn(async move {
      let outcome = check_manifest(file.clone(), sem, runner)
        .await
        .map_err(|e| e.to_string());
      ManifestCheck {
        path: file,
        outcome,
      }
    });
  }

  let mut report = CheckReport::default();
  while let Some(joined) = task_set.join_next().await {
    match joined {
      Ok(check) => {
        if let Err(e) = &check.outcome {
          error!("{}: {e}", check.path.display());
        }
        report.manifests.push(check);
      }
      Err(e) => {
        error!("check task join error: {e}");
        report.join_errors += 1;
      }
    }
  }
  report.manifests.sort_by(|a, b| a.path.cmp(&b.path));
  Ok(report)
}

/// Display colour for a recorded status.
pub fn status_color(status: TestStatus) -> Color {
  match status {
    TestStatus::Pass => Color::Green,
    TestStatus::Fail | TestStatus::GhMissing | TestStatus::ParseError | TestStatus::Error => {
      Color::Red
    }
    TestStatus::Pending
    | TestStatus::MissingBranch
    | TestStatus::MissingWorktree
    | TestStatus::WorktreeNotFound => Color::Yellow,
    TestStatus::Skipped => Color::Blue,
    TestStatus::Cancelled => Color::Magenta,
    TestStatus::NoChecks | TestStatus::Unknown => Color::Cyan,
  }
}

/// One row per issue; manifests that failed to load get a single red `error` row.
pub fn render_report(report: &CheckReport, use_colors: bool) -> String {
  let paint = |cell: Cell, color: Color| if use_colors { cell.fg(color) } else { cell };

  let mut table = Table::new();
  table
    .load_preset(presets::UTF8_FULL)
    .set_content_arrangement(ContentArrangement::Dynamic);
  table.set_header(
    ["Manifest", "Issue", "Status", "Reason"]
      .into_iter()
      .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
  );

  for check in &report.manifests {
    let name = check
      .path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| check.path.display().to_string());
    match &check.outcome {
      Err(e) => {
        table.add_row(vec![
          Cell::new(&name),
          Cell::new(""),
          paint(Cell::new(TestStatus::Error), Color::Red),
          Cell::new(e),
        ]);
      }
      Ok(entries) if entries.is_empty() => {
        table.add_row(vec![Cell::new(&name), Cell::new("no issues found")]);
      }
      Ok(entries) => {
        for (title, entry) in entries {
          table.add_row(vec![
            Cell::new(&name),
            Cell::new(title),
            paint(Cell::new(entry.pass_or_fail), status_color(entry.pass_or_fail)),
            Cell::new(entry.failure_reason.as_deref().unwrap_or("")),
          ]);
        }
      }
    }
  }

  table.to_string()
}

pub fn print_report(report: &CheckReport) {
  println!("{}", render_report(report, supports_color()));
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;
  use std::time::Duration;
  use tempfile::TempDir;

  struct FakeRunner {
    outcome: GhOutcome,
    calls: Mutex<Vec<String>>,
  }

  impl FakeRunner {
    fn finished(exit_code: i32, stdout: &str, stderr: &str) -> Self {
      Self {
        outcome: GhOutcome::Finished {
          exit_code,
          stdout: stdout.into(),
          stderr: stderr.into(),
        },
        calls: Mutex::new(Vec::new()),
      }
    }

    fn call_count(&self) -> usize {
      self.calls.lock().unwrap().len()
    }
  }

  impl CheckRunner for FakeRunner {
    fn pr_checks(&self, branch: &str, _cwd: &Path) -> Result<GhOutcome> {
      self.calls.lock().unwrap().push(branch.to_string());
      Ok(self.outcome.clone())
    }
  }

  fn detail(bucket: &str) -> CheckDetail {
    CheckDetail {
      bucket: Some(bucket.into()),
      ..Default::default()
    }
  }

  fn mapping(yaml: &str) -> Mapping {
    serde_yaml::from_str(yaml).unwrap()
  }

  #[test]
  fn test_bucket_priority() {
    let all = [detail("pass"), detail("skipping"), detail("cancel"), detail("pending"), detail("fail")];
    assert_eq!(summarize_buckets(&all, 1), TestStatus::Fail);
    assert_eq!(summarize_buckets(&all[..4], 0), TestStatus::Pending);
    assert_eq!(summarize_buckets(&all[..3], 0), TestStatus::Cancelled);
    assert_eq!(summarize_buckets(&all[..2], 0), TestStatus::Skipped);
    assert_eq!(summarize_buckets(&[detail("PASS")], 0), TestStatus::Pass);
    assert_eq!(summarize_buckets(&[detail("weird")], 0), TestStatus::Unknown);
  }

  #[test]
  fn test_no_checks_uses_exit_code() {
    assert_eq!(summarize_buckets(&[], 8), TestStatus::Pending);
    assert_eq!(summarize_buckets(&[], 0), TestStatus::NoChecks);
    assert_eq!(summarize_buckets(&[], 1), TestStatus::Error);
  }

  #[test]
  fn test_fail_reason_names_workflow() {
    let mut entry = TestsEntry::new("t", TestStatus::Unknown, "");
    apply_gh_outcome(
      &mut entry,
      GhOutcome::Finished {
        exit_code: 1,
        stdout: r#"[{"name":"unit","state":"FAILURE","bucket":"fail","workflow":"CI"},{"name":"lint","bucket":"pass"}]"#.into(),
        stderr: String::new(),
      },
    );
    assert_eq!(entry.pass_or_fail, TestStatus::Fail);
    assert_eq!(entry.failure_reason.as_deref(), Some("CI failed (FAILURE)"));
    assert_eq!(entry.details.as_ref().map(Vec::len), Some(2));
    assert_eq!(entry.exit_code, Some(1));
    assert_eq!(entry.message, None);
  }

  #[test]
  fn test_pending_without_checks() {
    let mut entry = TestsEntry::new("t", TestStatus::Unknown, "");
    apply_gh_outcome(
      &mut entry,
      GhOutcome::Finished {
        exit_code: 8,
        stdout: String::new(),
        stderr: String::new(),
      },
    );
    assert_eq!(entry.pass_or_fail, TestStatus::Pending);
    assert_eq!(entry.failure_reason.as_deref(), Some("Checks are still running."));
  }

  #[test]
  fn test_error_prefers_stderr_and_sets_message() {
    let mut entry = TestsEntry::new("t", TestStatus::Unknown, "");
    apply_gh_outcome(
      &mut entry,
      GhOutcome::Finished {
        exit_code: 1,
        stdout: String::new(),
        stderr: "no pull requests found".into(),
      },
    );
    assert_eq!(entry.pass_or_fail, TestStatus::Error);
    assert_eq!(entry.failure_reason.as_deref(), Some("no pull requests found"));
    assert_eq!(entry.message.as_deref(), Some("no pull requests found"));

    let mut silent = TestsEntry::new("t", TestStatus::Unknown, "");
    apply_gh_outcome(
      &mut silent,
      GhOutcome::Finished {
        exit_code: 4,
        stdout: String::new(),
        stderr: String::new(),
      },
    );
    assert_eq!(silent.message.as_deref(), Some("`gh pr checks` exited with 4"));
  }

  #[test]
  fn test_parse_error_keeps_raw_output() {
    let mut entry = TestsEntry::new("t", TestStatus::Unknown, "");
    apply_gh_outcome(
      &mut entry,
      GhOutcome::Finished {
        exit_code: 0,
        stdout: "not json".into(),
        stderr: String::new(),
      },
    );
    assert_eq!(entry.pass_or_fail, TestStatus::ParseError);
    assert_eq!(entry.raw.as_deref(), Some("not json"));
  }

  #[test]
  fn test_gh_missing() {
    let mut entry = TestsEntry::new("t", TestStatus::Unknown, "");
    apply_gh_outcome(&mut entry, GhOutcome::Missing);
    assert_eq!(entry.pass_or_fail, TestStatus::GhMissing);
  }

  #[test]
  fn test_missing_branch_and_worktree() {
    let runner = FakeRunner::finished(0, "[]", "");
    let path = Path::new("/tmp/manifest.yaml");

    let entry = evaluate_issue(&mapping("title: A"), path, &runner, "t");
    assert_eq!(entry.pass_or_fail, TestStatus::MissingBranch);
    assert_eq!(entry.branch, None);

    let entry = evaluate_issue(&mapping("title: A\nbranch: feat"), path, &runner, "t");
    assert_eq!(entry.pass_or_fail, TestStatus::MissingWorktree);
    assert_eq!(entry.branch.as_deref(), Some("feat"));
    assert_eq!(runner.call_count(), 0);
  }

  #[test]
  fn test_worktree_resolved_relative_to_manifest() {
    let dir = TempDir::new().unwrap();
    let runner = FakeRunner::finished(0, "[]", "");
    let manifest = dir.path().join("m.yaml");

    let entry = evaluate_issue(
      &mapping("branch: feat\nworktree: ../definitely-missing-wt"),
      &manifest,
      &runner,
      "t",
    );
    assert_eq!(entry.pass_or_fail, TestStatus::WorktreeNotFound);
    assert_eq!(runner.call_count(), 0);

    std::fs::create_dir(dir.path().join("wt")).unwrap();
    let entry = evaluate_issue(&mapping("branch: feat\nworktree: wt"), &manifest, &runner, "t");
    assert_eq!(entry.pass_or_fail, TestStatus::NoChecks);
    assert_eq!(
      entry.worktree,
      Some(dir.path().join("wt").canonicalize().unwrap().display().to_string())
    );
    assert_eq!(runner.call_count(), 1);
  }

  #[test]
  fn test_unchanged_result_is_not_rewritten() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("wt")).unwrap();
    let path = dir.path().join("batch.yaml");
    std::fs::write(
      &path,
      "issues:\n  - title: A\n    branch: feat\n    worktree: wt\n  - title: B\n",
    )
    .unwrap();
    let runner = FakeRunner::finished(0, r#"[{"name":"ci","bucket":"pass"}]"#, "");

    let results = process_manifest(&path, &runner).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].1.pass_or_fail, TestStatus::Pass);
    assert_eq!(results[0].1.failure_reason, None);
    assert_eq!(results[1].1.pass_or_fail, TestStatus::MissingBranch);

    let doc = store::read_document(&path).unwrap();
    assert_eq!(doc["issues"][0]["tests"]["pass_or_fail"].as_str(), Some("pass"));

    // A rewrite would drop the comment.
    let marked = format!("# keep\n{}", std::fs::read_to_string(&path).unwrap());
    std::fs::write(&path, &marked).unwrap();
    process_manifest(&path, &runner).unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), marked);
  }

  #[tokio::test]
  async fn test_run_check_tests_visits_every_manifest() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.yaml"), "title: A\n").unwrap();
    std::fs::write(dir.path().join("b.yaml"), "title: B\n").unwrap();
    std::fs::write(dir.path().join("c.yaml"), "title: [unclosed\n").unwrap();

    let runner: Arc<dyn CheckRunner> = Arc::new(FakeRunner::finished(0, "[]", ""));
    let report = run_check_tests(dir.path(), 0, runner).await.unwrap();

    assert_eq!(report.manifests.len(), 3);
    assert_eq!(report.manifests[0].path, dir.path().join("a.yaml"));
    assert_eq!(report.error_count(), 1);
  }

  /// Records the highest number of `pr_checks` calls running at once.
  #[derive(Default)]
  struct ConcurrencyRunner {
    current: AtomicUsize,
    peak: AtomicUsize,
  }

  impl CheckRunner for ConcurrencyRunner {
    fn pr_checks(&self, _branch: &str, _cwd: &Path) -> Result<GhOutcome> {
      let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
      self.peak.fetch_max(now, Ordering::SeqCst);
      std::thread::sleep(Duration::from_millis(50));
      self.current.fetch_sub(1, Ordering::SeqCst);
      Ok(GhOutcome::Finished {
        exit_code: 0,
        stdout: "[]".into(),
        stderr: String::new(),
      })
    }
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_worker_pool_caps_concurrent_checks() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("wt")).unwrap();
    for i in 0..5 {
      std::fs::write(
        dir.path().join(format!("m{i}.yaml")),
        format!("title: Issue {i}\nbranch: feat-{i}\nworktree: wt\n"),
      )
      .unwrap();
    }

    let runner = Arc::new(ConcurrencyRunner::default());
    let report = run_check_tests(dir.path(), 2, runner.clone()).await.unwrap();

    assert_eq!(report.manifests.len(), 5);
    assert_eq!(report.error_count(), 0);
    let peak = runner.peak.load(Ordering::SeqCst);
    assert!((1..=2).contains(&peak), "peak concurrency was {peak}");
  }

  #[test]
  fn test_status_colors() {
    assert_eq!(status_color(TestStatus::Pass), Color::Green);
    assert_eq!(status_color(TestStatus::Fail), Color::Red);
    assert_eq!(status_color(TestStatus::GhMissing), Color::Red);
    assert_eq!(status_color(TestStatus::Pending), Color::Yellow);
    assert_eq!(status_color(TestStatus::WorktreeNotFound), Color::Yellow);
    assert_eq!(status_color(TestStatus::Skipped), Color::Blue);
    assert_eq!(status_color(TestStatus::Cancelled), Color::Magenta);
    assert_eq!(status_color(TestStatus::NoChecks), Color::Cyan);
  }

  #[test]
  fn test_render_report_rows() {
    let entry = |status, reason: Option<&str>| TestsEntry {
      failure_reason: reason.map(String::from),
      ..TestsEntry::new("t", status, "")
    };
    let report = CheckReport {
      manifests: vec![
        ManifestCheck {
          path: PathBuf::from("dir/a.yaml"),
          outcome: Ok(vec![
            ("Login".into(), entry(TestStatus::Pass, None)),
            ("Signup".into(), entry(TestStatus::Fail, Some("ci: fail"))),
          ]),
        },
        ManifestCheck {
          path: PathBuf::from("dir/b.yaml"),
          outcome: Err("bad yaml".into()),
        },
        ManifestCheck {
          path: PathBuf::from("dir/c.yaml"),
          outcome: Ok(Vec::new()),
        },
      ],
      join_errors: 0,
    };

    let plain = render_report(&report, false);
    for text in [
      "a.yaml", "Login", "pass", "Signup", "ci: fail", "b.yaml", "error", "bad yaml",
      "no issues found",
    ] {
      assert!(plain.contains(text), "missing {text} in\n{plain}");
    }
  }
}
