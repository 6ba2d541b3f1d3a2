pub mod store;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};
use serde_yaml::Value;
use tracing::debug;

use crate::error::{Result, SyncError};

pub const MAX_PRIORITY: u8 = 4;

/// Lowercased, trimmed form used for every case-insensitive lookup.
pub fn normalize_key(value: &str) -> String {
  value.trim().to_lowercase()
}

/// Drops later entries whose normalized form was already seen. First casing wins.
pub fn dedupe_case_insensitive<I, S>(items: I) -> Vec<String>
where
  I: IntoIterator<Item = S>,
  S: AsRef<str>,
{
  let mut seen = std::collections::HashSet::new();
  let mut result = Vec::new();
  for item in items {
    let item = item.as_ref();
    if seen.insert(normalize_key(item)) {
      result.push(item.to_string());
    }
  }
  result
}

/// A single work item, normalized from either manifest shape.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IssueSpec {
  pub title: String,
  pub description: String,
  pub team_key: String,
  pub identifier: Option<String>,
  pub state: Option<String>,
  pub labels: Vec<String>,
  pub assignee_email: Option<String>,
  pub priority: Option<u8>,
  pub branch: Option<String>,
  pub worktree: Option<String>,
  pub project_name: Option<String>,
  pub project_id: Option<String>,
  pub blocked_by: Vec<String>,
  pub complete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
  /// One flat issue mapping per file.
  Single,
  /// `defaults:` plus an `issues:` list.
  Batch,
}

#[derive(Debug, Clone)]
pub struct Manifest {
  pub path: PathBuf,
  pub kind: ManifestKind,
  pub issues: Vec<IssueSpec>,
}

#[derive(Debug, Default, Deserialize)]
struct RawIssue {
  #[serde(default, deserialize_with = "opt_scalar")]
  title: Option<String>,
  #[serde(default, deserialize_with = "opt_scalar")]
  description: Option<String>,
  #[serde(default, deserialize_with = "opt_scalar")]
  team_key: Option<String>,
  #[serde(default, deserialize_with = "opt_scalar")]
  identifier: Option<String>,
  #[serde(default, deserialize_with = "opt_scalar")]
  id: Option<String>,
  #[serde(default, deserialize_with = "opt_scalar")]
  state: Option<String>,
  #[serde(default, deserialize_with = "opt_scalar")]
  status: Option<String>,
  #[serde(default, deserialize_with = "scalar_list")]
  labels: Vec<String>,
  #[serde(default, deserialize_with = "opt_scalar")]
  assignee_email: Option<String>,
  #[serde(default, deserialize_with = "opt_scalar")]
  assignee: Option<String>,
  #[serde(default)]
  priority: Option<Value>,
  #[serde(default, deserialize_with = "opt_scalar")]
  branch: Option<String>,
  #[serde(default, deserialize_with = "opt_scalar")]
  worktree: Option<String>,
  #[serde(default, deserialize_with = "opt_scalar")]
  project_name: Option<String>,
  #[serde(default, deserialize_with = "opt_scalar")]
  project_id: Option<String>,
  #[serde(default, deserialize_with = "scalar_list")]
  blocked_by: Vec<String>,
  #[serde(default)]
  complete: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDefaults {
  #[serde(default, deserialize_with = "opt_scalar")]
  team_key: Option<String>,
  #[serde(default, deserialize_with = "opt_scalar")]
  state: Option<String>,
  #[serde(default, deserialize_with = "opt_scalar")]
  status: Option<String>,
  #[serde(default, deserialize_with = "scalar_list")]
  labels: Vec<String>,
  #[serde(default, deserialize_with = "opt_scalar")]
  assignee_email: Option<String>,
  #[serde(default, deserialize_with = "opt_scalar")]
  assignee: Option<String>,
  #[serde(default)]
  priority: Option<Value>,
  #[serde(default, deserialize_with = "opt_scalar")]
  branch: Option<String>,
  #[serde(default, deserialize_with = "opt_scalar")]
  worktree: Option<String>,
  #[serde(default, deserialize_with = "opt_scalar")]
  project_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawBatch {
  #[serde(default)]
  defaults: Option<RawDefaults>,
  #[serde(default)]
  issues: Option<Vec<Value>>,
}

enum ManifestDocument {
  Single(RawIssue),
  Batch(RawBatch),
}

fn scalar_to_string(value: Value) -> std::result::Result<Option<String>, String> {
  match value {
    Value::Null => Ok(None),
    Value::String(s) => {
      let trimmed = s.trim();
      Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
    }
    Value::Number(n) => Ok(Some(n.to_string())),
    Value::Bool(b) => Ok(Some(b.to_string())),
    Value::Tagged(tagged) => scalar_to_string(tagged.value),
    Value::Sequence(_) | Value::Mapping(_) => Err("expected a string".to_string()),
  }
}

fn opt_scalar<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<String>, D::Error> {
  match Option::<Value>::deserialize(d)? {
    None => Ok(None),
    Some(v) => scalar_to_string(v).map_err(serde::de::Error::custom),
  }
}

fn scalar_list<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<String>, D::Error> {
  match Option::<Value>::deserialize(d)? {
    None | Some(Value::Null) => Ok(Vec::new()),
    Some(Value::Sequence(items)) => items
      .into_iter()
      .map(|item| match scalar_to_string(item) {
        Ok(Some(s)) => Ok(s),
        Ok(None) => Err(serde::de::Error::custom("list entries must be non-empty strings")),
        Err(e) => Err(serde::de::Error::custom(e)),
      })
      .collect(),
    Some(_) => Err(serde::de::Error::custom("expected a list of strings")),
  }
}

/// Accepts integers and integer strings in `0..=4`.
pub fn parse_priority(value: &Value) -> Result<Option<u8>> {
  let number = match value {
    Value::Null => return Ok(None),
    Value::Number(n) => n.as_i64(),
    Value::String(s) => s.trim().parse::<i64>().ok(),
    _ => None,
  };
  let number =
    number.ok_or_else(|| SyncError::Validation("priority values must be integers".into()))?;
  if !(0..=i64::from(MAX_PRIORITY)).contains(&number) {
    return Err(SyncError::Validation(format!(
      "priority must be between 0 (no priority) and {MAX_PRIORITY} (urgent), got {number}"
    )));
  }
  Ok(Some(number as u8))
}

fn parse_optional_priority(value: Option<&Value>) -> Result<Option<u8>> {
  value.map(parse_priority).transpose().map(Option::flatten)
}

// Canonical keys win over their short aliases when both are present.
impl RawDefaults {
  fn state(&self) -> Option<String> {
    self.state.clone().or_else(|| self.status.clone())
  }

  fn assignee_email(&self) -> Option<String> {
    self.assignee_email.clone().or_else(|| self.assignee.clone())
  }
}

impl IssueSpec {
  fn from_raw(raw: RawIssue, defaults: &RawDefaults, prefix: &str) -> Result<Self> {
    let with_prefix = |e: SyncError| match e {
      SyncError::Validation(msg) => SyncError::Validation(format!("{prefix}{msg}")),
      other => other,
    };

    let title = raw
      .title
      .ok_or_else(|| SyncError::Validation(format!("{prefix}'title' is required")))?;
    let team_key = raw.team_key.or_else(|| defaults.team_key.clone()).ok_or_else(|| {
      SyncError::Validation(format!("{prefix}'team_key' missing and no default provided"))
    })?;

    let priority = match parse_optional_priority(raw.priority.as_ref()).map_err(with_prefix)? {
      Some(p) => Some(p),
      None => parse_optional_priority(defaults.priority.as_ref()).map_err(with_prefix)?,
    };

    let labels = dedupe_case_insensitive(defaults.labels.iter().chain(raw.labels.iter()));

    Ok(Self {
      title,
      description: raw.description.unwrap_or_default(),
      team_key,
      identifier: raw.identifier.or(raw.id),
      state: raw.state.or(raw.status).or_else(|| defaults.state()),
      labels,
      assignee_email: raw.assignee_email.or(raw.assignee).or_else(|| defaults.assignee_email()),
      priority,
      branch: raw.branch.or_else(|| defaults.branch.clone()),
      worktree: raw.worktree.or_else(|| defaults.worktree.clone()),
      project_name: raw.project_name.or_else(|| defaults.project_name.clone()),
      project_id: raw.project_id,
      blocked_by: dedupe_case_insensitive(raw.blocked_by),
      complete: raw.complete.unwrap_or(false),
    })
  }

  /// `[ENG] Title`, used as a log prefix.
  pub fn descriptor(&self) -> String {
    format!("[{}] {}", self.team_key, self.title)
  }
}

fn classify(path: &Path, raw: Value) -> Result<ManifestDocument> {
  let shape_err = |e: serde_yaml::Error| SyncError::Validation(format!("{}: {e}", path.display()));
  let is_batch = matches!(&raw, Value::Mapping(map) if map.contains_key("issues"));
  match raw {
    Value::Null => Err(SyncError::Validation(format!(
      "manifest {} is empty",
      path.display()
    ))),
    Value::Mapping(_) if is_batch => {
      serde_yaml::from_value(raw).map(ManifestDocument::Batch).map_err(shape_err)
    }
    Value::Mapping(_) => serde_yaml::from_value(raw).map(ManifestDocument::Single).map_err(shape_err),
    _ => Err(SyncError::Validation(format!(
      "manifest {} root must be a mapping",
      path.display()
    ))),
  }
}

pub fn parse_manifest(path: &Path, content: &str) -> Result<Manifest> {
  let raw: Value = serde_yaml::from_str(content)
    .map_err(|e| SyncError::Validation(format!("{}: {e}", path.display())))?;

  let (kind, issues) = match classify(path, raw)? {
    ManifestDocument::Single(issue) => (
      ManifestKind::Single,
      vec![IssueSpec::from_raw(issue, &RawDefaults::default(), "")?],
    ),
    ManifestDocument::Batch(batch) => {
      let items = batch.issues.unwrap_or_default();
      if items.is_empty() {
        return Err(SyncError::Validation(
          "manifest must include a non-empty 'issues' list".into(),
        ));
      }
      let defaults = batch.defaults.unwrap_or_default();
      let mut issues = Vec::with_capacity(items.len());
      for (index, item) in items.into_iter().enumerate() {
        let prefix = format!("issue #{}: ", index + 1);
        if !item.is_mapping() {
          return Err(SyncError::Validation(format!("{prefix}entries must be mappings")));
        }
        let raw: RawIssue = serde_yaml::from_value(item)
          .map_err(|e| SyncError::Validation(format!("{prefix}{e}")))?;
        issues.push(IssueSpec::from_raw(raw, &defaults, &prefix)?);
      }
      (ManifestKind::Batch, issues)
    }
  };

  Ok(Manifest {
    path: path.to_path_buf(),
    kind,
    issues,
  })
}

pub fn load_manifest(path: &Path) -> Result<Manifest> {
  if !path.exists() {
    return Err(SyncError::ManifestNotFound(path.to_path_buf()));
  }
  if path.is_dir() {
    return Err(SyncError::Validation(format!(
      "manifest path {} is a directory, expected a YAML file",
      path.display()
    )));
  }
  let content = std::fs::read_to_string(path)?;
  let manifest = parse_manifest(path, &content)?;
  debug!("loaded {} issue(s) from {}", manifest.issues.len(), path.display());
  Ok(manifest)
}
