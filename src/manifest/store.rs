use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde_yaml::{Mapping, Value};
use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::manifest::ManifestKind;

fn is_yaml(path: &Path) -> bool {
  matches!(
    path.extension().and_then(|e| e.to_str()).map(str::to_lowercase).as_deref(),
    Some("yaml" | "yml")
  )
}

fn collect_yaml(dir: &Path, found: &mut BTreeSet<PathBuf>) -> Result<()> {
  for entry in std::fs::read_dir(dir)?.filter_map(|e| e.ok()) {
    let path = entry.path();
    if path.is_dir() {
      collect_yaml(&path, found)?;
    } else if path.is_file() && is_yaml(&path) {
      found.insert(path);
    }
  }
  Ok(())
}

/// Every `.yaml`/`.yml` under `path` (recursively, sorted), or `path` itself when it is a file.
pub fn discover_manifest_files(path: &Path) -> Result<Vec<PathBuf>> {
  if path.is_dir() {
    let mut found = BTreeSet::new();
    collect_yaml(path, &mut found)?;
    return Ok(found.into_iter().collect());
  }
  if path.is_file() {
    if !is_yaml(path) {
      return Err(SyncError::Validation(format!(
        "manifest file {} must be .yaml or .yml",
        path.display()
      )));
    }
    return Ok(vec![path.to_path_buf()]);
  }
  Err(SyncError::ManifestNotFound(path.to_path_buf()))
}

pub fn read_document(path: &Path) -> Result<Value> {
  let content = std::fs::read_to_string(path)?;
  let value: Value = serde_yaml::from_str(&content)?;
  Ok(value)
}

/// Rewrites the whole document while holding an exclusive lock on the file.
pub fn write_document(path: &Path, doc: &Value) -> Result<()> {
  let content = serde_yaml::to_string(doc)?;
  let mut file = std::fs::OpenOptions::new()
    .write(true)
    .create(true)
    .truncate(false)
    .open(path)?;
  file.lock_exclusive()?;
  let written = file
    .set_len(0)
    .and_then(|_| file.write_all(content.as_bytes()))
    .and_then(|_| file.flush());
  FileExt::unlock(&file)?;
  written?;
  debug!("wrote manifest {}", path.display());
  Ok(())
}

/// Issue mappings inside a document: each `issues[i]` entry, or the root for flat manifests.
pub fn issue_mappings_mut(doc: &mut Value) -> Vec<&mut Mapping> {
  let Value::Mapping(root) = doc else {
    return Vec::new();
  };
  if root.contains_key("issues") {
    return match root.get_mut("issues") {
      Some(Value::Sequence(items)) => items.iter_mut().filter_map(Value::as_mapping_mut).collect(),
      _ => Vec::new(),
    };
  }
  vec![root]
}

/// Stores a freshly created identifier so the next push updates instead of duplicating.
pub fn record_identifier(
  path: &Path,
  kind: ManifestKind,
  index: usize,
  identifier: &str,
) -> Result<()> {
  let mut doc = read_document(path)?;
  let mut issues = issue_mappings_mut(&mut doc);
  let slot = match kind {
    ManifestKind::Single => issues.first_mut(),
    ManifestKind::Batch => issues.get_mut(index),
  };
  let Some(issue) = slot else {
    return Err(SyncError::Validation(format!(
      "cannot record identifier {identifier}: issue #{} missing from {}",
      index + 1,
      path.display()
    )));
  };
  // `id` is an accepted alias; keep a single key.
  issue.remove("id");
  issue.insert(Value::from("identifier"), Value::from(identifier));
  write_document(path, &doc)?;
  info!("recorded {identifier} in {}", path.display());
  Ok(())
}

/// Flat manifests under `dir` keyed by their `identifier`/`id` value.
pub fn index_by_identifier(dir: &Path) -> Result<std::collections::HashMap<String, PathBuf>> {
  let mut index = std::collections::HashMap::new();
  if !dir.is_dir() {
    return Ok(index);
  }
  for path in discover_manifest_files(dir)? {
    let Ok(doc) = read_document(&path) else {
      debug!("skipping unreadable manifest {}", path.display());
      continue;
    };
    let Value::Mapping(root) = &doc else { continue };
    if root.contains_key("issues") {
      continue;
    }
    let id = root
      .get("identifier")
      .or_else(|| root.get("id"))
      .and_then(Value::as_str);
    if let Some(id) = id {
      index.insert(id.to_uppercase(), path);
    }
  }
  Ok(index)
}

/// Lowercased title with spaces as underscores, capped at 30 chars, usable as a file name part.
pub fn title_slug(title: &str) -> String {
  title
    .trim()
    .to_lowercase()
    .chars()
    .map(|c| match c {
      ' ' | '/' | '\\' => '_',
      c => c,
    })
    .take(30)
    .collect()
}
