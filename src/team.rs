use std::collections::HashMap;

use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::linear::{IssueTracker, LabelCreateOutcome, TeamNode};
use crate::manifest::{dedupe_case_insensitive, normalize_key};

/// Stand-in id for labels that a dry run would have created. Never sent to Linear.
pub const DRY_RUN_LABEL_PLACEHOLDER: &str = "";

/// Per-team snapshot translating manifest names into Linear ids.
///
/// Built once per team per invocation. Only the label table changes afterwards,
/// when missing labels are created during a push.
#[derive(Debug, Clone)]
pub struct TeamContext {
  pub key: String,
  pub id: String,
  pub done_state_id: String,
  states: HashMap<String, String>,
  state_names: Vec<String>,
  labels: HashMap<String, String>,
  label_names: Vec<String>,
  members: HashMap<String, String>,
}

impl TeamContext {
  pub fn from_team(team: TeamNode) -> Result<Self> {
    let done_state_id = team
      .states
      .nodes
      .iter()
      .find(|s| {
        s.kind
          .as_deref()
          .is_some_and(|k| k.eq_ignore_ascii_case("completed"))
      })
      .map(|s| s.id.clone())
      .ok_or_else(|| SyncError::NoCompletedState(team.key.clone()))?;

    let mut ctx = Self {
      key: team.key,
      id: team.id,
      done_state_id,
      states: HashMap::new(),
      state_names: Vec::new(),
      labels: HashMap::new(),
      label_names: Vec::new(),
      members: HashMap::new(),
    };

    for state in team.states.nodes {
      ctx.states.insert(normalize_key(&state.name), state.id);
      ctx.state_names.push(state.name);
    }
    for label in team.labels.nodes {
      ctx.remember_label(&label.name, label.id);
    }
    for member in team.members.nodes {
      if let Some(email) = member.email.filter(|e| !e.trim().is_empty()) {
        ctx.members.insert(normalize_key(&email), member.id);
      }
    }

    Ok(ctx)
  }

  /// Fetches team metadata in a single call.
  pub async fn resolve(tracker: &dyn IssueTracker, team_key: &str) -> Result<Self> {
    let team = tracker
      .fetch_team(team_key)
      .await?
      .ok_or_else(|| SyncError::TeamNotFound(team_key.to_string()))?;
    let ctx = Self::from_team(team)?;
    debug!(
      "team {}: {} states, {} labels, {} members",
      ctx.key,
      ctx.states.len(),
      ctx.available_labels().len(),
      ctx.members.len()
    );
    Ok(ctx)
  }

  pub fn resolve_state_id(&self, name: &str) -> Result<String> {
    self
      .states
      .get(&normalize_key(name))
      .cloned()
      .ok_or_else(|| SyncError::UnknownState {
        state: name.to_string(),
        team: self.key.clone(),
        available: join_or_none(&self.state_names),
      })
  }

  pub fn resolve_member_id(&self, email: &str) -> Result<String> {
    self
      .members
      .get(&normalize_key(email))
      .cloned()
      .ok_or_else(|| SyncError::UnknownMember {
        email: email.to_string(),
        team: self.key.clone(),
      })
  }

  pub fn label_id(&self, name: &str) -> Option<&str> {
    self.labels.get(&normalize_key(name)).map(String::as_str)
  }

  pub fn available_labels(&self) -> &[String] {
    &self.label_names
  }

  /// Resolves label names to ids, creating missing labels unless `dry_run`.
  ///
  /// Names are deduplicated case-insensitively first. A create that loses a race
  /// against another writer falls back to looking the label up by name. In a dry
  /// run each missing label yields [`DRY_RUN_LABEL_PLACEHOLDER`].
  pub async fn resolve_label_ids(
    &mut self,
    names: &[String],
    tracker: &dyn IssueTracker,
    dry_run: bool,
  ) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    for name in dedupe_case_insensitive(names) {
      if let Some(id) = self.label_id(&name) {
        ids.push(id.to_string());
        continue;
      }

      if dry_run {
        info!("DRY RUN would create label '{name}' in team {}", self.key);
        ids.push(DRY_RUN_LABEL_PLACEHOLDER.to_string());
        continue;
      }

      let id = match tracker.create_label(&self.id, &name).await? {
        LabelCreateOutcome::Created(label) => {
          info!("created label '{name}' in team {}", self.key);
          label.id
        }
        LabelCreateOutcome::AlreadyExists => {
          let label = tracker
            .fetch_label_by_name(&self.id, &name)
            .await?
            .ok_or_else(|| {
              SyncError::Api(format!(
                "label '{name}' reported as duplicate but not found in team {}",
                self.key
              ))
            })?;
          info!("found existing label '{name}' in team {}", self.key);
          label.id
        }
      };
      self.remember_label(&name, id.clone());
      ids.push(id);
    }
    Ok(ids)
  }

  fn remember_label(&mut self, name: &str, id: String) {
    if self.labels.insert(normalize_key(name), id).is_none() {
      self.label_names.push(name.to_string());
    }
  }
}

fn join_or_none(names: &[String]) -> String {
  if names.is_empty() {
    "none".to_string()
  } else {
    names.join(", ")
  }
}
