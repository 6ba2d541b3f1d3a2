pub mod client;
pub mod queries;

#[cfg(test)]
pub mod fake;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Minimal issue handle returned by lookups and mutations.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IssueRef {
  pub id: String,
  pub identifier: String,
  pub url: String,
  #[serde(default)]
  pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LabelNode {
  pub id: String,
  pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateNode {
  pub id: String,
  pub name: String,
  #[serde(rename = "type", default)]
  pub kind: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemberNode {
  pub id: String,
  #[serde(default)]
  pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Nodes<T> {
  #[serde(default = "Vec::new")]
  pub nodes: Vec<T>,
}

impl<T> Default for Nodes<T> {
  fn default() -> Self {
    Self { nodes: Vec::new() }
  }
}

/// Raw team payload: identity plus the metadata needed to resolve names to ids.
#[derive(Debug, Clone, Deserialize)]
pub struct TeamNode {
  pub id: String,
  pub key: String,
  #[serde(default)]
  pub states: Nodes<StateNode>,
  #[serde(default)]
  pub labels: Nodes<LabelNode>,
  #[serde(default)]
  pub members: Nodes<MemberNode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedRef {
  pub id: String,
  pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssigneeRef {
  #[serde(default)]
  pub email: Option<String>,
}

/// Issue as listed by the team issues query, consumed by `pull`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamIssue {
  pub identifier: String,
  pub title: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub priority: Option<f64>,
  #[serde(default)]
  pub state: Option<NamedRef>,
  #[serde(default)]
  pub assignee: Option<AssigneeRef>,
  #[serde(default)]
  pub labels: Nodes<LabelNode>,
  #[serde(default)]
  pub branch_name: Option<String>,
  #[serde(default)]
  pub project: Option<NamedRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
  #[serde(default)]
  pub has_next_page: bool,
  #[serde(default)]
  pub end_cursor: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct IssuePage {
  pub issues: Vec<TeamIssue>,
  pub page_info: PageInfo,
}

/// Create/update payload. Unset fields are omitted so updates stay partial.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueInput {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub team_id: Option<String>,
  pub title: String,
  pub description: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub priority: Option<u8>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub label_ids: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub assignee_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub state_id: Option<String>,
}

/// Outcome of a label create call. A duplicate name is an expected race, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum LabelCreateOutcome {
  Created(LabelNode),
  AlreadyExists,
}

#[async_trait]
pub trait IssueTracker: Send + Sync {
  /// Team with states, labels and members, or `None` when no team has that key.
  async fn fetch_team(&self, team_key: &str) -> Result<Option<TeamNode>>;

  async fn fetch_issue_by_identifier(&self, identifier: &str) -> Result<Option<IssueRef>>;

  /// First issue in the team whose title matches case-insensitively.
  async fn search_issue_by_title(&self, team_id: &str, title: &str) -> Result<Option<IssueRef>>;

  async fn create_issue(&self, input: &IssueInput) -> Result<IssueRef>;

  async fn update_issue(&self, issue_id: &str, input: &IssueInput) -> Result<IssueRef>;

  async fn create_label(&self, team_id: &str, name: &str) -> Result<LabelCreateOutcome>;

  async fn fetch_label_by_name(&self, team_id: &str, name: &str) -> Result<Option<LabelNode>>;

  /// One page of team issues; `None` when the team is unknown.
  async fn fetch_team_issues_page(
    &self,
    team_key: &str,
    first: usize,
    after: Option<&str>,
  ) -> Result<Option<IssuePage>>;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_update_input_omits_unset_fields() {
    let input = IssueInput {
      title: "X".into(),
      description: String::new(),
      priority: Some(0),
      ..Default::default()
    };
    let json = serde_json::to_value(&input).unwrap();
    assert_eq!(
      json,
      serde_json::json!({"title": "X", "description": "", "priority": 0})
    );
  }

  #[test]
  fn test_create_input_uses_camel_case() {
    let input = IssueInput {
      team_id: Some("team-1".into()),
      title: "X".into(),
      description: "d".into(),
      label_ids: Some(vec!["l1".into()]),
      assignee_id: Some("u1".into()),
      state_id: Some("s1".into()),
      priority: None,
    };
    let json = serde_json::to_value(&input).unwrap();
    assert_eq!(json["teamId"], "team-1");
    assert_eq!(json["labelIds"][0], "l1");
    assert_eq!(json["assigneeId"], "u1");
    assert_eq!(json["stateId"], "s1");
    assert!(json.get("priority").is_none());
  }
}
