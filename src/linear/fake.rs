//! In-memory `IssueTracker` that records every call.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Result, SyncError};
use crate::linear::{
  IssueInput, IssuePage, IssueRef, IssueTracker, LabelCreateOutcome, LabelNode, MemberNode, Nodes,
  StateNode, TeamNode,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
  FetchTeam(String),
  FetchIssue(String),
  SearchTitle(String),
  Create(IssueInput),
  Update(String, IssueInput),
  CreateLabel(String),
  FetchLabel(String),
  FetchPage {
    team_key: String,
    first: usize,
    after: Option<String>,
  },
}

#[derive(Default)]
pub struct FakeTracker {
  teams: HashMap<String, TeamNode>,
  issues: HashMap<String, IssueRef>,
  titles: HashMap<String, IssueRef>,
  /// Labels that exist remotely but are missing from the team snapshot.
  racing_labels: HashMap<String, LabelNode>,
  label_error: Option<String>,
  pages: HashMap<String, Vec<IssuePage>>,
  calls: Mutex<Vec<Call>>,
}

pub fn issue_ref(id: &str, identifier: &str) -> IssueRef {
  IssueRef {
    id: id.to_string(),
    identifier: identifier.to_string(),
    url: format!("https://linear.app/acme/issue/{identifier}"),
    title: None,
  }
}

/// ENG-style team with Backlog/Todo/Done states, Bug/Feature labels and one member.
pub fn team_node(key: &str, id: &str) -> TeamNode {
  let state = |id: &str, name: &str, kind: &str| StateNode {
    id: id.into(),
    name: name.into(),
    kind: Some(kind.into()),
  };
  TeamNode {
    id: id.into(),
    key: key.into(),
    states: Nodes {
      nodes: vec![
        state("state-1", "Backlog", "backlog"),
        state("state-2", "Todo", "unstarted"),
        state("state-3", "Done", "completed"),
      ],
    },
    labels: Nodes {
      nodes: vec![
        LabelNode {
          id: "label-1".into(),
          name: "Bug".into(),
        },
        LabelNode {
          id: "label-2".into(),
          name: "Feature".into(),
        },
      ],
    },
    members: Nodes {
      nodes: vec![MemberNode {
        id: "user-1".into(),
        email: Some("dev@example.com".into()),
      }],
    },
  }
}

impl FakeTracker {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_team(mut self, team: TeamNode) -> Self {
    self.teams.insert(team.key.clone(), team);
    self
  }

  pub fn with_issue(mut self, issue: IssueRef) -> Self {
    self.issues.insert(issue.identifier.clone(), issue);
    self
  }

  pub fn with_titled_issue(mut self, title: &str, issue: IssueRef) -> Self {
    self.titles.insert(title.to_lowercase(), issue);
    self
  }

  pub fn with_racing_label(mut self, label: LabelNode) -> Self {
    self.racing_labels.insert(label.name.to_lowercase(), label);
    self
  }

  pub fn with_label_error(mut self, message: &str) -> Self {
    self.label_error = Some(message.to_string());
    self
  }

  pub fn with_pages(mut self, team_key: &str, pages: Vec<IssuePage>) -> Self {
    self.pages.insert(team_key.to_string(), pages);
    self
  }

  pub fn calls(&self) -> Vec<Call> {
    self.calls.lock().unwrap().clone()
  }

  pub fn creates(&self) -> Vec<IssueInput> {
    self
      .calls()
      .into_iter()
      .filter_map(|c| match c {
        Call::Create(input) => Some(input),
        _ => None,
      })
      .collect()
  }

  pub fn updates(&self) -> Vec<(String, IssueInput)> {
    self
      .calls()
      .into_iter()
      .filter_map(|c| match c {
        Call::Update(id, input) => Some((id, input)),
        _ => None,
      })
      .collect()
  }

  fn record(&self, call: Call) {
    self.calls.lock().unwrap().push(call);
  }
}

#[async_trait]
impl IssueTracker for FakeTracker {
  async fn fetch_team(&self, team_key: &str) -> Result<Option<TeamNode>> {
    self.record(Call::FetchTeam(team_key.to_string()));
    Ok(self.teams.get(team_key).cloned())
  }

  async fn fetch_issue_by_identifier(&self, identifier: &str) -> Result<Option<IssueRef>> {
    self.record(Call::FetchIssue(identifier.to_string()));
    Ok(self.issues.get(identifier).cloned())
  }

  async fn search_issue_by_title(&self, _team_id: &str, title: &str) -> Result<Option<IssueRef>> {
    self.record(Call::SearchTitle(title.to_string()));
    Ok(self.titles.get(&title.to_lowercase()).cloned())
  }

  async fn create_issue(&self, input: &IssueInput) -> Result<IssueRef> {
    self.record(Call::Create(input.clone()));
    let n = self.creates().len();
    Ok(issue_ref(&format!("new-{n}"), &format!("NEW-{n}")))
  }

  async fn update_issue(&self, issue_id: &str, input: &IssueInput) -> Result<IssueRef> {
    self.record(Call::Update(issue_id.to_string(), input.clone()));
    self
      .issues
      .values()
      .find(|i| i.id == issue_id)
      .cloned()
      .ok_or_else(|| SyncError::Api(format!("no issue {issue_id}")))
  }

  async fn create_label(&self, _team_id: &str, name: &str) -> Result<LabelCreateOutcome> {
    self.record(Call::CreateLabel(name.to_string()));
    if let Some(message) = &self.label_error {
      return Err(SyncError::Api(message.clone()));
    }
    if self.racing_labels.contains_key(&name.to_lowercase()) {
      return Ok(LabelCreateOutcome::AlreadyExists);
    }
    Ok(LabelCreateOutcome::Created(LabelNode {
      id: format!("created-{}", name.to_lowercase()),
      name: name.to_string(),
    }))
  }

  async fn fetch_label_by_name(&self, _team_id: &str, name: &str) -> Result<Option<LabelNode>> {
    self.record(Call::FetchLabel(name.to_string()));
    Ok(self.racing_labels.get(&name.to_lowercase()).cloned())
  }

  async fn fetch_team_issues_page(
    &self,
    team_key: &str,
    first: usize,
    after: Option<&str>,
  ) -> Result<Option<IssuePage>> {
    self.record(Call::FetchPage {
      team_key: team_key.to_string(),
      first,
      after: after.map(str::to_string),
    });
    let Some(pages) = self.pages.get(team_key) else {
      return Ok(None);
    };
    let index = after
      .and_then(|c| c.strip_prefix("cursor-"))
      .and_then(|n| n.parse::<usize>().ok())
      .unwrap_or(0);
    Ok(Some(pages.get(index).cloned().unwrap_or_default()))
  }
}
