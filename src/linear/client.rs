use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::linear::queries;
use crate::linear::{
    IssueInput, IssuePage, IssueRef, IssueTracker, LabelCreateOutcome, LabelNode, Nodes, PageInfo,
    TeamIssue, TeamNode,
};

/// GraphQL client for the Linear API.
pub struct LinearClient {
    http: reqwest::Client,
    endpoint: String,
    token: String,
}

#[derive(Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct TeamsData<T> {
    teams: Nodes<T>,
}

#[derive(Deserialize)]
struct IssueData {
    issue: Option<IssueRef>,
}

#[derive(Deserialize)]
struct IssuesData {
    issues: Nodes<IssueRef>,
}

#[derive(Deserialize)]
struct IssuePayload {
    #[serde(default)]
    issue: Option<IssueRef>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueCreateData {
    issue_create: IssuePayload,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueUpdateData {
    issue_update: IssuePayload,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LabelPayload {
    #[serde(default)]
    issue_label: Option<LabelNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LabelCreateData {
    issue_label_create: LabelPayload,
}

#[derive(Deserialize)]
struct TeamRef {
    id: String,
}

#[derive(Deserialize)]
struct ScopedLabel {
    id: String,
    name: String,
    #[serde(default)]
    team: Option<TeamRef>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LabelsData {
    issue_labels: Nodes<ScopedLabel>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueConnection {
    #[serde(default)]
    nodes: Vec<TeamIssue>,
    #[serde(default)]
    page_info: PageInfo,
}

#[derive(Deserialize)]
struct TeamIssues {
    issues: IssueConnection,
}

fn is_duplicate_label(message: &str) -> bool {
    message.to_lowercase().contains("duplicate label name")
}

fn is_not_found(message: &str) -> bool {
    message.to_lowercase().contains("not found")
}

impl LinearClient {
    pub fn new(config: &Config) -> Result<Self> {
        let token = config.api_token()?;
        Self::with_endpoint(
            &config.settings.api_url,
            token,
            Duration::from_secs(config.settings.request_timeout_secs),
        )
    }

    pub fn with_endpoint(endpoint: &str, token: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            token,
        })
    }

    async fn request<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<T> {
        debug!("graphql request: {}", query.lines().next().unwrap_or_default());

        let resp = self
            .http
            .post(&self.endpoint)
            .header("Authorization", &self.token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        let parsed: GraphQlResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(e) if status.is_success() => return Err(e.into()),
            Err(_) => return Err(SyncError::Api(format!("HTTP {status}: {body}"))),
        };

        if let Some(first) = parsed.errors.first() {
            let message = first
                .message
                .clone()
                .unwrap_or_else(|| "unknown Linear API error".to_string());
            return Err(SyncError::Api(message));
        }
        if !status.is_success() {
            return Err(SyncError::Api(format!("HTTP {status}")));
        }

        let data = parsed
            .data
            .ok_or_else(|| SyncError::Api("response contained no data".into()))?;
        Ok(serde_json::from_value(data)?)
    }
}

#[async_trait]
impl IssueTracker for LinearClient {
    async fn fetch_team(&self, team_key: &str) -> Result<Option<TeamNode>> {
        let data: TeamsData<TeamNode> = self
            .request(queries::TEAM_CONTEXT, json!({ "teamKey": team_key }))
            .await?;
        Ok(data.teams.nodes.into_iter().next())
    }

    async fn fetch_issue_by_identifier(&self, identifier: &str) -> Result<Option<IssueRef>> {
        let result: Result<IssueData> = self
            .request(queries::ISSUE_BY_IDENTIFIER, json!({ "identifier": identifier }))
            .await;
        match result {
            Ok(data) => Ok(data.issue),
            // Linear reports unknown identifiers as an "Entity not found" error.
            Err(SyncError::Api(msg)) if is_not_found(&msg) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn search_issue_by_title(&self, team_id: &str, title: &str) -> Result<Option<IssueRef>> {
        let data: IssuesData = self
            .request(
                queries::SEARCH_ISSUE_BY_TITLE,
                json!({ "teamId": team_id, "title": title }),
            )
            .await?;
        Ok(data.issues.nodes.into_iter().next())
    }

    async fn create_issue(&self, input: &IssueInput) -> Result<IssueRef> {
        info!("creating issue: {}", input.title);
        let data: IssueCreateData = self
            .request(queries::CREATE_ISSUE, json!({ "input": input }))
            .await?;
        data.issue_create
            .issue
            .ok_or_else(|| SyncError::Api("no issue returned after creation".into()))
    }

    async fn update_issue(&self, issue_id: &str, input: &IssueInput) -> Result<IssueRef> {
        info!("updating issue {issue_id}");
        let data: IssueUpdateData = self
            .request(
                queries::UPDATE_ISSUE,
                json!({ "id": issue_id, "input": input }),
            )
            .await?;
        data.issue_update
            .issue
            .ok_or_else(|| SyncError::Api("no issue returned after update".into()))
    }

    async fn create_label(&self, team_id: &str, name: &str) -> Result<LabelCreateOutcome> {
        let result: Result<LabelCreateData> = self
            .request(
                queries::CREATE_LABEL,
                json!({ "input": { "teamId": team_id, "name": name } }),
            )
            .await;
        match result {
            Ok(data) => data
                .issue_label_create
                .issue_label
                .map(LabelCreateOutcome::Created)
                .ok_or_else(|| SyncError::Api("no label returned after creation".into())),
            Err(SyncError::Api(msg)) if is_duplicate_label(&msg) => {
                Ok(LabelCreateOutcome::AlreadyExists)
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_label_by_name(&self, team_id: &str, name: &str) -> Result<Option<LabelNode>> {
        let data: LabelsData = self
            .request(queries::LABEL_BY_NAME, json!({ "name": name }))
            .await?;
        // The filter is workspace-wide; narrow to the team here.
        Ok(data
            .issue_labels
            .nodes
            .into_iter()
            .find(|l| l.team.as_ref().is_some_and(|t| t.id == team_id))
            .map(|l| LabelNode {
                id: l.id,
                name: l.name,
            }))
    }

    async fn fetch_team_issues_page(
        &self,
        team_key: &str,
        first: usize,
        after: Option<&str>,
    ) -> Result<Option<IssuePage>> {
        let data: TeamsData<TeamIssues> = self
            .request(
                queries::TEAM_ISSUES,
                json!({ "teamKey": team_key, "first": first, "after": after }),
            )
            .await?;
        Ok(data.teams.nodes.into_iter().next().map(|team| IssuePage {
            issues: team.issues.nodes,
            page_info: team.issues.page_info,
        }))
    }
}
