pub const TEAM_CONTEXT: &str = r#"query TeamContext($teamKey: String!) {
  teams(filter: { key: { eq: $teamKey } }) {
    nodes {
      id key
      states(first: 50) { nodes { id name type } }
      labels(first: 250) { nodes { id name } }
      members(first: 100) { nodes { id email } }
    }
  }
}"#;

pub const ISSUE_BY_IDENTIFIER: &str = r#"query IssueByIdentifier($identifier: String!) {
  issue(id: $identifier) { id identifier url title }
}"#;

pub const SEARCH_ISSUE_BY_TITLE: &str = r#"query SearchIssueByTitle($teamId: ID!, $title: String!) {
  issues(
    filter: { team: { id: { eq: $teamId } }, title: { eqIgnoreCase: $title } }
    first: 1
  ) {
    nodes { id identifier url title }
  }
}"#;

pub const CREATE_ISSUE: &str = r#"mutation IssueCreate($input: IssueCreateInput!) {
  issueCreate(input: $input) {
    success
    issue { id identifier url title }
  }
}"#;

pub const UPDATE_ISSUE: &str = r#"mutation IssueUpdate($id: String!, $input: IssueUpdateInput!) {
  issueUpdate(id: $id, input: $input) {
    success
    issue { id identifier url title }
  }
}"#;

pub const CREATE_LABEL: &str = r#"mutation IssueLabelCreate($input: IssueLabelCreateInput!) {
  issueLabelCreate(input: $input) {
    success
    issueLabel { id name }
  }
}"#;

pub const LABEL_BY_NAME: &str = r#"query LabelByName($name: String!) {
  issueLabels(filter: { name: { eqIgnoreCase: $name } }) {
    nodes { id name team { id } }
  }
}"#;

pub const TEAM_ISSUES: &str = r#"query TeamIssues($teamKey: String!, $first: Int!, $after: String) {
  teams(filter: { key: { eq: $teamKey } }) {
    nodes {
      issues(first: $first, after: $after, orderBy: updatedAt) {
        nodes {
          identifier title description priority branchName
          state { id name }
          assignee { email }
          labels { nodes { id name } }
          project { id name }
        }
        pageInfo { hasNextPage endCursor }
      }
    }
  }
}"#;
