use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
  #[error("config error: {0}")]
  Config(String),

  #[error("manifest path {0} does not exist")]
  ManifestNotFound(PathBuf),

  #[error("invalid manifest: {0}")]
  Validation(String),

  #[error("Linear team with key '{0}' not found")]
  TeamNotFound(String),

  #[error("team {0} does not have a 'completed' workflow state")]
  NoCompletedState(String),

  #[error("state '{state}' is not valid for team {team}. Available states: {available}")]
  UnknownState {
    state: String,
    team: String,
    available: String,
  },

  #[error("no Linear member with email '{email}' in team {team}")]
  UnknownMember { email: String, team: String },

  #[error("Linear API error: {0}")]
  Api(String),

  #[error("git error: {0}")]
  Git(String),

  #[error("CI tool error: {0}")]
  Checks(String),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("yaml error: {0}")]
  Yaml(#[from] serde_yaml::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
